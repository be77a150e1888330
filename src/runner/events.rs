use super::orchestrator::PhaseStatus;
use super::recorder::StatusCounts;
use super::state::{TestResult, TestStatus};
use crate::report::Grade;
use tokio::sync::broadcast;

/// Run events for real-time progress output
#[derive(Debug, Clone)]
pub enum TestEvent {
    RunStarted {
        run_id: String,
        phase_count: usize,
    },
    RunFinished {
        counts: StatusCounts,
        pass_rate: f64,
        grade: Grade,
        duration_ms: u64,
        interrupted: bool,
    },

    PhaseStarted {
        phase: String,
        index: usize,
    },
    PhaseFinished {
        phase: String,
        status: PhaseStatus,
        duration_ms: u64,
        recorded: usize,
    },

    /// A row reached the recorder; `counts` are the running totals after it
    ResultRecorded {
        result: TestResult,
        counts: StatusCounts,
    },
}

/// Event emitter for broadcasting run events
#[derive(Debug, Clone)]
pub struct EventEmitter {
    sender: broadcast::Sender<TestEvent>,
}

impl EventEmitter {
    pub fn new() -> (Self, broadcast::Receiver<TestEvent>) {
        let (sender, receiver) = broadcast::channel(1024);
        (Self { sender }, receiver)
    }

    pub fn emit(&self, event: TestEvent) {
        let _ = self.sender.send(event);
    }
}

use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration as StdDuration;

/// Console event listener for printing real-time updates
pub struct ConsoleEventListener;

impl ConsoleEventListener {
    /// Render events until the run finishes or every emitter is dropped
    pub async fn listen(mut receiver: broadcast::Receiver<TestEvent>) {
        use colored::Colorize;
        use indicatif::ProgressDrawTarget;
        use std::io::IsTerminal;

        let is_tty = std::io::stdout().is_terminal();
        let mut spinner: Option<ProgressBar> = None;
        let mut phase_count = 0;

        loop {
            let event = match receiver.recv().await {
                Ok(event) => event,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    log::debug!("console listener lagged, {} events dropped", skipped);
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => break,
            };

            match event {
                TestEvent::RunStarted {
                    run_id,
                    phase_count: count,
                } => {
                    phase_count = count;
                    println!(
                        "\n{} Validation run started: {}",
                        "▶".green().bold(),
                        run_id.cyan()
                    );
                }

                TestEvent::PhaseStarted { phase, index } => {
                    println!(
                        "\n  {} Phase {}/{}: {}",
                        "→".blue(),
                        index + 1,
                        phase_count,
                        phase.white().bold()
                    );

                    let pb = ProgressBar::new_spinner();
                    if !is_tty {
                        // Piped output: no terminal escape codes
                        pb.set_draw_target(ProgressDrawTarget::hidden());
                    }
                    if let Ok(style) = ProgressStyle::default_spinner()
                        .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏ ")
                        .template("    {spinner} {msg}")
                    {
                        pb.set_style(style);
                    }
                    pb.set_message(format!("{}...", phase.dimmed()));
                    pb.enable_steady_tick(StdDuration::from_millis(100));
                    spinner = Some(pb);
                }

                TestEvent::ResultRecorded { result, counts } => {
                    let icon = match result.status() {
                        TestStatus::Pass => "✓".green(),
                        TestStatus::Fail => "✗".red(),
                        TestStatus::Skip => "○".yellow(),
                        TestStatus::Error => "!".red().bold(),
                    };
                    let line = format!(
                        "    {} {} | {} ({}ms)",
                        icon,
                        result.category().label().dimmed(),
                        result.name(),
                        result.duration_ms()
                    );
                    let detail = if result.status() == TestStatus::Pass {
                        None
                    } else {
                        Some(format!("      └─ {}", result.details().dimmed()))
                    };

                    match &spinner {
                        Some(pb) => {
                            pb.println(line);
                            if let Some(detail) = detail {
                                pb.println(detail);
                            }
                            pb.set_message(format!(
                                "{} passed, {} failed, {} errors, {} skipped",
                                counts.passed.to_string().green(),
                                counts.failed.to_string().red(),
                                counts.errored.to_string().red(),
                                counts.skipped.to_string().yellow()
                            ));
                        }
                        None => {
                            println!("{}", line);
                            if let Some(detail) = detail {
                                println!("{}", detail);
                            }
                        }
                    }
                }

                TestEvent::PhaseFinished {
                    phase,
                    status,
                    duration_ms,
                    recorded,
                } => {
                    if let Some(pb) = spinner.take() {
                        pb.finish_and_clear();
                    }
                    let status_str = match &status {
                        PhaseStatus::Completed => "DONE".green().bold(),
                        PhaseStatus::Interrupted => "INTERRUPTED".yellow().bold(),
                        PhaseStatus::NotStarted => "NOT STARTED".yellow().bold(),
                        PhaseStatus::Failed { .. } => "FAILED".red().bold(),
                    };
                    println!(
                        "  {} {} [{}] {} results in {}ms",
                        "←".blue(),
                        phase,
                        status_str,
                        recorded,
                        duration_ms
                    );
                    if let PhaseStatus::Failed { error } = status {
                        println!("      └─ {}", error.red());
                    }
                }

                TestEvent::RunFinished {
                    counts,
                    pass_rate,
                    grade,
                    duration_ms,
                    interrupted,
                } => {
                    if let Some(pb) = spinner.take() {
                        pb.finish_and_clear();
                    }
                    println!("\n{} Validation run finished", "■".blue().bold());
                    if interrupted {
                        println!("  {}", "Run was interrupted by the operator".yellow());
                    }
                    println!("  Total tests: {}", counts.total());
                    println!(
                        "  {} passed, {} failed, {} errors, {} skipped",
                        counts.passed.to_string().green(),
                        counts.failed.to_string().red(),
                        counts.errored.to_string().red(),
                        counts.skipped.to_string().yellow()
                    );
                    println!("  Pass rate: {:.1}%", pass_rate);
                    println!("  Duration: {}ms", duration_ms);
                    println!("  Grade: {}", grade.headline());
                    break;
                }
            }
        }
    }
}
