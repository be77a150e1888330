use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use lumi_e2e::runner::{self, Collaborators, ConsoleEventListener, EventEmitter};
use lumi_e2e::utils::{ConfigOverrides, TestConfig};
use lumi_e2e::{parser, report};

#[derive(Parser)]
#[command(name = "lumi-e2e")]
#[command(author = "NL Team")]
#[command(version = "0.1.0")]
#[command(about = "End-to-end validation of a multi-tier web platform", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the validation suite against a platform
    Run {
        /// YAML config file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Suite definition (defaults to the built-in suite)
        #[arg(short, long)]
        suite: Option<PathBuf>,

        #[arg(long)]
        api_url: Option<String>,

        #[arg(long)]
        frontend_url: Option<String>,

        #[arg(long)]
        realtime_url: Option<String>,

        /// Per-call timeout in seconds
        #[arg(long)]
        timeout: Option<u64>,

        /// Size of each concurrent batch
        #[arg(long)]
        max_concurrency: Option<usize>,

        /// Output directory for reports
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Pin the run id so repeated runs overwrite the same report
        #[arg(long)]
        run_id: Option<String>,

        /// Render frontend pages in headless Chromium
        #[arg(long, default_value = "false")]
        browser: bool,

        /// Number of calls in the rate-limit burst
        #[arg(long)]
        rate_limit_burst: Option<usize>,
    },

    /// Generate report from test results
    Report {
        /// Path to test-results.json
        results: PathBuf,

        /// Output format (json, html, junit)
        #[arg(short, long, default_value = "html")]
        format: String,

        /// Output file path
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Print the built-in suite definition
    Suite {
        /// Write to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            config,
            suite,
            api_url,
            frontend_url,
            realtime_url,
            timeout,
            max_concurrency,
            output,
            run_id,
            browser,
            rate_limit_burst,
        } => {
            let config = TestConfig::load(config.as_deref())?.with_overrides(ConfigOverrides {
                api_base_url: api_url,
                frontend_base_url: frontend_url,
                realtime_base_url: realtime_url,
                timeout_secs: timeout,
                max_concurrency,
                output_dir: output,
                run_id,
                browser: browser.then_some(true),
                rate_limit_burst,
            });
            config.validate()?;

            let suite = parser::load_suite(suite.as_deref())?;

            println!("{} Validating platform", "▶".green().bold());
            println!("  API: {}", config.api_base_url().cyan());
            println!("  Frontend: {}", config.frontend_base_url().cyan());
            println!("  Realtime: {}", config.realtime_base_url().cyan());
            println!(
                "  Concurrency: {}",
                config.max_concurrency().to_string().yellow()
            );
            println!("  Output: {}", config.output_dir().display().to_string().cyan());

            let cancel = CancellationToken::new();
            let presses = Arc::new(AtomicUsize::new(0));
            let handler_cancel = cancel.clone();
            ctrlc::set_handler(move || {
                if presses.fetch_add(1, Ordering::SeqCst) == 0 {
                    println!(
                        "\n{} Interrupt received, finishing report (Ctrl+C again to quit)",
                        "⏹".yellow()
                    );
                    handler_cancel.cancel();
                } else {
                    std::process::exit(130);
                }
            })?;

            let (emitter, receiver) = EventEmitter::new();
            let listener = tokio::spawn(ConsoleEventListener::listen(receiver));

            let collaborators = Collaborators::from_config(&config).await?;
            let report = runner::run_suite_with(
                Arc::new(config),
                suite,
                collaborators,
                cancel,
                Some(emitter),
            )
            .await?;

            let _ = listener.await;

            if !report.failures.is_empty() {
                println!("\n{} Failures:", "✗".red().bold());
                for failure in &report.failures {
                    println!(
                        "  {} [{}] {}",
                        failure.name.red(),
                        failure.category,
                        failure.details
                    );
                }
            }

            std::process::exit(report.exit_code());
        }

        Commands::Report {
            results,
            format,
            output,
        } => {
            println!(
                "{} Generating {} report from: {}",
                "📊".to_string().blue(),
                format.cyan(),
                results.display()
            );
            report::generate_report(&results, &format, output.as_deref())?;
        }

        Commands::Suite { output } => match output {
            Some(path) => {
                std::fs::write(&path, parser::DEFAULT_SUITE_YAML)?;
                println!("{} Suite written to {}", "✓".green(), path.display());
            }
            None => print!("{}", parser::DEFAULT_SUITE_YAML),
        },
    }

    Ok(())
}
