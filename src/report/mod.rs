pub mod html;
pub mod json;
pub mod junit;
pub mod types;

pub use types::{CategoryBreakdown, FailureEntry, Grade, RunReport};

use crate::error::SinkError;
use crate::runner::orchestrator::PhaseOutcome;
use crate::runner::recorder::RecorderSnapshot;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Durable destination for the final report. One write per run; a second
/// write for the same run id replaces the first.
pub trait ReportSink: Send + Sync {
    fn write(&self, run_id: &str, report: &RunReport) -> Result<PathBuf, SinkError>;
}

/// Builds the [`RunReport`] from the recorder's final state
pub struct ReportGenerator;

impl ReportGenerator {
    pub fn generate(
        run_id: &str,
        snapshot: RecorderSnapshot,
        phases: Vec<PhaseOutcome>,
        duration: Duration,
        interrupted: bool,
    ) -> RunReport {
        let totals = snapshot.by_status;
        let pass_rate = totals.pass_rate();

        let categories = snapshot
            .by_category
            .into_iter()
            .map(|(category, counts)| CategoryBreakdown {
                category,
                pass_rate: counts.pass_rate(),
                counts,
            })
            .collect();

        let failures = snapshot
            .results
            .iter()
            .filter(|r| r.status().is_failure())
            .map(|r| FailureEntry {
                name: r.name().to_string(),
                category: r.category().clone(),
                details: r.details().to_string(),
                error: r.error().map(str::to_string),
            })
            .collect();

        RunReport {
            run_id: run_id.to_string(),
            generated_at: chrono::Local::now().to_rfc3339(),
            interrupted,
            duration_ms: duration.as_millis() as u64,
            total_tests: totals.total(),
            totals,
            pass_rate,
            grade: Grade::from_pass_rate(pass_rate),
            categories,
            phases,
            failures,
            results: snapshot.results,
        }
    }
}

/// Writes `<output>/<run_id>/test-results.json` plus HTML and JUnit renderings
pub struct FileReportSink {
    output_dir: PathBuf,
}

impl FileReportSink {
    pub fn new(output_dir: &Path) -> Self {
        Self {
            output_dir: output_dir.to_path_buf(),
        }
    }

    pub fn run_dir(&self, run_id: &str) -> PathBuf {
        self.output_dir.join(sanitize(run_id))
    }
}

fn sanitize(run_id: &str) -> String {
    run_id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

impl ReportSink for FileReportSink {
    fn write(&self, run_id: &str, report: &RunReport) -> Result<PathBuf, SinkError> {
        let dir = self.run_dir(run_id);
        std::fs::create_dir_all(&dir)?;

        let results_path = dir.join("test-results.json");
        json::write_atomic(&results_path, &json::render(report)?)?;

        // Renderings are conveniences; the JSON file is the record
        if let Err(e) = json::write_atomic(&dir.join("report.html"), &html::render(report)) {
            log::warn!("Failed to write HTML report: {}", e);
        }
        match junit::render(report) {
            Ok(xml) => {
                if let Err(e) = json::write_atomic(&dir.join("junit.xml"), &xml) {
                    log::warn!("Failed to write JUnit report: {}", e);
                }
            }
            Err(e) => log::warn!("Failed to render JUnit report: {}", e),
        }

        log::info!("Report written to {}", results_path.display());
        Ok(results_path)
    }
}

/// Re-render a persisted report in another format
pub fn generate_report(results_path: &Path, format: &str, output: Option<&Path>) -> Result<()> {
    let content = std::fs::read_to_string(results_path)
        .with_context(|| format!("Failed to read {}", results_path.display()))?;
    let report: RunReport = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse {}", results_path.display()))?;

    let rendered = match format {
        "json" => json::render(&report)?,
        "html" => html::render(&report),
        "junit" => junit::render(&report)?,
        _ => anyhow::bail!("Unknown format: {}", format),
    };

    match output {
        Some(path) => {
            std::fs::write(path, rendered)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            println!("{} report saved to: {}", format.to_uppercase(), path.display());
        }
        None => println!("{}", rendered),
    }

    Ok(())
}
