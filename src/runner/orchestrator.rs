use super::context::RunContext;
use super::events::{EventEmitter, TestEvent};
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

/// Top-level stages of a run, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Authentication,
    EndpointSweep,
    Workflows,
    Realtime,
    Frontend,
    Performance,
    Security,
    DataIntegrity,
}

impl Phase {
    pub const ORDER: [Phase; 8] = [
        Phase::Authentication,
        Phase::EndpointSweep,
        Phase::Workflows,
        Phase::Realtime,
        Phase::Frontend,
        Phase::Performance,
        Phase::Security,
        Phase::DataIntegrity,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Phase::Authentication => "Authentication",
            Phase::EndpointSweep => "Endpoint Sweep",
            Phase::Workflows => "Dependency Workflows",
            Phase::Realtime => "Realtime Probe",
            Phase::Frontend => "Frontend Sweep",
            Phase::Performance => "Load & Performance",
            Phase::Security => "Security Probes",
            Phase::DataIntegrity => "Data Integrity",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PhaseStatus {
    Completed,
    /// Cancelled while running; rows recorded before the cancel are kept
    Interrupted,
    /// Cancelled before it could start
    NotStarted,
    Failed { error: String },
}

/// Phase-level diagnostic row carried in the report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhaseOutcome {
    pub phase: String,
    #[serde(flatten)]
    pub status: PhaseStatus,
    pub duration_ms: u64,
    /// Rows this phase added to the recorder
    pub recorded: usize,
}

/// Drives phases in order behind one failure boundary each.
///
/// An `Err` or a panic escaping a phase ends that phase only; the next
/// phase still runs. Cancellation stops new phases from starting but
/// every phase still gets an outcome row.
pub struct PhaseOrchestrator {
    ctx: Arc<RunContext>,
    emitter: Option<EventEmitter>,
}

impl PhaseOrchestrator {
    pub fn new(ctx: Arc<RunContext>, emitter: Option<EventEmitter>) -> Self {
        Self { ctx, emitter }
    }

    fn emit(&self, event: TestEvent) {
        if let Some(emitter) = &self.emitter {
            emitter.emit(event);
        }
    }

    pub async fn run<F, Fut>(&self, phases: &[Phase], mut body: F) -> Vec<PhaseOutcome>
    where
        F: FnMut(Phase) -> Fut,
        Fut: Future<Output = anyhow::Result<()>>,
    {
        let mut outcomes = Vec::with_capacity(phases.len());

        for (index, phase) in phases.iter().copied().enumerate() {
            if self.ctx.is_cancelled() {
                log::info!("Phase '{}' not started: run cancelled", phase.name());
                outcomes.push(PhaseOutcome {
                    phase: phase.name().to_string(),
                    status: PhaseStatus::NotStarted,
                    duration_ms: 0,
                    recorded: 0,
                });
                continue;
            }

            self.emit(TestEvent::PhaseStarted {
                phase: phase.name().to_string(),
                index,
            });
            log::info!("Phase {}: {}", index + 1, phase.name());

            let start = Instant::now();
            let before = self.ctx.recorder().len();

            let status = match AssertUnwindSafe(body(phase)).catch_unwind().await {
                Ok(Ok(())) if self.ctx.is_cancelled() => PhaseStatus::Interrupted,
                Ok(Ok(())) => PhaseStatus::Completed,
                Ok(Err(e)) => {
                    log::error!("Phase '{}' failed: {:#}", phase.name(), e);
                    PhaseStatus::Failed {
                        error: format!("{:#}", e),
                    }
                }
                Err(panic) => {
                    let message = panic_message(panic.as_ref());
                    log::error!("Phase '{}' panicked: {}", phase.name(), message);
                    PhaseStatus::Failed {
                        error: format!("panic: {}", message),
                    }
                }
            };

            let outcome = PhaseOutcome {
                phase: phase.name().to_string(),
                status,
                duration_ms: start.elapsed().as_millis() as u64,
                recorded: self.ctx.recorder().len().saturating_sub(before),
            };

            self.emit(TestEvent::PhaseFinished {
                phase: outcome.phase.clone(),
                status: outcome.status.clone(),
                duration_ms: outcome.duration_ms,
                recorded: outcome.recorded,
            });
            outcomes.push(outcome);
        }

        outcomes
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
