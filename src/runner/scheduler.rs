use super::case::interruptible;
use super::context::RunContext;
use super::state::{Category, FailureKind, Outcome, TestResult};
use futures::future::{join_all, BoxFuture};
use futures::FutureExt;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

/// One independent unit of work submitted to the scheduler
pub struct Invocation {
    name: String,
    category: Category,
    task: BoxFuture<'static, TestResult>,
}

impl Invocation {
    pub fn new<F>(name: &str, category: Category, task: F) -> Self
    where
        F: Future<Output = TestResult> + Send + 'static,
    {
        Self {
            name: name.to_string(),
            category,
            task: task.boxed(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// What a scheduler run did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchSummary {
    /// Size of every batch that was started, in order
    pub batch_sizes: Vec<usize>,
    pub recorded: usize,
    /// Invocations never started because the run was cancelled
    pub not_started: usize,
}

/// Bounded fan-out for independent work.
///
/// Invocations are cut into batches of at most `max_concurrency`. A batch is
/// spawned as a whole and fully drained before the next one starts; each
/// batch holds the context's auth gate shared for its whole lifetime.
pub struct BatchScheduler {
    max_concurrency: usize,
    ctx: Arc<RunContext>,
}

impl BatchScheduler {
    pub fn new(ctx: Arc<RunContext>) -> Self {
        let max_concurrency = ctx.config().max_concurrency().max(1);
        Self {
            max_concurrency,
            ctx,
        }
    }

    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency.max(1);
        self
    }

    pub fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }

    /// Run every invocation and record exactly one row per started invocation
    pub async fn run(&self, invocations: Vec<Invocation>) -> BatchSummary {
        let mut summary = BatchSummary::default();
        let mut pending = invocations.into_iter().peekable();

        while pending.peek().is_some() {
            if self.ctx.is_cancelled() {
                summary.not_started = pending.count();
                log::warn!(
                    "Run cancelled, {} invocations not started",
                    summary.not_started
                );
                break;
            }

            let batch: Vec<Invocation> = pending.by_ref().take(self.max_concurrency).collect();
            summary.batch_sizes.push(batch.len());
            log::debug!(
                "Starting batch {} ({} invocations)",
                summary.batch_sizes.len(),
                batch.len()
            );

            let _gate = self.ctx.batch_guard().await;
            let started = Instant::now();

            let mut labels = Vec::with_capacity(batch.len());
            let mut handles = Vec::with_capacity(batch.len());
            for Invocation {
                name,
                category,
                task,
            } in batch
            {
                let cancel = self.ctx.cancel_token().clone();
                let label = (name.clone(), category.clone());
                handles.push(tokio::spawn(async move {
                    interruptible(&cancel, &name, category, task).await
                }));
                labels.push(label);
            }

            for ((name, category), joined) in labels.into_iter().zip(join_all(handles).await) {
                let result = match joined {
                    Ok(result) => result,
                    Err(e) => {
                        log::error!("Task '{}' failed inside its batch: {}", name, e);
                        TestResult::new(
                            &name,
                            category,
                            started.elapsed(),
                            Outcome::error(
                                FailureKind::HarnessFailure,
                                "Task aborted inside its batch",
                                e.to_string(),
                            ),
                        )
                    }
                };
                self.ctx.recorder().record(result);
                summary.recorded += 1;
            }
        }

        summary
    }

    /// Batched fan-out of raw calls whose outputs the caller aggregates
    /// itself. Nothing is recorded; tasks that panic are dropped from the
    /// output, and batches after a cancellation are not started.
    pub async fn fan_out<F, T>(&self, tasks: Vec<F>) -> Vec<T>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let mut outputs = Vec::with_capacity(tasks.len());
        let mut pending = tasks.into_iter().peekable();

        while pending.peek().is_some() {
            if self.ctx.is_cancelled() {
                break;
            }
            let _gate = self.ctx.batch_guard().await;
            let handles: Vec<_> = pending
                .by_ref()
                .take(self.max_concurrency)
                .map(tokio::spawn)
                .collect();

            for joined in join_all(handles).await {
                match joined {
                    Ok(output) => outputs.push(output),
                    Err(e) => log::warn!("Fan-out task failed: {}", e),
                }
            }
        }

        outputs
    }
}
