use super::events::{EventEmitter, TestEvent};
use super::state::{Category, TestResult, TestStatus};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

/// Count of rows per status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusCounts {
    pub passed: u32,
    pub failed: u32,
    pub skipped: u32,
    pub errored: u32,
}

impl StatusCounts {
    pub fn add(&mut self, status: TestStatus) {
        match status {
            TestStatus::Pass => self.passed += 1,
            TestStatus::Fail => self.failed += 1,
            TestStatus::Skip => self.skipped += 1,
            TestStatus::Error => self.errored += 1,
        }
    }

    pub fn total(&self) -> u32 {
        self.passed + self.failed + self.skipped + self.errored
    }

    /// passed / total × 100, defined as 0 for an empty set
    pub fn pass_rate(&self) -> f64 {
        let total = self.total();
        if total == 0 {
            0.0
        } else {
            self.passed as f64 / total as f64 * 100.0
        }
    }
}

#[derive(Debug, Default)]
struct RecorderState {
    results: Vec<TestResult>,
    by_status: StatusCounts,
    by_category: BTreeMap<Category, StatusCounts>,
}

/// Append-only result store shared by every executing task.
///
/// Inserts are serialized through one mutex; running counters are updated on
/// insert so progress and the final report never rescan the history.
#[derive(Debug, Default)]
pub struct ResultRecorder {
    state: Mutex<RecorderState>,
    emitter: Option<EventEmitter>,
}

impl ResultRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Recorder that publishes every insert as a [`TestEvent::ResultRecorded`]
    pub fn with_emitter(emitter: EventEmitter) -> Self {
        Self {
            state: Mutex::new(RecorderState::default()),
            emitter: Some(emitter),
        }
    }

    fn lock(&self) -> MutexGuard<'_, RecorderState> {
        // Rows are pushed after every fallible step, so a poisoned lock still holds whole rows
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Append one row and return the number of rows now stored
    pub fn record(&self, result: TestResult) -> usize {
        let (len, counts, event_result) = {
            let mut state = self.lock();
            state.by_status.add(result.status());
            state
                .by_category
                .entry(result.category().clone())
                .or_default()
                .add(result.status());
            let event_result = self.emitter.as_ref().map(|_| result.clone());
            state.results.push(result);
            (state.results.len(), state.by_status, event_result)
        };

        if let (Some(emitter), Some(result)) = (&self.emitter, event_result) {
            emitter.emit(TestEvent::ResultRecorded { result, counts });
        }

        len
    }

    pub fn len(&self) -> usize {
        self.lock().results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn counts(&self) -> StatusCounts {
        self.lock().by_status
    }

    pub fn category_counts(&self) -> BTreeMap<Category, StatusCounts> {
        self.lock().by_category.clone()
    }

    /// Consistent copy of rows and counters taken under one lock
    pub fn snapshot(&self) -> RecorderSnapshot {
        let state = self.lock();
        RecorderSnapshot {
            results: state.results.clone(),
            by_status: state.by_status,
            by_category: state.by_category.clone(),
        }
    }
}

/// Point-in-time copy of the recorder used to build the report
#[derive(Debug, Clone)]
pub struct RecorderSnapshot {
    pub results: Vec<TestResult>,
    pub by_status: StatusCounts,
    pub by_category: BTreeMap<Category, StatusCounts>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::state::Outcome;
    use std::sync::Arc;
    use std::time::Duration;

    fn row(name: &str, category: Category, outcome: Outcome) -> TestResult {
        TestResult::new(name, category, Duration::ZERO, outcome)
    }

    #[test]
    fn test_pass_rate_of_empty_set_is_zero() {
        let counts = StatusCounts::default();
        assert_eq!(counts.total(), 0);
        assert_eq!(counts.pass_rate(), 0.0);
    }

    #[test]
    fn test_counters_follow_inserts() {
        let recorder = ResultRecorder::new();
        recorder.record(row("a", Category::Api, Outcome::pass("ok")));
        recorder.record(row("b", Category::Api, Outcome::mismatch("bad", 200, 500)));
        recorder.record(row("c", Category::Security, Outcome::skip("no token")));

        let counts = recorder.counts();
        assert_eq!(counts.passed, 1);
        assert_eq!(counts.failed, 1);
        assert_eq!(counts.skipped, 1);
        assert_eq!(counts.total(), 3);

        let categories = recorder.category_counts();
        assert_eq!(categories[&Category::Api].total(), 2);
        assert_eq!(categories[&Category::Security].skipped, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_inserts_are_not_lost() {
        let recorder = Arc::new(ResultRecorder::new());
        let mut handles = Vec::new();
        for task in 0..16 {
            let recorder = recorder.clone();
            handles.push(tokio::spawn(async move {
                for i in 0..50 {
                    recorder.record(row(
                        &format!("t{}-{}", task, i),
                        Category::Api,
                        Outcome::pass("ok"),
                    ));
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let snapshot = recorder.snapshot();
        assert_eq!(snapshot.results.len(), 800);
        assert_eq!(snapshot.by_status.passed, 800);
    }

    #[tokio::test]
    async fn test_emits_running_counts() {
        let (emitter, mut rx) = EventEmitter::new();
        let recorder = ResultRecorder::with_emitter(emitter);
        recorder.record(row("a", Category::Api, Outcome::pass("ok")));

        match rx.recv().await.unwrap() {
            TestEvent::ResultRecorded { result, counts } => {
                assert_eq!(result.name(), "a");
                assert_eq!(counts.passed, 1);
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }
}
