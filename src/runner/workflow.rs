use super::case::CaseRunner;
use super::state::{Category, Outcome, TestResult, TestStatus};
use crate::parser::types::{WorkflowSpec, WorkflowStep};
use serde_json::Value;
use std::collections::HashSet;
use std::time::{Duration, Instant};

/// Tally of one workflow run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkflowSummary {
    pub executed: usize,
    pub passed: usize,
    pub skipped: usize,
    /// The run was cancelled before every step was reached
    pub interrupted: bool,
}

/// Executes dependency-chained steps one at a time.
///
/// A step runs only when the previous step passed (unless it is marked
/// independent) and every key it `requires` is available. A key that some
/// step of the workflow captures is available only once a passing step of
/// the current run captured it; values left in the context by earlier runs
/// do not count. Otherwise the step is recorded as SKIP naming the missing
/// prerequisite and is never attempted; the skip carries through to every
/// dependent step.
pub struct WorkflowRunner {
    runner: CaseRunner,
}

impl WorkflowRunner {
    pub fn new(runner: CaseRunner) -> Self {
        Self { runner }
    }

    pub async fn run(&self, workflow: &WorkflowSpec) -> WorkflowSummary {
        let ctx = self.runner.context().clone();
        let default_category = workflow.category.clone().unwrap_or(Category::Api);
        let mut summary = WorkflowSummary::default();

        log::info!("Workflow '{}' ({} steps)", workflow.name, workflow.steps.len());

        for (key, value) in &workflow.vars {
            let resolved = ctx.substitute(value);
            ctx.set_var(key, &resolved);
        }

        let auth_block = if workflow.requires_auth && ctx.auth_token().is_none() {
            Some("Skipped - no authentication token".to_string())
        } else {
            None
        };

        // Keys this chain produces itself, and those produced so far in this run
        let chain_keys: HashSet<&str> = workflow
            .steps
            .iter()
            .flat_map(|s| s.capture.iter().map(|c| c.key.as_str()))
            .collect();
        let mut produced: HashSet<String> = HashSet::new();

        // Why the chain is broken at this point, if it is
        let mut broken: Option<String> = None;

        for step in &workflow.steps {
            if ctx.is_cancelled() {
                summary.interrupted = true;
                break;
            }

            let category = step.case.category_or(default_category.clone());

            let missing = step.requires.iter().find(|key| {
                if chain_keys.contains(key.as_str()) {
                    !produced.contains(key.as_str())
                } else {
                    !ctx.has_var(key)
                }
            });

            if let Some(reason) = blocked(step, auth_block.as_ref(), broken.as_ref(), missing) {
                log::debug!("Skipping '{}': {}", step.case.name, reason);
                ctx.recorder().record(TestResult::new(
                    &step.case.name,
                    category,
                    Duration::ZERO,
                    Outcome::skip(reason.clone()),
                ));
                summary.skipped += 1;
                if broken.is_none() {
                    broken = Some(reason);
                }
                continue;
            }

            if let Some(ms) = step.settle_ms {
                let started = Instant::now();
                tokio::select! {
                    _ = tokio::time::sleep(Duration::from_millis(ms)) => {}
                    _ = ctx.cancel_token().cancelled() => {
                        ctx.recorder().record(
                            TestResult::new(&step.case.name, category.clone(), started.elapsed(), Outcome::interrupted())
                                .with_target(&step.case.path),
                        );
                        summary.interrupted = true;
                        break;
                    }
                }
            }

            let outcome = self.runner.run(&step.case, category).await;
            summary.executed += 1;

            if outcome.result.status() == TestStatus::Pass {
                summary.passed += 1;
                if let Some(body) = outcome.response.as_ref().map(|r| &r.body) {
                    produced.extend(self.apply_captures(step, body));
                }
                broken = None;
            } else {
                broken = Some(format!(
                    "Skipped - prerequisite step '{}' did not pass",
                    step.case.name
                ));
            }
        }

        summary
    }

    /// Store the step's captures and return the keys that were found
    fn apply_captures(&self, step: &WorkflowStep, body: &Value) -> Vec<String> {
        let ctx = self.runner.context();
        let mut captured = Vec::new();
        for capture in &step.capture {
            let found = capture
                .from
                .iter()
                .filter_map(|pointer| body.pointer(pointer))
                .find(|v| !v.is_null());

            match found {
                Some(value) => {
                    log::debug!("Captured '{}' from '{}'", capture.key, step.case.name);
                    ctx.capture(&capture.key, value);
                    captured.push(capture.key.clone());
                }
                None => log::warn!(
                    "'{}' passed but produced no '{}' (tried {:?})",
                    step.case.name,
                    capture.key,
                    capture.from
                ),
            }
        }
        captured
    }
}

fn blocked(
    step: &WorkflowStep,
    auth_block: Option<&String>,
    broken: Option<&String>,
    missing: Option<&String>,
) -> Option<String> {
    if let Some(reason) = auth_block {
        return Some(reason.clone());
    }
    if !step.independent {
        if let Some(reason) = broken {
            return Some(reason.clone());
        }
    }
    missing.map(|key| format!("Skipped - missing prerequisite value '{}'", key))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::traits::Response;
    use crate::parser::types::TestCase;
    use crate::runner::state::FailureKind;
    use crate::runner::testing::{case_runner, test_context, MockTransport};
    use serde_json::json;
    use std::collections::BTreeMap;
    use std::sync::Arc;

    fn product_workflow() -> WorkflowSpec {
        WorkflowSpec {
            name: "Products".to_string(),
            category: Some(Category::Database),
            requires_auth: false,
            vars: BTreeMap::new(),
            steps: vec![
                WorkflowStep::new(TestCase::new("Create Product", "POST", "/api/v1/products").expect(201))
                    .capture("product_id", &["/data/_id", "/_id"]),
                WorkflowStep::new(TestCase::new("Update Product", "PUT", "/api/v1/products/${product_id}"))
                    .requires("product_id"),
                WorkflowStep::new(TestCase::new("Delete Product", "DELETE", "/api/v1/products/${product_id}"))
                    .requires("product_id"),
            ],
        }
    }

    #[tokio::test]
    async fn test_chain_threads_captured_id() {
        let transport = MockTransport::new()
            .route("POST", "/api/v1/products", 201, json!({"data": {"_id": "p42"}}))
            .route("PUT", "/api/v1/products/p42", 200, json!({}))
            .route("DELETE", "/api/v1/products/p42", 200, json!({}));
        let ctx = test_context();
        let runner = WorkflowRunner::new(case_runner(transport, ctx.clone()));

        let summary = runner.run(&product_workflow()).await;
        assert_eq!(summary.executed, 3);
        assert_eq!(summary.passed, 3);
        assert_eq!(ctx.get_var("product_id").as_deref(), Some("p42"));
    }

    #[tokio::test]
    async fn test_failed_prerequisite_skips_dependents_transitively() {
        let transport = Arc::new(MockTransport::new().route("POST", "/api/v1/products", 500, json!({})));
        let ctx = test_context();
        let runner = WorkflowRunner::new(case_runner(transport.clone(), ctx.clone()));

        let summary = runner.run(&product_workflow()).await;
        assert_eq!(summary.executed, 1);
        assert_eq!(summary.skipped, 2);
        // Dependents were never attempted
        assert_eq!(transport.calls(), 1);

        let rows = ctx.recorder().snapshot().results;
        assert_eq!(rows[0].status(), TestStatus::Fail);
        for row in &rows[1..] {
            assert_eq!(row.status(), TestStatus::Skip);
            assert_eq!(row.kind(), Some(FailureKind::EnvironmentalSkip));
            assert!(row.details().contains("Create Product"));
        }
    }

    #[tokio::test]
    async fn test_missing_capture_skips_step_naming_key() {
        // Created, but the response carries no id
        let transport = MockTransport::new().route("POST", "/api/v1/products", 201, json!({"ok": true}));
        let ctx = test_context();
        let runner = WorkflowRunner::new(case_runner(transport, ctx.clone()));

        runner.run(&product_workflow()).await;
        let rows = ctx.recorder().snapshot().results;
        assert_eq!(rows[0].status(), TestStatus::Pass);
        assert_eq!(rows[1].status(), TestStatus::Skip);
        assert!(rows[1].details().contains("product_id"));
        assert_eq!(rows[2].status(), TestStatus::Skip);
    }

    #[tokio::test]
    async fn test_value_left_by_earlier_run_does_not_satisfy_requires() {
        let transport = Arc::new(
            MockTransport::new()
                .route_fn("POST", "/items", |_, call| {
                    if call == 0 {
                        Response::new(201, json!({"id": "old"}))
                    } else {
                        Response::new(201, json!({"ok": true}))
                    }
                })
                .route("PUT", "/items/old", 200, json!({})),
        );
        let ctx = test_context();
        let runner = WorkflowRunner::new(case_runner(transport.clone(), ctx.clone()));

        let workflow = WorkflowSpec {
            name: "Items".to_string(),
            category: None,
            requires_auth: false,
            vars: BTreeMap::new(),
            steps: vec![
                WorkflowStep::new(TestCase::new("Create Item", "POST", "/items").expect(201))
                    .capture("item_id", &["/id"]),
                WorkflowStep::new(TestCase::new("Update Item", "PUT", "/items/${item_id}"))
                    .requires("item_id"),
            ],
        };

        runner.run(&workflow).await;
        let second = runner.run(&workflow).await;
        assert_eq!(second.executed, 1);
        assert_eq!(second.skipped, 1);

        let rows = ctx.recorder().snapshot().results;
        let statuses: Vec<TestStatus> = rows.iter().map(|r| r.status()).collect();
        assert_eq!(
            statuses,
            vec![TestStatus::Pass, TestStatus::Pass, TestStatus::Pass, TestStatus::Skip]
        );
        assert!(rows[3].details().contains("item_id"));
        // The stale id was never sent a second time
        assert_eq!(transport.calls(), 3);
    }

    #[tokio::test]
    async fn test_requires_outside_the_chain_reads_context() {
        let transport = Arc::new(MockTransport::new().route("GET", "/shops/s1", 200, json!({})));
        let ctx = test_context();
        ctx.set_var("shop_id", "s1");
        let runner = WorkflowRunner::new(case_runner(transport.clone(), ctx.clone()));

        let workflow = WorkflowSpec {
            name: "Shop".to_string(),
            category: None,
            requires_auth: false,
            vars: BTreeMap::new(),
            steps: vec![WorkflowStep::new(TestCase::get("Get Shop", "/shops/${shop_id}"))
                .requires("shop_id")],
        };

        let summary = runner.run(&workflow).await;
        assert_eq!(summary.passed, 1);
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test]
    async fn test_cancel_during_settle_records_interrupted_step() {
        let transport = Arc::new(
            MockTransport::new().route("POST", "/api/v1/products", 201, json!({"_id": "p1"})),
        );
        let ctx = test_context();
        let runner = WorkflowRunner::new(case_runner(transport.clone(), ctx.clone()));

        let mut workflow = product_workflow();
        workflow.steps[1].settle_ms = Some(30_000);

        let cancel = ctx.cancel_token().clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            cancel.cancel();
        });

        let summary = runner.run(&workflow).await;
        assert!(summary.interrupted);
        assert_eq!(summary.executed, 1);

        let rows = ctx.recorder().snapshot().results;
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].name(), "Update Product");
        assert_eq!(rows[1].status(), TestStatus::Error);
        assert_eq!(rows[1].kind(), Some(FailureKind::Interrupted));
        // Update was never sent
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test]
    async fn test_independent_step_runs_after_failure() {
        let transport = MockTransport::new()
            .route("POST", "/register", 400, json!({"error": "exists"}))
            .route("POST", "/login", 200, json!({"token": "t1"}));
        let ctx = test_context();
        let runner = WorkflowRunner::new(case_runner(transport, ctx.clone()));

        let workflow = WorkflowSpec {
            name: "Auth".to_string(),
            category: Some(Category::Authentication),
            requires_auth: false,
            vars: BTreeMap::new(),
            steps: vec![
                WorkflowStep::new(TestCase::new("Register", "POST", "/register").expect(201)),
                WorkflowStep::new(TestCase::new("Login", "POST", "/login"))
                    .independent()
                    .capture("auth_token", &["/token"]),
            ],
        };

        let summary = runner.run(&workflow).await;
        assert_eq!(summary.executed, 2);
        assert_eq!(ctx.auth_token().as_deref(), Some("t1"));
    }

    #[tokio::test]
    async fn test_requires_auth_skips_every_step_without_token() {
        let transport = Arc::new(MockTransport::new());
        let ctx = test_context();
        let runner = WorkflowRunner::new(case_runner(transport.clone(), ctx.clone()));

        let mut workflow = product_workflow();
        workflow.requires_auth = true;

        let summary = runner.run(&workflow).await;
        assert_eq!(summary.skipped, 3);
        assert_eq!(transport.calls(), 0);
        assert!(ctx
            .recorder()
            .snapshot()
            .results
            .iter()
            .all(|r| r.details().contains("authentication token")));
    }

    #[tokio::test]
    async fn test_workflow_vars_are_evaluated_once() {
        let transport = Arc::new(
            MockTransport::new()
                .route("POST", "/api/v1/products", 201, json!({}))
                .route("GET", "/api/v1/products", 200, json!({"data": []})),
        );
        let ctx = test_context();
        let runner = WorkflowRunner::new(case_runner(transport.clone(), ctx.clone()));

        let mut vars = BTreeMap::new();
        vars.insert("name".to_string(), "Product ${random}".to_string());
        let workflow = WorkflowSpec {
            name: "Vars".to_string(),
            category: None,
            requires_auth: false,
            vars,
            steps: vec![WorkflowStep::new(
                TestCase::new("Create", "POST", "/api/v1/products")
                    .expect(201)
                    .with_body(json!({"name": "${name}"})),
            )],
        };

        runner.run(&workflow).await;
        let name = ctx.get_var("name").unwrap();
        assert!(name.starts_with("Product "));
        assert_eq!(
            transport.requests()[0].body,
            Some(json!({ "name": name }))
        );
    }

    #[tokio::test]
    async fn test_cancelled_workflow_records_nothing_further() {
        let transport = MockTransport::new();
        let ctx = test_context();
        ctx.cancel_token().cancel();
        let runner = WorkflowRunner::new(case_runner(transport, ctx.clone()));

        let summary = runner.run(&product_workflow()).await;
        assert!(summary.interrupted);
        assert!(ctx.recorder().is_empty());
    }
}
