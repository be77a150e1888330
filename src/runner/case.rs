use super::context::RunContext;
use super::executor::RequestExecutor;
use super::state::{Category, FailureKind, Outcome, TestResult};
use crate::driver::traits::Response;
use crate::parser::types::{BodyCheck, TestCase};
use serde_json::{json, Value};
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;

/// Result of one executed case plus the response it was judged on
#[derive(Debug, Clone)]
pub struct CaseOutcome {
    pub result: TestResult,
    /// `None` when the request was never sent
    pub response: Option<Response>,
}

/// Runs exactly one test case and classifies its outcome
#[derive(Clone)]
pub struct CaseRunner {
    executor: RequestExecutor,
}

impl CaseRunner {
    pub fn new(executor: RequestExecutor) -> Self {
        Self { executor }
    }

    pub fn executor(&self) -> &RequestExecutor {
        &self.executor
    }

    pub fn context(&self) -> &Arc<RunContext> {
        self.executor.context()
    }

    /// Execute `case` without recording it. Cancellation while the call is
    /// in flight yields an interrupted ERROR row.
    pub async fn execute(&self, case: &TestCase, category: Category) -> CaseOutcome {
        let started = Instant::now();
        let cancel = self.context().cancel_token().clone();

        tokio::select! {
            biased;
            outcome = self.execute_inner(case, category.clone()) => outcome,
            _ = cancel.cancelled() => CaseOutcome {
                result: TestResult::new(&case.name, category, started.elapsed(), Outcome::interrupted())
                    .with_target(&case.path),
                response: None,
            },
        }
    }

    async fn execute_inner(&self, case: &TestCase, category: Category) -> CaseOutcome {
        let started = Instant::now();

        let request = match self.executor.build(case) {
            Ok(request) => request,
            Err(e) => {
                return CaseOutcome {
                    result: TestResult::new(
                        &case.name,
                        category,
                        started.elapsed(),
                        Outcome::error(FailureKind::HarnessFailure, "Case could not be built", e),
                    )
                    .with_target(&case.path),
                    response: None,
                }
            }
        };

        let target = format!("{} {}", request.method, request.url);
        let response = self.executor.send(request).await;
        let outcome = self.evaluate(case, &response);

        CaseOutcome {
            result: TestResult::new(&case.name, category, started.elapsed(), outcome)
                .with_target(target),
            response: Some(response),
        }
    }

    /// Execute `case` and hand its row to the recorder
    pub async fn run(&self, case: &TestCase, category: Category) -> CaseOutcome {
        let outcome = self.execute(case, category).await;
        self.context().recorder().record(outcome.result.clone());
        outcome
    }

    /// Compare a response against the case's expectation
    pub fn evaluate(&self, case: &TestCase, response: &Response) -> Outcome {
        if let Some(error) = response.error_text() {
            return Outcome::error(
                FailureKind::TransportFailure,
                format!("Request failed: {}", error),
                error,
            );
        }

        if response.status != case.status {
            return Outcome::mismatch(
                format!(
                    "Expected status {}, got {}",
                    case.status, response.status
                ),
                case.status,
                response.status,
            );
        }

        match &case.check {
            None => Outcome::pass(format!("Status {} as expected", response.status)),
            Some(BodyCheck::HasField { pointer }) => {
                if response.body.pointer(pointer).is_some() {
                    Outcome::pass(format!("Status {} with field {}", response.status, pointer))
                } else {
                    Outcome::mismatch(
                        format!("Response has no field {}", pointer),
                        json!({ "field": pointer }),
                        excerpt(&response.body),
                    )
                }
            }
            Some(BodyCheck::HasAnyField { pointers }) => {
                match pointers
                    .iter()
                    .find(|p| response.body.pointer(p.as_str()).is_some_and(|v| !v.is_null()))
                {
                    Some(pointer) => Outcome::pass(format!(
                        "Status {} with field {}",
                        response.status, pointer
                    )),
                    None => Outcome::mismatch(
                        format!("Response has none of the fields {}", pointers.join(", ")),
                        json!({ "anyOf": pointers }),
                        excerpt(&response.body),
                    ),
                }
            }
            Some(BodyCheck::ListContains {
                pointer,
                field,
                value,
            }) => {
                let wanted = self.context().substitute(value);
                let found = response
                    .body
                    .pointer(pointer)
                    .and_then(|list| list.as_array())
                    .map(|items| {
                        items.iter().any(|item| {
                            item.get(field).and_then(|v| v.as_str()) == Some(wanted.as_str())
                        })
                    })
                    .unwrap_or(false);

                if found {
                    Outcome::pass(format!("Found {} = {} in {}", field, wanted, pointer))
                } else {
                    let mut expected = serde_json::Map::new();
                    expected.insert(field.clone(), Value::String(wanted.clone()));
                    Outcome::mismatch(
                        format!("No entry with {} = {} in {}", field, wanted, pointer),
                        Value::Object(expected),
                        excerpt(&response.body),
                    )
                }
            }
        }
    }
}

/// Bound large bodies before they land in a report row
fn excerpt(body: &Value) -> Value {
    let text = body.to_string();
    if text.len() <= 500 {
        return body.clone();
    }
    let mut end = 500;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    Value::String(format!("{}...", &text[..end]))
}

/// Race `fut` against cancellation; a cancelled case becomes an interrupted ERROR row
pub async fn interruptible<F>(
    cancel: &CancellationToken,
    name: &str,
    category: Category,
    fut: F,
) -> TestResult
where
    F: Future<Output = TestResult>,
{
    let started = Instant::now();
    tokio::select! {
        biased;
        result = fut => result,
        _ = cancel.cancelled() => TestResult::new(name, category, started.elapsed(), Outcome::interrupted()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::state::TestStatus;
    use crate::runner::testing::{case_runner, test_context, MockTransport};
    use std::time::Duration;

    #[tokio::test]
    async fn test_matching_status_passes() {
        let transport = MockTransport::new().route("GET", "/api/health", 200, json!({"ok": true}));
        let runner = case_runner(transport, test_context());

        let outcome = runner
            .run(&TestCase::get("Health", "/api/health"), Category::Api)
            .await;
        assert_eq!(outcome.result.status(), TestStatus::Pass);
        assert_eq!(runner.context().recorder().len(), 1);
    }

    #[tokio::test]
    async fn test_wrong_status_fails_with_expected_and_actual() {
        let transport = MockTransport::new().route("GET", "/api/v1/analytics/dashboard", 200, json!({}));
        let runner = case_runner(transport, test_context());

        let case = TestCase::get("Unauthenticated Access Test", "/api/v1/analytics/dashboard").expect(401);
        let outcome = runner.execute(&case, Category::Security).await;

        let result = outcome.result;
        assert_eq!(result.status(), TestStatus::Fail);
        assert_eq!(result.kind(), Some(FailureKind::AssertionMismatch));
        assert_eq!(result.expected(), Some(&json!(401)));
        assert_eq!(result.actual(), Some(&json!(200)));
        assert!(result.details().contains("401"));
        assert!(result.details().contains("200"));
    }

    #[tokio::test]
    async fn test_sentinel_response_is_error_not_fail() {
        let runner = case_runner(MockTransport::new(), test_context());
        let outcome = runner.execute(&TestCase::get("x", "/down"), Category::Api).await;
        assert_eq!(outcome.result.status(), TestStatus::Error);
        assert_eq!(outcome.result.kind(), Some(FailureKind::TransportFailure));
        assert!(outcome.result.error().is_some());
    }

    #[tokio::test]
    async fn test_invalid_method_is_harness_error() {
        let runner = case_runner(MockTransport::new(), test_context());
        let outcome = runner
            .execute(&TestCase::new("x", "FETCH", "/x"), Category::Api)
            .await;
        assert_eq!(outcome.result.status(), TestStatus::Error);
        assert_eq!(outcome.result.kind(), Some(FailureKind::HarnessFailure));
        assert!(outcome.response.is_none());
    }

    #[tokio::test]
    async fn test_body_checks() {
        let transport = MockTransport::new()
            .route("POST", "/login", 200, json!({"token": "t"}))
            .route("GET", "/products", 200, json!({"data": [{"name": "A"}, {"name": "B"}]}));
        let ctx = test_context();
        ctx.set_var("wanted", "B");
        let runner = case_runner(transport, ctx);

        let has_token = TestCase::new("login", "POST", "/login").with_check(BodyCheck::HasField {
            pointer: "/token".to_string(),
        });
        assert_eq!(
            runner.execute(&has_token, Category::Api).await.result.status(),
            TestStatus::Pass
        );

        let contains = |value: &str| {
            TestCase::get("list", "/products").with_check(BodyCheck::ListContains {
                pointer: "/data".to_string(),
                field: "name".to_string(),
                value: value.to_string(),
            })
        };
        assert_eq!(
            runner.execute(&contains("${wanted}"), Category::Api).await.result.status(),
            TestStatus::Pass
        );
        assert_eq!(
            runner.execute(&contains("C"), Category::Api).await.result.status(),
            TestStatus::Fail
        );
    }

    #[tokio::test]
    async fn test_any_field_check_accepts_nested_token() {
        let transport = MockTransport::new()
            .route("POST", "/login", 200, json!({"data": {"token": "t"}}))
            .route("POST", "/login-empty", 200, json!({"token": null}));
        let runner = case_runner(transport, test_context());
        let check = BodyCheck::HasAnyField {
            pointers: vec!["/token".to_string(), "/data/token".to_string()],
        };

        let nested = TestCase::new("login", "POST", "/login").with_check(check.clone());
        let result = runner.execute(&nested, Category::Authentication).await.result;
        assert_eq!(result.status(), TestStatus::Pass);
        assert!(result.details().contains("/data/token"));

        let empty = TestCase::new("login", "POST", "/login-empty").with_check(check);
        let result = runner.execute(&empty, Category::Authentication).await.result;
        assert_eq!(result.status(), TestStatus::Fail);
        assert_eq!(result.kind(), Some(FailureKind::AssertionMismatch));
    }

    #[tokio::test]
    async fn test_cancellation_records_interrupted_error() {
        let transport = MockTransport::new().route_delayed(
            "GET",
            "/slow",
            200,
            json!({}),
            Duration::from_secs(30),
        );
        let ctx = test_context();
        let runner = case_runner(transport, ctx.clone());

        let cancel = ctx.cancel_token().clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            cancel.cancel();
        });

        let outcome = runner.run(&TestCase::get("slow", "/slow"), Category::Api).await;
        assert_eq!(outcome.result.status(), TestStatus::Error);
        assert_eq!(outcome.result.kind(), Some(FailureKind::Interrupted));
        assert_eq!(outcome.result.details(), "interrupted");
        assert_eq!(ctx.recorder().len(), 1);
    }
}
