use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Final status of a single test case
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "UPPERCASE")]
pub enum TestStatus {
    Pass,
    Fail,
    Skip,
    Error,
}

impl TestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TestStatus::Pass => "PASS",
            TestStatus::Fail => "FAIL",
            TestStatus::Skip => "SKIP",
            TestStatus::Error => "ERROR",
        }
    }

    /// FAIL and ERROR rows are listed in the report's failure section
    pub fn is_failure(&self) -> bool {
        matches!(self, TestStatus::Fail | TestStatus::Error)
    }
}

impl fmt::Display for TestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Closed set of result categories, plus one escape value for suite-defined ones
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Category {
    Authentication,
    Api,
    Database,
    Realtime,
    Frontend,
    Performance,
    Security,
    DataIntegrity,
    Infrastructure,
    Other(String),
}

impl Category {
    pub fn label(&self) -> &str {
        match self {
            Category::Authentication => "Authentication",
            Category::Api => "API",
            Category::Database => "Database",
            Category::Realtime => "Real-time",
            Category::Frontend => "Frontend",
            Category::Performance => "Performance",
            Category::Security => "Security",
            Category::DataIntegrity => "Data Integrity",
            Category::Infrastructure => "Infrastructure",
            Category::Other(name) => name,
        }
    }
}

impl Default for Category {
    fn default() -> Self {
        Category::Api
    }
}

impl From<String> for Category {
    fn from(value: String) -> Self {
        let normalized: String = value
            .chars()
            .filter(|c| c.is_alphanumeric())
            .collect::<String>()
            .to_lowercase();
        match normalized.as_str() {
            "authentication" | "auth" => Category::Authentication,
            "api" => Category::Api,
            "database" | "db" => Category::Database,
            "realtime" | "websocket" => Category::Realtime,
            "frontend" => Category::Frontend,
            "performance" => Category::Performance,
            "security" => Category::Security,
            "dataintegrity" | "integrity" => Category::DataIntegrity,
            "infrastructure" => Category::Infrastructure,
            _ => Category::Other(value),
        }
    }
}

impl From<Category> for String {
    fn from(value: Category) -> Self {
        value.label().to_string()
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Why a test did not pass
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailureKind {
    /// The call never reached the service (sentinel status 0)
    TransportFailure,
    /// The service answered, but not as expected
    AssertionMismatch,
    /// A prerequisite (token, created entity) was missing
    EnvironmentalSkip,
    /// The channel connected but no reply arrived in time
    ProtocolTimeout,
    /// The harness itself failed while running the case
    HarnessFailure,
    /// The case was started and then cancelled by the operator
    Interrupted,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::TransportFailure => "TRANSPORT_FAILURE",
            FailureKind::AssertionMismatch => "ASSERTION_MISMATCH",
            FailureKind::EnvironmentalSkip => "ENVIRONMENTAL_SKIP",
            FailureKind::ProtocolTimeout => "PROTOCOL_TIMEOUT",
            FailureKind::HarnessFailure => "HARNESS_FAILURE",
            FailureKind::Interrupted => "INTERRUPTED",
        }
    }
}

/// Tagged outcome of one executed case. Converted into a [`TestResult`] exactly once.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Pass {
        details: String,
    },
    Fail {
        kind: FailureKind,
        details: String,
        expected: Option<serde_json::Value>,
        actual: Option<serde_json::Value>,
    },
    Skip {
        reason: String,
    },
    Error {
        kind: FailureKind,
        details: String,
        error: String,
    },
}

impl Outcome {
    pub fn pass(details: impl Into<String>) -> Self {
        Outcome::Pass {
            details: details.into(),
        }
    }

    pub fn mismatch(
        details: impl Into<String>,
        expected: impl Into<serde_json::Value>,
        actual: impl Into<serde_json::Value>,
    ) -> Self {
        Outcome::Fail {
            kind: FailureKind::AssertionMismatch,
            details: details.into(),
            expected: Some(expected.into()),
            actual: Some(actual.into()),
        }
    }

    pub fn fail(kind: FailureKind, details: impl Into<String>) -> Self {
        Outcome::Fail {
            kind,
            details: details.into(),
            expected: None,
            actual: None,
        }
    }

    pub fn skip(reason: impl Into<String>) -> Self {
        Outcome::Skip {
            reason: reason.into(),
        }
    }

    pub fn error(kind: FailureKind, details: impl Into<String>, error: impl Into<String>) -> Self {
        Outcome::Error {
            kind,
            details: details.into(),
            error: error.into(),
        }
    }

    pub fn interrupted() -> Self {
        Outcome::error(FailureKind::Interrupted, "interrupted", "run cancelled by operator")
    }

    pub fn status(&self) -> TestStatus {
        match self {
            Outcome::Pass { .. } => TestStatus::Pass,
            Outcome::Fail { .. } => TestStatus::Fail,
            Outcome::Skip { .. } => TestStatus::Skip,
            Outcome::Error { .. } => TestStatus::Error,
        }
    }
}

/// One recorded test row. Immutable once constructed; the status is derived
/// from the [`Outcome`] it was built from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestResult {
    name: String,
    category: Category,
    status: TestStatus,
    duration_ms: u64,
    details: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    target: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    expected: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    actual: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    kind: Option<FailureKind>,
}

impl TestResult {
    pub fn new(name: &str, category: Category, duration: Duration, outcome: Outcome) -> Self {
        let status = outcome.status();
        let mut result = Self {
            name: name.to_string(),
            category,
            status,
            duration_ms: duration.as_millis() as u64,
            details: String::new(),
            target: None,
            expected: None,
            actual: None,
            error: None,
            kind: None,
        };

        match outcome {
            Outcome::Pass { details } => result.details = details,
            Outcome::Fail {
                kind,
                details,
                expected,
                actual,
            } => {
                result.details = details;
                result.kind = Some(kind);
                result.expected = expected;
                result.actual = actual;
            }
            Outcome::Skip { reason } => {
                result.details = reason;
                result.kind = Some(FailureKind::EnvironmentalSkip);
            }
            Outcome::Error {
                kind,
                details,
                error,
            } => {
                result.details = details;
                result.kind = Some(kind);
                result.error = Some(error);
            }
        }

        result
    }

    /// Attach the endpoint, page or channel the case exercised
    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    /// Replace the detail text before the row is recorded
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = details.into();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn category(&self) -> &Category {
        &self.category
    }

    pub fn status(&self) -> TestStatus {
        self.status
    }

    pub fn duration_ms(&self) -> u64 {
        self.duration_ms
    }

    pub fn details(&self) -> &str {
        &self.details
    }

    pub fn target(&self) -> Option<&str> {
        self.target.as_deref()
    }

    pub fn expected(&self) -> Option<&serde_json::Value> {
        self.expected.as_ref()
    }

    pub fn actual(&self) -> Option<&serde_json::Value> {
        self.actual.as_ref()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn kind(&self) -> Option<FailureKind> {
        self.kind
    }
}
