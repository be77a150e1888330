use crate::runner::state::Category;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// A complete validation suite: what every phase of the run exercises
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuiteDefinition {
    #[serde(default)]
    pub name: Option<String>,

    /// Registration and login chain; captures `auth_token` / `admin_token`
    #[serde(default)]
    pub auth: Option<WorkflowSpec>,

    /// Independent endpoint checks swept through the batch scheduler
    #[serde(default)]
    pub endpoints: Vec<TestCase>,

    #[serde(default)]
    pub workflows: Vec<WorkflowSpec>,

    #[serde(default)]
    pub realtime: Option<RealtimeSpec>,

    #[serde(default)]
    pub pages: Option<PageSpec>,

    #[serde(default)]
    pub performance: Option<PerformanceSpec>,

    #[serde(default)]
    pub security: Option<SecuritySpec>,

    #[serde(default)]
    pub integrity: Option<IntegritySpec>,
}

/// Which bearer credential a case sends
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthMode {
    /// The run's current user token, if any
    #[default]
    Inherit,
    /// No credential at all
    Anonymous,
    /// The admin session token
    Admin,
}

/// Assertion on the response body, checked after the status matched
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum BodyCheck {
    /// A JSON pointer must resolve, e.g. `/token`
    HasField { pointer: String },
    /// At least one of `pointers` must resolve to a non-null value
    HasAnyField { pointers: Vec<String> },
    /// The array at `pointer` must hold an object whose `field` equals `value`
    ListContains {
        pointer: String,
        field: String,
        value: String,
    },
}

/// One request and its expectation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestCase {
    pub name: String,

    #[serde(default = "default_method")]
    pub method: String,

    /// Absolute URL or a path relative to the API base
    pub path: String,

    /// Expected status code
    #[serde(default = "default_status")]
    pub status: u16,

    #[serde(default)]
    pub check: Option<BodyCheck>,

    #[serde(default)]
    pub auth: AuthMode,

    #[serde(default)]
    pub body: Option<Value>,

    #[serde(default)]
    pub query: BTreeMap<String, String>,

    #[serde(default)]
    pub headers: BTreeMap<String, String>,

    #[serde(default)]
    pub category: Option<Category>,
}

fn default_method() -> String {
    "GET".to_string()
}

fn default_status() -> u16 {
    200
}

impl TestCase {
    pub fn get(name: &str, path: &str) -> Self {
        Self::new(name, "GET", path)
    }

    pub fn new(name: &str, method: &str, path: &str) -> Self {
        Self {
            name: name.to_string(),
            method: method.to_string(),
            path: path.to_string(),
            status: default_status(),
            check: None,
            auth: AuthMode::default(),
            body: None,
            query: BTreeMap::new(),
            headers: BTreeMap::new(),
            category: None,
        }
    }

    pub fn expect(mut self, status: u16) -> Self {
        self.status = status;
        self
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn with_query(mut self, key: &str, value: &str) -> Self {
        self.query.insert(key.to_string(), value.to_string());
        self
    }

    pub fn with_header(mut self, key: &str, value: &str) -> Self {
        self.headers.insert(key.to_string(), value.to_string());
        self
    }

    pub fn with_auth(mut self, auth: AuthMode) -> Self {
        self.auth = auth;
        self
    }

    pub fn with_check(mut self, check: BodyCheck) -> Self {
        self.check = Some(check);
        self
    }

    pub fn with_category(mut self, category: Category) -> Self {
        self.category = Some(category);
        self
    }

    /// The case's own category, falling back to `default`
    pub fn category_or(&self, default: Category) -> Category {
        self.category.clone().unwrap_or(default)
    }
}

/// Parse an HTTP verb, accepting only the standard request methods
pub fn parse_method(method: &str) -> Option<reqwest::Method> {
    match method.to_ascii_uppercase().as_str() {
        "GET" => Some(reqwest::Method::GET),
        "POST" => Some(reqwest::Method::POST),
        "PUT" => Some(reqwest::Method::PUT),
        "PATCH" => Some(reqwest::Method::PATCH),
        "DELETE" => Some(reqwest::Method::DELETE),
        "HEAD" => Some(reqwest::Method::HEAD),
        "OPTIONS" => Some(reqwest::Method::OPTIONS),
        _ => None,
    }
}

/// Copy a value out of the response into the run's variables
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Capture {
    /// Variable name; `auth_token` and `admin_token` also set the session tokens
    pub key: String,
    /// JSON pointers tried in order, first hit wins
    pub from: Vec<String>,
}

/// One step of a dependency-chained workflow
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowStep {
    #[serde(flatten)]
    pub case: TestCase,

    /// Variables that must exist before the step is attempted
    #[serde(default)]
    pub requires: Vec<String>,

    #[serde(default)]
    pub capture: Vec<Capture>,

    /// Delay before the step, for eventually-consistent reads
    #[serde(default)]
    pub settle_ms: Option<u64>,

    /// Run even when the previous step did not pass
    #[serde(default)]
    pub independent: bool,
}

impl WorkflowStep {
    pub fn new(case: TestCase) -> Self {
        Self {
            case,
            requires: Vec::new(),
            capture: Vec::new(),
            settle_ms: None,
            independent: false,
        }
    }

    pub fn requires(mut self, key: &str) -> Self {
        self.requires.push(key.to_string());
        self
    }

    pub fn capture(mut self, key: &str, from: &[&str]) -> Self {
        self.capture.push(Capture {
            key: key.to_string(),
            from: from.iter().map(|s| s.to_string()).collect(),
        });
        self
    }

    pub fn independent(mut self) -> Self {
        self.independent = true;
        self
    }

    pub fn settle(mut self, ms: u64) -> Self {
        self.settle_ms = Some(ms);
        self
    }
}

/// Sequential, stateful chain of steps
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowSpec {
    pub name: String,

    #[serde(default)]
    pub category: Option<Category>,

    /// Skip every step when no user token is held
    #[serde(default)]
    pub requires_auth: bool,

    /// Variables evaluated once when the workflow starts
    #[serde(default)]
    pub vars: BTreeMap<String, String>,

    pub steps: Vec<WorkflowStep>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RealtimeSpec {
    #[serde(default = "default_ws_path")]
    pub path: String,

    /// Query parameter carrying the user token
    #[serde(default = "default_token_param")]
    pub token_param: String,

    pub message: Value,

    #[serde(default = "default_reply_wait_ms")]
    pub reply_wait_ms: u64,
}

fn default_ws_path() -> String {
    "/ws".to_string()
}

fn default_token_param() -> String {
    "token".to_string()
}

fn default_reply_wait_ms() -> u64 {
    5000
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageSpec {
    pub routes: Vec<String>,

    /// A page must contain at least one marker to count as rendered
    #[serde(default)]
    pub markers: Vec<String>,

    #[serde(default = "default_min_bytes")]
    pub min_bytes: usize,
}

fn default_min_bytes() -> usize {
    1000
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceSpec {
    #[serde(default)]
    pub timed: Vec<TimedEndpoint>,

    #[serde(default)]
    pub load: Option<LoadSpec>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimedEndpoint {
    pub path: String,

    #[serde(default = "default_samples")]
    pub samples: usize,

    #[serde(default = "default_max_avg_ms")]
    pub max_avg_ms: u64,

    #[serde(default = "default_max_peak_ms")]
    pub max_peak_ms: u64,
}

fn default_samples() -> usize {
    5
}

fn default_max_avg_ms() -> u64 {
    1000
}

fn default_max_peak_ms() -> u64 {
    2000
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadSpec {
    pub path: String,

    #[serde(default = "default_load_calls")]
    pub calls: usize,

    #[serde(default = "default_status")]
    pub status: u16,

    /// Fraction of calls that must return `status`
    #[serde(default = "default_min_success_ratio")]
    pub min_success_ratio: f64,
}

fn default_load_calls() -> usize {
    20
}

fn default_min_success_ratio() -> f64 {
    0.9
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecuritySpec {
    #[serde(default)]
    pub injection: Option<InjectionSpec>,

    /// Path probed without a token and with an invalid one, expecting 401
    #[serde(default)]
    pub protected_path: Option<String>,

    #[serde(default = "default_invalid_token")]
    pub invalid_token: String,

    #[serde(default)]
    pub rate_limit: Option<RateLimitSpec>,
}

fn default_invalid_token() -> String {
    "invalid_token_12345".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InjectionSpec {
    pub path: String,

    /// Query parameter the payload is placed in
    pub param: String,

    #[serde(default = "default_status")]
    pub status: u16,

    #[serde(default)]
    pub sql: Vec<String>,

    #[serde(default)]
    pub xss: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitSpec {
    pub path: String,

    #[serde(default = "default_burst")]
    pub burst: usize,

    #[serde(default = "default_throttled_status")]
    pub throttled_status: u16,

    #[serde(default = "default_min_throttled")]
    pub min_throttled: usize,
}

fn default_burst() -> usize {
    200
}

fn default_throttled_status() -> u16 {
    429
}

fn default_min_throttled() -> usize {
    1
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntegritySpec {
    /// Malformed payloads the service should reject
    #[serde(default)]
    pub invalid_inputs: Vec<TestCase>,

    #[serde(default)]
    pub consistency: Option<WorkflowSpec>,
}
