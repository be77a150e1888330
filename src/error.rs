//! Error types for the harness itself.
//!
//! Test outcomes are never errors: a failing check is an [`Outcome`](crate::runner::state::Outcome)
//! value. The types here cover what can stop the harness from running at all.

/// Top-level harness error
#[derive(Debug, thiserror::Error)]
pub enum HarnessError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("suite error: {0}")]
    Suite(#[from] SuiteError),

    #[error("report sink error: {0}")]
    Sink(#[from] SinkError),

    #[error(transparent)]
    Driver(#[from] anyhow::Error),
}

/// Configuration errors, raised before any test executes
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("config file not found: {path}")]
    FileNotFound { path: String },

    #[error("failed to parse config: {reason}")]
    ParseFailed { reason: String },

    #[error("invalid config value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}

/// Suite definition errors
#[derive(Debug, thiserror::Error)]
pub enum SuiteError {
    #[error("failed to read suite file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse suite: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("invalid HTTP method '{method}' in case '{case}'")]
    InvalidMethod { case: String, method: String },

    #[error("workflow '{workflow}' has no steps")]
    EmptyWorkflow { workflow: String },

    #[error("invalid suite value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}

/// Durable report persistence errors
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to serialize report: {0}")]
    Serialize(#[from] serde_json::Error),
}
