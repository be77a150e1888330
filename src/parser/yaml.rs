use super::types::{parse_method, SuiteDefinition, TestCase, WorkflowSpec};
use crate::error::SuiteError;
use std::path::Path;

/// Built-in suite for the platform's standard deployment
pub const DEFAULT_SUITE_YAML: &str = include_str!("suites/default.yaml");

/// Parse a suite file from disk
pub fn parse_suite_file(path: &Path) -> Result<SuiteDefinition, SuiteError> {
    let content = std::fs::read_to_string(path).map_err(|source| SuiteError::Read {
        path: path.display().to_string(),
        source,
    })?;

    parse_suite(&content)
}

/// Parse and validate suite YAML
pub fn parse_suite(content: &str) -> Result<SuiteDefinition, SuiteError> {
    let suite: SuiteDefinition = serde_yaml::from_str(content)?;
    validate_suite(&suite)?;
    Ok(suite)
}

/// The embedded default suite
pub fn default_suite() -> Result<SuiteDefinition, SuiteError> {
    parse_suite(DEFAULT_SUITE_YAML)
}

/// Load `path` when given, otherwise the default suite
pub fn load_suite(path: Option<&Path>) -> Result<SuiteDefinition, SuiteError> {
    match path {
        Some(path) => {
            log::info!("Loading suite from {}", path.display());
            parse_suite_file(path)
        }
        None => default_suite(),
    }
}

/// Reject suites that could only fail inside the harness
pub fn validate_suite(suite: &SuiteDefinition) -> Result<(), SuiteError> {
    let mut cases: Vec<&TestCase> = suite.endpoints.iter().collect();

    let mut workflows: Vec<&WorkflowSpec> = suite.workflows.iter().collect();
    workflows.extend(suite.auth.iter());
    if let Some(integrity) = &suite.integrity {
        cases.extend(integrity.invalid_inputs.iter());
        workflows.extend(integrity.consistency.iter());
    }

    for workflow in workflows {
        if workflow.steps.is_empty() {
            return Err(SuiteError::EmptyWorkflow {
                workflow: workflow.name.clone(),
            });
        }
        cases.extend(workflow.steps.iter().map(|s| &s.case));
    }

    for case in cases {
        if parse_method(&case.method).is_none() {
            return Err(SuiteError::InvalidMethod {
                case: case.name.clone(),
                method: case.method.clone(),
            });
        }
    }

    validate_thresholds(suite)
}

fn invalid(field: &str, reason: &str) -> SuiteError {
    SuiteError::InvalidValue {
        field: field.to_string(),
        reason: reason.to_string(),
    }
}

/// Probe thresholds that would make their check pass vacuously
fn validate_thresholds(suite: &SuiteDefinition) -> Result<(), SuiteError> {
    if let Some(rate_limit) = suite.security.as_ref().and_then(|s| s.rate_limit.as_ref()) {
        if rate_limit.burst == 0 {
            return Err(invalid("rateLimit.burst", "must be greater than 0"));
        }
        if rate_limit.min_throttled == 0 {
            return Err(invalid("rateLimit.minThrottled", "must be greater than 0"));
        }
        if rate_limit.min_throttled > rate_limit.burst {
            return Err(invalid("rateLimit.minThrottled", "must not exceed the burst size"));
        }
    }

    if let Some(performance) = &suite.performance {
        if let Some(load) = &performance.load {
            if load.calls == 0 {
                return Err(invalid("load.calls", "must be greater than 0"));
            }
            if !(0.0..=1.0).contains(&load.min_success_ratio) {
                return Err(invalid("load.minSuccessRatio", "must be between 0 and 1"));
            }
        }
        if let Some(timed) = performance.timed.iter().find(|t| t.samples == 0) {
            return Err(SuiteError::InvalidValue {
                field: "timed.samples".to_string(),
                reason: format!("must be greater than 0 for {}", timed.path),
            });
        }
    }

    Ok(())
}
