use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Login credentials for one account on the target platform
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

impl Credentials {
    pub fn new(email: &str, password: &str) -> Self {
        Self {
            email: email.to_string(),
            password: password.to_string(),
        }
    }
}

/// Run parameters, resolved once before the run starts.
///
/// Layering is defaults, then an optional YAML file, then `LUMI_E2E_*`
/// environment variables, then CLI overrides. Once [`TestConfig::validate`]
/// succeeds the config is shared read-only for the whole run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TestConfig {
    api_base_url: String,
    frontend_base_url: String,
    realtime_base_url: String,
    timeout_secs: u64,
    max_concurrency: usize,
    user: Credentials,
    admin: Credentials,
    output_dir: PathBuf,
    run_id: Option<String>,
    document_store: Option<String>,
    cache_store: Option<String>,
    browser: bool,
    rate_limit_burst: Option<usize>,
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            api_base_url: "http://localhost:5000".to_string(),
            frontend_base_url: "http://localhost:3000".to_string(),
            realtime_base_url: "ws://localhost:5000".to_string(),
            timeout_secs: 30,
            max_concurrency: 10,
            user: Credentials::new("test@mewayz.com", "TestPassword123!"),
            admin: Credentials::new("admin@mewayz.com", "AdminPassword123!"),
            output_dir: PathBuf::from("./output"),
            run_id: None,
            document_store: Some("localhost:27017".to_string()),
            cache_store: Some("localhost:6379".to_string()),
            browser: false,
            rate_limit_burst: None,
        }
    }
}

/// Values supplied on the command line. `None` keeps the lower layer.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub api_base_url: Option<String>,
    pub frontend_base_url: Option<String>,
    pub realtime_base_url: Option<String>,
    pub timeout_secs: Option<u64>,
    pub max_concurrency: Option<usize>,
    pub output_dir: Option<PathBuf>,
    pub run_id: Option<String>,
    pub browser: Option<bool>,
    pub rate_limit_burst: Option<usize>,
}

impl TestConfig {
    /// Load defaults, an optional YAML file and the environment
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config = match path {
            Some(path) => {
                if !path.exists() {
                    return Err(ConfigError::FileNotFound {
                        path: path.display().to_string(),
                    });
                }
                let content =
                    std::fs::read_to_string(path).map_err(|e| ConfigError::ParseFailed {
                        reason: format!("{}: {}", path.display(), e),
                    })?;
                Self::from_yaml_str(&content)?
            }
            None => Self::default(),
        };

        config.apply_env_from(|key| std::env::var(key).ok())
    }

    /// Parse a YAML config document. Missing keys keep their defaults.
    pub fn from_yaml_str(content: &str) -> Result<Self, ConfigError> {
        serde_yaml::from_str(content).map_err(|e| ConfigError::ParseFailed {
            reason: e.to_string(),
        })
    }

    /// Apply `LUMI_E2E_*` variables resolved through `lookup`
    pub fn apply_env_from<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("LUMI_E2E_API_URL") {
            self.api_base_url = v;
        }
        if let Some(v) = lookup("LUMI_E2E_FRONTEND_URL") {
            self.frontend_base_url = v;
        }
        if let Some(v) = lookup("LUMI_E2E_REALTIME_URL") {
            self.realtime_base_url = v;
        }
        if let Some(v) = lookup("LUMI_E2E_TIMEOUT_SECS") {
            self.timeout_secs = parse_number("LUMI_E2E_TIMEOUT_SECS", &v)?;
        }
        if let Some(v) = lookup("LUMI_E2E_MAX_CONCURRENCY") {
            self.max_concurrency = parse_number("LUMI_E2E_MAX_CONCURRENCY", &v)?;
        }
        if let Some(v) = lookup("LUMI_E2E_USER_EMAIL") {
            self.user.email = v;
        }
        if let Some(v) = lookup("LUMI_E2E_USER_PASSWORD") {
            self.user.password = v;
        }
        if let Some(v) = lookup("LUMI_E2E_ADMIN_EMAIL") {
            self.admin.email = v;
        }
        if let Some(v) = lookup("LUMI_E2E_ADMIN_PASSWORD") {
            self.admin.password = v;
        }
        Ok(self)
    }

    pub fn with_overrides(mut self, overrides: ConfigOverrides) -> Self {
        if let Some(v) = overrides.api_base_url {
            self.api_base_url = v;
        }
        if let Some(v) = overrides.frontend_base_url {
            self.frontend_base_url = v;
        }
        if let Some(v) = overrides.realtime_base_url {
            self.realtime_base_url = v;
        }
        if let Some(v) = overrides.timeout_secs {
            self.timeout_secs = v;
        }
        if let Some(v) = overrides.max_concurrency {
            self.max_concurrency = v;
        }
        if let Some(v) = overrides.output_dir {
            self.output_dir = v;
        }
        if overrides.run_id.is_some() {
            self.run_id = overrides.run_id;
        }
        if let Some(v) = overrides.browser {
            self.browser = v;
        }
        if overrides.rate_limit_burst.is_some() {
            self.rate_limit_burst = overrides.rate_limit_burst;
        }
        self
    }

    /// Point the data-store probes somewhere else, or disable them with `None`
    pub fn with_stores(mut self, document_store: Option<String>, cache_store: Option<String>) -> Self {
        self.document_store = document_store;
        self.cache_store = cache_store;
        self
    }

    /// Reject values that would make the run meaningless
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.timeout_secs == 0 {
            return Err(invalid("timeoutSecs", "must be greater than zero"));
        }
        if self.max_concurrency == 0 {
            return Err(invalid("maxConcurrency", "must be greater than zero"));
        }
        for (field, value) in [
            ("apiBaseUrl", &self.api_base_url),
            ("frontendBaseUrl", &self.frontend_base_url),
            ("realtimeBaseUrl", &self.realtime_base_url),
        ] {
            if value.trim().is_empty() {
                return Err(invalid(field, "must not be empty"));
            }
        }
        if self.rate_limit_burst == Some(0) {
            return Err(invalid("rateLimitBurst", "must be greater than zero"));
        }
        Ok(())
    }

    pub fn api_base_url(&self) -> &str {
        &self.api_base_url
    }

    pub fn frontend_base_url(&self) -> &str {
        &self.frontend_base_url
    }

    pub fn realtime_base_url(&self) -> &str {
        &self.realtime_base_url
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }

    pub fn user(&self) -> &Credentials {
        &self.user
    }

    pub fn admin(&self) -> &Credentials {
        &self.admin
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn run_id(&self) -> Option<&str> {
        self.run_id.as_deref()
    }

    pub fn document_store(&self) -> Option<&str> {
        self.document_store.as_deref()
    }

    pub fn cache_store(&self) -> Option<&str> {
        self.cache_store.as_deref()
    }

    pub fn browser(&self) -> bool {
        self.browser
    }

    pub fn rate_limit_burst(&self) -> Option<usize> {
        self.rate_limit_burst
    }
}

fn parse_number<T: std::str::FromStr>(field: &str, value: &str) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| invalid(field, &format!("'{}' is not a valid number", value)))
}

fn invalid(field: &str, reason: &str) -> ConfigError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        reason: reason.to_string(),
    }
}
