use super::recorder::ResultRecorder;
use crate::utils::TestConfig;
use rand::Rng;
use regex::Regex;
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};
use tokio::sync::{RwLock, RwLockReadGuard};
use tokio_util::sync::CancellationToken;

/// Capturing this variable sets the user session token
pub const AUTH_TOKEN_VAR: &str = "auth_token";

/// Capturing this variable sets the admin session token
pub const ADMIN_TOKEN_VAR: &str = "admin_token";

#[derive(Debug, Default)]
struct Session {
    auth_token: Option<String>,
    admin_token: Option<String>,
    vars: HashMap<String, String>,
}

/// Shared state of one run: session tokens, variables captured by workflow
/// steps, the result recorder and the cancellation token.
pub struct RunContext {
    config: Arc<TestConfig>,
    recorder: Arc<ResultRecorder>,
    cancel: CancellationToken,
    session: Mutex<Session>,
    /// Batches hold it shared; token swaps hold it exclusively
    auth_gate: RwLock<()>,
}

impl RunContext {
    pub fn new(
        config: Arc<TestConfig>,
        recorder: Arc<ResultRecorder>,
        cancel: CancellationToken,
    ) -> Self {
        let mut vars = HashMap::new();
        vars.insert("user_email".to_string(), config.user().email.clone());
        vars.insert("user_password".to_string(), config.user().password.clone());
        vars.insert("admin_email".to_string(), config.admin().email.clone());
        vars.insert("admin_password".to_string(), config.admin().password.clone());

        Self {
            config,
            recorder,
            cancel,
            session: Mutex::new(Session {
                vars,
                ..Default::default()
            }),
            auth_gate: RwLock::new(()),
        }
    }

    pub fn config(&self) -> &TestConfig {
        &self.config
    }

    pub fn recorder(&self) -> &Arc<ResultRecorder> {
        &self.recorder
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    fn session(&self) -> MutexGuard<'_, Session> {
        self.session
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn auth_token(&self) -> Option<String> {
        self.session().auth_token.clone()
    }

    pub fn set_auth_token(&self, token: Option<String>) {
        self.session().auth_token = token;
    }

    pub fn admin_token(&self) -> Option<String> {
        self.session().admin_token.clone()
    }

    pub fn set_admin_token(&self, token: Option<String>) {
        self.session().admin_token = token;
    }

    /// Get a variable
    pub fn get_var(&self, name: &str) -> Option<String> {
        self.session().vars.get(name).cloned()
    }

    pub fn has_var(&self, name: &str) -> bool {
        self.session().vars.contains_key(name)
    }

    /// Set a variable. The session token variables also update the tokens.
    pub fn set_var(&self, name: &str, value: &str) {
        let mut session = self.session();
        match name {
            AUTH_TOKEN_VAR => session.auth_token = Some(value.to_string()),
            ADMIN_TOKEN_VAR => session.admin_token = Some(value.to_string()),
            _ => {}
        }
        session.vars.insert(name.to_string(), value.to_string());
    }

    /// Store a JSON value; strings are stored without quotes
    pub fn capture(&self, name: &str, value: &Value) {
        match value {
            Value::String(s) => self.set_var(name, s),
            other => self.set_var(name, &other.to_string()),
        }
    }

    /// Shared side of the auth gate, held by every scheduler batch
    pub async fn batch_guard(&self) -> RwLockReadGuard<'_, ()> {
        self.auth_gate.read().await
    }

    /// Run `fut` with the user token temporarily replaced by `token`.
    ///
    /// Holds the auth gate exclusively, so no batch is in flight while the
    /// swapped token is visible. Must not be called from inside a batch.
    /// The previous token is restored on every exit path.
    pub async fn with_token<F, T>(&self, token: Option<String>, fut: F) -> T
    where
        F: Future<Output = T>,
    {
        let _gate = self.auth_gate.write().await;
        let previous = std::mem::replace(&mut self.session().auth_token, token);
        let _restore = RestoreToken {
            ctx: self,
            previous: Some(previous),
        };
        fut.await
    }

    /// Substitute `${name}` or `${name.json.path}` patterns in a string
    pub fn substitute(&self, text: &str) -> String {
        static VAR_PATTERN: OnceLock<Regex> = OnceLock::new();
        let re = VAR_PATTERN.get_or_init(|| {
            Regex::new(r"\$\{([a-zA-Z0-9_.]+)\}").expect("variable pattern is valid")
        });

        re.replace_all(text, |caps: &regex::Captures| {
            let full_key = &caps[1];

            if let Some(val) = self.get_var(full_key) {
                return val;
            }

            match full_key {
                "time" => return chrono::Local::now().format("%H:%M:%S").to_string(),
                "date" => return chrono::Local::now().format("%Y-%m-%d").to_string(),
                "timestamp" => return chrono::Utc::now().timestamp().to_string(),
                "random" => return rand::thread_rng().gen_range(1000..10000).to_string(),
                "uuid" => return uuid::Uuid::new_v4().to_string(),
                _ => {}
            }

            // var.json.path: look inside a variable holding JSON
            if let Some((var_name, json_path)) = full_key.split_once('.') {
                if let Some(json_str) = self.get_var(var_name) {
                    if let Ok(value) = serde_json::from_str::<Value>(&json_str) {
                        let pointer = format!("/{}", json_path.replace('.', "/"));
                        if let Some(target) = value.pointer(&pointer) {
                            if let Some(s) = target.as_str() {
                                return s.to_string();
                            }
                            return target.to_string();
                        }
                    }
                }
            }

            // Unknown: keep as written
            format!("${{{}}}", full_key)
        })
        .to_string()
    }

    /// Substitute every string inside a JSON value
    pub fn substitute_value(&self, value: &Value) -> Value {
        match value {
            Value::String(s) => Value::String(self.substitute(s)),
            Value::Array(items) => {
                Value::Array(items.iter().map(|v| self.substitute_value(v)).collect())
            }
            Value::Object(map) => Value::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), self.substitute_value(v)))
                    .collect(),
            ),
            other => other.clone(),
        }
    }
}

struct RestoreToken<'a> {
    ctx: &'a RunContext,
    previous: Option<Option<String>>,
}

impl Drop for RestoreToken<'_> {
    fn drop(&mut self) {
        if let Some(previous) = self.previous.take() {
            self.ctx.session().auth_token = previous;
        }
    }
}
