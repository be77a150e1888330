use anyhow::Result;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;

/// Status reserved for "the call never reached the target"
pub const SENTINEL_STATUS: u16 = 0;

/// Normalized answer from the transport: a real status code and the parsed
/// body, or [`SENTINEL_STATUS`] with an `{"error": ...}` payload.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub status: u16,
    pub body: Value,
}

impl Response {
    pub fn new(status: u16, body: Value) -> Self {
        Self { status, body }
    }

    /// Sentinel response for a call that never completed
    pub fn transport_failure(error: impl std::fmt::Display) -> Self {
        Self {
            status: SENTINEL_STATUS,
            body: json!({ "error": error.to_string() }),
        }
    }

    /// Whether the service actually answered
    pub fn reached(&self) -> bool {
        self.status != SENTINEL_STATUS
    }

    /// Error text carried by a sentinel response
    pub fn error_text(&self) -> Option<String> {
        if self.reached() {
            return None;
        }
        Some(
            self.body
                .get("error")
                .and_then(|e| e.as_str())
                .map(str::to_string)
                .unwrap_or_else(|| self.body.to_string()),
        )
    }

    /// Raw text of a non-JSON body
    pub fn text(&self) -> Option<&str> {
        match &self.body {
            Value::String(s) => Some(s),
            other => other.get("text").and_then(|t| t.as_str()),
        }
    }
}

/// One fully-resolved network call
#[derive(Debug, Clone)]
pub struct TransportRequest {
    pub method: reqwest::Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
}

impl TransportRequest {
    pub fn new(method: reqwest::Method, url: &str) -> Self {
        Self {
            method,
            url: url.to_string(),
            headers: Vec::new(),
            query: Vec::new(),
            body: None,
        }
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Request/response transport. Never fails across this boundary: transport
/// problems come back as a [`SENTINEL_STATUS`] response.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn request(&self, request: TransportRequest) -> Response;
}

/// One open bidirectional channel
#[async_trait]
pub trait RealtimeChannel: Send {
    async fn send(&mut self, text: &str) -> Result<()>;

    /// Wait up to `wait` for the next text message. `Ok(None)` means the wait elapsed.
    async fn receive(&mut self, wait: Duration) -> Result<Option<String>>;

    async fn close(&mut self) -> Result<()>;
}

/// Opens realtime channels
#[async_trait]
pub trait ChannelConnector: Send + Sync {
    async fn open(&self, url: &str) -> Result<Box<dyn RealtimeChannel>>;
}

/// A rendered frontend page
#[derive(Debug, Clone)]
pub struct RenderedPage {
    pub status: u16,
    pub content: String,
}

/// Fetches and renders frontend pages
#[async_trait]
pub trait PageRenderer: Send + Sync {
    async fn render(&self, url: &str) -> Result<RenderedPage>;

    /// Release whatever the renderer holds open (browser processes, pages)
    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// Binary health check for a backing store
#[async_trait]
pub trait ReachabilityProbe: Send + Sync {
    /// Display name, e.g. "MongoDB"
    fn name(&self) -> &str;

    /// Address being probed
    fn target(&self) -> &str;

    async fn ping(&self) -> Result<()>;
}
