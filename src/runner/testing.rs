//! Scripted collaborators for unit tests

use super::case::CaseRunner;
use super::context::RunContext;
use super::executor::RequestExecutor;
use super::recorder::ResultRecorder;
use crate::driver::traits::{
    ChannelConnector, PageRenderer, RealtimeChannel, ReachabilityProbe, RenderedPage, Response,
    Transport, TransportRequest,
};
use crate::error::SinkError;
use crate::report::{ReportSink, RunReport};
use crate::utils::{ConfigOverrides, TestConfig};
use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub fn test_config(max_concurrency: usize) -> TestConfig {
    TestConfig::default()
        .with_overrides(ConfigOverrides {
            api_base_url: Some("http://mock.local".to_string()),
            frontend_base_url: Some("http://front.local".to_string()),
            realtime_base_url: Some("ws://mock.local".to_string()),
            timeout_secs: Some(5),
            max_concurrency: Some(max_concurrency),
            ..Default::default()
        })
        .with_stores(None, None)
}

pub fn test_context() -> Arc<RunContext> {
    test_context_with(10)
}

pub fn test_context_with(max_concurrency: usize) -> Arc<RunContext> {
    Arc::new(RunContext::new(
        Arc::new(test_config(max_concurrency)),
        Arc::new(ResultRecorder::new()),
        CancellationToken::new(),
    ))
}

pub fn case_runner(transport: impl Into<Arc<MockTransport>>, ctx: Arc<RunContext>) -> CaseRunner {
    let transport: Arc<MockTransport> = transport.into();
    CaseRunner::new(RequestExecutor::new(transport, ctx))
}

type Handler = Arc<dyn Fn(&TransportRequest, usize) -> Response + Send + Sync>;

struct Route {
    method: String,
    path: String,
    delay: Duration,
    handler: Handler,
    calls: AtomicUsize,
}

/// Routing transport. Unrouted calls come back as the sentinel response.
#[derive(Default)]
pub struct MockTransport {
    routes: Vec<Route>,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
    calls: AtomicUsize,
    requests: Mutex<Vec<TransportRequest>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn route(self, method: &str, path: &str, status: u16, body: Value) -> Self {
        self.route_delayed(method, path, status, body, Duration::ZERO)
    }

    pub fn route_delayed(
        self,
        method: &str,
        path: &str,
        status: u16,
        body: Value,
        delay: Duration,
    ) -> Self {
        self.add(
            method,
            path,
            delay,
            Arc::new(move |_, _| Response::new(status, body.clone())),
        )
    }

    /// Route answered by `handler(request, call_index)`
    pub fn route_fn<F>(self, method: &str, path: &str, handler: F) -> Self
    where
        F: Fn(&TransportRequest, usize) -> Response + Send + Sync + 'static,
    {
        self.add(method, path, Duration::ZERO, Arc::new(handler))
    }

    fn add(mut self, method: &str, path: &str, delay: Duration, handler: Handler) -> Self {
        self.routes.push(Route {
            method: method.to_ascii_uppercase(),
            path: path.to_string(),
            delay,
            handler,
            calls: AtomicUsize::new(0),
        });
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Highest number of calls observed in flight at once
    pub fn peak_in_flight(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<TransportRequest> {
        self.requests
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }
}

fn url_path(url: &str) -> &str {
    let rest = url.split_once("://").map(|(_, r)| r).unwrap_or(url);
    let path = rest.find('/').map(|i| &rest[i..]).unwrap_or("/");
    path.split('?').next().unwrap_or(path)
}

#[async_trait]
impl Transport for MockTransport {
    async fn request(&self, request: TransportRequest) -> Response {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(request.clone());

        let path = url_path(&request.url);
        let route = self
            .routes
            .iter()
            .find(|r| r.method == request.method.as_str() && r.path == path);

        let Some(route) = route else {
            return Response::transport_failure(format!("connection refused: {}", request.url));
        };

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);

        let call = route.calls.fetch_add(1, Ordering::SeqCst);
        if !route.delay.is_zero() {
            tokio::time::sleep(route.delay).await;
        } else {
            tokio::task::yield_now().await;
        }
        let response = (route.handler)(&request, call);

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        response
    }
}

#[derive(Debug, Clone)]
pub enum ChannelBehavior {
    Refuse,
    /// Connects, never answers
    Silent,
    Reply(String),
}

pub struct ScriptedConnector {
    behavior: ChannelBehavior,
    closed: Arc<AtomicUsize>,
    opened: Mutex<Vec<String>>,
}

impl ScriptedConnector {
    pub fn new(behavior: ChannelBehavior) -> Self {
        Self {
            behavior,
            closed: Arc::new(AtomicUsize::new(0)),
            opened: Mutex::new(Vec::new()),
        }
    }

    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn opened_urls(&self) -> Vec<String> {
        self.opened.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }
}

#[async_trait]
impl ChannelConnector for ScriptedConnector {
    async fn open(&self, url: &str) -> Result<Box<dyn RealtimeChannel>> {
        self.opened
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(url.to_string());

        match &self.behavior {
            ChannelBehavior::Refuse => anyhow::bail!("connection refused: {}", url),
            ChannelBehavior::Silent => Ok(Box::new(ScriptedChannel {
                reply: None,
                closed: self.closed.clone(),
            })),
            ChannelBehavior::Reply(reply) => Ok(Box::new(ScriptedChannel {
                reply: Some(reply.clone()),
                closed: self.closed.clone(),
            })),
        }
    }
}

struct ScriptedChannel {
    reply: Option<String>,
    closed: Arc<AtomicUsize>,
}

#[async_trait]
impl RealtimeChannel for ScriptedChannel {
    async fn send(&mut self, _text: &str) -> Result<()> {
        Ok(())
    }

    async fn receive(&mut self, wait: Duration) -> Result<Option<String>> {
        match self.reply.take() {
            Some(reply) => Ok(Some(reply)),
            None => {
                tokio::time::sleep(wait).await;
                Ok(None)
            }
        }
    }

    async fn close(&mut self) -> Result<()> {
        self.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Renderer serving fixed pages by URL; anything else fails to fetch
#[derive(Default)]
pub struct StaticPageRenderer {
    pages: HashMap<String, RenderedPage>,
    closed: AtomicUsize,
}

impl StaticPageRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn page(mut self, url: &str, page: RenderedPage) -> Self {
        self.pages.insert(url.to_string(), page);
        self
    }

    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PageRenderer for StaticPageRenderer {
    async fn render(&self, url: &str) -> Result<RenderedPage> {
        self.pages
            .get(url)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("connection refused: {}", url))
    }

    async fn close(&self) -> Result<()> {
        self.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

pub struct StaticProbe {
    name: String,
    up: bool,
}

impl StaticProbe {
    pub fn new(name: &str, up: bool) -> Self {
        Self {
            name: name.to_string(),
            up,
        }
    }
}

#[async_trait]
impl ReachabilityProbe for StaticProbe {
    fn name(&self) -> &str {
        &self.name
    }

    fn target(&self) -> &str {
        "mock:0"
    }

    async fn ping(&self) -> Result<()> {
        if self.up {
            Ok(())
        } else {
            anyhow::bail!("{} is down", self.name)
        }
    }
}

/// Keeps every written report in memory
#[derive(Default)]
pub struct MemorySink {
    writes: Mutex<Vec<(String, RunReport)>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn writes(&self) -> Vec<(String, RunReport)> {
        self.writes.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }
}

impl ReportSink for MemorySink {
    fn write(&self, run_id: &str, report: &RunReport) -> Result<PathBuf, SinkError> {
        self.writes
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push((run_id.to_string(), report.clone()));
        Ok(PathBuf::from(format!("memory://{}", run_id)))
    }
}
