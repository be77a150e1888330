//! HTTP transport and page renderer backed by reqwest

use super::traits::{PageRenderer, RenderedPage, Response, Transport, TransportRequest};
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// Transport over a shared reqwest client
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    /// Build a client with the per-call timeout applied to every request
    pub fn new(timeout: Duration, max_concurrency: usize) -> Result<Self> {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            reqwest::header::CONTENT_TYPE,
            reqwest::header::HeaderValue::from_static("application/json"),
        );

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .pool_max_idle_per_host(max_concurrency.max(1) * 3)
            .default_headers(headers)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self { client })
    }

    async fn send(&self, request: TransportRequest) -> Result<Response, reqwest::Error> {
        let mut req = self.client.request(request.method, &request.url);

        if !request.query.is_empty() {
            req = req.query(&request.query);
        }
        for (k, v) in &request.headers {
            req = req.header(k.as_str(), v.as_str());
        }
        if let Some(body) = &request.body {
            req = req.json(body);
        }

        let res = req.send().await?;
        let status = res.status().as_u16();
        let text = res.text().await?;

        // Non-JSON bodies are kept as {"text": raw}
        let body = serde_json::from_str(&text)
            .unwrap_or_else(|_| serde_json::json!({ "text": text }));

        Ok(Response::new(status, body))
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn request(&self, request: TransportRequest) -> Response {
        let url = request.url.clone();
        match self.send(request).await {
            Ok(res) => res,
            Err(e) => {
                log::debug!("transport failure for {}: {}", url, e);
                Response::transport_failure(e)
            }
        }
    }
}

/// Renders pages by fetching their server-side HTML through a [`Transport`]
pub struct HttpPageRenderer {
    transport: Arc<dyn Transport>,
}

impl HttpPageRenderer {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }
}

#[async_trait]
impl PageRenderer for HttpPageRenderer {
    async fn render(&self, url: &str) -> Result<RenderedPage> {
        let res = self
            .transport
            .request(TransportRequest::new(reqwest::Method::GET, url))
            .await;

        if let Some(error) = res.error_text() {
            anyhow::bail!("Failed to fetch page {}: {}", url, error);
        }

        let content = match res.text() {
            Some(text) => text.to_string(),
            None => res.body.to_string(),
        };

        Ok(RenderedPage {
            status: res.status,
            content,
        })
    }
}
