//! WebSocket channel driver

use super::traits::{ChannelConnector, RealtimeChannel};
use anyhow::{Context, Result};
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

/// Opens WebSocket channels with tokio-tungstenite
pub struct WsConnector {
    connect_timeout: Duration,
}

impl WsConnector {
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }
}

#[async_trait]
impl ChannelConnector for WsConnector {
    async fn open(&self, url: &str) -> Result<Box<dyn RealtimeChannel>> {
        let (stream, _) = tokio::time::timeout(self.connect_timeout, connect_async(url))
            .await
            .with_context(|| format!("Timed out connecting to {}", url))?
            .with_context(|| format!("Failed to connect to {}", url))?;

        Ok(Box::new(WsChannel {
            stream,
            closed: false,
        }))
    }
}

struct WsChannel {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
    closed: bool,
}

#[async_trait]
impl RealtimeChannel for WsChannel {
    async fn send(&mut self, text: &str) -> Result<()> {
        self.stream
            .send(Message::Text(text.to_string()))
            .await
            .context("Failed to send message")
    }

    async fn receive(&mut self, wait: Duration) -> Result<Option<String>> {
        let deadline = tokio::time::Instant::now() + wait;
        loop {
            let next = match tokio::time::timeout_at(deadline, self.stream.next()).await {
                Ok(next) => next,
                Err(_) => return Ok(None),
            };

            match next {
                Some(Ok(Message::Text(text))) => return Ok(Some(text)),
                Some(Ok(Message::Binary(bytes))) => {
                    return Ok(Some(String::from_utf8_lossy(&bytes).into_owned()))
                }
                // Control frames are not replies
                Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) | Some(Ok(Message::Frame(_))) => {
                    continue
                }
                Some(Ok(Message::Close(frame))) => {
                    self.closed = true;
                    anyhow::bail!("Channel closed by peer: {:?}", frame);
                }
                Some(Err(e)) => return Err(e).context("Failed to read from channel"),
                None => {
                    self.closed = true;
                    anyhow::bail!("Channel stream ended");
                }
            }
        }
    }

    async fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.stream
            .close(None)
            .await
            .context("Failed to close channel")
    }
}
