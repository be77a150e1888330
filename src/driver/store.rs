//! Reachability checks for the platform's backing stores

use super::traits::ReachabilityProbe;
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

/// Which handshake the probe performs after connecting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
    /// Document store: a successful TCP connect is enough
    Document,
    /// Cache store speaking RESP: `PING` must answer `+PONG`
    Cache,
}

pub struct TcpStoreProbe {
    name: String,
    addr: String,
    kind: StoreKind,
    timeout: Duration,
}

impl TcpStoreProbe {
    pub fn new(name: &str, addr: &str, kind: StoreKind, timeout: Duration) -> Self {
        Self {
            name: name.to_string(),
            addr: addr.to_string(),
            kind,
            timeout,
        }
    }

    pub fn document_store(addr: &str, timeout: Duration) -> Self {
        Self::new("MongoDB", addr, StoreKind::Document, timeout)
    }

    pub fn cache_store(addr: &str, timeout: Duration) -> Self {
        Self::new("Redis", addr, StoreKind::Cache, timeout)
    }

    async fn check(&self) -> Result<()> {
        let mut stream = TcpStream::connect(&self.addr)
            .await
            .with_context(|| format!("Failed to connect to {}", self.addr))?;

        if self.kind == StoreKind::Cache {
            stream.write_all(b"PING\r\n").await?;
            let mut buf = [0u8; 64];
            let n = stream.read(&mut buf).await?;
            let reply = String::from_utf8_lossy(&buf[..n]);
            if !reply.starts_with("+PONG") {
                anyhow::bail!("Unexpected PING reply: {}", reply.trim());
            }
        }

        Ok(())
    }
}

#[async_trait]
impl ReachabilityProbe for TcpStoreProbe {
    fn name(&self) -> &str {
        &self.name
    }

    fn target(&self) -> &str {
        &self.addr
    }

    async fn ping(&self) -> Result<()> {
        tokio::time::timeout(self.timeout, self.check())
            .await
            .with_context(|| format!("{} did not answer within {:?}", self.name, self.timeout))?
    }
}
