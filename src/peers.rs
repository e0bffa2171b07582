use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use log::{debug, warn};
use reqwest::Url;

use crate::error::{LedgerError, PeerError};
use crate::models::{Block, BlockEnvelope, ChainResponse};

/// Manually registered peer addresses.
#[derive(Debug, Clone, Default)]
pub struct PeerSet {
    peers: HashSet<String>,
}

impl PeerSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `address` after checking it is an http(s) URL with a host.
    /// Returns `false` if it was already known.
    pub fn register(&mut self, address: &str) -> Result<bool, LedgerError> {
        let address = normalize_address(address)?;
        Ok(self.peers.insert(address))
    }

    pub fn contains(&self, address: &str) -> bool {
        self.peers.contains(address.trim_end_matches('/'))
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    /// Sorted copy of the addresses.
    pub fn to_vec(&self) -> Vec<String> {
        let mut peers: Vec<String> = self.peers.iter().cloned().collect();
        peers.sort();
        peers
    }
}

fn invalid(address: &str, reason: impl Into<String>) -> LedgerError {
    LedgerError::InvalidAddress {
        address: address.to_string(),
        reason: reason.into(),
    }
}

pub fn normalize_address(address: &str) -> Result<String, LedgerError> {
    let trimmed = address.trim();
    if trimmed.is_empty() {
        return Err(invalid(address, "empty address"));
    }
    let url = Url::parse(trimmed).map_err(|e| invalid(address, e.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(invalid(address, format!("unsupported scheme {}", url.scheme())));
    }
    if url.host_str().map_or(true, str::is_empty) {
        return Err(invalid(address, "missing host"));
    }
    Ok(trimmed.trim_end_matches('/').to_string())
}

/// How the node talks to its peers.
#[async_trait]
pub trait PeerTransport: Send + Sync {
    async fn fetch_chain(&self, peer: &str) -> Result<ChainResponse, PeerError>;
    async fn send_block(&self, peer: &str, block: &Block) -> Result<(), PeerError>;
}

/// JSON over HTTP, speaking the same routes this node serves.
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(timeout: Duration) -> Result<Self, PeerError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl PeerTransport for HttpTransport {
    async fn fetch_chain(&self, peer: &str) -> Result<ChainResponse, PeerError> {
        let response = self.client.get(format!("{}/chain", peer)).send().await?;
        if !response.status().is_success() {
            return Err(PeerError::Status(response.status().as_u16()));
        }
        Ok(response.json::<ChainResponse>().await?)
    }

    async fn send_block(&self, peer: &str, block: &Block) -> Result<(), PeerError> {
        let body = BlockEnvelope {
            block: block.clone(),
        };
        let response = self
            .client
            .post(format!("{}/receive_block", peer))
            .json(&body)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(PeerError::Status(response.status().as_u16()));
        }
        Ok(())
    }
}

/// Fetches every peer's chain concurrently. One entry per peer, in input
/// order, failures included.
pub async fn fetch_all(
    transport: &dyn PeerTransport,
    peers: &[String],
) -> Vec<(String, Result<ChainResponse, PeerError>)> {
    let fetches = peers.iter().map(|peer| async move {
        let result = transport.fetch_chain(peer).await;
        (peer.clone(), result)
    });
    join_all(fetches).await
}

/// Per-peer outcome of a block broadcast.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BroadcastReport {
    pub delivered: Vec<String>,
    pub failed: Vec<(String, String)>,
}

pub async fn broadcast_block(
    transport: &dyn PeerTransport,
    peers: &[String],
    block: &Block,
) -> BroadcastReport {
    let sends = peers.iter().map(|peer| async move {
        let result = transport.send_block(peer, block).await;
        (peer.clone(), result)
    });
    let mut report = BroadcastReport::default();
    for (peer, result) in join_all(sends).await {
        match result {
            Ok(()) => {
                debug!("Block {} sent to {}", block.index, peer);
                report.delivered.push(peer);
            }
            Err(err) => {
                warn!("Error sending block {} to {}: {}", block.index, peer, err);
                report.failed.push((peer, err.to_string()));
            }
        }
    }
    report
}
