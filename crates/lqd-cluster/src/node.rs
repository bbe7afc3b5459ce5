//! Cluster nodes and the transport used to query them.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value as Json;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::debug;

use lqd_common::{LqdError, LqdResult, NodeConfig, FIXED16_LEN};
use lqd_query::{Engine, Request};

/// One node of the cluster.
#[derive(Debug, Clone)]
pub struct Node {
    /// Node id.
    pub id: String,
    /// LQL endpoint of the node.
    pub addr: String,
    /// Backend ids owned by this node.
    pub backends: Vec<String>,
    /// True for the local node.
    pub is_me: bool,
}

impl Node {
    /// Builds a node from its config entry.
    #[must_use]
    pub fn from_config(config: &NodeConfig, self_id: &str) -> Self {
        Self {
            id: config.id.clone(),
            addr: config.addr.clone(),
            backends: config.backends.clone(),
            is_me: config.id == self_id,
        }
    }
}

/// A wrapped_json reply from a partner node.
#[derive(Debug, Default, Deserialize)]
pub struct WrappedResult {
    /// Result rows.
    #[serde(default)]
    pub data: Vec<Vec<Json>>,
    /// Per-backend error messages.
    #[serde(default)]
    pub failed: HashMap<String, String>,
}

impl WrappedResult {
    /// The placeholder answer for a node without relevant backends; keeps
    /// the merge arity intact.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }
}

/// Transport for distributed sub-requests.
#[async_trait]
pub trait NodeClient: Send + Sync {
    /// Sends one serialized sub-request to a node and returns its parsed
    /// wrapped_json reply.
    async fn query(&self, node: &Node, request: String) -> LqdResult<WrappedResult>;
}

/// Queries partner nodes over their LQL TCP endpoint, using the fixed16
/// preamble for framing.
#[derive(Debug, Default)]
pub struct TcpNodeClient;

#[async_trait]
impl NodeClient for TcpNodeClient {
    async fn query(&self, node: &Node, request: String) -> LqdResult<WrappedResult> {
        debug!("sub-request to node {} at {}", node.id, node.addr);
        let mut stream = TcpStream::connect(&node.addr).await?;
        stream.write_all(request.as_bytes()).await?;

        let mut header = [0u8; FIXED16_LEN];
        stream.read_exact(&mut header).await?;
        let header = std::str::from_utf8(&header).map_err(|_| LqdError::BackendError {
            peer: node.id.clone(),
            message: "invalid response header".to_string(),
        })?;
        let code: u16 = header[..3].parse().map_err(|_| LqdError::BackendError {
            peer: node.id.clone(),
            message: format!("invalid response header: {}", header.trim()),
        })?;
        let length: usize = header[4..15]
            .trim()
            .parse()
            .map_err(|_| LqdError::BackendError {
                peer: node.id.clone(),
                message: format!("invalid response header: {}", header.trim()),
            })?;

        let mut body = vec![0u8; length];
        stream.read_exact(&mut body).await?;
        if code != 200 {
            return Err(LqdError::BackendError {
                peer: node.id.clone(),
                message: String::from_utf8_lossy(&body).trim().to_string(),
            });
        }
        serde_json::from_slice(&body).map_err(|err| LqdError::BackendError {
            peer: node.id.clone(),
            message: format!("invalid response body: {}", err),
        })
    }
}

/// Answers sub-requests from in-process engines; used by tests in place of
/// a live cluster.
#[derive(Default)]
pub struct MemoryNodeClient {
    engines: HashMap<String, Arc<Engine>>,
}

impl MemoryNodeClient {
    /// Creates an empty client.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the engine answering for a node id.
    pub fn add_node(&mut self, node_id: impl Into<String>, engine: Arc<Engine>) {
        self.engines.insert(node_id.into(), engine);
    }
}

#[async_trait]
impl NodeClient for MemoryNodeClient {
    async fn query(&self, node: &Node, request: String) -> LqdResult<WrappedResult> {
        let engine = self
            .engines
            .get(&node.id)
            .ok_or_else(|| LqdError::BackendError {
                peer: node.id.clone(),
                message: "unknown node".to_string(),
            })?;
        let req = Request::parse(&request, engine.catalog())?;
        let response = engine.execute(&req)?;
        Ok(WrappedResult {
            data: response.result,
            failed: response.failed,
        })
    }
}
