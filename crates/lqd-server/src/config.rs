//! Server configuration.

use std::path::Path;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use lqd_common::{AuthLevel, ConnectionConfig, EngineOptions, NodeConfig};

/// Configuration of one proxy instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Addresses to listen on for LQL clients.
    #[serde(default = "default_listen")]
    pub listen: Vec<String>,

    /// Id of this node within the cluster; ignored when `nodes` is empty.
    #[serde(default = "default_node_id")]
    pub node_id: String,

    /// Visibility rule for services under `AuthUser`.
    #[serde(default)]
    pub service_authorization: AuthLevel,

    /// Visibility rule for groups under `AuthUser`.
    #[serde(default)]
    pub group_authorization: AuthLevel,

    /// Upstream connections, one peer each.
    #[serde(default)]
    pub connections: Vec<ConnectionConfig>,

    /// Cluster nodes; empty for a standalone proxy.
    #[serde(default)]
    pub nodes: Vec<NodeConfig>,
}

fn default_listen() -> Vec<String> {
    vec!["127.0.0.1:6557".to_string()]
}

fn default_node_id() -> String {
    "node1".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            node_id: default_node_id(),
            service_authorization: AuthLevel::default(),
            group_authorization: AuthLevel::default(),
            connections: Vec::new(),
            nodes: Vec::new(),
        }
    }
}

impl ServerConfig {
    /// Creates a default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Saves configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, self.to_toml()?)?;
        Ok(())
    }

    /// Renders the configuration as TOML.
    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// The engine-level options carried by this config.
    #[must_use]
    pub fn engine_options(&self) -> EngineOptions {
        EngineOptions {
            service_authorization: self.service_authorization,
            group_authorization: self.group_authorization,
        }
    }

    /// Returns true when cluster nodes are configured.
    #[must_use]
    pub fn is_clustered(&self) -> bool {
        self.nodes.iter().any(|n| n.id != self.node_id)
    }

    /// Creates a builder.
    #[must_use]
    pub fn builder() -> ServerConfigBuilder {
        ServerConfigBuilder::default()
    }
}

/// Builder for [`ServerConfig`].
#[derive(Default)]
pub struct ServerConfigBuilder {
    config: ServerConfig,
}

impl ServerConfigBuilder {
    /// Sets the listen addresses.
    #[must_use]
    pub fn listen(mut self, addrs: Vec<String>) -> Self {
        self.config.listen = addrs;
        self
    }

    /// Sets the node id.
    #[must_use]
    pub fn node_id(mut self, id: impl Into<String>) -> Self {
        self.config.node_id = id.into();
        self
    }

    /// Sets the service authorization mode.
    #[must_use]
    pub fn service_authorization(mut self, level: AuthLevel) -> Self {
        self.config.service_authorization = level;
        self
    }

    /// Sets the group authorization mode.
    #[must_use]
    pub fn group_authorization(mut self, level: AuthLevel) -> Self {
        self.config.group_authorization = level;
        self
    }

    /// Adds one upstream connection.
    #[must_use]
    pub fn connection(mut self, connection: ConnectionConfig) -> Self {
        self.config.connections.push(connection);
        self
    }

    /// Sets the cluster node table.
    #[must_use]
    pub fn nodes(mut self, nodes: Vec<NodeConfig>) -> Self {
        self.config.nodes = nodes;
        self
    }

    /// Builds the configuration.
    #[must_use]
    pub fn build(self) -> ServerConfig {
        self.config
    }
}
