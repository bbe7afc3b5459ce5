//! Engine-level configuration.
//!
//! These are the configuration pieces consumed by the store, the query
//! engine and the cluster planner. The full server configuration (listen
//! addresses, TOML loading) lives in `lqd-server`.

use serde::{Deserialize, Serialize};

/// Authorization strictness for `AuthUser` filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthLevel {
    /// A service is visible if the user is a contact on the service or its
    /// host; a group is visible if any member is.
    #[default]
    Loose,
    /// Only direct contacts count; groups require authorization on every
    /// member.
    Strict,
}

/// Engine options shared by all peers of one proxy instance.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct EngineOptions {
    /// Visibility rule for services.
    #[serde(default)]
    pub service_authorization: AuthLevel,
    /// Visibility rule for host and service groups.
    #[serde(default)]
    pub group_authorization: AuthLevel,
}

/// One upstream connection entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Human-readable name of the upstream site.
    pub name: String,
    /// Backend id, surfaced to clients via the `Backends:` header and the
    /// `peer_key` column.
    pub id: String,
    /// Upstream addresses, tried in order.
    pub source: Vec<String>,
}

/// One cluster node entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Node id.
    pub id: String,
    /// LQL endpoint of the node.
    pub addr: String,
    /// Backend ids owned by this node.
    #[serde(default)]
    pub backends: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_level_default() {
        assert_eq!(AuthLevel::default(), AuthLevel::Loose);
        let opts = EngineOptions::default();
        assert_eq!(opts.service_authorization, AuthLevel::Loose);
        assert_eq!(opts.group_authorization, AuthLevel::Loose);
    }
}
