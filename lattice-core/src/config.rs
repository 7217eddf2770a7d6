//! Cluster configuration: the static pid→address topology.
//!
//! The on-disk document is JSON of the shape
//!
//! ```json
//! {
//!   "object": {
//!     "total": 3,
//!     "Servers": [
//!       { "mypid": 1, "url": "127.0.0.1:9001" },
//!       { "mypid": 2, "url": "127.0.0.1:9002" },
//!       { "mypid": 3, "url": "127.0.0.1:9003" }
//!     ]
//!   }
//! }
//! ```
//!
//! This module owns only the schema and its validation; a configuration
//! that does not load and validate is a fatal startup error for the node.

use std::collections::HashSet;
use std::path::Path;
use std::str::FromStr;

use serde::Deserialize;
use thiserror::Error;

use crate::identity::Pid;

/// Errors loading or validating a cluster configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read configuration file: {0}")]
    Io(#[from] std::io::Error),

    #[error("configuration is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("declared total {declared} does not match {actual} configured server(s)")]
    TotalMismatch { declared: usize, actual: usize },

    #[error("pid {0} appears more than once")]
    DuplicatePid(Pid),

    #[error("pid 0 is reserved; pids start at 1")]
    ZeroPid,

    #[error("server {pid} has an empty address")]
    EmptyAddress { pid: Pid },

    #[error("configuration lists no servers")]
    Empty,
}

// Private mirror of the wire schema; flattened into ClusterConfig after
// validation.
#[derive(Debug, Deserialize)]
struct ConfigDoc {
    #[serde(rename = "object")]
    object: TopologyDoc,
}

#[derive(Debug, Deserialize)]
struct TopologyDoc {
    #[serde(rename = "total")]
    total: usize,
    #[serde(rename = "Servers")]
    servers: Vec<ServerDoc>,
}

#[derive(Debug, Deserialize)]
struct ServerDoc {
    #[serde(rename = "mypid")]
    pid: Pid,
    #[serde(rename = "url")]
    url: String,
}

/// One configured cluster member.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerEntry {
    /// The member's pid.
    pub pid: Pid,
    /// The `host:port` address the member binds.
    pub addr: String,
}

impl ServerEntry {
    /// Convenience constructor.
    pub fn new(pid: Pid, addr: impl Into<String>) -> Self {
        Self {
            pid,
            addr: addr.into(),
        }
    }
}

/// The validated cluster topology, in configuration order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterConfig {
    servers: Vec<ServerEntry>,
}

impl ClusterConfig {
    /// Build a configuration from entries, validating pid uniqueness and
    /// address presence.
    pub fn new(servers: Vec<ServerEntry>) -> Result<Self, ConfigError> {
        if servers.is_empty() {
            return Err(ConfigError::Empty);
        }

        let mut seen = HashSet::with_capacity(servers.len());
        for entry in &servers {
            if entry.pid == 0 {
                return Err(ConfigError::ZeroPid);
            }
            if !seen.insert(entry.pid) {
                return Err(ConfigError::DuplicatePid(entry.pid));
            }
            if entry.addr.is_empty() {
                return Err(ConfigError::EmptyAddress { pid: entry.pid });
            }
        }

        Ok(Self { servers })
    }

    /// Load and validate a configuration file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        std::fs::read_to_string(path)?.parse()
    }

    /// Number of configured members.
    pub fn len(&self) -> usize {
        self.servers.len()
    }

    /// True when no members are configured (never for a validated config).
    pub fn is_empty(&self) -> bool {
        self.servers.is_empty()
    }

    /// The configured members, in configuration order.
    pub fn servers(&self) -> &[ServerEntry] {
        &self.servers
    }

    /// Address of the member with `pid`, if configured.
    pub fn address_of(&self, pid: Pid) -> Option<&str> {
        self.servers
            .iter()
            .find(|entry| entry.pid == pid)
            .map(|entry| entry.addr.as_str())
    }

    /// Whether `pid` is a configured member.
    pub fn contains(&self, pid: Pid) -> bool {
        self.servers.iter().any(|entry| entry.pid == pid)
    }
}

impl FromStr for ClusterConfig {
    type Err = ConfigError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let doc: ConfigDoc = serde_json::from_str(text)?;
        let topology = doc.object;

        if topology.total != topology.servers.len() {
            return Err(ConfigError::TotalMismatch {
                declared: topology.total,
                actual: topology.servers.len(),
            });
        }

        Self::new(
            topology
                .servers
                .into_iter()
                .map(|server| ServerEntry::new(server.pid, server.url))
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
    {
        "object": {
            "total": 3,
            "Servers": [
                { "mypid": 1, "url": "127.0.0.1:9001" },
                { "mypid": 2, "url": "127.0.0.1:9002" },
                { "mypid": 3, "url": "127.0.0.1:9003" }
            ]
        }
    }
    "#;

    #[test]
    fn test_parse_sample_document() {
        let config: ClusterConfig = SAMPLE.parse().unwrap();
        assert_eq!(config.len(), 3);
        assert_eq!(config.address_of(2), Some("127.0.0.1:9002"));
        assert!(config.contains(3));
        assert!(!config.contains(4));

        let pids: Vec<Pid> = config.servers().iter().map(|s| s.pid).collect();
        assert_eq!(pids, vec![1, 2, 3]);
    }

    #[test]
    fn test_total_mismatch_is_rejected() {
        let text = r#"
        {
            "object": {
                "total": 5,
                "Servers": [ { "mypid": 1, "url": "127.0.0.1:9001" } ]
            }
        }
        "#;
        let result = text.parse::<ClusterConfig>();
        assert!(matches!(
            result,
            Err(ConfigError::TotalMismatch {
                declared: 5,
                actual: 1
            })
        ));
    }

    #[test]
    fn test_duplicate_pid_is_rejected() {
        let result = ClusterConfig::new(vec![
            ServerEntry::new(1, "127.0.0.1:9001"),
            ServerEntry::new(1, "127.0.0.1:9002"),
        ]);
        assert!(matches!(result, Err(ConfigError::DuplicatePid(1))));
    }

    #[test]
    fn test_zero_pid_is_rejected() {
        let result = ClusterConfig::new(vec![ServerEntry::new(0, "127.0.0.1:9000")]);
        assert!(matches!(result, Err(ConfigError::ZeroPid)));
    }

    #[test]
    fn test_empty_address_is_rejected() {
        let result = ClusterConfig::new(vec![ServerEntry::new(2, "")]);
        assert!(matches!(result, Err(ConfigError::EmptyAddress { pid: 2 })));
    }

    #[test]
    fn test_empty_configuration_is_rejected() {
        assert!(matches!(
            ClusterConfig::new(Vec::new()),
            Err(ConfigError::Empty)
        ));
    }

    #[test]
    fn test_invalid_json_is_a_parse_error() {
        let result = "not json".parse::<ClusterConfig>();
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_missing_file_is_an_io_error() {
        let result = ClusterConfig::from_path("/nonexistent/cluster.json");
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }

    #[test]
    fn test_from_path_roundtrip() {
        let path = std::env::temp_dir().join("lattice-config-test.json");
        std::fs::write(&path, SAMPLE).unwrap();
        let config = ClusterConfig::from_path(&path).unwrap();
        std::fs::remove_file(&path).ok();
        assert_eq!(config.len(), 3);
    }
}
