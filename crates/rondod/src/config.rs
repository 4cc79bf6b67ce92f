//! TOML configuration for the rondo daemon.
//!
//! Every section defaults sensibly; command-line flags override file
//! values field by field.

use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::Deserialize;

/// Top-level configuration, parsed from TOML.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    /// Node identity and addresses.
    pub node: NodeSection,
    /// Logging configuration.
    pub log: LogSection,
}

/// `[node]` section.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct NodeSection {
    /// Address for the RPC listener.
    pub listen_addr: String,
    /// Address peers should dial, when it differs from the bind
    /// address. The node's identity hashes from this string.
    pub advertise_addr: Option<String>,
    /// Peer to bootstrap against. Omit to create a new ring.
    pub join_addr: Option<String>,
    /// Sqlite file recording (node, successor) topology rows.
    pub db_path: Option<PathBuf>,
}

impl Default for NodeSection {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:4820".to_string(),
            advertise_addr: None,
            join_addr: None,
            db_path: None,
        }
    }
}

/// `[log]` section.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct LogSection {
    /// Log level filter (e.g. `"info"`, `"debug"`).
    pub level: String,
}

impl Default for LogSection {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Load the config file, or defaults when no path is given.
pub fn load(path: Option<&Path>) -> anyhow::Result<DaemonConfig> {
    match path {
        None => Ok(DaemonConfig::default()),
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("reading config {}", path.display()))?;
            toml::from_str(&raw).with_context(|| format!("parsing config {}", path.display()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_uses_defaults() {
        let config: DaemonConfig = toml::from_str("").unwrap();
        assert_eq!(config.node.listen_addr, "127.0.0.1:4820");
        assert!(config.node.join_addr.is_none());
        assert_eq!(config.log.level, "info");
    }

    #[test]
    fn partial_sections_parse() {
        let config: DaemonConfig = toml::from_str(
            r#"
            [node]
            listen_addr = "0.0.0.0:9000"
            join_addr = "10.0.0.1:9000"
            db_path = "/var/lib/rondo/topology.db"

            [log]
            level = "debug"
            "#,
        )
        .unwrap();
        assert_eq!(config.node.listen_addr, "0.0.0.0:9000");
        assert_eq!(config.node.join_addr.as_deref(), Some("10.0.0.1:9000"));
        assert_eq!(config.log.level, "debug");
    }
}
