//! Configuration loading for the agency node.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::Error;
use crate::protocol::AgentId;
pub type Result<T> = std::result::Result<T, Error>;

/// Get the agency home directory (~/.agency).
pub fn get_home_dir() -> Result<PathBuf> {
    let home = directories::UserDirs::new()
        .ok_or_else(|| Error::Config("Could not determine home directory".to_string()))?;

    Ok(home.home_dir().join(".agency"))
}

/// Get the default config file path.
pub fn get_config_path() -> Result<PathBuf> {
    Ok(get_home_dir()?.join("agency.json"))
}

/// Default directory for file logs.
pub fn default_log_dir() -> Result<PathBuf> {
    let dirs = directories::ProjectDirs::from("org", "agency", "agency")
        .ok_or_else(|| Error::Config("Could not determine data directory".to_string()))?;

    Ok(dirs.data_dir().join("logs"))
}

/// Load configuration.
///
/// An explicit path must exist. Without one, `~/.agency/agency.json` is used
/// when present and built-in defaults otherwise.
pub fn load_config(path: Option<&Path>) -> Result<AgencyConfig> {
    let path = match path {
        Some(p) => {
            if !p.exists() {
                return Err(Error::Config(format!(
                    "Config file not found at {}",
                    p.display()
                )));
            }
            p.to_path_buf()
        }
        None => {
            let default = get_config_path()?;
            if !default.exists() {
                tracing::debug!("No config at {}, using defaults", default.display());
                return Ok(AgencyConfig::default());
            }
            default
        }
    };

    let content = std::fs::read_to_string(&path)?;
    let config: AgencyConfig = serde_json::from_str(&content)?;
    validate_config(&config)?;

    tracing::debug!("Loaded config from {}", path.display());
    Ok(config)
}

pub fn validate_config(config: &AgencyConfig) -> Result<()> {
    if config.name.trim().is_empty() {
        return Err(Error::Config("name must not be empty".to_string()));
    }
    if config.inbox_capacity == 0 {
        return Err(Error::Config("inbox_capacity must be > 0".to_string()));
    }
    if config.intake_capacity == 0 {
        return Err(Error::Config("intake_capacity must be > 0".to_string()));
    }
    if config.forward_timeout_ms == 0 {
        return Err(Error::Config("forward_timeout_ms must be > 0".to_string()));
    }
    for peer in &config.peers {
        if peer.address.trim().is_empty() {
            return Err(Error::Config(format!(
                "peer node {} has an empty address",
                peer.node_id
            )));
        }
    }
    Ok(())
}

/// Another agency node and the agents it hosts.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct PeerConfig {
    #[serde(rename = "nodeid")]
    pub node_id: u64,
    pub address: String,
    #[serde(default)]
    pub agents: Vec<AgentId>,
}

/// Agency settings.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct AgencyConfig {
    #[serde(default = "default_name")]
    pub name: String,

    #[serde(rename = "masid", default)]
    pub mas_id: u64,

    #[serde(rename = "nodeid", default)]
    pub node_id: u64,

    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Base URL other nodes use to reach this one.
    #[serde(default)]
    pub address: Option<String>,

    #[serde(default = "default_inbox_capacity")]
    pub inbox_capacity: usize,

    #[serde(default = "default_intake_capacity")]
    pub intake_capacity: usize,

    #[serde(default = "default_forward_timeout_ms")]
    pub forward_timeout_ms: u64,

    #[serde(default)]
    pub log_dir: Option<PathBuf>,

    #[serde(default)]
    pub peers: Vec<PeerConfig>,
}

fn default_name() -> String {
    "agency".to_string()
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    10000
}

fn default_inbox_capacity() -> usize {
    crate::protocol::mailbox::DEFAULT_INBOX_CAPACITY
}

fn default_intake_capacity() -> usize {
    1024
}

fn default_forward_timeout_ms() -> u64 {
    5000
}

impl AgencyConfig {
    /// Advertised base URL, derived from the port if not configured.
    pub fn advertised_address(&self) -> String {
        match self.address.as_deref() {
            Some(a) if !a.trim().is_empty() => a.trim_end_matches('/').to_string(),
            _ => format!("http://127.0.0.1:{}", self.port),
        }
    }

    pub fn forward_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.forward_timeout_ms)
    }
}

impl Default for AgencyConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            mas_id: 0,
            node_id: 0,
            host: default_host(),
            port: default_port(),
            address: None,
            inbox_capacity: default_inbox_capacity(),
            intake_capacity: default_intake_capacity(),
            forward_timeout_ms: default_forward_timeout_ms(),
            log_dir: None,
            peers: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_empty_object() {
        let config: AgencyConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.name, "agency");
        assert_eq!(config.port, 10000);
        assert_eq!(config.inbox_capacity, 256);
        assert_eq!(config.advertised_address(), "http://127.0.0.1:10000");
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("agency.json");
        std::fs::write(
            &path,
            r#"{
                "name": "node-a",
                "masid": 3,
                "nodeid": 5,
                "port": 12000,
                "address": "http://node-a:12000/",
                "peers": [{"nodeid": 6, "address": "http://node-b:12000", "agents": [7, 8]}]
            }"#,
        )
        .unwrap();

        let config = load_config(Some(&path)).unwrap();
        assert_eq!(config.name, "node-a");
        assert_eq!(config.mas_id, 3);
        assert_eq!(config.node_id, 5);
        assert_eq!(config.advertised_address(), "http://node-a:12000");
        assert_eq!(config.peers[0].agents, vec![7, 8]);
    }

    #[test]
    fn test_missing_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_config(Some(&dir.path().join("nope.json"))).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_validation() {
        let mut config = AgencyConfig::default();
        config.inbox_capacity = 0;
        assert!(validate_config(&config).is_err());

        let mut config = AgencyConfig::default();
        config.peers.push(PeerConfig {
            node_id: 2,
            address: " ".to_string(),
            agents: vec![1],
        });
        assert!(validate_config(&config).is_err());
    }
}
