use std::path::PathBuf;

use config::{Config, ConfigError, File};
use serde::{Deserialize, Serialize};
use tracing::info;

#[derive(Debug, Serialize, Deserialize)]
pub struct Settings {
    pub server: ServerSettings,
    pub node: NodeSettings,
    pub installer: InstallerSettings,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct NodeSettings {
    pub connect_timeout_secs: u64,
    pub connect_attempts: u32,
    pub connect_backoff_ms: u64,
    /// Node agent binary shipped to hosts during install.
    pub local_node_path: PathBuf,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct InstallerSettings {
    pub playbook_path: PathBuf,
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        let config_path = std::env::var("CONFIG_PATH").unwrap_or_else(|_| "config".to_string());

        info!("Loading configuration from path: {}", config_path);

        let config = Config::builder()
            .set_default("server.host", "127.0.0.1")?
            .set_default("server.port", 8888)?
            .set_default("node.connect_timeout_secs", 5)?
            .set_default("node.connect_attempts", 3)?
            .set_default("node.connect_backoff_ms", 200)?
            .set_default("node.local_node_path", "/usr/local/bin/fleet-node")?
            .set_default("installer.playbook_path", "playbooks/setup_host.yml")?
            .add_source(File::with_name(&format!("{}/default", config_path)).required(false))
            .add_source(File::with_name(&format!("{}/local", config_path)).required(false))
            .add_source(config::Environment::with_prefix("FLEET").separator("__"))
            .build()?;

        config.try_deserialize()
    }
}
