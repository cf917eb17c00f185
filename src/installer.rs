//! External host provisioning. The playbook prepares a machine to run
//! microVMs (Firecracker binary, node agent, networking); its internals are
//! opaque here — this module only cares about success or failure.

use std::path::PathBuf;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::info;

use crate::core::errors::{Error, Result};
use crate::core::model::Host;

/// Firecracker release the playbook pins on the target host.
pub const FC_VERSION: &str = "0.17.0";

/// Fixed configuration payload handed to the provisioning run.
#[derive(Debug, Clone)]
pub struct InstallConfig {
    /// Local path of the node agent binary shipped to the host.
    pub local_node_path: PathBuf,
    /// Port the node agent will listen on.
    pub node_port: u16,
    pub fc_version: &'static str,
}

#[async_trait]
pub trait Installer: Send + Sync {
    /// Provisions `host`. Potentially slow; no partial progress is reported.
    async fn install(&self, host: &Host, config: &InstallConfig) -> Result<()>;
}

pub struct AnsibleInstaller {
    playbook: PathBuf,
}

impl AnsibleInstaller {
    pub fn new(playbook: PathBuf) -> Self {
        Self { playbook }
    }
}

#[async_trait]
impl Installer for AnsibleInstaller {
    async fn install(&self, host: &Host, config: &InstallConfig) -> Result<()> {
        let extra_vars = serde_json::json!({
            "ansible_user": host.user,
            "ansible_ssh_pass": host.password,
            "local_node_path": config.local_node_path,
            "node_port": config.node_port.to_string(),
            "fc_version": config.fc_version,
        });

        info!(host = %host.name, address = %host.address, "running setup playbook");

        let output = Command::new("ansible-playbook")
            // Trailing comma makes ansible treat the address as an inline
            // inventory instead of a file path.
            .arg("-i")
            .arg(format!("{},", host.address))
            .arg("--extra-vars")
            .arg(extra_vars.to_string())
            .arg(&self.playbook)
            .output()
            .await
            .map_err(|err| Error::Install(format!("failed to spawn ansible-playbook: {err}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::Install(format!(
                "ansible-playbook exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        Ok(())
    }
}
