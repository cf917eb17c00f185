//! Host lifecycle: the DOWN → INSTALLING → {UP, FAILED} state machine, and
//! the coupling between host status and node connectivity. A host is UP only
//! while a working channel to its agent exists; every path that cannot
//! produce one ends in FAILED, never in a silently-unreachable UP.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{error, info};
use uuid::Uuid;

use crate::core::errors::{Error, Result};
use crate::core::model::{Host, HostStatus, NewHost};
use crate::installer::{InstallConfig, Installer, FC_VERSION};
use crate::node::{ConnectionPool, NodeChannel};
use crate::repositories::Hosts;

pub struct HostService {
    hosts: Arc<dyn Hosts>,
    pool: Arc<ConnectionPool>,
    installer: Arc<dyn Installer>,
}

impl HostService {
    pub fn new(
        hosts: Arc<dyn Hosts>,
        pool: Arc<ConnectionPool>,
        installer: Arc<dyn Installer>,
    ) -> Self {
        Self {
            hosts,
            pool,
            installer,
        }
    }

    /// Rejects a registration whose address or name collides with an
    /// existing host, unless that host is FAILED — a failed host's identity
    /// may be reused by a fresh registration.
    ///
    /// Relies on the repository lookups preferring non-FAILED records: once
    /// a failed host's identity has been taken over, the lookup returns the
    /// active holder, not the failed shadow.
    pub async fn validate(&self, new_host: &NewHost) -> Result<()> {
        if let Some(host) = self.hosts.host_by_address(&new_host.address).await? {
            if host.status != HostStatus::Failed {
                return Err(Error::AlreadyExists(format!(
                    "host with address {}",
                    new_host.address
                )));
            }
        }

        if let Some(host) = self.hosts.host_by_name(&new_host.name).await? {
            if host.status != HostStatus::Failed {
                return Err(Error::AlreadyExists(format!(
                    "host with name {}",
                    new_host.name
                )));
            }
        }

        Ok(())
    }

    /// Persists a new host in DOWN. Installation and connectivity are
    /// separate steps.
    pub async fn add_host(&self, new_host: NewHost) -> Result<Uuid> {
        let host = Host {
            id: Uuid::nil(), // assigned by the repository
            name: new_host.name,
            address: new_host.address,
            port: new_host.port,
            user: new_host.user,
            password: new_host.password,
            status: HostStatus::Down,
            created_at: chrono::Utc::now(),
        };

        self.hosts.add_host(host).await
    }

    /// Provisions `host` and brings up its node channel. The host ends UP
    /// only if both the install and the connection succeed; any failure on
    /// the way marks it FAILED and is returned to the caller, who may retry
    /// by invoking this again.
    pub async fn install_host(&self, host: Host, local_node_path: PathBuf) -> Result<()> {
        self.update_host_status(&host, HostStatus::Installing)
            .await?;

        let config = InstallConfig {
            local_node_path,
            node_port: host.port,
            fc_version: FC_VERSION,
        };

        if let Err(err) = self.installer.install(&host, &config).await {
            error!(host = %host.name, %err, "host install failed");
            self.update_host_status(&host, HostStatus::Failed).await?;
            return Err(err);
        }

        let address = host.agent_address();
        info!(host = %host.name, %address, "creating node channel for host");

        match self.pool.create(host.id, &address).await {
            Ok(_) => self.update_host_status(&host, HostStatus::Up).await,
            Err(err) => {
                error!(host = %host.name, %err, "failed to connect to installed host");
                self.update_host_status(&host, HostStatus::Failed).await?;
                Err(err)
            }
        }
    }

    /// Dials every host persisted UP. Run once at process start. Individual
    /// failures are collected, not fatal; the affected hosts simply have no
    /// channel until reinstalled.
    pub async fn initialize_hosts(&self) -> Vec<Error> {
        let mut errors = Vec::new();

        let hosts = match self.hosts.list_hosts().await {
            Ok(hosts) => hosts,
            Err(err) => {
                errors.push(err);
                return errors;
            }
        };

        for host in hosts.iter().filter(|h| h.status == HostStatus::Up) {
            let address = host.agent_address();
            info!(host = %host.name, %address, "initializing host connection");

            if let Err(err) = self.pool.create(host.id, &address).await {
                error!(host = %host.name, %err, "failed to initialize host connection");
                errors.push(err);
            }
        }

        errors
    }

    /// Persists the requested status for `host`.
    pub async fn update_host_status(&self, host: &Host, status: HostStatus) -> Result<()> {
        info!(host = %host.name, ?status, "updating host status");

        let mut updated = host.clone();
        updated.status = status;
        self.hosts.update_host(updated).await
    }

    pub async fn get_connection(&self, host_id: Uuid) -> Option<Arc<dyn NodeChannel>> {
        self.pool.get(host_id).await
    }

    pub async fn host_by_id(&self, id: Uuid) -> Result<Option<Host>> {
        self.hosts.host_by_id(id).await
    }

    pub async fn list_hosts(&self) -> Result<Vec<Host>> {
        self.hosts.list_hosts().await
    }
}
