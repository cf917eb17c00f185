//! Repository contracts for durable host and VM records, plus the in-memory
//! reference implementations used by the server and the tests. Lookups
//! return `Option` so callers can tell "no such record" apart from a record
//! with default fields.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::core::errors::Result;
use crate::core::model::{Host, HostStatus, Vm};

/// Picks the active record out of the hosts matching a key, falling back to
/// a failed one only when no active record exists.
fn prefer_active<'a>(matches: impl Iterator<Item = &'a Host>) -> Option<Host> {
    let mut failed = None;
    for host in matches {
        if host.status != HostStatus::Failed {
            return Some(host.clone());
        }
        failed = Some(host.clone());
    }
    failed
}

#[async_trait]
pub trait Hosts: Send + Sync {
    async fn list_hosts(&self) -> Result<Vec<Host>>;
    async fn host_by_id(&self, id: Uuid) -> Result<Option<Host>>;
    /// Looks up a host by address. Several records may share an address when
    /// a FAILED host's identity has been reused by a newer registration; in
    /// that case the non-FAILED record is returned, so a failed shadow never
    /// masks the active holder of the key.
    async fn host_by_address(&self, address: &str) -> Result<Option<Host>>;
    /// Looks up a host by name, with the same non-FAILED preference as
    /// [`Hosts::host_by_address`].
    async fn host_by_name(&self, name: &str) -> Result<Option<Host>>;
    /// Stores the record and returns its assigned id.
    async fn add_host(&self, host: Host) -> Result<Uuid>;
    async fn update_host(&self, host: Host) -> Result<()>;
}

#[async_trait]
pub trait Vms: Send + Sync {
    async fn list_vms(&self) -> Result<Vec<Vm>>;
    async fn vm_by_id(&self, id: Uuid) -> Result<Option<Vm>>;
    /// Stores the record and returns its assigned id.
    async fn add_vm(&self, vm: Vm) -> Result<Uuid>;
}

#[derive(Default)]
pub struct InMemoryHosts {
    hosts: RwLock<HashMap<Uuid, Host>>,
}

impl InMemoryHosts {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Hosts for InMemoryHosts {
    async fn list_hosts(&self) -> Result<Vec<Host>> {
        Ok(self.hosts.read().await.values().cloned().collect())
    }

    async fn host_by_id(&self, id: Uuid) -> Result<Option<Host>> {
        Ok(self.hosts.read().await.get(&id).cloned())
    }

    async fn host_by_address(&self, address: &str) -> Result<Option<Host>> {
        let hosts = self.hosts.read().await;
        Ok(prefer_active(
            hosts.values().filter(|host| host.address == address),
        ))
    }

    async fn host_by_name(&self, name: &str) -> Result<Option<Host>> {
        let hosts = self.hosts.read().await;
        Ok(prefer_active(
            hosts.values().filter(|host| host.name == name),
        ))
    }

    async fn add_host(&self, host: Host) -> Result<Uuid> {
        let id = Uuid::new_v4();
        let host = Host { id, ..host };
        self.hosts.write().await.insert(id, host);
        Ok(id)
    }

    async fn update_host(&self, host: Host) -> Result<()> {
        self.hosts.write().await.insert(host.id, host);
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryVms {
    vms: RwLock<HashMap<Uuid, Vm>>,
}

impl InMemoryVms {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Vms for InMemoryVms {
    async fn list_vms(&self) -> Result<Vec<Vm>> {
        Ok(self.vms.read().await.values().cloned().collect())
    }

    async fn vm_by_id(&self, id: Uuid) -> Result<Option<Vm>> {
        Ok(self.vms.read().await.get(&id).cloned())
    }

    async fn add_vm(&self, vm: Vm) -> Result<Uuid> {
        let id = Uuid::new_v4();
        let vm = Vm { id, ..vm };
        self.vms.write().await.insert(id, vm);
        Ok(id)
    }
}
