//! VM orchestration: registering VM records and starting them on a specific
//! host through its node channel. This service never touches host status or
//! the connection map directly.

use std::sync::Arc;

use tracing::info;

use crate::core::errors::{Error, Result};
use crate::core::hosts::HostService;
use crate::core::model::{NewVm, RunVmConfig, Vm, VmStatus};
use crate::repositories::Vms;
use uuid::Uuid;

pub struct VmService {
    vms: Arc<dyn Vms>,
    hosts: Arc<HostService>,
}

impl VmService {
    pub fn new(vms: Arc<dyn Vms>, hosts: Arc<HostService>) -> Self {
        Self { vms, hosts }
    }

    /// Records a VM. Registration is decoupled from execution: the owning
    /// host does not need to be UP yet.
    pub async fn add_vm(&self, new_vm: NewVm) -> Result<Uuid> {
        let vm = Vm {
            id: Uuid::nil(), // assigned by the repository
            name: new_vm.name,
            host_id: new_vm.host_id,
            status: VmStatus::Stopped,
            kernel_image: new_vm.kernel_image,
            root_fs: new_vm.root_fs,
            memory_mb: new_vm.memory_mb,
            vcpus: new_vm.vcpus,
            created_at: chrono::Utc::now(),
        };

        self.vms.add_vm(vm).await
    }

    /// Starts a VM on the host named in `config`. Fails fast with
    /// `HostUnavailable` when no live channel exists — no blocking wait, no
    /// implicit reconnect; retry policy belongs to the caller.
    pub async fn start_vm(&self, config: RunVmConfig) -> Result<Vm> {
        let vm = self
            .vms
            .vm_by_id(config.vm_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("vm {}", config.vm_id)))?;

        let channel = self
            .hosts
            .get_connection(config.host_id)
            .await
            .ok_or(Error::HostUnavailable(config.host_id))?;

        info!(vm = %vm.name, host_id = %config.host_id, "forwarding start request to node agent");
        let descriptor = channel.start_vm(&config).await?;

        Ok(Vm {
            status: descriptor.status,
            ..vm
        })
    }

    pub async fn list_vms(&self) -> Result<Vec<Vm>> {
        self.vms.list_vms().await
    }
}
