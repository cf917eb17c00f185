use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A registered machine capable of running microVMs.
#[derive(Debug, Clone, Serialize)]
pub struct Host {
    pub id: Uuid,
    pub name: String,
    pub address: String,
    pub port: u16,
    pub user: String,
    // Never serialized into API responses.
    #[serde(skip_serializing)]
    pub password: String,
    pub status: HostStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HostStatus {
    Down,
    Installing,
    Up,
    Failed,
}

impl Host {
    /// Agent endpoint address, e.g. "10.0.0.1:9000".
    pub fn agent_address(&self) -> String {
        format!("{}:{}", self.address, self.port)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewHost {
    pub name: String,
    pub address: String,
    pub port: u16,
    pub user: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Vm {
    pub id: Uuid,
    pub name: String,
    pub host_id: Uuid,
    pub status: VmStatus,
    pub kernel_image: String,
    pub root_fs: String,
    pub memory_mb: u32,
    pub vcpus: u32,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VmStatus {
    Stopped,
    Running,
    Failed,
}

// Status codes used by the node agent protocol.
impl From<i32> for VmStatus {
    fn from(status: i32) -> Self {
        match status {
            0 => VmStatus::Stopped,
            1 => VmStatus::Running,
            _ => VmStatus::Failed,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewVm {
    pub name: String,
    pub host_id: Uuid,
    pub kernel_image: String,
    pub root_fs: String,
    pub memory_mb: u32,
    pub vcpus: u32,
}

/// Everything the node agent needs to boot a microVM, addressed to a
/// specific VM record and host.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunVmConfig {
    pub vm_id: Uuid,
    pub host_id: Uuid,
    pub kernel_image: String,
    pub root_fs: String,
    pub memory_mb: u32,
    pub vcpus: u32,
}
