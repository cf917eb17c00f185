//! gRPC transport to the node agent. The agent exposes a single unary call
//! this control plane cares about: start a microVM from a run configuration
//! and get a descriptor back. The client below is what tonic codegen would
//! emit for that method, written out by hand since we carry no .proto build
//! step.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tonic::codegen::http::uri::PathAndQuery;
use tonic::transport::{Channel, Endpoint};
use uuid::Uuid;

use crate::core::errors::{Error, Result};
use crate::core::model::{RunVmConfig, VmStatus};
use crate::node::{Connector, NodeChannel, VmDescriptor};

const START_VM_PATH: &str = "/node.NodeAgent/StartVm";

// Deadline carried on every StartVm request so a wedged agent cannot hold
// the caller forever.
const START_VM_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Clone, PartialEq, prost::Message)]
pub struct StartVmRequest {
    #[prost(string, tag = "1")]
    pub vm_id: String,
    #[prost(string, tag = "2")]
    pub kernel_image: String,
    #[prost(string, tag = "3")]
    pub root_fs: String,
    #[prost(uint32, tag = "4")]
    pub memory_mb: u32,
    #[prost(uint32, tag = "5")]
    pub vcpus: u32,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct StartVmResponse {
    #[prost(string, tag = "1")]
    pub vm_id: String,
    #[prost(int32, tag = "2")]
    pub status: i32,
}

impl From<&RunVmConfig> for StartVmRequest {
    fn from(config: &RunVmConfig) -> Self {
        Self {
            vm_id: config.vm_id.to_string(),
            kernel_image: config.kernel_image.clone(),
            root_fs: config.root_fs.clone(),
            memory_mb: config.memory_mb,
            vcpus: config.vcpus,
        }
    }
}

/// Dials node agents over plain HTTP/2. `Endpoint::connect` resolves only
/// once the channel is ready, so callers never have to poll readiness.
pub struct GrpcConnector;

#[async_trait]
impl Connector for GrpcConnector {
    async fn connect(&self, address: &str) -> Result<Arc<dyn NodeChannel>> {
        let endpoint = Endpoint::from_shared(format!("http://{address}"))?;
        let channel = endpoint.connect().await?;
        Ok(Arc::new(AgentChannel::new(channel)))
    }
}

pub struct AgentChannel {
    // tonic's unary call takes &mut; the pool hands out shared handles.
    inner: Mutex<tonic::client::Grpc<Channel>>,
}

impl AgentChannel {
    pub fn new(channel: Channel) -> Self {
        Self {
            inner: Mutex::new(tonic::client::Grpc::new(channel)),
        }
    }
}

#[async_trait]
impl NodeChannel for AgentChannel {
    async fn start_vm(&self, config: &RunVmConfig) -> Result<VmDescriptor> {
        let mut request = tonic::Request::new(StartVmRequest::from(config));
        request.set_timeout(START_VM_TIMEOUT);

        let mut grpc = self.inner.lock().await;
        grpc.ready()
            .await
            .map_err(|err| Error::Connection(err.to_string()))?;

        let codec: tonic::codec::ProstCodec<StartVmRequest, StartVmResponse> =
            tonic::codec::ProstCodec::default();
        let path = PathAndQuery::from_static(START_VM_PATH);
        let response: tonic::Response<StartVmResponse> =
            grpc.unary(request, path, codec).await?;

        let reply = response.into_inner();
        let vm_id = Uuid::parse_str(&reply.vm_id).map_err(|err| {
            Error::RemoteExecution(format!("agent returned an invalid vm id: {err}"))
        })?;

        Ok(VmDescriptor {
            vm_id,
            status: VmStatus::from(reply.status),
        })
    }

    async fn close(&self) -> Result<()> {
        // tonic channels tear down their transport on drop; removal from the
        // pool drops the last strong handle.
        Ok(())
    }
}
