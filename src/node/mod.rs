//! Node connection management: one live channel per host, owned by the
//! [`ConnectionPool`]. Nothing in here knows about host lifecycle semantics;
//! the pool only dials, stores, hands out and closes channels.

pub mod agent;

pub use agent::GrpcConnector;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::core::errors::{Error, Result};
use crate::core::model::{RunVmConfig, VmStatus};

/// What the remote agent reported back for a started VM.
#[derive(Debug, Clone)]
pub struct VmDescriptor {
    pub vm_id: Uuid,
    pub status: VmStatus,
}

/// A live, reusable channel to a host's node agent.
#[async_trait]
pub trait NodeChannel: Send + Sync {
    async fn start_vm(&self, config: &RunVmConfig) -> Result<VmDescriptor>;

    /// Tears down the underlying transport. Called by the pool when the
    /// channel is replaced, removed or drained at shutdown.
    async fn close(&self) -> Result<()>;
}

/// Dials a node agent. Implementations must return a channel that is ready
/// to carry requests; the pool puts a deadline around every attempt.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, address: &str) -> Result<Arc<dyn NodeChannel>>;
}

/// Dial policy for [`ConnectionPool::create`]: per-attempt timeout,
/// exponential backoff between attempts, capped attempt count.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub connect_timeout: Duration,
    pub max_attempts: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
            max_attempts: 3,
            backoff: Duration::from_millis(200),
        }
    }
}

pub struct ConnectionPool {
    connector: Arc<dyn Connector>,
    policy: RetryPolicy,
    channels: RwLock<HashMap<Uuid, Arc<dyn NodeChannel>>>,
    // Per-host guards so concurrent create() calls for the same host cannot
    // both install a channel. Entries are never pruned; the fleet is small
    // and bounded.
    dialing: Mutex<HashMap<Uuid, Arc<Mutex<()>>>>,
}

impl ConnectionPool {
    pub fn new(connector: Arc<dyn Connector>, policy: RetryPolicy) -> Self {
        Self {
            connector,
            policy,
            channels: RwLock::new(HashMap::new()),
            dialing: Mutex::new(HashMap::new()),
        }
    }

    /// Dials `address` and installs the channel for `host_id`, closing any
    /// channel it replaces. Serialized per host: of two concurrent calls,
    /// the second waits and then supersedes the first's channel.
    pub async fn create(&self, host_id: Uuid, address: &str) -> Result<Arc<dyn NodeChannel>> {
        let guard = {
            let mut dialing = self.dialing.lock().await;
            dialing
                .entry(host_id)
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        let _installing = guard.lock().await;

        let channel = self.dial(address).await?;

        let replaced = self.channels.write().await.remove(&host_id);
        if let Some(old) = replaced {
            if let Err(err) = old.close().await {
                warn!(%host_id, %err, "failed to close superseded channel");
            }
        }
        self.channels
            .write()
            .await
            .insert(host_id, channel.clone());

        debug!(%host_id, address, "installed node channel");
        Ok(channel)
    }

    async fn dial(&self, address: &str) -> Result<Arc<dyn NodeChannel>> {
        let mut delay = self.policy.backoff;
        let mut last_err = Error::Connection(format!("no dial attempts made for {address}"));

        for attempt in 1..=self.policy.max_attempts {
            match tokio::time::timeout(self.policy.connect_timeout, self.connector.connect(address))
                .await
            {
                Ok(Ok(channel)) => return Ok(channel),
                Ok(Err(err)) => last_err = err,
                Err(_) => {
                    last_err = Error::Connection(format!(
                        "timed out dialing {address} after {:?}",
                        self.policy.connect_timeout
                    ))
                }
            }

            debug!(address, attempt, %last_err, "dial attempt failed");
            if attempt < self.policy.max_attempts {
                tokio::time::sleep(delay).await;
                delay *= 2;
            }
        }

        Err(last_err)
    }

    /// Returns the current channel for `host_id`, if any. Never waits for a
    /// connection to become ready.
    pub async fn get(&self, host_id: Uuid) -> Option<Arc<dyn NodeChannel>> {
        self.channels.read().await.get(&host_id).cloned()
    }

    /// Closes and removes the channel for `host_id`. Closing an absent entry
    /// is a no-op.
    pub async fn close(&self, host_id: Uuid) -> Result<()> {
        let channel = self.channels.write().await.remove(&host_id);
        match channel {
            Some(channel) => channel.close().await,
            None => Ok(()),
        }
    }

    /// Closes every tracked channel, continuing past individual failures.
    /// Returns one error per channel that failed to close.
    pub async fn shutdown_all(&self) -> Vec<Error> {
        let drained: Vec<(Uuid, Arc<dyn NodeChannel>)> =
            self.channels.write().await.drain().collect();

        let mut errors = Vec::new();
        for (host_id, channel) in drained {
            if let Err(err) = channel.close().await {
                warn!(%host_id, %err, "failed to close node channel");
                errors.push(err);
            }
        }
        errors
    }
}
