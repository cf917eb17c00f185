#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;

use microvm_fleet_manager::core::errors::{Error, Result};
use microvm_fleet_manager::core::model::{NewHost, RunVmConfig, VmStatus};
use microvm_fleet_manager::installer::{InstallConfig, Installer};
use microvm_fleet_manager::node::{ConnectionPool, Connector, NodeChannel, RetryPolicy, VmDescriptor};

/// Channel that records calls instead of talking to a network.
pub struct MockChannel {
    pub closed: AtomicBool,
    pub close_fails: bool,
    pub start_fails: AtomicBool,
    pub start_calls: AtomicUsize,
}

#[async_trait]
impl NodeChannel for MockChannel {
    async fn start_vm(&self, config: &RunVmConfig) -> Result<VmDescriptor> {
        self.start_calls.fetch_add(1, Ordering::SeqCst);
        if self.start_fails.load(Ordering::SeqCst) {
            return Err(Error::RemoteExecution("agent rejected the run request".into()));
        }
        Ok(VmDescriptor {
            vm_id: config.vm_id,
            status: VmStatus::Running,
        })
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        if self.close_fails {
            return Err(Error::Connection("close refused".into()));
        }
        Ok(())
    }
}

/// Connector that fabricates `MockChannel`s, with per-address dial failures
/// and per-address close failures scripted by the test.
#[derive(Default)]
pub struct MockConnector {
    pub dials: AtomicUsize,
    pub fail_addresses: Mutex<HashSet<String>>,
    pub close_fails_for: Mutex<HashSet<String>>,
    pub channels: Mutex<Vec<Arc<MockChannel>>>,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_dials_to(&self, address: &str) {
        self.fail_addresses.lock().unwrap().insert(address.to_string());
    }

    pub fn fail_close_for(&self, address: &str) {
        self.close_fails_for.lock().unwrap().insert(address.to_string());
    }

    /// The most recently created channel.
    pub fn last_channel(&self) -> Arc<MockChannel> {
        self.channels.lock().unwrap().last().cloned().unwrap()
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(&self, address: &str) -> Result<Arc<dyn NodeChannel>> {
        self.dials.fetch_add(1, Ordering::SeqCst);
        if self.fail_addresses.lock().unwrap().contains(address) {
            return Err(Error::Connection(format!("connection refused: {address}")));
        }

        let channel = Arc::new(MockChannel {
            closed: AtomicBool::new(false),
            close_fails: self.close_fails_for.lock().unwrap().contains(address),
            start_fails: AtomicBool::new(false),
            start_calls: AtomicUsize::new(0),
        });
        self.channels.lock().unwrap().push(channel.clone());
        Ok(channel)
    }
}

pub struct MockInstaller {
    pub calls: AtomicUsize,
    pub should_fail: AtomicBool,
}

impl MockInstaller {
    pub fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            should_fail: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl Installer for MockInstaller {
    async fn install(
        &self,
        _host: &microvm_fleet_manager::core::model::Host,
        _config: &InstallConfig,
    ) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.should_fail.load(Ordering::SeqCst) {
            return Err(Error::Install("playbook run failed".into()));
        }
        Ok(())
    }
}

/// Pool with test-sized dial timeouts so failure paths stay fast.
pub fn test_pool(connector: Arc<MockConnector>) -> ConnectionPool {
    ConnectionPool::new(
        connector,
        RetryPolicy {
            connect_timeout: Duration::from_millis(250),
            max_attempts: 2,
            backoff: Duration::from_millis(1),
        },
    )
}

static NEXT_HOST: AtomicUsize = AtomicUsize::new(1);

/// Host registration with a unique name and address, so tests sharing a
/// repository never trip the duplicate checks by accident.
pub fn test_new_host() -> NewHost {
    let n = NEXT_HOST.fetch_add(1, Ordering::SeqCst);
    let mut rng = rand::thread_rng();
    NewHost {
        name: format!("test-host-{}-{}", n, rng.gen::<u32>()),
        address: format!("10.0.{}.{}", n / 250, n % 250 + 1),
        port: 9000,
        user: "root".into(),
        password: "hunter2".into(),
    }
}
