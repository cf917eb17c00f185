mod common;

use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use anyhow::Result;

use common::{test_new_host, test_pool, MockConnector, MockInstaller};
use microvm_fleet_manager::core::errors::Error;
use microvm_fleet_manager::core::model::HostStatus;
use microvm_fleet_manager::core::HostService;
use microvm_fleet_manager::repositories::{Hosts, InMemoryHosts};

struct Fixture {
    repo: Arc<InMemoryHosts>,
    connector: Arc<MockConnector>,
    installer: Arc<MockInstaller>,
    service: HostService,
}

fn fixture() -> Fixture {
    let repo = Arc::new(InMemoryHosts::new());
    let connector = Arc::new(MockConnector::new());
    let installer = Arc::new(MockInstaller::new());
    let service = HostService::new(
        repo.clone(),
        Arc::new(test_pool(connector.clone())),
        installer.clone(),
    );
    Fixture {
        repo,
        connector,
        installer,
        service,
    }
}

fn node_path() -> PathBuf {
    PathBuf::from("/usr/local/bin/fleet-node")
}

#[tokio::test]
async fn add_host_starts_in_down() -> Result<()> {
    let fx = fixture();
    let id = fx.service.add_host(test_new_host()).await?;

    let host = fx.repo.host_by_id(id).await?.expect("host was just added");
    assert_eq!(host.status, HostStatus::Down);
    Ok(())
}

#[tokio::test]
async fn validate_rejects_duplicate_address_and_name() -> Result<()> {
    let fx = fixture();
    let first = test_new_host();
    fx.service.add_host(first.clone()).await?;

    let mut same_address = test_new_host();
    same_address.address = first.address.clone();
    assert!(matches!(
        fx.service.validate(&same_address).await,
        Err(Error::AlreadyExists(_))
    ));

    let mut same_name = test_new_host();
    same_name.name = first.name.clone();
    assert!(matches!(
        fx.service.validate(&same_name).await,
        Err(Error::AlreadyExists(_))
    ));
    Ok(())
}

#[tokio::test]
async fn failed_host_identity_is_reusable() -> Result<()> {
    let fx = fixture();
    let first = test_new_host();
    let id = fx.service.add_host(first.clone()).await?;

    let host = fx.repo.host_by_id(id).await?.unwrap();
    fx.service
        .update_host_status(&host, HostStatus::Failed)
        .await?;

    // Same name and address as the failed host: a fresh registration is
    // allowed to take them over.
    assert!(fx.service.validate(&first).await.is_ok());
    Ok(())
}

#[tokio::test]
async fn reused_identity_of_a_failed_host_still_blocks_duplicates() -> Result<()> {
    let fx = fixture();
    let first = test_new_host();
    let id = fx.service.add_host(first.clone()).await?;
    let host = fx.repo.host_by_id(id).await?.unwrap();
    fx.service
        .update_host_status(&host, HostStatus::Failed)
        .await?;

    // A fresh registration legitimately takes over the failed host's name
    // and address.
    fx.service.validate(&first).await?;
    fx.service.add_host(first.clone()).await?;

    // Both records now share the identity. A third registration must be
    // rejected: the failed shadow must not mask the active holder.
    let mut same_address = test_new_host();
    same_address.address = first.address.clone();
    assert!(matches!(
        fx.service.validate(&same_address).await,
        Err(Error::AlreadyExists(_))
    ));

    let mut same_name = test_new_host();
    same_name.name = first.name.clone();
    assert!(matches!(
        fx.service.validate(&same_name).await,
        Err(Error::AlreadyExists(_))
    ));
    Ok(())
}

#[tokio::test]
async fn install_success_brings_host_up_with_a_channel() -> Result<()> {
    let fx = fixture();
    let id = fx.service.add_host(test_new_host()).await?;
    let host = fx.repo.host_by_id(id).await?.unwrap();

    fx.service.install_host(host, node_path()).await?;

    let host = fx.repo.host_by_id(id).await?.unwrap();
    assert_eq!(host.status, HostStatus::Up);
    assert!(fx.service.get_connection(id).await.is_some());
    assert_eq!(fx.installer.calls.load(Ordering::SeqCst), 1);
    Ok(())
}

#[tokio::test]
async fn install_failure_marks_host_failed() -> Result<()> {
    let fx = fixture();
    fx.installer.should_fail.store(true, Ordering::SeqCst);

    let id = fx.service.add_host(test_new_host()).await?;
    let host = fx.repo.host_by_id(id).await?.unwrap();

    let result = fx.service.install_host(host, node_path()).await;
    assert!(matches!(result, Err(Error::Install(_))));

    let host = fx.repo.host_by_id(id).await?.unwrap();
    assert_eq!(host.status, HostStatus::Failed);
    assert!(fx.service.get_connection(id).await.is_none());
    // Provisioning never ran to completion, so no dial was attempted.
    assert_eq!(fx.connector.dials.load(Ordering::SeqCst), 0);
    Ok(())
}

#[tokio::test]
async fn connect_failure_after_install_marks_host_failed() -> Result<()> {
    let fx = fixture();
    let new_host = test_new_host();
    let agent_address = format!("{}:{}", new_host.address, new_host.port);
    fx.connector.fail_dials_to(&agent_address);

    let id = fx.service.add_host(new_host).await?;
    let host = fx.repo.host_by_id(id).await?.unwrap();

    let result = fx.service.install_host(host, node_path()).await;
    assert!(matches!(result, Err(Error::Connection(_))));

    // Provisioning succeeded but the host is unreachable: FAILED, never a
    // silently-unreachable UP, and never stuck INSTALLING.
    let host = fx.repo.host_by_id(id).await?.unwrap();
    assert_eq!(host.status, HostStatus::Failed);
    assert!(fx.service.get_connection(id).await.is_none());
    assert_eq!(fx.installer.calls.load(Ordering::SeqCst), 1);
    Ok(())
}

#[tokio::test]
async fn reinstalling_a_failed_host_can_recover_it() -> Result<()> {
    let fx = fixture();
    fx.installer.should_fail.store(true, Ordering::SeqCst);

    let id = fx.service.add_host(test_new_host()).await?;
    let host = fx.repo.host_by_id(id).await?.unwrap();
    let _ = fx.service.install_host(host, node_path()).await;

    fx.installer.should_fail.store(false, Ordering::SeqCst);
    let host = fx.repo.host_by_id(id).await?.unwrap();
    assert_eq!(host.status, HostStatus::Failed);

    fx.service.install_host(host, node_path()).await?;

    let host = fx.repo.host_by_id(id).await?.unwrap();
    assert_eq!(host.status, HostStatus::Up);
    assert!(fx.service.get_connection(id).await.is_some());
    Ok(())
}

#[tokio::test]
async fn update_host_status_persists_the_requested_status() -> Result<()> {
    let fx = fixture();
    let id = fx.service.add_host(test_new_host()).await?;
    let host = fx.repo.host_by_id(id).await?.unwrap();

    for status in [
        HostStatus::Installing,
        HostStatus::Failed,
        HostStatus::Up,
        HostStatus::Down,
    ] {
        fx.service.update_host_status(&host, status).await?;
        let persisted = fx.repo.host_by_id(id).await?.unwrap();
        assert_eq!(persisted.status, status);
    }
    Ok(())
}

#[tokio::test]
async fn initialize_hosts_reports_one_error_per_unreachable_host() -> Result<()> {
    let fx = fixture();

    let mut up_ids = Vec::new();
    for _ in 0..3 {
        let id = fx.service.add_host(test_new_host()).await?;
        let host = fx.repo.host_by_id(id).await?.unwrap();
        fx.service.update_host_status(&host, HostStatus::Up).await?;
        up_ids.push(id);
    }
    // A DOWN host must not be dialed at startup.
    let down_id = fx.service.add_host(test_new_host()).await?;

    let unreachable = fx.repo.host_by_id(up_ids[1]).await?.unwrap();
    fx.connector.fail_dials_to(&unreachable.agent_address());

    let errors = fx.service.initialize_hosts().await;

    assert_eq!(errors.len(), 1);
    assert!(fx.service.get_connection(up_ids[0]).await.is_some());
    assert!(fx.service.get_connection(up_ids[1]).await.is_none());
    assert!(fx.service.get_connection(up_ids[2]).await.is_some());
    assert!(fx.service.get_connection(down_id).await.is_none());
    Ok(())
}
