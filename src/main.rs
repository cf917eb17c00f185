use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::{error, info, warn};

use microvm_fleet_manager::api::{self, AppState};
use microvm_fleet_manager::config::Settings;
use microvm_fleet_manager::core::{HostService, VmService};
use microvm_fleet_manager::installer::AnsibleInstaller;
use microvm_fleet_manager::node::{ConnectionPool, GrpcConnector, RetryPolicy};
use microvm_fleet_manager::repositories::{InMemoryHosts, InMemoryVms};

#[derive(Parser)]
#[command(name = "microvm-fleet-manager")]
#[command(about = "Control plane for a fleet of microVM hosts")]
struct Args {
    /// Port to listen on (overrides the configured server.port)
    #[arg(short, long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();
    info!("Starting microVM fleet manager");

    let args = Args::parse();
    let settings = Settings::new()?;
    let port = args.port.unwrap_or(settings.server.port);

    let policy = RetryPolicy {
        connect_timeout: Duration::from_secs(settings.node.connect_timeout_secs),
        max_attempts: settings.node.connect_attempts,
        backoff: Duration::from_millis(settings.node.connect_backoff_ms),
    };
    let pool = Arc::new(ConnectionPool::new(Arc::new(GrpcConnector), policy));

    let installer = Arc::new(AnsibleInstaller::new(settings.installer.playbook_path.clone()));
    let host_repo = Arc::new(InMemoryHosts::new());
    let vm_repo = Arc::new(InMemoryVms::new());

    let hosts = Arc::new(HostService::new(host_repo, pool.clone(), installer));

    let errors = hosts.initialize_hosts().await;
    if !errors.is_empty() {
        error!(?errors, "some hosts failed to initialize");
    }

    let vms = Arc::new(VmService::new(vm_repo, hosts.clone()));

    let state = Arc::new(AppState {
        hosts,
        vms,
        local_node_path: settings.node.local_node_path.clone(),
    });
    let app = api::create_router(state);

    let addr: SocketAddr = format!("{}:{}", settings.server.host, port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Shutting down node connections...");
    let errors = pool.shutdown_all().await;
    if !errors.is_empty() {
        warn!(?errors, "some node connections failed to close");
    }
    info!("Exiting...");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(%err, "failed to listen for shutdown signal");
    }
}
