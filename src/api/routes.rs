//! HTTP surface of the control plane. Handlers stay thin: decode, call the
//! service, encode. Host installation is spawned off the request so a slow
//! playbook run never pins an HTTP connection; the caller polls the host
//! status instead.

use std::path::PathBuf;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;
use tracing::error;
use uuid::Uuid;

use crate::api::error::ApiError;
use crate::core::errors::Error;
use crate::core::model::{Host, NewHost, NewVm, RunVmConfig, Vm};
use crate::core::{HostService, VmService};

#[derive(Clone)]
pub struct AppState {
    pub hosts: Arc<HostService>,
    pub vms: Arc<VmService>,
    /// Default node agent binary shipped during install, overridable per
    /// request.
    pub local_node_path: PathBuf,
}

#[derive(Debug, Deserialize)]
pub struct AddHostRequest {
    pub name: String,
    pub address: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub local_node_path: Option<PathBuf>,
    #[serde(default)]
    pub should_install: bool,
}

#[derive(Debug, Deserialize, Default)]
pub struct InstallHostRequest {
    pub local_node_path: Option<PathBuf>,
}

#[derive(Debug, Serialize)]
pub struct IdResponse {
    pub id: Uuid,
}

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/v1/hosts", post(add_host))
        .route("/api/v1/hosts", get(list_hosts))
        .route("/api/v1/hosts/{id}", get(get_host))
        .route("/api/v1/hosts/{id}/install", post(install_host))
        .route("/api/v1/vms", post(add_vm))
        .route("/api/v1/vms", get(list_vms))
        .route("/api/v1/vms/start", post(start_vm))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[axum::debug_handler]
async fn add_host(
    State(state): State<Arc<AppState>>,
    Json(req): Json<AddHostRequest>,
) -> Result<Json<IdResponse>, ApiError> {
    let new_host = NewHost {
        name: req.name,
        address: req.address,
        port: req.port,
        user: req.user,
        password: req.password,
    };

    state.hosts.validate(&new_host).await?;
    let id = state.hosts.add_host(new_host).await?;

    if req.should_install {
        let node_path = req
            .local_node_path
            .unwrap_or_else(|| state.local_node_path.clone());
        spawn_install(&state, id, node_path).await?;
    }

    Ok(Json(IdResponse { id }))
}

#[axum::debug_handler]
async fn list_hosts(State(state): State<Arc<AppState>>) -> Result<Json<Vec<Host>>, ApiError> {
    Ok(Json(state.hosts.list_hosts().await?))
}

#[axum::debug_handler]
async fn get_host(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Host>, ApiError> {
    let host = state
        .hosts
        .host_by_id(id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("host {id}")))?;
    Ok(Json(host))
}

#[axum::debug_handler]
async fn install_host(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(req): Json<InstallHostRequest>,
) -> Result<(StatusCode, Json<IdResponse>), ApiError> {
    let node_path = req
        .local_node_path
        .unwrap_or_else(|| state.local_node_path.clone());
    spawn_install(&state, id, node_path).await?;

    Ok((StatusCode::ACCEPTED, Json(IdResponse { id })))
}

/// Kicks off an install independent of the request lifetime. The outcome
/// lands in the persisted host status.
async fn spawn_install(state: &AppState, id: Uuid, node_path: PathBuf) -> Result<(), ApiError> {
    let host = state
        .hosts
        .host_by_id(id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("host {id}")))?;

    let hosts = state.hosts.clone();
    tokio::spawn(async move {
        if let Err(err) = hosts.install_host(host, node_path).await {
            error!(host_id = %id, %err, "host install did not complete");
        }
    });

    Ok(())
}

#[axum::debug_handler]
async fn add_vm(
    State(state): State<Arc<AppState>>,
    Json(new_vm): Json<NewVm>,
) -> Result<Json<IdResponse>, ApiError> {
    let id = state.vms.add_vm(new_vm).await?;
    Ok(Json(IdResponse { id }))
}

#[axum::debug_handler]
async fn list_vms(State(state): State<Arc<AppState>>) -> Result<Json<Vec<Vm>>, ApiError> {
    Ok(Json(state.vms.list_vms().await?))
}

#[axum::debug_handler]
async fn start_vm(
    State(state): State<Arc<AppState>>,
    Json(config): Json<RunVmConfig>,
) -> Result<Json<Vm>, ApiError> {
    let vm = state.vms.start_vm(config).await?;
    Ok(Json(vm))
}
