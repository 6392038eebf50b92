use std::sync::Arc;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use tokio::sync::watch;
use crate::api::discovery::ServiceDiscovery;
use crate::error::RegistryError;
use shared::protocol::API_PREFIX;
use shared::types::{CatalogStatus, Labels, Service, ServiceInstance};

#[derive(Clone)]
pub struct AppState {
    pub discovery: ServiceDiscovery,
    pub status_rx: watch::Receiver<CatalogStatus>,
}

#[derive(Deserialize)]
pub struct InstanceQuery {
    /// Comma-separated port names
    pub ports: Option<String>,
    /// Comma-separated `key=value` pairs
    pub labels: Option<String>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route(&format!("{API_PREFIX}/services"), get(get_services))
        .route(&format!("{API_PREFIX}/services/hash"), get(get_hash))
        .route(&format!("{API_PREFIX}/services/:hostname"), get(get_service))
        .route(&format!("{API_PREFIX}/services/:hostname/instances"), get(get_instances))
        .route(&format!("{API_PREFIX}/instances"), get(get_all_instances))
        .route(&format!("{API_PREFIX}/catalog/status"), get(get_status))
        .with_state(state)
}

fn internal_error(e: RegistryError) -> StatusCode {
    tracing::error!("Failed to query catalog: {}", e);
    StatusCode::INTERNAL_SERVER_ERROR
}

async fn get_services(State(state): State<AppState>) -> Result<Json<Vec<Arc<Service>>>, StatusCode> {
    state
        .discovery
        .services()
        .await
        .map(Json)
        .map_err(internal_error)
}

async fn get_hash(State(state): State<AppState>) -> Result<String, StatusCode> {
    state.discovery.digest().await.map_err(internal_error)
}

async fn get_service(
    State(state): State<AppState>,
    Path(hostname): Path<String>,
) -> Result<Json<Arc<Service>>, StatusCode> {
    state
        .discovery
        .get_service(&hostname)
        .await
        .map_err(internal_error)?
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}

async fn get_instances(
    State(state): State<AppState>,
    Path(hostname): Path<String>,
    Query(params): Query<InstanceQuery>,
) -> Result<Json<Vec<ServiceInstance>>, StatusCode> {
    let ports = parse_ports(params.ports.as_deref().unwrap_or_default());
    let labels = parse_labels(params.labels.as_deref().unwrap_or_default()).map_err(|e| {
        tracing::debug!("Rejected label filter: {}", e);
        StatusCode::BAD_REQUEST
    })?;

    state
        .discovery
        .instances(&hostname, &ports, &labels)
        .await
        .map(Json)
        .map_err(internal_error)
}

async fn get_all_instances(
    State(state): State<AppState>,
) -> Result<Json<Vec<ServiceInstance>>, StatusCode> {
    state
        .discovery
        .host_instances()
        .await
        .map(Json)
        .map_err(internal_error)
}

async fn get_status(State(state): State<AppState>) -> Json<CatalogStatus> {
    Json(state.status_rx.borrow().clone())
}

fn parse_ports(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_labels(raw: &str) -> Result<Labels, String> {
    raw.split(',')
        .map(str::trim)
        .filter(|pair| !pair.is_empty())
        .map(|pair| match pair.split_once('=') {
            Some((key, value)) if !key.trim().is_empty() => {
                Ok((key.trim().to_string(), value.trim().to_string()))
            }
            _ => Err(format!("expected key=value, got '{pair}'")),
        })
        .collect()
}
