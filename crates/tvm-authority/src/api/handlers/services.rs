//! Service Registration Handlers
//!
//! Registration, listing, lookup and update of services. Private keys never
//! leave the authority; views carry the public half only.

use axum::{
    extract::{Path, State},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

use tvm_core::ServiceId;

use crate::api::error::ApiError;
use crate::api::state::AppState;
use crate::registry::MAX_DESCRIPTION_LEN;
use crate::storage::Service;

/// Request to register a service
#[derive(Debug, Deserialize)]
pub struct RegisterServiceRequest {
    /// Unique service name
    pub name: String,

    #[serde(default)]
    pub description: String,
}

/// Response from service registration
#[derive(Debug, Serialize, Deserialize)]
pub struct RegisterServiceResponse {
    pub id: ServiceId,
    pub name: String,

    /// Base64-encoded Ed25519 public key
    pub public_key: String,
}

/// Public view of a registered service
#[derive(Debug, Serialize, Deserialize)]
pub struct ServiceView {
    pub id: ServiceId,
    pub name: String,
    pub description: String,
    pub public_key: String,
    pub key_version: u32,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub last_access_at: Option<DateTime<Utc>>,
}

impl From<Service> for ServiceView {
    fn from(service: Service) -> Self {
        Self {
            id: service.id,
            name: service.name,
            description: service.description,
            public_key: service.public_key.to_base64(),
            key_version: service.key_version,
            active: service.active,
            created_at: service.created_at,
            last_access_at: service.last_access_at,
        }
    }
}

/// Response listing services
#[derive(Debug, Serialize, Deserialize)]
pub struct ListServicesResponse {
    pub services: Vec<ServiceView>,
    pub count: usize,
}

/// Partial update of a service
#[derive(Debug, Deserialize)]
pub struct UpdateServiceRequest {
    pub description: Option<String>,
    pub active: Option<bool>,
}

/// Register a service and generate its key pair
///
/// POST /v1/services
pub async fn register_service(
    State(state): State<Arc<AppState>>,
    Json(request): Json<RegisterServiceRequest>,
) -> Result<Json<RegisterServiceResponse>, ApiError> {
    let service = state
        .registry
        .register(&request.name, &request.description)
        .await?;

    Ok(Json(RegisterServiceResponse {
        id: service.id,
        name: service.name,
        public_key: service.public_key.to_base64(),
    }))
}

/// List registered services
///
/// GET /v1/services
pub async fn list_services(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ListServicesResponse>, ApiError> {
    let services: Vec<ServiceView> = state
        .registry
        .list()
        .await?
        .into_iter()
        .map(ServiceView::from)
        .collect();
    let count = services.len();

    Ok(Json(ListServicesResponse { services, count }))
}

/// Get one service
///
/// GET /v1/services/{id}
pub async fn get_service(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<ServiceView>, ApiError> {
    let service = state.registry.get_by_id(ServiceId(id)).await?;
    Ok(Json(service.into()))
}

/// Update description or active flag
///
/// PATCH /v1/services/{id}
///
/// Deactivating a service stops it from obtaining or presenting tickets
/// without deleting its history.
pub async fn update_service(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(request): Json<UpdateServiceRequest>,
) -> Result<Json<ServiceView>, ApiError> {
    let mut service = state.registry.get_by_id(ServiceId(id)).await?;

    if let Some(description) = request.description {
        if description.len() > MAX_DESCRIPTION_LEN {
            return Err(ApiError::BadRequest(format!(
                "description too long (max {} chars)",
                MAX_DESCRIPTION_LEN
            )));
        }
        service.description = description;
    }
    if let Some(active) = request.active {
        if service.active != active {
            info!(service_id = %service.id, active, "Changing service activation");
        }
        service.active = active;
    }

    state.registry.update(&service).await?;
    let updated = state.registry.get_by_id(service.id).await?;
    Ok(Json(updated.into()))
}
