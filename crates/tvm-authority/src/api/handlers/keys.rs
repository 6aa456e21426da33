//! Service Key Handlers
//!
//! Public key distribution for local verifiers, key rotation and the
//! rotation audit log.

use axum::{
    extract::{Path, State},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use tvm_core::ServiceId;

use crate::api::error::ApiError;
use crate::api::state::AppState;
use crate::storage::KeyRotationRecord;

/// Current public key of a service
#[derive(Debug, Serialize, Deserialize)]
pub struct PublicKeyResponse {
    pub service_id: ServiceId,

    /// Base64-encoded Ed25519 public key (32 bytes)
    pub public_key: String,

    pub key_version: u32,
    pub algorithm: String,
}

/// Response from key rotation
#[derive(Debug, Serialize, Deserialize)]
pub struct RotateKeyResponse {
    pub ok: bool,
    pub key_version: u32,
    pub public_key: String,
}

/// One entry of the rotation log
#[derive(Debug, Serialize, Deserialize)]
pub struct RotationView {
    pub old_key_version: u32,
    pub new_key_version: u32,
    pub old_public_key: String,
    pub new_public_key: String,
    pub rotated_at: DateTime<Utc>,
}

impl From<KeyRotationRecord> for RotationView {
    fn from(record: KeyRotationRecord) -> Self {
        Self {
            old_key_version: record.old_key_version,
            new_key_version: record.new_key_version,
            old_public_key: record.old_public_key.to_base64(),
            new_public_key: record.new_public_key.to_base64(),
            rotated_at: record.rotated_at,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ListRotationsResponse {
    pub rotations: Vec<RotationView>,
}

/// Get a service's current public key
///
/// GET /v1/services/{id}/public-key
pub async fn get_public_key(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<PublicKeyResponse>, ApiError> {
    let service = state.registry.get_by_id(ServiceId(id)).await?;

    Ok(Json(PublicKeyResponse {
        service_id: service.id,
        public_key: service.public_key.to_base64(),
        key_version: service.key_version,
        algorithm: state.registry.key_manager().algorithm().to_string(),
    }))
}

/// Rotate a service's key pair
///
/// POST /v1/services/{id}/rotate
pub async fn rotate_key(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<RotateKeyResponse>, ApiError> {
    let record = state.rotation.rotate(ServiceId(id)).await?;

    Ok(Json(RotateKeyResponse {
        ok: true,
        key_version: record.new_key_version,
        public_key: record.new_public_key.to_base64(),
    }))
}

/// Rotation history, newest first
///
/// GET /v1/services/{id}/rotations
pub async fn list_rotations(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<ListRotationsResponse>, ApiError> {
    let rotations = state
        .rotation
        .history(ServiceId(id))
        .await?
        .into_iter()
        .map(RotationView::from)
        .collect();

    Ok(Json(ListRotationsResponse { rotations }))
}
