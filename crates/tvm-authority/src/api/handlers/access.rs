//! Access Grant Handlers

use axum::{extract::State, Json};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use tvm_core::ServiceId;

use crate::api::error::ApiError;
use crate::api::state::AppState;

/// Request to grant access
#[derive(Debug, Deserialize)]
pub struct GrantRequest {
    pub source_id: ServiceId,
    pub target_id: ServiceId,

    /// Optional RFC 3339 expiry; the edge is absent afterwards
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

/// A `(source, target)` pair
#[derive(Debug, Deserialize)]
pub struct AccessPairRequest {
    pub source_id: ServiceId,
    pub target_id: ServiceId,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct OkResponse {
    pub ok: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CheckAccessResponse {
    pub allowed: bool,
}

/// Grant `source_id` access to `target_id`
///
/// POST /v1/access/grant
///
/// Both services must be registered. Idempotent.
pub async fn grant_access(
    State(state): State<Arc<AppState>>,
    Json(request): Json<GrantRequest>,
) -> Result<Json<OkResponse>, ApiError> {
    state
        .access
        .grant_until(request.source_id, request.target_id, request.expires_at)
        .await?;

    Ok(Json(OkResponse { ok: true }))
}

/// Revoke a grant
///
/// POST /v1/access/revoke
///
/// Idempotent; also drops any ticket cached for the pair.
pub async fn revoke_access(
    State(state): State<Arc<AppState>>,
    Json(request): Json<AccessPairRequest>,
) -> Result<Json<OkResponse>, ApiError> {
    state
        .authority
        .revoke_access(request.source_id, request.target_id)
        .await?;

    Ok(Json(OkResponse { ok: true }))
}

/// Check whether a live grant exists
///
/// POST /v1/access/check
pub async fn check_access(
    State(state): State<Arc<AppState>>,
    Json(request): Json<AccessPairRequest>,
) -> Result<Json<CheckAccessResponse>, ApiError> {
    let allowed = state
        .access
        .has_access(request.source_id, request.target_id)
        .await?;

    Ok(Json(CheckAccessResponse { allowed }))
}
