//! Ticket Issue and Validate Handlers
//!
//! The transport in front of the authority is responsible for proving that
//! the caller of `issue` really is `source_id`.

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use tvm_core::{Claims, ServiceId};

use crate::api::error::ApiError;
use crate::api::state::AppState;

/// Request to issue a ticket
#[derive(Debug, Deserialize)]
pub struct IssueTicketRequest {
    pub source_id: ServiceId,
    pub target_id: ServiceId,
}

/// Response from ticket issuance
#[derive(Debug, Serialize, Deserialize)]
pub struct IssueTicketResponse {
    /// Encoded ticket, ready for the `x-tvm-ticket` header
    pub ticket: String,

    /// Expiry (unix seconds)
    pub expires_at: i64,
}

/// Request to validate a ticket
#[derive(Debug, Deserialize)]
pub struct ValidateTicketRequest {
    pub ticket: String,
}

/// Response from ticket validation
#[derive(Debug, Serialize, Deserialize)]
pub struct ValidateTicketResponse {
    pub claims: Claims,
}

/// Issue a ticket for `source_id` to call `target_id`
///
/// POST /v1/tickets/issue
pub async fn issue_ticket(
    State(state): State<Arc<AppState>>,
    Json(request): Json<IssueTicketRequest>,
) -> Result<Json<IssueTicketResponse>, ApiError> {
    let ticket = state
        .authority
        .issue(request.source_id, request.target_id)
        .await?;

    let encoded = ticket
        .encode()
        .map_err(|e| ApiError::Internal(format!("ticket encoding failed: {}", e)))?;

    Ok(Json(IssueTicketResponse {
        ticket: encoded,
        expires_at: ticket.claims.expires_at,
    }))
}

/// Validate an encoded ticket
///
/// POST /v1/tickets/validate
pub async fn validate_ticket(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ValidateTicketRequest>,
) -> Result<Json<ValidateTicketResponse>, ApiError> {
    let claims = state.authority.validate_encoded(&request.ticket).await?;
    Ok(Json(ValidateTicketResponse { claims }))
}
