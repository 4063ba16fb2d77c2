//! API Handlers
//!
//! Request handlers for the relay HTTP API.
//!
//! Status mapping: malformed bodies are 400, a full relay is 503, and a
//! proof that fails verification is 200 with `success: false`.

use std::str::FromStr;
use std::sync::Arc;

use axum::{
    extract::{Json, Path, State, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use log::{error, warn};
use solana_sdk::pubkey::Pubkey;

use super::types::*;
use crate::error::RelayError;
use crate::service::{RelayKind, RelayRequest, RelayService};
use shade_privacy::field;

// ============================================================================
// Shared State
// ============================================================================

#[derive(Clone)]
pub struct ApiState {
    pub service: Arc<RelayService>,
    pub start_time: std::time::Instant,
}

impl ApiState {
    pub fn new(service: Arc<RelayService>) -> Self {
        Self {
            service,
            start_time: std::time::Instant::now(),
        }
    }
}

// ============================================================================
// Health & Info
// ============================================================================

/// Health check endpoint
pub async fn health(State(state): State<ApiState>) -> impl IntoResponse {
    let snapshot = state.service.snapshot();

    Json(HealthResponse {
        healthy: true,
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.start_time.elapsed().as_secs(),
        pending_count: snapshot.records,
        in_flight: snapshot.in_flight,
        verification_enabled: snapshot.verification_enabled,
    })
}

/// Relayer balance, fee terms and capacity
pub async fn info(State(state): State<ApiState>) -> impl IntoResponse {
    let service = &state.service;
    let balance = match service.ledger().balance().await {
        Ok(balance) => Some(balance),
        Err(e) => {
            warn!("Balance lookup failed: {}", e);
            None
        }
    };
    let snapshot = service.snapshot();
    let settings = service.settings();

    Json(InfoResponse {
        relayer: service.ledger().relayer(),
        balance,
        fee_bps: settings.fee_bps,
        fee_recipient: settings.fee_recipient.clone(),
        max_pending_tx: snapshot.capacity,
        in_flight: snapshot.in_flight,
        tree_depth: snapshot.tree_depth,
        leaf_count: snapshot.leaf_count,
        merkle_root: field::to_hex(&snapshot.root),
    })
}

// ============================================================================
// Relay
// ============================================================================

/// Relay a private transfer
pub async fn relay_transfer(
    State(state): State<ApiState>,
    payload: Result<Json<TransferRequest>, JsonRejection>,
) -> Response {
    let req = match payload {
        Ok(Json(req)) => req,
        Err(rejection) => return bad_body(rejection),
    };

    let request = relay_request(req, RelayKind::Transfer);
    respond(state.service.relay(request).await)
}

/// Relay a withdrawal to a public account
pub async fn relay_unshield(
    State(state): State<ApiState>,
    payload: Result<Json<UnshieldRequest>, JsonRejection>,
) -> Response {
    let req = match payload {
        Ok(Json(req)) => req,
        Err(rejection) => return bad_body(rejection),
    };

    let recipient = match Pubkey::from_str(&req.recipient) {
        Ok(recipient) => recipient,
        Err(_) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(ErrorResponse::bad_request("Invalid recipient address")),
            )
                .into_response();
        }
    };

    let kind = RelayKind::Unshield {
        recipient,
        amount: req.amount,
    };
    let request = relay_request(req.spend, kind);
    respond(state.service.relay(request).await)
}

/// Lifecycle of one relay request
pub async fn relay_status(
    State(state): State<ApiState>,
    Path(tx_id): Path<String>,
) -> Response {
    match state.service.status(&tx_id) {
        Some(tx) => Json(StatusResponse::from(tx)).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse::not_found("Unknown or expired transaction id")),
        )
            .into_response(),
    }
}

fn relay_request(req: TransferRequest, kind: RelayKind) -> RelayRequest {
    RelayRequest {
        kind,
        proof: req.proof,
        public_inputs: req.public_inputs,
        nullifiers: req.nullifiers,
        output_commitments: req.output_commitments,
        fee_commitment: req.relayer_fee_commitment,
        merkle_root: req.merkle_root,
    }
}

fn bad_body(rejection: JsonRejection) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse::bad_request(rejection.body_text())),
    )
        .into_response()
}

fn respond(result: Result<crate::service::RelayReceipt, RelayError>) -> Response {
    let e = match result {
        Ok(receipt) => {
            return Json(RelayResponse::confirmed(receipt.tx_id, receipt.signature))
                .into_response();
        }
        Err(e) => e,
    };

    match e {
        RelayError::CapacityExceeded { .. } => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ErrorResponse::new(e.to_string(), "CAPACITY_EXCEEDED")),
        )
            .into_response(),
        RelayError::InvalidRequest(msg) => (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse::bad_request(msg)),
        )
            .into_response(),
        RelayError::NullifierSpent(_) => (
            StatusCode::CONFLICT,
            Json(ErrorResponse::new(e.to_string(), "NULLIFIER_SPENT")),
        )
            .into_response(),
        RelayError::VerificationFailed(_) => {
            Json(RelayResponse::rejected(None, e.to_string())).into_response()
        }
        RelayError::Submission { ref tx_id, .. } | RelayError::Expired(ref tx_id) => {
            Json(RelayResponse::rejected(Some(tx_id.clone()), e.to_string())).into_response()
        }
        other => {
            error!("Relay request failed: {}", other);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse::internal("Relay failed")),
            )
                .into_response()
        }
    }
}
