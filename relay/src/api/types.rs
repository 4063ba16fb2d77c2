//! API Types
//!
//! Request/response bodies for the relay HTTP API. Field elements travel as
//! 32-byte little-endian hex, proofs and public inputs as decimal strings.

use ark_bn254::Fr;
use serde::{Deserialize, Serialize};
use shade_privacy::field::serde_hex;
use shade_privacy::{Commitment, Nullifier, field};
use shade_prover::ProofDocument;

use crate::pending::{PendingTransaction, TxStatus};

// ============================================================================
// Relay Requests
// ============================================================================

/// Body of `POST /relay/transfer`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferRequest {
    pub proof: ProofDocument,
    /// Decimal public signals, in circuit order
    pub public_inputs: Vec<String>,
    pub nullifiers: [Nullifier; 2],
    pub output_commitments: [Commitment; 2],
    #[serde(default)]
    pub relayer_fee_commitment: Option<Commitment>,
    #[serde(with = "serde_hex")]
    pub merkle_root: Fr,
}

/// Body of `POST /relay/unshield`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnshieldRequest {
    #[serde(flatten)]
    pub spend: TransferRequest,
    /// Base58 account receiving the withdrawn amount
    pub recipient: String,
    pub amount: u64,
}

/// Outcome of a relay request
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tx_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RelayResponse {
    pub fn confirmed(tx_id: String, signature: String) -> Self {
        Self {
            success: true,
            tx_id: Some(tx_id),
            signature: Some(signature),
            error: None,
        }
    }

    pub fn rejected(tx_id: Option<String>, error: impl Into<String>) -> Self {
        Self {
            success: false,
            tx_id,
            signature: None,
            error: Some(error.into()),
        }
    }
}

// ============================================================================
// Health & Info
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub healthy: bool,
    pub version: String,
    pub uptime_secs: u64,
    /// Records in the pending table, finished ones included
    pub pending_count: usize,
    pub in_flight: usize,
    pub verification_enabled: bool,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InfoResponse {
    pub relayer: String,
    /// `None` when the ledger could not be reached
    pub balance: Option<u64>,
    pub fee_bps: u16,
    pub fee_recipient: Option<String>,
    pub max_pending_tx: usize,
    pub in_flight: usize,
    pub tree_depth: usize,
    pub leaf_count: u64,
    pub merkle_root: String,
}

// ============================================================================
// Status
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub tx_id: String,
    pub operation: String,
    pub status: TxStatus,
    pub nullifiers: [String; 2],
    pub submitted_at: u64,
    pub completed_at: Option<u64>,
    pub signature: Option<String>,
    pub error: Option<String>,
}

impl From<PendingTransaction> for StatusResponse {
    fn from(tx: PendingTransaction) -> Self {
        Self {
            tx_id: tx.id,
            operation: tx.operation.name().to_string(),
            status: tx.status,
            nullifiers: tx.nullifiers.map(|nf| field::to_hex(&nf.to_field())),
            submitted_at: tx.submitted_at,
            completed_at: tx.completed_at,
            signature: tx.signature,
            error: tx.error,
        }
    }
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            code: code.into(),
        }
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::new(msg, "BAD_REQUEST")
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::new(msg, "INTERNAL_ERROR")
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::new(msg, "NOT_FOUND")
    }
}
