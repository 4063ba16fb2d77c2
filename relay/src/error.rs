use shade_privacy::{ReconcileError, TreeError};
use shade_prover::ProofError;
use thiserror::Error;

use crate::ledger::LedgerError;

#[derive(Debug, Error)]
pub enum RelayError {
    /// Too many in-flight requests; no state was created
    #[error("relay at capacity ({max} requests in flight), retry later")]
    CapacityExceeded { max: usize },

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("proof verification failed: {0}")]
    VerificationFailed(String),

    #[error("nullifier {0} already spent or in flight")]
    NullifierSpent(String),

    /// The ledger rejected the transaction; the record is marked failed
    #[error("submission of {tx_id} failed: {source}")]
    Submission {
        tx_id: String,
        #[source]
        source: LedgerError,
    },

    #[error("commitment tree: {0}")]
    Tree(#[from] TreeError),

    #[error("reconciliation failed: {0}")]
    Reconcile(#[from] ReconcileError),

    #[error("ledger: {0}")]
    Ledger(#[from] LedgerError),

    /// The record was swept before it reached the ledger
    #[error("request {0} expired before submission")]
    Expired(String),

    #[error("configuration: {0}")]
    Config(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<ProofError> for RelayError {
    fn from(e: ProofError) -> Self {
        match e {
            // Malformed proof material is the client's fault
            ProofError::MalformedProof(_)
            | ProofError::PublicInputCount { .. }
            | ProofError::PublicSignal(_) => RelayError::InvalidRequest(e.to_string()),
            other => RelayError::Internal(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, RelayError>;
