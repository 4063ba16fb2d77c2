use shade_privacy::EncodingError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProofError {
    /// Proof document is missing fields, has the wrong arity, or carries
    /// coordinates that are not valid curve points
    #[error("malformed proof: {0}")]
    MalformedProof(String),

    #[error("expected {expected} public signals, got {actual}")]
    PublicInputCount { expected: usize, actual: usize },

    #[error("invalid public signal: {0}")]
    PublicSignal(#[from] EncodingError),

    #[error("invalid verification key: {0}")]
    InvalidKey(String),

    /// Unsatisfiable constraints or malformed circuit inputs
    #[error("proof generation failed: {0}")]
    Generation(String),

    #[error("prover service unavailable")]
    ServiceUnavailable,

    #[error("prover worker crashed")]
    WorkerCrashed,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
