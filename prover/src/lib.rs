pub mod circuit;
pub mod curve;
pub mod error;
pub mod inputs;
pub mod keys;
pub mod proof;
pub mod prover;
pub mod service;
pub mod verify;

pub use circuit::TransferCircuit;
pub use error::ProofError;
pub use inputs::{CircuitInputs, N_PUBLIC, PublicSignals, SpendInput};
pub use keys::{VerificationKeyDocument, VerifierKey};
pub use proof::{GeneratedProof, ONCHAIN_PROOF_LEN, ProofDocument, to_onchain_bytes};
pub use prover::{Groth16Prover, TransferProver};
pub use service::ProverService;
pub use verify::{is_valid, verify};
