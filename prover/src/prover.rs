//! Groth16 proof generation

use std::path::Path;
use std::time::Instant;

use ark_bn254::{Bn254, Fr};
use ark_groth16::{Groth16, ProvingKey, VerifyingKey};
use ark_relations::r1cs::{ConstraintSynthesizer, ConstraintSystem};
use ark_snark::SNARK;
use ark_std::rand::rngs::OsRng;
use log::{debug, info};

use crate::circuit::TransferCircuit;
use crate::error::ProofError;
use crate::inputs::{CircuitInputs, N_PUBLIC};
use crate::keys::{proving_key_from_bytes, proving_key_n_public};
use crate::proof::{GeneratedProof, ProofDocument};

/// Trait for ZK proof generation
pub trait TransferProver: Send + Sync {
    fn prove(&self, inputs: &CircuitInputs) -> Result<GeneratedProof, ProofError>;
}

/// Groth16 prover over BN254
pub struct Groth16Prover {
    proving_key: ProvingKey<Bn254>,
    depth: usize,
}

impl Groth16Prover {
    /// Wrap a proving key generated for a tree of `depth` levels
    pub fn new(proving_key: ProvingKey<Bn254>, depth: usize) -> Result<Self, ProofError> {
        let n_public = proving_key_n_public(&proving_key);
        if n_public != N_PUBLIC {
            return Err(ProofError::InvalidKey(format!(
                "proving key has {} public inputs, transfer circuit has {}",
                n_public, N_PUBLIC
            )));
        }
        Ok(Self { proving_key, depth })
    }

    pub fn from_bytes(pk_bytes: &[u8], depth: usize) -> Result<Self, ProofError> {
        Self::new(proving_key_from_bytes(pk_bytes)?, depth)
    }

    /// Load the compressed proving key from disk
    pub fn from_file(path: impl AsRef<Path>, depth: usize) -> Result<Self, ProofError> {
        let path = path.as_ref();
        let bytes = std::fs::read(path)?;
        let prover = Self::from_bytes(&bytes, depth)?;
        info!("Loaded proving key from {} ({} bytes)", path.display(), bytes.len());
        Ok(prover)
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn verifying_key(&self) -> &VerifyingKey<Bn254> {
        &self.proving_key.vk
    }
}

impl TransferProver for Groth16Prover {
    fn prove(&self, inputs: &CircuitInputs) -> Result<GeneratedProof, ProofError> {
        let start = Instant::now();
        inputs.validate(self.depth)?;

        let circuit = TransferCircuit::new(inputs.clone());

        // Reject unsatisfiable inputs instead of emitting a proof that cannot verify
        let cs = ConstraintSystem::<Fr>::new_ref();
        circuit
            .clone()
            .generate_constraints(cs.clone())
            .map_err(|e| ProofError::Generation(e.to_string()))?;
        let satisfied = cs
            .is_satisfied()
            .map_err(|e| ProofError::Generation(e.to_string()))?;
        if !satisfied {
            let which = cs.which_is_unsatisfied().ok().flatten().unwrap_or_default();
            return Err(ProofError::Generation(format!(
                "constraints not satisfied {}",
                which
            )));
        }
        debug!("transfer circuit: {} constraints", cs.num_constraints());

        let proof = Groth16::<Bn254>::prove(&self.proving_key, circuit, &mut OsRng)
            .map_err(|e| ProofError::Generation(e.to_string()))?;

        let proving_time_ms = start.elapsed().as_millis() as u64;
        info!("Generated transfer proof in {} ms", proving_time_ms);

        Ok(GeneratedProof {
            proof: ProofDocument::from_ark(&proof),
            public_signals: inputs.public_signals().to_decimal_strings(),
            proving_time_ms,
        })
    }
}
