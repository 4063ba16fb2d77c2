//! Shielded Transfer Circuit
//!
//! ZK proof that a 2-in / 2-out spend is valid:
//! 1. Each input commitment is well formed and owned by the spending key
//! 2. Each non-zero input exists under `merkle_root`
//! 3. Each nullifier is derived from its input note
//! 4. Each output commitment is well formed
//! 5. Balance is preserved: in_1 + in_2 = out_1 + out_2 + public_amount
//!
//! ```text
//! Public Inputs:
//!   - merkle_root
//!   - nullifier_1, nullifier_2
//!   - commitment_1, commitment_2
//!   - public_amount (0 for transfers, withdrawn amount for unshields)
//!
//! Private Witness:
//!   - spending_key
//!   - input notes (amount, randomness) + authentication paths
//!   - output notes (amount, owner_key, randomness)
//!   - token_id (shared by all four notes)
//! ```
//!
//! Zero-value inputs are padding: their membership check is waived so a
//! spend with a single real note can use a dummy second input.

use ark_bn254::Fr;
use ark_r1cs_std::{fields::fp::FpVar, prelude::*};
use ark_relations::r1cs::{ConstraintSynthesizer, ConstraintSystemRef, SynthesisError};

use super::gadgets;
use crate::inputs::CircuitInputs;

/// Shielded transfer circuit over a tree of `inputs.depth()` levels
#[derive(Clone)]
pub struct TransferCircuit {
    pub inputs: CircuitInputs,
}

impl TransferCircuit {
    pub fn new(inputs: CircuitInputs) -> Self {
        Self { inputs }
    }

    /// Shape-only circuit for key generation
    pub fn blank(depth: usize) -> Self {
        Self::new(CircuitInputs::blank(depth))
    }
}

impl ConstraintSynthesizer<Fr> for TransferCircuit {
    fn generate_constraints(self, cs: ConstraintSystemRef<Fr>) -> Result<(), SynthesisError> {
        let inputs = self.inputs;
        let signals = inputs.public_signals();

        // === Public Inputs (order is part of the verification key) ===

        let merkle_root = FpVar::new_input(cs.clone(), || Ok(signals.merkle_root))?;
        let nullifiers = [
            FpVar::new_input(cs.clone(), || Ok(signals.nullifiers[0].to_field()))?,
            FpVar::new_input(cs.clone(), || Ok(signals.nullifiers[1].to_field()))?,
        ];
        let commitments = [
            FpVar::new_input(cs.clone(), || Ok(signals.commitments[0].to_field()))?,
            FpVar::new_input(cs.clone(), || Ok(signals.commitments[1].to_field()))?,
        ];
        let public_amount = FpVar::new_input(cs.clone(), || Ok(Fr::from(signals.public_amount)))?;
        gadgets::enforce_u64(&public_amount)?;

        // === Private Witness ===

        let spending_key = FpVar::new_witness(cs.clone(), || Ok(*inputs.spending_key.as_field()))?;
        let owner_key = gadgets::owner_key(cs.clone(), &spending_key)?;
        let token_id = FpVar::new_witness(cs.clone(), || Ok(inputs.token_id()))?;

        // === Inputs ===

        let mut total_in = FpVar::zero();
        for (i, input) in inputs.inputs.iter().enumerate() {
            let amount = FpVar::new_witness(cs.clone(), || Ok(Fr::from(input.note.amount)))?;
            gadgets::enforce_u64(&amount)?;
            let randomness = FpVar::new_witness(cs.clone(), || Ok(input.note.randomness))?;

            let commitment =
                gadgets::commitment(cs.clone(), &amount, &owner_key, &randomness, &token_id)?;

            // Membership, waived for zero-value padding:
            // (computed_root - merkle_root) * amount == 0
            let computed_root = gadgets::merkle_root(cs.clone(), &commitment, &input.path)?;
            let membership = (computed_root - &merkle_root) * &amount;
            membership.enforce_equal(&FpVar::zero())?;

            let nullifier = gadgets::nullifier(cs.clone(), &commitment, &spending_key, &randomness)?;
            nullifier.enforce_equal(&nullifiers[i])?;

            total_in = total_in + &amount;
        }

        // === Outputs ===

        let mut total_out = FpVar::zero();
        for (i, output) in inputs.outputs.iter().enumerate() {
            let amount = FpVar::new_witness(cs.clone(), || Ok(Fr::from(output.amount)))?;
            gadgets::enforce_u64(&amount)?;
            let owner = FpVar::new_witness(cs.clone(), || Ok(output.owner_key))?;
            let randomness = FpVar::new_witness(cs.clone(), || Ok(output.randomness))?;

            let commitment =
                gadgets::commitment(cs.clone(), &amount, &owner, &randomness, &token_id)?;
            commitment.enforce_equal(&commitments[i])?;

            total_out = total_out + &amount;
        }

        // === Balance ===
        total_in.enforce_equal(&(total_out + &public_amount))?;

        Ok(())
    }
}
