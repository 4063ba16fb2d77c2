//! Proof verification
//!
//! Cheap checks run first so adversarial payloads are rejected before any
//! pairing work:
//!
//! 1. public-signal count equals `nPublic`
//! 2. proof document shape (arity of pi_a / pi_b / pi_c)
//! 3. public signals are canonical decimals below the field modulus
//! 4. proof coordinates are in range, on the curve and in the subgroup
//! 5. Groth16 pairing check against the prepared key

use ark_bn254::Bn254;
use ark_groth16::Groth16;
use ark_snark::SNARK;
use log::debug;

use crate::error::ProofError;
use crate::inputs::parse_signals;
use crate::keys::VerifierKey;
use crate::proof::ProofDocument;

/// Verify `proof` against `public_signals`
///
/// Returns `Err` when a syntactic check fails and `Ok(false)` when the proof
/// is well formed but cryptographically invalid. Pure and side-effect free.
pub fn verify(
    vk: &VerifierKey,
    public_signals: &[String],
    proof: &ProofDocument,
) -> Result<bool, ProofError> {
    if public_signals.len() != vk.n_public() {
        return Err(ProofError::PublicInputCount {
            expected: vk.n_public(),
            actual: public_signals.len(),
        });
    }
    proof.check_shape()?;

    let inputs = parse_signals(public_signals)?;
    let proof = proof.to_ark()?;

    let ok = Groth16::<Bn254>::verify_with_processed_vk(vk.prepared(), &inputs, &proof)
        .map_err(|e| ProofError::MalformedProof(e.to_string()))?;
    debug!("groth16 pairing check: {}", ok);
    Ok(ok)
}

/// [`verify`] collapsed to a boolean: any rejection is `false`
pub fn is_valid(vk: &VerifierKey, public_signals: &[String], proof: &ProofDocument) -> bool {
    matches!(verify(vk, public_signals, proof), Ok(true))
}
