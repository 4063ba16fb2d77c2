//! Proof documents
//!
//! Proofs cross process boundaries as JSON with decimal coordinates:
//!
//! ```text
//! { "pi_a": [x, y, "1"],
//!   "pi_b": [[x0, x1], [y0, y1], ["1", "0"]],
//!   "pi_c": [x, y, "1"],
//!   "protocol": "groth16", "curve": "bn128" }
//! ```
//!
//! On chain the same proof is 256 bytes: `-A (64) ‖ B (128) ‖ C (64)`.

use ark_bn254::{Bn254, G1Affine};
use ark_groth16::Proof;
use serde::{Deserialize, Serialize};

use crate::curve::{g1_from_decimal, g1_to_be, g1_to_decimal, g2_from_decimal, g2_to_be, g2_to_decimal};
use crate::error::ProofError;
use crate::keys::{CURVE, PROTOCOL};

/// Size of a proof in the on-chain layout
pub const ONCHAIN_PROOF_LEN: usize = 256;

/// A Groth16 proof as carried in requests
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofDocument {
    pub pi_a: Vec<String>,
    pub pi_b: Vec<Vec<String>>,
    pub pi_c: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub curve: Option<String>,
}

impl ProofDocument {
    pub fn from_ark(proof: &Proof<Bn254>) -> Self {
        Self {
            pi_a: g1_to_decimal(&proof.a),
            pi_b: g2_to_decimal(&proof.b),
            pi_c: g1_to_decimal(&proof.c),
            protocol: Some(PROTOCOL.to_string()),
            curve: Some(CURVE.to_string()),
        }
    }

    /// Structural checks only: arity of every coordinate list
    pub fn check_shape(&self) -> Result<(), ProofError> {
        if self.pi_a.len() != 3 || self.pi_c.len() != 3 {
            return Err(ProofError::MalformedProof(
                "pi_a and pi_c must have 3 coordinates".to_string(),
            ));
        }
        if self.pi_b.len() != 3 || self.pi_b.iter().any(|pair| pair.len() != 2) {
            return Err(ProofError::MalformedProof(
                "pi_b must have 3 coordinate pairs".to_string(),
            ));
        }
        if let Some(protocol) = &self.protocol {
            if protocol != PROTOCOL {
                return Err(ProofError::MalformedProof(format!(
                    "unsupported protocol {:?}",
                    protocol
                )));
            }
        }
        if let Some(curve) = &self.curve {
            if curve != CURVE {
                return Err(ProofError::MalformedProof(format!("unsupported curve {:?}", curve)));
            }
        }
        Ok(())
    }

    /// Decode to curve points, checking range, curve and subgroup membership
    pub fn to_ark(&self) -> Result<Proof<Bn254>, ProofError> {
        self.check_shape()?;
        Ok(Proof {
            a: g1_from_decimal(&self.pi_a, "pi_a")?,
            b: g2_from_decimal(&self.pi_b, "pi_b")?,
            c: g1_from_decimal(&self.pi_c, "pi_c")?,
        })
    }

    pub fn to_onchain_bytes(&self) -> Result<[u8; ONCHAIN_PROOF_LEN], ProofError> {
        Ok(to_onchain_bytes(&self.to_ark()?))
    }
}

/// On-chain layout: `-A ‖ B ‖ C`, big-endian, G2 as `x.c1 ‖ x.c0 ‖ y.c1 ‖ y.c0`
///
/// A is negated so the program checks `e(-A, B) · e(α, β) · e(L, γ) · e(C, δ) = 1`.
pub fn to_onchain_bytes(proof: &Proof<Bn254>) -> [u8; ONCHAIN_PROOF_LEN] {
    let neg_a: G1Affine = -proof.a;

    let mut out = [0u8; ONCHAIN_PROOF_LEN];
    out[..64].copy_from_slice(&g1_to_be(&neg_a));
    out[64..192].copy_from_slice(&g2_to_be(&proof.b));
    out[192..].copy_from_slice(&g1_to_be(&proof.c));
    out
}

/// Output of the prover
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedProof {
    pub proof: ProofDocument,
    /// Decimal public signals, in circuit order
    pub public_signals: Vec<String>,
    pub proving_time_ms: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use ark_bn254::G2Affine;
    use ark_ec::AffineRepr;
    use crate::curve::fq_to_be;

    fn generator_proof() -> Proof<Bn254> {
        Proof {
            a: G1Affine::generator(),
            b: G2Affine::generator(),
            c: G1Affine::generator(),
        }
    }

    #[test]
    fn test_document_shape() {
        let doc = ProofDocument::from_ark(&generator_proof());
        assert_eq!(doc.pi_a.len(), 3);
        assert_eq!(doc.pi_b[2], vec!["1", "0"]);
        assert_eq!(doc.to_ark().unwrap(), generator_proof());

        let mut missing = doc.clone();
        missing.pi_b.pop();
        assert!(matches!(missing.to_ark(), Err(ProofError::MalformedProof(_))));

        let mut wrong_curve = doc;
        wrong_curve.curve = Some("bls12-381".into());
        assert!(wrong_curve.check_shape().is_err());
    }

    #[test]
    fn test_missing_field_fails_to_parse() {
        let json = r#"{"pi_a": ["1", "2", "1"], "pi_c": ["1", "2", "1"]}"#;
        assert!(serde_json::from_str::<ProofDocument>(json).is_err());
    }

    #[test]
    fn test_onchain_layout() {
        let proof = generator_proof();
        let bytes = to_onchain_bytes(&proof);
        let neg_a = -proof.a;

        // -A: x unchanged, y = p - y
        assert_eq!(&bytes[..32], &fq_to_be(&neg_a.x));
        assert_eq!(&bytes[32..64], &fq_to_be(&neg_a.y));
        assert_eq!(bytes[31], 1);

        // B: c1 before c0
        assert_eq!(&bytes[64..96], &fq_to_be(&proof.b.x.c1));
        assert_eq!(&bytes[96..128], &fq_to_be(&proof.b.x.c0));
        assert_eq!(&bytes[128..160], &fq_to_be(&proof.b.y.c1));
        assert_eq!(&bytes[160..192], &fq_to_be(&proof.b.y.c0));

        // C
        assert_eq!(bytes[223], 1);
        assert_eq!(bytes[255], 2);
    }
}
