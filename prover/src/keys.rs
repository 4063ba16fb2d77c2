//! Verification and proving keys
//!
//! The verification key travels as a JSON document:
//!
//! ```text
//! { "protocol": "groth16", "curve": "bn128", "nPublic": 6,
//!   "vk_alpha_1": [..], "vk_beta_2": [[..]], "vk_gamma_2": [[..]],
//!   "vk_delta_2": [[..]], "IC": [[..], ..] }
//! ```
//!
//! It is parsed once at startup into a [`VerifierKey`], whose prepared form
//! is shared read-only by every verification.

use std::path::Path;

use ark_bn254::Bn254;
use ark_groth16::{Groth16, PreparedVerifyingKey, ProvingKey, VerifyingKey};
use ark_serialize::{CanonicalDeserialize, CanonicalSerialize};
use ark_snark::SNARK;
use ark_std::rand::{CryptoRng, RngCore};
use log::info;
use serde::{Deserialize, Serialize};

use crate::circuit::TransferCircuit;
use crate::curve::{g1_from_decimal, g1_to_decimal, g2_from_decimal, g2_to_decimal};
use crate::error::ProofError;

pub const PROTOCOL: &str = "groth16";
pub const CURVE: &str = "bn128";

/// Verification key document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationKeyDocument {
    pub protocol: String,
    pub curve: String,
    #[serde(rename = "nPublic")]
    pub n_public: usize,
    pub vk_alpha_1: Vec<String>,
    pub vk_beta_2: Vec<Vec<String>>,
    pub vk_gamma_2: Vec<Vec<String>>,
    pub vk_delta_2: Vec<Vec<String>>,
    #[serde(rename = "IC")]
    pub ic: Vec<Vec<String>>,
}

impl VerificationKeyDocument {
    pub fn from_ark(vk: &VerifyingKey<Bn254>) -> Self {
        Self {
            protocol: PROTOCOL.to_string(),
            curve: CURVE.to_string(),
            n_public: vk.gamma_abc_g1.len().saturating_sub(1),
            vk_alpha_1: g1_to_decimal(&vk.alpha_g1),
            vk_beta_2: g2_to_decimal(&vk.beta_g2),
            vk_gamma_2: g2_to_decimal(&vk.gamma_g2),
            vk_delta_2: g2_to_decimal(&vk.delta_g2),
            ic: vk.gamma_abc_g1.iter().map(g1_to_decimal).collect(),
        }
    }

    pub fn to_ark(&self) -> Result<VerifyingKey<Bn254>, ProofError> {
        if self.protocol != PROTOCOL {
            return Err(ProofError::InvalidKey(format!(
                "unsupported protocol {:?}",
                self.protocol
            )));
        }
        if self.curve != CURVE {
            return Err(ProofError::InvalidKey(format!("unsupported curve {:?}", self.curve)));
        }
        if self.ic.len() != self.n_public + 1 {
            return Err(ProofError::InvalidKey(format!(
                "IC has {} points, nPublic {} requires {}",
                self.ic.len(),
                self.n_public,
                self.n_public + 1
            )));
        }

        let invalid = |e: ProofError| ProofError::InvalidKey(e.to_string());
        Ok(VerifyingKey {
            alpha_g1: g1_from_decimal(&self.vk_alpha_1, "vk_alpha_1").map_err(invalid)?,
            beta_g2: g2_from_decimal(&self.vk_beta_2, "vk_beta_2").map_err(invalid)?,
            gamma_g2: g2_from_decimal(&self.vk_gamma_2, "vk_gamma_2").map_err(invalid)?,
            delta_g2: g2_from_decimal(&self.vk_delta_2, "vk_delta_2").map_err(invalid)?,
            gamma_abc_g1: self
                .ic
                .iter()
                .map(|p| g1_from_decimal(p, "IC").map_err(invalid))
                .collect::<Result<_, _>>()?,
        })
    }
}

/// Verification key loaded once and prepared for pairing checks
#[derive(Clone)]
pub struct VerifierKey {
    document: VerificationKeyDocument,
    prepared: PreparedVerifyingKey<Bn254>,
}

impl VerifierKey {
    pub fn from_document(document: VerificationKeyDocument) -> Result<Self, ProofError> {
        let vk = document.to_ark()?;
        let prepared = Groth16::<Bn254>::process_vk(&vk)
            .map_err(|e| ProofError::InvalidKey(e.to_string()))?;
        Ok(Self { document, prepared })
    }

    pub fn from_ark(vk: &VerifyingKey<Bn254>) -> Result<Self, ProofError> {
        Self::from_document(VerificationKeyDocument::from_ark(vk))
    }

    pub fn from_json(json: &str) -> Result<Self, ProofError> {
        let document: VerificationKeyDocument =
            serde_json::from_str(json).map_err(|e| ProofError::InvalidKey(e.to_string()))?;
        Self::from_document(document)
    }

    /// Load from a JSON file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ProofError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)?;
        let key = Self::from_json(&json)?;
        info!(
            "Loaded verification key from {} (nPublic = {})",
            path.display(),
            key.n_public()
        );
        Ok(key)
    }

    pub fn n_public(&self) -> usize {
        self.document.n_public
    }

    pub fn document(&self) -> &VerificationKeyDocument {
        &self.document
    }

    pub fn prepared(&self) -> &PreparedVerifyingKey<Bn254> {
        &self.prepared
    }
}

impl std::fmt::Debug for VerifierKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VerifierKey")
            .field("n_public", &self.n_public())
            .finish_non_exhaustive()
    }
}

/// Circuit-specific setup for a tree of `depth` levels
pub fn generate_keys<R: RngCore + CryptoRng>(
    depth: usize,
    rng: &mut R,
) -> Result<(ProvingKey<Bn254>, VerifyingKey<Bn254>), ProofError> {
    Groth16::<Bn254>::circuit_specific_setup(TransferCircuit::blank(depth), rng)
        .map_err(|e| ProofError::Generation(format!("circuit setup failed: {}", e)))
}

pub fn proving_key_to_bytes(pk: &ProvingKey<Bn254>) -> Result<Vec<u8>, ProofError> {
    let mut bytes = Vec::new();
    pk.serialize_compressed(&mut bytes)
        .map_err(|e| ProofError::InvalidKey(format!("failed to serialize proving key: {}", e)))?;
    Ok(bytes)
}

pub fn proving_key_from_bytes(bytes: &[u8]) -> Result<ProvingKey<Bn254>, ProofError> {
    ProvingKey::<Bn254>::deserialize_compressed(bytes)
        .map_err(|e| ProofError::InvalidKey(format!("failed to deserialize proving key: {}", e)))
}

/// Number of public inputs a proving key was generated for
pub fn proving_key_n_public(pk: &ProvingKey<Bn254>) -> usize {
    pk.vk.gamma_abc_g1.len().saturating_sub(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ark_std::rand::{SeedableRng, rngs::StdRng};

    #[test]
    fn test_document_roundtrip_through_ark() {
        let mut rng = StdRng::seed_from_u64(1);
        let (_pk, vk) = generate_keys(2, &mut rng).unwrap();

        let doc = VerificationKeyDocument::from_ark(&vk);
        assert_eq!(doc.protocol, "groth16");
        assert_eq!(doc.curve, "bn128");
        assert_eq!(doc.n_public, 6);
        assert_eq!(doc.ic.len(), 7);
        assert_eq!(doc.to_ark().unwrap(), vk);

        let json = serde_json::to_string(&doc).unwrap();
        assert!(json.contains("\"nPublic\":6"));
        assert!(json.contains("\"IC\""));
        assert_eq!(VerifierKey::from_json(&json).unwrap().n_public(), 6);
    }

    #[test]
    fn test_document_checks() {
        let mut rng = StdRng::seed_from_u64(2);
        let (_pk, vk) = generate_keys(2, &mut rng).unwrap();
        let good = VerificationKeyDocument::from_ark(&vk);

        let mut doc = good.clone();
        doc.n_public = 5;
        assert!(matches!(doc.to_ark(), Err(ProofError::InvalidKey(_))));

        let mut doc = good.clone();
        doc.curve = "bls12381".into();
        assert!(matches!(doc.to_ark(), Err(ProofError::InvalidKey(_))));

        let mut doc = good;
        doc.vk_alpha_1[1] = "5".into();
        assert!(matches!(doc.to_ark(), Err(ProofError::InvalidKey(_))));
    }

    #[test]
    fn test_unknown_fields_ignored() {
        let mut rng = StdRng::seed_from_u64(3);
        let (_pk, vk) = generate_keys(2, &mut rng).unwrap();
        let mut value = serde_json::to_value(VerificationKeyDocument::from_ark(&vk)).unwrap();
        value["vk_alphabeta_12"] = serde_json::json!([]);
        assert!(VerifierKey::from_json(&value.to_string()).is_ok());
    }

    #[test]
    fn test_load_from_file() {
        let mut rng = StdRng::seed_from_u64(4);
        let (_pk, vk) = generate_keys(2, &mut rng).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("verification_key.json");
        std::fs::write(
            &path,
            serde_json::to_string_pretty(&VerificationKeyDocument::from_ark(&vk)).unwrap(),
        )
        .unwrap();

        assert_eq!(VerifierKey::load(&path).unwrap().n_public(), 6);
        assert!(matches!(
            VerifierKey::load(dir.path().join("missing.json")),
            Err(ProofError::Io(_))
        ));
    }

    #[test]
    fn test_proving_key_bytes() {
        let mut rng = StdRng::seed_from_u64(5);
        let (pk, _vk) = generate_keys(2, &mut rng).unwrap();
        let bytes = proving_key_to_bytes(&pk).unwrap();
        let back = proving_key_from_bytes(&bytes).unwrap();
        assert_eq!(proving_key_n_public(&back), 6);
        assert!(proving_key_from_bytes(&bytes[..bytes.len() / 2]).is_err());
    }
}
