//! Note Commitments
//!
//! ```text
//! Commitment = Hash4(amount, owner_key, randomness, token_id)
//! ```
//!
//! Public and content-addressed. One commitment occupies exactly one leaf of
//! the commitment tree.

use std::fmt;

use ark_bn254::Fr;
use serde::{Deserialize, Serialize};

use crate::field::{self, EncodingError};
use crate::note::Note;
use crate::poseidon::hash4;

/// A note commitment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Commitment(#[serde(with = "crate::field::serde_hex")] pub Fr);

impl Commitment {
    /// Wrap a field element
    pub fn from_field(f: Fr) -> Self {
        Self(f)
    }

    /// The underlying field element
    pub fn to_field(&self) -> Fr {
        self.0
    }

    /// 32-byte little-endian encoding
    pub fn to_bytes(&self) -> [u8; 32] {
        field::to_bytes(&self.0)
    }

    /// Decode from 32 little-endian bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, EncodingError> {
        field::from_bytes(bytes).map(Self)
    }
}

impl fmt::Display for Commitment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&field::to_hex(&self.0))
    }
}

/// Commit to a note
pub fn commit(note: &Note) -> Commitment {
    Commitment(hash4(
        &Fr::from(note.amount),
        &note.owner_key,
        &note.randomness,
        &note.token_id,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_note() -> Note {
        Note::new(
            1000,
            Fr::from(11u64),
            Fr::from(42u64),
            Fr::from(7u64),
        )
    }

    #[test]
    fn test_commitment_deterministic() {
        let note = sample_note();
        assert_eq!(commit(&note), commit(&note), "same inputs should produce same commitment");
    }

    #[test]
    fn test_commitment_binds_every_field() {
        let base = sample_note();
        let c = commit(&base);

        let mut n = base.clone();
        n.amount += 1;
        assert_ne!(commit(&n), c, "amount");

        let mut n = base.clone();
        n.owner_key += Fr::from(1u64);
        assert_ne!(commit(&n), c, "owner key");

        let mut n = base.clone();
        n.randomness += Fr::from(1u64);
        assert_ne!(commit(&n), c, "randomness");

        let mut n = base;
        n.token_id += Fr::from(1u64);
        assert_ne!(commit(&n), c, "token id");
    }

    #[test]
    fn test_serde_hex() {
        let c = commit(&sample_note());
        let json = serde_json::to_string(&c).unwrap();
        assert_eq!(json, format!("\"{}\"", c));
        let back: Commitment = serde_json::from_str(&json).unwrap();
        assert_eq!(back, c);
    }
}
