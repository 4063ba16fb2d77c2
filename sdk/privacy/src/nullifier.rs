//! Nullifiers
//!
//! Implements nullifier derivation for double-spend prevention.
//!
//! ```text
//! Nullifier = Hash4(commitment, spending_key, randomness, NULLIFIER_DOMAIN)
//! ```
//!
//! Once a nullifier is published, the corresponding note cannot be spent again.
//! The local checks here only pre-screen; the on-chain nullifier set is the
//! authority.

use std::collections::HashSet;
use std::fmt;

use ark_bn254::Fr;
use serde::{Deserialize, Serialize};

use crate::field::{self, EncodingError};
use crate::note::{Note, SpendingKey};
use crate::poseidon::hash4;

/// Domain tag mixed into nullifier derivation
pub const NULLIFIER_DOMAIN: u64 = 2;

/// A nullifier - unique tag for a spent note
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Nullifier(#[serde(with = "crate::field::serde_hex")] pub Fr);

impl Nullifier {
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

impl fmt::Display for Nullifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&field::to_hex(&self.0))
    }
}

/// Derive the nullifier of `note` under `spending_key`
pub fn derive_nullifier(note: &Note, spending_key: &SpendingKey) -> Nullifier {
    let commitment = note.commitment().to_field();
    Nullifier(hash4(
        &commitment,
        spending_key.as_field(),
        &note.randomness,
        &Fr::from(NULLIFIER_DOMAIN),
    ))
}

/// Local double-spend pre-check
pub fn is_spent(nullifier: &Nullifier, known: &HashSet<Nullifier>) -> bool {
    known.contains(nullifier)
}

/// Set of nullifiers observed as spent (or about to be)
#[derive(Debug, Default, Clone)]
pub struct NullifierSet {
    spent: HashSet<Nullifier>,
}

impl NullifierSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, nullifier: &Nullifier) -> bool {
        is_spent(nullifier, &self.spent)
    }

    /// Record a nullifier; returns `false` if it was already present
    pub fn insert(&mut self, nullifier: Nullifier) -> bool {
        self.spent.insert(nullifier)
    }

    pub fn remove(&mut self, nullifier: &Nullifier) -> bool {
        self.spent.remove(nullifier)
    }

    pub fn len(&self) -> usize {
        self.spent.len()
    }

    pub fn is_empty(&self) -> bool {
        self.spent.is_empty()
    }
}
