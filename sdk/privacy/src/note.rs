//! Shielded Notes
//!
//! A Note represents value held privately in the pool.
//!
//! ```text
//! Note = {
//!     amount: u64,        // Amount in the smallest unit
//!     owner_key: Fr,      // Hash2(spending_key, OWNER_DOMAIN)
//!     randomness: Fr,     // Blinding factor
//!     token_id: Fr,       // token_id_of(mint account)
//! }
//! ```
//!
//! Notes are never mutated in place: spending one publishes its nullifier
//! and creates new output notes.

use ark_bn254::Fr;
use ark_ff::PrimeField;
use ark_std::UniformRand;
use ark_std::rand::Rng;
use serde::{Deserialize, Serialize};

use crate::commitment::{Commitment, commit};
use crate::nullifier::{Nullifier, derive_nullifier};
use crate::poseidon::hash2;

/// Domain tag mixed into owner-key derivation
pub const OWNER_DOMAIN: u64 = 1;

/// A shielded note representing privately held value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Note {
    /// The amount held in this note
    pub amount: u64,
    /// Owner key (who can spend this note)
    #[serde(with = "crate::field::serde_hex")]
    pub owner_key: Fr,
    /// Random blinding factor for hiding the commitment
    #[serde(with = "crate::field::serde_hex")]
    pub randomness: Fr,
    /// Token the amount is denominated in
    #[serde(with = "crate::field::serde_hex")]
    pub token_id: Fr,
}

impl Note {
    /// Create a note with explicit randomness (for testing/recovery)
    pub fn new(amount: u64, owner_key: Fr, randomness: Fr, token_id: Fr) -> Self {
        Self {
            amount,
            owner_key,
            randomness,
            token_id,
        }
    }

    /// Create a new note with random blinding
    pub fn random<R: Rng>(amount: u64, owner_key: Fr, token_id: Fr, rng: &mut R) -> Self {
        Self::new(amount, owner_key, Fr::rand(rng), token_id)
    }

    /// Zero-value padding note for unused transaction slots
    ///
    /// Randomness keeps dummy nullifiers and commitments unique.
    pub fn dummy<R: Rng>(owner_key: Fr, token_id: Fr, rng: &mut R) -> Self {
        Self::random(0, owner_key, token_id, rng)
    }

    /// Compute the commitment for this note
    pub fn commitment(&self) -> Commitment {
        commit(self)
    }

    /// Derive the nullifier for spending this note
    pub fn nullifier(&self, spending_key: &SpendingKey) -> Nullifier {
        derive_nullifier(self, spending_key)
    }

    /// Whether this note is zero-value padding
    pub fn is_dummy(&self) -> bool {
        self.amount == 0
    }
}

/// Spending key - allows spending notes
///
/// This is the most sensitive key. Loss = loss of funds.
/// Compromise = theft of funds.
#[derive(Clone, PartialEq, Eq)]
pub struct SpendingKey(Fr);

impl SpendingKey {
    /// Generate a random spending key
    pub fn random<R: Rng>(rng: &mut R) -> Self {
        Self(Fr::rand(rng))
    }

    /// Create from a field element
    pub fn from_field(key: Fr) -> Self {
        Self(key)
    }

    /// The secret as a field element
    pub fn as_field(&self) -> &Fr {
        &self.0
    }

    /// Derive the owner key placed in notes this key can spend
    pub fn owner_key(&self) -> Fr {
        hash2(&self.0, &Fr::from(OWNER_DOMAIN))
    }
}

impl std::fmt::Debug for SpendingKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpendingKey").finish_non_exhaustive()
    }
}

/// Map a 32-byte ledger account id (token mint) to a field element
///
/// The bytes are read little-endian with the top three bits cleared, so
/// every account id lands below the modulus. The on-chain program applies
/// the same mask.
pub fn token_id_of(account: &[u8; 32]) -> Fr {
    let mut bytes = *account;
    bytes[31] &= 0x1f;
    Fr::from_le_bytes_mod_order(&bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field;
    use ark_std::rand::{SeedableRng, rngs::StdRng};

    #[test]
    fn test_note_commitment() {
        let mut rng = StdRng::seed_from_u64(1);
        let key = SpendingKey::random(&mut rng);
        let note = Note::random(1000, key.owner_key(), Fr::from(5u64), &mut rng);

        let c1 = note.commitment();
        let c2 = note.commitment();

        assert_eq!(c1, c2, "commitment should be deterministic");
    }

    #[test]
    fn test_owner_key_derivation() {
        let mut rng = StdRng::seed_from_u64(2);
        let key = SpendingKey::random(&mut rng);
        let same = SpendingKey::from_field(*key.as_field());
        let other = SpendingKey::random(&mut rng);

        assert_eq!(key.owner_key(), same.owner_key());
        assert_ne!(key.owner_key(), other.owner_key());
    }

    #[test]
    fn test_token_id_byte_order() {
        let mut account = [0u8; 32];
        account[0] = 0x01;
        account[1] = 0x02;
        assert_eq!(token_id_of(&account), Fr::from(0x0201u64));
    }

    #[test]
    fn test_token_id_of_high_bytes_in_range() {
        let account = [0xffu8; 32];
        let id = token_id_of(&account);
        let bytes = field::to_bytes(&id);
        assert_eq!(bytes[31], 0x1f);
        assert!(bytes[..31].iter().all(|b| *b == 0xff));
        assert_eq!(field::from_bytes(&bytes).unwrap(), id);
    }

    #[test]
    fn test_dummy_notes_are_unique() {
        let mut rng = StdRng::seed_from_u64(3);
        let owner = Fr::from(9u64);
        let a = Note::dummy(owner, Fr::from(1u64), &mut rng);
        let b = Note::dummy(owner, Fr::from(1u64), &mut rng);
        assert!(a.is_dummy() && b.is_dummy());
        assert_ne!(a.commitment(), b.commitment());
    }
}
