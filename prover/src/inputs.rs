//! Circuit inputs and public signals
//!
//! ```text
//! public signals (in order):
//!   [merkle_root, nullifier_1, nullifier_2, commitment_1, commitment_2, public_amount]
//! ```
//!
//! A transfer has `public_amount = 0`. An unshield reveals the withdrawn
//! amount; its first output is the change note and the second a dummy.

use ark_bn254::Fr;
use ark_ff::{PrimeField, Zero};
use shade_privacy::{Commitment, MerklePath, Note, Nullifier, SpendingKey, field};

use crate::error::ProofError;

/// Number of public signals the transfer circuit exposes
pub const N_PUBLIC: usize = 6;

/// A note being spent, with its authentication path
#[derive(Debug, Clone)]
pub struct SpendInput {
    pub note: Note,
    pub path: MerklePath,
}

/// Everything needed to prove one 2-in / 2-out spend
#[derive(Debug, Clone)]
pub struct CircuitInputs {
    pub spending_key: SpendingKey,
    pub merkle_root: Fr,
    pub inputs: [SpendInput; 2],
    pub outputs: [Note; 2],
    pub public_amount: u64,
}

impl CircuitInputs {
    /// Zero-valued inputs of the given depth (circuit shape only, for setup)
    pub fn blank(depth: usize) -> Self {
        let spending_key = SpendingKey::from_field(Fr::zero());
        let note = Note::new(0, spending_key.owner_key(), Fr::zero(), Fr::zero());
        let path = MerklePath {
            siblings: vec![Fr::zero(); depth],
            index: 0,
        };
        let input = SpendInput {
            note: note.clone(),
            path,
        };

        Self {
            spending_key,
            merkle_root: Fr::zero(),
            inputs: [input.clone(), input],
            outputs: [note.clone(), note],
            public_amount: 0,
        }
    }

    /// Tree depth implied by the authentication paths
    pub fn depth(&self) -> usize {
        self.inputs[0].path.siblings.len()
    }

    /// Token shared by every note in the spend
    pub fn token_id(&self) -> Fr {
        self.inputs[0].note.token_id
    }

    /// Check shape and ownership before any constraint work
    pub fn validate(&self, depth: usize) -> Result<(), ProofError> {
        for (i, input) in self.inputs.iter().enumerate() {
            if input.path.siblings.len() != depth {
                return Err(ProofError::Generation(format!(
                    "input {} path has {} siblings, circuit depth is {}",
                    i,
                    input.path.siblings.len(),
                    depth
                )));
            }
            if depth < 64 && input.path.index >> depth != 0 {
                return Err(ProofError::Generation(format!(
                    "input {} leaf index {} does not fit depth {}",
                    i, input.path.index, depth
                )));
            }
            if input.note.owner_key != self.spending_key.owner_key() {
                return Err(ProofError::Generation(format!(
                    "input {} is not owned by the spending key",
                    i
                )));
            }
        }

        let token = self.token_id();
        let mixed = self
            .inputs
            .iter()
            .map(|input| &input.note)
            .chain(self.outputs.iter())
            .any(|note| note.token_id != token);
        if mixed {
            return Err(ProofError::Generation(
                "all notes in a spend must share one token id".to_string(),
            ));
        }
        Ok(())
    }

    /// Public signals these inputs commit to
    pub fn public_signals(&self) -> PublicSignals {
        PublicSignals {
            merkle_root: self.merkle_root,
            nullifiers: [
                self.inputs[0].note.nullifier(&self.spending_key),
                self.inputs[1].note.nullifier(&self.spending_key),
            ],
            commitments: [self.outputs[0].commitment(), self.outputs[1].commitment()],
            public_amount: self.public_amount,
        }
    }
}

/// Typed view of the circuit's public signals
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PublicSignals {
    pub merkle_root: Fr,
    pub nullifiers: [Nullifier; 2],
    pub commitments: [Commitment; 2],
    pub public_amount: u64,
}

impl PublicSignals {
    pub fn to_field_elements(&self) -> Vec<Fr> {
        vec![
            self.merkle_root,
            self.nullifiers[0].to_field(),
            self.nullifiers[1].to_field(),
            self.commitments[0].to_field(),
            self.commitments[1].to_field(),
            Fr::from(self.public_amount),
        ]
    }

    /// Decimal strings, as carried in proof documents
    pub fn to_decimal_strings(&self) -> Vec<String> {
        self.to_field_elements()
            .iter()
            .map(field::to_decimal)
            .collect()
    }

    pub fn from_field_elements(signals: &[Fr]) -> Result<Self, ProofError> {
        if signals.len() != N_PUBLIC {
            return Err(ProofError::PublicInputCount {
                expected: N_PUBLIC,
                actual: signals.len(),
            });
        }

        Ok(Self {
            merkle_root: signals[0],
            nullifiers: [
                Nullifier::from_field(signals[1]),
                Nullifier::from_field(signals[2]),
            ],
            commitments: [
                Commitment::from_field(signals[3]),
                Commitment::from_field(signals[4]),
            ],
            public_amount: field_to_u64(&signals[5]).ok_or_else(|| {
                ProofError::MalformedProof("public amount exceeds 64 bits".to_string())
            })?,
        })
    }

    pub fn from_decimal_strings(signals: &[String]) -> Result<Self, ProofError> {
        let parsed = parse_signals(signals)?;
        Self::from_field_elements(&parsed)
    }
}

/// Parse decimal public signals, rejecting values outside the field
pub fn parse_signals(signals: &[String]) -> Result<Vec<Fr>, ProofError> {
    signals
        .iter()
        .map(|s| field::parse_decimal::<Fr>(s).map_err(ProofError::from))
        .collect()
}

fn field_to_u64(x: &Fr) -> Option<u64> {
    let limbs = x.into_bigint().0;
    if limbs[1..].iter().any(|limb| *limb != 0) {
        return None;
    }
    Some(limbs[0])
}
