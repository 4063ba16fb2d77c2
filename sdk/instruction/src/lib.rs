//! Shade pool instructions
//!
//! Fixed binary layouts for the three pool operations. Every buffer starts
//! with an 8-byte discriminator; integers are little-endian and field
//! elements use the 32-byte little-endian field codec.
//!
//! ```text
//! shield   : disc ‖ amount(8) ‖ commitment(32)                                  =  48 bytes
//! transfer : disc ‖ proof(256) ‖ nf1 ‖ nf2 ‖ cm1 ‖ cm2 ‖ old_root ‖ new_root    = 456 bytes
//! unshield : disc ‖ proof(256) ‖ nf1 ‖ nf2 ‖ change ‖ dummy ‖ root ‖ amount(8)
//!                 ‖ new_root                                                    = 464 bytes
//! ```

pub mod discriminator;
pub mod history;

use ark_bn254::Fr;
use shade_privacy::{Commitment, EncodingError, Nullifier, field};
use thiserror::Error;

pub use discriminator::{DISCRIMINATOR_LEN, Operation, disc};
pub use history::{AppendedLeaves, ledger_leaves, leaves_from_instruction};

/// Size of a Groth16 proof in the on-chain layout (-A ‖ B ‖ C)
pub const PROOF_LEN: usize = 256;

pub const SHIELD_LEN: usize = DISCRIMINATOR_LEN + 8 + 32;
pub const TRANSFER_LEN: usize = DISCRIMINATOR_LEN + PROOF_LEN + 6 * 32;
pub const UNSHIELD_LEN: usize = DISCRIMINATOR_LEN + PROOF_LEN + 5 * 32 + 8 + 32;

/// PDA seeds used by the pool program
pub const POOL_SEED: &[u8] = b"pool";
pub const VAULT_SEED: &[u8] = b"vault";
pub const NULLIFIER_SEED: &[u8] = b"nullifier";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InstructionError {
    #[error("unknown instruction discriminator {0:02x?}")]
    UnknownDiscriminator(Vec<u8>),

    #[error("{operation} instruction must be {expected} bytes, got {actual}")]
    InvalidLength {
        operation: Operation,
        expected: usize,
        actual: usize,
    },

    #[error("instruction too short to carry a discriminator")]
    Truncated,

    #[error("invalid field element: {0}")]
    Field(#[from] EncodingError),
}

/// Public deposit into the pool: one new leaf
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Shield {
    pub amount: u64,
    pub commitment: Commitment,
}

/// Private 2-in / 2-out spend
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transfer {
    pub proof: [u8; PROOF_LEN],
    pub nullifiers: [Nullifier; 2],
    pub commitments: [Commitment; 2],
    pub old_root: Fr,
    pub new_root: Fr,
}

/// Withdrawal of `amount` to a public account, with a change note
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Unshield {
    pub proof: [u8; PROOF_LEN],
    pub nullifiers: [Nullifier; 2],
    pub change_commitment: Commitment,
    pub dummy_commitment: Commitment,
    pub merkle_root: Fr,
    pub amount: u64,
    pub new_root: Fr,
}

/// Any pool instruction
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PoolInstruction {
    Shield(Shield),
    Transfer(Transfer),
    Unshield(Unshield),
}

impl Shield {
    pub fn encode(&self) -> Vec<u8> {
        let mut data = Vec::with_capacity(SHIELD_LEN);
        data.extend_from_slice(&Operation::Shield.discriminator());
        data.extend_from_slice(&self.amount.to_le_bytes());
        data.extend_from_slice(&self.commitment.to_bytes());
        data
    }

    pub fn decode(data: &[u8]) -> Result<Self, InstructionError> {
        let mut r = Reader::new(Operation::Shield, data, SHIELD_LEN)?;
        Ok(Self {
            amount: r.u64(),
            commitment: Commitment::from_field(r.field()?),
        })
    }
}

impl Transfer {
    pub fn encode(&self) -> Vec<u8> {
        let mut data = Vec::with_capacity(TRANSFER_LEN);
        data.extend_from_slice(&Operation::Transfer.discriminator());
        data.extend_from_slice(&self.proof);
        for nf in &self.nullifiers {
            data.extend_from_slice(&nf.to_bytes());
        }
        for cm in &self.commitments {
            data.extend_from_slice(&cm.to_bytes());
        }
        data.extend_from_slice(&field::to_bytes(&self.old_root));
        data.extend_from_slice(&field::to_bytes(&self.new_root));
        data
    }

    pub fn decode(data: &[u8]) -> Result<Self, InstructionError> {
        let mut r = Reader::new(Operation::Transfer, data, TRANSFER_LEN)?;
        Ok(Self {
            proof: r.proof(),
            nullifiers: [
                Nullifier::from_field(r.field()?),
                Nullifier::from_field(r.field()?),
            ],
            commitments: [
                Commitment::from_field(r.field()?),
                Commitment::from_field(r.field()?),
            ],
            old_root: r.field()?,
            new_root: r.field()?,
        })
    }
}

impl Unshield {
    pub fn encode(&self) -> Vec<u8> {
        let mut data = Vec::with_capacity(UNSHIELD_LEN);
        data.extend_from_slice(&Operation::Unshield.discriminator());
        data.extend_from_slice(&self.proof);
        for nf in &self.nullifiers {
            data.extend_from_slice(&nf.to_bytes());
        }
        data.extend_from_slice(&self.change_commitment.to_bytes());
        data.extend_from_slice(&self.dummy_commitment.to_bytes());
        data.extend_from_slice(&field::to_bytes(&self.merkle_root));
        data.extend_from_slice(&self.amount.to_le_bytes());
        data.extend_from_slice(&field::to_bytes(&self.new_root));
        data
    }

    pub fn decode(data: &[u8]) -> Result<Self, InstructionError> {
        let mut r = Reader::new(Operation::Unshield, data, UNSHIELD_LEN)?;
        Ok(Self {
            proof: r.proof(),
            nullifiers: [
                Nullifier::from_field(r.field()?),
                Nullifier::from_field(r.field()?),
            ],
            change_commitment: Commitment::from_field(r.field()?),
            dummy_commitment: Commitment::from_field(r.field()?),
            merkle_root: r.field()?,
            amount: r.u64(),
            new_root: r.field()?,
        })
    }
}

impl PoolInstruction {
    pub fn operation(&self) -> Operation {
        match self {
            PoolInstruction::Shield(_) => Operation::Shield,
            PoolInstruction::Transfer(_) => Operation::Transfer,
            PoolInstruction::Unshield(_) => Operation::Unshield,
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        match self {
            PoolInstruction::Shield(ix) => ix.encode(),
            PoolInstruction::Transfer(ix) => ix.encode(),
            PoolInstruction::Unshield(ix) => ix.encode(),
        }
    }

    /// Decode any pool instruction, routing on its discriminator
    pub fn decode(data: &[u8]) -> Result<Self, InstructionError> {
        let tag = data
            .get(..DISCRIMINATOR_LEN)
            .ok_or(InstructionError::Truncated)?;
        let op = Operation::from_discriminator(tag)
            .ok_or_else(|| InstructionError::UnknownDiscriminator(tag.to_vec()))?;

        Ok(match op {
            Operation::Shield => PoolInstruction::Shield(Shield::decode(data)?),
            Operation::Transfer => PoolInstruction::Transfer(Transfer::decode(data)?),
            Operation::Unshield => PoolInstruction::Unshield(Unshield::decode(data)?),
        })
    }
}

/// Sequential reader over a length-checked instruction buffer
struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    /// Check discriminator and exact length, then position after the tag
    fn new(op: Operation, data: &'a [u8], expected: usize) -> Result<Self, InstructionError> {
        let tag = data
            .get(..DISCRIMINATOR_LEN)
            .ok_or(InstructionError::Truncated)?;
        if tag != op.discriminator().as_slice() {
            return Err(InstructionError::UnknownDiscriminator(tag.to_vec()));
        }
        if data.len() != expected {
            return Err(InstructionError::InvalidLength {
                operation: op,
                expected,
                actual: data.len(),
            });
        }
        Ok(Self {
            data,
            pos: DISCRIMINATOR_LEN,
        })
    }

    fn take<const N: usize>(&mut self) -> [u8; N] {
        let mut out = [0u8; N];
        out.copy_from_slice(&self.data[self.pos..self.pos + N]);
        self.pos += N;
        out
    }

    fn u64(&mut self) -> u64 {
        u64::from_le_bytes(self.take::<8>())
    }

    fn proof(&mut self) -> [u8; PROOF_LEN] {
        self.take::<PROOF_LEN>()
    }

    fn field(&mut self) -> Result<Fr, EncodingError> {
        field::from_bytes(&self.take::<32>())
    }
}
