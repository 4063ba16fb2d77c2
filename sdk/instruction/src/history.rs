//! Commitment extraction from historical instructions
//!
//! Reconciliation replays the pool's leaves from ledger history. Each pool
//! instruction appends a fixed set of commitments, and transfer/unshield also
//! publish the root the program accepted after appending them.

use ark_bn254::Fr;
use shade_privacy::{Commitment, LedgerLeaf};

use crate::{InstructionError, PoolInstruction};

/// Leaves one instruction appends, in append order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppendedLeaves {
    pub commitments: Vec<Commitment>,
    /// Root after the last commitment was appended, when the layout carries it
    pub new_root: Option<Fr>,
}

/// Extract the appended leaves from raw instruction data
pub fn leaves_from_instruction(data: &[u8]) -> Result<AppendedLeaves, InstructionError> {
    Ok(match PoolInstruction::decode(data)? {
        PoolInstruction::Shield(ix) => AppendedLeaves {
            commitments: vec![ix.commitment],
            new_root: None,
        },
        PoolInstruction::Transfer(ix) => AppendedLeaves {
            commitments: ix.commitments.to_vec(),
            new_root: Some(ix.new_root),
        },
        PoolInstruction::Unshield(ix) => AppendedLeaves {
            commitments: vec![ix.change_commitment, ix.dummy_commitment],
            new_root: Some(ix.new_root),
        },
    })
}

/// Turn an ordered list of pool instruction payloads into indexed ledger leaves
///
/// Payloads with a discriminator that is not a leaf-appending operation
/// (e.g. pool initialisation) are skipped. Malformed pool payloads are errors.
pub fn ledger_leaves<'a, I>(instructions: I) -> Result<Vec<LedgerLeaf>, InstructionError>
where
    I: IntoIterator<Item = &'a [u8]>,
{
    let mut leaves = Vec::new();
    for data in instructions {
        let appended = match leaves_from_instruction(data) {
            Ok(appended) => appended,
            Err(InstructionError::UnknownDiscriminator(_)) => continue,
            Err(e) => return Err(e),
        };

        let last = appended.commitments.len().saturating_sub(1);
        for (i, commitment) in appended.commitments.into_iter().enumerate() {
            leaves.push(LedgerLeaf {
                index: leaves.len() as u64,
                commitment,
                published_root: if i == last { appended.new_root } else { None },
            });
        }
    }
    Ok(leaves)
}
