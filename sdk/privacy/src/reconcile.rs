//! Tree reconciliation against ledger history
//!
//! Replays historical `(leaf_index, commitment)` pairs in index order and
//! checks the local root against the root the ledger published after each
//! step. A mismatch means the local tree is corrupt or commitments were
//! extracted from transaction payloads incorrectly.

use ark_bn254::Fr;
use log::debug;
use thiserror::Error;

use crate::commitment::Commitment;
use crate::field;
use crate::merkle::{IncrementalMerkleTree, TreeError};

/// One leaf observed in ledger history
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerLeaf {
    pub index: u64,
    pub commitment: Commitment,
    /// Root the ledger published once this leaf was appended, if known
    pub published_root: Option<Fr>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReconcileError {
    #[error("leaf {found} out of order: expected index {expected}")]
    OutOfOrder { expected: u64, found: u64 },

    #[error("leaf {index} differs from the leaf already in the local tree")]
    LeafMismatch { index: u64 },

    #[error(
        "root mismatch after leaf {index}: ledger published {}, local tree computed {}",
        field::to_hex(.published),
        field::to_hex(.computed)
    )]
    RootMismatch {
        index: u64,
        published: Fr,
        computed: Fr,
    },

    #[error(transparent)]
    Tree(#[from] TreeError),
}

/// Summary of a successful replay
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Leaves appended during this replay
    pub applied: u64,
    /// Leaves already present locally and skipped
    pub skipped: u64,
    /// Published roots that were checked
    pub roots_checked: u64,
    pub final_root: Fr,
}

/// Replay `history` onto `tree`
///
/// Leaves below the tree's current length must already match the local leaf
/// at that index; they are skipped. The replay is all or nothing: on error
/// `tree` is left exactly as it was passed in.
pub fn reconcile(
    tree: &mut IncrementalMerkleTree,
    history: &[LedgerLeaf],
) -> Result<ReconcileReport, ReconcileError> {
    let mut work = tree.clone();
    let report = replay(&mut work, history)?;
    *tree = work;
    Ok(report)
}

fn replay(
    tree: &mut IncrementalMerkleTree,
    history: &[LedgerLeaf],
) -> Result<ReconcileReport, ReconcileError> {
    let mut report = ReconcileReport {
        applied: 0,
        skipped: 0,
        roots_checked: 0,
        final_root: tree.root(),
    };

    for entry in history {
        if entry.index < tree.len() {
            if tree.leaf(entry.index) != Some(entry.commitment) {
                return Err(ReconcileError::LeafMismatch { index: entry.index });
            }
            report.skipped += 1;
            continue;
        }

        if entry.index != tree.len() {
            return Err(ReconcileError::OutOfOrder {
                expected: tree.len(),
                found: entry.index,
            });
        }

        let computed = tree.insert(entry.commitment)?;
        report.applied += 1;

        if let Some(published) = entry.published_root {
            report.roots_checked += 1;
            if published != computed {
                return Err(ReconcileError::RootMismatch {
                    index: entry.index,
                    published,
                    computed,
                });
            }
        }
        debug!("reconciled leaf {} -> {}", entry.index, field::to_hex(&computed));
    }

    report.final_root = tree.root();
    debug!(
        "Reconciled {} leaves ({} skipped, {} roots checked)",
        report.applied, report.skipped, report.roots_checked
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(n: u64) -> Commitment {
        Commitment::from_field(Fr::from(n + 500))
    }

    /// History as an honest ledger would publish it
    fn honest_history(depth: usize, count: u64) -> Vec<LedgerLeaf> {
        let mut shadow = IncrementalMerkleTree::with_depth(depth);
        (0..count)
            .map(|i| {
                let root = shadow.insert(leaf(i)).unwrap();
                LedgerLeaf {
                    index: i,
                    commitment: leaf(i),
                    published_root: Some(root),
                }
            })
            .collect()
    }

    #[test]
    fn test_reconcile_honest_history() {
        let history = honest_history(8, 10);
        let mut tree = IncrementalMerkleTree::with_depth(8);

        let report = reconcile(&mut tree, &history).unwrap();
        assert_eq!(report.applied, 10);
        assert_eq!(report.roots_checked, 10);
        assert_eq!(report.final_root, history[9].published_root.unwrap());
    }

    #[test]
    fn test_reconcile_is_resumable() {
        let history = honest_history(8, 6);
        let mut tree = IncrementalMerkleTree::with_depth(8);
        reconcile(&mut tree, &history[..3]).unwrap();

        let report = reconcile(&mut tree, &history).unwrap();
        assert_eq!(report.skipped, 3);
        assert_eq!(report.applied, 3);
        assert_eq!(tree.len(), 6);
    }

    #[test]
    fn test_reconcile_flags_misparsed_commitment() {
        let mut history = honest_history(8, 5);
        // A commitment extracted from the wrong offset
        history[2].commitment = leaf(77);

        let mut tree = IncrementalMerkleTree::with_depth(8);
        let err = reconcile(&mut tree, &history).unwrap_err();
        assert!(matches!(err, ReconcileError::RootMismatch { index: 2, .. }));
        // Nothing from the failed replay is kept
        assert!(tree.is_empty());
        assert_eq!(tree.root(), IncrementalMerkleTree::with_depth(8).root());
    }

    #[test]
    fn test_reconcile_failure_leaves_tree_untouched() {
        let history = honest_history(8, 6);
        let mut tree = IncrementalMerkleTree::with_depth(8);
        reconcile(&mut tree, &history[..2]).unwrap();
        let root = tree.root();

        let mut bad = history.clone();
        bad[4].published_root = Some(Fr::from(1u64));
        for _ in 0..3 {
            assert!(reconcile(&mut tree, &bad).is_err());
            assert_eq!(tree.len(), 2);
            assert_eq!(tree.root(), root);
        }
    }

    #[test]
    fn test_reconcile_flags_conflicting_known_leaf() {
        let history = honest_history(8, 4);
        let mut tree = IncrementalMerkleTree::with_depth(8);
        reconcile(&mut tree, &history[..3]).unwrap();

        let mut conflicting = history.clone();
        conflicting[1].commitment = leaf(99);
        let err = reconcile(&mut tree, &conflicting).unwrap_err();
        assert_eq!(err, ReconcileError::LeafMismatch { index: 1 });
        assert_eq!(tree.len(), 3);
    }

    #[test]
    fn test_reconcile_rejects_gap() {
        let mut history = honest_history(8, 4);
        history.remove(1);

        let mut tree = IncrementalMerkleTree::with_depth(8);
        let err = reconcile(&mut tree, &history).unwrap_err();
        assert_eq!(err, ReconcileError::OutOfOrder { expected: 1, found: 2 });
    }

    #[test]
    fn test_reconcile_full_tree() {
        let history: Vec<LedgerLeaf> = (0..3)
            .map(|i| LedgerLeaf {
                index: i,
                commitment: leaf(i),
                published_root: None,
            })
            .collect();

        let mut tree = IncrementalMerkleTree::with_depth(1);
        let err = reconcile(&mut tree, &history).unwrap_err();
        assert_eq!(err, ReconcileError::Tree(TreeError::TreeFull { capacity: 2 }));
    }
}
