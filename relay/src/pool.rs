//! Local mirror of the pool's commitment tree and nullifier set
//!
//! Rebuilt from ledger history at startup, advanced by confirmed relay
//! submissions and caught up with instructions the relay did not send
//! (deposits, other relayers) before each submission.

use ark_bn254::Fr;
use log::{debug, info};
use shade_instruction::ledger_leaves;
use shade_privacy::{
    Commitment, IncrementalMerkleTree, Nullifier, NullifierSet, RootHistory, TreeError, field,
    reconcile,
};

use crate::error::{RelayError, Result};
use crate::ledger::{LedgerError, PoolCall, spent_nullifiers};

pub struct PoolState {
    tree: IncrementalMerkleTree,
    roots: RootHistory,
    /// Spent on the ledger
    spent: NullifierSet,
    /// Held by requests that are being verified or submitted
    reserved: NullifierSet,
    /// Ledger instructions reflected in this state
    synced: usize,
}

impl PoolState {
    pub fn new(depth: usize, root_history: usize) -> Self {
        let tree = IncrementalMerkleTree::with_depth(depth);
        let mut roots = RootHistory::new(root_history);
        roots.push(tree.root());

        Self {
            tree,
            roots,
            spent: NullifierSet::new(),
            reserved: NullifierSet::new(),
            synced: 0,
        }
    }

    /// Replay pool instruction payloads (oldest first) onto an empty state
    ///
    /// Every root the ledger published must match the locally computed root;
    /// a mismatch is returned as an error and the state must not be used.
    pub fn from_history(depth: usize, root_history: usize, history: &[Vec<u8>]) -> Result<Self> {
        let mut state = Self::new(depth, root_history);
        let roots_checked = state.sync(history)?;

        info!(
            "Pool state synced: {} instructions, {} leaves, {} nullifiers, {} roots checked, root {}",
            state.synced,
            state.tree.len(),
            state.spent.len(),
            roots_checked,
            field::to_hex(&state.tree.root())
        );
        Ok(state)
    }

    /// Apply the instructions of `history` not seen yet
    ///
    /// `history` is the ledger's full instruction list, oldest first. Returns
    /// the number of published roots checked. Each instruction is applied
    /// whole or not at all, so a failed sync can simply be retried.
    pub fn sync(&mut self, history: &[Vec<u8>]) -> Result<u64> {
        let Some(fresh) = history.get(self.synced..) else {
            return Err(RelayError::Ledger(LedgerError::InvalidData(format!(
                "ledger history shrank from {} to {} instructions",
                self.synced,
                history.len()
            ))));
        };

        let mut roots_checked = 0;
        for data in fresh {
            let mut leaves = ledger_leaves([data.as_slice()])
                .map_err(|e| RelayError::Ledger(LedgerError::InvalidData(e.to_string())))?;
            if !leaves.is_empty() {
                let base = self.tree.len();
                for leaf in &mut leaves {
                    leaf.index += base;
                }
                roots_checked += reconcile(&mut self.tree, &leaves)?.roots_checked;
                self.roots.push(self.tree.root());
            }
            for nullifier in spent_nullifiers(std::slice::from_ref(data)) {
                self.spent.insert(nullifier);
            }
            self.synced += 1;
        }

        if !fresh.is_empty() {
            debug!("Pool mirror caught up {} instructions", fresh.len());
        }
        Ok(roots_checked)
    }

    pub fn root(&self) -> Fr {
        self.tree.root()
    }

    pub fn depth(&self) -> usize {
        self.tree.depth()
    }

    pub fn leaf_count(&self) -> u64 {
        self.tree.len()
    }

    /// Ledger instructions reflected so far; the history index of the next one
    pub fn synced(&self) -> usize {
        self.synced
    }

    pub fn is_known_root(&self, root: &Fr) -> bool {
        self.roots.contains(root)
    }

    pub fn is_spent(&self, nullifier: &Nullifier) -> bool {
        self.spent.contains(nullifier)
    }

    /// Hold both nullifiers for one request
    pub fn reserve(&mut self, nullifiers: &[Nullifier; 2]) -> Result<()> {
        if nullifiers[0] == nullifiers[1] {
            return Err(RelayError::InvalidRequest("duplicate nullifier".to_string()));
        }
        for nf in nullifiers {
            if self.spent.contains(nf) || self.reserved.contains(nf) {
                return Err(RelayError::NullifierSpent(field::to_hex(&nf.to_field())));
            }
        }
        for nf in nullifiers {
            self.reserved.insert(*nf);
        }
        Ok(())
    }

    pub fn release(&mut self, nullifiers: &[Nullifier; 2]) {
        for nf in nullifiers {
            self.reserved.remove(nf);
        }
    }

    /// Root after appending `commitments`, without appending them
    pub fn preview(&self, commitments: &[Commitment]) -> std::result::Result<Fr, TreeError> {
        self.tree.preview_insert(commitments)
    }

    /// Record a confirmed spend that landed at history index `position`
    ///
    /// The call must have been previewed when `synced() == position`. If a
    /// sync has already picked it up from ledger history only the
    /// reservation is dropped.
    pub fn apply(&mut self, call: &PoolCall, position: usize) -> Result<Fr> {
        if self.synced > position {
            for nf in call.nullifiers() {
                self.reserved.remove(nf);
            }
            return Ok(call.new_root());
        }
        if self.synced < position {
            return Err(RelayError::Internal(format!(
                "spend at history index {} applied before index {}",
                position, self.synced
            )));
        }

        for commitment in call.commitments() {
            self.tree.insert(commitment)?;
        }
        let root = self.tree.root();
        if root != call.new_root() {
            return Err(RelayError::Internal(format!(
                "local root {} diverged from submitted root {}",
                field::to_hex(&root),
                field::to_hex(&call.new_root())
            )));
        }
        self.roots.push(root);
        self.synced += 1;

        for nf in call.nullifiers() {
            self.reserved.remove(nf);
            self.spent.insert(*nf);
        }
        Ok(root)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::{Ledger, MemoryLedger};
    use shade_instruction::{PROOF_LEN, Transfer};

    fn nf(n: u64) -> Nullifier {
        Nullifier::from_field(Fr::from(n))
    }

    fn cm(n: u64) -> Commitment {
        Commitment::from_field(Fr::from(n))
    }

    fn transfer(state: &PoolState, nullifiers: [Nullifier; 2], commitments: [Commitment; 2]) -> PoolCall {
        PoolCall::Transfer(Transfer {
            proof: [0u8; PROOF_LEN],
            nullifiers,
            commitments,
            old_root: state.root(),
            new_root: state.preview(&commitments).unwrap(),
        })
    }

    #[test]
    fn test_reserve_and_release() {
        let mut state = PoolState::new(4, 8);
        state.reserve(&[nf(1), nf(2)]).unwrap();
        assert!(matches!(
            state.reserve(&[nf(2), nf(3)]),
            Err(RelayError::NullifierSpent(_))
        ));
        // Nothing from the failed reservation is held
        state.reserve(&[nf(3), nf(4)]).unwrap();

        state.release(&[nf(1), nf(2)]);
        state.reserve(&[nf(1), nf(2)]).unwrap();

        assert!(matches!(
            state.reserve(&[nf(9), nf(9)]),
            Err(RelayError::InvalidRequest(_))
        ));
    }

    #[test]
    fn test_apply_moves_nullifiers_to_spent() {
        let mut state = PoolState::new(4, 8);
        let empty_root = state.root();
        state.reserve(&[nf(1), nf(2)]).unwrap();

        let call = transfer(&state, [nf(1), nf(2)], [cm(10), cm(11)]);
        let root = state.apply(&call, 0).unwrap();

        assert_eq!(state.leaf_count(), 2);
        assert!(state.is_known_root(&root));
        assert!(state.is_known_root(&empty_root));
        assert!(state.is_spent(&nf(1)));
        state.release(&[nf(1), nf(2)]);
        assert!(state.reserve(&[nf(1), nf(5)]).is_err());
    }

    #[tokio::test]
    async fn test_from_history_matches_ledger() {
        let ledger = MemoryLedger::new(4, 8);
        ledger.shield(5, cm(1)).unwrap();
        ledger.shield(6, cm(2)).unwrap();

        let mirror = PoolState::from_history(4, 8, &ledger.pool_history().await.unwrap()).unwrap();
        let call = transfer(&mirror, [nf(1), nf(2)], [cm(3), cm(4)]);
        ledger.submit(&call).await.unwrap();
        ledger.shield(7, cm(5)).unwrap();

        let history = ledger.pool_history().await.unwrap();
        let synced = PoolState::from_history(4, 8, &history).unwrap();
        assert_eq!(synced.leaf_count(), 5);
        assert_eq!(synced.root(), ledger.root().unwrap());
        assert!(synced.is_spent(&nf(2)));
        assert!(synced.is_known_root(&call.new_root()));
    }

    #[tokio::test]
    async fn test_sync_applies_only_new_instructions() {
        let ledger = MemoryLedger::new(4, 8);
        ledger.shield(5, cm(1)).unwrap();
        let mut mirror = PoolState::from_history(4, 8, &ledger.pool_history().await.unwrap()).unwrap();

        // Our own submission, applied locally
        mirror.reserve(&[nf(1), nf(2)]).unwrap();
        let call = transfer(&mirror, [nf(1), nf(2)], [cm(2), cm(3)]);
        ledger.submit(&call).await.unwrap();
        mirror.apply(&call, 1).unwrap();

        // A deposit the relay did not make
        ledger.shield(9, cm(4)).unwrap();
        let history = ledger.pool_history().await.unwrap();
        mirror.sync(&history).unwrap();
        assert_eq!(mirror.leaf_count(), 4);
        assert_eq!(mirror.root(), ledger.root().unwrap());

        // Idempotent
        mirror.sync(&history).unwrap();
        assert_eq!(mirror.leaf_count(), 4);

        assert!(mirror.sync(&history[..1]).is_err());
    }

    #[tokio::test]
    async fn test_apply_after_sync_already_saw_the_spend() {
        let ledger = MemoryLedger::new(4, 8);
        ledger.shield(5, cm(1)).unwrap();
        let mut mirror = PoolState::from_history(4, 8, &ledger.pool_history().await.unwrap()).unwrap();

        mirror.reserve(&[nf(1), nf(2)]).unwrap();
        let position = mirror.synced();
        let call = transfer(&mirror, [nf(1), nf(2)], [cm(2), cm(3)]);
        ledger.submit(&call).await.unwrap();

        // A concurrent refresh gets there first
        mirror.sync(&ledger.pool_history().await.unwrap()).unwrap();
        mirror.apply(&call, position).unwrap();

        assert_eq!(mirror.leaf_count(), 3);
        assert_eq!(mirror.root(), ledger.root().unwrap());
        assert!(mirror.is_spent(&nf(1)));
        mirror.release(&[nf(1), nf(2)]);
        assert!(mirror.reserve(&[nf(2), nf(7)]).is_err());
    }

    #[test]
    fn test_failed_sync_does_not_grow_the_tree() {
        let mut history = vec![shade_instruction::Shield {
            amount: 1,
            commitment: cm(1),
        }
        .encode()];
        let mut state = PoolState::new(4, 8);
        state.sync(&history).unwrap();

        let mut call = transfer(&state, [nf(1), nf(2)], [cm(2), cm(3)]);
        if let PoolCall::Transfer(ix) = &mut call {
            ix.new_root = Fr::from(12345u64);
        }
        history.push(call.data());
        let root = state.root();

        for _ in 0..3 {
            assert!(matches!(state.sync(&history), Err(RelayError::Reconcile(_))));
            assert_eq!(state.leaf_count(), 1);
            assert_eq!(state.synced(), 1);
            assert_eq!(state.root(), root);
        }
        assert!(!state.is_spent(&nf(1)));
    }

    #[test]
    fn test_from_history_detects_root_mismatch() {
        let mut history = vec![shade_instruction::Shield {
            amount: 1,
            commitment: cm(1),
        }
        .encode()];

        let state = PoolState::new(4, 8);
        let mut call = transfer(&state, [nf(1), nf(2)], [cm(2), cm(3)]);
        if let PoolCall::Transfer(ix) = &mut call {
            ix.new_root = Fr::from(12345u64);
        }
        history.push(call.data());

        assert!(matches!(
            PoolState::from_history(4, 8, &history),
            Err(RelayError::Reconcile(_))
        ));
    }
}
