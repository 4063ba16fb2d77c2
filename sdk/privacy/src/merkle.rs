//! Incremental Merkle Tree for Note Commitments
//!
//! Append-only binary Poseidon tree. The root must match, bit for bit, the
//! root the on-chain verifier computes over the same leaves.
//!
//! ```text
//!                    Root
//!                   /    \
//!                 H01    H23
//!                /  \   /   \
//!               H0  H1 H2   Z[1]
//!               |   |   |    |
//!              C0  C1  C2   Z[0]  (Note Commitments / empty slots)
//! ```
//!
//! Empty subtrees at level `i` hash to `Z[i]`, where `Z[0] = 0` and
//! `Z[i] = Hash2(Z[i-1], Z[i-1])`.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use ark_bn254::Fr;
use ark_ff::Zero;
use thiserror::Error;

use crate::commitment::Commitment;
use crate::poseidon::hash2;

/// Tree depth used by the pool (2^20 notes)
pub const TREE_DEPTH: usize = 20;

/// Number of recent roots a spend may reference
pub const ROOT_HISTORY_SIZE: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TreeError {
    #[error("merkle tree is full ({capacity} leaves)")]
    TreeFull { capacity: u64 },
}

/// Precomputed empty-subtree hashes `Z[0..=depth]`
///
/// Built once at startup and shared read-only between trees.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZeroSchedule {
    zeros: Vec<Fr>,
}

impl ZeroSchedule {
    pub fn new(depth: usize) -> Self {
        let mut zeros = Vec::with_capacity(depth + 1);
        let mut current = Fr::zero();
        zeros.push(current);
        for _ in 0..depth {
            current = hash2(&current, &current);
            zeros.push(current);
        }
        Self { zeros }
    }

    pub fn depth(&self) -> usize {
        self.zeros.len() - 1
    }

    /// Empty-subtree hash at `level` (0 = leaf)
    pub fn get(&self, level: usize) -> Fr {
        self.zeros[level]
    }

    /// Root of a tree with no leaves, `Z[depth]`
    pub fn empty_root(&self) -> Fr {
        self.zeros[self.depth()]
    }
}

impl Default for ZeroSchedule {
    fn default() -> Self {
        Self::new(TREE_DEPTH)
    }
}

/// Authentication path for one leaf
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MerklePath {
    /// Sibling hashes from leaf to root
    pub siblings: Vec<Fr>,
    /// The leaf position; bit `i` set means the node at level `i` is a right child
    pub index: u64,
}

impl MerklePath {
    /// Position bits (false = left, true = right), leaf level first
    pub fn path_bits(&self) -> Vec<bool> {
        (0..self.siblings.len())
            .map(|level| (self.index >> level) & 1 == 1)
            .collect()
    }

    /// Fold `leaf` up the path
    pub fn compute_root(&self, leaf: &Fr) -> Fr {
        let mut current = *leaf;
        for (level, sibling) in self.siblings.iter().enumerate() {
            current = if (self.index >> level) & 1 == 1 {
                hash2(sibling, &current)
            } else {
                hash2(&current, sibling)
            };
        }
        current
    }

    /// Verify that this path proves inclusion of `leaf` under `root`
    pub fn verify(&self, leaf: &Commitment, root: &Fr) -> bool {
        self.compute_root(&leaf.to_field()) == *root
    }
}

/// Append-only Merkle accumulator
///
/// Only populated nodes are stored; every other node reads as `Z[level]`.
#[derive(Debug, Clone)]
pub struct IncrementalMerkleTree {
    zeros: Arc<ZeroSchedule>,
    /// Populated nodes: (level, index) -> hash
    nodes: HashMap<(usize, u64), Fr>,
    leaves: Vec<Commitment>,
    root: Fr,
}

impl IncrementalMerkleTree {
    /// Create an empty tree over a shared zero schedule
    pub fn new(zeros: Arc<ZeroSchedule>) -> Self {
        let root = zeros.empty_root();
        Self {
            zeros,
            nodes: HashMap::new(),
            leaves: Vec::new(),
            root,
        }
    }

    /// Empty tree with its own schedule
    pub fn with_depth(depth: usize) -> Self {
        Self::new(Arc::new(ZeroSchedule::new(depth)))
    }

    pub fn depth(&self) -> usize {
        self.zeros.depth()
    }

    pub fn zeros(&self) -> &Arc<ZeroSchedule> {
        &self.zeros
    }

    /// Maximum number of leaves, `2^depth`
    pub fn capacity(&self) -> u64 {
        1u64 << self.depth()
    }

    /// Number of leaves appended so far (also the next free index)
    pub fn len(&self) -> u64 {
        self.leaves.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.leaves.is_empty()
    }

    /// Current root (memoized, recomputed only on insert)
    pub fn root(&self) -> Fr {
        self.root
    }

    pub fn leaves(&self) -> &[Commitment] {
        &self.leaves
    }

    pub fn leaf(&self, index: u64) -> Option<Commitment> {
        self.leaves.get(index as usize).copied()
    }

    /// Node value at (level, index), falling back to the zero schedule
    pub fn get_node(&self, level: usize, index: u64) -> Fr {
        self.nodes
            .get(&(level, index))
            .copied()
            .unwrap_or_else(|| self.zeros.get(level))
    }

    /// Append a commitment at the next free index and return the new root
    pub fn insert(&mut self, commitment: Commitment) -> Result<Fr, TreeError> {
        self.ensure_room(1)?;

        let mut pending = HashMap::with_capacity(self.depth() + 1);
        let root = self.write_path(&mut pending, self.len(), commitment.to_field());

        self.nodes.extend(pending);
        self.leaves.push(commitment);
        self.root = root;
        Ok(root)
    }

    /// Root the tree would have after appending `commitments`, without mutating it
    pub fn preview_insert(&self, commitments: &[Commitment]) -> Result<Fr, TreeError> {
        self.ensure_room(commitments.len() as u64)?;

        let mut pending = HashMap::new();
        let mut root = self.root;
        for (offset, commitment) in commitments.iter().enumerate() {
            root = self.write_path(&mut pending, self.len() + offset as u64, commitment.to_field());
        }
        Ok(root)
    }

    /// Authentication path for the leaf at `index`
    pub fn path(&self, index: u64) -> Option<MerklePath> {
        if index >= self.len() {
            return None;
        }

        let siblings = (0..self.depth())
            .map(|level| self.get_node(level, (index >> level) ^ 1))
            .collect();

        Some(MerklePath { siblings, index })
    }

    fn ensure_room(&self, additional: u64) -> Result<(), TreeError> {
        let capacity = self.capacity();
        if self.len().saturating_add(additional) > capacity {
            return Err(TreeError::TreeFull { capacity });
        }
        Ok(())
    }

    /// Recompute the path above `index`, writing nodes into `pending`
    ///
    /// Reads see `pending` first, then the committed nodes, then `Z[level]`.
    fn write_path(&self, pending: &mut HashMap<(usize, u64), Fr>, index: u64, leaf: Fr) -> Fr {
        pending.insert((0, index), leaf);

        let mut current_index = index;
        let mut current_hash = leaf;

        for level in 0..self.depth() {
            let sibling_index = current_index ^ 1;
            let sibling = pending
                .get(&(level, sibling_index))
                .copied()
                .unwrap_or_else(|| self.get_node(level, sibling_index));

            current_hash = if current_index & 1 == 1 {
                hash2(&sibling, &current_hash)
            } else {
                hash2(&current_hash, &sibling)
            };
            current_index >>= 1;

            pending.insert((level + 1, current_index), current_hash);
        }

        current_hash
    }
}

impl Default for IncrementalMerkleTree {
    fn default() -> Self {
        Self::new(Arc::new(ZeroSchedule::default()))
    }
}

/// Root of `leaves` computed from scratch, level by level
pub fn compute_root(leaves: &[Commitment], zeros: &ZeroSchedule) -> Result<Fr, TreeError> {
    let capacity = 1u64 << zeros.depth();
    if leaves.len() as u64 > capacity {
        return Err(TreeError::TreeFull { capacity });
    }
    if leaves.is_empty() {
        return Ok(zeros.empty_root());
    }

    let mut layer: Vec<Fr> = leaves.iter().map(Commitment::to_field).collect();
    for level in 0..zeros.depth() {
        let zero = zeros.get(level);
        layer = layer
            .chunks(2)
            .map(|pair| hash2(&pair[0], pair.get(1).unwrap_or(&zero)))
            .collect();
    }
    Ok(layer[0])
}

/// Root history for the Merkle tree
///
/// Stores recent roots so a transaction may reference a slightly stale root
/// (the tree moved between proving and relaying).
#[derive(Debug, Clone)]
pub struct RootHistory {
    /// Recent roots, most recent last
    roots: VecDeque<Fr>,
    max_size: usize,
}

impl RootHistory {
    pub fn new(max_size: usize) -> Self {
        Self {
            roots: VecDeque::with_capacity(max_size),
            max_size: max_size.max(1),
        }
    }

    pub fn push(&mut self, root: Fr) {
        self.roots.push_back(root);
        while self.roots.len() > self.max_size {
            self.roots.pop_front();
        }
    }

    /// Check if a root is current or recent
    pub fn contains(&self, root: &Fr) -> bool {
        self.roots.contains(root)
    }

    pub fn current(&self) -> Option<Fr> {
        self.roots.back().copied()
    }

    pub fn len(&self) -> usize {
        self.roots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }
}

impl Default for RootHistory {
    fn default() -> Self {
        Self::new(ROOT_HISTORY_SIZE)
    }
}
