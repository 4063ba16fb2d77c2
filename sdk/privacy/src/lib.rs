//! Shade Privacy SDK
//!
//! Note-based privacy primitives for the shielded pool.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                    Shielded Transaction                         │
//! │  ┌──────────────┐  ┌──────────────┐  ┌───────────────────────┐ │
//! │  │  Nullifiers  │  │ Commitments  │  │   Merkle root         │ │
//! │  │  (spent)     │  │  (new notes) │  │   (membership anchor) │ │
//! │  └──────────────┘  └──────────────┘  └───────────────────────┘ │
//! │         │                 │                     │               │
//! │         ▼                 ▼                     ▼               │
//! │  ┌─────────────────────────────────────────────────────────┐   │
//! │  │              ZK Proof (Groth16, BN254)                   │   │
//! │  │  • Valid nullifier derivation                            │   │
//! │  │  • Valid commitment structure                            │   │
//! │  │  • Balance preservation: Σ inputs = Σ outputs + public   │   │
//! │  └─────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

pub mod commitment;
pub mod field;
pub mod merkle;
pub mod note;
pub mod nullifier;
pub mod poseidon;
pub mod reconcile;

pub use commitment::{Commitment, commit};
pub use field::{EncodingError, FIELD_BYTES, FieldElement};
pub use merkle::{
    IncrementalMerkleTree, MerklePath, ROOT_HISTORY_SIZE, RootHistory, TREE_DEPTH, TreeError,
    ZeroSchedule, compute_root,
};
pub use note::{Note, OWNER_DOMAIN, SpendingKey, token_id_of};
pub use nullifier::{NULLIFIER_DOMAIN, Nullifier, NullifierSet, derive_nullifier, is_spent};
pub use poseidon::{hash2, hash4, poseidon_config};
pub use reconcile::{LedgerLeaf, ReconcileError, ReconcileReport, reconcile};
