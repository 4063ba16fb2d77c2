//! Instruction discriminators
//!
//! ```text
//! disc(name) = sha256("global:" ‖ name)[0..8]
//! ```
//!
//! The same truncation the pool program uses to route instructions.

use std::sync::LazyLock;

use sha2::{Digest, Sha256};

pub const DISCRIMINATOR_LEN: usize = 8;

/// Compute the 8-byte tag for an instruction name
pub fn disc(name: &str) -> [u8; DISCRIMINATOR_LEN] {
    let mut hasher = Sha256::new();
    hasher.update(b"global:");
    hasher.update(name.as_bytes());
    let digest = hasher.finalize();

    let mut out = [0u8; DISCRIMINATOR_LEN];
    out.copy_from_slice(&digest[..DISCRIMINATOR_LEN]);
    out
}

static SHIELD: LazyLock<[u8; DISCRIMINATOR_LEN]> = LazyLock::new(|| disc("shield"));
static TRANSFER: LazyLock<[u8; DISCRIMINATOR_LEN]> = LazyLock::new(|| disc("transfer"));
static UNSHIELD: LazyLock<[u8; DISCRIMINATOR_LEN]> = LazyLock::new(|| disc("unshield"));

/// Pool program operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Shield,
    Transfer,
    Unshield,
}

impl Operation {
    pub const ALL: [Operation; 3] = [Operation::Shield, Operation::Transfer, Operation::Unshield];

    pub fn name(&self) -> &'static str {
        match self {
            Operation::Shield => "shield",
            Operation::Transfer => "transfer",
            Operation::Unshield => "unshield",
        }
    }

    /// Cached discriminator for this operation
    pub fn discriminator(&self) -> [u8; DISCRIMINATOR_LEN] {
        match self {
            Operation::Shield => *SHIELD,
            Operation::Transfer => *TRANSFER,
            Operation::Unshield => *UNSHIELD,
        }
    }

    /// Look up the operation a discriminator routes to
    pub fn from_discriminator(tag: &[u8]) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|op| op.discriminator().as_slice() == tag)
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
