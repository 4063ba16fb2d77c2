//! Shade Relay
//!
//! Gasless submission of shielded-pool spends: clients hand over a proof,
//! the relay verifies it and pays the ledger fees to submit it.

pub mod api;
pub mod error;
pub mod ledger;
pub mod pending;
pub mod pool;
pub mod service;

pub use api::{ApiState, create_router};
pub use error::{RelayError, Result};
pub use ledger::{Ledger, LedgerError, MemoryLedger, PoolCall, SolanaLedger};
pub use pending::{Clock, ManualClock, PendingTable, PendingTransaction, SystemClock, TxStatus};
pub use pool::PoolState;
pub use service::{RelayKind, RelayReceipt, RelayRequest, RelayService, RelaySettings};
