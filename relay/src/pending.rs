//! Pending Transaction Table
//!
//! Bounded, concurrent record of relay requests.
//!
//! ```text
//!   insert ──▶ Pending ──▶ Submitted ──▶ Confirmed
//!                 │             └──────▶ Failed
//!                 └── removed on verification failure
//! ```
//!
//! Records are deleted after a cooldown once finished, and the sweep
//! force-expires anything older than the timeout regardless of state.
//! The in-flight counter (pending + submitted) is what the capacity ceiling
//! bounds; it is reserved atomically so concurrent inserts cannot overshoot.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use dashmap::DashMap;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use shade_instruction::Operation;
use shade_privacy::Nullifier;
use shade_prover::ProofDocument;

use crate::error::{RelayError, Result};

// ============================================================================
// Clock
// ============================================================================

/// Source of wall-clock milliseconds
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> u64;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0)
    }
}

/// Clock that only moves when told to
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicU64,
}

impl ManualClock {
    pub fn new(start_ms: u64) -> Self {
        Self {
            now: AtomicU64::new(start_ms),
        }
    }

    pub fn advance(&self, by: Duration) {
        self.now.fetch_add(by.as_millis() as u64, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}

impl<C: Clock + ?Sized> Clock for Arc<C> {
    fn now_ms(&self) -> u64 {
        (**self).now_ms()
    }
}

// ============================================================================
// Records
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TxStatus {
    Pending,
    Submitted,
    Confirmed,
    Failed,
}

impl TxStatus {
    /// Counts against the capacity ceiling
    pub fn is_in_flight(&self) -> bool {
        matches!(self, TxStatus::Pending | TxStatus::Submitted)
    }
}

/// One relay request and its lifecycle
#[derive(Debug, Clone)]
pub struct PendingTransaction {
    pub id: String,
    pub operation: Operation,
    pub proof: ProofDocument,
    pub public_inputs: Vec<String>,
    pub nullifiers: [Nullifier; 2],
    pub fee_commitment: Option<String>,
    pub status: TxStatus,
    /// Receipt time, the basis for forced expiry
    pub submitted_at: u64,
    pub completed_at: Option<u64>,
    pub signature: Option<String>,
    pub error: Option<String>,
}

impl PendingTransaction {
    pub fn new(
        operation: Operation,
        proof: ProofDocument,
        public_inputs: Vec<String>,
        nullifiers: [Nullifier; 2],
        fee_commitment: Option<String>,
        now_ms: u64,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            operation,
            proof,
            public_inputs,
            nullifiers,
            fee_commitment,
            status: TxStatus::Pending,
            submitted_at: now_ms,
            completed_at: None,
            signature: None,
            error: None,
        }
    }
}

// ============================================================================
// Table
// ============================================================================

pub struct PendingTable {
    entries: DashMap<String, PendingTransaction>,
    in_flight: AtomicUsize,
    max_in_flight: usize,
}

impl PendingTable {
    pub fn new(max_in_flight: usize) -> Self {
        Self {
            entries: DashMap::new(),
            in_flight: AtomicUsize::new(0),
            max_in_flight,
        }
    }

    pub fn capacity(&self) -> usize {
        self.max_in_flight
    }

    /// Requests currently pending or submitted
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// All records, finished ones included
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.in_flight() >= self.max_in_flight
    }

    /// Reserve a slot and insert `tx` in `Pending` state
    pub fn insert(&self, tx: PendingTransaction) -> Result<String> {
        self.in_flight
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                (n < self.max_in_flight).then_some(n + 1)
            })
            .map_err(|_| RelayError::CapacityExceeded {
                max: self.max_in_flight,
            })?;

        let id = tx.id.clone();
        self.entries.insert(id.clone(), tx);
        debug!("pending {} ({} in flight)", id, self.in_flight());
        Ok(id)
    }

    pub fn get(&self, id: &str) -> Option<PendingTransaction> {
        self.entries.get(id).map(|e| e.value().clone())
    }

    /// `Pending -> Submitted`
    pub fn mark_submitted(&self, id: &str) -> bool {
        match self.entries.get_mut(id) {
            Some(mut entry) if entry.status == TxStatus::Pending => {
                entry.status = TxStatus::Submitted;
                true
            }
            _ => false,
        }
    }

    /// `Submitted -> Confirmed | Failed`, releasing the in-flight slot
    pub fn complete(&self, id: &str, outcome: std::result::Result<String, String>, now_ms: u64) {
        let Some(mut entry) = self.entries.get_mut(id) else {
            return;
        };
        if !entry.status.is_in_flight() {
            return;
        }

        match outcome {
            Ok(signature) => {
                entry.status = TxStatus::Confirmed;
                entry.signature = Some(signature);
            }
            Err(error) => {
                entry.status = TxStatus::Failed;
                entry.error = Some(error);
            }
        }
        entry.completed_at = Some(now_ms);
        drop(entry);
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }

    /// Delete a record, releasing its slot if still in flight
    pub fn remove(&self, id: &str) -> Option<PendingTransaction> {
        let (_, tx) = self.entries.remove(id)?;
        if tx.status.is_in_flight() {
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
        }
        Some(tx)
    }

    /// Delete a record only once it has finished
    pub fn remove_finished(&self, id: &str) -> bool {
        let removed = self
            .entries
            .remove_if(id, |_, tx| !tx.status.is_in_flight())
            .is_some();
        if removed {
            debug!("expired finished record {}", id);
        }
        removed
    }

    /// Remove every record received more than `timeout` before `now_ms`
    ///
    /// Returns the removed records so callers can release what they held.
    pub fn sweep(&self, now_ms: u64, timeout: Duration) -> Vec<PendingTransaction> {
        let timeout_ms = timeout.as_millis() as u64;
        let stale: Vec<String> = self
            .entries
            .iter()
            .filter(|e| now_ms.saturating_sub(e.submitted_at) >= timeout_ms)
            .map(|e| e.key().clone())
            .collect();

        let removed: Vec<PendingTransaction> =
            stale.iter().filter_map(|id| self.remove(id)).collect();
        if !removed.is_empty() {
            info!(
                "Sweep: expired {} stale records ({} in flight)",
                removed.len(),
                self.in_flight()
            );
        }
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ark_bn254::Fr;

    fn tx(now: u64) -> PendingTransaction {
        PendingTransaction::new(
            Operation::Transfer,
            ProofDocument {
                pi_a: vec![],
                pi_b: vec![],
                pi_c: vec![],
                protocol: None,
                curve: None,
            },
            vec![],
            [
                Nullifier::from_field(Fr::from(1u64)),
                Nullifier::from_field(Fr::from(2u64)),
            ],
            None,
            now,
        )
    }

    #[test]
    fn test_lifecycle() {
        let table = PendingTable::new(4);
        let id = table.insert(tx(0)).unwrap();
        assert_eq!(table.get(&id).unwrap().status, TxStatus::Pending);
        assert_eq!(table.in_flight(), 1);

        assert!(table.mark_submitted(&id));
        assert!(!table.mark_submitted(&id));
        assert_eq!(table.in_flight(), 1);

        table.complete(&id, Ok("sig".into()), 10);
        let done = table.get(&id).unwrap();
        assert_eq!(done.status, TxStatus::Confirmed);
        assert_eq!(done.signature.as_deref(), Some("sig"));
        assert_eq!(done.completed_at, Some(10));
        assert_eq!(table.in_flight(), 0);

        // A second completion is ignored
        table.complete(&id, Err("late".into()), 11);
        assert_eq!(table.get(&id).unwrap().status, TxStatus::Confirmed);
        assert_eq!(table.in_flight(), 0);

        assert!(table.remove_finished(&id));
        assert!(table.is_empty());
    }

    #[test]
    fn test_capacity_is_exact() {
        let table = PendingTable::new(2);
        table.insert(tx(0)).unwrap();
        let second = table.insert(tx(0)).unwrap();
        assert!(matches!(
            table.insert(tx(0)),
            Err(RelayError::CapacityExceeded { max: 2 })
        ));
        assert_eq!(table.len(), 2);

        // Finished records do not hold capacity
        table.mark_submitted(&second);
        table.complete(&second, Err("rejected".into()), 1);
        assert!(!table.is_full());
        table.insert(tx(0)).unwrap();
        assert_eq!(table.len(), 3);
    }

    #[test]
    fn test_concurrent_inserts_respect_ceiling() {
        let table = Arc::new(PendingTable::new(16));
        let results: Vec<bool> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..17)
                .map(|_| {
                    let table = table.clone();
                    s.spawn(move || table.insert(tx(0)).is_ok())
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert_eq!(results.iter().filter(|ok| !**ok).count(), 1);
        assert_eq!(table.len(), 16);
        assert_eq!(table.in_flight(), 16);
    }

    #[test]
    fn test_remove_releases_slot() {
        let table = PendingTable::new(1);
        let id = table.insert(tx(0)).unwrap();
        assert!(table.is_full());
        assert!(!table.remove_finished(&id));
        assert!(table.remove(&id).is_some());
        assert!(!table.is_full());
        assert!(table.remove(&id).is_none());
    }

    #[test]
    fn test_sweep_expires_regardless_of_state() {
        let clock = ManualClock::new(1_000);
        let table = PendingTable::new(8);
        let timeout = Duration::from_secs(300);

        let old_pending = table.insert(tx(clock.now_ms())).unwrap();
        let old_done = table.insert(tx(clock.now_ms())).unwrap();
        table.mark_submitted(&old_done);
        table.complete(&old_done, Ok("sig".into()), clock.now_ms());

        clock.advance(Duration::from_secs(200));
        let fresh = table.insert(tx(clock.now_ms())).unwrap();

        assert!(table.sweep(clock.now_ms(), timeout).is_empty());

        clock.advance(Duration::from_secs(100));
        let removed = table.sweep(clock.now_ms(), timeout);
        assert_eq!(removed.len(), 2);
        assert!(table.get(&old_pending).is_none());
        assert!(table.get(&old_done).is_none());
        assert!(table.get(&fresh).is_some());
        assert_eq!(table.in_flight(), 1);
    }
}
