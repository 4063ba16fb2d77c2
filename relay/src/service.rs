//! Relay Service
//!
//! Accepts untrusted spend proofs, verifies them and submits the valid ones
//! to the pool program with the relayer paying fees.
//!
//! Per request, in order:
//!
//! ```text
//! capacity ─▶ validate ─▶ record(pending) ─▶ reserve nullifiers ─▶ verify
//!                                                                    │
//!        cooldown delete ◀── confirmed | failed ◀── submit ◀── submitted
//! ```
//!
//! Nothing touches the ledger before verification succeeds, and a request
//! id is submitted at most once. The pool mirror is only locked briefly;
//! ledger I/O is serialized separately and only for submissions.

use std::sync::{Arc, Mutex as StdMutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use ark_bn254::Fr;
use log::{debug, error, info, warn};
use shade_config::{Environment, ShadeConfig};
use shade_instruction::{Operation, Transfer, Unshield};
use shade_privacy::{Commitment, Nullifier, field};
use shade_prover::{N_PUBLIC, ONCHAIN_PROOF_LEN, ProofDocument, PublicSignals, VerifierKey, verify};
use solana_sdk::pubkey::Pubkey;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::error::{RelayError, Result};
use crate::ledger::{Ledger, PoolCall};
use crate::pending::{Clock, PendingTable, PendingTransaction};
use crate::pool::PoolState;

// ============================================================================
// Settings
// ============================================================================

/// Runtime settings, resolved from [`ShadeConfig`]
#[derive(Debug, Clone)]
pub struct RelaySettings {
    pub environment: Environment,
    pub max_pending_tx: usize,
    pub pending_timeout: Duration,
    pub status_cooldown: Duration,
    pub verification_enabled: bool,
    pub fee_bps: u16,
    pub fee_recipient: Option<String>,
    pub tree_depth: usize,
    pub root_history_size: usize,
}

impl RelaySettings {
    pub fn from_config(config: &ShadeConfig) -> Self {
        Self {
            environment: config.relay.environment,
            max_pending_tx: config.relay.max_pending_tx,
            pending_timeout: config.relay.pending_timeout(),
            status_cooldown: config.relay.status_cooldown(),
            verification_enabled: config.relay.verification_enabled,
            fee_bps: config.relay.fee_bps,
            fee_recipient: config.relay.fee_recipient.clone(),
            tree_depth: config.prover.tree_depth,
            root_history_size: config.prover.root_history_size,
        }
    }
}

// ============================================================================
// Requests
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayKind {
    Transfer,
    Unshield { recipient: Pubkey, amount: u64 },
}

impl RelayKind {
    pub fn operation(&self) -> Operation {
        match self {
            RelayKind::Transfer => Operation::Transfer,
            RelayKind::Unshield { .. } => Operation::Unshield,
        }
    }

    /// Public amount the proof must commit to
    fn public_amount(&self) -> u64 {
        match self {
            RelayKind::Transfer => 0,
            RelayKind::Unshield { amount, .. } => *amount,
        }
    }
}

/// A decoded relay request
#[derive(Debug, Clone)]
pub struct RelayRequest {
    pub kind: RelayKind,
    pub proof: ProofDocument,
    pub public_inputs: Vec<String>,
    pub nullifiers: [Nullifier; 2],
    /// For an unshield: change note, then dummy note
    pub output_commitments: [Commitment; 2],
    pub fee_commitment: Option<Commitment>,
    pub merkle_root: Fr,
}

impl RelayRequest {
    /// Syntactic checks; no state is touched
    fn validate(&self, fee_bps: u16) -> Result<PublicSignals> {
        if self.public_inputs.len() != N_PUBLIC {
            return Err(RelayError::InvalidRequest(format!(
                "expected {} public inputs, got {}",
                N_PUBLIC,
                self.public_inputs.len()
            )));
        }
        self.proof.check_shape()?;
        let signals = PublicSignals::from_decimal_strings(&self.public_inputs)?;

        match self.fee_commitment {
            None if fee_bps > 0 => {
                return Err(RelayError::InvalidRequest(
                    "relayerFeeCommitment is required by this relay".to_string(),
                ));
            }
            Some(fee) if !self.output_commitments.contains(&fee) => {
                return Err(RelayError::InvalidRequest(
                    "relayerFeeCommitment must be one of the output commitments".to_string(),
                ));
            }
            _ => {}
        }
        Ok(signals)
    }

    /// Request fields must be exactly what the proof commits to
    fn check_binding(&self, signals: &PublicSignals) -> Result<()> {
        let mismatch = if signals.merkle_root != self.merkle_root {
            Some("merkleRoot")
        } else if signals.nullifiers != self.nullifiers {
            Some("nullifiers")
        } else if signals.commitments != self.output_commitments {
            Some("outputCommitments")
        } else if signals.public_amount != self.kind.public_amount() {
            Some("amount")
        } else {
            None
        };

        match mismatch {
            Some(what) => Err(RelayError::VerificationFailed(format!(
                "{} does not match the proof's public inputs",
                what
            ))),
            None => Ok(()),
        }
    }

    fn to_call(&self, proof: [u8; ONCHAIN_PROOF_LEN], new_root: Fr) -> PoolCall {
        match self.kind {
            RelayKind::Transfer => PoolCall::Transfer(Transfer {
                proof,
                nullifiers: self.nullifiers,
                commitments: self.output_commitments,
                old_root: self.merkle_root,
                new_root,
            }),
            RelayKind::Unshield { recipient, amount } => PoolCall::Unshield {
                instruction: Unshield {
                    proof,
                    nullifiers: self.nullifiers,
                    change_commitment: self.output_commitments[0],
                    dummy_commitment: self.output_commitments[1],
                    merkle_root: self.merkle_root,
                    amount,
                    new_root,
                },
                recipient,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayReceipt {
    pub tx_id: String,
    pub signature: String,
}

/// Point-in-time view for `/health` and `/info`
#[derive(Debug, Clone)]
pub struct RelaySnapshot {
    pub records: usize,
    pub in_flight: usize,
    pub capacity: usize,
    pub verification_enabled: bool,
    pub root: Fr,
    pub leaf_count: u64,
    pub tree_depth: usize,
}

// ============================================================================
// Service
// ============================================================================

/// Minimum spacing of history fetches triggered by unknown roots
const ROOT_REFRESH_INTERVAL: Duration = Duration::from_secs(1);

pub struct RelayService {
    settings: RelaySettings,
    vk: Option<Arc<VerifierKey>>,
    ledger: Arc<dyn Ledger>,
    pending: Arc<PendingTable>,
    /// Never held across an `.await`
    pool: Arc<StdMutex<PoolState>>,
    /// Serializes refresh, preview, submit and apply
    submission: Mutex<()>,
    /// Last history fetch for an unknown root
    root_refresh: Mutex<Option<Instant>>,
    clock: Arc<dyn Clock>,
}

impl RelayService {
    /// Check the verification mode and sync the pool mirror from the ledger
    pub async fn start(
        settings: RelaySettings,
        vk: Option<VerifierKey>,
        ledger: Arc<dyn Ledger>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        if settings.verification_enabled && vk.is_none() {
            return Err(RelayError::Config(
                "verification is enabled but no verification key was loaded".to_string(),
            ));
        }
        if !settings.verification_enabled && !settings.environment.allows_unverified() {
            return Err(RelayError::Config(format!(
                "proof verification cannot be disabled in {:?} mode",
                settings.environment
            )));
        }
        if !settings.verification_enabled {
            warn!("Proof verification DISABLED - syntactic checks only");
        }

        let history = ledger.pool_history().await?;
        let pool = PoolState::from_history(
            settings.tree_depth,
            settings.root_history_size,
            &history,
        )?;

        Ok(Self {
            pending: Arc::new(PendingTable::new(settings.max_pending_tx)),
            vk: vk.map(Arc::new),
            pool: Arc::new(StdMutex::new(pool)),
            submission: Mutex::new(()),
            root_refresh: Mutex::new(None),
            settings,
            ledger,
            clock,
        })
    }

    pub fn settings(&self) -> &RelaySettings {
        &self.settings
    }

    pub fn ledger(&self) -> &Arc<dyn Ledger> {
        &self.ledger
    }

    pub fn pending(&self) -> &Arc<PendingTable> {
        &self.pending
    }

    pub fn status(&self, tx_id: &str) -> Option<PendingTransaction> {
        self.pending.get(tx_id)
    }

    fn pool(&self) -> MutexGuard<'_, PoolState> {
        self.pool.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn snapshot(&self) -> RelaySnapshot {
        let pool = self.pool();
        RelaySnapshot {
            records: self.pending.len(),
            in_flight: self.pending.in_flight(),
            capacity: self.pending.capacity(),
            verification_enabled: self.settings.verification_enabled,
            root: pool.root(),
            leaf_count: pool.leaf_count(),
            tree_depth: pool.depth(),
        }
    }

    /// Run one request through the full lifecycle
    ///
    /// The lifecycle runs on its own task, so dropping the returned future
    /// does not abandon a request halfway: it still finishes, or is rolled
    /// back, and frees its slot and nullifiers.
    pub async fn relay(self: &Arc<Self>, request: RelayRequest) -> Result<RelayReceipt> {
        let service = self.clone();
        tokio::spawn(async move { service.process(request).await })
            .await
            .map_err(|e| RelayError::Internal(format!("relay task failed: {}", e)))?
    }

    async fn process(&self, request: RelayRequest) -> Result<RelayReceipt> {
        if self.pending.is_full() {
            return Err(RelayError::CapacityExceeded {
                max: self.pending.capacity(),
            });
        }
        let signals = request.validate(self.settings.fee_bps)?;

        let operation = request.kind.operation();
        let tx_id = self.pending.insert(PendingTransaction::new(
            operation,
            request.proof.clone(),
            request.public_inputs.clone(),
            request.nullifiers,
            request.fee_commitment.map(|c| field::to_hex(&c.to_field())),
            self.clock.now_ms(),
        ))?;
        debug!("{} request {} recorded", operation, tx_id);

        self.reserve(&tx_id, &request.nullifiers)?;

        let proof = match self.verify(&request, &signals).await {
            Ok(proof) => proof,
            Err(e) => {
                info!("Rejected {} request {}: {}", operation, tx_id, e);
                self.discard(&tx_id, &request.nullifiers);
                return Err(e);
            }
        };

        if !self.pending.mark_submitted(&tx_id) {
            return Err(RelayError::Expired(tx_id));
        }

        let outcome = self.submit(&tx_id, &request, proof).await;
        let now = self.clock.now_ms();
        self.schedule_cleanup(tx_id.clone());

        match outcome {
            Ok(signature) => {
                info!("{} {} confirmed: {}", operation, tx_id, signature);
                self.pending.complete(&tx_id, Ok(signature.clone()), now);
                Ok(RelayReceipt { tx_id, signature })
            }
            Err(e) => {
                warn!("{} {} failed: {}", operation, tx_id, e);
                self.pending.complete(&tx_id, Err(e.to_string()), now);
                Err(match e {
                    RelayError::Ledger(source) => RelayError::Submission { tx_id, source },
                    other => other,
                })
            }
        }
    }

    /// Hold the nullifiers for a live record
    ///
    /// Checked under the pool lock, which the sweep also takes, so a record
    /// expired in between never leaves a reservation behind.
    fn reserve(&self, tx_id: &str, nullifiers: &[Nullifier; 2]) -> Result<()> {
        let mut pool = self.pool();
        if self.pending.get(tx_id).is_none() {
            return Err(RelayError::Expired(tx_id.to_string()));
        }
        if let Err(e) = pool.reserve(nullifiers) {
            self.pending.remove(tx_id);
            return Err(e);
        }
        Ok(())
    }

    /// Delete a record that will not be submitted, with its reservation
    fn discard(&self, tx_id: &str, nullifiers: &[Nullifier; 2]) {
        let mut pool = self.pool();
        if self.pending.remove(tx_id).is_some() {
            pool.release(nullifiers);
        }
    }

    /// Binding, root and proof checks, producing the on-chain proof bytes
    async fn verify(
        &self,
        request: &RelayRequest,
        signals: &PublicSignals,
    ) -> Result<[u8; ONCHAIN_PROOF_LEN]> {
        request.check_binding(signals)?;

        if !self.pool().is_known_root(&request.merkle_root) {
            // The root may come from a deposit made since the last sync
            self.refresh_for_root(&request.merkle_root).await?;
            if !self.pool().is_known_root(&request.merkle_root) {
                return Err(RelayError::VerificationFailed(format!(
                    "unknown merkle root {}",
                    field::to_hex(&request.merkle_root)
                )));
            }
        }

        if let Some(vk) = &self.vk {
            let vk = vk.clone();
            let inputs = request.public_inputs.clone();
            let proof = request.proof.clone();
            let valid = tokio::task::spawn_blocking(move || verify(&vk, &inputs, &proof))
                .await
                .map_err(|e| RelayError::Internal(format!("verifier task failed: {}", e)))?;

            match valid {
                Ok(true) => {}
                Ok(false) => {
                    return Err(RelayError::VerificationFailed(
                        "proof rejected by verifier".to_string(),
                    ));
                }
                Err(e) => return Err(RelayError::VerificationFailed(e.to_string())),
            }
        }

        request
            .proof
            .to_onchain_bytes()
            .map_err(|e| RelayError::VerificationFailed(e.to_string()))
    }

    /// Submit in ledger order so the previewed root stays current
    async fn submit(
        &self,
        tx_id: &str,
        request: &RelayRequest,
        proof: [u8; ONCHAIN_PROOF_LEN],
    ) -> Result<String> {
        let _turn = self.submission.lock().await;

        let result = async {
            self.refresh().await?;
            let (call, position) = {
                let pool = self.pool();
                let new_root = pool.preview(&request.output_commitments)?;
                (request.to_call(proof, new_root), pool.synced())
            };
            let signature = self.ledger.submit(&call).await?;
            let applied = self.pool().apply(&call, position);
            if let Err(e) = applied {
                error!("Pool mirror out of sync after {}: {}", signature, e);
            }
            Ok::<_, RelayError>(signature)
        }
        .await;

        if result.is_err() {
            let mut pool = self.pool();
            // A swept record's reservation is already gone
            if self.pending.get(tx_id).is_some() {
                pool.release(&request.nullifiers);
            }
        }
        result
    }

    /// Catch the mirror up with ledger history
    async fn refresh(&self) -> Result<()> {
        let history = self.ledger.pool_history().await?;
        self.pool().sync(&history)?;
        Ok(())
    }

    /// Refresh for a root the mirror does not know, at most once per interval
    async fn refresh_for_root(&self, root: &Fr) -> Result<()> {
        let mut last = self.root_refresh.lock().await;
        // Another request may have fetched it while this one waited
        if self.pool().is_known_root(root) {
            return Ok(());
        }
        if (*last).is_some_and(|at| at.elapsed() < ROOT_REFRESH_INTERVAL) {
            debug!("Skipping history refresh for {}", field::to_hex(root));
            return Ok(());
        }
        *last = Some(Instant::now());
        self.refresh().await
    }

    fn schedule_cleanup(&self, tx_id: String) {
        let pending = self.pending.clone();
        let cooldown = self.settings.status_cooldown;
        tokio::spawn(async move {
            tokio::time::sleep(cooldown).await;
            pending.remove_finished(&tx_id);
        });
    }

    /// Force-expire stale records and release what they held
    pub fn sweep(&self) -> usize {
        let mut pool = self.pool();
        let removed = self
            .pending
            .sweep(self.clock.now_ms(), self.settings.pending_timeout);

        for tx in removed.iter().filter(|tx| tx.status.is_in_flight()) {
            pool.release(&tx.nullifiers);
        }
        removed.len()
    }

    /// Run [`sweep`](Self::sweep) every `interval` until the runtime stops
    pub fn spawn_sweeper(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let service = self.clone();
        // `interval` panics on a zero period
        let period = interval.max(Duration::from_millis(1));
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                service.sweep();
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signals() -> PublicSignals {
        PublicSignals {
            merkle_root: Fr::from(1u64),
            nullifiers: [
                Nullifier::from_field(Fr::from(2u64)),
                Nullifier::from_field(Fr::from(3u64)),
            ],
            commitments: [
                Commitment::from_field(Fr::from(4u64)),
                Commitment::from_field(Fr::from(5u64)),
            ],
            public_amount: 0,
        }
    }

    fn request(signals: &PublicSignals) -> RelayRequest {
        RelayRequest {
            kind: RelayKind::Transfer,
            proof: ProofDocument {
                pi_a: vec!["1".into(), "2".into(), "1".into()],
                pi_b: vec![
                    vec!["1".into(), "0".into()],
                    vec!["1".into(), "0".into()],
                    vec!["1".into(), "0".into()],
                ],
                pi_c: vec!["1".into(), "2".into(), "1".into()],
                protocol: None,
                curve: None,
            },
            public_inputs: signals.to_decimal_strings(),
            nullifiers: signals.nullifiers,
            output_commitments: signals.commitments,
            fee_commitment: None,
            merkle_root: signals.merkle_root,
        }
    }

    #[test]
    fn test_validate_shape() {
        let signals = signals();
        assert_eq!(request(&signals).validate(0).unwrap(), signals);

        let mut short = request(&signals);
        short.public_inputs.pop();
        assert!(matches!(short.validate(0), Err(RelayError::InvalidRequest(_))));

        let mut bad_proof = request(&signals);
        bad_proof.proof.pi_b.pop();
        assert!(matches!(bad_proof.validate(0), Err(RelayError::InvalidRequest(_))));

        let mut not_decimal = request(&signals);
        not_decimal.public_inputs[0] = "0x01".into();
        assert!(matches!(not_decimal.validate(0), Err(RelayError::InvalidRequest(_))));
    }

    #[test]
    fn test_validate_fee_commitment() {
        let signals = signals();
        let mut req = request(&signals);
        assert!(req.validate(30).is_err());

        req.fee_commitment = Some(Commitment::from_field(Fr::from(99u64)));
        assert!(req.validate(30).is_err());

        req.fee_commitment = Some(signals.commitments[1]);
        assert!(req.validate(30).is_ok());
    }

    #[test]
    fn test_binding() {
        let signals = signals();
        assert!(request(&signals).check_binding(&signals).is_ok());

        let mut wrong_root = request(&signals);
        wrong_root.merkle_root = Fr::from(7u64);
        assert!(matches!(
            wrong_root.check_binding(&signals),
            Err(RelayError::VerificationFailed(_))
        ));

        let mut swapped = request(&signals);
        swapped.output_commitments.swap(0, 1);
        assert!(swapped.check_binding(&signals).is_err());

        let mut unshield = request(&signals);
        unshield.kind = RelayKind::Unshield {
            recipient: Pubkey::new_unique(),
            amount: 10,
        };
        assert!(unshield.check_binding(&signals).is_err());
    }

    #[test]
    fn test_unshield_call_layout() {
        let signals = signals();
        let recipient = Pubkey::new_unique();
        let mut req = request(&signals);
        req.kind = RelayKind::Unshield {
            recipient,
            amount: 10,
        };

        let PoolCall::Unshield {
            instruction,
            recipient: to,
        } = req.to_call([0u8; ONCHAIN_PROOF_LEN], Fr::from(8u64))
        else {
            panic!("expected unshield");
        };
        assert_eq!(to, recipient);
        assert_eq!(instruction.change_commitment, signals.commitments[0]);
        assert_eq!(instruction.dummy_commitment, signals.commitments[1]);
        assert_eq!(instruction.amount, 10);
        assert_eq!(instruction.merkle_root, signals.merkle_root);
    }
}
