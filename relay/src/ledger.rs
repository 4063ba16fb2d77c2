//! Ledger Client
//!
//! Submits pool instructions and reads pool history.
//!
//! ```text
//! ┌──────────────┐  PoolCall   ┌──────────────────┐
//! │ RelayService │────────────▶│  dyn Ledger      │
//! └──────────────┘             │  • SolanaLedger  │──▶ pool program
//!                              │  • MemoryLedger  │    (dev / tests)
//!                              └──────────────────┘
//! ```
//!
//! Account ordering per operation:
//!
//! ```text
//! transfer: relayer(s,w) pool(w) nullifier1(w) nullifier2(w) system
//! unshield: relayer(s,w) pool(w) vault(w) recipient(w) nullifier1(w) nullifier2(w) system
//! ```

use std::str::FromStr;
use std::sync::Mutex;

use ark_bn254::Fr;
use async_trait::async_trait;
use log::{debug, info, warn};
use sha2::{Digest, Sha256};
use shade_instruction::{NULLIFIER_SEED, POOL_SEED, PoolInstruction, Shield, Transfer, Unshield, VAULT_SEED};
use shade_privacy::{
    Commitment, IncrementalMerkleTree, Nullifier, NullifierSet, RootHistory, field,
};
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_client::rpc_client::GetConfirmedSignaturesForAddress2Config;
use solana_client::rpc_config::RpcTransactionConfig;
use solana_sdk::{
    commitment_config::CommitmentConfig,
    compute_budget::ComputeBudgetInstruction,
    instruction::{AccountMeta, Instruction},
    pubkey::Pubkey,
    signature::{Keypair, Signature, Signer},
    system_program,
    transaction::Transaction,
};
use solana_transaction_status::UiTransactionEncoding;
use thiserror::Error;

/// Compute budget for a transaction carrying a Groth16 verification
const COMPUTE_UNITS: u32 = 400_000;

/// Page size for signature history queries
const HISTORY_PAGE: usize = 1000;

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("RPC error: {0}")]
    Rpc(String),

    #[error("transaction rejected: {0}")]
    Rejected(String),

    #[error("failed to load keypair: {0}")]
    Keypair(String),

    #[error("invalid ledger data: {0}")]
    InvalidData(String),
}

impl From<solana_client::client_error::ClientError> for LedgerError {
    fn from(e: solana_client::client_error::ClientError) -> Self {
        LedgerError::Rpc(e.to_string())
    }
}

// ============================================================================
// Pool calls
// ============================================================================

/// A spend ready for submission
#[derive(Debug, Clone)]
pub enum PoolCall {
    Transfer(Transfer),
    Unshield {
        instruction: Unshield,
        recipient: Pubkey,
    },
}

impl PoolCall {
    /// Encoded instruction data
    pub fn data(&self) -> Vec<u8> {
        match self {
            PoolCall::Transfer(ix) => ix.encode(),
            PoolCall::Unshield { instruction, .. } => instruction.encode(),
        }
    }

    pub fn nullifiers(&self) -> &[Nullifier; 2] {
        match self {
            PoolCall::Transfer(ix) => &ix.nullifiers,
            PoolCall::Unshield { instruction, .. } => &instruction.nullifiers,
        }
    }

    /// Commitments appended on success, in append order
    pub fn commitments(&self) -> [Commitment; 2] {
        match self {
            PoolCall::Transfer(ix) => ix.commitments,
            PoolCall::Unshield { instruction, .. } => {
                [instruction.change_commitment, instruction.dummy_commitment]
            }
        }
    }

    /// Root the proof was generated against
    pub fn spend_root(&self) -> Fr {
        match self {
            PoolCall::Transfer(ix) => ix.old_root,
            PoolCall::Unshield { instruction, .. } => instruction.merkle_root,
        }
    }

    pub fn new_root(&self) -> Fr {
        match self {
            PoolCall::Transfer(ix) => ix.new_root,
            PoolCall::Unshield { instruction, .. } => instruction.new_root,
        }
    }
}

/// Pool program PDAs
pub fn pool_pda(program_id: &Pubkey) -> Pubkey {
    Pubkey::find_program_address(&[POOL_SEED], program_id).0
}

pub fn vault_pda(program_id: &Pubkey) -> Pubkey {
    Pubkey::find_program_address(&[VAULT_SEED], program_id).0
}

pub fn nullifier_pda(program_id: &Pubkey, nullifier: &Nullifier) -> Pubkey {
    Pubkey::find_program_address(&[NULLIFIER_SEED, &nullifier.to_bytes()], program_id).0
}

/// Accounts in the order the pool program expects
pub fn pool_accounts(program_id: &Pubkey, relayer: &Pubkey, call: &PoolCall) -> Vec<AccountMeta> {
    let [nf1, nf2] = call.nullifiers();
    let mut accounts = vec![
        AccountMeta::new(*relayer, true),
        AccountMeta::new(pool_pda(program_id), false),
    ];
    if let PoolCall::Unshield { recipient, .. } = call {
        accounts.push(AccountMeta::new(vault_pda(program_id), false));
        accounts.push(AccountMeta::new(*recipient, false));
    }
    accounts.push(AccountMeta::new(nullifier_pda(program_id, nf1), false));
    accounts.push(AccountMeta::new(nullifier_pda(program_id, nf2), false));
    accounts.push(AccountMeta::new_readonly(system_program::ID, false));
    accounts
}

// ============================================================================
// Ledger trait
// ============================================================================

#[async_trait]
pub trait Ledger: Send + Sync {
    /// Submit and wait for confirmation, returning the signature
    async fn submit(&self, call: &PoolCall) -> Result<String, LedgerError>;

    /// Relayer balance in the ledger's smallest unit
    async fn balance(&self) -> Result<u64, LedgerError>;

    /// Successful pool instruction payloads, oldest first
    async fn pool_history(&self) -> Result<Vec<Vec<u8>>, LedgerError>;

    /// Relayer address
    fn relayer(&self) -> String;
}

// ============================================================================
// Solana
// ============================================================================

/// Pool history fetched so far
#[derive(Default)]
struct HistoryCache {
    /// Newest signature seen, the lower bound of the next query
    newest: Option<Signature>,
    payloads: Vec<Vec<u8>>,
}

pub struct SolanaLedger {
    rpc: RpcClient,
    relayer: Keypair,
    program_id: Pubkey,
    commitment: CommitmentConfig,
    history: tokio::sync::Mutex<HistoryCache>,
}

impl SolanaLedger {
    pub fn new(
        rpc_url: &str,
        commitment: &str,
        program_id: Pubkey,
        relayer: Keypair,
    ) -> Result<Self, LedgerError> {
        let commitment = CommitmentConfig::from_str(commitment)
            .map_err(|e| LedgerError::InvalidData(format!("commitment {:?}: {}", commitment, e)))?;
        let rpc = RpcClient::new_with_commitment(rpc_url.to_string(), commitment);

        info!(
            "Solana ledger initialized: program={}, relayer={}",
            program_id,
            relayer.pubkey()
        );

        Ok(Self {
            rpc,
            relayer,
            program_id,
            commitment,
            history: tokio::sync::Mutex::new(HistoryCache::default()),
        })
    }

    async fn fetch_pool_instructions(&self, signature: &Signature) -> Result<Vec<Vec<u8>>, LedgerError> {
        let config = RpcTransactionConfig {
            encoding: Some(UiTransactionEncoding::Base64),
            commitment: Some(self.commitment),
            max_supported_transaction_version: Some(0),
        };
        let tx = self.rpc.get_transaction_with_config(signature, config).await?;

        let failed = tx
            .transaction
            .meta
            .as_ref()
            .is_some_and(|meta| meta.err.is_some());
        if failed {
            return Ok(Vec::new());
        }

        let decoded = tx.transaction.transaction.decode().ok_or_else(|| {
            LedgerError::InvalidData(format!("undecodable transaction {}", signature))
        })?;
        let keys = decoded.message.static_account_keys();

        Ok(decoded
            .message
            .instructions()
            .iter()
            .filter(|ix| keys.get(ix.program_id_index as usize) == Some(&self.program_id))
            .map(|ix| ix.data.clone())
            .collect())
    }
}

fn parse_signature(s: &str) -> Result<Signature, LedgerError> {
    Signature::from_str(s).map_err(|e| LedgerError::InvalidData(e.to_string()))
}

/// Load a keypair from a JSON byte-array file
pub fn load_keypair(path: &std::path::Path) -> Result<Keypair, LedgerError> {
    let contents = std::fs::read_to_string(path)
        .map_err(|e| LedgerError::Keypair(format!("failed to read {}: {}", path.display(), e)))?;
    let bytes: Vec<u8> = serde_json::from_str(&contents)
        .map_err(|e| LedgerError::Keypair(format!("invalid keypair JSON: {}", e)))?;
    Keypair::try_from(bytes.as_slice())
        .map_err(|e| LedgerError::Keypair(format!("invalid keypair bytes: {}", e)))
}

#[async_trait]
impl Ledger for SolanaLedger {
    async fn submit(&self, call: &PoolCall) -> Result<String, LedgerError> {
        let instruction = Instruction {
            program_id: self.program_id,
            accounts: pool_accounts(&self.program_id, &self.relayer.pubkey(), call),
            data: call.data(),
        };
        let budget = ComputeBudgetInstruction::set_compute_unit_limit(COMPUTE_UNITS);

        let recent_blockhash = self.rpc.get_latest_blockhash().await?;
        let tx = Transaction::new_signed_with_payer(
            &[budget, instruction],
            Some(&self.relayer.pubkey()),
            &[&self.relayer],
            recent_blockhash,
        );

        debug!("Submitting {} byte pool instruction", call.data().len());
        let signature = self
            .rpc
            .send_and_confirm_transaction(&tx)
            .await
            .map_err(|e| LedgerError::Rejected(e.to_string()))?;

        info!("Pool transaction confirmed: {}", signature);
        Ok(signature.to_string())
    }

    async fn balance(&self) -> Result<u64, LedgerError> {
        Ok(self.rpc.get_balance(&self.relayer.pubkey()).await?)
    }

    async fn pool_history(&self) -> Result<Vec<Vec<u8>>, LedgerError> {
        let mut cache = self.history.lock().await;
        let mut signatures = Vec::new();
        let mut newest = None;
        let mut before = None;

        loop {
            let config = GetConfirmedSignaturesForAddress2Config {
                before,
                until: cache.newest,
                limit: Some(HISTORY_PAGE),
                commitment: Some(self.commitment),
            };
            let page = self
                .rpc
                .get_signatures_for_address_with_config(&self.program_id, config)
                .await?;

            let Some(last) = page.last() else {
                break;
            };
            before = Some(parse_signature(&last.signature)?);
            if newest.is_none() {
                newest = Some(parse_signature(&page[0].signature)?);
            }
            let done = page.len() < HISTORY_PAGE;
            signatures.extend(
                page.into_iter()
                    .filter(|status| status.err.is_none())
                    .map(|status| status.signature),
            );
            if done {
                break;
            }
        }

        if !signatures.is_empty() {
            // Newest first from RPC
            signatures.reverse();
            info!("Fetching {} new pool transactions", signatures.len());

            let mut fresh = Vec::new();
            for signature in &signatures {
                fresh.extend(self.fetch_pool_instructions(&parse_signature(signature)?).await?);
            }
            cache.payloads.extend(fresh);
        }
        if newest.is_some() {
            cache.newest = newest;
        }
        Ok(cache.payloads.clone())
    }

    fn relayer(&self) -> String {
        self.relayer.pubkey().to_string()
    }
}

// ============================================================================
// In-memory
// ============================================================================

struct MemoryState {
    tree: IncrementalMerkleTree,
    roots: RootHistory,
    spent: NullifierSet,
    history: Vec<Vec<u8>>,
    balance: u64,
    fail_next: Option<String>,
}

/// In-process stand-in for the pool program
///
/// Enforces what the program enforces: known spend root, unspent distinct
/// nullifiers and a `new_root` matching the appended commitments.
pub struct MemoryLedger {
    state: Mutex<MemoryState>,
    relayer: String,
}

impl MemoryLedger {
    pub fn new(depth: usize, root_history: usize) -> Self {
        let tree = IncrementalMerkleTree::with_depth(depth);
        let mut roots = RootHistory::new(root_history);
        roots.push(tree.root());

        Self {
            state: Mutex::new(MemoryState {
                tree,
                roots,
                spent: NullifierSet::new(),
                history: Vec::new(),
                balance: 1_000_000_000,
                fail_next: None,
            }),
            relayer: bs58::encode([7u8; 32]).into_string(),
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, MemoryState>, LedgerError> {
        self.state
            .lock()
            .map_err(|_| LedgerError::Rpc("memory ledger poisoned".to_string()))
    }

    /// Public deposit: appends one leaf
    pub fn shield(&self, amount: u64, commitment: Commitment) -> Result<Fr, LedgerError> {
        let mut state = self.lock()?;
        let root = state
            .tree
            .insert(commitment)
            .map_err(|e| LedgerError::Rejected(e.to_string()))?;
        state.roots.push(root);
        state.history.push(Shield { amount, commitment }.encode());
        Ok(root)
    }

    /// Make the next submission fail with `reason`
    pub fn fail_next(&self, reason: impl Into<String>) {
        if let Ok(mut state) = self.lock() {
            state.fail_next = Some(reason.into());
        }
    }

    pub fn root(&self) -> Result<Fr, LedgerError> {
        Ok(self.lock()?.tree.root())
    }

    pub fn is_spent(&self, nullifier: &Nullifier) -> bool {
        self.lock().is_ok_and(|state| state.spent.contains(nullifier))
    }

    /// Number of instructions recorded
    pub fn history_len(&self) -> usize {
        self.lock().map(|state| state.history.len()).unwrap_or(0)
    }
}

#[async_trait]
impl Ledger for MemoryLedger {
    async fn submit(&self, call: &PoolCall) -> Result<String, LedgerError> {
        let mut state = self.lock()?;

        if let Some(reason) = state.fail_next.take() {
            return Err(LedgerError::Rejected(reason));
        }

        let [nf1, nf2] = call.nullifiers();
        if nf1 == nf2 {
            return Err(LedgerError::Rejected("duplicate nullifier".to_string()));
        }
        for nf in [nf1, nf2] {
            if state.spent.contains(nf) {
                return Err(LedgerError::Rejected(format!(
                    "nullifier {} already spent",
                    field::to_hex(&nf.to_field())
                )));
            }
        }
        if !state.roots.contains(&call.spend_root()) {
            return Err(LedgerError::Rejected("unknown merkle root".to_string()));
        }

        let commitments = call.commitments();
        let expected = state
            .tree
            .preview_insert(&commitments)
            .map_err(|e| LedgerError::Rejected(e.to_string()))?;
        if expected != call.new_root() {
            warn!("memory ledger: new root mismatch");
            return Err(LedgerError::Rejected("new root mismatch".to_string()));
        }

        for commitment in commitments {
            state
                .tree
                .insert(commitment)
                .map_err(|e| LedgerError::Rejected(e.to_string()))?;
        }
        let root = state.tree.root();
        state.roots.push(root);
        state.spent.insert(*nf1);
        state.spent.insert(*nf2);

        let data = call.data();
        let mut hasher = Sha256::new();
        hasher.update(&data);
        hasher.update((state.history.len() as u64).to_le_bytes());
        state.history.push(data);

        Ok(bs58::encode(hasher.finalize()).into_string())
    }

    async fn balance(&self) -> Result<u64, LedgerError> {
        Ok(self.lock()?.balance)
    }

    async fn pool_history(&self) -> Result<Vec<Vec<u8>>, LedgerError> {
        Ok(self.lock()?.history.clone())
    }

    fn relayer(&self) -> String {
        self.relayer.clone()
    }
}

/// Pool instruction payloads that spent nullifiers, for replaying the spent set
pub fn spent_nullifiers(history: &[Vec<u8>]) -> Vec<Nullifier> {
    history
        .iter()
        .filter_map(|data| match PoolInstruction::decode(data) {
            Ok(PoolInstruction::Transfer(ix)) => Some(ix.nullifiers),
            Ok(PoolInstruction::Unshield(ix)) => Some(ix.nullifiers),
            _ => None,
        })
        .flatten()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use shade_instruction::PROOF_LEN;

    fn transfer(ledger: &MemoryLedger, nf: u64) -> PoolCall {
        let commitments = [
            Commitment::from_field(Fr::from(nf * 10)),
            Commitment::from_field(Fr::from(nf * 10 + 1)),
        ];
        let state = ledger.state.lock().unwrap();
        PoolCall::Transfer(Transfer {
            proof: [0u8; PROOF_LEN],
            nullifiers: [
                Nullifier::from_field(Fr::from(nf)),
                Nullifier::from_field(Fr::from(nf + 1000)),
            ],
            commitments,
            old_root: state.tree.root(),
            new_root: state.tree.preview_insert(&commitments).unwrap(),
        })
    }

    #[test]
    fn test_unshield_account_order() {
        let program_id = Pubkey::new_unique();
        let relayer = Pubkey::new_unique();
        let recipient = Pubkey::new_unique();
        let nullifiers = [
            Nullifier::from_field(Fr::from(1u64)),
            Nullifier::from_field(Fr::from(2u64)),
        ];
        let call = PoolCall::Unshield {
            instruction: Unshield {
                proof: [0u8; PROOF_LEN],
                nullifiers,
                change_commitment: Commitment::from_field(Fr::from(3u64)),
                dummy_commitment: Commitment::from_field(Fr::from(4u64)),
                merkle_root: Fr::from(5u64),
                amount: 6,
                new_root: Fr::from(7u64),
            },
            recipient,
        };

        let accounts = pool_accounts(&program_id, &relayer, &call);
        let keys: Vec<Pubkey> = accounts.iter().map(|a| a.pubkey).collect();
        assert_eq!(
            keys,
            vec![
                relayer,
                pool_pda(&program_id),
                vault_pda(&program_id),
                recipient,
                nullifier_pda(&program_id, &nullifiers[0]),
                nullifier_pda(&program_id, &nullifiers[1]),
                system_program::ID,
            ]
        );
        assert!(accounts[0].is_signer);
        assert!(accounts.iter().skip(1).all(|a| !a.is_signer));
        assert!(!accounts[6].is_writable);
    }

    #[test]
    fn test_transfer_account_order() {
        let program_id = Pubkey::new_unique();
        let relayer = Pubkey::new_unique();
        let ledger = MemoryLedger::new(4, 8);
        let call = transfer(&ledger, 1);

        let accounts = pool_accounts(&program_id, &relayer, &call);
        assert_eq!(accounts.len(), 5);
        assert_eq!(accounts[1].pubkey, pool_pda(&program_id));
        assert_eq!(accounts[4].pubkey, system_program::ID);
    }

    #[tokio::test]
    async fn test_memory_ledger_enforces_program_rules() {
        let ledger = MemoryLedger::new(4, 8);
        ledger.shield(10, Commitment::from_field(Fr::from(99u64))).unwrap();

        let call = transfer(&ledger, 1);
        let signature = ledger.submit(&call).await.unwrap();
        assert!(!signature.is_empty());
        assert!(ledger.is_spent(&call.nullifiers()[0]));

        // Replay is a double spend
        assert!(matches!(ledger.submit(&call).await, Err(LedgerError::Rejected(_))));

        // Stale new root
        let mut stale = transfer(&ledger, 2);
        if let PoolCall::Transfer(ix) = &mut stale {
            ix.new_root += Fr::from(1u64);
        }
        assert!(ledger.submit(&stale).await.is_err());

        ledger.fail_next("blockhash expired");
        assert!(ledger.submit(&transfer(&ledger, 3)).await.is_err());
        assert!(ledger.submit(&transfer(&ledger, 3)).await.is_ok());

        let history = ledger.pool_history().await.unwrap();
        assert_eq!(history.len(), 3);
        assert_eq!(spent_nullifiers(&history).len(), 4);
    }
}
