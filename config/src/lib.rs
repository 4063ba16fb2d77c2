//! Shade Configuration
//!
//! Shared configuration crate for Shade components.
//!
//! Handles loading configuration from:
//! 1. SHADE_CONFIG env var (explicit path)
//! 2. ./config.toml (current directory)
//! 3. ~/.shade/config.toml (user home)
//!
//! Environment variables take precedence over TOML config.

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use solana_sdk::pubkey::Pubkey;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use std::{env, fs};

const CONFIG_FILE_NAME: &str = "config.toml";
const CONFIG_DIR_NAME: &str = ".shade";

// ============================================================================
// Default Constants
// ============================================================================

const DEFAULT_BIND_ADDR: &str = "127.0.0.1:3001";
const DEFAULT_MAX_PENDING_TX: usize = 100;
const DEFAULT_PENDING_TIMEOUT_SECS: u64 = 300;
const DEFAULT_STATUS_COOLDOWN_SECS: u64 = 60;
const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 30;
const DEFAULT_TREE_DEPTH: usize = 20;
const DEFAULT_ROOT_HISTORY_SIZE: usize = 32;
const DEFAULT_RPC_URL: &str = "http://127.0.0.1:8899";
const DEFAULT_PROGRAM_ID: &str = "AK3mmpxWb76gevT5VYthLi6pV2yAD3kkenmrrJ2YLxMh";
const DEFAULT_COMMITMENT: &str = "confirmed";

/// Upper bound for `fee_bps` (100%)
pub const MAX_FEE_BPS: u16 = 10_000;

// ============================================================================
// Config Structs
// ============================================================================

/// Root configuration structure (matches TOML layout)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ShadeConfig {
    #[serde(default)]
    pub relay: RelayConfig,
    #[serde(default)]
    pub prover: ProverConfig,
    #[serde(default)]
    pub solana: SolanaConfig,
}

/// Deployment environment
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Production,
    Development,
    Test,
}

impl Environment {
    /// Environments where verification may be switched off
    pub fn allows_unverified(&self) -> bool {
        matches!(self, Environment::Development | Environment::Test)
    }
}

impl FromStr for Environment {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "production" | "prod" => Ok(Environment::Production),
            "development" | "dev" => Ok(Environment::Development),
            "test" => Ok(Environment::Test),
            other => bail!("unknown environment {:?}", other),
        }
    }
}

/// Where submitted transactions go
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LedgerMode {
    #[default]
    Solana,
    /// In-process ledger, for development only
    Memory,
}

/// Relay service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    #[serde(default)]
    pub environment: Environment,
    /// In-flight (pending + submitted) request ceiling
    #[serde(default = "default_max_pending_tx")]
    pub max_pending_tx: usize,
    /// Records older than this are force-expired by the sweep
    #[serde(default = "default_pending_timeout_secs")]
    pub pending_timeout_secs: u64,
    /// How long a finished record stays pollable
    #[serde(default = "default_status_cooldown_secs")]
    pub status_cooldown_secs: u64,
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
    #[serde(default = "default_true")]
    pub verification_enabled: bool,
    #[serde(default)]
    pub fee_bps: u16,
    #[serde(default)]
    pub fee_recipient: Option<String>,
    #[serde(default)]
    pub ledger: LedgerMode,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            bind_addr: DEFAULT_BIND_ADDR.into(),
            environment: Environment::default(),
            max_pending_tx: DEFAULT_MAX_PENDING_TX,
            pending_timeout_secs: DEFAULT_PENDING_TIMEOUT_SECS,
            status_cooldown_secs: DEFAULT_STATUS_COOLDOWN_SECS,
            sweep_interval_secs: DEFAULT_SWEEP_INTERVAL_SECS,
            verification_enabled: true,
            fee_bps: 0,
            fee_recipient: None,
            ledger: LedgerMode::default(),
        }
    }
}

impl RelayConfig {
    pub fn pending_timeout(&self) -> Duration {
        Duration::from_secs(self.pending_timeout_secs)
    }

    pub fn status_cooldown(&self) -> Duration {
        Duration::from_secs(self.status_cooldown_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

fn default_bind_addr() -> String {
    DEFAULT_BIND_ADDR.into()
}
fn default_max_pending_tx() -> usize {
    DEFAULT_MAX_PENDING_TX
}
fn default_pending_timeout_secs() -> u64 {
    DEFAULT_PENDING_TIMEOUT_SECS
}
fn default_status_cooldown_secs() -> u64 {
    DEFAULT_STATUS_COOLDOWN_SECS
}
fn default_sweep_interval_secs() -> u64 {
    DEFAULT_SWEEP_INTERVAL_SECS
}
fn default_true() -> bool {
    true
}

/// Proof subsystem configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProverConfig {
    #[serde(default)]
    pub vk_path: Option<String>,
    #[serde(default = "default_tree_depth")]
    pub tree_depth: usize,
    #[serde(default = "default_root_history_size")]
    pub root_history_size: usize,
}

impl Default for ProverConfig {
    fn default() -> Self {
        Self {
            vk_path: None,
            tree_depth: DEFAULT_TREE_DEPTH,
            root_history_size: DEFAULT_ROOT_HISTORY_SIZE,
        }
    }
}

fn default_tree_depth() -> usize {
    DEFAULT_TREE_DEPTH
}
fn default_root_history_size() -> usize {
    DEFAULT_ROOT_HISTORY_SIZE
}

/// Solana connection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SolanaConfig {
    #[serde(default = "default_rpc_url")]
    pub rpc_url: String,
    #[serde(default = "default_program_id")]
    pub program_id: String,
    #[serde(default)]
    pub relayer_keypair_path: Option<String>,
    #[serde(default = "default_commitment")]
    pub commitment: String,
}

impl Default for SolanaConfig {
    fn default() -> Self {
        Self {
            rpc_url: DEFAULT_RPC_URL.into(),
            program_id: DEFAULT_PROGRAM_ID.into(),
            relayer_keypair_path: None,
            commitment: DEFAULT_COMMITMENT.into(),
        }
    }
}

impl SolanaConfig {
    /// Parsed pool program id
    pub fn program_id(&self) -> Result<Pubkey> {
        Pubkey::from_str(&self.program_id)
            .with_context(|| format!("Invalid program_id in config: {}", self.program_id))
    }

    /// Keypair path, falling back to the Solana CLI default
    pub fn relayer_keypair_path(&self) -> Option<PathBuf> {
        self.relayer_keypair_path
            .as_ref()
            .map(PathBuf::from)
            .or_else(|| dirs::home_dir().map(|h| h.join(".config/solana/id.json")))
    }
}

fn default_rpc_url() -> String {
    DEFAULT_RPC_URL.into()
}
fn default_program_id() -> String {
    DEFAULT_PROGRAM_ID.into()
}
fn default_commitment() -> String {
    DEFAULT_COMMITMENT.into()
}

// ============================================================================
// Environment Variable Helpers
// ============================================================================

type Lookup<'a> = &'a dyn Fn(&str) -> Option<String>;

/// Set field from env var if present
fn env_string(lookup: Lookup, key: &str, field: &mut String) {
    if let Some(v) = lookup(key) {
        *field = v;
    }
}

/// Set Option<String> from env var if present
fn env_option_string(lookup: Lookup, key: &str, field: &mut Option<String>) {
    if let Some(v) = lookup(key) {
        *field = Some(v);
    }
}

/// Set field from env var if present and parseable
fn env_parse<T: FromStr>(lookup: Lookup, key: &str, field: &mut T) {
    if let Some(v) = lookup(key) {
        match v.parse() {
            Ok(parsed) => *field = parsed,
            Err(_) => log::warn!("Ignoring unparseable {}={}", key, v),
        }
    }
}

/// Check if env var is set to a truthy value ("1" or "true")
fn env_bool(lookup: Lookup, key: &str) -> Option<bool> {
    lookup(key).map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
}

// ============================================================================
// Implementation
// ============================================================================

impl ShadeConfig {
    /// Load configuration from config file with env var overrides
    pub fn load() -> Result<Self> {
        let mut config = match Self::find_config_file() {
            Some(path) => {
                log::info!("Loading config from: {}", path.display());
                Self::parse_file(&path)?
            }
            None => {
                log::info!("No config file found, using defaults and environment variables");
                Self::default()
            }
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Load configuration from a specific file path
    pub fn load_from(path: &Path) -> Result<Self> {
        let mut config = Self::parse_file(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    fn parse_file(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Find the config file path
    fn find_config_file() -> Option<PathBuf> {
        // 1. Check SHADE_CONFIG env var
        if let Ok(path) = env::var("SHADE_CONFIG") {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
            log::warn!("SHADE_CONFIG points at missing file {}", path.display());
        }

        // 2. Check ./config.toml (current directory)
        let local_path = PathBuf::from(CONFIG_FILE_NAME);
        if local_path.exists() {
            return Some(local_path);
        }

        // 3. Check ~/.shade/config.toml
        Self::default_config_path().filter(|p| p.exists())
    }

    fn apply_env_overrides(&mut self) {
        self.apply_overrides(&|key: &str| env::var(key).ok());
    }

    /// Apply overrides from `lookup` (the process environment in production)
    pub fn apply_overrides(&mut self, lookup: Lookup) {
        // Relay
        env_string(lookup, "SHADE_BIND_ADDR", &mut self.relay.bind_addr);
        env_parse(lookup, "SHADE_ENV", &mut self.relay.environment);
        env_parse(lookup, "SHADE_MAX_PENDING_TX", &mut self.relay.max_pending_tx);
        env_parse(
            lookup,
            "SHADE_PENDING_TIMEOUT_SECS",
            &mut self.relay.pending_timeout_secs,
        );
        env_parse(
            lookup,
            "SHADE_STATUS_COOLDOWN_SECS",
            &mut self.relay.status_cooldown_secs,
        );
        env_parse(
            lookup,
            "SHADE_SWEEP_INTERVAL_SECS",
            &mut self.relay.sweep_interval_secs,
        );
        if let Some(v) = env_bool(lookup, "SHADE_VERIFICATION_ENABLED") {
            self.relay.verification_enabled = v;
        }
        env_parse(lookup, "SHADE_FEE_BPS", &mut self.relay.fee_bps);
        env_option_string(lookup, "SHADE_FEE_RECIPIENT", &mut self.relay.fee_recipient);
        if let Some(v) = lookup("SHADE_LEDGER") {
            self.relay.ledger = match v.to_ascii_lowercase().as_str() {
                "memory" => LedgerMode::Memory,
                _ => LedgerMode::Solana,
            };
        }

        // Prover
        env_option_string(lookup, "SHADE_VK_PATH", &mut self.prover.vk_path);
        env_parse(lookup, "SHADE_TREE_DEPTH", &mut self.prover.tree_depth);
        env_parse(
            lookup,
            "SHADE_ROOT_HISTORY_SIZE",
            &mut self.prover.root_history_size,
        );

        // Solana
        env_string(lookup, "SOLANA_RPC_URL", &mut self.solana.rpc_url);
        env_string(lookup, "SHADE_PROGRAM_ID", &mut self.solana.program_id);
        env_option_string(
            lookup,
            "SHADE_RELAYER_KEYPAIR",
            &mut self.solana.relayer_keypair_path,
        );
    }

    /// Reject configurations the relay must not start with
    pub fn validate(&self) -> Result<()> {
        let relay = &self.relay;

        if relay.max_pending_tx == 0 {
            bail!("relay.max_pending_tx must be at least 1");
        }
        if relay.pending_timeout_secs == 0 {
            bail!("relay.pending_timeout_secs must be at least 1");
        }
        if relay.sweep_interval_secs == 0 {
            bail!("relay.sweep_interval_secs must be at least 1");
        }
        if relay.fee_bps > MAX_FEE_BPS {
            bail!("relay.fee_bps {} exceeds {}", relay.fee_bps, MAX_FEE_BPS);
        }
        if relay.fee_bps > 0 && relay.fee_recipient.is_none() {
            bail!("relay.fee_recipient is required when fee_bps > 0");
        }
        if !relay.environment.allows_unverified() {
            if !relay.verification_enabled {
                bail!("verification cannot be disabled in production");
            }
            if self.prover.vk_path.is_none() {
                bail!("prover.vk_path is required in production");
            }
            if relay.ledger == LedgerMode::Memory {
                bail!("the in-memory ledger is not available in production");
            }
        }
        if self.prover.tree_depth == 0 || self.prover.tree_depth > 32 {
            bail!("prover.tree_depth must be between 1 and 32");
        }
        if self.prover.root_history_size == 0 {
            bail!("prover.root_history_size must be at least 1");
        }
        self.solana.program_id()?;
        Ok(())
    }

    /// Get the default config file path
    pub fn default_config_path() -> Option<PathBuf> {
        dirs::home_dir().map(|h| h.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
    }

    /// Generate a sample config file
    pub fn generate_sample() -> String {
        let mut sample = Self::default();
        sample.relay.environment = Environment::Development;
        sample.prover.vk_path = Some("./keys/verification_key.json".into());
        toml::to_string_pretty(&sample).unwrap_or_default()
    }
}

// ============================================================================
// Tests
// ============================================================================
