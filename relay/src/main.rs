//! Shade Relay
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                      Shade Relay                         │
//! │                                                          │
//! │  ┌────────────┐   ┌───────────────┐   ┌──────────────┐   │
//! │  │  HTTP API  │──▶│ RelayService  │──▶│   Ledger     │   │
//! │  │  (axum)    │   │ verify/submit │   │  (Solana)    │   │
//! │  └────────────┘   └───────┬───────┘   └──────────────┘   │
//! │                           │                              │
//! │               ┌───────────┴───────────┐                  │
//! │               ▼                       ▼                  │
//! │        ┌─────────────┐        ┌──────────────┐           │
//! │        │  Pending    │        │  Pool mirror │           │
//! │        │  table      │        │  (tree/nfs)  │           │
//! │        └─────────────┘        └──────────────┘           │
//! └──────────────────────────────────────────────────────────┘
//! ```

use std::env;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use log::{info, warn};
use shade_config::{LedgerMode, ShadeConfig};
use shade_prover::VerifierKey;
use shade_relay::ledger::load_keypair;
use shade_relay::{
    ApiState, Ledger, MemoryLedger, RelayService, RelaySettings, SolanaLedger, SystemClock,
    create_router,
};
use tokio::net::TcpListener;
use tokio::signal;

fn print_usage() {
    println!("Usage: shade-relay [--config <path>] [--sample-config]");
    println!();
    println!("  --config <path>   Load configuration from <path>");
    println!("  --sample-config   Print a sample config.toml and exit");
    println!();
    println!("Without --config, SHADE_CONFIG, ./config.toml and ~/.shade/config.toml are tried.");
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let mut config_path: Option<PathBuf> = None;
    let mut args = env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" => {
                let path = args.next().context("--config requires a path")?;
                config_path = Some(PathBuf::from(path));
            }
            "--sample-config" => {
                print!("{}", ShadeConfig::generate_sample());
                return Ok(());
            }
            "--help" | "-h" => {
                print_usage();
                return Ok(());
            }
            other => {
                print_usage();
                bail!("unknown argument {:?}", other);
            }
        }
    }

    let config = match config_path {
        Some(path) => ShadeConfig::load_from(&path)?,
        None => ShadeConfig::load()?,
    };
    config.validate().context("invalid configuration")?;

    info!("============================================");
    info!("            SHADE RELAY v{}", env!("CARGO_PKG_VERSION"));
    info!("============================================");
    info!("Bind address      : {}", config.relay.bind_addr);
    info!("Environment       : {:?}", config.relay.environment);
    info!("Ledger            : {:?}", config.relay.ledger);
    info!("Solana RPC        : {}", config.solana.rpc_url);
    info!("Pool program      : {}", config.solana.program_id);
    info!("Max pending       : {}", config.relay.max_pending_tx);
    info!("Pending timeout   : {}s", config.relay.pending_timeout_secs);
    info!("Verification      : {}", config.relay.verification_enabled);
    info!("Fee (bps)         : {}", config.relay.fee_bps);
    info!("Tree depth        : {}", config.prover.tree_depth);
    info!("============================================");

    let vk = if config.relay.verification_enabled {
        let path = config
            .prover
            .vk_path
            .as_deref()
            .context("verification enabled but prover.vk_path is not set")?;
        let vk = VerifierKey::load(path)
            .with_context(|| format!("failed to load verification key {}", path))?;
        info!("Verification key loaded from {} (nPublic={})", path, vk.n_public());
        Some(vk)
    } else {
        warn!("Running WITHOUT proof verification");
        None
    };

    let ledger: Arc<dyn Ledger> = match config.relay.ledger {
        LedgerMode::Solana => {
            let keypair_path = config
                .solana
                .relayer_keypair_path()
                .context("no relayer keypair configured")?;
            let relayer = load_keypair(&keypair_path)?;
            Arc::new(SolanaLedger::new(
                &config.solana.rpc_url,
                &config.solana.commitment,
                config.solana.program_id()?,
                relayer,
            )?)
        }
        LedgerMode::Memory => {
            warn!("Using the in-memory ledger: nothing reaches a real chain");
            Arc::new(MemoryLedger::new(
                config.prover.tree_depth,
                config.prover.root_history_size,
            ))
        }
    };

    let service = Arc::new(
        RelayService::start(
            RelaySettings::from_config(&config),
            vk,
            ledger,
            Arc::new(SystemClock),
        )
        .await
        .context("failed to start relay service")?,
    );
    let sweeper = service.spawn_sweeper(config.relay.sweep_interval());
    info!("Pending sweep every {}s", config.relay.sweep_interval_secs);

    let router = create_router(ApiState::new(service));
    let listener = TcpListener::bind(&config.relay.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.relay.bind_addr))?;
    info!("HTTP API listening on {}", config.relay.bind_addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            let _ = signal::ctrl_c().await;
            info!("Shutting down...");
        })
        .await?;

    sweeper.abort();
    info!("Relay stopped");
    Ok(())
}
