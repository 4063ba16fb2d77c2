//! Key generation CLI for the Shade transfer circuit
//!
//! Writes the compressed Groth16 proving key and the JSON verification key
//! the relay loads at startup.
//!
//! Usage:
//!   cargo run --package shade-prover --bin keygen -- --depth 20 \
//!       --pk-out ./keys/transfer.pk --vk-out ./keys/verification_key.json
//!
//! Keys must be regenerated whenever the circuit or the tree depth changes.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, bail};
use ark_std::rand::{SeedableRng, rngs::OsRng, rngs::StdRng};
use log::{info, warn};

use shade_privacy::TREE_DEPTH;
use shade_prover::keys::{VerificationKeyDocument, generate_keys, proving_key_to_bytes};

struct Args {
    depth: usize,
    pk_path: String,
    vk_path: String,
    seed: Option<u64>,
    force: bool,
}

fn parse_args() -> Result<Option<Args>> {
    let mut args = Args {
        depth: TREE_DEPTH,
        pk_path: String::from("./keys/transfer.pk"),
        vk_path: String::from("./keys/verification_key.json"),
        seed: None,
        force: false,
    };

    let mut iter = std::env::args().skip(1);
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--depth" => {
                let value = iter.next().context("--depth needs a value")?;
                args.depth = value.parse().context("--depth must be an integer")?;
            }
            "--pk-out" => args.pk_path = iter.next().context("--pk-out needs a path")?,
            "--vk-out" => args.vk_path = iter.next().context("--vk-out needs a path")?,
            "--seed" => {
                let value = iter.next().context("--seed needs a value")?;
                args.seed = Some(value.parse().context("--seed must be an integer")?);
            }
            "--force" | "-f" => args.force = true,
            "--help" | "-h" => {
                print_help();
                return Ok(None);
            }
            other => {
                print_help();
                bail!("unknown argument: {}", other);
            }
        }
    }

    if args.depth == 0 || args.depth > 32 {
        bail!("--depth must be between 1 and 32");
    }
    Ok(Some(args))
}

fn write_file(path: &str, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = Path::new(path).parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory for {}", path))?;
    }
    fs::write(path, bytes).with_context(|| format!("failed to write {}", path))
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let Some(args) = parse_args()? else {
        return Ok(());
    };

    if !args.force && Path::new(&args.pk_path).exists() && Path::new(&args.vk_path).exists() {
        println!("Keys already exist at:");
        println!("  Proving key:      {}", args.pk_path);
        println!("  Verification key: {}", args.vk_path);
        println!("\nUse --force to regenerate keys.");
        return Ok(());
    }

    println!("Shade transfer circuit key generation");
    println!("=====================================");
    println!("  Tree depth:     {}", args.depth);
    println!("  Public signals: root, nf1, nf2, cm1, cm2, publicAmount");
    println!();

    let start = std::time::Instant::now();
    let (pk, vk) = match args.seed {
        Some(seed) => {
            warn!("Using seeded setup ({}); keys are NOT suitable for production", seed);
            generate_keys(args.depth, &mut StdRng::seed_from_u64(seed))?
        }
        None => generate_keys(args.depth, &mut OsRng)?,
    };
    info!("Setup complete in {:?}", start.elapsed());

    let pk_bytes = proving_key_to_bytes(&pk)?;
    write_file(&args.pk_path, &pk_bytes)?;
    println!(
        "Proving key:      {} ({:.2} MB)",
        args.pk_path,
        pk_bytes.len() as f64 / 1024.0 / 1024.0
    );

    let vk_json = serde_json::to_string_pretty(&VerificationKeyDocument::from_ark(&vk))
        .context("failed to encode verification key")?;
    write_file(&args.vk_path, vk_json.as_bytes())?;
    println!("Verification key: {}", args.vk_path);

    println!();
    println!("To use with the relay, set:");
    println!("  export SHADE_VK_PATH={}", args.vk_path);

    Ok(())
}

fn print_help() {
    println!("Shade transfer circuit key generation");
    println!();
    println!("USAGE:");
    println!("    keygen [OPTIONS]");
    println!();
    println!("OPTIONS:");
    println!("    --depth <N>        Merkle tree depth (default: {})", TREE_DEPTH);
    println!("    --pk-out <PATH>    Proving key output (default: ./keys/transfer.pk)");
    println!("    --vk-out <PATH>    Verification key output (default: ./keys/verification_key.json)");
    println!("    --seed <N>         Deterministic setup for local testing only");
    println!("    --force, -f        Overwrite existing keys");
    println!("    --help, -h         Show this help message");
}
