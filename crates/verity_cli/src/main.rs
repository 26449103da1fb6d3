//! VERITY CLI
//!
//! Key generation, a single-node sequencing and signing driver, and signed
//! tree head verification.

#![warn(missing_docs)]
#![warn(clippy::all)]

use clap::{Args, Parser, Subcommand};
use color_eyre::eyre::{Result, WrapErr};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use verity_certify::{LogSigner, LogVerifier, PublicKeyBytes, Signer};
use verity_cluster::{MemoryConsistentStore, SignerConfig, SignerError, TreeSigner};
use verity_core::{Clock, NodeId, SystemClock};
use verity_log::{CompactMerkleTree, LoggedEntry, SignedTreeHead};
use verity_storage::{RedbEntryStore, StoreConfig};

/// Log filter used when `RUST_LOG` is unset
const DEFAULT_FILTER: &str = "warn,verity_cluster=info,verity_storage=info,verity_certify=info,verity=info";

/// Node name used when neither the config file nor the flags name one
const DEFAULT_NODE_NAME: &str = "verity-local";

/// Exit status for a recoverable failure
const EXIT_RECOVERABLE: u8 = 1;

/// Exit status for a fatal inconsistency
const EXIT_FATAL: u8 = 2;

#[derive(Parser)]
#[command(name = "verity")]
#[command(about = "VERITY - sequencing and tree signing for an append-only log", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate an Ed25519 signing key
    Keygen,
    /// Sequence and sign entries on a single node
    Run(RunArgs),
    /// Verify a signed tree head
    Verify {
        /// Path to a tree head JSON file
        #[arg(long)]
        sth: PathBuf,
        /// Hex-encoded public key of the log
        #[arg(long)]
        public_key: String,
    },
}

#[derive(Args)]
struct RunArgs {
    /// Directory holding the local entry store
    #[arg(short, long)]
    store: PathBuf,
    /// JSON config file
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Hex-encoded secret key; an ephemeral key is generated if omitted
    #[arg(long)]
    secret_key: Option<String>,
    /// Node name; overrides the config file's node ID
    #[arg(long)]
    node_name: Option<String>,
    /// Synthetic entries to submit
    #[arg(short, long, default_value_t = 16)]
    entries: u64,
    /// Sequencing rounds
    #[arg(short, long, default_value_t = 1)]
    rounds: u32,
    /// Pause between rounds in milliseconds
    #[arg(long, default_value_t = 0)]
    interval_ms: u64,
    /// Guard window in milliseconds; overrides the config file
    #[arg(long)]
    guard_window_ms: Option<u64>,
    /// Also write the final tree head to this file
    #[arg(short, long)]
    output: Option<PathBuf>,
}

/// Contents of a `--config` file
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
struct FileConfig {
    signer: Option<SignerConfig>,
    scan_batch_size: Option<usize>,
}

fn main() -> Result<ExitCode> {
    color_eyre::install()?;
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Commands::Keygen => keygen(),
        Commands::Run(args) => run(&args),
        Commands::Verify { sth, public_key } => verify(&sth, &public_key),
    }
}

fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn keygen() -> Result<ExitCode> {
    let signer = Signer::generate();
    let keys = serde_json::json!({
        "secret_key": signer.secret_hex(),
        "public_key": signer.public_key().to_hex(),
    });
    println!("{}", serde_json::to_string_pretty(&keys)?);
    Ok(ExitCode::SUCCESS)
}

fn load_config(path: &Path) -> Result<FileConfig> {
    let raw = std::fs::read_to_string(path)
        .wrap_err_with(|| format!("reading config {}", path.display()))?;
    serde_json::from_str(&raw).wrap_err_with(|| format!("parsing config {}", path.display()))
}

fn resolve_signer_config(args: &RunArgs, from_file: Option<SignerConfig>) -> SignerConfig {
    let mut config = from_file
        .unwrap_or_else(|| SignerConfig::new(NodeId::from_name(DEFAULT_NODE_NAME)));
    if let Some(name) = &args.node_name {
        config.node_id = NodeId::from_name(name);
    }
    if let Some(window) = args.guard_window_ms {
        config.guard_window_ms = window;
    }
    config
}

fn run(args: &RunArgs) -> Result<ExitCode> {
    let file = match &args.config {
        Some(path) => load_config(path)?,
        None => FileConfig::default(),
    };
    let config = resolve_signer_config(args, file.signer);

    std::fs::create_dir_all(&args.store)
        .wrap_err_with(|| format!("creating {}", args.store.display()))?;
    let mut store_config = StoreConfig::new(args.store.join("entries.redb").to_string_lossy());
    if let Some(batch) = file.scan_batch_size {
        store_config = store_config.with_scan_batch_size(batch);
    }
    let local_store = RedbEntryStore::open(&store_config)
        .wrap_err_with(|| format!("opening entry store {}", store_config.path))?;

    let key = match &args.secret_key {
        Some(hex) => Signer::from_secret_hex(hex)?,
        None => Signer::generate(),
    };
    let log_signer = LogSigner::new(key);
    info!(
        node = %config.node_id,
        public_key = %log_signer.public_key().to_hex(),
        "starting signer"
    );

    let consistent_store = MemoryConsistentStore::new(config.node_id);
    match drive(config, local_store, log_signer, &consistent_store, args) {
        Ok(sth) => {
            let json = sth.to_json()?;
            if let Some(path) = &args.output {
                std::fs::write(path, &json)
                    .wrap_err_with(|| format!("writing {}", path.display()))?;
            }
            println!("{json}");
            Ok(ExitCode::SUCCESS)
        }
        Err(err) => {
            error!(error = %err, "signer stopped");
            Ok(exit_code(&err))
        }
    }
}

/// Replay the local store, then run the requested sequencing rounds.
///
/// The replayed tree head becomes the serving tree head so that new entries
/// are sequenced after everything already recorded.
fn drive(
    config: SignerConfig,
    local_store: RedbEntryStore,
    log_signer: LogSigner,
    consistent_store: &MemoryConsistentStore,
    args: &RunArgs,
) -> Result<SignedTreeHead, SignerError> {
    let mut signer = TreeSigner::new(
        config,
        CompactMerkleTree::new(),
        consistent_store.clone(),
        local_store,
        log_signer,
        SystemClock,
    )?;

    let mut latest = signer.update_tree()?;
    consistent_store.set_serving_sth(latest.clone());
    info!(tree_size = latest.tree_size, "replayed local store");

    // Numbered after the replayed size so payloads never repeat a recorded entry.
    let now = SystemClock.now();
    for i in 0..args.entries {
        let payload =
            format!("verity-entry-{}-{}", latest.tree_size + i, now.as_millis()).into_bytes();
        consistent_store.add_pending_entry(LoggedEntry::from_leaf(payload, now))?;
    }

    for round in 0..args.rounds {
        if round > 0 && args.interval_ms > 0 {
            std::thread::sleep(Duration::from_millis(args.interval_ms));
        }
        signer.sequence_new_entries()?;
        latest = signer.update_tree()?;
        consistent_store.publish_newest_sth(latest.clone());
        consistent_store.set_serving_sth(latest.clone());
        consistent_store.purge_committed_pending();
    }
    Ok(latest)
}

fn exit_code(err: &SignerError) -> ExitCode {
    if err.is_fatal() {
        ExitCode::from(EXIT_FATAL)
    } else {
        ExitCode::from(EXIT_RECOVERABLE)
    }
}

fn verify(sth_path: &Path, public_key: &str) -> Result<ExitCode> {
    let json = std::fs::read_to_string(sth_path)
        .wrap_err_with(|| format!("reading {}", sth_path.display()))?;
    let sth = SignedTreeHead::from_json(&json)?;
    let verifier = LogVerifier::new(&PublicKeyBytes::from_hex(public_key)?)?;

    match verifier.verify_tree_head(&sth) {
        Ok(()) => {
            println!(
                "OK tree_size={} timestamp={} root={}",
                sth.tree_size, sth.timestamp, sth.root_hash
            );
            Ok(ExitCode::SUCCESS)
        }
        Err(err) => {
            error!(error = %err, "tree head does not verify");
            println!("FAILED: {err}");
            Ok(ExitCode::FAILURE)
        }
    }
}
