//! Blackbox Recorder demo CLI
//!
//! Starts a recorder in front of a file-backed audit log, drives it with a
//! handful of producers (honest, tampering and unsigned) and shows what ends
//! up on disk.
//!
//! Usage:
//!   cargo run -p demo -- simulate
//!   cargo run -p demo -- simulate --config blackbox.toml --events 10
//!   cargo run -p demo -- inspect blackbox.log

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use serde_json::json;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use blackbox_audit::{read_records, FileAuditStore};
use blackbox_contracts::{
    error::BlackBoxResult,
    event::{ChannelMessage, ControlEvent, Event, LOG_EVENT},
};
use blackbox_core::{Producer, QueueDirectory, Recorder, RecorderConfig, RecorderStats};
use blackbox_signing::{signed_event, PrivateKey, PublicKey};

// ── CLI definition ────────────────────────────────────────────────────────────

/// Blackbox tamper-evident audit recorder demo.
#[derive(Parser)]
#[command(
    name = "demo",
    about = "Blackbox audit recorder demo",
    long_about = "Runs a recorder against simulated producers and inspects the\n\
                  resulting append-only audit log."
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a recorder with simulated producers, then stop it.
    Simulate {
        /// Recorder configuration (TOML). Defaults apply when omitted.
        #[arg(long)]
        config: Option<PathBuf>,
        /// Log file to write; overrides `storage_path`.
        #[arg(long)]
        log: Option<PathBuf>,
        /// Producer signing key (PKCS#8 PEM). A throwaway key is generated
        /// when omitted.
        #[arg(long)]
        private_key: Option<PathBuf>,
        /// Trusted public key (SPKI PEM); overrides the configured key.
        #[arg(long)]
        public_key: Option<PathBuf>,
        /// Signed events sent by each honest producer.
        #[arg(long, default_value_t = 3)]
        events: usize,
    },
    /// Print every record in an audit log.
    Inspect {
        path: PathBuf,
    },
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match &cli.command {
        Command::Simulate { config: Some(path), .. } => RecorderConfig::from_file(path),
        _ => Ok(RecorderConfig::default()),
    };
    let config = match config {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Demo error: {}", e);
            std::process::exit(1);
        }
    };

    // RUST_LOG wins; otherwise the configured level.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level)),
        )
        .compact()
        .init();

    let result = match cli.command {
        Command::Simulate {
            log,
            private_key,
            public_key,
            events,
            ..
        } => {
            simulate(
                config,
                log,
                private_key.as_deref(),
                public_key.as_deref(),
                events,
            )
            .await
        }
        Command::Inspect { path } => inspect(&path),
    };

    if let Err(e) = result {
        eprintln!("Demo error: {}", e);
        std::process::exit(1);
    }
}

// ── simulate ──────────────────────────────────────────────────────────────────

async fn simulate(
    mut config: RecorderConfig,
    log: Option<PathBuf>,
    private_key: Option<&Path>,
    public_key: Option<&Path>,
    events: usize,
) -> BlackBoxResult<()> {
    if let Some(log) = log {
        config.storage_path = log;
    }

    let signing_key = match private_key {
        Some(path) => PrivateKey::from_file(path)?,
        None => {
            warn!("no producer key given; generating a throwaway key");
            PrivateKey::from_seed(rand::random())
        }
    };
    let trusted = match public_key {
        Some(path) => PublicKey::from_file(path)?,
        None => config
            .public_key()?
            .unwrap_or_else(|| signing_key.public_key()),
    };
    if trusted != signing_key.public_key() {
        warn!(
            trusted = %trusted.fingerprint(),
            producer = %signing_key.public_key().fingerprint(),
            "producer key does not match the trusted key; every event will be dropped"
        );
    }

    let store = FileAuditStore::open(&config.storage_path, Some(trusted.clone()), config.session)?;
    let directory = QueueDirectory::new();
    let handle = Recorder::from_config(store, trusted, &directory, &config)?.spawn();

    print_banner(&config);

    // ── Honest producers ─────────────────────────────────────────────────────
    let mut tasks = Vec::new();
    for name in ["navigation", "telemetry"] {
        let producer = Producer::connect(name, signing_key.clone(), &directory, &config.events_queue)?;
        tasks.push(tokio::spawn(async move {
            for seq in 0..events {
                producer.log_event("mission_control", json!({ "seq": seq, "status": "nominal" }))?;
            }
            producer.log_message("mission_control", &format!("{} completed {} reports", name, events))
        }));
    }

    // ── Tampering producer: signs, then edits the payload ────────────────────
    let tamperer = Producer::connect("intruder", signing_key.clone(), &directory, &config.events_queue)?;
    let mut forged = signed_event(
        Event::new("intruder", "mission_control", LOG_EVENT, json!({ "thrust": 10 })),
        &signing_key,
    )?;
    forged.parameters = json!({ "thrust": 9000 }).into();
    tamperer.send_raw(ChannelMessage::Event(forged))?;

    // ── Unsigned producer ────────────────────────────────────────────────────
    tamperer.send_raw(ChannelMessage::Event(Event::new(
        "intruder",
        "mission_control",
        LOG_EVENT,
        json!({ "note": "unsigned" }),
    )))?;

    for task in tasks {
        match task.await {
            Ok(result) => result?,
            Err(e) => warn!(error = %e, "producer task failed"),
        }
    }

    handle.send_control(ControlEvent::stop())?;
    let stats = handle.join().await?;
    info!(path = %config.storage_path.display(), "simulation finished");
    print_stats(&stats, &config.storage_path);
    Ok(())
}

// ── inspect ───────────────────────────────────────────────────────────────────

fn inspect(path: &Path) -> BlackBoxResult<()> {
    let records = read_records(path)?;
    let mut valid = 0;
    let mut invalid = 0;
    let mut messages = 0;

    for (n, record) in records.iter().enumerate() {
        let kind = match record.get("valid").and_then(|v| v.as_bool()) {
            Some(true) => {
                valid += 1;
                "event   "
            }
            Some(false) => {
                invalid += 1;
                "INVALID "
            }
            None => {
                messages += 1;
                "message "
            }
        };
        println!("{:>4}  {}  {}", n + 1, kind, record);
    }

    println!();
    println!(
        "{} records: {} valid events, {} invalid events, {} messages",
        records.len(),
        valid,
        invalid,
        messages
    );
    Ok(())
}

// ── Output ────────────────────────────────────────────────────────────────────

fn print_banner(config: &RecorderConfig) {
    println!();
    println!("Blackbox: Tamper-evident Audit Recorder");
    println!("=========================================");
    println!();
    println!("  log file      : {}", config.storage_path.display());
    println!("  events queue  : {}", config.events_queue);
    println!("  poll interval : {} ms", config.poll_interval_ms);
    println!();
}

fn print_stats(stats: &RecorderStats, path: &Path) {
    println!("Recorder stopped after {} cycles.", stats.cycles);
    println!("  events logged     : {}", stats.events_logged);
    println!("  messages logged   : {}", stats.messages_logged);
    println!("  dropped unsigned  : {}", stats.unsigned);
    println!("  dropped invalid   : {}", stats.invalid);
    println!("  dropped malformed : {}", stats.malformed);
    println!("  dropped unknown   : {}", stats.unknown_operation);
    println!();
    println!("Inspect with: cargo run -p demo -- inspect {}", path.display());
}
