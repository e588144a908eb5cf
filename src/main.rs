//! Provenance command line client
//!
//! ## Usage
//!
//! ```bash
//! # Fingerprint a file locally
//! provenance hash photo.jpg
//!
//! # Register a file and wait for anchoring
//! PROVENANCE_TOKEN=... provenance register photo.jpg --watch
//!
//! # Check whether a copy was registered
//! provenance verify copy.jpg
//!
//! # Inspect a registration
//! provenance status 42 2cf24dba...
//! provenance record 2cf24dba...
//!
//! # Registry liveness
//! provenance health
//! ```
//!
//! Settings come from `--config` (or `<config dir>/provenance/config.toml`),
//! with `PROVENANCE_*` environment variables and flags taking precedence.
//! A `.env` file in the working directory is loaded first.

use anyhow::Context;
use bytes::Bytes;
use clap::{Parser, Subcommand};
use provenance_client::poller::PollOutcome;
use provenance_client::{
    Config, Fingerprint, HealthMonitor, RecordId, RegistryClient, SelectedFile, SessionContext,
    SessionToken, StatusPoller, UploadOrchestrator, VerificationResolver,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "provenance")]
#[command(about = "Register and verify file provenance")]
struct Args {
    /// Path to config file
    #[arg(short, long, env = "PROVENANCE_CONFIG")]
    config: Option<PathBuf>,

    /// Registry base URL
    #[arg(long, env = "PROVENANCE_REGISTRY_URL")]
    registry_url: Option<String>,

    /// Bearer token for authenticated calls
    #[arg(long, env = "PROVENANCE_TOKEN", hide_env_values = true)]
    token: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the SHA-256 fingerprint of a file
    Hash { file: PathBuf },

    /// Register a file with the registry
    Register {
        file: PathBuf,

        /// Override the content type guessed from the extension
        #[arg(long)]
        content_type: Option<String>,

        /// Poll anchoring status after commit
        #[arg(long)]
        watch: bool,

        /// Use the single-shot multipart upload instead of presign/commit
        #[arg(long, conflicts_with = "watch")]
        direct: bool,
    },

    /// Check whether a file matches a registered fingerprint
    Verify {
        file: PathBuf,

        #[arg(long)]
        content_type: Option<String>,
    },

    /// Poll anchoring status of a committed record
    Status {
        record_id: String,
        sha256: Fingerprint,
    },

    /// Fetch the full record for a fingerprint
    Record { sha256: Fingerprint },

    /// Probe registry liveness
    Health,
}

fn select(file: PathBuf, content_type: Option<String>) -> SelectedFile {
    let selected = SelectedFile::from_path(file);
    match content_type {
        Some(ct) => selected.with_content_type(ct),
        None => selected,
    }
}

fn print_outcome(outcome: &PollOutcome) {
    match outcome {
        PollOutcome::Anchored { record, anchor } => {
            println!("anchored: {}", record.sha256);
            if let Some(tx) = &anchor.tx_hash {
                println!("tx_hash: {}", tx);
            }
            if let Some(url) = &anchor.explorer_url {
                println!("explorer: {}", url);
            }
        }
        PollOutcome::AnchoredWithoutRecord { anchor } => {
            println!("anchored (record unavailable)");
            if let Some(tx) = &anchor.tx_hash {
                println!("tx_hash: {}", tx);
            }
        }
        PollOutcome::Exhausted {
            attempts,
            last_status,
        } => {
            println!("still {} after {} checks", last_status, attempts);
        }
        PollOutcome::Cancelled { last_status, .. } => {
            println!("stopped while {}", last_status);
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("provenance_client=info".parse()?),
        )
        .init();

    let args = Args::parse();

    // Offline command: no config or session needed
    if let Command::Hash { file } = &args.command {
        let data = tokio::fs::read(file)
            .await
            .with_context(|| format!("reading {}", file.display()))?;
        let fp = provenance_client::hash::fingerprint_offloaded(Bytes::from(data)).await?;
        println!("{}", fp);
        return Ok(());
    }

    let mut config = Config::load_or_default(args.config.as_deref()).context("loading config")?;

    // Apply CLI overrides
    if let Some(url) = args.registry_url {
        config.registry.base_url = url;
    }
    config.validate()?;

    let session = match args.token {
        Some(token) => SessionContext::with_token(SessionToken::new(token)),
        None => SessionContext::new(),
    };

    info!(registry = %config.registry.base_url, signed_in = session.is_signed_in(), "Starting provenance client");

    let client = Arc::new(RegistryClient::new(config.registry.clone(), session)?);
    let poller = StatusPoller::new(client.clone(), config.poller.clone());

    match args.command {
        Command::Hash { .. } => {}

        Command::Register {
            file,
            content_type,
            watch,
            direct,
        } => {
            let uploads = UploadOrchestrator::new(client.clone()).with_poller(poller);
            let file = select(file, content_type);

            if direct {
                let response = uploads.upload_direct(&file).await?;
                match response.sha256 {
                    Some(fp) => println!("sha256: {}", fp),
                    None => println!("uploaded"),
                }
            } else if watch {
                let (registration, handle) = uploads.register_and_watch(file).await?;
                println!("record_id: {}", registration.record_id);
                println!("sha256: {}", registration.fingerprint);
                print_outcome(&handle.join().await);
            } else {
                let registration = uploads.register(file).await?;
                println!("record_id: {}", registration.record_id);
                println!("sha256: {}", registration.fingerprint);
            }
        }

        Command::Verify { file, content_type } => {
            let resolver = VerificationResolver::new(client);
            let result = resolver.resolve(&select(file, content_type)).await?;
            println!("sha256: {}", result.fingerprint);
            println!(
                "{} ({})",
                if result.matched { "match" } else { "no match" },
                result.tier
            );
        }

        Command::Status { record_id, sha256 } => {
            let handle = poller.spawn(RecordId::new(record_id), sha256);
            print_outcome(&handle.join().await);
        }

        Command::Record { sha256 } => {
            let record = client.file_by_hash(&sha256).await?;
            println!("{}", serde_json::to_string_pretty(&record)?);
        }

        Command::Health => {
            let status = HealthMonitor::new(client)
                .with_interval(config.health.interval())
                .check()
                .await;
            println!("{:?}", status);
        }
    }

    Ok(())
}
