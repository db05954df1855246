use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;

use commands::fetch::FetchArgs;

#[derive(Parser)]
#[command(name = "amr")]
#[command(about = "Archive mirror reconciler", long_about = None)]
struct Cli {
    /// Log filter used when RUST_LOG is unset (e.g. info, debug, amr_reconcile=trace)
    #[arg(long = "log-level", global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Download and verify every candidate that lacks a verified local copy
    Fetch(FetchArgs),

    /// Print per-flag counts of a ledger file
    Status {
        /// Ledger CSV written by `amr fetch`
        state: PathBuf,
    },

    /// Compute layered config hash + print canonical JSON
    ConfigHash {
        /// Paths in merge order (base -> site -> local...)
        #[arg(required = true)]
        paths: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env.local if present (dev convenience).
    // Silent if the file does not exist; production injects env vars directly.
    let _ = dotenvy::from_filename(".env.local");

    let cli = Cli::parse();
    init_tracing(&cli.log_level);

    match cli.cmd {
        Commands::Fetch(args) => {
            let out = commands::fetch::run(&args).await?;
            println!("{} state={}", out.summary, out.state_path.display());
        }

        Commands::Status { state } => {
            commands::status::run(&state)?.print();
        }

        Commands::ConfigHash { paths } => {
            let loaded = commands::load_config(&paths)?;
            println!("config_hash={}", loaded.config_hash);
            println!("{}", loaded.canonical_json);
        }
    }

    Ok(())
}

/// Logs go to stderr so stdout carries only command output.
fn init_tracing(fallback: &str) {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| fallback.into()),
        )
        .with_writer(std::io::stderr)
        .init();
}
