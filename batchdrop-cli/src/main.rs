//! Batch token disbursement from the command line.
//!
//! # Usage
//!
//! ```bash
//! # Disburse the recipients in request.json, printing the report
//! batchdrop --request request.json
//!
//! # Custom config path, report written to a file
//! CONFIG=/etc/batchdrop.toml batchdrop --request request.json --output report.json
//!
//! # Configure logging level
//! RUST_LOG=debug batchdrop --request request.json
//! ```
//!
//! # Request File
//!
//! ```json
//! {
//!   "chain": "base",
//!   "token": "0x833589fCD6eDb6E08f4c7C32D4f71b54bdA02913",
//!   "recipients": [{ "address": "0x7099...79C8", "amount": "12.5" }],
//!   "batchSizeHint": 10
//! }
//! ```
//!
//! # Exit Codes
//!
//! - `0` - every recipient was paid
//! - `1` - the run could not start (configuration, credentials, endpoints)
//! - `2` - the report contains failed recipients
//!
//! # Environment Variables
//!
//! - `CONFIG` - Path to TOML configuration file (default: `config.toml`)
//! - `RUST_LOG` - Log level filter (default: `info`)
//! - Signer keys referenced by `$VAR` in the config file; `.env` is loaded first

use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;

use batchdrop::DisbursementStatus;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use batchdrop_cli::runner::{RequestFile, registry, run};
use batchdrop_cli::util::SigDown;
use batchdrop_cli::{CliConfig, CliError};

/// Disburse tokens to many recipients on EVM chains and Solana.
#[derive(Debug, Parser)]
#[command(name = "batchdrop", version, about, long_about = None)]
struct Args {
    /// Path to the TOML configuration file.
    #[arg(short, long, env = "CONFIG", default_value = "config.toml")]
    config: PathBuf,

    /// Path to the JSON request file.
    #[arg(short, long)]
    request: PathBuf,

    /// Write the JSON report here instead of stdout.
    #[arg(short, long)]
    output: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    match disburse(&args).await {
        Ok(DisbursementStatus::Success) => ExitCode::SUCCESS,
        Ok(_) => ExitCode::from(2),
        Err(e) => {
            tracing::error!("Disbursement failed: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn disburse(args: &Args) -> Result<DisbursementStatus, CliError> {
    let config = CliConfig::load(&args.config)?;
    let registry = registry();
    let request = RequestFile::load(&args.request)?.into_request(&registry)?;

    let sig_down = SigDown::try_new().map_err(CliError::Signal)?;
    let report = run(&config, &registry, request, sig_down.cancellation_token()).await;
    sig_down.shutdown().await;
    let report = report?;

    let json = serde_json::to_string_pretty(&report)?;
    match &args.output {
        Some(path) => std::fs::write(path, json).map_err(|source| CliError::Io {
            path: path.display().to_string(),
            source,
        })?,
        None => writeln!(std::io::stdout().lock(), "{json}").map_err(|source| CliError::Io {
            path: "<stdout>".to_owned(),
            source,
        })?,
    }
    Ok(report.status)
}
