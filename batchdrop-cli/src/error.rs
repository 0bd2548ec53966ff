//! Error types for the operator binary.

use batchdrop::DisburseError;
use batchdrop_evm::EvmAdapterError;
use batchdrop_svm::SolanaAdapterError;

/// Failures that stop the binary before or around a disbursement.
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// A file could not be read or written.
    #[error("{path}: {source}")]
    Io {
        /// Offending path.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// The configuration file is malformed.
    #[error("invalid configuration: {0}")]
    Config(String),
    /// The request or report JSON is malformed.
    #[error("invalid request: {0}")]
    Json(#[from] serde_json::Error),
    /// The request names a chain nobody recognizes.
    #[error("unknown chain {0:?}")]
    UnknownChain(String),
    /// The config has no section for the request's chain.
    #[error("no configuration for chain {0}")]
    ChainNotConfigured(String),
    /// The chain section's signer key is empty or an unexpanded `$VAR`.
    #[error("signer key for {0} is not set (missing environment variable?)")]
    MissingSignerKey(String),
    /// Signal handlers could not be installed.
    #[error("failed to install signal handlers: {0}")]
    Signal(std::io::Error),
    /// The EVM adapter could not be constructed.
    #[error(transparent)]
    Evm(#[from] EvmAdapterError),
    /// The Solana adapter could not be constructed.
    #[error(transparent)]
    Solana(#[from] SolanaAdapterError),
    /// The engine refused to run.
    #[error(transparent)]
    Disburse(#[from] DisburseError),
}

impl From<toml::de::Error> for CliError {
    fn from(value: toml::de::Error) -> Self {
        Self::Config(value.to_string())
    }
}
