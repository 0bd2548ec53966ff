//! Error types for Solana adapter construction.

use batchdrop::DisburseError;

/// Failure to construct a [`SolanaAdapter`](crate::SolanaAdapter).
#[derive(Debug, thiserror::Error)]
pub enum SolanaAdapterError {
    /// The chain identifier is not a `solana` cluster.
    #[error("not a Solana chain: {0}")]
    NotSolana(String),
    /// The fee payer keypair could not be parsed.
    #[error("invalid keypair: {0}")]
    InvalidKey(String),
    /// The mint address is malformed.
    #[error("invalid mint address {0}")]
    InvalidMint(String),
    /// The mint account could not be fetched or decoded.
    #[error("failed to read mint: {0}")]
    MintMetadata(String),
}

impl From<SolanaAdapterError> for DisburseError {
    fn from(value: SolanaAdapterError) -> Self {
        match value {
            SolanaAdapterError::NotSolana(chain) => Self::UnsupportedChain(chain),
            SolanaAdapterError::InvalidKey(e) => Self::InvalidCredentials(e),
            SolanaAdapterError::MintMetadata(_) => Self::AdapterUnavailable(value.to_string()),
            SolanaAdapterError::InvalidMint(_) => Self::InvalidConfig(value.to_string()),
        }
    }
}
