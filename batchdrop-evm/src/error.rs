//! Error types for EVM adapter construction.

use batchdrop::DisburseError;

/// Failure to construct an [`EvmAdapter`](crate::EvmAdapter) or its endpoint.
#[derive(Debug, thiserror::Error)]
pub enum EvmAdapterError {
    /// The chain identifier is not an `eip155` chain.
    #[error("not an EVM chain: {0}")]
    NotEvm(String),
    /// No usable HTTP(S) RPC endpoint was configured.
    #[error("no HTTP RPC endpoint configured for {0}")]
    NoEndpoints(String),
    /// The signer key could not be parsed.
    #[error("invalid signer key: {0}")]
    InvalidKey(String),
    /// The token address is malformed.
    #[error("invalid token address {0}")]
    InvalidToken(String),
    /// Token metadata could not be fetched.
    #[error("failed to read token metadata: {0}")]
    TokenMetadata(String),
    /// Strategy options are inconsistent.
    #[error("{0}")]
    InvalidConfig(String),
}

impl From<EvmAdapterError> for DisburseError {
    fn from(value: EvmAdapterError) -> Self {
        match value {
            EvmAdapterError::NotEvm(chain) => Self::UnsupportedChain(chain),
            EvmAdapterError::InvalidKey(e) => Self::InvalidCredentials(e),
            EvmAdapterError::TokenMetadata(_) => Self::AdapterUnavailable(value.to_string()),
            EvmAdapterError::NoEndpoints(_)
            | EvmAdapterError::InvalidToken(_)
            | EvmAdapterError::InvalidConfig(_) => Self::InvalidConfig(value.to_string()),
        }
    }
}
