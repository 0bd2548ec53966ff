//! Error types for the disbursement engine.
//!
//! Only [`DisburseError`] ever escapes [`Disburser::disburse`](crate::Disburser::disburse),
//! and only for engine-wide misconfiguration detected before any batch is attempted.
//! Everything that happens to individual recipients is reported as a
//! [`FailureKind`] on their outcome instead.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::chain::ChainId;

/// Why a recipient did not receive funds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Malformed address or amount, caught before any network call.
    InvalidInput,
    /// The destination account could not be created (or the setup phase failed).
    PreconditionFailure,
    /// The RPC endpoint kept failing with retryable errors until attempts ran out.
    TransientRpc,
    /// The chain rejected or reverted the transaction.
    TerminalChain,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::InvalidInput => "invalid_input",
            Self::PreconditionFailure => "precondition_failure",
            Self::TransientRpc => "transient_rpc",
            Self::TerminalChain => "terminal_chain",
        };
        f.write_str(s)
    }
}

/// Message fragments RPC nodes use when a transaction's validity window has passed.
const WINDOW_EXCEEDED_PATTERNS: &[&str] = &["block height exceeded", "has expired"];

/// Error reported by an [`RpcEndpoint`](crate::adapter::RpcEndpoint).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RpcError {
    /// The transaction's blockhash or nonce can no longer be newly accepted.
    #[error("validity window exceeded: {0}")]
    ValidityWindowExceeded(String),
    /// The request did not produce a usable response (timeout, HTTP failure, rate limit).
    #[error("rpc transport error: {0}")]
    Transport(String),
    /// The node answered and refused the request.
    #[error("rejected by node: {0}")]
    Rejected(String),
}

impl RpcError {
    /// Creates a transport error from any displayable cause.
    pub fn transport(cause: impl fmt::Display) -> Self {
        Self::Transport(cause.to_string())
    }

    /// Creates a rejection from any displayable cause.
    ///
    /// Rejections whose text says the validity window passed are promoted to
    /// [`RpcError::ValidityWindowExceeded`].
    pub fn rejected(cause: impl fmt::Display) -> Self {
        let message = cause.to_string();
        if contains_window_exceeded(&message) {
            Self::ValidityWindowExceeded(message)
        } else {
            Self::Rejected(message)
        }
    }

    /// Returns the underlying message without the variant prefix.
    #[must_use]
    pub fn message(&self) -> &str {
        match self {
            Self::ValidityWindowExceeded(m) | Self::Transport(m) | Self::Rejected(m) => m,
        }
    }

    /// Whether this error means the validity window has passed.
    #[must_use]
    pub fn is_validity_window_exceeded(&self) -> bool {
        matches!(self, Self::ValidityWindowExceeded(_)) || contains_window_exceeded(self.message())
    }
}

fn contains_window_exceeded(message: &str) -> bool {
    let lower = message.to_ascii_lowercase();
    WINDOW_EXCEEDED_PATTERNS.iter().any(|p| lower.contains(p))
}

/// Building or signing a transaction failed locally.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("failed to build transaction: {0}")]
pub struct SignError(pub String);

impl SignError {
    /// Creates a signing error from any displayable cause.
    pub fn new(cause: impl fmt::Display) -> Self {
        Self(cause.to_string())
    }
}

/// A chain adapter's setup phase (e.g. contract deployment) failed.
///
/// Every resolved recipient is then reported with
/// [`FailureKind::PreconditionFailure`] and this message.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct SetupError(pub String);

impl SetupError {
    /// Creates a setup error from any displayable cause.
    pub fn new(cause: impl fmt::Display) -> Self {
        Self(cause.to_string())
    }
}

/// Engine-wide failure that aborts a disbursement before any batch is attempted.
#[derive(Debug, thiserror::Error)]
pub enum DisburseError {
    /// The request contains no recipient lines.
    #[error("disbursement request has no recipients")]
    EmptyRequest,
    /// The request targets a different chain than the adapter it was handed to.
    #[error("request targets {request} but the adapter serves {adapter}")]
    ChainMismatch {
        /// Chain named in the request.
        request: ChainId,
        /// Chain served by the adapter.
        adapter: ChainId,
    },
    /// No signer credentials were supplied.
    #[error("no signer credentials supplied")]
    MissingCredentials,
    /// The signer credentials could not be parsed.
    #[error("invalid signer credentials: {0}")]
    InvalidCredentials(String),
    /// No adapter exists for the chain.
    #[error("unsupported chain: {0}")]
    UnsupportedChain(String),
    /// The adapter could not reach its chain (e.g. token metadata lookup failed).
    #[error("chain adapter unavailable: {0}")]
    AdapterUnavailable(String),
    /// The adapter or engine configuration is unusable.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejected_promotes_window_exceeded() {
        let err = RpcError::rejected("Transaction signature has expired: block height exceeded");
        assert!(matches!(err, RpcError::ValidityWindowExceeded(_)));
        assert!(err.is_validity_window_exceeded());
    }

    #[test]
    fn test_transport_text_is_detected() {
        let err = RpcError::transport("TransactionExpiredBlockheightExceededError: Signature XYZ has expired");
        assert!(matches!(err, RpcError::Transport(_)));
        assert!(err.is_validity_window_exceeded());
        assert!(!RpcError::transport("connection reset").is_validity_window_exceeded());
    }

    #[test]
    fn test_failure_kind_serializes_snake_case() {
        let json = serde_json::to_string(&FailureKind::PreconditionFailure).unwrap();
        assert_eq!(json, "\"precondition_failure\"");
        assert_eq!(FailureKind::TerminalChain.to_string(), "terminal_chain");
    }
}
