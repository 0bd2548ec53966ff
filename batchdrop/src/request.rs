//! Disbursement input.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::chain::ChainId;

/// Strings accepted as "the chain's native token".
pub const NATIVE_TOKEN_SENTINELS: &[&str] = &["native", "sol", "eth"];

/// Which token is being disbursed.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TokenSpec {
    /// The chain's native token (ETH, SOL, ...).
    Native,
    /// A fungible token contract (EVM) or mint (Solana), as an address string.
    Fungible(String),
}

impl TokenSpec {
    /// Returns `true` for the native token.
    #[must_use]
    pub const fn is_native(&self) -> bool {
        matches!(self, Self::Native)
    }
}

impl fmt::Display for TokenSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Native => f.write_str("native"),
            Self::Fungible(address) => f.write_str(address),
        }
    }
}

impl FromStr for TokenSpec {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if NATIVE_TOKEN_SENTINELS
            .iter()
            .any(|sentinel| s.eq_ignore_ascii_case(sentinel))
        {
            Ok(Self::Native)
        } else {
            Ok(Self::Fungible(s.to_owned()))
        }
    }
}

impl Serialize for TokenSpec {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for TokenSpec {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        let Ok(token) = s.parse::<Self>();
        Ok(token)
    }
}

/// One requested transfer, exactly as supplied by the operator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecipientLine {
    /// Recipient owner address as text.
    pub address: String,
    /// Amount as a decimal string in whole-token units.
    pub amount: String,
}

impl RecipientLine {
    /// Creates a recipient line.
    pub fn new(address: impl Into<String>, amount: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            amount: amount.into(),
        }
    }
}

/// Signer key material, held for the duration of one disbursement.
///
/// Never printed: `Debug` is redacted and the type does not implement `Serialize`.
#[derive(Clone, Deserialize)]
#[serde(transparent)]
pub struct SignerSecret(String);

impl SignerSecret {
    /// Wraps key material.
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    /// Returns the key material for parsing into a chain-specific signer.
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Whether the secret is empty or an unexpanded `$VAR` reference.
    #[must_use]
    pub fn is_unset(&self) -> bool {
        let trimmed = self.0.trim();
        trimmed.is_empty() || trimmed.starts_with('$')
    }
}

impl fmt::Debug for SignerSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SignerSecret(<redacted>)")
    }
}

/// Immutable input to one disbursement.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DisbursementRequest {
    /// Target chain.
    pub chain: ChainId,
    /// Token to disburse.
    pub token: TokenSpec,
    /// Ordered recipient lines; outcomes are reported in this order.
    pub recipients: Vec<RecipientLine>,
    /// Operator-preferred recipients per transaction. Clamped to the chain's ceiling.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch_size_hint: Option<usize>,
    /// Signer key material.
    #[serde(default, skip_serializing)]
    pub credentials: Option<SignerSecret>,
}

impl DisbursementRequest {
    /// Creates a request with no batch size hint and no credentials.
    #[must_use]
    pub const fn new(chain: ChainId, token: TokenSpec, recipients: Vec<RecipientLine>) -> Self {
        Self {
            chain,
            token,
            recipients,
            batch_size_hint: None,
            credentials: None,
        }
    }

    /// Sets the batch size hint.
    #[must_use]
    pub const fn with_batch_size_hint(mut self, hint: usize) -> Self {
        self.batch_size_hint = Some(hint);
        self
    }

    /// Attaches signer credentials.
    #[must_use]
    pub fn with_credentials(mut self, credentials: SignerSecret) -> Self {
        self.credentials = Some(credentials);
        self
    }
}
