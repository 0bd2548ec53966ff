//! Blockchain identifiers.
//!
//! - [`ChainId`] - A CAIP-2 compliant chain identifier (e.g., `eip155:8453` for Base)
//! - [`ChainKind`] - The chain family an identifier belongs to, which selects the adapter

use serde::{Deserialize, Deserializer, Serialize, Serializer, de};
use std::fmt;
use std::str::FromStr;

/// CAIP-2 namespace of EVM-compatible chains.
pub const EIP155_NAMESPACE: &str = "eip155";

/// CAIP-2 namespace of Solana clusters.
pub const SOLANA_NAMESPACE: &str = "solana";

/// A CAIP-2 compliant blockchain identifier.
///
/// The format is `namespace:reference` where:
///
/// - `namespace` identifies the blockchain family (e.g., `eip155`, `solana`)
/// - `reference` identifies the specific chain within that family
///
/// # Serialization
///
/// Serializes to/from a colon-separated string: `"eip155:8453"`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChainId {
    namespace: String,
    reference: String,
}

impl ChainId {
    /// Creates a new chain ID from namespace and reference components.
    pub fn new<N: Into<String>, R: Into<String>>(namespace: N, reference: R) -> Self {
        Self {
            namespace: namespace.into(),
            reference: reference.into(),
        }
    }

    /// Creates an `eip155` chain ID from a numeric chain id.
    #[must_use]
    pub fn eip155(chain_id: u64) -> Self {
        Self::new(EIP155_NAMESPACE, chain_id.to_string())
    }

    /// Returns the namespace component of the chain ID.
    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Returns the reference component of the chain ID.
    #[must_use]
    pub fn reference(&self) -> &str {
        &self.reference
    }

    /// Returns the chain family, or `None` for namespaces no adapter handles.
    #[must_use]
    pub fn kind(&self) -> Option<ChainKind> {
        match self.namespace.as_str() {
            EIP155_NAMESPACE => Some(ChainKind::Evm),
            SOLANA_NAMESPACE => Some(ChainKind::Solana),
            _ => None,
        }
    }

    /// Returns the numeric EVM chain id when this is an `eip155` identifier.
    #[must_use]
    pub fn evm_chain_id(&self) -> Option<u64> {
        if self.namespace == EIP155_NAMESPACE {
            self.reference.parse().ok()
        } else {
            None
        }
    }
}

impl fmt::Display for ChainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.namespace, self.reference)
    }
}

impl From<ChainId> for String {
    fn from(value: ChainId) -> Self {
        value.to_string()
    }
}

/// Error returned when parsing an invalid chain ID string.
///
/// A valid chain ID must be in the format `namespace:reference` where both
/// components are non-empty strings.
#[derive(Debug, thiserror::Error)]
#[error("Invalid chain id format {0}")]
pub struct ChainIdFormatError(String);

impl FromStr for ChainId {
    type Err = ChainIdFormatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (namespace, reference) = s
            .split_once(':')
            .ok_or_else(|| ChainIdFormatError(s.into()))?;
        if namespace.is_empty() || reference.is_empty() {
            return Err(ChainIdFormatError(s.into()));
        }
        Ok(Self::new(namespace, reference))
    }
}

impl Serialize for ChainId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for ChainId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::from_str(&s).map_err(de::Error::custom)
    }
}

/// Chain family. Each family has one adapter implementation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChainKind {
    /// EVM-compatible chains (account nonces, gas market).
    Evm,
    /// Solana clusters (recent blockhash, priority fees, associated token accounts).
    Solana,
}

impl fmt::Display for ChainKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Evm => f.write_str("evm"),
            Self::Solana => f.write_str("solana"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chain_id_serialize_eip155() {
        let chain_id = ChainId::new("eip155", "1");
        let serialized = serde_json::to_string(&chain_id).unwrap();
        assert_eq!(serialized, "\"eip155:1\"");
    }

    #[test]
    fn test_chain_id_deserialize_solana() {
        let chain_id: ChainId =
            serde_json::from_str("\"solana:5eykt4UsFv8P8NJdTREpY1vzqKqZKvdp\"").unwrap();
        assert_eq!(chain_id.namespace(), "solana");
        assert_eq!(chain_id.reference(), "5eykt4UsFv8P8NJdTREpY1vzqKqZKvdp");
        assert_eq!(chain_id.kind(), Some(ChainKind::Solana));
    }

    #[test]
    fn test_chain_id_deserialize_invalid_format() {
        assert!(serde_json::from_str::<ChainId>("\"invalid\"").is_err());
        assert!(serde_json::from_str::<ChainId>("\"eip155:\"").is_err());
        assert!(serde_json::from_str::<ChainId>("\":1\"").is_err());
    }

    #[test]
    fn test_unknown_namespace_has_no_kind() {
        let chain_id: ChainId = "cosmos:cosmoshub-4".parse().unwrap();
        assert_eq!(chain_id.kind(), None);
    }

    #[test]
    fn test_evm_chain_id() {
        assert_eq!(ChainId::eip155(8453).evm_chain_id(), Some(8453));
        assert_eq!(ChainId::eip155(8453).kind(), Some(ChainKind::Evm));
        assert_eq!(ChainId::new("solana", "devnet").evm_chain_id(), None);
    }
}
