//! Well-known network names.
//!
//! Maps the short names operators type (`"base"`, `"solana-devnet"`) to CAIP-2
//! identifiers and human display names. Concrete tables live in the chain crates:
//!
//! - `batchdrop-evm` provides `EVM_NETWORKS`
//! - `batchdrop-svm` provides `SOLANA_NETWORKS`
//!
//! Applications assemble a [`NetworkRegistry`] from these slices at startup.

use std::collections::HashMap;

use crate::chain::ChainId;

/// A known network definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetworkInfo {
    /// Short lowercase name (e.g., `"base-sepolia"`).
    pub name: &'static str,
    /// Name shown in reports (e.g., `"Base Sepolia"`).
    pub display_name: &'static str,
    /// CAIP-2 namespace.
    pub namespace: &'static str,
    /// Chain reference within the namespace.
    pub reference: &'static str,
}

impl NetworkInfo {
    /// Create a `ChainId` from this network info
    #[must_use]
    pub fn chain_id(&self) -> ChainId {
        ChainId::new(self.namespace, self.reference)
    }
}

/// Bidirectional lookup between network names and [`ChainId`] values.
///
/// Several names may point at one chain (aliases such as `"mainnet-beta"`); the
/// first registered name for a chain is its canonical name.
#[derive(Debug, Clone, Default)]
pub struct NetworkRegistry {
    by_name: HashMap<&'static str, ChainId>,
    by_chain: HashMap<ChainId, NetworkInfo>,
}

impl NetworkRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry pre-populated from a network info slice.
    #[must_use]
    pub fn from_networks(networks: &[NetworkInfo]) -> Self {
        let mut registry = Self::new();
        registry.register(networks);
        registry
    }

    /// Registers additional networks into this registry.
    pub fn register(&mut self, networks: &[NetworkInfo]) {
        for info in networks {
            let chain_id = info.chain_id();
            self.by_name.insert(info.name, chain_id.clone());
            self.by_chain.entry(chain_id).or_insert(*info);
        }
    }

    /// Builder-style method: registers additional networks and returns `self`.
    #[must_use]
    pub fn with_networks(mut self, networks: &[NetworkInfo]) -> Self {
        self.register(networks);
        self
    }

    /// Resolves either a CAIP-2 string or a known network name.
    ///
    /// Names are matched case-insensitively.
    #[must_use]
    pub fn resolve(&self, input: &str) -> Option<ChainId> {
        let input = input.trim();
        if input.contains(':') {
            return input.parse().ok();
        }
        self.by_name.get(input.to_ascii_lowercase().as_str()).cloned()
    }

    /// Looks up the canonical network info for a chain.
    #[must_use]
    pub fn info(&self, chain_id: &ChainId) -> Option<&NetworkInfo> {
        self.by_chain.get(chain_id)
    }

    /// Returns the display name for a chain, falling back to its CAIP-2 form.
    #[must_use]
    pub fn display_name(&self, chain_id: &ChainId) -> String {
        self.info(chain_id)
            .map_or_else(|| chain_id.to_string(), |info| info.display_name.to_owned())
    }

    /// Returns the number of registered names.
    #[must_use]
    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    /// Returns `true` if no networks are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }
}
