//! Known Solana clusters.
//!
//! Clusters are identified by the first 32 characters of their genesis hash.

use batchdrop::chain::SOLANA_NAMESPACE;
use batchdrop::networks::NetworkInfo;

/// Genesis-hash prefix of mainnet-beta.
pub const SOLANA_MAINNET: &str = "5eykt4UsFv8P8NJdTREpY1vzqKqZKvdp";
/// Genesis-hash prefix of devnet.
pub const SOLANA_DEVNET: &str = "EtWTRABZaYq6iMfeYKouRu166VU2xqa1";
/// Genesis-hash prefix of testnet.
pub const SOLANA_TESTNET: &str = "4uhcVJyU9pJkvQyS88uRDiswHXSCkY3z";

const fn cluster(name: &'static str, display_name: &'static str, reference: &'static str) -> NetworkInfo {
    NetworkInfo {
        name,
        display_name,
        namespace: SOLANA_NAMESPACE,
        reference,
    }
}

/// Well-known Solana clusters. The first name per cluster is canonical.
pub const SOLANA_NETWORKS: &[NetworkInfo] = &[
    cluster("solana", "Solana", SOLANA_MAINNET),
    cluster("solana-mainnet", "Solana", SOLANA_MAINNET),
    cluster("mainnet-beta", "Solana", SOLANA_MAINNET),
    cluster("solana-devnet", "Solana Devnet", SOLANA_DEVNET),
    cluster("devnet", "Solana Devnet", SOLANA_DEVNET),
    cluster("solana-testnet", "Solana Testnet", SOLANA_TESTNET),
    cluster("testnet", "Solana Testnet", SOLANA_TESTNET),
];
