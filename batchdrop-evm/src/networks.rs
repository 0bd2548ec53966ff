//! Known EVM networks.

use batchdrop::chain::EIP155_NAMESPACE;
use batchdrop::networks::NetworkInfo;

const fn evm(name: &'static str, display_name: &'static str, reference: &'static str) -> NetworkInfo {
    NetworkInfo {
        name,
        display_name,
        namespace: EIP155_NAMESPACE,
        reference,
    }
}

/// Well-known EVM networks with their CAIP-2 references.
pub const EVM_NETWORKS: &[NetworkInfo] = &[
    evm("ethereum", "Ethereum", "1"),
    evm("sepolia", "Sepolia", "11155111"),
    evm("polygon", "Polygon", "137"),
    evm("polygon-amoy", "Polygon Amoy", "80002"),
    evm("arbitrum", "Arbitrum One", "42161"),
    evm("arbitrum-sepolia", "Arbitrum Sepolia", "421614"),
    evm("optimism", "Optimism", "10"),
    evm("optimism-sepolia", "OP Sepolia", "11155420"),
    evm("base", "Base", "8453"),
    evm("base-sepolia", "Base Sepolia", "84532"),
    evm("bsc", "BSC", "56"),
    evm("bsc-testnet", "BSC Testnet", "97"),
    evm("avalanche", "Avalanche", "43114"),
    evm("avalanche-fuji", "Avalanche Fuji", "43113"),
    evm("linea", "Linea", "59144"),
    evm("scroll", "Scroll", "534352"),
];
