//! Solidity interface definitions for on-chain interactions.
//!
//! - [`IERC20`] - ERC-20 subset used for metadata, allowance and direct transfers
//! - [`IBatchTransfer`] - The batch airdrop contract called by the contract strategy

use alloy_sol_types::sol;

sol! {
    /// Minimal ERC-20 interface.
    #[allow(missing_docs)]
    #[derive(Debug)]
    #[sol(rpc)]
    interface IERC20 {
        function decimals() external view returns (uint8);
        function allowance(address owner, address spender) external view returns (uint256);
        function approve(address spender, uint256 amount) external returns (bool);
        function transfer(address to, uint256 amount) external returns (bool);
    }
}

sol! {
    /// Batch airdrop contract.
    ///
    /// Pulls `sum(amounts)` of `token` from the caller (which must have approved the
    /// contract) and pays `amounts[i]` to `recipients[i]`. Reverts as a whole if any
    /// leg fails.
    #[allow(missing_docs)]
    #[derive(Debug)]
    interface IBatchTransfer {
        function batchTransfer(address token, address[] recipients, uint256[] amounts) external;
    }
}
