//! Transfer strategies and their gas budgets.
//!
//! - [`Strategy::Direct`] - one plain transfer per recipient
//! - [`Strategy::BatchContract`] - one `batchTransfer` call per batch through an
//!   airdrop contract that pulls the approved total from the signer
//!
//! Native-token disbursements always use direct transfers.

use alloy_primitives::{Address, Bytes, U256};
use alloy_sol_types::SolCall;
use batchdrop::batch::BatchLimits;
use batchdrop::error::SignError;
use batchdrop::resolve::ResolvedRecipient;

use crate::contract::IBatchTransfer::batchTransferCall;
use crate::contract::IERC20::{approveCall, transferCall};

/// Gas of a plain value transfer.
pub const NATIVE_TRANSFER_GAS: u64 = 21_000;

/// Gas budget of one ERC-20 `transfer`.
pub const ERC20_TRANSFER_GAS: u64 = 65_000;

/// Fixed gas of a `batchTransfer` call.
pub const BATCH_BASE_GAS: u64 = 60_000;

/// Gas added per `batchTransfer` recipient.
pub const BATCH_PER_RECIPIENT_GAS: u64 = 60_000;

/// Per-transaction gas ceiling for batch calls.
pub const BATCH_GAS_CEILING: u64 = 10_000_000;

/// Gas budget of an ERC-20 `approve`.
pub const APPROVE_GAS: u64 = 60_000;

/// Gas budget of the airdrop contract deployment.
pub const DEPLOY_GAS: u64 = 1_500_000;

/// The token being disbursed on an EVM chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvmToken {
    /// The chain's native currency, 18 decimals.
    Native,
    /// An ERC-20 contract.
    Erc20 {
        /// Token contract.
        address: Address,
        /// Token decimals.
        decimals: u8,
    },
}

impl EvmToken {
    /// Decimals of the token.
    #[must_use]
    pub const fn decimals(&self) -> u8 {
        match self {
            Self::Native => 18,
            Self::Erc20 { decimals, .. } => *decimals,
        }
    }
}

/// How batches are turned into transactions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Strategy {
    /// One transfer transaction per recipient.
    #[default]
    Direct,
    /// One call to an airdrop contract per batch.
    BatchContract {
        /// An already deployed contract. Deployed during setup when absent.
        contract: Option<Address>,
        /// Creation bytecode used when `contract` is absent.
        bytecode: Option<Bytes>,
    },
}

impl Strategy {
    /// Whether batches of `token` go through the airdrop contract.
    #[must_use]
    pub const fn uses_contract(&self, token: &EvmToken) -> bool {
        matches!(
            (self, token),
            (Self::BatchContract { .. }, EvmToken::Erc20 { .. })
        )
    }

    /// Gas budget of one transfer transaction.
    #[must_use]
    pub const fn limits(&self, token: &EvmToken) -> BatchLimits {
        if self.uses_contract(token) {
            return BatchLimits::new(BATCH_BASE_GAS, BATCH_PER_RECIPIENT_GAS, BATCH_GAS_CEILING);
        }
        let gas = match token {
            EvmToken::Native => NATIVE_TRANSFER_GAS,
            EvmToken::Erc20 { .. } => ERC20_TRANSFER_GAS,
        };
        BatchLimits::new(0, gas, gas).with_max_recipients(1)
    }
}

/// A contract call or value transfer, before gas and nonce are attached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    /// Callee; `None` deploys `input` as creation code.
    pub to: Option<Address>,
    /// Native value sent.
    pub value: U256,
    /// Calldata.
    pub input: Bytes,
}

/// Builds the call paying every recipient of a batch.
///
/// # Errors
///
/// Returns [`SignError`] for a direct batch that does not carry exactly one
/// recipient, or a contract batch with no deployed contract.
pub fn transfer_call(
    strategy: &Strategy,
    token: &EvmToken,
    contract: Option<Address>,
    recipients: &[ResolvedRecipient<Address>],
) -> Result<Call, SignError> {
    if strategy.uses_contract(token) {
        let contract =
            contract.ok_or_else(|| SignError::new("batch contract has not been deployed"))?;
        let EvmToken::Erc20 { address, .. } = token else {
            return Err(SignError::new("batch contract requires an ERC-20 token"));
        };
        let call = batchTransferCall {
            token: *address,
            recipients: recipients.iter().map(|r| r.destination).collect(),
            amounts: recipients.iter().map(|r| U256::from(r.amount)).collect(),
        };
        return Ok(Call {
            to: Some(contract),
            value: U256::ZERO,
            input: call.abi_encode().into(),
        });
    }

    let [recipient] = recipients else {
        return Err(SignError::new(format!(
            "direct transfers carry one recipient, got {}",
            recipients.len()
        )));
    };
    let amount = U256::from(recipient.amount);
    Ok(match token {
        EvmToken::Native => Call {
            to: Some(recipient.destination),
            value: amount,
            input: Bytes::new(),
        },
        EvmToken::Erc20 { address, .. } => Call {
            to: Some(*address),
            value: U256::ZERO,
            input: transferCall {
                to: recipient.destination,
                amount,
            }
            .abi_encode()
            .into(),
        },
    })
}

/// Builds an ERC-20 `approve(spender, amount)` call.
#[must_use]
pub fn approve_call(token: Address, spender: Address, amount: U256) -> Call {
    Call {
        to: Some(token),
        value: U256::ZERO,
        input: approveCall { spender, amount }.abi_encode().into(),
    }
}

/// Builds a contract deployment.
#[must_use]
pub fn deploy_call(bytecode: Bytes) -> Call {
    Call {
        to: None,
        value: U256::ZERO,
        input: bytecode,
    }
}
