#![cfg_attr(docsrs, feature(doc_auto_cfg))]

//! EIP-155 (EVM) chain adapter for the batchdrop disbursement engine.
//!
//! # Features
//!
//! - **Direct transfers**: one native value transfer or ERC-20 `transfer` per transaction
//! - **Batch contract**: one `batchTransfer` call per batch, with deployment and
//!   allowance handled in a setup phase through the engine's submitter
//! - **EIP-1559 and legacy pricing**: selected per chain
//! - **Nonce-based expiry**: a transaction whose nonce was consumed without a receipt
//!   is reported expired and settled by receipt lookup
//! - **Rate-limited fallback transport**: throttled HTTP transports behind a fallback layer
//!
//! # Architecture
//!
//! - [`adapter`] - [`EvmAdapter`], the [`ChainAdapter`](batchdrop::adapter::ChainAdapter) implementation
//! - [`contract`] - Solidity interfaces
//! - [`endpoint`] - [`EvmEndpoint`], the JSON-RPC endpoint
//! - [`strategy`] - Transfer strategies and gas budgets
//!
//! # Feature Flags
//!
//! - `telemetry` - Enables tracing instrumentation
//!
//! # Example
//!
//! ```ignore
//! use batchdrop::{Disburser, DisbursementRequest};
//! use batchdrop_evm::{EvmAdapter, EvmEndpoint, EvmOptions, RpcUrl};
//!
//! let endpoint = EvmEndpoint::new(chain, &[RpcUrl::new(url)])?;
//! let adapter = EvmAdapter::connect(endpoint, &key, &request.token, EvmOptions::default()).await?;
//! let report = Disburser::new(adapter).disburse(&request).await?;
//! ```

pub mod adapter;
pub mod contract;
pub mod endpoint;
pub mod error;
pub mod strategy;

mod networks;
pub use networks::*;

#[cfg(test)]
pub(crate) mod testkit;

pub use adapter::{EvmAdapter, EvmOptions};
pub use endpoint::{EvmEndpoint, RpcUrl};
pub use error::EvmAdapterError;
pub use strategy::{EvmToken, Strategy};
