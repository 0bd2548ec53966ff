#![cfg_attr(docsrs, feature(doc_auto_cfg))]

//! Solana chain adapter for the batchdrop disbursement engine.
//!
//! # Features
//!
//! - **Native SOL and SPL tokens**: system transfers, or `TransferChecked` under
//!   the Token or Token-2022 program detected from the mint account
//! - **Associated token accounts**: derived offline during resolution; missing
//!   accounts are created idempotently before transfers
//! - **Compute budgets**: per-transaction compute-unit limits sized from the
//!   batch, priced from recent prioritization fees
//! - **Blockhash expiry**: a transaction is expired once the cluster's block
//!   height passes the blockhash's last valid height
//!
//! # Architecture
//!
//! - [`adapter`] - [`SolanaAdapter`], the [`ChainAdapter`](batchdrop::adapter::ChainAdapter) implementation
//! - [`endpoint`] - [`SolanaEndpoint`], the JSON-RPC endpoint
//! - [`keypair`] - Fee payer keypair decoding
//! - [`program`] - Token programs, instruction builders and compute budgets
//!
//! # Feature Flags
//!
//! - `telemetry` - Enables tracing instrumentation
//!
//! # Example
//!
//! ```ignore
//! use batchdrop::Disburser;
//! use batchdrop_svm::{SolanaAdapter, SolanaEndpoint};
//!
//! let endpoint = SolanaEndpoint::new(chain, "https://api.devnet.solana.com");
//! let adapter = SolanaAdapter::connect(endpoint, &keypair, &request.token).await?;
//! let report = Disburser::new(adapter).disburse(&request).await?;
//! ```

pub mod adapter;
pub mod endpoint;
pub mod error;
pub mod keypair;
pub mod program;

mod networks;
pub use networks::*;

#[cfg(test)]
pub(crate) mod testkit;

pub use adapter::SolanaAdapter;
pub use endpoint::SolanaEndpoint;
pub use error::SolanaAdapterError;
pub use program::SolanaToken;
