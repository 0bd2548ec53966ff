#![cfg_attr(docsrs, feature(doc_auto_cfg))]

//! Chain-agnostic batch disbursement engine.
//!
//! Turns an ordered list of `(recipient, amount)` lines into the smallest set of
//! correctly sequenced on-chain transactions, drives every transaction to a definite
//! terminal state against a best-effort RPC endpoint, and reports exactly one
//! [`RecipientOutcome`](outcome::RecipientOutcome) per input line.
//!
//! Chain-specific behavior (address derivation, account preconditions, wire format)
//! lives behind [`ChainAdapter`](adapter::ChainAdapter) and
//! [`RpcEndpoint`](adapter::RpcEndpoint), implemented by `batchdrop-evm` and
//! `batchdrop-svm`.
//!
//! # Pipeline
//!
//! ```text
//! resolve -> materialize preconditions -> batch -> submit & confirm -> aggregate
//! ```
//!
//! # Modules
//!
//! - [`adapter`] - Chain adapter and RPC endpoint contracts
//! - [`amount`] - Exact decimal amount parsing into base units
//! - [`batch`] - Cost-bounded batch sizing and order-preserving partitioning
//! - [`chain`] - CAIP-2 chain identifiers and chain families
//! - [`config`] - Engine tunables
//! - [`engine`] - The disbursement orchestrator
//! - [`error`] - Failure taxonomy and engine errors
//! - [`fee`] - Fee estimation that never fails
//! - [`networks`] - Registry of well-known networks
//! - [`observer`] - Outcome stream and progress callbacks
//! - [`outcome`] - Per-recipient outcomes and the disbursement report
//! - [`request`] - Disbursement input
//! - [`resolve`] - Address resolution stage
//! - [`retry`] - Error classification and exponential backoff
//! - [`submit`] - Transaction submitter and confirmation tracker
//!
//! # Feature Flags
//!
//! - `telemetry` - Enables tracing instrumentation

pub mod adapter;
pub mod amount;
pub mod batch;
pub mod chain;
pub mod config;
pub mod engine;
pub mod error;
pub mod fee;
pub mod networks;
pub mod observer;
pub mod outcome;
pub mod request;
pub mod resolve;
pub mod retry;
pub mod submit;

#[cfg(test)]
pub(crate) mod testkit;

pub use engine::Disburser;
pub use error::{DisburseError, FailureKind};
pub use outcome::{DisbursementReport, DisbursementStatus, RecipientOutcome};
pub use request::DisbursementRequest;
