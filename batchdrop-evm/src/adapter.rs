//! The EVM [`ChainAdapter`].
//!
//! Transactions are signed locally with a [`PrivateKeySigner`] and broadcast as raw
//! EIP-2718 envelopes, so a replay re-sends byte-identical data under the same hash.

use std::fmt;
use std::str::FromStr;
use std::sync::{LazyLock, Mutex, OnceLock, PoisonError};

use alloy_eips::eip2718::Encodable2718;
use alloy_network::{EthereumWallet, TransactionBuilder};
use alloy_primitives::{Address, U256};
use alloy_rpc_types_eth::TransactionRequest;
use alloy_signer_local::PrivateKeySigner;
use async_trait::async_trait;
use batchdrop::adapter::ChainAdapter;
use batchdrop::batch::{Batch, BatchLimits};
use batchdrop::chain::{ChainId, ChainKind};
use batchdrop::error::{SetupError, SignError};
use batchdrop::fee::{FeeHint, FeePolicy, estimate};
use batchdrop::outcome::TransactionRecord;
use batchdrop::request::{SignerSecret, TokenSpec};
use batchdrop::resolve::{ResolvedRecipient, ResolvedTarget};
use batchdrop::submit::{
    PayloadSigner, Settlement, SignedPayload, Stage, SubmissionLabel, Submitter, TxRef,
    ValidityWindow,
};
use regex::Regex;

use crate::endpoint::EvmEndpoint;
use crate::error::EvmAdapterError;
use crate::strategy::{
    APPROVE_GAS, Call, DEPLOY_GAS, EvmToken, Strategy, approve_call, deploy_call, transfer_call,
};

static ADDRESS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^0x[0-9a-fA-F]{40}$").expect("valid regex"));

/// Chain-level options of an [`EvmAdapter`].
#[derive(Debug, Clone, PartialEq)]
pub struct EvmOptions {
    /// Price transactions with EIP-1559 fields instead of a legacy gas price.
    pub eip1559: bool,
    /// How batches become transactions.
    pub strategy: Strategy,
    /// Fee policy for setup transactions and the gas-limit buffer.
    pub fees: FeePolicy,
}

impl Default for EvmOptions {
    fn default() -> Self {
        Self {
            eip1559: true,
            strategy: Strategy::Direct,
            fees: FeePolicy::default(),
        }
    }
}

/// EVM implementation of [`ChainAdapter`].
pub struct EvmAdapter {
    chain: ChainId,
    chain_reference: u64,
    endpoint: EvmEndpoint,
    wallet: EthereumWallet,
    signer: Address,
    token: EvmToken,
    options: EvmOptions,
    contract: OnceLock<Address>,
}

impl fmt::Debug for EvmAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EvmAdapter")
            .field("chain", &self.chain)
            .field("signer", &self.signer)
            .field("token", &self.token)
            .field("options", &self.options)
            .field("contract", &self.contract.get())
            .finish_non_exhaustive()
    }
}

impl EvmAdapter {
    /// Creates an adapter for a token whose decimals are already known.
    ///
    /// # Errors
    ///
    /// Returns [`EvmAdapterError`] when the chain is not `eip155`, the key does not
    /// parse, or the contract strategy has neither an address nor bytecode.
    pub fn new(
        endpoint: EvmEndpoint,
        credentials: &SignerSecret,
        token: EvmToken,
        options: EvmOptions,
    ) -> Result<Self, EvmAdapterError> {
        let chain = endpoint.chain().clone();
        let chain_reference = chain
            .evm_chain_id()
            .ok_or_else(|| EvmAdapterError::NotEvm(chain.to_string()))?;
        let key = PrivateKeySigner::from_str(credentials.expose().trim())
            .map_err(|e| EvmAdapterError::InvalidKey(e.to_string()))?;
        let signer = key.address();

        let contract = OnceLock::new();
        if let Strategy::BatchContract {
            contract: configured,
            bytecode,
        } = &options.strategy
            && options.strategy.uses_contract(&token)
        {
            match (configured, bytecode) {
                (Some(address), _) => {
                    let _ = contract.set(*address);
                }
                (None, Some(_)) => {}
                (None, None) => {
                    return Err(EvmAdapterError::InvalidConfig(
                        "batch contract strategy needs a contract address or bytecode".to_owned(),
                    ));
                }
            }
        }

        #[cfg(feature = "telemetry")]
        tracing::info!(chain = %chain, signer = %signer, token = ?token, "EVM adapter ready");
        Ok(Self {
            chain,
            chain_reference,
            endpoint,
            wallet: EthereumWallet::from(key),
            signer,
            token,
            options,
            contract,
        })
    }

    /// Creates an adapter, reading ERC-20 decimals from the chain.
    ///
    /// # Errors
    ///
    /// Returns [`EvmAdapterError`] for malformed tokens or when `decimals()` cannot be read.
    pub async fn connect(
        endpoint: EvmEndpoint,
        credentials: &SignerSecret,
        token: &TokenSpec,
        options: EvmOptions,
    ) -> Result<Self, EvmAdapterError> {
        let token = match token {
            TokenSpec::Native => EvmToken::Native,
            TokenSpec::Fungible(address) => {
                let address = parse_address(address)
                    .map_err(|_| EvmAdapterError::InvalidToken(address.clone()))?;
                let decimals = endpoint
                    .token_decimals(address)
                    .await
                    .map_err(|e| EvmAdapterError::TokenMetadata(e.message().to_owned()))?;
                EvmToken::Erc20 { address, decimals }
            }
        };
        Self::new(endpoint, credentials, token, options)
    }

    /// The token being disbursed.
    #[must_use]
    pub const fn token(&self) -> &EvmToken {
        &self.token
    }

    /// The batch contract, once known.
    #[must_use]
    pub fn contract(&self) -> Option<Address> {
        self.contract.get().copied()
    }

    /// Signs `call` against `window` with the given gas limit.
    async fn sign_call(
        &self,
        call: Call,
        gas_limit: u64,
        fee: &FeeHint,
        window: &ValidityWindow,
    ) -> Result<SignedPayload, SignError> {
        let FeeHint::Gas {
            gas_price,
            priority_fee,
        } = *fee
        else {
            return Err(SignError::new("EVM transactions need a gas price hint"));
        };
        let nonce = window
            .nonce
            .ok_or_else(|| SignError::new("validity window carries no nonce"))?;

        let mut tx = TransactionRequest::default()
            .with_from(self.signer)
            .with_chain_id(self.chain_reference)
            .with_nonce(nonce)
            .with_gas_limit(self.options.fees.buffered_gas_limit(gas_limit))
            .with_value(call.value);
        tx = match call.to {
            Some(to) => tx.with_to(to).with_input(call.input),
            None => tx.with_deploy_code(call.input),
        };
        if self.options.eip1559 {
            tx.set_max_fee_per_gas(gas_price.saturating_mul(2).saturating_add(priority_fee));
            tx.set_max_priority_fee_per_gas(priority_fee);
        } else {
            tx.set_gas_price(gas_price);
        }

        let envelope = tx.build(&self.wallet).await.map_err(SignError::new)?;
        Ok(SignedPayload {
            reference: TxRef::new(envelope.tx_hash().to_string()),
            raw: envelope.encoded_2718(),
            signer: self.signer.to_string(),
            window: window.clone(),
        })
    }

    /// Deploys the batch contract unless one is already known.
    async fn ensure_contract(
        &self,
        submitter: &Submitter<'_, EvmEndpoint>,
        fee: FeeHint,
        records: &mut Vec<TransactionRecord>,
    ) -> Result<Address, SetupError> {
        if let Some(contract) = self.contract.get() {
            return Ok(*contract);
        }
        let Strategy::BatchContract {
            bytecode: Some(bytecode),
            ..
        } = &self.options.strategy
        else {
            return Err(SetupError::new("no batch contract bytecode configured"));
        };

        let signer = SetupSigner {
            adapter: self,
            call: deploy_call(bytecode.clone()),
            gas_limit: DEPLOY_GAS,
            fee,
            nonce: Mutex::new(None),
        };
        let label = SubmissionLabel::new(Stage::Setup, records.len());
        let settlement = submitter.submit(label, &signer, 0).await;
        records.push(TransactionRecord::from_settlement(label, &settlement, 0));
        if let Settlement::Failed { reason, .. } = &settlement {
            return Err(SetupError::new(format!(
                "batch contract deployment failed: {reason}"
            )));
        }

        let nonce = (*signer.nonce.lock().unwrap_or_else(PoisonError::into_inner))
            .ok_or_else(|| SetupError::new("deployment nonce was not recorded"))?;
        let address = self.signer.create(nonce);
        #[cfg(feature = "telemetry")]
        tracing::info!(contract = %address, "Batch contract deployed");
        Ok(*self.contract.get_or_init(|| address))
    }

    /// Approves `contract` for `total` when the current allowance is short.
    async fn ensure_allowance(
        &self,
        submitter: &Submitter<'_, EvmEndpoint>,
        token: Address,
        contract: Address,
        total: U256,
        fee: FeeHint,
        records: &mut Vec<TransactionRecord>,
    ) -> Result<(), SetupError> {
        let allowance = submitter
            .retry_policy()
            .run("allowance", || {
                submitter.timed(self.endpoint.allowance(token, self.signer, contract))
            })
            .await
            .map_err(|e| SetupError::new(format!("allowance check failed: {}", e.message())))?;
        if allowance >= total {
            return Ok(());
        }

        #[cfg(feature = "telemetry")]
        tracing::info!(%allowance, %total, spender = %contract, "Approving batch contract");
        let signer = SetupSigner {
            adapter: self,
            call: approve_call(token, contract, total),
            gas_limit: APPROVE_GAS,
            fee,
            nonce: Mutex::new(None),
        };
        let label = SubmissionLabel::new(Stage::Setup, records.len());
        let settlement = submitter.submit(label, &signer, 0).await;
        records.push(TransactionRecord::from_settlement(label, &settlement, 0));
        match settlement {
            Settlement::Confirmed { .. } => Ok(()),
            Settlement::Failed { reason, .. } => {
                Err(SetupError::new(format!("token approval failed: {reason}")))
            }
        }
    }
}

#[async_trait]
impl ChainAdapter for EvmAdapter {
    type Account = Address;
    type Endpoint = EvmEndpoint;

    fn chain_id(&self) -> &ChainId {
        &self.chain
    }

    fn kind(&self) -> ChainKind {
        ChainKind::Evm
    }

    fn endpoint(&self) -> &EvmEndpoint {
        &self.endpoint
    }

    fn signer(&self) -> &Address {
        &self.signer
    }

    fn decimals(&self) -> u8 {
        self.token.decimals()
    }

    fn resolve(&self, address: &str) -> Result<ResolvedTarget<Address>, String> {
        parse_address(address).map(ResolvedTarget::direct)
    }

    fn transfer_limits(&self) -> BatchLimits {
        self.options.strategy.limits(&self.token)
    }

    async fn prepare(
        &self,
        submitter: &Submitter<'_, EvmEndpoint>,
        recipients: &[ResolvedRecipient<Address>],
    ) -> Result<Vec<TransactionRecord>, SetupError> {
        let EvmToken::Erc20 { address: token, .. } = self.token else {
            return Ok(Vec::new());
        };
        if !self.options.strategy.uses_contract(&self.token) || recipients.is_empty() {
            return Ok(Vec::new());
        }

        let fee = estimate(&self.endpoint, ChainKind::Evm, &self.options.fees).await;
        let mut records = Vec::new();
        let contract = self.ensure_contract(submitter, fee, &mut records).await?;
        let total = recipients
            .iter()
            .fold(U256::ZERO, |acc, r| acc.saturating_add(U256::from(r.amount)));
        self.ensure_allowance(submitter, token, contract, total, fee, &mut records)
            .await?;
        Ok(records)
    }

    async fn sign_transfer(
        &self,
        batch: &Batch<Address>,
        fee: &FeeHint,
        window: &ValidityWindow,
    ) -> Result<SignedPayload, SignError> {
        let call = transfer_call(
            &self.options.strategy,
            &self.token,
            self.contract(),
            &batch.recipients,
        )?;
        let gas_limit = self.transfer_limits().cost(batch.len());
        self.sign_call(call, gas_limit, fee, window).await
    }
}

/// Signs one setup transaction, remembering the nonce it consumed.
struct SetupSigner<'a> {
    adapter: &'a EvmAdapter,
    call: Call,
    gas_limit: u64,
    fee: FeeHint,
    nonce: Mutex<Option<u64>>,
}

#[async_trait]
impl PayloadSigner<Address> for SetupSigner<'_> {
    fn signer(&self) -> &Address {
        &self.adapter.signer
    }

    async fn sign(&self, window: &ValidityWindow) -> Result<SignedPayload, SignError> {
        let payload = self
            .adapter
            .sign_call(self.call.clone(), self.gas_limit, &self.fee, window)
            .await?;
        *self.nonce.lock().unwrap_or_else(PoisonError::into_inner) = window.nonce;
        Ok(payload)
    }
}

/// Parses a `0x`-prefixed address.
///
/// Mixed-case input must carry a valid EIP-55 checksum; the zero address is rejected.
///
/// # Errors
///
/// Returns a human-readable reason for malformed addresses.
pub fn parse_address(input: &str) -> Result<Address, String> {
    if !ADDRESS_RE.is_match(input) {
        return Err(format!("{input:?} is not a 0x-prefixed 20-byte hex address"));
    }
    let hex = &input[2..];
    let mixed_case = hex.chars().any(|c| c.is_ascii_lowercase())
        && hex.chars().any(|c| c.is_ascii_uppercase());
    let address = if mixed_case {
        Address::parse_checksummed(input, None).map_err(|_| format!("{input} has a bad checksum"))?
    } else {
        Address::from_str(input).map_err(|e| e.to_string())?
    };
    if address.is_zero() {
        return Err("the zero address cannot receive funds".to_owned());
    }
    Ok(address)
}

#[cfg(test)]
mod tests {
    use alloy_primitives::address;
    use batchdrop::resolve::Precondition;
    use url::Url;

    use std::time::Duration;

    use batchdrop::config::EngineConfig;
    use batchdrop::request::RecipientLine;
    use batchdrop::{DisbursementRequest, DisbursementStatus, Disburser, FailureKind};
    use serde_json::{Value, json};
    use wiremock::MockServer;

    use super::*;
    use crate::endpoint::RpcUrl;
    use crate::testkit::{HASH, mock, mock_times, receipt};

    // Well-known development key (anvil account #0).
    const KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
    const TOKEN: Address = address!("0x833589fCD6eDb6E08f4c7C32D4f71b54bdA02913");

    fn endpoint() -> EvmEndpoint {
        let url = Url::parse("http://127.0.0.1:8545").unwrap();
        EvmEndpoint::new(ChainId::eip155(8453), &[RpcUrl::new(url)]).unwrap()
    }

    fn adapter(token: EvmToken, options: EvmOptions) -> EvmAdapter {
        EvmAdapter::new(endpoint(), &SignerSecret::new(KEY), token, options).unwrap()
    }

    fn erc20() -> EvmToken {
        EvmToken::Erc20 {
            address: TOKEN,
            decimals: 6,
        }
    }

    fn batch(amount: u128) -> Batch<Address> {
        let owner = address!("0x70997970C51812dc3A010C7d01b50e0d17dc79C8");
        Batch {
            index: 0,
            recipients: vec![ResolvedRecipient {
                index: 0,
                address: owner.to_string(),
                owner,
                destination: owner,
                amount,
                precondition: Precondition::None,
            }],
        }
    }

    fn window(nonce: u64) -> ValidityWindow {
        ValidityWindow {
            anchor: nonce.to_string(),
            last_valid_height: None,
            nonce: Some(nonce),
        }
    }

    const GAS: FeeHint = FeeHint::Gas {
        gas_price: 1_000_000_000,
        priority_fee: 100_000_000,
    };

    #[test]
    fn test_address_validation() {
        assert!(parse_address("0x70997970c51812dc3a010c7d01b50e0d17dc79c8").is_ok());
        assert!(parse_address("0x70997970C51812DC3A010C7D01B50E0D17DC79C8").is_ok());
        assert!(parse_address("0x70997970C51812dc3A010C7d01b50e0d17dc79C8").is_ok());
        assert!(
            parse_address("0x70997970c51812dc3A010C7d01b50e0d17dc79C8")
                .unwrap_err()
                .contains("checksum")
        );
        assert!(parse_address("70997970c51812dc3a010c7d01b50e0d17dc79c8").is_err());
        assert!(parse_address("0x1234").is_err());
        assert!(parse_address("0x0000000000000000000000000000000000000000").is_err());
    }

    #[test]
    fn test_construction_errors() {
        let non_evm = EvmEndpoint::new(
            ChainId::new("solana", "devnet"),
            &[RpcUrl::new(Url::parse("http://127.0.0.1:8899").unwrap())],
        )
        .unwrap();
        assert!(matches!(
            EvmAdapter::new(non_evm, &SignerSecret::new(KEY), EvmToken::Native, EvmOptions::default()),
            Err(EvmAdapterError::NotEvm(_))
        ));
        assert!(matches!(
            EvmAdapter::new(endpoint(), &SignerSecret::new("0xnope"), EvmToken::Native, EvmOptions::default()),
            Err(EvmAdapterError::InvalidKey(_))
        ));
        let options = EvmOptions {
            strategy: Strategy::BatchContract {
                contract: None,
                bytecode: None,
            },
            ..EvmOptions::default()
        };
        assert!(matches!(
            EvmAdapter::new(endpoint(), &SignerSecret::new(KEY), erc20(), options),
            Err(EvmAdapterError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_signer_and_limits() {
        let adapter = adapter(EvmToken::Native, EvmOptions::default());
        assert_eq!(
            *adapter.signer(),
            address!("0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266")
        );
        assert_eq!(adapter.decimals(), 18);
        assert_eq!(adapter.transfer_limits().max_batch_size(), 1);

        let options = EvmOptions {
            strategy: Strategy::BatchContract {
                contract: Some(Address::with_last_byte(7)),
                bytecode: None,
            },
            ..EvmOptions::default()
        };
        let adapter = self::adapter(erc20(), options);
        assert_eq!(adapter.contract(), Some(Address::with_last_byte(7)));
        assert!(adapter.transfer_limits().max_batch_size() > 100);
    }

    #[tokio::test]
    async fn test_signing_is_deterministic_per_window() {
        let adapter = adapter(erc20(), EvmOptions::default());
        let first = adapter.sign_transfer(&batch(5), &GAS, &window(3)).await.unwrap();
        let again = adapter.sign_transfer(&batch(5), &GAS, &window(3)).await.unwrap();
        let fresh = adapter.sign_transfer(&batch(5), &GAS, &window(4)).await.unwrap();

        assert_eq!(first.reference, again.reference);
        assert_eq!(first.raw, again.raw);
        assert_ne!(first.reference, fresh.reference);
        assert!(first.reference.as_str().starts_with("0x"));
        assert_eq!(first.reference.as_str().len(), 66);
        // EIP-1559 envelope type byte.
        assert_eq!(first.raw[0], 0x02);
    }

    #[tokio::test]
    async fn test_legacy_pricing_and_fee_mismatch() {
        let options = EvmOptions {
            eip1559: false,
            ..EvmOptions::default()
        };
        let adapter = adapter(EvmToken::Native, options);
        let legacy = adapter.sign_transfer(&batch(1), &GAS, &window(0)).await.unwrap();
        // Legacy envelopes are RLP lists, not typed.
        assert!(legacy.raw[0] >= 0xc0);

        let err = adapter
            .sign_transfer(&batch(1), &FeeHint::Priority { micro_lamports: 1 }, &window(0))
            .await
            .unwrap_err();
        assert!(err.0.contains("gas price"));
    }

    #[tokio::test]
    async fn test_setup_is_skipped_without_contract_strategy() {
        let adapter = adapter(erc20(), EvmOptions::default());
        let config = batchdrop::submit::SubmitterConfig::default();
        let retry = batchdrop::retry::RetryPolicy::default();
        let cancel = tokio_util::sync::CancellationToken::new();
        let submitter = Submitter::new(adapter.endpoint(), &config, &retry, &cancel);
        let records = adapter.prepare(&submitter, &batch(5).recipients).await.unwrap();
        assert!(records.is_empty());
    }

    async fn node(receipt_status: &str) -> MockServer {
        let server = MockServer::start().await;
        mock(&server, "eth_getTransactionCount", Ok(json!("0x0"))).await;
        mock(&server, "eth_gasPrice", Ok(json!("0x3b9aca00"))).await;
        mock(&server, "eth_maxPriorityFeePerGas", Ok(json!("0x5f5e100"))).await;
        mock(&server, "eth_sendRawTransaction", Ok(json!(HASH))).await;
        mock(&server, "eth_getTransactionReceipt", Ok(receipt(receipt_status))).await;
        server
    }

    fn disburser(server: &MockServer) -> Disburser<EvmAdapter> {
        let url = Url::parse(&server.uri()).unwrap();
        let endpoint = EvmEndpoint::new(ChainId::eip155(8453), &[RpcUrl::new(url)]).unwrap();
        let adapter = EvmAdapter::new(
            endpoint,
            &SignerSecret::new(KEY),
            EvmToken::Native,
            EvmOptions::default(),
        )
        .unwrap();
        Disburser::new(adapter).with_config(EngineConfig {
            inter_batch_delay: Duration::ZERO,
            ..EngineConfig::default()
        })
    }

    fn request() -> DisbursementRequest {
        DisbursementRequest::new(
            ChainId::eip155(8453),
            TokenSpec::Native,
            vec![
                RecipientLine::new("0x70997970C51812dc3A010C7d01b50e0d17dc79C8", "0.5"),
                RecipientLine::new("0xbad", "1"),
                RecipientLine::new("0x3C44CdDdB6a900fa2b585dd299e03d12FA4293BC", "0.25"),
            ],
        )
        .with_credentials(SignerSecret::new(KEY))
    }

    #[tokio::test]
    async fn test_native_disbursement_against_node() {
        let server = node("0x1").await;
        let report = disburser(&server).disburse(&request()).await.unwrap();

        assert_eq!(report.status, DisbursementStatus::Partial);
        assert_eq!(report.success_count, 2);
        assert_eq!(report.failure_count, 1);
        assert_eq!(report.outcomes[1].kind, Some(FailureKind::InvalidInput));
        assert_eq!(report.transactions.len(), 2);
        assert_eq!(report.total_amount, "0.75");
        assert!(report.outcomes[0].transaction.is_some());
    }

    #[tokio::test]
    async fn test_reverted_receipt_fails_recipient() {
        let server = node("0x0").await;
        let report = disburser(&server).disburse(&request()).await.unwrap();

        assert_eq!(report.status, DisbursementStatus::Failed);
        assert_eq!(report.outcomes[0].kind, Some(FailureKind::TerminalChain));
        assert!(
            report.outcomes[0]
                .error
                .as_deref()
                .unwrap()
                .contains("execution reverted")
        );
    }

    /// A node that has not mined the payment yet: no receipt, nonce unconsumed.
    async fn slow_node(receipt_after: Option<u64>) -> MockServer {
        let server = MockServer::start().await;
        mock(&server, "eth_getTransactionCount", Ok(json!("0x0"))).await;
        mock(&server, "eth_gasPrice", Ok(json!("0x3b9aca00"))).await;
        mock(&server, "eth_maxPriorityFeePerGas", Ok(json!("0x5f5e100"))).await;
        mock(&server, "eth_sendRawTransaction", Ok(json!(HASH))).await;
        match receipt_after {
            Some(calls) => {
                mock_times(&server, "eth_getTransactionReceipt", Ok(Value::Null), calls).await;
                mock(&server, "eth_getTransactionReceipt", Ok(receipt("0x1"))).await;
            }
            None => mock(&server, "eth_getTransactionReceipt", Ok(Value::Null)).await,
        }
        server
    }

    fn quick_polls(server: &MockServer, pending_timeout: Duration) -> Disburser<EvmAdapter> {
        let disburser = disburser(server);
        let mut config = disburser.config().clone();
        config.submitter.poll_interval = Duration::from_millis(10);
        config.submitter.pending_timeout = pending_timeout;
        disburser.with_config(config)
    }

    fn single_payment() -> DisbursementRequest {
        DisbursementRequest::new(
            ChainId::eip155(8453),
            TokenSpec::Native,
            vec![RecipientLine::new("0x70997970C51812dc3A010C7d01b50e0d17dc79C8", "0.5")],
        )
        .with_credentials(SignerSecret::new(KEY))
    }

    #[tokio::test]
    async fn test_unmined_transaction_is_awaited_past_poll_budget() {
        // Ten polls and the final lookup see no receipt; the nonce is still open.
        let server = slow_node(Some(15)).await;
        let report = quick_polls(&server, Duration::from_secs(30))
            .disburse(&single_payment())
            .await
            .unwrap();

        assert_eq!(report.status, DisbursementStatus::Success);
        assert_eq!(report.transactions.len(), 1);
        assert_eq!(report.transactions[0].fee_paid, Some(21_000_000_000_000));
        assert_eq!(report.total_fees_paid, 21_000_000_000_000);
    }

    #[tokio::test]
    async fn test_open_nonce_is_not_reported_as_not_found() {
        let server = slow_node(None).await;
        let report = quick_polls(&server, Duration::from_millis(100))
            .disburse(&single_payment())
            .await
            .unwrap();

        let outcome = &report.outcomes[0];
        assert_eq!(outcome.kind, Some(FailureKind::TransientRpc));
        let error = outcome.error.as_deref().unwrap();
        assert!(error.contains("validity window open"), "{error}");
        assert!(error.contains("may still land"), "{error}");
        assert!(outcome.transaction.is_some());
        assert_eq!(report.transactions[0].fee_paid, None);
    }
}
