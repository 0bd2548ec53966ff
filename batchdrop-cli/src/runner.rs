//! Request loading, adapter selection and the disbursement run.

use std::path::Path;
use std::sync::Arc;

use batchdrop::adapter::ChainAdapter;
use batchdrop::chain::ChainKind;
use batchdrop::networks::NetworkRegistry;
use batchdrop::observer::{DisbursementObserver, Progress};
use batchdrop::request::{RecipientLine, TokenSpec};
use batchdrop::{DisbursementReport, DisbursementRequest, Disburser, RecipientOutcome};
use batchdrop_evm::{EVM_NETWORKS, EvmAdapter, EvmEndpoint};
use batchdrop_svm::{SOLANA_NETWORKS, SolanaAdapter, SolanaEndpoint};
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use crate::config::CliConfig;
use crate::error::CliError;

/// Every network the binary knows by name.
#[must_use]
pub fn registry() -> NetworkRegistry {
    NetworkRegistry::from_networks(EVM_NETWORKS).with_networks(SOLANA_NETWORKS)
}

/// Request file contents. The chain may be a CAIP-2 id or a network name.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestFile {
    /// Target chain.
    pub chain: String,
    /// Token to disburse (`native` or a contract/mint address).
    pub token: TokenSpec,
    /// Recipient lines in report order.
    pub recipients: Vec<RecipientLine>,
    /// Preferred recipients per transaction.
    #[serde(default)]
    pub batch_size_hint: Option<usize>,
}

impl RequestFile {
    /// Reads a JSON request file.
    ///
    /// # Errors
    ///
    /// Returns [`CliError`] if the file cannot be read or is not a request.
    pub fn load(path: &Path) -> Result<Self, CliError> {
        let content = std::fs::read_to_string(path).map_err(|source| CliError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Resolves the chain name into a [`DisbursementRequest`].
    ///
    /// # Errors
    ///
    /// Returns [`CliError::UnknownChain`] for names the registry does not know.
    pub fn into_request(self, registry: &NetworkRegistry) -> Result<DisbursementRequest, CliError> {
        let chain = registry
            .resolve(&self.chain)
            .ok_or(CliError::UnknownChain(self.chain))?;
        let request = DisbursementRequest::new(chain, self.token, self.recipients);
        Ok(match self.batch_size_hint {
            Some(hint) => request.with_batch_size_hint(hint),
            None => request,
        })
    }
}

/// Logs outcomes and batch progress.
#[derive(Debug, Clone)]
pub struct LogObserver {
    network: String,
}

impl LogObserver {
    /// Logs under the given network display name.
    #[must_use]
    pub const fn new(network: String) -> Self {
        Self { network }
    }
}

impl DisbursementObserver for LogObserver {
    fn on_outcome(&self, outcome: &RecipientOutcome) {
        if outcome.is_success() {
            tracing::info!(
                network = %self.network,
                index = outcome.index,
                address = %outcome.address,
                amount = %outcome.amount,
                transaction = ?outcome.transaction.as_ref().map(ToString::to_string),
                "Recipient paid"
            );
        } else {
            tracing::warn!(
                network = %self.network,
                index = outcome.index,
                address = %outcome.address,
                kind = ?outcome.kind,
                error = outcome.error.as_deref().unwrap_or_default(),
                "Recipient failed"
            );
        }
    }

    fn on_progress(&self, progress: Progress) {
        tracing::info!(
            network = %self.network,
            stage = ?progress.stage,
            batch = progress.batch_index + 1,
            of = progress.total_batches,
            confirmed = progress.confirmed_so_far,
            "Batch finished"
        );
    }
}

/// Builds the chain's adapter from `config` and runs `request` to completion.
///
/// # Errors
///
/// Returns [`CliError`] when the chain is unsupported or unconfigured, the adapter
/// cannot be constructed, or the engine rejects the request.
pub async fn run(
    config: &CliConfig,
    registry: &NetworkRegistry,
    request: DisbursementRequest,
    cancel: CancellationToken,
) -> Result<DisbursementReport, CliError> {
    let chain = request.chain.clone();
    let network = registry.display_name(&chain);
    let section = config.chain(registry, &chain)?;
    let signer = section.signer(&network)?.clone();
    let request = request.with_credentials(signer.clone());

    match chain.kind() {
        Some(ChainKind::Evm) => {
            let endpoint = EvmEndpoint::new(chain, &section.rpc)?;
            let options = section.evm_options(&config.engine)?;
            let adapter = EvmAdapter::connect(endpoint, &signer, &request.token, options).await?;
            execute(adapter, config, &request, network, cancel).await
        }
        Some(ChainKind::Solana) => {
            let rpc = section
                .rpc
                .first()
                .ok_or_else(|| CliError::Config(format!("no RPC endpoint for {network}")))?;
            let endpoint = SolanaEndpoint::new(chain, rpc.url.as_str());
            let adapter = SolanaAdapter::connect(endpoint, &signer, &request.token).await?;
            execute(adapter, config, &request, network, cancel).await
        }
        None => Err(CliError::UnknownChain(chain.to_string())),
    }
}

async fn execute<C: ChainAdapter>(
    adapter: C,
    config: &CliConfig,
    request: &DisbursementRequest,
    network: String,
    cancel: CancellationToken,
) -> Result<DisbursementReport, CliError> {
    let report = Disburser::new(adapter)
        .with_config(config.engine.clone())
        .with_observer(Arc::new(LogObserver::new(network)))
        .with_cancellation(cancel)
        .disburse(request)
        .await?;
    tracing::info!(
        status = ?report.status,
        succeeded = report.success_count,
        failed = report.failure_count,
        total = %report.total_amount,
        "Disbursement finished"
    );
    Ok(report)
}
