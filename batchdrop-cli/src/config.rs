//! Operator configuration.
//!
//! Loads a TOML file and expands `$VAR` / `${VAR}` references from the process
//! environment before parsing, so signer keys can stay out of the file.
//!
//! # Example Configuration
//!
//! ```toml
//! [engine]
//! inter_batch_delay_ms = 500
//! default_batch_size = 20
//!
//! [engine.fees]
//! percentile = 0.95
//!
//! [engine.submitter]
//! pending_timeout_ms = 300000
//!
//! [chains.base]
//! signer_key = "$BASE_SIGNER_KEY"
//! eip1559 = true
//! batch_contract = "0x..."
//! rpc = [
//!     { url = "https://mainnet.base.org", rate_limit = 10 },
//!     { url = "https://base.llamarpc.com" },
//! ]
//!
//! [chains."solana:EtWTRABZaYq6iMfeYKouRu166VU2xqa1"]
//! signer_key = "${SOLANA_KEYPAIR}"
//! rpc = [{ url = "https://api.devnet.solana.com" }]
//! ```
//!
//! Chain sections are keyed by CAIP-2 id or by a known network name.

use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;

use alloy_primitives::Bytes;
use batchdrop::chain::ChainId;
use batchdrop::config::EngineConfig;
use batchdrop::networks::NetworkRegistry;
use batchdrop::request::SignerSecret;
use batchdrop_evm::RpcUrl;
use batchdrop_evm::adapter::parse_address;
use batchdrop_evm::{EvmOptions, Strategy};
use serde::Deserialize;

use crate::error::CliError;

/// Top-level operator configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CliConfig {
    /// Engine tunables.
    #[serde(default)]
    pub engine: EngineConfig,
    /// Chain sections keyed by CAIP-2 id or network name.
    #[serde(default)]
    pub chains: HashMap<String, ChainConfig>,
}

/// One chain's endpoints, signer and options.
#[derive(Debug, Clone, Deserialize)]
pub struct ChainConfig {
    /// RPC endpoints. EVM chains use all of them behind a fallback; Solana uses the first.
    pub rpc: Vec<RpcUrl>,
    /// Signer key: hex private key (EVM) or keypair (Solana).
    pub signer_key: SignerSecret,
    /// Price EVM transactions with EIP-1559 fields.
    #[serde(default = "default_eip1559")]
    pub eip1559: bool,
    /// Deployed airdrop contract used for ERC-20 batches.
    #[serde(default)]
    pub batch_contract: Option<String>,
    /// Airdrop contract creation bytecode, deployed when no contract is configured.
    #[serde(default)]
    pub contract_bytecode: Option<String>,
}

const fn default_eip1559() -> bool {
    true
}

impl CliConfig {
    /// Loads configuration from `path`.
    ///
    /// A missing file yields the defaults, which configure no chains.
    ///
    /// # Errors
    ///
    /// Returns [`CliError`] if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self, CliError> {
        let content = if path.exists() {
            std::fs::read_to_string(path).map_err(|source| CliError::Io {
                path: path.display().to_string(),
                source,
            })?
        } else {
            tracing::warn!(path = %path.display(), "Config file not found, using defaults");
            String::new()
        };
        Self::parse(&content)
    }

    /// Parses configuration text after expanding environment references.
    ///
    /// # Errors
    ///
    /// Returns [`CliError::Config`] for malformed TOML or invalid engine settings.
    pub fn parse(content: &str) -> Result<Self, CliError> {
        let config: Self = toml::from_str(&expand_env_vars(content))?;
        config.engine.validate()?;
        Ok(config)
    }

    /// Finds the section configuring `chain`.
    ///
    /// # Errors
    ///
    /// Returns [`CliError::ChainNotConfigured`] when no key resolves to `chain`.
    pub fn chain(
        &self,
        registry: &NetworkRegistry,
        chain: &ChainId,
    ) -> Result<&ChainConfig, CliError> {
        self.chains
            .iter()
            .find(|(key, _)| registry.resolve(key).as_ref() == Some(chain))
            .map(|(_, config)| config)
            .ok_or_else(|| CliError::ChainNotConfigured(registry.display_name(chain)))
    }
}

impl ChainConfig {
    /// Returns the signer key, rejecting unresolved `$VAR` placeholders.
    ///
    /// # Errors
    ///
    /// Returns [`CliError::MissingSignerKey`] when the key is empty or unexpanded.
    pub fn signer(&self, chain: &str) -> Result<&SignerSecret, CliError> {
        if self.signer_key.is_unset() {
            return Err(CliError::MissingSignerKey(chain.to_owned()));
        }
        Ok(&self.signer_key)
    }

    /// EVM adapter options for this chain.
    ///
    /// # Errors
    ///
    /// Returns [`CliError::Config`] for malformed contract addresses or bytecode.
    pub fn evm_options(&self, engine: &EngineConfig) -> Result<EvmOptions, CliError> {
        let contract = self
            .batch_contract
            .as_deref()
            .map(|address| {
                parse_address(address)
                    .map_err(|e| CliError::Config(format!("batch_contract: {e}")))
            })
            .transpose()?;
        let bytecode = self
            .contract_bytecode
            .as_deref()
            .map(|hex| {
                Bytes::from_str(hex.trim())
                    .map_err(|e| CliError::Config(format!("contract_bytecode: {e}")))
            })
            .transpose()?;
        let strategy = if contract.is_some() || bytecode.is_some() {
            Strategy::BatchContract { contract, bytecode }
        } else {
            Strategy::Direct
        };
        Ok(EvmOptions {
            eip1559: self.eip1559,
            strategy,
            fees: engine.fees.clone(),
        })
    }
}

/// Expands `$VAR` and `${VAR}` patterns from the environment.
///
/// Unresolved variables are left as-is, which [`SignerSecret::is_unset`] detects.
fn expand_env_vars(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch != '$' {
            result.push(ch);
            continue;
        }
        let braced = chars.next_if_eq(&'{').is_some();
        let mut name = String::new();
        let mut closed = false;
        while let Some(&c) = chars.peek() {
            if braced && c == '}' {
                chars.next();
                closed = true;
                break;
            }
            if !braced && !c.is_ascii_alphanumeric() && c != '_' {
                break;
            }
            name.push(c);
            chars.next();
        }

        match std::env::var(&name) {
            Ok(value) if !name.is_empty() => result.push_str(&value),
            _ => {
                result.push('$');
                if braced {
                    result.push('{');
                }
                result.push_str(&name);
                if closed {
                    result.push('}');
                }
            }
        }
    }
    result
}
