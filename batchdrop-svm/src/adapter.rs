//! The Solana [`ChainAdapter`].
//!
//! Every transaction is a v0 message paying from the adapter's keypair, prefixed
//! with compute-unit limit and price instructions. Signing is deterministic for a
//! given blockhash, so a replay re-sends the same signature.

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use batchdrop::adapter::ChainAdapter;
use batchdrop::batch::{Batch, BatchLimits};
use batchdrop::chain::{ChainId, ChainKind};
use batchdrop::error::SignError;
use batchdrop::fee::FeeHint;
use batchdrop::request::{SignerSecret, TokenSpec};
use batchdrop::resolve::ResolvedTarget;
use batchdrop::submit::{SignedPayload, TxRef, ValidityWindow};
use solana_compute_budget_interface::ComputeBudgetInstruction;
use solana_instruction::Instruction;
use solana_keypair::Keypair;
use solana_message::v0::Message as MessageV0;
use solana_message::{Hash, VersionedMessage};
use solana_pubkey::Pubkey;
use solana_signer::Signer;
use solana_transaction::versioned::VersionedTransaction;

use crate::endpoint::SolanaEndpoint;
use crate::error::SolanaAdapterError;
use crate::keypair::parse_keypair;
use crate::program::{
    SolanaToken, associated_token_address, create_associated_token_account_idempotent,
    creation_limits, system_transfer, transfer_checked,
};

/// Solana implementation of [`ChainAdapter`].
pub struct SolanaAdapter {
    chain: ChainId,
    endpoint: SolanaEndpoint,
    keypair: Keypair,
    payer: Pubkey,
    token: SolanaToken,
}

impl fmt::Debug for SolanaAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SolanaAdapter")
            .field("chain", &self.chain)
            .field("payer", &self.payer)
            .field("token", &self.token)
            .finish_non_exhaustive()
    }
}

impl SolanaAdapter {
    /// Creates an adapter for a token whose mint is already known.
    ///
    /// # Errors
    ///
    /// Returns [`SolanaAdapterError`] when the chain is not a Solana cluster or the
    /// keypair does not decode.
    pub fn new(
        endpoint: SolanaEndpoint,
        credentials: &SignerSecret,
        token: SolanaToken,
    ) -> Result<Self, SolanaAdapterError> {
        let chain = endpoint.chain().clone();
        if chain.kind() != Some(ChainKind::Solana) {
            return Err(SolanaAdapterError::NotSolana(chain.to_string()));
        }
        let keypair = parse_keypair(credentials.expose())?;
        let payer = keypair.pubkey();
        #[cfg(feature = "telemetry")]
        tracing::info!(chain = %chain, payer = %payer, token = ?token, "Solana adapter ready");
        Ok(Self {
            chain,
            endpoint,
            keypair,
            payer,
            token,
        })
    }

    /// Creates an adapter, reading the mint account from the cluster.
    ///
    /// # Errors
    ///
    /// Returns [`SolanaAdapterError`] for malformed mints or when the mint cannot be read.
    pub async fn connect(
        endpoint: SolanaEndpoint,
        credentials: &SignerSecret,
        token: &TokenSpec,
    ) -> Result<Self, SolanaAdapterError> {
        let token = match token {
            TokenSpec::Native => SolanaToken::Native,
            TokenSpec::Fungible(mint) => {
                let mint = Pubkey::from_str(mint)
                    .map_err(|_| SolanaAdapterError::InvalidMint(mint.clone()))?;
                endpoint
                    .fetch_mint(&mint)
                    .await
                    .map_err(|e| SolanaAdapterError::MintMetadata(e.message().to_owned()))?
            }
        };
        Self::new(endpoint, credentials, token)
    }

    /// The token being disbursed.
    #[must_use]
    pub const fn token(&self) -> &SolanaToken {
        &self.token
    }

    /// Compiles and signs `instructions` behind compute-budget instructions.
    fn sign_instructions(
        &self,
        instructions: Vec<Instruction>,
        compute_units: u64,
        fee: &FeeHint,
        window: &ValidityWindow,
    ) -> Result<SignedPayload, SignError> {
        let FeeHint::Priority { micro_lamports } = *fee else {
            return Err(SignError::new("Solana transactions need a priority fee hint"));
        };
        let units = u32::try_from(compute_units)
            .map_err(|_| SignError::new(format!("compute budget {compute_units} exceeds u32")))?;
        let blockhash = Hash::from_str(&window.anchor)
            .map_err(|e| SignError::new(format!("invalid blockhash {}: {e}", window.anchor)))?;

        let mut all = Vec::with_capacity(instructions.len() + 2);
        all.push(ComputeBudgetInstruction::set_compute_unit_limit(units));
        all.push(ComputeBudgetInstruction::set_compute_unit_price(micro_lamports));
        all.extend(instructions);

        let message = MessageV0::try_compile(&self.payer, &all, &[], blockhash)
            .map_err(|e| SignError::new(format!("failed to compile message: {e}")))?;
        let tx = VersionedTransaction::try_new(VersionedMessage::V0(message), &[&self.keypair])
            .map_err(SignError::new)?;
        let signature = tx
            .signatures
            .first()
            .ok_or_else(|| SignError::new("transaction carries no signature"))?;
        let raw = bincode::serialize(&tx).map_err(SignError::new)?;
        Ok(SignedPayload {
            reference: TxRef::new(signature.to_string()),
            raw,
            signer: self.payer.to_string(),
            window: window.clone(),
        })
    }
}

#[async_trait]
impl ChainAdapter for SolanaAdapter {
    type Account = Pubkey;
    type Endpoint = SolanaEndpoint;

    fn chain_id(&self) -> &ChainId {
        &self.chain
    }

    fn kind(&self) -> ChainKind {
        ChainKind::Solana
    }

    fn endpoint(&self) -> &SolanaEndpoint {
        &self.endpoint
    }

    fn signer(&self) -> &Pubkey {
        &self.payer
    }

    fn decimals(&self) -> u8 {
        self.token.decimals()
    }

    fn resolve(&self, address: &str) -> Result<ResolvedTarget<Pubkey>, String> {
        let owner = Pubkey::from_str(address).map_err(|e| format!("{address:?}: {e}"))?;
        match &self.token {
            SolanaToken::Native => Ok(ResolvedTarget::direct(owner)),
            SolanaToken::Spl { mint, program, .. } => {
                if !owner.is_on_curve() {
                    return Err(format!(
                        "{owner} is off-curve and cannot own an associated token account"
                    ));
                }
                Ok(ResolvedTarget {
                    owner,
                    destination: associated_token_address(&owner, mint, program),
                })
            }
        }
    }

    fn check_amount(&self, amount: u128) -> Result<(), String> {
        u64::try_from(amount)
            .map(|_| ())
            .map_err(|_| "exceeds the 64-bit token amount range".to_owned())
    }

    fn requires_preconditions(&self) -> bool {
        matches!(self.token, SolanaToken::Spl { .. })
    }

    fn transfer_limits(&self) -> BatchLimits {
        self.token.transfer_limits()
    }

    fn creation_limits(&self) -> BatchLimits {
        creation_limits()
    }

    async fn sign_creation(
        &self,
        batch: &Batch<Pubkey>,
        fee: &FeeHint,
        window: &ValidityWindow,
    ) -> Result<SignedPayload, SignError> {
        let SolanaToken::Spl { mint, program, .. } = &self.token else {
            return Err(SignError::new("native SOL needs no account creation"));
        };
        let instructions = batch
            .recipients
            .iter()
            .map(|r| create_associated_token_account_idempotent(&self.payer, &r.owner, mint, program))
            .collect();
        self.sign_instructions(instructions, creation_limits().cost(batch.len()), fee, window)
    }

    async fn sign_transfer(
        &self,
        batch: &Batch<Pubkey>,
        fee: &FeeHint,
        window: &ValidityWindow,
    ) -> Result<SignedPayload, SignError> {
        let instructions = batch
            .recipients
            .iter()
            .map(|r| {
                let amount = u64::try_from(r.amount)
                    .map_err(|_| SignError::new(format!("amount {} exceeds u64", r.amount)))?;
                match self.token {
                    SolanaToken::Native => Ok(system_transfer(&self.payer, &r.destination, amount)),
                    SolanaToken::Spl { .. } => {
                        transfer_checked(&self.token, &self.payer, &r.destination, amount)
                    }
                }
            })
            .collect::<Result<Vec<_>, SignError>>()?;
        self.sign_instructions(instructions, self.transfer_limits().cost(batch.len()), fee, window)
    }
}
