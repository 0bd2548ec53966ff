//! Token programs, instruction builders and compute budgets.
//!
//! Native SOL moves with system transfers; SPL tokens (Token and Token-2022) move
//! with `TransferChecked` between associated token accounts.

use batchdrop::adapter::CREATION_BATCH_CEILING;
use batchdrop::batch::BatchLimits;
use batchdrop::error::SignError;
use solana_instruction::{AccountMeta, Instruction};
use solana_pubkey::{Pubkey, pubkey};
use spl_token::solana_program::program_pack::Pack;
use spl_token_2022::extension::StateWithExtensions;

/// Associated Token Account program.
pub const ATA_PROGRAM_ID: Pubkey = pubkey!("ATokenGPvbdGVxr1b2hvZbsiqW5xWH25efTNsLJA8knL");

/// System program.
pub const SYSTEM_PROGRAM_ID: Pubkey = pubkey!("11111111111111111111111111111111");

/// Decimals of native SOL.
pub const SOL_DECIMALS: u8 = 9;

/// Maximum serialized transaction size.
pub const PACKET_DATA_SIZE: usize = 1232;

/// Per-transaction compute ceiling.
pub const MAX_COMPUTE_UNITS: u64 = 1_400_000;

const SYSTEM_TRANSFER_TAG: u32 = 2;
const CREATE_IDEMPOTENT_TAG: u8 = 1;

/// Recipients that fit in one packet given the serialized size of a transaction's
/// fixed part and of each recipient's accounts and instruction.
const fn packet_capacity(fixed_bytes: usize, per_recipient_bytes: usize) -> usize {
    (PACKET_DATA_SIZE - fixed_bytes) / per_recipient_bytes
}

/// The token being disbursed on a Solana cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolanaToken {
    /// Native SOL, in lamports.
    Native,
    /// An SPL mint.
    Spl {
        /// Mint account.
        mint: Pubkey,
        /// Mint decimals.
        decimals: u8,
        /// Owning token program (Token or Token-2022).
        program: Pubkey,
    },
}

impl SolanaToken {
    /// Decimals of the token.
    #[must_use]
    pub const fn decimals(&self) -> u8 {
        match self {
            Self::Native => SOL_DECIMALS,
            Self::Spl { decimals, .. } => *decimals,
        }
    }

    /// Decodes a mint account owned by `owner`.
    ///
    /// # Errors
    ///
    /// Returns a reason when the owner is not a token program or the data is not a mint.
    pub fn from_mint_account(mint: Pubkey, owner: &Pubkey, data: &[u8]) -> Result<Self, String> {
        let decimals = if *owner == spl_token::id() {
            spl_token::state::Mint::unpack(data)
                .map_err(|e| format!("failed to unpack mint {mint}: {e}"))?
                .decimals
        } else if *owner == spl_token_2022::id() {
            StateWithExtensions::<spl_token_2022::state::Mint>::unpack(data)
                .map_err(|e| format!("failed to unpack mint {mint}: {e}"))?
                .base
                .decimals
        } else {
            return Err(format!("{mint} is not owned by a token program"));
        };
        Ok(Self::Spl {
            mint,
            decimals,
            program: *owner,
        })
    }

    /// Compute budget of one transfer transaction.
    #[must_use]
    pub const fn transfer_limits(&self) -> BatchLimits {
        match self {
            Self::Native => BatchLimits::new(20_000, 1_000, 400_000)
                .with_max_recipients(packet_capacity(221, 49)),
            Self::Spl { .. } => BatchLimits::new(50_000, 30_000, MAX_COMPUTE_UNITS)
                .with_max_recipients(packet_capacity(285, 49)),
        }
    }
}

/// Compute budget of one account-creation transaction.
#[must_use]
pub const fn creation_limits() -> BatchLimits {
    let by_packet = packet_capacity(317, 74);
    let max = if by_packet < CREATION_BATCH_CEILING {
        by_packet
    } else {
        CREATION_BATCH_CEILING
    };
    BatchLimits::new(50_000, 45_000, MAX_COMPUTE_UNITS).with_max_recipients(max)
}

/// Derives the associated token account of `owner` for `mint`.
#[must_use]
pub fn associated_token_address(owner: &Pubkey, mint: &Pubkey, program: &Pubkey) -> Pubkey {
    let (ata, _) = Pubkey::find_program_address(
        &[owner.as_ref(), program.as_ref(), mint.as_ref()],
        &ATA_PROGRAM_ID,
    );
    ata
}

/// Creates `owner`'s associated token account unless it already exists.
///
/// Succeeds on an existing account, so re-signed creation attempts cannot fail
/// on accounts an earlier attempt created.
#[must_use]
pub fn create_associated_token_account_idempotent(
    payer: &Pubkey,
    owner: &Pubkey,
    mint: &Pubkey,
    program: &Pubkey,
) -> Instruction {
    let ata = associated_token_address(owner, mint, program);
    Instruction {
        program_id: ATA_PROGRAM_ID,
        accounts: vec![
            AccountMeta::new(*payer, true),
            AccountMeta::new(ata, false),
            AccountMeta::new_readonly(*owner, false),
            AccountMeta::new_readonly(*mint, false),
            AccountMeta::new_readonly(SYSTEM_PROGRAM_ID, false),
            AccountMeta::new_readonly(*program, false),
        ],
        data: vec![CREATE_IDEMPOTENT_TAG],
    }
}

/// Moves `lamports` from `from` to `to`.
#[must_use]
pub fn system_transfer(from: &Pubkey, to: &Pubkey, lamports: u64) -> Instruction {
    let mut data = Vec::with_capacity(12);
    data.extend_from_slice(&SYSTEM_TRANSFER_TAG.to_le_bytes());
    data.extend_from_slice(&lamports.to_le_bytes());
    Instruction {
        program_id: SYSTEM_PROGRAM_ID,
        accounts: vec![AccountMeta::new(*from, true), AccountMeta::new(*to, false)],
        data,
    }
}

/// `TransferChecked` from the authority's associated account to `destination`.
///
/// # Errors
///
/// Returns [`SignError`] for native SOL or when the token program rejects the arguments.
pub fn transfer_checked(
    token: &SolanaToken,
    authority: &Pubkey,
    destination: &Pubkey,
    amount: u64,
) -> Result<Instruction, SignError> {
    let SolanaToken::Spl {
        mint,
        decimals,
        program,
    } = token
    else {
        return Err(SignError::new("native SOL has no token transfer"));
    };
    let source = associated_token_address(authority, mint, program);
    let instruction = if *program == spl_token_2022::id() {
        spl_token_2022::instruction::transfer_checked(
            program,
            &source,
            mint,
            destination,
            authority,
            &[],
            amount,
            *decimals,
        )
    } else {
        spl_token::instruction::transfer_checked(
            program,
            &source,
            mint,
            destination,
            authority,
            &[],
            amount,
            *decimals,
        )
    };
    instruction.map_err(SignError::new)
}
