//! Address resolution stage.
//!
//! Each recipient line is turned into a [`ResolvedRecipient`] or a [`Rejection`].
//! Resolution is pure: derivation happens in the adapter without network calls,
//! and a rejected line never reaches a later stage.

use serde::Serialize;

use crate::adapter::ChainAdapter;
use crate::amount::parse_units;
use crate::request::RecipientLine;

/// Account-existence state of a recipient's destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Precondition {
    /// Nothing to create (exists already, or the chain has no such notion).
    None,
    /// The destination account is missing and must be created first.
    Required,
    /// The destination account was created during this disbursement.
    Created,
}

/// Output of chain-specific address derivation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedTarget<A> {
    /// The recipient's own account.
    pub owner: A,
    /// The account a transfer instruction must credit.
    pub destination: A,
}

impl<A: Clone> ResolvedTarget<A> {
    /// A target whose destination is the owner itself.
    pub fn direct(owner: A) -> Self {
        Self {
            destination: owner.clone(),
            owner,
        }
    }
}

/// A recipient line that passed resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedRecipient<A> {
    /// Position of the line in the request.
    pub index: usize,
    /// The address exactly as supplied.
    pub address: String,
    /// Parsed owner account.
    pub owner: A,
    /// Account credited by the transfer.
    pub destination: A,
    /// Amount in base units.
    pub amount: u128,
    /// Destination account state.
    pub precondition: Precondition,
}

/// A recipient line that failed resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    /// Position of the line in the request.
    pub index: usize,
    /// The reason reported on the outcome.
    pub reason: String,
}

/// Result of resolving a whole request.
#[derive(Debug, Clone)]
pub struct Resolution<A> {
    /// Recipients eligible for the later stages, in input order.
    pub resolved: Vec<ResolvedRecipient<A>>,
    /// Recipients routed straight to a failed outcome.
    pub rejected: Vec<Rejection>,
}

/// Resolves every line of a request against an adapter.
pub fn resolve_all<C>(adapter: &C, lines: &[RecipientLine]) -> Resolution<C::Account>
where
    C: ChainAdapter + ?Sized,
{
    let mut resolved = Vec::with_capacity(lines.len());
    let mut rejected = Vec::new();
    for (index, line) in lines.iter().enumerate() {
        match resolve_line(adapter, index, line) {
            Ok(recipient) => resolved.push(recipient),
            Err(reason) => {
                #[cfg(feature = "telemetry")]
                tracing::debug!(index, address = %line.address, %reason, "Recipient rejected");
                rejected.push(Rejection { index, reason });
            }
        }
    }
    Resolution { resolved, rejected }
}

fn resolve_line<C>(
    adapter: &C,
    index: usize,
    line: &RecipientLine,
) -> Result<ResolvedRecipient<C::Account>, String>
where
    C: ChainAdapter + ?Sized,
{
    let target = adapter
        .resolve(line.address.trim())
        .map_err(|e| format!("invalid address: {e}"))?;
    let amount = parse_units(&line.amount, adapter.decimals()).map_err(|e| e.to_string())?;
    adapter
        .check_amount(amount)
        .map_err(|e| format!("invalid amount {}: {e}", line.amount.trim()))?;
    Ok(ResolvedRecipient {
        index,
        address: line.address.clone(),
        owner: target.owner,
        destination: target.destination,
        amount,
        precondition: Precondition::None,
    })
}
