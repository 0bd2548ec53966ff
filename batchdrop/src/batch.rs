//! Batch sizing and partitioning.
//!
//! A chain's per-transaction budget is modelled as a linear cost function
//! `f(n) = fixed_overhead + n * per_recipient_cost` that must stay within
//! `hard_limit`. The operator's batch size is a hint; the bound computed from the
//! cost function always wins.

use serde::Serialize;

use crate::resolve::ResolvedRecipient;

/// Per-transaction budget of one transaction type on one chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BatchLimits {
    /// Cost paid once per transaction.
    pub fixed_overhead: u64,
    /// Cost added per recipient.
    pub per_recipient_cost: u64,
    /// Per-transaction ceiling the cost must not exceed.
    pub hard_limit: u64,
    /// Additional count ceiling (packet size, design limits).
    pub max_recipients: Option<usize>,
}

impl BatchLimits {
    /// Creates limits from a cost function with no additional count ceiling.
    #[must_use]
    pub const fn new(fixed_overhead: u64, per_recipient_cost: u64, hard_limit: u64) -> Self {
        Self {
            fixed_overhead,
            per_recipient_cost,
            hard_limit,
            max_recipients: None,
        }
    }

    /// Adds a count ceiling.
    #[must_use]
    pub const fn with_max_recipients(mut self, max: usize) -> Self {
        self.max_recipients = Some(max);
        self
    }

    /// Evaluates the cost function for a batch of `recipients`.
    #[must_use]
    pub const fn cost(&self, recipients: usize) -> u64 {
        self.fixed_overhead
            .saturating_add((recipients as u64).saturating_mul(self.per_recipient_cost))
    }

    /// Largest batch whose cost stays within the hard limit and count ceiling.
    ///
    /// Never less than one: a chain that cannot fit a single recipient rejects
    /// the transaction, which is then reported per recipient.
    #[must_use]
    pub fn max_batch_size(&self) -> usize {
        let by_cost = self
            .hard_limit
            .saturating_sub(self.fixed_overhead)
            .checked_div(self.per_recipient_cost)
            .map_or(usize::MAX, |n| usize::try_from(n).unwrap_or(usize::MAX));
        let bound = self.max_recipients.map_or(by_cost, |max| by_cost.min(max));
        bound.max(1)
    }

    /// Clamps an operator hint (or `default` when absent) to `[1, max_batch_size]`.
    #[must_use]
    pub fn clamp(&self, hint: Option<usize>, default: usize) -> usize {
        hint.unwrap_or(default).clamp(1, self.max_batch_size())
    }
}

/// An ordered group of recipients destined for exactly one transaction.
#[derive(Debug, Clone)]
pub struct Batch<A> {
    /// Position among the batches of the same stage, for diagnostics.
    pub index: usize,
    /// Recipients in input order.
    pub recipients: Vec<ResolvedRecipient<A>>,
}

impl<A> Batch<A> {
    /// Number of recipients in the batch.
    #[must_use]
    pub fn len(&self) -> usize {
        self.recipients.len()
    }

    /// Returns `true` for an empty batch.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.recipients.is_empty()
    }

    /// Sum of the batch's amounts in base units.
    #[must_use]
    pub fn total_amount(&self) -> u128 {
        self.recipients
            .iter()
            .fold(0u128, |acc, r| acc.saturating_add(r.amount))
    }
}

/// Splits recipients into `ceil(n / size)` batches preserving input order.
///
/// A `size` of zero is treated as one.
#[must_use]
pub fn partition<A>(recipients: Vec<ResolvedRecipient<A>>, size: usize) -> Vec<Batch<A>> {
    let size = size.max(1);
    let mut batches = Vec::with_capacity(recipients.len().div_ceil(size));
    let mut current = Vec::with_capacity(size.min(recipients.len()));
    for recipient in recipients {
        current.push(recipient);
        if current.len() == size {
            let index = batches.len();
            batches.push(Batch {
                index,
                recipients: std::mem::take(&mut current),
            });
        }
    }
    if !current.is_empty() {
        let index = batches.len();
        batches.push(Batch {
            index,
            recipients: current,
        });
    }
    batches
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolve::Precondition;

    fn recipients(n: usize) -> Vec<ResolvedRecipient<String>> {
        (0..n)
            .map(|i| ResolvedRecipient {
                index: i,
                address: format!("addr{i}"),
                owner: format!("addr{i}"),
                destination: format!("addr{i}"),
                amount: 1,
                precondition: Precondition::None,
            })
            .collect()
    }

    #[test]
    fn test_333_by_50_gives_seven_batches() {
        let batches = partition(recipients(333), 50);
        let sizes: Vec<usize> = batches.iter().map(Batch::len).collect();
        assert_eq!(sizes, vec![50, 50, 50, 50, 50, 50, 33]);

        let order: Vec<usize> = batches
            .iter()
            .flat_map(|b| b.recipients.iter().map(|r| r.index))
            .collect();
        assert_eq!(order, (0..333).collect::<Vec<_>>());
        let indices: Vec<usize> = batches.iter().map(|b| b.index).collect();
        assert_eq!(indices, (0..7).collect::<Vec<_>>());
    }

    #[test]
    fn test_partition_edges() {
        assert!(partition(recipients(0), 10).is_empty());
        assert_eq!(partition(recipients(3), 0).len(), 3);
        assert_eq!(partition(recipients(10), 10).len(), 1);
    }

    #[test]
    fn test_cost_bound_overrides_hint() {
        // SPL transfers: 50_000 + 30_000 per recipient within 1_400_000 CU.
        let limits = BatchLimits::new(50_000, 30_000, 1_400_000);
        assert_eq!(limits.max_batch_size(), 45);
        assert!(limits.cost(45) <= 1_400_000);
        assert!(limits.cost(46) > 1_400_000);
        assert_eq!(limits.clamp(Some(500), 20), 45);
        assert_eq!(limits.clamp(None, 20), 20);
        assert_eq!(limits.clamp(Some(0), 20), 1);

        let creation = BatchLimits::new(50_000, 45_000, 1_400_000).with_max_recipients(5);
        assert_eq!(creation.max_batch_size(), 5);
    }

    #[test]
    fn test_limit_smaller_than_one_recipient() {
        let limits = BatchLimits::new(100, 50, 120);
        assert_eq!(limits.max_batch_size(), 1);
    }
}
