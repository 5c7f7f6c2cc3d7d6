use std::collections::{HashMap, HashSet};

use ledgerly_core::{Transaction, TransactionId};
use serde::{Deserialize, Serialize};
use tracing::debug;

pub const DEFAULT_TRANSFER_WINDOW_DAYS: i64 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferConfidence {
    High,
    Medium,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferPair {
    pub outgoing: Transaction,
    pub incoming: Transaction,
    pub confidence: TransferConfidence,
    pub days_apart: i64,
}

/// Pairs outgoing and incoming transactions across accounts.
///
/// A candidate pair has different accounts, the same currency, opposite
/// signs, identical absolute amounts and dates at most `window_days` apart.
/// Candidates are assigned greedily, closest dates first, and a transaction
/// is never used twice. Only a same-day pair whose two sides had no other
/// candidate is reported as [`TransferConfidence::High`].
pub struct TransferDetector {
    pub window_days: i64,
    ignored: HashSet<(TransactionId, TransactionId)>,
}

impl Default for TransferDetector {
    fn default() -> Self {
        Self::new(DEFAULT_TRANSFER_WINDOW_DAYS)
    }
}

struct Candidate<'a> {
    outgoing: &'a Transaction,
    incoming: &'a Transaction,
    days_apart: i64,
}

impl TransferDetector {
    pub fn new(window_days: i64) -> Self {
        Self {
            window_days: window_days.max(0),
            ignored: HashSet::new(),
        }
    }

    /// Pairs (outgoing, incoming) that must never be proposed.
    pub fn with_ignored(
        mut self,
        ignored: impl IntoIterator<Item = (TransactionId, TransactionId)>,
    ) -> Self {
        self.ignored.extend(ignored);
        self
    }

    pub fn find_probable_transfers(&self, transactions: &[Transaction]) -> Vec<TransferPair> {
        let (outgoing, incoming): (Vec<&Transaction>, Vec<&Transaction>) = transactions
            .iter()
            .filter(|tx| !tx.is_transfer && tx.amount_cents != 0)
            .partition(|tx| tx.amount_cents < 0);

        let mut by_amount: HashMap<(i64, &str), Vec<&Transaction>> = HashMap::new();
        for inc in incoming {
            by_amount
                .entry((inc.amount_cents, inc.currency.as_str()))
                .or_default()
                .push(inc);
        }

        let mut candidates = Vec::new();
        for out in outgoing {
            let Some(amount) = out.amount_cents.checked_neg() else {
                continue;
            };
            let key = (amount, out.currency.as_str());
            let Some(matches) = by_amount.get(&key) else {
                continue;
            };
            for inc in matches {
                if let Some(c) = self.score_pair(out, inc) {
                    candidates.push(c);
                }
            }
        }

        let mut degree: HashMap<TransactionId, usize> = HashMap::new();
        for c in &candidates {
            *degree.entry(c.outgoing.id).or_default() += 1;
            *degree.entry(c.incoming.id).or_default() += 1;
        }

        candidates.sort_by_key(|c| (c.days_apart, c.outgoing.date, c.outgoing.id, c.incoming.id));

        let mut used: HashSet<TransactionId> = HashSet::new();
        let mut pairs = Vec::new();
        for c in candidates {
            if used.contains(&c.outgoing.id) || used.contains(&c.incoming.id) {
                continue;
            }
            used.insert(c.outgoing.id);
            used.insert(c.incoming.id);

            let unambiguous = degree.get(&c.outgoing.id) == Some(&1)
                && degree.get(&c.incoming.id) == Some(&1);
            let confidence = if c.days_apart == 0 && unambiguous {
                TransferConfidence::High
            } else {
                TransferConfidence::Medium
            };
            debug!(
                outgoing = %c.outgoing.id,
                incoming = %c.incoming.id,
                days_apart = c.days_apart,
                ?confidence,
                "probable transfer"
            );
            pairs.push(TransferPair {
                outgoing: c.outgoing.clone(),
                incoming: c.incoming.clone(),
                confidence,
                days_apart: c.days_apart,
            });
        }
        pairs
    }

    fn score_pair<'a>(
        &self,
        out: &'a Transaction,
        inc: &'a Transaction,
    ) -> Option<Candidate<'a>> {
        if out.account_id == inc.account_id || out.id == inc.id {
            return None;
        }
        if self.ignored.contains(&(out.id, inc.id)) {
            return None;
        }
        let days_apart = (inc.date - out.date).num_days().abs();
        if days_apart > self.window_days {
            return None;
        }
        Some(Candidate {
            outgoing: out,
            incoming: inc,
            days_apart,
        })
    }
}
