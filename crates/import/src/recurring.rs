//! Subscription-like charge detection.
//!
//! Charges are grouped per account by a normalized merchant key. A group is
//! suggested when it has enough occurrences, its median gap falls in one of
//! the cadence bands below, and the gaps are regular (coefficient of
//! variation at or under `max_gap_cv`).
//!
//! | cadence | median gap (days) |
//! |---------|-------------------|
//! | weekly  | 7 ± 3             |
//! | monthly | 30/31 ± 5 (25..=36) |
//! | yearly  | 365 ± 15          |
//!
//! `confidence = 0.7 * (1 - cv) + 0.3 * min(occurrences / 6, 1)`, rounded to
//! two decimals.

use std::collections::HashMap;

use chrono::NaiveDate;
use ledgerly_core::{AccountId, Frequency, Transaction, MAX_AMOUNT_CENTS};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::util::merchant_key;

const WEEKLY_BAND: (f64, f64) = (4.0, 10.0);
const MONTHLY_BAND: (f64, f64) = (25.0, 36.0);
const YEARLY_BAND: (f64, f64) = (350.0, 380.0);
const SATURATING_OCCURRENCES: f64 = 6.0;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecurringConfig {
    pub min_occurrences: usize,
    pub max_gap_cv: f64,
}

impl Default for RecurringConfig {
    fn default() -> Self {
        Self {
            min_occurrences: 3,
            max_gap_cv: 0.25,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscriptionSuggestion {
    /// Merchant text of the most recent occurrence.
    pub merchant: String,
    pub account_id: AccountId,
    /// Mean absolute charge, rounded to the cent.
    pub avg_amount_cents: i64,
    pub currency: String,
    pub frequency: Frequency,
    pub confidence: f64,
    pub occurrences: usize,
    pub last_date: NaiveDate,
}

pub struct SubscriptionDetector {
    config: RecurringConfig,
}

impl Default for SubscriptionDetector {
    fn default() -> Self {
        Self::new(RecurringConfig::default())
    }
}

impl SubscriptionDetector {
    pub fn new(config: RecurringConfig) -> Self {
        Self { config }
    }

    /// Only outgoing, non-transfer transactions within `MAX_AMOUNT_CENTS` are considered.
    pub fn detect(&self, transactions: &[Transaction]) -> Vec<SubscriptionSuggestion> {
        let mut groups: HashMap<(AccountId, String), Vec<&Transaction>> = HashMap::new();
        for tx in transactions
            .iter()
            .filter(|tx| {
                tx.amount_cents < 0
                    && !tx.is_transfer
                    && tx.amount_cents.unsigned_abs() <= MAX_AMOUNT_CENTS.unsigned_abs()
            })
        {
            let key = merchant_key(source_text(tx));
            if key.is_empty() {
                continue;
            }
            groups.entry((tx.account_id, key)).or_default().push(tx);
        }

        let mut out: Vec<SubscriptionSuggestion> = groups
            .into_iter()
            .filter_map(|((account_id, key), mut group)| {
                let suggestion = self.evaluate_group(account_id, &mut group);
                if suggestion.is_none() {
                    debug!(%account_id, key = %key, occurrences = group.len(), "group is not recurring");
                }
                suggestion
            })
            .collect();

        out.sort_by(|a, b| {
            b.confidence
                .partial_cmp(&a.confidence)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| b.occurrences.cmp(&a.occurrences))
                .then_with(|| a.merchant.cmp(&b.merchant))
        });
        out
    }

    fn evaluate_group(
        &self,
        account_id: AccountId,
        group: &mut [&Transaction],
    ) -> Option<SubscriptionSuggestion> {
        if group.len() < self.config.min_occurrences.max(2) {
            return None;
        }
        group.sort_by_key(|tx| (tx.date, tx.id));

        let gaps: Vec<f64> = group
            .windows(2)
            .map(|w| (w[1].date - w[0].date).num_days() as f64)
            .collect();
        let frequency = classify(median(&gaps))?;

        let cv = coefficient_of_variation(&gaps)?;
        if cv > self.config.max_gap_cv {
            return None;
        }

        let n = group.len();
        let regularity = (1.0 - cv).clamp(0.0, 1.0);
        let volume = (n as f64 / SATURATING_OCCURRENCES).min(1.0);
        let confidence = ((0.7 * regularity + 0.3 * volume) * 100.0).round() / 100.0;

        let total_abs: i128 = group.iter().map(|tx| i128::from(tx.amount_cents.unsigned_abs())).sum();
        let n_i128 = n as i128;
        let avg_amount_cents = i64::try_from((total_abs + n_i128 / 2) / n_i128).ok()?;

        let latest = group.last()?;
        Some(SubscriptionSuggestion {
            merchant: source_text(latest).trim().to_string(),
            account_id,
            avg_amount_cents,
            currency: latest.currency.clone(),
            frequency,
            confidence,
            occurrences: n,
            last_date: latest.date,
        })
    }
}

fn source_text(tx: &Transaction) -> &str {
    tx.merchant
        .as_deref()
        .filter(|m| !m.trim().is_empty())
        .unwrap_or(&tx.description)
}

fn classify(median_gap: f64) -> Option<Frequency> {
    let within = |(lo, hi): (f64, f64)| median_gap >= lo && median_gap <= hi;
    if within(WEEKLY_BAND) {
        Some(Frequency::Weekly)
    } else if within(MONTHLY_BAND) {
        Some(Frequency::Monthly)
    } else if within(YEARLY_BAND) {
        Some(Frequency::Yearly)
    } else {
        None
    }
}

fn median(values: &[f64]) -> f64 {
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let n = sorted.len();
    match n {
        0 => 0.0,
        _ if n % 2 == 1 => sorted[n / 2],
        _ => (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0,
    }
}

/// Population standard deviation over the mean; `None` when the mean is zero.
fn coefficient_of_variation(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    if mean <= 0.0 {
        return None;
    }
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    Some(variance.sqrt() / mean)
}
