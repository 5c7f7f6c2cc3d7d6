use std::collections::HashMap;

use ledgerly_core::Transaction;
use serde::{Deserialize, Serialize};

use crate::util::candidate_pattern;

pub const DEFAULT_RECOMMENDATION_LIMIT: usize = 20;
const MIN_OCCURRENCES: usize = 2;
const MAX_EXAMPLES: usize = 3;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recommendation {
    /// Case-folded candidate pattern, ready to become a `contains` rule.
    pub pattern: String,
    pub count: usize,
    pub total_cents: i64,
    pub examples: Vec<String>,
}

/// Suggests rule patterns from recurring text among uncategorized transactions.
pub fn recommend(transactions: &[Transaction], limit: usize) -> Vec<Recommendation> {
    let mut groups: HashMap<String, Recommendation> = HashMap::new();

    for tx in transactions.iter().filter(|tx| tx.category_id.is_none()) {
        let source = tx
            .merchant
            .as_deref()
            .filter(|m| !m.trim().is_empty())
            .unwrap_or(&tx.description);
        let key = candidate_pattern(source).to_lowercase();
        if key.is_empty() {
            continue;
        }

        let entry = groups.entry(key.clone()).or_insert_with(|| Recommendation {
            pattern: key,
            count: 0,
            total_cents: 0,
            examples: Vec::new(),
        });
        entry.count += 1;
        entry.total_cents += tx.amount_cents;
        if entry.examples.len() < MAX_EXAMPLES && !entry.examples.contains(&tx.description) {
            entry.examples.push(tx.description.clone());
        }
    }

    let mut out: Vec<Recommendation> = groups
        .into_values()
        .filter(|r| r.count >= MIN_OCCURRENCES)
        .collect();
    out.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.pattern.cmp(&b.pattern)));
    out.truncate(limit);
    out
}
