use ledgerly_core::{match_text, CategoryId, CategoryRule, RuleMatchType, Transaction, TransactionId};
use regex::{Regex, RegexBuilder};
use tracing::{debug, warn};

/// Internal pairing of a rule with its precompiled regex (if applicable).
struct CompiledRule {
    rule: CategoryRule,
    compiled_regex: Option<Regex>,
}

impl CompiledRule {
    fn compile(rule: CategoryRule) -> Self {
        let compiled_regex = if rule.match_type == RuleMatchType::Regex {
            match RegexBuilder::new(&rule.pattern)
                .case_insensitive(!rule.case_sensitive)
                .build()
            {
                Ok(re) => Some(re),
                Err(e) => {
                    warn!(rule_id = %rule.id, pattern = %rule.pattern, "invalid regex in category rule: {e}");
                    None
                }
            }
        } else {
            None
        };
        CompiledRule { rule, compiled_regex }
    }

    /// A rule whose regex failed to compile never matches.
    fn try_match(&self, text: &str) -> bool {
        let rule = &self.rule;
        if rule.match_type == RuleMatchType::Regex {
            return self
                .compiled_regex
                .as_ref()
                .is_some_and(|re| re.is_match(text));
        }

        let (haystack, needle) = if rule.case_sensitive {
            (text.to_string(), rule.pattern.clone())
        } else {
            (text.to_lowercase(), rule.pattern.to_lowercase())
        };

        match rule.match_type {
            RuleMatchType::Exact => haystack == needle,
            RuleMatchType::StartsWith => haystack.starts_with(&needle),
            RuleMatchType::Contains => haystack.contains(&needle),
            RuleMatchType::Regex => false,
        }
    }
}

/// Priority-ordered, first-match-wins categorizer.
pub struct CategoryRuleEngine {
    rules: Vec<CompiledRule>,
}

impl CategoryRuleEngine {
    /// Inactive rules are dropped. Ties on priority keep their input order.
    pub fn new(rules: Vec<CategoryRule>) -> Self {
        let mut compiled: Vec<CompiledRule> = rules
            .into_iter()
            .filter(|rule| rule.is_active)
            .map(CompiledRule::compile)
            .collect();
        // Highest priority first; sort_by is stable.
        compiled.sort_by(|a, b| b.rule.priority.cmp(&a.rule.priority));
        Self { rules: compiled }
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn find_matching_rule(&self, text: &str) -> Option<&CategoryRule> {
        self.rules
            .iter()
            .find(|cr| cr.try_match(text))
            .map(|cr| &cr.rule)
    }

    pub fn match_category(&self, description: &str, merchant: Option<&str>) -> Option<CategoryId> {
        let text = match_text(description, merchant);
        let rule = self.find_matching_rule(&text)?;
        debug!(rule_id = %rule.id, category_id = %rule.category_id, "rule matched '{text}'");
        Some(rule.category_id)
    }

    /// Assignments for every uncategorized transaction that some rule matches.
    /// Already-categorized transactions are left alone.
    pub fn apply_rules(&self, transactions: &[Transaction]) -> Vec<(TransactionId, CategoryId)> {
        transactions
            .iter()
            .filter(|tx| tx.category_id.is_none())
            .filter_map(|tx| {
                self.match_category(&tx.description, tx.merchant.as_deref())
                    .map(|category| (tx.id, category))
            })
            .collect()
    }
}
