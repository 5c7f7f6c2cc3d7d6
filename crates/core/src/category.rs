use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::LedgerError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CategoryId(pub i64);

impl fmt::Display for CategoryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RuleId(pub i64);

impl fmt::Display for RuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
    pub id: CategoryId,
    pub name: String,
    pub icon: Option<String>,
    pub color: Option<String>,
    pub is_income: bool,
    pub parent_id: Option<CategoryId>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewCategory {
    pub name: String,
    pub icon: Option<String>,
    pub color: Option<String>,
    #[serde(default)]
    pub is_income: bool,
    pub parent_id: Option<CategoryId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleMatchType {
    #[default]
    Contains,
    StartsWith,
    Exact,
    Regex,
}

impl RuleMatchType {
    pub fn as_str(self) -> &'static str {
        match self {
            RuleMatchType::Contains => "contains",
            RuleMatchType::StartsWith => "starts_with",
            RuleMatchType::Exact => "exact",
            RuleMatchType::Regex => "regex",
        }
    }
}

impl fmt::Display for RuleMatchType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RuleMatchType {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "contains" => Ok(RuleMatchType::Contains),
            "starts_with" => Ok(RuleMatchType::StartsWith),
            "exact" => Ok(RuleMatchType::Exact),
            "regex" => Ok(RuleMatchType::Regex),
            other => Err(LedgerError::UnknownMatchType(other.to_string())),
        }
    }
}

/// A stored categorization rule. Higher `priority` is evaluated first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryRule {
    pub id: RuleId,
    pub category_id: CategoryId,
    pub pattern: String,
    pub match_type: RuleMatchType,
    pub case_sensitive: bool,
    pub priority: i64,
    pub is_active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewCategoryRule {
    pub pattern: String,
    pub category_id: CategoryId,
    #[serde(default)]
    pub match_type: RuleMatchType,
    #[serde(default)]
    pub case_sensitive: bool,
    #[serde(default)]
    pub priority: i64,
}

impl NewCategoryRule {
    pub fn new(pattern: &str, category_id: CategoryId, match_type: RuleMatchType) -> Self {
        NewCategoryRule {
            pattern: pattern.to_string(),
            category_id,
            match_type,
            case_sensitive: false,
            priority: 0,
        }
    }

    pub fn with_priority(mut self, priority: i64) -> Self {
        self.priority = priority;
        self
    }

    /// Malformed regex patterns are accepted here; they simply never match.
    pub fn validate(&self) -> Result<(), LedgerError> {
        if self.pattern.trim().is_empty() {
            return Err(LedgerError::validation("rule pattern is required"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuleUpdate {
    pub pattern: Option<String>,
    pub category_id: Option<CategoryId>,
    pub match_type: Option<RuleMatchType>,
    pub case_sensitive: Option<bool>,
    pub priority: Option<i64>,
    pub is_active: Option<bool>,
}

// (name, icon, color, is_income)
pub const DEFAULT_CATEGORIES: &[(&str, &str, &str, bool)] = &[
    ("Income", "💰", "#10B981", true),
    ("Salary", "💵", "#10B981", true),
    ("Freelance", "💻", "#10B981", true),
    ("Investments", "📈", "#10B981", true),
    ("Housing", "🏠", "#6366F1", false),
    ("Rent/Mortgage", "🔑", "#6366F1", false),
    ("Utilities", "💡", "#6366F1", false),
    ("Transportation", "🚗", "#F59E0B", false),
    ("Food & Dining", "🍽️", "#EF4444", false),
    ("Groceries", "🛒", "#EF4444", false),
    ("Restaurants", "🍜", "#EF4444", false),
    ("Shopping", "🛍️", "#EC4899", false),
    ("Entertainment", "🎬", "#8B5CF6", false),
    ("Subscriptions", "📱", "#8B5CF6", false),
    ("Health", "🏥", "#14B8A6", false),
    ("Education", "📚", "#0EA5E9", false),
    ("Travel", "✈️", "#F97316", false),
    ("Personal Care", "💅", "#D946EF", false),
    ("Gifts", "🎁", "#F43F5E", false),
    ("Other", "📋", "#6B7280", false),
];
