use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::account::AccountId;
use crate::category::CategoryId;
use crate::error::LedgerError;
use crate::transaction::validate_amount;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecurringRuleId(pub i64);

impl fmt::Display for RecurringRuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Frequency {
    Daily,
    Weekly,
    Monthly,
    Yearly,
}

impl Frequency {
    pub fn as_str(self) -> &'static str {
        match self {
            Frequency::Daily => "daily",
            Frequency::Weekly => "weekly",
            Frequency::Monthly => "monthly",
            Frequency::Yearly => "yearly",
        }
    }

    /// Converts a per-occurrence amount into its monthly equivalent, rounded to the cent.
    pub fn monthly_equivalent(self, amount_cents: i64) -> i64 {
        let (num, den) = match self {
            Frequency::Daily => (365, 12),
            Frequency::Weekly => (52, 12),
            Frequency::Monthly => (1, 1),
            Frequency::Yearly => (1, 12),
        };
        div_round(amount_cents * num, den)
    }
}

fn div_round(n: i64, d: i64) -> i64 {
    let q = n / d;
    let r = n % d;
    if r.abs() * 2 >= d {
        q + n.signum()
    } else {
        q
    }
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Frequency {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "daily" => Ok(Frequency::Daily),
            "weekly" => Ok(Frequency::Weekly),
            "monthly" => Ok(Frequency::Monthly),
            "yearly" => Ok(Frequency::Yearly),
            other => Err(LedgerError::UnknownFrequency(other.to_string())),
        }
    }
}

/// A subscription-like charge. `next_date` is advanced by the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecurringRule {
    pub id: RecurringRuleId,
    pub account_id: AccountId,
    pub category_id: Option<CategoryId>,
    pub name: String,
    pub amount_cents: i64,
    pub currency: String,
    pub frequency: Frequency,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    pub next_date: NaiveDate,
    pub day_of_month: Option<u32>,
    pub is_active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewRecurringRule {
    pub account_id: AccountId,
    pub name: String,
    pub amount_cents: i64,
    pub frequency: Frequency,
    pub start_date: NaiveDate,
    pub category_id: Option<CategoryId>,
    pub day_of_month: Option<u32>,
    pub end_date: Option<NaiveDate>,
}

impl NewRecurringRule {
    pub fn validate(&self) -> Result<(), LedgerError> {
        if self.name.trim().is_empty() {
            return Err(LedgerError::validation("recurring rule name is required"));
        }
        validate_amount(self.amount_cents)?;
        validate_day_of_month(self.day_of_month)?;
        if let Some(end) = self.end_date {
            if end < self.start_date {
                return Err(LedgerError::validation("end date precedes start date"));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecurringRuleUpdate {
    pub name: Option<String>,
    pub amount_cents: Option<i64>,
    pub frequency: Option<Frequency>,
    pub category_id: Option<CategoryId>,
    pub day_of_month: Option<u32>,
    pub next_date: Option<NaiveDate>,
}

impl RecurringRuleUpdate {
    pub fn validate(&self) -> Result<(), LedgerError> {
        if let Some(name) = &self.name {
            if name.trim().is_empty() {
                return Err(LedgerError::validation("recurring rule name is required"));
            }
        }
        if let Some(amount) = self.amount_cents {
            validate_amount(amount)?;
        }
        validate_day_of_month(self.day_of_month)
    }
}

fn validate_day_of_month(day: Option<u32>) -> Result<(), LedgerError> {
    match day {
        Some(d) if !(1..=31).contains(&d) => Err(LedgerError::validation(format!(
            "day of month must be within 1..=31, got {d}"
        ))),
        _ => Ok(()),
    }
}
