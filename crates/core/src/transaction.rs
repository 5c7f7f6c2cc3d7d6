use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::account::{validate_currency, AccountId};
use crate::category::CategoryId;
use crate::error::LedgerError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TransactionId(pub i64);

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ImportBatchId(pub i64);

impl fmt::Display for ImportBatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Largest absolute amount accepted anywhere in the ledger (10 trillion major units).
pub const MAX_AMOUNT_CENTS: i64 = 1_000_000_000_000_000;

/// Rejects zero and anything beyond `MAX_AMOUNT_CENTS`.
pub fn validate_amount(amount_cents: i64) -> Result<(), LedgerError> {
    if amount_cents == 0 {
        return Err(LedgerError::ZeroAmount);
    }
    if amount_cents.unsigned_abs() > MAX_AMOUNT_CENTS.unsigned_abs() {
        return Err(LedgerError::AmountOutOfRange(amount_cents));
    }
    Ok(())
}

/// A ledger entry. `amount_cents` is signed: positive is income, negative is expense.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TransactionId,
    pub account_id: AccountId,
    pub category_id: Option<CategoryId>,
    pub date: NaiveDate,
    pub amount_cents: i64,
    pub currency: String,
    pub description: String,
    pub merchant: Option<String>,
    pub notes: Option<String>,
    pub external_id: Option<String>,
    pub import_batch_id: Option<ImportBatchId>,
    pub is_transfer: bool,
    pub linked_transaction_id: Option<TransactionId>,
}

/// Description and merchant joined by a single space, trimmed.
pub fn match_text(description: &str, merchant: Option<&str>) -> String {
    format!("{} {}", description, merchant.unwrap_or_default())
        .trim()
        .to_string()
}

/// Manual entry, before validation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewTransaction {
    pub account_id: AccountId,
    pub date: NaiveDate,
    pub amount_cents: i64,
    pub description: String,
    pub merchant: Option<String>,
    pub category_id: Option<CategoryId>,
    pub notes: Option<String>,
    pub currency: Option<String>,
}

impl NewTransaction {
    pub fn new(account_id: AccountId, date: NaiveDate, amount_cents: i64, description: &str) -> Self {
        NewTransaction {
            account_id,
            date,
            amount_cents,
            description: description.to_string(),
            merchant: None,
            category_id: None,
            notes: None,
            currency: None,
        }
    }

    pub fn validate(&self) -> Result<(), LedgerError> {
        if self.description.trim().is_empty() {
            return Err(LedgerError::validation("description is required"));
        }
        validate_amount(self.amount_cents)?;
        if let Some(currency) = &self.currency {
            validate_currency(currency)?;
        }
        Ok(())
    }
}

/// One parsed CSV row handed to the import deduplicator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportRow {
    pub account_id: AccountId,
    pub date: NaiveDate,
    pub amount_cents: i64,
    pub description: String,
    pub merchant: Option<String>,
    pub currency: Option<String>,
    /// Content hash supplied by the caller. Rows without one are always imported.
    pub external_id: Option<String>,
}

/// An import row that passed validation. Zero-amount rows never become one.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedImportRow {
    pub account_id: AccountId,
    pub date: NaiveDate,
    pub amount_cents: i64,
    pub description: String,
    pub merchant: Option<String>,
    pub currency: Option<String>,
    pub external_id: Option<String>,
}

impl ImportRow {
    /// Returns `Ok(None)` for zero-amount rows, which are dropped rather than rejected.
    pub fn validate(self) -> Result<Option<ValidatedImportRow>, LedgerError> {
        if self.description.trim().is_empty() {
            return Err(LedgerError::validation(format!(
                "row dated {} has no description",
                self.date
            )));
        }
        if let Some(currency) = &self.currency {
            validate_currency(currency)?;
        }
        if self.amount_cents == 0 {
            return Ok(None);
        }
        validate_amount(self.amount_cents)?;
        let external_id = self
            .external_id
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty());
        Ok(Some(ValidatedImportRow {
            account_id: self.account_id,
            date: self.date,
            amount_cents: self.amount_cents,
            description: self.description.trim().to_string(),
            merchant: self.merchant.filter(|m| !m.trim().is_empty()),
            currency: self.currency,
            external_id,
        }))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportOptions {
    /// Historical import: adjust opening balances and leave current balances untouched.
    #[serde(default)]
    pub preserve_balance: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportBatch {
    pub id: ImportBatchId,
    pub account_id: AccountId,
    pub filename: Option<String>,
    pub transaction_count: i64,
    pub total_amount_cents: i64,
    pub preserve_balance: bool,
    pub imported_at: NaiveDateTime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportOutcome {
    pub imported: usize,
    pub skipped: usize,
    pub batch_id: Option<ImportBatchId>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn row(amount: i64, description: &str) -> ImportRow {
        ImportRow {
            account_id: AccountId(1),
            date: date(2024, 1, 1),
            amount_cents: amount,
            description: description.to_string(),
            merchant: None,
            currency: None,
            external_id: Some("h1".to_string()),
        }
    }

    #[test]
    fn match_text_joins_and_trims() {
        assert_eq!(match_text("Subscription", Some("NETFLIX.COM")), "Subscription NETFLIX.COM");
        assert_eq!(match_text("Coffee", None), "Coffee");
        assert_eq!(match_text("  ", Some("")), "");
    }

    #[test]
    fn new_transaction_rejects_zero_and_blank() {
        let ok = NewTransaction::new(AccountId(1), date(2024, 1, 1), -500, "Coffee");
        assert!(ok.validate().is_ok());

        let zero = NewTransaction::new(AccountId(1), date(2024, 1, 1), 0, "Coffee");
        assert_eq!(zero.validate(), Err(LedgerError::ZeroAmount));

        let blank = NewTransaction::new(AccountId(1), date(2024, 1, 1), -500, " ");
        assert!(matches!(blank.validate(), Err(LedgerError::Validation(_))));
    }

    #[test]
    fn extreme_amounts_are_rejected() {
        let huge = NewTransaction::new(AccountId(1), date(2024, 1, 1), i64::MIN, "Glitch");
        assert_eq!(huge.validate(), Err(LedgerError::AmountOutOfRange(i64::MIN)));
        assert!(row(i64::MAX, "Glitch").validate().is_err());
        assert!(row(-MAX_AMOUNT_CENTS, "Edge").validate().unwrap().is_some());
        assert!(row(-MAX_AMOUNT_CENTS - 1, "Edge").validate().is_err());
    }

    #[test]
    fn zero_amount_import_row_is_dropped() {
        assert_eq!(row(0, "Fee reversal").validate().unwrap(), None);
    }

    #[test]
    fn import_row_without_description_is_invalid() {
        assert!(row(-500, "").validate().is_err());
    }

    #[test]
    fn blank_external_id_becomes_none() {
        let mut r = row(-500, "Coffee");
        r.external_id = Some("  ".to_string());
        let v = r.validate().unwrap().unwrap();
        assert_eq!(v.external_id, None);
    }
}
