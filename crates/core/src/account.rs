use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::LedgerError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AccountId(pub i64);

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountType {
    Checking,
    Savings,
    Investment,
    CreditCard,
    Cash,
    Mortgage,
    Loan,
}

impl AccountType {
    pub fn as_str(self) -> &'static str {
        match self {
            AccountType::Checking => "checking",
            AccountType::Savings => "savings",
            AccountType::Investment => "investment",
            AccountType::CreditCard => "credit_card",
            AccountType::Cash => "cash",
            AccountType::Mortgage => "mortgage",
            AccountType::Loan => "loan",
        }
    }

    /// Credit cards, loans and mortgages count against net worth.
    pub fn is_liability(self) -> bool {
        matches!(
            self,
            AccountType::CreditCard | AccountType::Mortgage | AccountType::Loan
        )
    }
}

impl fmt::Display for AccountType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AccountType {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "checking" => Ok(AccountType::Checking),
            "savings" => Ok(AccountType::Savings),
            "investment" => Ok(AccountType::Investment),
            "credit_card" => Ok(AccountType::CreditCard),
            "cash" => Ok(AccountType::Cash),
            "mortgage" => Ok(AccountType::Mortgage),
            "loan" => Ok(AccountType::Loan),
            other => Err(LedgerError::UnknownAccountType(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    pub name: String,
    pub account_type: AccountType,
    pub currency: String,
    pub institution: Option<String>,
    pub color: Option<String>,
    pub opening_balance_cents: i64,
    pub current_balance_cents: i64,
    pub is_active: bool,
    pub linked_to_account_id: Option<AccountId>,
    pub hide_from_dashboard: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewAccount {
    pub name: String,
    pub account_type: AccountType,
    pub currency: String,
    pub institution: Option<String>,
    pub color: Option<String>,
    #[serde(default)]
    pub opening_balance_cents: i64,
}

impl NewAccount {
    pub fn new(name: &str, account_type: AccountType, currency: &str) -> Self {
        NewAccount {
            name: name.to_string(),
            account_type,
            currency: currency.to_string(),
            institution: None,
            color: None,
            opening_balance_cents: 0,
        }
    }

    pub fn with_opening_balance(mut self, cents: i64) -> Self {
        self.opening_balance_cents = cents;
        self
    }

    pub fn validate(&self) -> Result<(), LedgerError> {
        if self.name.trim().is_empty() {
            return Err(LedgerError::validation("account name is required"));
        }
        validate_currency(&self.currency)
    }
}

/// Display-only fields. Balances are never written through an update.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AccountUpdate {
    pub name: Option<String>,
    pub institution: Option<String>,
    pub color: Option<String>,
    pub hide_from_dashboard: Option<bool>,
    /// `Some(None)` clears the link.
    pub linked_to_account_id: Option<Option<AccountId>>,
}

pub(crate) fn validate_currency(code: &str) -> Result<(), LedgerError> {
    let ok = code.len() == 3 && code.chars().all(|c| c.is_ascii_uppercase());
    if ok {
        Ok(())
    } else {
        Err(LedgerError::validation(format!(
            "currency must be a three-letter uppercase code, got '{code}'"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn account_type_round_trips_through_str() {
        for t in [
            AccountType::Checking,
            AccountType::Savings,
            AccountType::Investment,
            AccountType::CreditCard,
            AccountType::Cash,
            AccountType::Mortgage,
            AccountType::Loan,
        ] {
            assert_eq!(t.as_str().parse::<AccountType>().unwrap(), t);
        }
    }

    #[test]
    fn unknown_account_type_is_rejected() {
        assert!(matches!(
            "brokerage".parse::<AccountType>(),
            Err(LedgerError::UnknownAccountType(_))
        ));
    }

    #[test]
    fn liabilities() {
        assert!(AccountType::CreditCard.is_liability());
        assert!(AccountType::Mortgage.is_liability());
        assert!(!AccountType::Savings.is_liability());
    }

    #[test]
    fn new_account_requires_name_and_currency() {
        assert!(NewAccount::new("Checking", AccountType::Checking, "EUR").validate().is_ok());
        assert!(NewAccount::new("  ", AccountType::Checking, "EUR").validate().is_err());
        assert!(NewAccount::new("Checking", AccountType::Checking, "eur").validate().is_err());
    }
}
