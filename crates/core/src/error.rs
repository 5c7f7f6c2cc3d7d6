use thiserror::Error;

use crate::account::AccountId;
use crate::category::CategoryId;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum LedgerError {
    #[error("Validation failed: {0}")]
    Validation(String),
    #[error("Account not found: {0}")]
    AccountNotFound(AccountId),
    #[error("Account {0} is inactive")]
    InactiveAccount(AccountId),
    #[error("Category not found: {0}")]
    CategoryNotFound(CategoryId),
    #[error("Transaction amount must not be zero")]
    ZeroAmount,
    #[error("Amount out of range: {0} cents")]
    AmountOutOfRange(i64),
    #[error("Unknown account type: '{0}'")]
    UnknownAccountType(String),
    #[error("Unknown match type: '{0}'")]
    UnknownMatchType(String),
    #[error("Unknown frequency: '{0}'")]
    UnknownFrequency(String),
}

impl LedgerError {
    pub fn validation(msg: impl Into<String>) -> Self {
        LedgerError::Validation(msg.into())
    }
}
