pub mod account;
pub mod category;
pub mod error;
pub mod mortgage;
pub mod money;
pub mod period;
pub mod recurring;
pub mod transaction;

pub use account::{Account, AccountId, AccountType, AccountUpdate, NewAccount};
pub use category::{
    Category, CategoryId, CategoryRule, NewCategory, NewCategoryRule, RuleId, RuleMatchType,
    RuleUpdate, DEFAULT_CATEGORIES,
};
pub use error::LedgerError;
pub use mortgage::{amortize, AmortizationRow, MortgageSchedule};
pub use money::Money;
pub use period::{DateRange, Month};
pub use recurring::{Frequency, NewRecurringRule, RecurringRule, RecurringRuleId, RecurringRuleUpdate};
pub use transaction::{
    ImportBatch, ImportBatchId, ImportOptions, ImportOutcome, ImportRow, NewTransaction,
    match_text, validate_amount, Transaction, TransactionId, ValidatedImportRow,
    MAX_AMOUNT_CENTS,
};
