//! CLI sub-commands. Each one maps to a single `Ledger` operation and yields
//! a JSON value for the external UI.

use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Args, Subcommand};
use ledgerly_core::{
    amortize, AccountId, AccountType, CategoryId, DateRange, ImportBatchId, ImportOptions, Month,
    NewAccount, NewCategoryRule, NewTransaction, RuleMatchType, TransactionId,
};
use ledgerly_import::{CsvColumnMapping, CsvImportProfile};
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::{json, Value};

use crate::error::{AppError, Result};
use crate::ledger::Ledger;

#[derive(Debug, Serialize)]
pub struct CommandError {
    pub message: String,
}

impl From<AppError> for CommandError {
    fn from(e: AppError) -> Self {
        CommandError {
            message: e.to_string(),
        }
    }
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Categorize every uncategorized transaction with the active rules.
    ApplyRules,
    /// Show which category the rules would pick for a text.
    FindCategory {
        description: String,
        #[arg(long)]
        merchant: Option<String>,
    },
    /// Create a categorization rule.
    AddRule {
        pattern: String,
        #[arg(long)]
        category: i64,
        /// contains, starts_with, exact or regex.
        #[arg(long, default_value = "contains")]
        match_type: RuleMatchType,
        #[arg(long, default_value_t = 0)]
        priority: i64,
        #[arg(long)]
        case_sensitive: bool,
    },
    /// List categorization rules in evaluation order.
    Rules,
    /// List categories.
    Categories,
    /// Suggest rule patterns from uncategorized transactions.
    Recommend,
    /// Detect subscription-like charges.
    Subscriptions,
    /// Active recurring rules and their monthly cost.
    Recurring,
    /// List probable transfer pairs.
    Transfers,
    /// Counts of marked and probable transfers.
    TransferStats,
    /// Link two transactions as a transfer.
    MarkTransfer { outgoing: i64, incoming: i64 },
    /// Mark every high-confidence pair.
    MarkAllTransfers,
    /// Undo a transfer link.
    UnmarkTransfer { id: i64 },
    /// Never propose this pair again.
    IgnoreTransfer { outgoing: i64, incoming: i64 },
    /// Add one transaction by hand.
    AddTransaction {
        #[arg(long)]
        account: i64,
        #[arg(long)]
        date: NaiveDate,
        /// Signed amount in cents.
        #[arg(long, allow_hyphen_values = true)]
        amount: i64,
        description: String,
        #[arg(long)]
        merchant: Option<String>,
        #[arg(long)]
        category: Option<i64>,
        #[arg(long)]
        notes: Option<String>,
    },
    /// Delete one transaction.
    DeleteTransaction { id: i64 },
    /// List transactions, newest first.
    Transactions {
        #[arg(long)]
        account: Option<i64>,
        #[arg(long)]
        from: Option<NaiveDate>,
        #[arg(long)]
        to: Option<NaiveDate>,
        #[arg(long)]
        limit: Option<i64>,
    },
    /// Import a CSV statement into an account.
    Import(ImportArgs),
    /// List import batches.
    Batches,
    /// Undo an import batch.
    DeleteBatch { id: i64 },
    /// Delete every transaction and batch.
    Reset {
        #[arg(long)]
        yes: bool,
    },
    /// Rebuild an account's current balance from its transactions.
    Recalculate { account: i64 },
    /// Compare an account's stored balance with its transactions.
    Verify { account: i64 },
    /// List active accounts.
    Accounts,
    /// Create an account.
    AddAccount {
        name: String,
        #[arg(long = "type", default_value = "checking")]
        account_type: AccountType,
        #[arg(long)]
        currency: Option<String>,
        /// Opening balance in cents.
        #[arg(long, default_value_t = 0, allow_hyphen_values = true)]
        opening: i64,
        #[arg(long)]
        institution: Option<String>,
    },
    /// Deactivate an account.
    DeleteAccount { id: i64 },
    /// Income, expenses and savings rate for one month.
    Summary { month: Month },
    /// Monthly summaries starting at a month.
    Trends {
        first: Month,
        #[arg(long, default_value_t = 6)]
        months: usize,
    },
    /// Net worth and this month's summary.
    Dashboard,
    /// Expense totals per category.
    Breakdown {
        #[arg(long)]
        from: NaiveDate,
        #[arg(long)]
        to: NaiveDate,
    },
    /// Write all transactions as CSV.
    Export {
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Fixed-rate mortgage schedule.
    Amortize {
        /// Principal in cents.
        principal: i64,
        /// Annual rate as a fraction, e.g. 0.065.
        rate: Decimal,
        /// Term in months.
        term: u32,
        #[arg(long)]
        start: NaiveDate,
        /// Extra monthly principal in cents.
        #[arg(long, default_value_t = 0)]
        extra: i64,
    },
}

#[derive(Debug, Args)]
pub struct ImportArgs {
    pub file: PathBuf,
    #[arg(long)]
    pub account: i64,
    /// Historical import: adjust the opening balance instead of the current one.
    #[arg(long)]
    pub preserve_balance: bool,
    /// Apply categorization rules after importing.
    #[arg(long)]
    pub categorize: bool,
    #[arg(long, default_value_t = 0)]
    pub date_column: usize,
    #[arg(long, default_value_t = 1)]
    pub description_column: usize,
    #[arg(long)]
    pub amount_column: Option<usize>,
    #[arg(long, requires = "credit_column")]
    pub debit_column: Option<usize>,
    #[arg(long, requires = "debit_column")]
    pub credit_column: Option<usize>,
    #[arg(long)]
    pub merchant_column: Option<usize>,
    #[arg(long, default_value = "%Y-%m-%d")]
    pub date_format: String,
    #[arg(long, default_value = ",")]
    pub delimiter: String,
    #[arg(long)]
    pub no_header: bool,
}

impl ImportArgs {
    fn profile(&self) -> CsvImportProfile {
        let split = self.debit_column.is_some() && self.credit_column.is_some();
        CsvImportProfile {
            name: "cli".to_string(),
            mapping: CsvColumnMapping {
                date_column: Some(self.date_column),
                description_column: Some(self.description_column),
                amount_column: if split { None } else { Some(self.amount_column.unwrap_or(2)) },
                debit_column: self.debit_column,
                credit_column: self.credit_column,
                merchant_column: self.merchant_column,
                date_format: self.date_format.clone(),
            },
            has_header: !self.no_header,
            delimiter: self.delimiter.clone(),
            currency: None,
        }
    }
}

pub async fn execute(ledger: &Ledger, command: Command) -> Result<Value> {
    let value = match command {
        Command::ApplyRules => serde_json::to_value(ledger.apply_categorization_rules().await?)?,
        Command::FindCategory {
            description,
            merchant,
        } => {
            let category = ledger
                .find_category_for_transaction(&description, merchant.as_deref())
                .await?;
            json!({ "category_id": category })
        }
        Command::AddRule {
            pattern,
            category,
            match_type,
            priority,
            case_sensitive,
        } => {
            let mut rule = NewCategoryRule::new(&pattern, CategoryId(category), match_type)
                .with_priority(priority);
            rule.case_sensitive = case_sensitive;
            serde_json::to_value(ledger.create_category_rule(&rule).await?)?
        }
        Command::Rules => serde_json::to_value(ledger.get_category_rules().await?)?,
        Command::Categories => serde_json::to_value(ledger.get_categories().await?)?,
        Command::Recommend => serde_json::to_value(ledger.get_category_recommendations().await?)?,
        Command::Subscriptions => serde_json::to_value(ledger.detect_subscriptions().await?)?,
        Command::Recurring => json!({
            "rules": ledger.get_recurring_rules().await?,
            "summary": ledger.get_recurring_summary().await?,
        }),
        Command::Transfers => serde_json::to_value(ledger.find_probable_transfers().await?)?,
        Command::TransferStats => serde_json::to_value(ledger.get_transfer_stats().await?)?,
        Command::MarkTransfer { outgoing, incoming } => {
            ledger
                .mark_as_transfer(TransactionId(outgoing), TransactionId(incoming))
                .await?;
            json!({ "marked": true })
        }
        Command::MarkAllTransfers => {
            json!({ "marked": ledger.mark_all_high_confidence_transfers().await? })
        }
        Command::UnmarkTransfer { id } => {
            ledger.unmark_transfer(TransactionId(id)).await?;
            json!({ "unmarked": true })
        }
        Command::IgnoreTransfer { outgoing, incoming } => {
            ledger
                .ignore_transfer_pair(TransactionId(outgoing), TransactionId(incoming))
                .await?;
            json!({ "ignored": true })
        }
        Command::AddTransaction {
            account,
            date,
            amount,
            description,
            merchant,
            category,
            notes,
        } => {
            let mut input = NewTransaction::new(AccountId(account), date, amount, &description);
            input.merchant = merchant;
            input.category_id = category.map(CategoryId);
            input.notes = notes;
            serde_json::to_value(ledger.create_transaction(input).await?)?
        }
        Command::DeleteTransaction { id } => {
            serde_json::to_value(ledger.delete_transaction(TransactionId(id)).await?)?
        }
        Command::Transactions {
            account,
            from,
            to,
            limit,
        } => {
            let filter = ledgerly_storage::TransactionFilter {
                account_id: account.map(AccountId),
                start_date: from,
                end_date: to,
                limit,
                offset: None,
            };
            serde_json::to_value(ledger.get_transactions(&filter).await?)?
        }
        Command::Import(args) => {
            let options = ImportOptions {
                preserve_balance: args.preserve_balance,
            };
            let outcome = ledger
                .import_csv_file(&args.file, AccountId(args.account), &args.profile(), options)
                .await?;
            let categorized = if args.categorize {
                Some(ledger.apply_categorization_rules().await?)
            } else {
                None
            };
            json!({ "import": outcome, "categorization": categorized })
        }
        Command::Batches => serde_json::to_value(ledger.get_import_batches().await?)?,
        Command::DeleteBatch { id } => {
            serde_json::to_value(ledger.delete_import_batch(ImportBatchId(id)).await?)?
        }
        Command::Reset { yes } => {
            if !yes {
                return Err(
                    ledgerly_core::LedgerError::validation("pass --yes to delete every transaction").into(),
                );
            }
            serde_json::to_value(ledger.delete_all_transactions().await?)?
        }
        Command::Recalculate { account } => {
            let balance = ledger.recalculate_account_balance(AccountId(account)).await?;
            json!({ "account_id": account, "current_balance_cents": balance })
        }
        Command::Verify { account } => {
            serde_json::to_value(ledger.verify_account_balance(AccountId(account)).await?)?
        }
        Command::Accounts => serde_json::to_value(ledger.get_accounts().await?)?,
        Command::AddAccount {
            name,
            account_type,
            currency,
            opening,
            institution,
        } => {
            let currency = currency.unwrap_or_default();
            let mut input =
                NewAccount::new(&name, account_type, &currency).with_opening_balance(opening);
            input.institution = institution;
            serde_json::to_value(ledger.create_account(input).await?)?
        }
        Command::DeleteAccount { id } => {
            ledger.delete_account(AccountId(id)).await?;
            json!({ "deactivated": true })
        }
        Command::Summary { month } => serde_json::to_value(ledger.get_monthly_summary(month).await?)?,
        Command::Trends { first, months } => {
            serde_json::to_value(ledger.get_monthly_trends(first, months).await?)?
        }
        Command::Dashboard => serde_json::to_value(ledger.get_dashboard_stats().await?)?,
        Command::Breakdown { from, to } => {
            serde_json::to_value(ledger.get_category_breakdown(DateRange::new(from, to)).await?)?
        }
        Command::Export { output } => {
            let csv = ledger.export_transactions_csv().await?;
            match output {
                Some(path) => {
                    std::fs::write(&path, csv)?;
                    json!({ "written": path })
                }
                None => Value::String(csv),
            }
        }
        Command::Amortize {
            principal,
            rate,
            term,
            start,
            extra,
        } => serde_json::to_value(amortize(principal, rate, term, start, extra)?)?,
    };
    Ok(value)
}
