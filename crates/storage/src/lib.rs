pub mod accounts;
pub mod balance;
pub mod categories;
pub mod db;
pub mod error;
pub mod imports;
pub mod recurring;
pub mod reports;
pub mod transactions;
pub mod transfers;

pub use accounts::{deactivate_account, get_account, get_accounts, insert_account, update_account};
pub use balance::{recalculate_account_balance, verify_account_balance, BalanceCheck, BalanceMode};
pub use categories::{
    delete_category_rule, get_categories, get_category_rules, insert_category,
    insert_category_rule, update_category_rule,
};
pub use db::{create_db, get_setting, seed_default_categories, set_setting, DbPool};
pub use error::StorageError;
pub use imports::{
    delete_all_transactions, delete_import_batch, get_import_batches, import_with_dedup,
    DeleteOutcome, DEFAULT_CHUNK_SIZE,
};
pub use recurring::{
    deactivate_recurring_rule, get_recurring_rules, insert_recurring_rule, update_recurring_rule,
};
pub use reports::{
    get_category_breakdown, get_dashboard_stats, get_export_records, get_monthly_summary,
    get_monthly_trends, CategoryTotal, DashboardStats, ExportRecord, MonthlySummary,
    UNCATEGORIZED_LABEL,
};
pub use transactions::{
    delete_transaction, get_all_transactions, get_transaction, get_transactions,
    get_uncategorized_count, get_uncategorized_transactions, insert_transaction, set_categories,
    set_transaction_category, TransactionFilter,
};
pub use transfers::{
    count_marked_transfers, get_ignored_transfer_pairs, ignore_transfer_pair, mark_as_transfer,
    mark_transfers, unmark_transfer,
};
