//! The operations the UI and CLI call. Engines from `ledgerly-import` run
//! here over snapshots read from `ledgerly-storage`.

use std::collections::BTreeMap;
use std::path::Path;

use chrono::Local;
use ledgerly_core::{
    Account, AccountId, AccountUpdate, Category, CategoryId, CategoryRule, DateRange,
    ImportBatch, ImportBatchId, ImportOptions, ImportOutcome, ImportRow, Month, NewAccount,
    NewCategory, NewCategoryRule, NewRecurringRule, NewTransaction, RecurringRule,
    RecurringRuleId, RecurringRuleUpdate, RuleId, RuleUpdate, Transaction, TransactionId,
};
use ledgerly_import::{
    merchant_key, recommend, CategoryRuleEngine, CsvExportRow, CsvImportProfile, Recommendation,
    RecurringConfig, SubscriptionDetector, SubscriptionSuggestion, TransferConfidence,
    TransferDetector, TransferPair,
};
use ledgerly_storage::{
    self as storage, BalanceCheck, CategoryTotal, DashboardStats, DbPool, DeleteOutcome,
    MonthlySummary, TransactionFilter,
};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::AppConfig;
use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplyRulesOutcome {
    pub categorized: u64,
    pub total: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferStats {
    pub marked_transfers: i64,
    pub probable_transfers: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecurringSummary {
    pub active_rules: usize,
    /// Monthly-equivalent totals keyed by currency.
    pub monthly_totals: BTreeMap<String, i64>,
}

pub struct Ledger {
    pool: DbPool,
    config: AppConfig,
}

impl Ledger {
    /// Opens (creating if needed) the configured database and seeds default categories.
    pub async fn open(config: AppConfig) -> Result<Self> {
        let path = config.resolved_database_path()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let pool = storage::create_db(&path).await?;
        storage::seed_default_categories(&pool).await?;
        info!(path = %path.display(), "ledger opened");
        Ok(Self { pool, config })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    // ── accounts ─────────────────────────────────────────────────────────────

    /// An empty currency falls back to the configured default.
    pub async fn create_account(&self, mut input: NewAccount) -> Result<Account> {
        if input.currency.trim().is_empty() {
            input.currency = self.config.default_currency.clone();
        }
        Ok(storage::insert_account(&self.pool, &input).await?)
    }

    pub async fn update_account(&self, id: AccountId, update: &AccountUpdate) -> Result<Account> {
        Ok(storage::update_account(&self.pool, id, update).await?)
    }

    pub async fn delete_account(&self, id: AccountId) -> Result<()> {
        Ok(storage::deactivate_account(&self.pool, id).await?)
    }

    pub async fn get_accounts(&self) -> Result<Vec<Account>> {
        Ok(storage::get_accounts(&self.pool).await?)
    }

    pub async fn get_account(&self, id: AccountId) -> Result<Account> {
        Ok(storage::get_account(&self.pool, id).await?)
    }

    pub async fn verify_account_balance(&self, id: AccountId) -> Result<BalanceCheck> {
        Ok(storage::verify_account_balance(&self.pool, id).await?)
    }

    pub async fn recalculate_account_balance(&self, id: AccountId) -> Result<i64> {
        Ok(storage::recalculate_account_balance(&self.pool, id).await?)
    }

    // ── transactions ─────────────────────────────────────────────────────────

    /// Runs the rule engine when no category is given.
    pub async fn create_transaction(&self, mut input: NewTransaction) -> Result<Transaction> {
        input.validate()?;
        if input.category_id.is_none() {
            input.category_id = self
                .find_category_for_transaction(&input.description, input.merchant.as_deref())
                .await?;
        }
        Ok(storage::insert_transaction(&self.pool, &input).await?)
    }

    pub async fn delete_transaction(&self, id: TransactionId) -> Result<Transaction> {
        Ok(storage::delete_transaction(&self.pool, id).await?)
    }

    pub async fn get_transactions(&self, filter: &TransactionFilter) -> Result<Vec<Transaction>> {
        Ok(storage::get_transactions(&self.pool, filter).await?)
    }

    pub async fn get_uncategorized_count(&self) -> Result<i64> {
        Ok(storage::get_uncategorized_count(&self.pool).await?)
    }

    pub async fn delete_all_transactions(&self) -> Result<DeleteOutcome> {
        Ok(storage::delete_all_transactions(&self.pool).await?)
    }

    // ── categories and rules ─────────────────────────────────────────────────

    async fn rule_engine(&self) -> Result<CategoryRuleEngine> {
        let rules = storage::get_category_rules(&self.pool).await?;
        Ok(CategoryRuleEngine::new(rules))
    }

    pub async fn apply_categorization_rules(&self) -> Result<ApplyRulesOutcome> {
        let engine = self.rule_engine().await?;
        let uncategorized = storage::get_uncategorized_transactions(&self.pool).await?;
        let assignments = engine.apply_rules(&uncategorized);
        let categorized = storage::set_categories(&self.pool, &assignments).await?;
        info!(
            categorized,
            total = uncategorized.len(),
            rules = engine.len(),
            "applied categorization rules"
        );
        Ok(ApplyRulesOutcome {
            categorized,
            total: uncategorized.len(),
        })
    }

    pub async fn find_category_for_transaction(
        &self,
        description: &str,
        merchant: Option<&str>,
    ) -> Result<Option<CategoryId>> {
        Ok(self.rule_engine().await?.match_category(description, merchant))
    }

    pub async fn create_category_rule(&self, input: &NewCategoryRule) -> Result<CategoryRule> {
        Ok(storage::insert_category_rule(&self.pool, input).await?)
    }

    pub async fn get_category_rules(&self) -> Result<Vec<CategoryRule>> {
        Ok(storage::get_category_rules(&self.pool).await?)
    }

    pub async fn update_category_rule(&self, id: RuleId, update: &RuleUpdate) -> Result<CategoryRule> {
        Ok(storage::update_category_rule(&self.pool, id, update).await?)
    }

    pub async fn delete_category_rule(&self, id: RuleId) -> Result<()> {
        Ok(storage::delete_category_rule(&self.pool, id).await?)
    }

    pub async fn get_categories(&self) -> Result<Vec<Category>> {
        Ok(storage::get_categories(&self.pool).await?)
    }

    pub async fn create_category(&self, input: &NewCategory) -> Result<Category> {
        Ok(storage::insert_category(&self.pool, input).await?)
    }

    pub async fn get_category_recommendations(&self) -> Result<Vec<Recommendation>> {
        let uncategorized = storage::get_uncategorized_transactions(&self.pool).await?;
        Ok(recommend(&uncategorized, self.config.detection.recommendation_limit))
    }

    // ── recurring rules ──────────────────────────────────────────────────────

    /// Suggestions already covered by an active rule with the same name on the
    /// same account are left out.
    pub async fn detect_subscriptions(&self) -> Result<Vec<SubscriptionSuggestion>> {
        let detector = SubscriptionDetector::new(RecurringConfig {
            min_occurrences: self.config.detection.subscription_min_occurrences,
            max_gap_cv: self.config.detection.subscription_max_gap_cv,
        });
        let transactions = storage::get_all_transactions(&self.pool).await?;
        let covered: Vec<(AccountId, String)> = storage::get_recurring_rules(&self.pool)
            .await?
            .into_iter()
            .map(|rule| (rule.account_id, merchant_key(&rule.name)))
            .collect();

        Ok(detector
            .detect(&transactions)
            .into_iter()
            .filter(|s| {
                let key = merchant_key(&s.merchant);
                !covered.iter().any(|(account, name)| *account == s.account_id && *name == key)
            })
            .collect())
    }

    pub async fn get_recurring_rules(&self) -> Result<Vec<RecurringRule>> {
        Ok(storage::get_recurring_rules(&self.pool).await?)
    }

    pub async fn create_recurring_rule(&self, input: &NewRecurringRule) -> Result<RecurringRule> {
        Ok(storage::insert_recurring_rule(&self.pool, input).await?)
    }

    pub async fn update_recurring_rule(
        &self,
        id: RecurringRuleId,
        update: &RecurringRuleUpdate,
    ) -> Result<RecurringRule> {
        Ok(storage::update_recurring_rule(&self.pool, id, update).await?)
    }

    pub async fn delete_recurring_rule(&self, id: RecurringRuleId) -> Result<()> {
        Ok(storage::deactivate_recurring_rule(&self.pool, id).await?)
    }

    pub async fn get_recurring_summary(&self) -> Result<RecurringSummary> {
        let rules = storage::get_recurring_rules(&self.pool).await?;
        let mut monthly_totals: BTreeMap<String, i64> = BTreeMap::new();
        for rule in &rules {
            *monthly_totals.entry(rule.currency.clone()).or_default() +=
                rule.frequency.monthly_equivalent(rule.amount_cents);
        }
        Ok(RecurringSummary {
            active_rules: rules.len(),
            monthly_totals,
        })
    }

    // ── transfers ────────────────────────────────────────────────────────────

    pub async fn find_probable_transfers(&self) -> Result<Vec<TransferPair>> {
        let ignored = storage::get_ignored_transfer_pairs(&self.pool).await?;
        let detector =
            TransferDetector::new(self.config.detection.transfer_window_days).with_ignored(ignored);
        let transactions = storage::get_all_transactions(&self.pool).await?;
        Ok(detector.find_probable_transfers(&transactions))
    }

    pub async fn mark_as_transfer(&self, outgoing: TransactionId, incoming: TransactionId) -> Result<()> {
        Ok(storage::mark_as_transfer(&self.pool, outgoing, incoming).await?)
    }

    pub async fn unmark_transfer(&self, id: TransactionId) -> Result<()> {
        Ok(storage::unmark_transfer(&self.pool, id).await?)
    }

    pub async fn ignore_transfer_pair(
        &self,
        outgoing: TransactionId,
        incoming: TransactionId,
    ) -> Result<()> {
        Ok(storage::ignore_transfer_pair(&self.pool, outgoing, incoming).await?)
    }

    /// Returns the number of pairs marked. All pairs are marked in one store transaction.
    pub async fn mark_all_high_confidence_transfers(&self) -> Result<usize> {
        let pairs: Vec<(TransactionId, TransactionId)> = self
            .find_probable_transfers()
            .await?
            .into_iter()
            .filter(|pair| pair.confidence == TransferConfidence::High)
            .map(|pair| (pair.outgoing.id, pair.incoming.id))
            .collect();
        Ok(storage::mark_transfers(&self.pool, &pairs).await?)
    }

    pub async fn get_transfer_stats(&self) -> Result<TransferStats> {
        Ok(TransferStats {
            marked_transfers: storage::count_marked_transfers(&self.pool).await?,
            probable_transfers: self.find_probable_transfers().await?.len(),
        })
    }

    // ── import ───────────────────────────────────────────────────────────────

    pub async fn import_transactions_with_dedup(
        &self,
        rows: Vec<ImportRow>,
        filename: Option<&str>,
        options: ImportOptions,
    ) -> Result<ImportOutcome> {
        Ok(storage::import_with_dedup(
            &self.pool,
            rows,
            filename,
            options,
            self.config.import.chunk_size,
        )
        .await?)
    }

    /// Parses a CSV file with `profile` and imports it into `account_id`.
    pub async fn import_csv_file(
        &self,
        path: &Path,
        account_id: AccountId,
        profile: &CsvImportProfile,
        options: ImportOptions,
    ) -> Result<ImportOutcome> {
        let file = std::fs::File::open(path)?;
        let rows = ledgerly_import::import_csv(file, profile, account_id)?;
        let filename = path.file_name().map(|f| f.to_string_lossy().into_owned());
        self.import_transactions_with_dedup(rows, filename.as_deref(), options)
            .await
    }

    pub async fn delete_import_batch(&self, id: ImportBatchId) -> Result<DeleteOutcome> {
        Ok(storage::delete_import_batch(&self.pool, id).await?)
    }

    pub async fn get_import_batches(&self) -> Result<Vec<ImportBatch>> {
        Ok(storage::get_import_batches(&self.pool).await?)
    }

    // ── reports ──────────────────────────────────────────────────────────────

    pub async fn get_monthly_summary(&self, month: Month) -> Result<MonthlySummary> {
        Ok(storage::get_monthly_summary(&self.pool, month).await?)
    }

    pub async fn get_monthly_trends(&self, first: Month, months: usize) -> Result<Vec<MonthlySummary>> {
        Ok(storage::get_monthly_trends(&self.pool, first, months).await?)
    }

    pub async fn get_dashboard_stats(&self) -> Result<DashboardStats> {
        let this_month = Month::of(Local::now().date_naive());
        Ok(storage::get_dashboard_stats(&self.pool, this_month).await?)
    }

    pub async fn get_category_breakdown(&self, range: DateRange) -> Result<Vec<CategoryTotal>> {
        Ok(storage::get_category_breakdown(&self.pool, range).await?)
    }

    /// CSV text, newest first.
    pub async fn export_transactions_csv(&self) -> Result<String> {
        let rows: Vec<CsvExportRow> = storage::get_export_records(&self.pool)
            .await?
            .into_iter()
            .map(|r| CsvExportRow {
                date: r.transaction.date,
                description: r.transaction.description,
                merchant: r.transaction.merchant,
                amount_cents: r.transaction.amount_cents,
                currency: r.transaction.currency,
                category: r.category,
                account: r.account,
                notes: r.transaction.notes,
            })
            .collect();
        let mut buf = Vec::new();
        ledgerly_import::export_csv(&mut buf, &rows)?;
        Ok(String::from_utf8_lossy(&buf).into_owned())
    }
}
