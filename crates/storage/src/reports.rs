use ledgerly_core::{CategoryId, DateRange, Month, Transaction};
use serde::{Deserialize, Serialize};

use crate::accounts::get_accounts;
use crate::db::DbPool;
use crate::error::StorageError;
use crate::transactions::{map_transaction, TransactionRow};

pub const UNCATEGORIZED_LABEL: &str = "Uncategorized";

/// Income and expenses for one month. Transfers are excluded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthlySummary {
    pub month: String,
    pub income_cents: i64,
    /// Positive total of outgoing amounts.
    pub expenses_cents: i64,
    pub net_cents: i64,
    /// Percentage of income kept; zero without income.
    pub savings_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashboardStats {
    pub net_worth_cents: i64,
    pub total_assets_cents: i64,
    /// Absolute balances of credit cards, loans and mortgages.
    pub total_liabilities_cents: i64,
    pub this_month: MonthlySummary,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryTotal {
    pub category_id: Option<CategoryId>,
    pub name: String,
    pub color: Option<String>,
    pub total_cents: i64,
}

/// A transaction with the display names an export needs.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExportRecord {
    pub transaction: Transaction,
    pub category: Option<String>,
    pub account: String,
}

pub async fn get_monthly_summary(pool: &DbPool, month: Month) -> Result<MonthlySummary, StorageError> {
    let range = month.range();
    let (income, expenses): (i64, i64) = sqlx::query_as(
        "SELECT COALESCE(SUM(CASE WHEN amount_cents > 0 THEN amount_cents END), 0),
                COALESCE(SUM(CASE WHEN amount_cents < 0 THEN -amount_cents END), 0)
         FROM transactions
         WHERE is_transfer = 0 AND date >= ? AND date <= ?",
    )
    .bind(range.start)
    .bind(range.end)
    .fetch_one(pool)
    .await?;

    let net = income - expenses;
    let savings_rate = if income > 0 {
        ((net as f64 / income as f64) * 100.0 * 100.0).round() / 100.0
    } else {
        0.0
    };
    Ok(MonthlySummary {
        month: month.to_string(),
        income_cents: income,
        expenses_cents: expenses,
        net_cents: net,
        savings_rate,
    })
}

/// `months` consecutive summaries starting at `first`.
pub async fn get_monthly_trends(
    pool: &DbPool,
    first: Month,
    months: usize,
) -> Result<Vec<MonthlySummary>, StorageError> {
    let mut out = Vec::with_capacity(months);
    let mut month = first;
    for _ in 0..months {
        out.push(get_monthly_summary(pool, month).await?);
        month = month.next();
    }
    Ok(out)
}

/// Totals over active accounts.
pub async fn get_dashboard_stats(pool: &DbPool, month: Month) -> Result<DashboardStats, StorageError> {
    let accounts = get_accounts(pool).await?;
    let (liabilities, assets): (Vec<_>, Vec<_>) = accounts
        .iter()
        .partition(|a| a.account_type.is_liability());

    let total_assets: i64 = assets.iter().map(|a| a.current_balance_cents).sum();
    let total_liabilities: i64 = liabilities
        .iter()
        .map(|a| a.current_balance_cents.abs())
        .sum();

    Ok(DashboardStats {
        net_worth_cents: total_assets - total_liabilities,
        total_assets_cents: total_assets,
        total_liabilities_cents: total_liabilities,
        this_month: get_monthly_summary(pool, month).await?,
    })
}

/// Expense totals per category, largest first. Transfers are excluded.
pub async fn get_category_breakdown(
    pool: &DbPool,
    range: DateRange,
) -> Result<Vec<CategoryTotal>, StorageError> {
    let rows = sqlx::query_as::<_, (Option<i64>, Option<String>, Option<String>, i64)>(
        "SELECT t.category_id, c.name, c.color, SUM(-t.amount_cents) AS total
         FROM transactions t LEFT JOIN categories c ON c.id = t.category_id
         WHERE t.amount_cents < 0 AND t.is_transfer = 0 AND t.date >= ? AND t.date <= ?
         GROUP BY t.category_id
         ORDER BY total DESC",
    )
    .bind(range.start)
    .bind(range.end)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|(id, name, color, total)| CategoryTotal {
            category_id: id.map(CategoryId),
            name: name.unwrap_or_else(|| UNCATEGORIZED_LABEL.to_string()),
            color,
            total_cents: total,
        })
        .collect())
}

/// Every transaction, newest first, joined with category and account names.
pub async fn get_export_records(pool: &DbPool) -> Result<Vec<ExportRecord>, StorageError> {
    type ExportRow = (
        i64,
        i64,
        Option<i64>,
        chrono::NaiveDate,
        i64,
        String,
        String,
        Option<String>,
        Option<String>,
        Option<String>,
        Option<i64>,
        i64,
        Option<i64>,
        Option<String>,
        String,
    );
    let rows = sqlx::query_as::<_, ExportRow>(
        "SELECT t.id, t.account_id, t.category_id, t.date, t.amount_cents, t.currency, t.description,
                t.merchant, t.notes, t.external_id, t.import_batch_id, t.is_transfer, t.linked_transaction_id,
                c.name, a.name
         FROM transactions t
         JOIN accounts a ON a.id = t.account_id
         LEFT JOIN categories c ON c.id = t.category_id
         ORDER BY t.date DESC, t.id DESC",
    )
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|r| {
            let tx: TransactionRow = (r.0, r.1, r.2, r.3, r.4, r.5, r.6, r.7, r.8, r.9, r.10, r.11, r.12);
            ExportRecord {
                transaction: map_transaction(tx),
                category: r.13,
                account: r.14,
            }
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accounts::insert_account;
    use crate::categories::insert_category;
    use crate::db::test_support::test_db;
    use crate::transactions::insert_transaction;
    use crate::transfers::mark_as_transfer;
    use chrono::NaiveDate;
    use ledgerly_core::{AccountType, NewAccount, NewCategory, NewTransaction};

    fn date(m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, m, d).unwrap()
    }

    #[tokio::test]
    async fn monthly_summary_excludes_transfers_and_other_months() {
        let (pool, _dir) = test_db().await;
        let a = insert_account(&pool, &NewAccount::new("A", AccountType::Checking, "EUR")).await.unwrap().id;
        let b = insert_account(&pool, &NewAccount::new("B", AccountType::Savings, "EUR")).await.unwrap().id;
        insert_transaction(&pool, &NewTransaction::new(a, date(3, 1), 400_000, "salary")).await.unwrap();
        insert_transaction(&pool, &NewTransaction::new(a, date(3, 5), -100_000, "rent")).await.unwrap();
        insert_transaction(&pool, &NewTransaction::new(a, date(4, 1), -999, "april")).await.unwrap();
        let out = insert_transaction(&pool, &NewTransaction::new(a, date(3, 9), -50_000, "to savings")).await.unwrap();
        let inc = insert_transaction(&pool, &NewTransaction::new(b, date(3, 9), 50_000, "from checking")).await.unwrap();
        mark_as_transfer(&pool, out.id, inc.id).await.unwrap();

        let march = Month::new(2024, 3).unwrap();
        let summary = get_monthly_summary(&pool, march).await.unwrap();
        assert_eq!(summary.month, "2024-03");
        assert_eq!(summary.income_cents, 400_000);
        assert_eq!(summary.expenses_cents, 100_000);
        assert_eq!(summary.net_cents, 300_000);
        assert_eq!(summary.savings_rate, 75.0);

        let trends = get_monthly_trends(&pool, march, 2).await.unwrap();
        assert_eq!(trends.len(), 2);
        assert_eq!(trends[1].expenses_cents, 999);
        assert_eq!(trends[1].savings_rate, 0.0);
    }

    #[tokio::test]
    async fn dashboard_splits_assets_and_liabilities() {
        let (pool, _dir) = test_db().await;
        insert_account(&pool, &NewAccount::new("Main", AccountType::Checking, "EUR").with_opening_balance(250_000))
            .await
            .unwrap();
        insert_account(&pool, &NewAccount::new("Card", AccountType::CreditCard, "EUR").with_opening_balance(-30_000))
            .await
            .unwrap();
        insert_account(&pool, &NewAccount::new("House", AccountType::Mortgage, "EUR").with_opening_balance(-100_000))
            .await
            .unwrap();

        let stats = get_dashboard_stats(&pool, Month::new(2024, 1).unwrap()).await.unwrap();
        assert_eq!(stats.total_assets_cents, 250_000);
        assert_eq!(stats.total_liabilities_cents, 130_000);
        assert_eq!(stats.net_worth_cents, 120_000);
    }

    #[tokio::test]
    async fn breakdown_groups_expenses_with_uncategorized_bucket() {
        let (pool, _dir) = test_db().await;
        let a = insert_account(&pool, &NewAccount::new("A", AccountType::Checking, "EUR")).await.unwrap().id;
        let food = insert_category(&pool, &NewCategory { name: "Food".into(), ..NewCategory::default() })
            .await
            .unwrap();
        let mut lunch = NewTransaction::new(a, date(5, 2), -1_200, "lunch");
        lunch.category_id = Some(food.id);
        insert_transaction(&pool, &lunch).await.unwrap();
        insert_transaction(&pool, &NewTransaction::new(a, date(5, 3), -5_000, "mystery")).await.unwrap();
        insert_transaction(&pool, &NewTransaction::new(a, date(5, 4), 9_000, "refund")).await.unwrap();

        let totals = get_category_breakdown(&pool, Month::new(2024, 5).unwrap().range()).await.unwrap();
        assert_eq!(totals.len(), 2);
        assert_eq!(totals[0].name, UNCATEGORIZED_LABEL);
        assert_eq!(totals[0].total_cents, 5_000);
        assert_eq!(totals[1].category_id, Some(food.id));
        assert_eq!(totals[1].total_cents, 1_200);
    }

    #[tokio::test]
    async fn export_records_carry_names() {
        let (pool, _dir) = test_db().await;
        let a = insert_account(&pool, &NewAccount::new("Wallet", AccountType::Cash, "EUR")).await.unwrap().id;
        insert_transaction(&pool, &NewTransaction::new(a, date(1, 1), -100, "old")).await.unwrap();
        insert_transaction(&pool, &NewTransaction::new(a, date(2, 1), -200, "new")).await.unwrap();
        let records = get_export_records(&pool).await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].transaction.description, "new");
        assert_eq!(records[0].account, "Wallet");
        assert_eq!(records[0].category, None);
    }
}
