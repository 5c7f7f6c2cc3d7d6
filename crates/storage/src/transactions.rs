use chrono::NaiveDate;
use ledgerly_core::{
    AccountId, CategoryId, ImportBatchId, NewTransaction, Transaction, TransactionId,
};
use serde::{Deserialize, Serialize};
use sqlx::{QueryBuilder, Sqlite, SqliteConnection};
use tracing::debug;

use crate::accounts::require_active;
use crate::balance::{apply_balance_delta, BalanceMode};
use crate::categories::require_category;
use crate::db::DbPool;
use crate::error::StorageError;

pub(crate) type TransactionRow = (
    i64,
    i64,
    Option<i64>,
    NaiveDate,
    i64,
    String,
    String,
    Option<String>,
    Option<String>,
    Option<String>,
    Option<i64>,
    i64,
    Option<i64>,
);

pub(crate) const TRANSACTION_COLUMNS: &str = "id, account_id, category_id, date, amount_cents, \
     currency, description, merchant, notes, external_id, import_batch_id, is_transfer, linked_transaction_id";

pub(crate) fn map_transaction(r: TransactionRow) -> Transaction {
    Transaction {
        id: TransactionId(r.0),
        account_id: AccountId(r.1),
        category_id: r.2.map(CategoryId),
        date: r.3,
        amount_cents: r.4,
        currency: r.5,
        description: r.6,
        merchant: r.7,
        notes: r.8,
        external_id: r.9,
        import_batch_id: r.10.map(ImportBatchId),
        is_transfer: r.11 != 0,
        linked_transaction_id: r.12.map(TransactionId),
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TransactionFilter {
    pub account_id: Option<AccountId>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// Inserts the row and moves the account balance in one database transaction.
/// Categorization happens before this call; `category_id` is stored as given.
pub async fn insert_transaction(
    pool: &DbPool,
    input: &NewTransaction,
) -> Result<Transaction, StorageError> {
    input.validate()?;

    let mut tx = pool.begin().await?;
    let account = require_active(&mut tx, input.account_id).await?;
    if let Some(category_id) = input.category_id {
        require_category(&mut tx, category_id).await?;
    }
    let currency = input.currency.clone().unwrap_or(account.currency);

    let result = sqlx::query(
        "INSERT INTO transactions (account_id, category_id, date, amount_cents, currency, description, merchant, notes)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(input.account_id.0)
    .bind(input.category_id.map(|c| c.0))
    .bind(input.date)
    .bind(input.amount_cents)
    .bind(&currency)
    .bind(input.description.trim())
    .bind(input.merchant.as_deref().map(str::trim).filter(|m| !m.is_empty()))
    .bind(&input.notes)
    .execute(&mut *tx)
    .await?;

    apply_balance_delta(&mut tx, input.account_id, input.amount_cents, BalanceMode::Incremental)
        .await?;
    let created = fetch_transaction(&mut tx, TransactionId(result.last_insert_rowid())).await?;
    tx.commit().await?;

    debug!(id = %created.id, account_id = %created.account_id, amount = created.amount_cents, "transaction created");
    Ok(created)
}

/// Removes one row, clears its transfer counterpart and reverses its balance effect.
pub async fn delete_transaction(
    pool: &DbPool,
    id: TransactionId,
) -> Result<Transaction, StorageError> {
    let mut tx = pool.begin().await?;
    let existing = fetch_transaction(&mut tx, id).await?;

    sqlx::query(
        "UPDATE transactions SET linked_transaction_id = NULL, is_transfer = 0 WHERE linked_transaction_id = ?",
    )
    .bind(id.0)
    .execute(&mut *tx)
    .await?;
    sqlx::query("DELETE FROM transactions WHERE id = ?")
        .bind(id.0)
        .execute(&mut *tx)
        .await?;
    apply_balance_delta(
        &mut tx,
        existing.account_id,
        -existing.amount_cents,
        BalanceMode::Incremental,
    )
    .await?;
    tx.commit().await?;

    Ok(existing)
}

pub async fn get_transaction(pool: &DbPool, id: TransactionId) -> Result<Transaction, StorageError> {
    let mut conn = pool.acquire().await?;
    fetch_transaction(&mut conn, id).await
}

pub(crate) async fn fetch_transaction(
    conn: &mut SqliteConnection,
    id: TransactionId,
) -> Result<Transaction, StorageError> {
    let row = sqlx::query_as::<_, TransactionRow>(&format!(
        "SELECT {TRANSACTION_COLUMNS} FROM transactions WHERE id = ?"
    ))
    .bind(id.0)
    .fetch_optional(&mut *conn)
    .await?;

    row.map(map_transaction)
        .ok_or_else(|| StorageError::not_found("transaction", id.0))
}

/// Newest first.
pub async fn get_transactions(
    pool: &DbPool,
    filter: &TransactionFilter,
) -> Result<Vec<Transaction>, StorageError> {
    let mut qb: QueryBuilder<Sqlite> =
        QueryBuilder::new(format!("SELECT {TRANSACTION_COLUMNS} FROM transactions WHERE 1 = 1"));
    if let Some(account_id) = filter.account_id {
        qb.push(" AND account_id = ").push_bind(account_id.0);
    }
    if let Some(start) = filter.start_date {
        qb.push(" AND date >= ").push_bind(start);
    }
    if let Some(end) = filter.end_date {
        qb.push(" AND date <= ").push_bind(end);
    }
    qb.push(" ORDER BY date DESC, id DESC");
    if let Some(limit) = filter.limit {
        qb.push(" LIMIT ").push_bind(limit.max(0));
        if let Some(offset) = filter.offset {
            qb.push(" OFFSET ").push_bind(offset.max(0));
        }
    }

    let rows = qb
        .build_query_as::<TransactionRow>()
        .fetch_all(pool)
        .await?;
    Ok(rows.into_iter().map(map_transaction).collect())
}

/// Every row in date order; input for the detectors.
pub async fn get_all_transactions(pool: &DbPool) -> Result<Vec<Transaction>, StorageError> {
    let rows = sqlx::query_as::<_, TransactionRow>(&format!(
        "SELECT {TRANSACTION_COLUMNS} FROM transactions ORDER BY date, id"
    ))
    .fetch_all(pool)
    .await?;
    Ok(rows.into_iter().map(map_transaction).collect())
}

pub async fn get_uncategorized_transactions(
    pool: &DbPool,
) -> Result<Vec<Transaction>, StorageError> {
    let rows = sqlx::query_as::<_, TransactionRow>(&format!(
        "SELECT {TRANSACTION_COLUMNS} FROM transactions WHERE category_id IS NULL ORDER BY date, id"
    ))
    .fetch_all(pool)
    .await?;
    Ok(rows.into_iter().map(map_transaction).collect())
}

pub async fn get_uncategorized_count(pool: &DbPool) -> Result<i64, StorageError> {
    let count = sqlx::query_scalar("SELECT COUNT(*) FROM transactions WHERE category_id IS NULL")
        .fetch_one(pool)
        .await?;
    Ok(count)
}

/// Writes category assignments for still-uncategorized rows. Returns the number of rows changed.
pub async fn set_categories(
    pool: &DbPool,
    assignments: &[(TransactionId, CategoryId)],
) -> Result<u64, StorageError> {
    if assignments.is_empty() {
        return Ok(0);
    }
    let mut tx = pool.begin().await?;
    let mut changed = 0;
    for (transaction_id, category_id) in assignments {
        changed += sqlx::query(
            "UPDATE transactions SET category_id = ? WHERE id = ? AND category_id IS NULL",
        )
        .bind(category_id.0)
        .bind(transaction_id.0)
        .execute(&mut *tx)
        .await?
        .rows_affected();
    }
    tx.commit().await?;
    Ok(changed)
}

/// Explicit recategorization of a single row, used for manual edits.
pub async fn set_transaction_category(
    pool: &DbPool,
    id: TransactionId,
    category_id: Option<CategoryId>,
) -> Result<(), StorageError> {
    let mut tx = pool.begin().await?;
    if let Some(category_id) = category_id {
        require_category(&mut tx, category_id).await?;
    }
    let result = sqlx::query("UPDATE transactions SET category_id = ? WHERE id = ?")
        .bind(category_id.map(|c| c.0))
        .bind(id.0)
        .execute(&mut *tx)
        .await?;
    if result.rows_affected() == 0 {
        return Err(StorageError::not_found("transaction", id.0));
    }
    tx.commit().await?;
    Ok(())
}
