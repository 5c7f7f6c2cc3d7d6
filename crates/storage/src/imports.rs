//! Deduplicating CSV import and its undo paths.

use std::collections::{BTreeMap, HashSet};

use chrono::NaiveDateTime;
use ledgerly_core::{
    Account, AccountId, ImportBatch, ImportBatchId, ImportOptions, ImportOutcome, ImportRow,
    ValidatedImportRow,
};
use serde::{Deserialize, Serialize};
use sqlx::{QueryBuilder, Sqlite, SqliteConnection};
use tracing::{debug, info};

use crate::accounts::require_active;
use crate::balance::{apply_balance_delta, BalanceMode};
use crate::db::DbPool;
use crate::error::StorageError;

/// Rows per multi-row INSERT; keeps statements well under SQLite's bound-parameter limit.
pub const DEFAULT_CHUNK_SIZE: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteOutcome {
    pub deleted: u64,
}

type BatchRow = (i64, i64, Option<String>, i64, i64, i64, NaiveDateTime);

fn map_batch(r: BatchRow) -> ImportBatch {
    ImportBatch {
        id: ImportBatchId(r.0),
        account_id: AccountId(r.1),
        filename: r.2,
        transaction_count: r.3,
        total_amount_cents: r.4,
        preserve_balance: r.5 != 0,
        imported_at: r.6,
    }
}

/// Imports rows not already present by `external_id`, as one atomic batch.
///
/// Every row is validated before anything is written. Zero-amount rows and
/// rows whose `external_id` already exists (in the ledger or earlier in the
/// same call) count as skipped. Rows without an `external_id` are always
/// imported. Balances move once per account according to
/// [`ImportOptions::preserve_balance`]. When nothing survives, no batch is
/// created.
pub async fn import_with_dedup(
    pool: &DbPool,
    rows: Vec<ImportRow>,
    filename: Option<&str>,
    options: ImportOptions,
    chunk_size: usize,
) -> Result<ImportOutcome, StorageError> {
    let mut skipped = 0usize;
    let mut valid = Vec::with_capacity(rows.len());
    for row in rows {
        match row.validate()? {
            Some(v) => valid.push(v),
            None => skipped += 1,
        }
    }
    if valid.is_empty() {
        return Ok(ImportOutcome {
            imported: 0,
            skipped,
            batch_id: None,
        });
    }

    let chunk_size = chunk_size.max(1);
    let mut tx = pool.begin().await?;

    let mut accounts: BTreeMap<AccountId, Account> = BTreeMap::new();
    for row in &valid {
        if !accounts.contains_key(&row.account_id) {
            let account = require_active(&mut tx, row.account_id).await?;
            accounts.insert(row.account_id, account);
        }
    }

    let incoming_ids: Vec<&str> = valid
        .iter()
        .filter_map(|r| r.external_id.as_deref())
        .collect();
    let existing = existing_external_ids(&mut tx, &incoming_ids, chunk_size).await?;

    let mut seen: HashSet<String> = HashSet::new();
    let mut survivors: Vec<ValidatedImportRow> = Vec::with_capacity(valid.len());
    for row in valid {
        if let Some(ext) = &row.external_id {
            if existing.contains(ext) || !seen.insert(ext.clone()) {
                skipped += 1;
                continue;
            }
        }
        survivors.push(row);
    }

    let Some(first) = survivors.first() else {
        debug!(skipped, "import contained only duplicates");
        return Ok(ImportOutcome {
            imported: 0,
            skipped,
            batch_id: None,
        });
    };

    let mut totals: BTreeMap<AccountId, i64> = BTreeMap::new();
    for row in &survivors {
        *totals.entry(row.account_id).or_default() += row.amount_cents;
    }
    let batch_total: i64 = totals.values().sum();

    let batch_id = ImportBatchId(
        sqlx::query(
            "INSERT INTO import_batches (account_id, filename, transaction_count, total_amount_cents, preserve_balance)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(first.account_id.0)
        .bind(filename)
        .bind(survivors.len() as i64)
        .bind(batch_total)
        .bind(options.preserve_balance as i64)
        .execute(&mut *tx)
        .await?
        .last_insert_rowid(),
    );

    for chunk in survivors.chunks(chunk_size) {
        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
            "INSERT INTO transactions (account_id, date, amount_cents, currency, description, merchant, external_id, import_batch_id) ",
        );
        qb.push_values(chunk, |mut b, row| {
            let currency = row.currency.clone().unwrap_or_else(|| {
                accounts
                    .get(&row.account_id)
                    .map(|a| a.currency.clone())
                    .unwrap_or_default()
            });
            b.push_bind(row.account_id.0)
                .push_bind(row.date)
                .push_bind(row.amount_cents)
                .push_bind(currency)
                .push_bind(row.description.clone())
                .push_bind(row.merchant.clone())
                .push_bind(row.external_id.clone())
                .push_bind(batch_id.0);
        });
        qb.build().execute(&mut *tx).await?;
    }

    let mode = BalanceMode::from(options);
    for (account_id, total) in &totals {
        apply_balance_delta(&mut tx, *account_id, *total, mode).await?;
    }
    tx.commit().await?;

    info!(
        %batch_id,
        imported = survivors.len(),
        skipped,
        total_cents = batch_total,
        ?mode,
        "import committed"
    );
    Ok(ImportOutcome {
        imported: survivors.len(),
        skipped,
        batch_id: Some(batch_id),
    })
}

async fn existing_external_ids(
    conn: &mut SqliteConnection,
    ids: &[&str],
    chunk_size: usize,
) -> Result<HashSet<String>, StorageError> {
    let mut existing = HashSet::new();
    for chunk in ids.chunks(chunk_size) {
        let mut qb: QueryBuilder<Sqlite> =
            QueryBuilder::new("SELECT external_id FROM transactions WHERE external_id IN (");
        let mut separated = qb.separated(", ");
        for id in chunk {
            separated.push_bind(*id);
        }
        separated.push_unseparated(")");
        let found: Vec<String> = qb
            .build_query_scalar::<String>()
            .fetch_all(&mut *conn)
            .await?;
        existing.extend(found);
    }
    Ok(existing)
}

/// Newest first.
pub async fn get_import_batches(pool: &DbPool) -> Result<Vec<ImportBatch>, StorageError> {
    let rows = sqlx::query_as::<_, BatchRow>(
        "SELECT id, account_id, filename, transaction_count, total_amount_cents, preserve_balance, imported_at
         FROM import_batches ORDER BY imported_at DESC, id DESC",
    )
    .fetch_all(pool)
    .await?;
    Ok(rows.into_iter().map(map_batch).collect())
}

/// Removes a batch and reverses exactly what its remaining rows contributed.
pub async fn delete_import_batch(
    pool: &DbPool,
    batch_id: ImportBatchId,
) -> Result<DeleteOutcome, StorageError> {
    let mut tx = pool.begin().await?;
    let batch = sqlx::query_as::<_, BatchRow>(
        "SELECT id, account_id, filename, transaction_count, total_amount_cents, preserve_balance, imported_at
         FROM import_batches WHERE id = ?",
    )
    .bind(batch_id.0)
    .fetch_optional(&mut *tx)
    .await?
    .map(map_batch)
    .ok_or_else(|| StorageError::not_found("import batch", batch_id.0))?;

    let sums = sqlx::query_as::<_, (i64, i64)>(
        "SELECT account_id, SUM(amount_cents) FROM transactions WHERE import_batch_id = ? GROUP BY account_id",
    )
    .bind(batch_id.0)
    .fetch_all(&mut *tx)
    .await?;

    sqlx::query(
        "UPDATE transactions SET linked_transaction_id = NULL, is_transfer = 0
         WHERE linked_transaction_id IN (SELECT id FROM transactions WHERE import_batch_id = ?)",
    )
    .bind(batch_id.0)
    .execute(&mut *tx)
    .await?;

    let deleted = sqlx::query("DELETE FROM transactions WHERE import_batch_id = ?")
        .bind(batch_id.0)
        .execute(&mut *tx)
        .await?
        .rows_affected();

    let mode = if batch.preserve_balance {
        BalanceMode::PreserveCurrent
    } else {
        BalanceMode::Incremental
    };
    for (account_id, sum) in sums {
        apply_balance_delta(&mut tx, AccountId(account_id), -sum, mode).await?;
    }

    sqlx::query("DELETE FROM import_batches WHERE id = ?")
        .bind(batch_id.0)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;

    info!(%batch_id, deleted, ?mode, "import batch deleted");
    Ok(DeleteOutcome { deleted })
}

/// Full reset. Rows from historical imports give their sum back to the
/// opening balance; everything else is taken off the current balance.
pub async fn delete_all_transactions(pool: &DbPool) -> Result<DeleteOutcome, StorageError> {
    let mut tx = pool.begin().await?;
    let sums = sqlx::query_as::<_, (i64, i64, i64)>(
        "SELECT t.account_id, COALESCE(b.preserve_balance, 0), SUM(t.amount_cents)
         FROM transactions t LEFT JOIN import_batches b ON b.id = t.import_batch_id
         GROUP BY t.account_id, COALESCE(b.preserve_balance, 0)",
    )
    .fetch_all(&mut *tx)
    .await?;

    sqlx::query("UPDATE transactions SET linked_transaction_id = NULL")
        .execute(&mut *tx)
        .await?;
    let deleted = sqlx::query("DELETE FROM transactions")
        .execute(&mut *tx)
        .await?
        .rows_affected();
    sqlx::query("DELETE FROM import_batches")
        .execute(&mut *tx)
        .await?;

    for (account_id, preserve, sum) in sums {
        let mode = if preserve != 0 {
            BalanceMode::PreserveCurrent
        } else {
            BalanceMode::Incremental
        };
        apply_balance_delta(&mut tx, AccountId(account_id), -sum, mode).await?;
    }
    tx.commit().await?;

    info!(deleted, "all transactions deleted");
    Ok(DeleteOutcome { deleted })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accounts::{get_account, insert_account};
    use crate::balance::recalculate_account_balance;
    use crate::db::test_support::test_db;
    use crate::transactions::{get_all_transactions, insert_transaction};
    use crate::transfers::mark_as_transfer;
    use chrono::NaiveDate;
    use ledgerly_core::{AccountType, LedgerError, NewAccount, NewTransaction};

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
    }

    fn row(account: AccountId, d: u32, amount: i64, ext: Option<&str>) -> ImportRow {
        ImportRow {
            account_id: account,
            date: date(d),
            amount_cents: amount,
            description: format!("row {d} {amount}"),
            merchant: None,
            currency: None,
            external_id: ext.map(str::to_string),
        }
    }

    async fn account(pool: &DbPool, opening: i64) -> AccountId {
        insert_account(
            pool,
            &NewAccount::new("Checking", AccountType::Checking, "EUR").with_opening_balance(opening),
        )
        .await
        .unwrap()
        .id
    }

    async fn balances(pool: &DbPool, id: AccountId) -> (i64, i64) {
        let a = get_account(pool, id).await.unwrap();
        (a.opening_balance_cents, a.current_balance_cents)
    }

    #[tokio::test]
    async fn duplicate_in_same_call_is_skipped() {
        let (pool, _dir) = test_db().await;
        let acc = account(&pool, 0).await;
        let rows = vec![row(acc, 1, -500, Some("h1")), row(acc, 1, -500, Some("h1"))];
        let outcome = import_with_dedup(&pool, rows, None, ImportOptions::default(), DEFAULT_CHUNK_SIZE)
            .await
            .unwrap();
        assert_eq!(outcome.imported, 1);
        assert_eq!(outcome.skipped, 1);
        assert!(outcome.batch_id.is_some());
        assert_eq!(balances(&pool, acc).await, (0, -500));
    }

    #[tokio::test]
    async fn reimport_is_fully_skipped_without_a_batch() {
        let (pool, _dir) = test_db().await;
        let acc = account(&pool, 0).await;
        let rows = vec![row(acc, 1, -500, Some("a")), row(acc, 2, 900, Some("b"))];
        import_with_dedup(&pool, rows.clone(), Some("jan.csv"), ImportOptions::default(), 50)
            .await
            .unwrap();
        let again = import_with_dedup(&pool, rows, Some("jan.csv"), ImportOptions::default(), 50)
            .await
            .unwrap();
        assert_eq!(again.imported, 0);
        assert_eq!(again.skipped, 2);
        assert_eq!(again.batch_id, None);
        assert_eq!(get_import_batches(&pool).await.unwrap().len(), 1);
        assert_eq!(balances(&pool, acc).await, (0, 400));
    }

    #[tokio::test]
    async fn rows_without_external_id_are_always_imported_and_zero_rows_dropped() {
        let (pool, _dir) = test_db().await;
        let acc = account(&pool, 0).await;
        let rows = vec![row(acc, 1, -100, None), row(acc, 1, -100, None), row(acc, 2, 0, Some("z"))];
        let outcome = import_with_dedup(&pool, rows, None, ImportOptions::default(), 50)
            .await
            .unwrap();
        assert_eq!(outcome.imported, 2);
        assert_eq!(outcome.skipped, 1);
    }

    #[tokio::test]
    async fn chunked_insert_and_batch_metadata() {
        let (pool, _dir) = test_db().await;
        let acc = account(&pool, 1_000).await;
        let ids: Vec<String> = (1..=7).map(|i| format!("ext-{i}")).collect();
        let rows: Vec<ImportRow> = ids
            .iter()
            .enumerate()
            .map(|(i, ext)| row(acc, i as u32 + 1, -(i as i64 + 1) * 100, Some(ext.as_str())))
            .collect();
        let outcome = import_with_dedup(&pool, rows, Some("bank.csv"), ImportOptions::default(), 3)
            .await
            .unwrap();
        assert_eq!(outcome.imported, 7);

        let batches = get_import_batches(&pool).await.unwrap();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].transaction_count, 7);
        assert_eq!(batches[0].total_amount_cents, -2_800);
        assert_eq!(batches[0].filename.as_deref(), Some("bank.csv"));
        assert_eq!(get_all_transactions(&pool).await.unwrap().len(), 7);
        assert_eq!(balances(&pool, acc).await, (1_000, -1_800));
        assert_eq!(recalculate_account_balance(&pool, acc).await.unwrap(), -1_800);
    }

    #[tokio::test]
    async fn preserve_balance_moves_opening_only() {
        let (pool, _dir) = test_db().await;
        let acc = account(&pool, 50_000).await;
        let rows = vec![row(acc, 1, -2_000, Some("p1")), row(acc, 2, 500, Some("p2"))];
        let outcome = import_with_dedup(
            &pool,
            rows,
            Some("history.csv"),
            ImportOptions { preserve_balance: true },
            50,
        )
        .await
        .unwrap();
        assert_eq!(outcome.imported, 2);
        assert_eq!(balances(&pool, acc).await, (51_500, 50_000));
        assert_eq!(recalculate_account_balance(&pool, acc).await.unwrap(), 50_000);

        delete_import_batch(&pool, outcome.batch_id.unwrap()).await.unwrap();
        assert_eq!(balances(&pool, acc).await, (50_000, 50_000));
    }

    #[tokio::test]
    async fn undo_then_reimport_round_trips_balances() {
        let (pool, _dir) = test_db().await;
        let acc = account(&pool, 0).await;
        insert_transaction(&pool, &NewTransaction::new(acc, date(20), 10_000, "salary"))
            .await
            .unwrap();
        let rows = vec![row(acc, 1, -1_234, Some("r1")), row(acc, 2, -766, Some("r2"))];

        let first = import_with_dedup(&pool, rows.clone(), None, ImportOptions::default(), 50)
            .await
            .unwrap();
        let after_import = balances(&pool, acc).await;
        assert_eq!(after_import, (0, 8_000));

        let undone = delete_import_batch(&pool, first.batch_id.unwrap()).await.unwrap();
        assert_eq!(undone.deleted, 2);
        assert_eq!(balances(&pool, acc).await, (0, 10_000));
        assert!(get_import_batches(&pool).await.unwrap().is_empty());

        let second = import_with_dedup(&pool, rows, None, ImportOptions::default(), 50)
            .await
            .unwrap();
        assert_eq!(second.imported, 2);
        assert_eq!(balances(&pool, acc).await, after_import);
    }

    #[tokio::test]
    async fn deleting_a_batch_unlinks_transfers_outside_it() {
        let (pool, _dir) = test_db().await;
        let a = account(&pool, 0).await;
        let b = insert_account(&pool, &NewAccount::new("Savings", AccountType::Savings, "EUR"))
            .await
            .unwrap()
            .id;
        let outcome = import_with_dedup(&pool, vec![row(a, 3, -4_200, Some("t"))], None, ImportOptions::default(), 50)
            .await
            .unwrap();
        let imported = get_all_transactions(&pool).await.unwrap().remove(0);
        let manual = insert_transaction(&pool, &NewTransaction::new(b, date(3), 4_200, "from checking"))
            .await
            .unwrap();
        mark_as_transfer(&pool, imported.id, manual.id).await.unwrap();

        delete_import_batch(&pool, outcome.batch_id.unwrap()).await.unwrap();
        let remaining = get_all_transactions(&pool).await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert!(!remaining[0].is_transfer);
        assert_eq!(remaining[0].linked_transaction_id, None);
    }

    #[tokio::test]
    async fn failure_leaves_nothing_behind() {
        let (pool, _dir) = test_db().await;
        let acc = account(&pool, 0).await;
        let rows = vec![row(acc, 1, -100, Some("ok")), row(AccountId(999), 1, -100, Some("bad"))];
        let err = import_with_dedup(&pool, rows, None, ImportOptions::default(), 50)
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::Ledger(LedgerError::AccountNotFound(_))));
        assert!(get_all_transactions(&pool).await.unwrap().is_empty());
        assert!(get_import_batches(&pool).await.unwrap().is_empty());
        assert_eq!(balances(&pool, acc).await, (0, 0));

        let mut blank = row(acc, 1, -100, Some("blank"));
        blank.description = " ".to_string();
        assert!(import_with_dedup(&pool, vec![row(acc, 2, -5, None), blank], None, ImportOptions::default(), 50)
            .await
            .is_err());
        assert!(get_all_transactions(&pool).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn full_reset_reverses_each_mode() {
        let (pool, _dir) = test_db().await;
        let acc = account(&pool, 10_000).await;
        insert_transaction(&pool, &NewTransaction::new(acc, date(9), -300, "manual"))
            .await
            .unwrap();
        import_with_dedup(&pool, vec![row(acc, 1, -1_000, Some("x"))], None, ImportOptions { preserve_balance: true }, 50)
            .await
            .unwrap();
        import_with_dedup(&pool, vec![row(acc, 2, 2_500, Some("y"))], None, ImportOptions::default(), 50)
            .await
            .unwrap();
        assert_eq!(balances(&pool, acc).await, (11_000, 12_200));

        let outcome = delete_all_transactions(&pool).await.unwrap();
        assert_eq!(outcome.deleted, 3);
        assert_eq!(balances(&pool, acc).await, (10_000, 10_000));
        assert!(get_import_batches(&pool).await.unwrap().is_empty());
    }
}
