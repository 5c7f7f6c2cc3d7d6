//! Account balance maintenance.
//!
//! `current_balance_cents == opening_balance_cents + sum(amount_cents)` holds
//! for every account. Writes keep it true incrementally, inside the same
//! database transaction as the row change. [`recalculate_account_balance`]
//! is the explicit repair tool and is never run implicitly.

use ledgerly_core::{AccountId, ImportOptions, LedgerError};
use serde::{Deserialize, Serialize};
use sqlx::SqliteConnection;
use tracing::{info, warn};

use crate::accounts::fetch_account;
use crate::db::DbPool;
use crate::error::StorageError;

/// How a signed delta lands on an account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BalanceMode {
    /// `current += delta`.
    Incremental,
    /// Historical import: `opening -= delta`, current balance untouched.
    PreserveCurrent,
}

impl From<ImportOptions> for BalanceMode {
    fn from(options: ImportOptions) -> Self {
        if options.preserve_balance {
            BalanceMode::PreserveCurrent
        } else {
            BalanceMode::Incremental
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceCheck {
    pub account_id: AccountId,
    pub stored_cents: i64,
    pub computed_cents: i64,
    pub drift_cents: i64,
}

pub(crate) async fn apply_balance_delta(
    conn: &mut SqliteConnection,
    account_id: AccountId,
    delta_cents: i64,
    mode: BalanceMode,
) -> Result<(), StorageError> {
    if delta_cents == 0 {
        return Ok(());
    }
    let sql = match mode {
        BalanceMode::Incremental => {
            "UPDATE accounts SET current_balance_cents = current_balance_cents + ? WHERE id = ?"
        }
        BalanceMode::PreserveCurrent => {
            "UPDATE accounts SET opening_balance_cents = opening_balance_cents - ? WHERE id = ?"
        }
    };
    let result = sqlx::query(sql)
        .bind(delta_cents)
        .bind(account_id.0)
        .execute(&mut *conn)
        .await?;
    if result.rows_affected() == 0 {
        return Err(LedgerError::AccountNotFound(account_id).into());
    }
    Ok(())
}

pub(crate) async fn ledger_sum(
    conn: &mut SqliteConnection,
    account_id: AccountId,
) -> Result<i64, StorageError> {
    let sum: i64 = sqlx::query_scalar(
        "SELECT COALESCE(SUM(amount_cents), 0) FROM transactions WHERE account_id = ?",
    )
    .bind(account_id.0)
    .fetch_one(&mut *conn)
    .await?;
    Ok(sum)
}

/// Sets `current = opening + sum(transactions)` and returns the new balance.
pub async fn recalculate_account_balance(
    pool: &DbPool,
    account_id: AccountId,
) -> Result<i64, StorageError> {
    let mut tx = pool.begin().await?;
    let account = fetch_account(&mut tx, account_id).await?;
    let computed = account.opening_balance_cents + ledger_sum(&mut tx, account_id).await?;

    sqlx::query("UPDATE accounts SET current_balance_cents = ? WHERE id = ?")
        .bind(computed)
        .bind(account_id.0)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;

    if computed != account.current_balance_cents {
        info!(
            %account_id,
            previous = account.current_balance_cents,
            computed,
            "repaired account balance"
        );
    }
    Ok(computed)
}

/// Read-only drift check. Never repairs.
pub async fn verify_account_balance(
    pool: &DbPool,
    account_id: AccountId,
) -> Result<BalanceCheck, StorageError> {
    let mut conn = pool.acquire().await?;
    let account = fetch_account(&mut conn, account_id).await?;
    let computed = account.opening_balance_cents + ledger_sum(&mut conn, account_id).await?;
    let drift = account.current_balance_cents - computed;
    if drift != 0 {
        warn!(
            %account_id,
            stored = account.current_balance_cents,
            computed,
            drift,
            "account balance drift detected"
        );
    }
    Ok(BalanceCheck {
        account_id,
        stored_cents: account.current_balance_cents,
        computed_cents: computed,
        drift_cents: drift,
    })
}
