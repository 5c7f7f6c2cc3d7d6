use ledgerly_core::{Account, AccountId, AccountType, AccountUpdate, LedgerError, NewAccount};
use sqlx::SqliteConnection;

use crate::db::DbPool;
use crate::error::StorageError;

type AccountRow = (
    i64,
    String,
    String,
    String,
    Option<String>,
    Option<String>,
    i64,
    i64,
    i64,
    Option<i64>,
    i64,
);

const ACCOUNT_COLUMNS: &str = "id, name, account_type, currency, institution, color, \
     opening_balance_cents, current_balance_cents, is_active, linked_to_account_id, hide_from_dashboard";

fn map_account(r: AccountRow) -> Result<Account, StorageError> {
    Ok(Account {
        id: AccountId(r.0),
        name: r.1,
        account_type: r.2.parse::<AccountType>()?,
        currency: r.3,
        institution: r.4,
        color: r.5,
        opening_balance_cents: r.6,
        current_balance_cents: r.7,
        is_active: r.8 != 0,
        linked_to_account_id: r.9.map(AccountId),
        hide_from_dashboard: r.10 != 0,
    })
}

pub async fn insert_account(pool: &DbPool, account: &NewAccount) -> Result<Account, StorageError> {
    account.validate()?;

    let result = sqlx::query(
        "INSERT INTO accounts (name, account_type, currency, institution, color, opening_balance_cents, current_balance_cents)
         VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(account.name.trim())
    .bind(account.account_type.as_str())
    .bind(&account.currency)
    .bind(&account.institution)
    .bind(&account.color)
    .bind(account.opening_balance_cents)
    .bind(account.opening_balance_cents)
    .execute(pool)
    .await?;

    get_account(pool, AccountId(result.last_insert_rowid())).await
}

/// Active accounts only.
pub async fn get_accounts(pool: &DbPool) -> Result<Vec<Account>, StorageError> {
    let rows = sqlx::query_as::<_, AccountRow>(&format!(
        "SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE is_active = 1 ORDER BY name"
    ))
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(map_account).collect()
}

pub async fn get_account(pool: &DbPool, id: AccountId) -> Result<Account, StorageError> {
    let mut conn = pool.acquire().await?;
    fetch_account(&mut conn, id).await
}

pub(crate) async fn fetch_account(
    conn: &mut SqliteConnection,
    id: AccountId,
) -> Result<Account, StorageError> {
    let row = sqlx::query_as::<_, AccountRow>(&format!(
        "SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE id = ?"
    ))
    .bind(id.0)
    .fetch_optional(&mut *conn)
    .await?;

    match row {
        Some(r) => map_account(r),
        None => Err(LedgerError::AccountNotFound(id).into()),
    }
}

/// Fails unless the account exists and has not been soft-deleted.
pub(crate) async fn require_active(
    conn: &mut SqliteConnection,
    id: AccountId,
) -> Result<Account, StorageError> {
    let account = fetch_account(conn, id).await?;
    if !account.is_active {
        return Err(LedgerError::InactiveAccount(id).into());
    }
    Ok(account)
}

/// Display fields only; balances are never written here.
pub async fn update_account(
    pool: &DbPool,
    id: AccountId,
    update: &AccountUpdate,
) -> Result<Account, StorageError> {
    if let Some(name) = &update.name {
        if name.trim().is_empty() {
            return Err(LedgerError::validation("account name is required").into());
        }
    }
    if update.linked_to_account_id == Some(Some(id)) {
        return Err(LedgerError::validation("an account cannot be linked to itself").into());
    }

    let mut tx = pool.begin().await?;
    let current = fetch_account(&mut tx, id).await?;
    if let Some(Some(target)) = update.linked_to_account_id {
        fetch_account(&mut tx, target).await?;
    }

    let linked = match update.linked_to_account_id {
        Some(link) => link,
        None => current.linked_to_account_id,
    };

    sqlx::query(
        "UPDATE accounts SET name = ?, institution = ?, color = ?, hide_from_dashboard = ?, linked_to_account_id = ?
         WHERE id = ?",
    )
    .bind(update.name.as_deref().map(str::trim).unwrap_or(&current.name))
    .bind(update.institution.as_ref().or(current.institution.as_ref()))
    .bind(update.color.as_ref().or(current.color.as_ref()))
    .bind(update.hide_from_dashboard.unwrap_or(current.hide_from_dashboard) as i64)
    .bind(linked.map(|a| a.0))
    .bind(id.0)
    .execute(&mut *tx)
    .await?;

    let account = fetch_account(&mut tx, id).await?;
    tx.commit().await?;
    Ok(account)
}

/// Soft delete: transactions stay valid and keep referencing the account.
pub async fn deactivate_account(pool: &DbPool, id: AccountId) -> Result<(), StorageError> {
    let result = sqlx::query("UPDATE accounts SET is_active = 0 WHERE id = ?")
        .bind(id.0)
        .execute(pool)
        .await?;
    if result.rows_affected() == 0 {
        return Err(LedgerError::AccountNotFound(id).into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::test_db;

    #[tokio::test]
    async fn create_sets_current_to_opening() {
        let (pool, _dir) = test_db().await;
        let acc = insert_account(
            &pool,
            &NewAccount::new("Checking", AccountType::Checking, "EUR").with_opening_balance(10_000),
        )
        .await
        .unwrap();
        assert_eq!(acc.opening_balance_cents, 10_000);
        assert_eq!(acc.current_balance_cents, 10_000);
        assert!(acc.is_active);
    }

    #[tokio::test]
    async fn invalid_account_is_rejected_before_insert() {
        let (pool, _dir) = test_db().await;
        let err = insert_account(&pool, &NewAccount::new("  ", AccountType::Cash, "EUR"))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::Ledger(LedgerError::Validation(_))));
        assert!(get_accounts(&pool).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn update_keeps_balances_and_rejects_self_link() {
        let (pool, _dir) = test_db().await;
        let a = insert_account(&pool, &NewAccount::new("Main", AccountType::Checking, "EUR").with_opening_balance(500))
            .await
            .unwrap();
        let b = insert_account(&pool, &NewAccount::new("Card", AccountType::CreditCard, "EUR"))
            .await
            .unwrap();

        let updated = update_account(
            &pool,
            a.id,
            &AccountUpdate {
                name: Some("Main account".to_string()),
                linked_to_account_id: Some(Some(b.id)),
                ..AccountUpdate::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(updated.name, "Main account");
        assert_eq!(updated.linked_to_account_id, Some(b.id));
        assert_eq!(updated.current_balance_cents, 500);

        let err = update_account(
            &pool,
            a.id,
            &AccountUpdate {
                linked_to_account_id: Some(Some(a.id)),
                ..AccountUpdate::default()
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, StorageError::Ledger(LedgerError::Validation(_))));

        let cleared = update_account(
            &pool,
            a.id,
            &AccountUpdate {
                linked_to_account_id: Some(None),
                ..AccountUpdate::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(cleared.linked_to_account_id, None);
        assert_eq!(cleared.name, "Main account");
    }

    #[tokio::test]
    async fn deactivated_accounts_are_hidden() {
        let (pool, _dir) = test_db().await;
        let a = insert_account(&pool, &NewAccount::new("Old", AccountType::Savings, "EUR"))
            .await
            .unwrap();
        deactivate_account(&pool, a.id).await.unwrap();
        assert!(get_accounts(&pool).await.unwrap().is_empty());
        assert!(!get_account(&pool, a.id).await.unwrap().is_active);
        assert!(deactivate_account(&pool, AccountId(999)).await.is_err());
    }
}
