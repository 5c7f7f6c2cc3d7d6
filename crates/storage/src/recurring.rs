use chrono::NaiveDate;
use ledgerly_core::{
    AccountId, CategoryId, Frequency, NewRecurringRule, RecurringRule, RecurringRuleId,
    RecurringRuleUpdate,
};
use sqlx::SqliteConnection;

use crate::accounts::require_active;
use crate::categories::require_category;
use crate::db::DbPool;
use crate::error::StorageError;

type RecurringRow = (
    i64,
    i64,
    Option<i64>,
    String,
    i64,
    String,
    String,
    NaiveDate,
    Option<NaiveDate>,
    NaiveDate,
    Option<i64>,
    i64,
);

const RECURRING_COLUMNS: &str = "id, account_id, category_id, name, amount_cents, currency, \
     frequency, start_date, end_date, next_date, day_of_month, is_active";

fn map_recurring(r: RecurringRow) -> Result<RecurringRule, StorageError> {
    Ok(RecurringRule {
        id: RecurringRuleId(r.0),
        account_id: AccountId(r.1),
        category_id: r.2.map(CategoryId),
        name: r.3,
        amount_cents: r.4,
        currency: r.5,
        frequency: r.6.parse::<Frequency>()?,
        start_date: r.7,
        end_date: r.8,
        next_date: r.9,
        day_of_month: r.10.and_then(|d| u32::try_from(d).ok()),
        is_active: r.11 != 0,
    })
}

async fn fetch_recurring_rule(
    conn: &mut SqliteConnection,
    id: RecurringRuleId,
) -> Result<RecurringRule, StorageError> {
    let row = sqlx::query_as::<_, RecurringRow>(&format!(
        "SELECT {RECURRING_COLUMNS} FROM recurring_rules WHERE id = ?"
    ))
    .bind(id.0)
    .fetch_optional(&mut *conn)
    .await?;
    match row {
        Some(r) => map_recurring(r),
        None => Err(StorageError::not_found("recurring rule", id.0)),
    }
}

/// `next_date` starts at `start_date`; the currency follows the account.
pub async fn insert_recurring_rule(
    pool: &DbPool,
    input: &NewRecurringRule,
) -> Result<RecurringRule, StorageError> {
    input.validate()?;
    let mut tx = pool.begin().await?;
    let account = require_active(&mut tx, input.account_id).await?;
    if let Some(category_id) = input.category_id {
        require_category(&mut tx, category_id).await?;
    }

    let result = sqlx::query(
        "INSERT INTO recurring_rules (account_id, category_id, name, amount_cents, currency, frequency, start_date, end_date, next_date, day_of_month)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(input.account_id.0)
    .bind(input.category_id.map(|c| c.0))
    .bind(input.name.trim())
    .bind(input.amount_cents)
    .bind(&account.currency)
    .bind(input.frequency.as_str())
    .bind(input.start_date)
    .bind(input.end_date)
    .bind(input.start_date)
    .bind(input.day_of_month.map(i64::from))
    .execute(&mut *tx)
    .await?;

    let rule = fetch_recurring_rule(&mut tx, RecurringRuleId(result.last_insert_rowid())).await?;
    tx.commit().await?;
    Ok(rule)
}

/// Active rules, soonest due first.
pub async fn get_recurring_rules(pool: &DbPool) -> Result<Vec<RecurringRule>, StorageError> {
    let rows = sqlx::query_as::<_, RecurringRow>(&format!(
        "SELECT {RECURRING_COLUMNS} FROM recurring_rules WHERE is_active = 1 ORDER BY next_date, id"
    ))
    .fetch_all(pool)
    .await?;
    rows.into_iter().map(map_recurring).collect()
}

pub async fn update_recurring_rule(
    pool: &DbPool,
    id: RecurringRuleId,
    update: &RecurringRuleUpdate,
) -> Result<RecurringRule, StorageError> {
    update.validate()?;
    let mut tx = pool.begin().await?;
    let current = fetch_recurring_rule(&mut tx, id).await?;
    if let Some(category_id) = update.category_id {
        require_category(&mut tx, category_id).await?;
    }

    sqlx::query(
        "UPDATE recurring_rules SET name = ?, amount_cents = ?, frequency = ?, category_id = ?, day_of_month = ?, next_date = ?
         WHERE id = ?",
    )
    .bind(update.name.as_deref().map(str::trim).unwrap_or(&current.name))
    .bind(update.amount_cents.unwrap_or(current.amount_cents))
    .bind(update.frequency.unwrap_or(current.frequency).as_str())
    .bind(update.category_id.or(current.category_id).map(|c| c.0))
    .bind(update.day_of_month.or(current.day_of_month).map(i64::from))
    .bind(update.next_date.unwrap_or(current.next_date))
    .bind(id.0)
    .execute(&mut *tx)
    .await?;

    let rule = fetch_recurring_rule(&mut tx, id).await?;
    tx.commit().await?;
    Ok(rule)
}

/// Soft delete.
pub async fn deactivate_recurring_rule(
    pool: &DbPool,
    id: RecurringRuleId,
) -> Result<(), StorageError> {
    let result = sqlx::query("UPDATE recurring_rules SET is_active = 0 WHERE id = ?")
        .bind(id.0)
        .execute(pool)
        .await?;
    if result.rows_affected() == 0 {
        return Err(StorageError::not_found("recurring rule", id.0));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accounts::insert_account;
    use crate::db::test_support::test_db;
    use ledgerly_core::{AccountType, LedgerError, NewAccount};

    fn netflix(account_id: AccountId) -> NewRecurringRule {
        NewRecurringRule {
            account_id,
            name: "Netflix".to_string(),
            amount_cents: -1599,
            frequency: Frequency::Monthly,
            start_date: NaiveDate::from_ymd_opt(2024, 1, 3).unwrap(),
            category_id: None,
            day_of_month: Some(3),
            end_date: None,
        }
    }

    #[tokio::test]
    async fn create_update_and_soft_delete() {
        let (pool, _dir) = test_db().await;
        let acc = insert_account(&pool, &NewAccount::new("Card", AccountType::CreditCard, "NOK"))
            .await
            .unwrap();

        let rule = insert_recurring_rule(&pool, &netflix(acc.id)).await.unwrap();
        assert_eq!(rule.next_date, rule.start_date);
        assert_eq!(rule.currency, "NOK");
        assert_eq!(rule.day_of_month, Some(3));

        let updated = update_recurring_rule(
            &pool,
            rule.id,
            &RecurringRuleUpdate {
                amount_cents: Some(-1799),
                frequency: Some(Frequency::Yearly),
                ..RecurringRuleUpdate::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(updated.amount_cents, -1799);
        assert_eq!(updated.frequency, Frequency::Yearly);
        assert_eq!(updated.name, "Netflix");

        deactivate_recurring_rule(&pool, rule.id).await.unwrap();
        assert!(get_recurring_rules(&pool).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn out_of_range_day_is_rejected() {
        let (pool, _dir) = test_db().await;
        let acc = insert_account(&pool, &NewAccount::new("Card", AccountType::CreditCard, "EUR"))
            .await
            .unwrap();
        let mut input = netflix(acc.id);
        input.day_of_month = Some(32);
        let err = insert_recurring_rule(&pool, &input).await.unwrap_err();
        assert!(matches!(err, StorageError::Ledger(LedgerError::Validation(_))));
    }
}
