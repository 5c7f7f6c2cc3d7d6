use ledgerly_core::{
    Category, CategoryId, CategoryRule, LedgerError, NewCategory, NewCategoryRule, RuleId,
    RuleMatchType, RuleUpdate,
};
use sqlx::SqliteConnection;

use crate::db::DbPool;
use crate::error::StorageError;

type CategoryRow = (i64, String, Option<String>, Option<String>, i64, Option<i64>);
type RuleRow = (i64, i64, String, String, i64, i64, i64);

const RULE_COLUMNS: &str = "id, category_id, pattern, match_type, case_sensitive, priority, is_active";

fn map_category(r: CategoryRow) -> Category {
    Category {
        id: CategoryId(r.0),
        name: r.1,
        icon: r.2,
        color: r.3,
        is_income: r.4 != 0,
        parent_id: r.5.map(CategoryId),
    }
}

fn map_rule(r: RuleRow) -> Result<CategoryRule, StorageError> {
    Ok(CategoryRule {
        id: RuleId(r.0),
        category_id: CategoryId(r.1),
        pattern: r.2,
        match_type: r.3.parse::<RuleMatchType>()?,
        case_sensitive: r.4 != 0,
        priority: r.5,
        is_active: r.6 != 0,
    })
}

pub async fn get_categories(pool: &DbPool) -> Result<Vec<Category>, StorageError> {
    let rows = sqlx::query_as::<_, CategoryRow>(
        "SELECT id, name, icon, color, is_income, parent_id FROM categories ORDER BY is_income DESC, name",
    )
    .fetch_all(pool)
    .await?;
    Ok(rows.into_iter().map(map_category).collect())
}

pub(crate) async fn require_category(
    conn: &mut SqliteConnection,
    id: CategoryId,
) -> Result<Category, StorageError> {
    let row = sqlx::query_as::<_, CategoryRow>(
        "SELECT id, name, icon, color, is_income, parent_id FROM categories WHERE id = ?",
    )
    .bind(id.0)
    .fetch_optional(&mut *conn)
    .await?;
    row.map(map_category)
        .ok_or_else(|| LedgerError::CategoryNotFound(id).into())
}

pub async fn insert_category(pool: &DbPool, input: &NewCategory) -> Result<Category, StorageError> {
    if input.name.trim().is_empty() {
        return Err(LedgerError::validation("category name is required").into());
    }
    let mut tx = pool.begin().await?;
    if let Some(parent) = input.parent_id {
        require_category(&mut tx, parent).await?;
    }
    let result = sqlx::query(
        "INSERT INTO categories (name, icon, color, is_income, parent_id) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(input.name.trim())
    .bind(&input.icon)
    .bind(&input.color)
    .bind(input.is_income as i64)
    .bind(input.parent_id.map(|p| p.0))
    .execute(&mut *tx)
    .await?;
    let category = require_category(&mut tx, CategoryId(result.last_insert_rowid())).await?;
    tx.commit().await?;
    Ok(category)
}

/// All rules, highest priority first; ties keep creation order.
pub async fn get_category_rules(pool: &DbPool) -> Result<Vec<CategoryRule>, StorageError> {
    let rows = sqlx::query_as::<_, RuleRow>(&format!(
        "SELECT {RULE_COLUMNS} FROM category_rules ORDER BY priority DESC, id ASC"
    ))
    .fetch_all(pool)
    .await?;
    rows.into_iter().map(map_rule).collect()
}

async fn fetch_rule(conn: &mut SqliteConnection, id: RuleId) -> Result<CategoryRule, StorageError> {
    let row = sqlx::query_as::<_, RuleRow>(&format!(
        "SELECT {RULE_COLUMNS} FROM category_rules WHERE id = ?"
    ))
    .bind(id.0)
    .fetch_optional(&mut *conn)
    .await?;
    match row {
        Some(r) => map_rule(r),
        None => Err(StorageError::not_found("category rule", id.0)),
    }
}

/// Malformed regex patterns are stored as-is; the engine treats them as never matching.
pub async fn insert_category_rule(
    pool: &DbPool,
    input: &NewCategoryRule,
) -> Result<CategoryRule, StorageError> {
    input.validate()?;
    let mut tx = pool.begin().await?;
    require_category(&mut tx, input.category_id).await?;
    let result = sqlx::query(
        "INSERT INTO category_rules (category_id, pattern, match_type, case_sensitive, priority)
         VALUES (?, ?, ?, ?, ?)",
    )
    .bind(input.category_id.0)
    .bind(input.pattern.as_str())
    .bind(input.match_type.as_str())
    .bind(input.case_sensitive as i64)
    .bind(input.priority)
    .execute(&mut *tx)
    .await?;
    let rule = fetch_rule(&mut tx, RuleId(result.last_insert_rowid())).await?;
    tx.commit().await?;
    Ok(rule)
}

pub async fn update_category_rule(
    pool: &DbPool,
    id: RuleId,
    update: &RuleUpdate,
) -> Result<CategoryRule, StorageError> {
    if let Some(pattern) = &update.pattern {
        if pattern.trim().is_empty() {
            return Err(LedgerError::validation("rule pattern is required").into());
        }
    }
    let mut tx = pool.begin().await?;
    let current = fetch_rule(&mut tx, id).await?;
    if let Some(category_id) = update.category_id {
        require_category(&mut tx, category_id).await?;
    }

    sqlx::query(
        "UPDATE category_rules SET category_id = ?, pattern = ?, match_type = ?, case_sensitive = ?, priority = ?, is_active = ?
         WHERE id = ?",
    )
    .bind(update.category_id.unwrap_or(current.category_id).0)
    .bind(update.pattern.as_deref().unwrap_or(&current.pattern))
    .bind(update.match_type.unwrap_or(current.match_type).as_str())
    .bind(update.case_sensitive.unwrap_or(current.case_sensitive) as i64)
    .bind(update.priority.unwrap_or(current.priority))
    .bind(update.is_active.unwrap_or(current.is_active) as i64)
    .bind(id.0)
    .execute(&mut *tx)
    .await?;

    let rule = fetch_rule(&mut tx, id).await?;
    tx.commit().await?;
    Ok(rule)
}

pub async fn delete_category_rule(pool: &DbPool, id: RuleId) -> Result<(), StorageError> {
    let result = sqlx::query("DELETE FROM category_rules WHERE id = ?")
        .bind(id.0)
        .execute(pool)
        .await?;
    if result.rows_affected() == 0 {
        return Err(StorageError::not_found("category rule", id.0));
    }
    Ok(())
}
