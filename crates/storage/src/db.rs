use ledgerly_core::DEFAULT_CATEGORIES;
use sqlx::{sqlite::SqlitePoolOptions, Pool, Sqlite};
use std::path::Path;
use tracing::info;

pub type DbPool = Pool<Sqlite>;

const CATEGORIES_SEEDED_KEY: &str = "categories_seeded";

pub async fn create_db(path: &Path) -> Result<DbPool, sqlx::Error> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect(&format!("sqlite:{}?mode=rwc", path.display()))
        .await?;

    sqlx::query("PRAGMA journal_mode = WAL")
        .execute(&pool)
        .await?;
    sqlx::query("PRAGMA foreign_keys = ON")
        .execute(&pool)
        .await?;
    sqlx::query("PRAGMA synchronous = NORMAL")
        .execute(&pool)
        .await?;
    sqlx::query("PRAGMA busy_timeout = 5000")
        .execute(&pool)
        .await?;

    run_migrations(&pool).await?;

    Ok(pool)
}

async fn run_migrations(pool: &DbPool) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS accounts (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            account_type TEXT NOT NULL,
            currency TEXT NOT NULL DEFAULT 'EUR',
            institution TEXT,
            color TEXT,
            opening_balance_cents INTEGER NOT NULL DEFAULT 0,
            current_balance_cents INTEGER NOT NULL DEFAULT 0,
            is_active INTEGER NOT NULL DEFAULT 1,
            linked_to_account_id INTEGER REFERENCES accounts(id),
            hide_from_dashboard INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL DEFAULT (datetime('now'))
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS categories (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            icon TEXT,
            color TEXT,
            is_income INTEGER NOT NULL DEFAULT 0,
            parent_id INTEGER REFERENCES categories(id),
            created_at TEXT NOT NULL DEFAULT (datetime('now'))
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS category_rules (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            category_id INTEGER NOT NULL REFERENCES categories(id) ON DELETE CASCADE,
            pattern TEXT NOT NULL,
            match_type TEXT NOT NULL DEFAULT 'contains',
            case_sensitive INTEGER NOT NULL DEFAULT 0,
            priority INTEGER NOT NULL DEFAULT 0,
            is_active INTEGER NOT NULL DEFAULT 1,
            created_at TEXT NOT NULL DEFAULT (datetime('now'))
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS import_batches (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            account_id INTEGER NOT NULL REFERENCES accounts(id),
            filename TEXT,
            transaction_count INTEGER NOT NULL,
            total_amount_cents INTEGER NOT NULL,
            preserve_balance INTEGER NOT NULL DEFAULT 0,
            imported_at TEXT NOT NULL DEFAULT (datetime('now'))
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS transactions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            account_id INTEGER NOT NULL REFERENCES accounts(id),
            category_id INTEGER REFERENCES categories(id) ON DELETE SET NULL,
            date TEXT NOT NULL,
            amount_cents INTEGER NOT NULL CHECK (amount_cents != 0),
            currency TEXT NOT NULL,
            description TEXT NOT NULL,
            merchant TEXT,
            notes TEXT,
            external_id TEXT,
            import_batch_id INTEGER REFERENCES import_batches(id),
            is_transfer INTEGER NOT NULL DEFAULT 0,
            linked_transaction_id INTEGER REFERENCES transactions(id) ON DELETE SET NULL,
            created_at TEXT NOT NULL DEFAULT (datetime('now'))
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS recurring_rules (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            account_id INTEGER NOT NULL REFERENCES accounts(id),
            category_id INTEGER REFERENCES categories(id) ON DELETE SET NULL,
            name TEXT NOT NULL,
            amount_cents INTEGER NOT NULL,
            currency TEXT NOT NULL,
            frequency TEXT NOT NULL,
            start_date TEXT NOT NULL,
            end_date TEXT,
            next_date TEXT NOT NULL,
            day_of_month INTEGER,
            is_active INTEGER NOT NULL DEFAULT 1,
            created_at TEXT NOT NULL DEFAULT (datetime('now'))
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS ignored_transfer_pairs (
            outgoing_id INTEGER NOT NULL REFERENCES transactions(id) ON DELETE CASCADE,
            incoming_id INTEGER NOT NULL REFERENCES transactions(id) ON DELETE CASCADE,
            created_at TEXT NOT NULL DEFAULT (datetime('now')),
            PRIMARY KEY (outgoing_id, incoming_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS settings (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    for index in [
        "CREATE INDEX IF NOT EXISTS idx_transactions_external_id ON transactions(external_id)",
        "CREATE INDEX IF NOT EXISTS idx_transactions_account_id ON transactions(account_id)",
        "CREATE INDEX IF NOT EXISTS idx_transactions_import_batch_id ON transactions(import_batch_id)",
        "CREATE INDEX IF NOT EXISTS idx_transactions_date ON transactions(date)",
    ] {
        sqlx::query(index).execute(pool).await?;
    }

    Ok(())
}

pub async fn get_setting(pool: &DbPool, key: &str) -> Result<Option<String>, sqlx::Error> {
    sqlx::query_scalar::<_, String>("SELECT value FROM settings WHERE key = ?")
        .bind(key)
        .fetch_optional(pool)
        .await
}

pub async fn set_setting(pool: &DbPool, key: &str, value: &str) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO settings (key, value) VALUES (?, ?) ON CONFLICT(key) DO UPDATE SET value = excluded.value",
    )
    .bind(key)
    .bind(value)
    .execute(pool)
    .await?;
    Ok(())
}

/// Seeds the default categories once. Categories the user later deletes are
/// not brought back on the next start.
pub async fn seed_default_categories(pool: &DbPool) -> Result<(), sqlx::Error> {
    if get_setting(pool, CATEGORIES_SEEDED_KEY).await?.is_some() {
        return Ok(());
    }

    let mut tx = pool.begin().await?;
    for (name, icon, color, is_income) in DEFAULT_CATEGORIES {
        sqlx::query("INSERT INTO categories (name, icon, color, is_income) VALUES (?, ?, ?, ?)")
            .bind(name)
            .bind(icon)
            .bind(color)
            .bind(*is_income as i64)
            .execute(&mut *tx)
            .await?;
    }
    sqlx::query("INSERT INTO settings (key, value) VALUES (?, '1')")
        .bind(CATEGORIES_SEEDED_KEY)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;

    info!(count = DEFAULT_CATEGORIES.len(), "seeded default categories");
    Ok(())
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use tempfile::TempDir;

    /// Keeps the directory alive for as long as the pool is used.
    pub(crate) async fn test_db() -> (DbPool, TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let pool = create_db(&dir.path().join("test.db")).await.unwrap();
        (pool, dir)
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::test_db;
    use super::*;

    #[tokio::test]
    async fn migrations_are_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.db");
        let pool = create_db(&path).await.unwrap();
        pool.close().await;
        let pool = create_db(&path).await.unwrap();
        let tables: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%'",
        )
        .fetch_one(&pool)
        .await
        .unwrap();
        assert_eq!(tables, 8);
    }

    #[tokio::test]
    async fn default_categories_seed_once() {
        let (pool, _dir) = test_db().await;
        seed_default_categories(&pool).await.unwrap();
        sqlx::query("DELETE FROM categories WHERE name = 'Gifts'")
            .execute(&pool)
            .await
            .unwrap();
        seed_default_categories(&pool).await.unwrap();

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM categories")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count as usize, DEFAULT_CATEGORIES.len() - 1);
    }

    #[tokio::test]
    async fn settings_upsert() {
        let (pool, _dir) = test_db().await;
        assert_eq!(get_setting(&pool, "k").await.unwrap(), None);
        set_setting(&pool, "k", "a").await.unwrap();
        set_setting(&pool, "k", "b").await.unwrap();
        assert_eq!(get_setting(&pool, "k").await.unwrap().as_deref(), Some("b"));
    }
}
