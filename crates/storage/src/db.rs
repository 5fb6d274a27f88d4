use hearth_core::DEFAULT_CATEGORIES;
use sqlx::{sqlite::SqlitePoolOptions, Pool, Sqlite};
use std::path::Path;

pub type DbPool = Pool<Sqlite>;

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
    sqlx::query("PRAGMA cache_size = -32000")
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
            name TEXT NOT NULL UNIQUE,
            owner TEXT,
            currency TEXT NOT NULL DEFAULT 'EUR',
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
            name TEXT NOT NULL UNIQUE,
            parent_id INTEGER,
            icon TEXT,
            color TEXT,
            created_at TEXT NOT NULL DEFAULT (datetime('now')),
            FOREIGN KEY (parent_id) REFERENCES categories(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS category_rules (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            pattern TEXT NOT NULL,
            match_type TEXT NOT NULL DEFAULT 'contains',
            category_id INTEGER NOT NULL,
            priority INTEGER NOT NULL DEFAULT 0,
            account_id INTEGER,
            created_at TEXT NOT NULL,
            FOREIGN KEY (category_id) REFERENCES categories(id),
            FOREIGN KEY (account_id) REFERENCES accounts(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS transactions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            account_id INTEGER NOT NULL,
            date TEXT NOT NULL,
            description TEXT NOT NULL,
            amount_cents INTEGER NOT NULL,
            currency TEXT NOT NULL DEFAULT 'EUR',
            kind TEXT NOT NULL,
            category_id INTEGER,
            category_source TEXT,
            transfer_peer_id INTEGER,
            bank_category TEXT,
            import_source TEXT,
            categorized_at TEXT,
            created_at TEXT NOT NULL DEFAULT (datetime('now')),
            FOREIGN KEY (account_id) REFERENCES accounts(id),
            FOREIGN KEY (category_id) REFERENCES categories(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS recurring_patterns (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            signature TEXT NOT NULL UNIQUE,
            label TEXT NOT NULL,
            cadence TEXT NOT NULL,
            expected_amount_cents INTEGER NOT NULL,
            amount_min_cents INTEGER NOT NULL,
            amount_max_cents INTEGER NOT NULL,
            currency TEXT NOT NULL,
            category_id INTEGER,
            status TEXT NOT NULL DEFAULT 'active',
            occurrences INTEGER NOT NULL,
            first_seen TEXT NOT NULL,
            last_seen TEXT NOT NULL,
            updated_at TEXT NOT NULL DEFAULT (datetime('now')),
            FOREIGN KEY (category_id) REFERENCES categories(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS categorization_runs (
            run_id TEXT PRIMARY KEY,
            account_id INTEGER,
            total INTEGER NOT NULL,
            rule_matches INTEGER NOT NULL,
            bank_matches INTEGER NOT NULL,
            ai_matches INTEGER NOT NULL,
            transfer_matches INTEGER NOT NULL,
            unmatched INTEGER NOT NULL,
            duration_ms INTEGER NOT NULL,
            ai_cost TEXT NOT NULL,
            error TEXT,
            started_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Idempotent: categories already present are left untouched, so user
/// renames and additions survive restarts.
pub async fn seed_default_categories(pool: &DbPool) -> Result<(), sqlx::Error> {
    for (name, _, icon, color) in DEFAULT_CATEGORIES {
        sqlx::query("INSERT OR IGNORE INTO categories (name, icon, color) VALUES (?, ?, ?)")
            .bind(name)
            .bind(icon)
            .bind(color)
            .execute(pool)
            .await?;
    }

    for (name, parent, _, _) in DEFAULT_CATEGORIES {
        if !parent.is_empty() {
            sqlx::query(
                "UPDATE categories SET parent_id = (SELECT id FROM categories WHERE name = ?) WHERE name = ? AND parent_id IS NULL",
            )
            .bind(parent)
            .bind(name)
            .execute(pool)
            .await?;
        }
    }

    Ok(())
}
