//! Connecting to the store and keeping its schema current.

use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context as _, Result};
use sqlx::migrate::Migrator;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Sqlite, SqlitePool, Transaction};

use crate::util::current_time;

pub static MIGRATOR: Migrator = sqlx::migrate!();

/// How long a writer waits for another writer's transaction to finish.
pub const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Opens (creating if needed) the database at `url` and runs any pending migrations.
pub async fn connect(url: &str) -> Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(url)
        .with_context(|| format!("Invalid database URL {:?}", url))?
        .create_if_missing(true)
        .foreign_keys(true)
        .busy_timeout(BUSY_TIMEOUT);

    let pool = SqlitePoolOptions::new()
        .max_connections(8)
        .connect_with(options)
        .await
        .context("Failed to connect to the database")?;
    migrate(&pool).await?;

    Ok(pool)
}

/// A fresh, migrated database that lives as long as the pool does.
pub async fn connect_in_memory() -> Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")
        .context("Invalid in-memory database URL")?
        .foreign_keys(true);

    // every connection to `:memory:` is its own database, so only ever keep one
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(options)
        .await
        .context("Failed to open an in-memory database")?;
    migrate(&pool).await?;

    Ok(pool)
}

/// Starts a transaction for a request that writes. The first statement takes
/// the write lock, so concurrent writers wait on the busy timeout.
pub async fn begin_write(
    pool: &SqlitePool,
) -> Result<Transaction<'static, Sqlite>, sqlx::Error> {
    let mut transaction = pool.begin().await?;
    sqlx::query("UPDATE write_lock SET taken_at = ? WHERE id = 1")
        .bind(current_time())
        .execute(&mut *transaction)
        .await?;

    Ok(transaction)
}

async fn migrate(pool: &SqlitePool) -> Result<()> {
    MIGRATOR
        .run(pool)
        .await
        .context("Failed to run database migrations")?;
    tracing::debug!("database schema is up to date");

    Ok(())
}

/// The tables reported by the connection check, in schema order.
pub const TABLES: [&str; 7] = [
    "volunteers",
    "programs",
    "workshops",
    "opportunities",
    "participants",
    "volunteer_signups",
    "participant_workshops",
];
