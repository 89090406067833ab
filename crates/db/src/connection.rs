use std::str::FromStr;
use std::time::Duration;

use bookworm_core::config::DatabaseConfig;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};

pub type DbPool = sqlx::SqlitePool;

pub async fn connect_with_config(config: &DatabaseConfig) -> Result<DbPool, sqlx::Error> {
    connect_with_settings(&config.url, config.max_connections, config.timeout_secs).await
}

/// Opens a pool for `database_url`. File databases are created on first use
/// and run in WAL mode; the bare `:memory:` shorthand is accepted too.
pub async fn connect_with_settings(
    database_url: &str,
    max_connections: u32,
    timeout_secs: u64,
) -> Result<DbPool, sqlx::Error> {
    let options = connect_options(database_url)?;

    SqlitePoolOptions::new()
        .max_connections(max_connections.max(1))
        .acquire_timeout(Duration::from_secs(timeout_secs.max(1)))
        .connect_with(options)
        .await
}

fn connect_options(database_url: &str) -> Result<SqliteConnectOptions, sqlx::Error> {
    let url = match database_url.trim() {
        ":memory:" => "sqlite::memory:",
        other => other,
    };
    let in_memory = url.contains(":memory:");

    let options = SqliteConnectOptions::from_str(url)?
        .foreign_keys(true)
        .busy_timeout(Duration::from_secs(5));

    Ok(if in_memory {
        options
    } else {
        options.create_if_missing(true).journal_mode(SqliteJournalMode::Wal)
    })
}
