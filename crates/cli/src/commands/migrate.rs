use bookworm_db::{connect_with_config, migrations};

use crate::commands::{block_on, load_config, CommandFailure, CommandResult};

/// Creates the order schema. Safe to rerun: applied migrations are skipped.
pub fn run() -> CommandResult {
    CommandResult::status("migrate", apply())
}

fn apply() -> Result<String, CommandFailure> {
    let config = load_config()?;

    block_on(async {
        let pool = connect_with_config(&config.database)
            .await
            .map_err(|error| CommandFailure::new("db_connectivity", error.to_string(), 4))?;
        let applied = migrations::run_pending(&pool).await;
        pool.close().await;
        applied.map_err(|error| CommandFailure::new("migration", error.to_string(), 5))
    })?;

    Ok(format!("applied pending migrations to `{}`", config.database.url))
}
