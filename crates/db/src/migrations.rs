use sqlx::migrate::{MigrateError, Migrator};

use crate::DbPool;

pub static MIGRATOR: Migrator = sqlx::migrate!("../../migrations");

pub async fn run_pending(pool: &DbPool) -> Result<(), MigrateError> {
    MIGRATOR.run(pool).await
}

/// Whether the migrated order table exists. Used by readiness checks.
pub async fn schema_ready(pool: &DbPool) -> Result<bool, sqlx::Error> {
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'book_order'",
    )
    .fetch_one(pool)
    .await?;
    Ok(count == 1)
}

#[cfg(test)]
mod tests {
    use super::{run_pending, schema_ready, MIGRATOR};
    use crate::{connect_with_settings, DbPool};

    async fn migrated_pool() -> DbPool {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        run_pending(&pool).await.expect("run migrations");
        pool
    }

    async fn index_names(pool: &DbPool) -> Vec<String> {
        sqlx::query_scalar(
            "SELECT name FROM sqlite_master
             WHERE type = 'index' AND tbl_name = 'book_order' AND name LIKE 'idx_%'
             ORDER BY name",
        )
        .fetch_all(pool)
        .await
        .expect("list indexes")
    }

    async fn insert_line(pool: &DbPool, title: &str, quantity: i64, card_last4: &str) -> bool {
        sqlx::query(
            "INSERT INTO book_order (order_id, user_id, title, price, quantity, street, city,
                state, zip_code, card_last4, expiry_date, purchase_date, expected_delivery)
             VALUES ('o-1', 'u-1', ?, '12.50', ?, '1 Main St', 'Springfield', 'IL', '62701',
                ?, '12/29', '2024-03-01', '2024-03-06')",
        )
        .bind(title)
        .bind(quantity)
        .bind(card_last4)
        .execute(pool)
        .await
        .is_ok()
    }

    #[tokio::test]
    async fn migration_creates_order_table_and_lookup_indexes() {
        let pool = migrated_pool().await;

        assert!(schema_ready(&pool).await.expect("schema check"));
        assert_eq!(index_names(&pool).await, vec!["idx_book_order_order_id", "idx_book_order_user_id"]);
    }

    #[tokio::test]
    async fn order_rows_reject_blank_titles_and_bad_quantities() {
        let pool = migrated_pool().await;

        assert!(insert_line(&pool, "Dune", 2, "4242").await);
        assert!(!insert_line(&pool, "   ", 1, "4242").await, "blank title");
        assert!(!insert_line(&pool, "Dune", 0, "4242").await, "zero quantity");
        assert!(!insert_line(&pool, "Dune", 1, "42424").await, "card suffix longer than four");
    }

    #[tokio::test]
    async fn undo_drops_the_schema_and_rerun_restores_it() {
        let pool = migrated_pool().await;

        MIGRATOR.undo(&pool, 0).await.expect("undo migrations");
        assert!(!schema_ready(&pool).await.expect("schema check"));
        assert!(index_names(&pool).await.is_empty());

        run_pending(&pool).await.expect("re-run migrations");
        assert!(schema_ready(&pool).await.expect("schema check"));
        assert_eq!(index_names(&pool).await.len(), 2);
    }
}
