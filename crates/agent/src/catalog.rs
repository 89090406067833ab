use anyhow::Result;
use async_trait::async_trait;

use bookworm_core::domain::book::BookRecord;

/// Book metadata lookup. A miss is `Ok(None)`, not an error.
#[async_trait]
pub trait BookCatalog: Send + Sync {
    async fn find_book_by_title(&self, title: &str) -> Result<Option<BookRecord>>;
    async fn find_books_by_ids(&self, ids: &[i64]) -> Result<Vec<BookRecord>>;
    /// Ids of currently trending books, most popular first.
    async fn trending_book_ids(&self) -> Result<Vec<i64>>;
}
