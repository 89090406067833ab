use async_trait::async_trait;
use thiserror::Error;

use bookworm_core::domain::order::{NewOrder, OrderDetail, OrderId};

pub mod memory;
pub mod order;

pub use memory::InMemoryOrderRepository;
pub use order::SqlOrderRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("constraint violation: {0}")]
    Constraint(String),
}

#[async_trait]
pub trait OrderRepository: Send + Sync {
    /// Persists every line of `order` under its order id, or none of them.
    async fn create_order(&self, order: &NewOrder) -> Result<OrderId, RepositoryError>;

    /// Returns the order only when it belongs to `user_id`.
    async fn find_order(
        &self,
        order_id: &OrderId,
        user_id: &str,
    ) -> Result<Option<OrderDetail>, RepositoryError>;

    /// Most recent first.
    async fn list_orders_for_user(&self, user_id: &str)
        -> Result<Vec<OrderDetail>, RepositoryError>;
}
