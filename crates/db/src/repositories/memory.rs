use rust_decimal::Decimal;
use tokio::sync::RwLock;

use bookworm_core::domain::order::{NewOrder, OrderDetail, OrderId, OrderLine};

use super::{OrderRepository, RepositoryError};

/// Keeps orders in process memory. Applies the same line constraints as the
/// SQL schema so a bad line rejects the whole order.
#[derive(Default)]
pub struct InMemoryOrderRepository {
    orders: RwLock<Vec<NewOrder>>,
    fail_writes: bool,
}

impl InMemoryOrderRepository {
    /// A repository whose writes always fail, for exercising persistence errors.
    pub fn failing() -> Self {
        Self { orders: RwLock::default(), fail_writes: true }
    }

    pub async fn line_count(&self) -> usize {
        self.orders.read().await.iter().map(|order| order.items.len()).sum()
    }
}

fn to_detail(order: &NewOrder) -> OrderDetail {
    OrderDetail {
        order_id: order.order_id.clone(),
        user_id: order.user_id.clone(),
        items: order
            .items
            .iter()
            .map(|item| OrderLine {
                title: item.title.clone(),
                price: item.price,
                quantity: item.quantity,
                subtotal: item.subtotal(),
            })
            .collect(),
        shipping_address: order.address.clone(),
        purchased_at: order.purchased_at,
        expected_delivery: order.expected_delivery,
    }
}

#[async_trait::async_trait]
impl OrderRepository for InMemoryOrderRepository {
    async fn create_order(&self, order: &NewOrder) -> Result<OrderId, RepositoryError> {
        if self.fail_writes {
            return Err(RepositoryError::Database(sqlx::Error::PoolClosed));
        }
        for item in &order.items {
            if item.quantity == 0 {
                return Err(RepositoryError::Constraint("quantity must be positive".to_string()));
            }
            if item.price < Decimal::ZERO {
                return Err(RepositoryError::Constraint("price must not be negative".to_string()));
            }
            if item.title.trim().is_empty() {
                return Err(RepositoryError::Constraint("title must not be empty".to_string()));
            }
        }

        let mut orders = self.orders.write().await;
        orders.push(order.clone());
        Ok(order.order_id.clone())
    }

    async fn find_order(
        &self,
        order_id: &OrderId,
        user_id: &str,
    ) -> Result<Option<OrderDetail>, RepositoryError> {
        let orders = self.orders.read().await;
        Ok(orders
            .iter()
            .find(|order| order.order_id == *order_id && order.user_id == user_id)
            .map(to_detail))
    }

    async fn list_orders_for_user(
        &self,
        user_id: &str,
    ) -> Result<Vec<OrderDetail>, RepositoryError> {
        let orders = self.orders.read().await;
        let mut found: Vec<OrderDetail> =
            orders.iter().filter(|order| order.user_id == user_id).map(to_detail).collect();
        found.sort_by(|a, b| b.purchased_at.cmp(&a.purchased_at));
        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use rust_decimal::Decimal;

    use bookworm_core::domain::order::{
        CartItem, NewOrder, PaymentDetails, ShippingAddress,
    };

    use crate::repositories::{InMemoryOrderRepository, OrderRepository, RepositoryError};

    fn order(user_id: &str, quantity: u32) -> NewOrder {
        let payment = PaymentDetails::new("1234567890123456", "09/26", "123").expect("payment");
        NewOrder::new(
            user_id,
            vec![CartItem { title: "Dune".to_string(), price: Decimal::new(1250, 2), quantity }],
            ShippingAddress {
                street: "1 Main St".to_string(),
                city: "Springfield".to_string(),
                state: "IL".to_string(),
                zip_code: "62701".to_string(),
            },
            &payment,
            Utc::now(),
            5,
        )
    }

    #[tokio::test]
    async fn in_memory_order_is_visible_only_to_owner() {
        let repo = InMemoryOrderRepository::default();
        let placed = order("reader-1", 2);

        let order_id = repo.create_order(&placed).await.expect("create order");
        let found = repo.find_order(&order_id, "reader-1").await.expect("find order");
        let foreign = repo.find_order(&order_id, "reader-2").await.expect("find foreign");

        assert_eq!(found.map(|detail| detail.total_cost()), Some(Decimal::new(2500, 2)));
        assert!(foreign.is_none());
    }

    #[tokio::test]
    async fn in_memory_rejects_bad_line_without_partial_write() {
        let repo = InMemoryOrderRepository::default();
        let error = repo.create_order(&order("reader-1", 0)).await.expect_err("zero quantity");

        assert!(matches!(error, RepositoryError::Constraint(_)));
        assert_eq!(repo.line_count().await, 0);
    }

    #[tokio::test]
    async fn failing_repository_reports_database_error() {
        let repo = InMemoryOrderRepository::failing();
        let error = repo.create_order(&order("reader-1", 1)).await.expect_err("forced failure");

        assert!(matches!(error, RepositoryError::Database(_)));
        assert!(repo.list_orders_for_user("reader-1").await.expect("list").is_empty());
    }
}
