use std::collections::BTreeMap;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::Row;
use tracing::info;

use bookworm_core::domain::order::{NewOrder, OrderDetail, OrderId, OrderLine, ShippingAddress};

use super::{OrderRepository, RepositoryError};
use crate::DbPool;

const ORDER_COLUMNS: &str = "order_id, user_id, title, price, quantity, street, city, state,
     zip_code, purchase_date, expected_delivery";

pub struct SqlOrderRepository {
    pool: DbPool,
}

impl SqlOrderRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn decode<T>(row: &sqlx::sqlite::SqliteRow, column: &str) -> Result<T, RepositoryError>
where
    T: for<'r> sqlx::Decode<'r, sqlx::Sqlite> + sqlx::Type<sqlx::Sqlite>,
{
    row.try_get(column).map_err(|e| RepositoryError::Decode(e.to_string()))
}

/// Folds line rows into orders, keeping first-seen order.
fn rows_to_orders(rows: &[sqlx::sqlite::SqliteRow]) -> Result<Vec<OrderDetail>, RepositoryError> {
    let mut position: BTreeMap<String, usize> = BTreeMap::new();
    let mut orders: Vec<OrderDetail> = Vec::new();

    for row in rows {
        let order_id: String = decode(row, "order_id")?;
        let price_str: String = decode(row, "price")?;
        let price = Decimal::from_str(&price_str)
            .map_err(|e| RepositoryError::Decode(format!("price `{price_str}`: {e}")))?;
        let quantity: i64 = decode(row, "quantity")?;
        let quantity = u32::try_from(quantity)
            .map_err(|_| RepositoryError::Decode(format!("quantity `{quantity}` out of range")))?;
        let line = OrderLine {
            title: decode(row, "title")?,
            price,
            quantity,
            subtotal: price.saturating_mul(Decimal::from(quantity)),
        };

        if let Some(index) = position.get(&order_id) {
            orders[*index].items.push(line);
            continue;
        }

        let purchase_date: String = decode(row, "purchase_date")?;
        let purchased_at = DateTime::parse_from_rfc3339(&purchase_date)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| RepositoryError::Decode(format!("purchase_date: {e}")))?;
        let expected_delivery: String = decode(row, "expected_delivery")?;
        let expected_delivery = NaiveDate::parse_from_str(&expected_delivery, "%Y-%m-%d")
            .map_err(|e| RepositoryError::Decode(format!("expected_delivery: {e}")))?;

        position.insert(order_id.clone(), orders.len());
        orders.push(OrderDetail {
            order_id: OrderId(order_id),
            user_id: decode(row, "user_id")?,
            items: vec![line],
            shipping_address: ShippingAddress {
                street: decode(row, "street")?,
                city: decode(row, "city")?,
                state: decode(row, "state")?,
                zip_code: decode(row, "zip_code")?,
            },
            purchased_at,
            expected_delivery,
        });
    }

    Ok(orders)
}

#[async_trait::async_trait]
impl OrderRepository for SqlOrderRepository {
    async fn create_order(&self, order: &NewOrder) -> Result<OrderId, RepositoryError> {
        let purchase_date = order.purchased_at.to_rfc3339();
        let expected_delivery = order.expected_delivery.format("%Y-%m-%d").to_string();

        let mut tx = self.pool.begin().await?;
        for item in &order.items {
            sqlx::query(
                "INSERT INTO book_order (order_id, user_id, title, price, quantity, street, city,
                                         state, zip_code, card_last4, expiry_date, purchase_date,
                                         expected_delivery)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(&order.order_id.0)
            .bind(&order.user_id)
            .bind(&item.title)
            .bind(item.price.to_string())
            .bind(i64::from(item.quantity))
            .bind(&order.address.street)
            .bind(&order.address.city)
            .bind(&order.address.state)
            .bind(&order.address.zip_code)
            .bind(&order.card_last4)
            .bind(&order.expiry_date)
            .bind(&purchase_date)
            .bind(&expected_delivery)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;

        info!(
            event_name = "db.order.created",
            order_id = %order.order_id,
            line_count = order.items.len(),
            "order persisted"
        );
        Ok(order.order_id.clone())
    }

    async fn find_order(
        &self,
        order_id: &OrderId,
        user_id: &str,
    ) -> Result<Option<OrderDetail>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {ORDER_COLUMNS} FROM book_order WHERE order_id = ? AND user_id = ? ORDER BY id"
        ))
        .bind(&order_id.0)
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows_to_orders(&rows)?.into_iter().next())
    }

    async fn list_orders_for_user(
        &self,
        user_id: &str,
    ) -> Result<Vec<OrderDetail>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {ORDER_COLUMNS} FROM book_order WHERE user_id = ?
             ORDER BY purchase_date DESC, order_id DESC, id"
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        rows_to_orders(&rows)
    }
}
