use std::sync::Arc;

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::Utc;
use serde::Serialize;

use bookworm_agent::AgentRuntime;
use bookworm_db::DbPool;

#[derive(Clone)]
pub struct HealthState {
    pub db_pool: DbPool,
    pub runtime: Arc<AgentRuntime>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Readiness {
    Ready,
    Degraded,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Probe {
    pub readiness: Readiness,
    pub detail: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthReport {
    pub readiness: Readiness,
    pub orders: Probe,
    pub conversations: Probe,
    pub checked_at: String,
}

pub fn router(db_pool: DbPool, runtime: Arc<AgentRuntime>) -> Router {
    Router::new().route("/health", get(health)).with_state(HealthState { db_pool, runtime })
}

/// 200 while the order store answers, 503 otherwise. Session count is
/// informational only.
pub async fn health(State(state): State<HealthState>) -> (StatusCode, Json<HealthReport>) {
    let orders = probe_orders(&state.db_pool).await;
    let active = state.runtime.sessions().len().await;
    let conversations =
        Probe { readiness: Readiness::Ready, detail: format!("{active} active session(s)") };

    let readiness = orders.readiness;
    let code = match readiness {
        Readiness::Ready => StatusCode::OK,
        Readiness::Degraded => StatusCode::SERVICE_UNAVAILABLE,
    };

    (code, Json(HealthReport { readiness, orders, conversations, checked_at: Utc::now().to_rfc3339() }))
}

async fn probe_orders(pool: &DbPool) -> Probe {
    let counted = sqlx::query_scalar::<_, i64>("SELECT COUNT(DISTINCT order_id) FROM book_order")
        .fetch_one(pool)
        .await;

    match counted {
        Ok(orders) => Probe { readiness: Readiness::Ready, detail: format!("{orders} order(s) on file") },
        Err(error) => {
            tracing::warn!(
                event_name = "system.health.orders_unreachable",
                error = %error,
                "order store probe failed"
            );
            Probe { readiness: Readiness::Degraded, detail: format!("order store unreachable: {error}") }
        }
    }
}
