use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info, warn};
use uuid::Uuid;

use bookworm_core::domain::book::TrendingBook;
use bookworm_core::domain::conversation::{ConversationTurn, Metadata};
use bookworm_core::domain::envelope::{ResponseEnvelope, ResponseKind};
use bookworm_core::errors::{ApplicationError, ValidationError};
use bookworm_core::text::postprocess;

use crate::agents::{AgentError, AgentKey};
use crate::catalog::BookCatalog;
use crate::session::{AgentDependencies, SessionStore};

pub const GREETING: &str = "Welcome! I'm BookWorm, your virtual assistant. I'm here to help you browse \
and find the perfect book for your collection. Ready to start exploring?";

/// A finished turn and the session it belongs to.
#[derive(Clone, Debug, PartialEq)]
pub struct ChatOutcome {
    pub session_id: String,
    pub envelope: ResponseEnvelope,
}

/// Entry point for transports: resolves the session, routes the turn and
/// sanitizes the envelope on the way out.
pub struct AgentRuntime {
    sessions: SessionStore,
    catalog: Arc<dyn BookCatalog>,
    fallback_image_url: String,
}

impl AgentRuntime {
    pub fn new(deps: AgentDependencies) -> Self {
        let catalog = deps.catalog.clone();
        let fallback_image_url = deps.fallback_image_url.clone();
        Self { sessions: SessionStore::new(deps), catalog, fallback_image_url }
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    pub fn greeting(&self) -> ResponseEnvelope {
        ResponseEnvelope::text(ResponseKind::System, GREETING)
    }

    pub async fn handle_message(
        &self,
        session_id: Option<&str>,
        raw_text: &str,
        metadata: Metadata,
    ) -> Result<ChatOutcome, AgentError> {
        let session_id = resolve_session_id(session_id);
        let turn = ConversationTurn::new(raw_text, metadata);
        let operator = self.sessions.session(&session_id).await;
        let envelope = operator.lock().await.route(&turn).await?;

        info!(
            event_name = "chat.turn.completed",
            session_id = %session_id,
            kind = envelope.kind.as_str(),
            "turn completed"
        );
        Ok(ChatOutcome { session_id, envelope: postprocess(envelope) })
    }

    /// The bulk order path: `{order_data, user_details}` straight to order placement.
    pub async fn place_order(
        &self,
        session_id: Option<&str>,
        payload: &Value,
    ) -> Result<ChatOutcome, AgentError> {
        let session_id = resolve_session_id(session_id);
        let metadata = match payload {
            Value::Object(map) if map.contains_key("order_data") && map.contains_key("user_details") => {
                map.clone()
            }
            _ => {
                debug!(event_name = "chat.order.rejected", session_id = %session_id, "malformed order payload");
                let envelope =
                    ResponseEnvelope::error(ValidationError::InvalidPayloadShape.user_message());
                return Ok(ChatOutcome { session_id, envelope: postprocess(envelope) });
            }
        };

        let turn = ConversationTurn::new("", metadata);
        let operator = self.sessions.session(&session_id).await;
        let envelope = operator.lock().await.route_to(AgentKey::OrderPlacement, &turn).await?;

        info!(
            event_name = "chat.order.completed",
            session_id = %session_id,
            kind = envelope.kind.as_str(),
            "order request completed"
        );
        Ok(ChatOutcome { session_id, envelope: postprocess(envelope) })
    }

    /// The catalog's trending shelf, in trending order, with covers filled in.
    /// Not tied to any session.
    pub async fn trending_books(&self) -> Result<Vec<TrendingBook>, ApplicationError> {
        let ids = self.catalog.trending_book_ids().await.map_err(catalog_failure)?;
        let mut records = self.catalog.find_books_by_ids(&ids).await.map_err(catalog_failure)?;
        records.sort_by_key(|record| {
            record.id.and_then(|id| ids.iter().position(|trending| *trending == id))
        });

        let books: Vec<TrendingBook> = records
            .into_iter()
            .filter_map(|record| TrendingBook::from_catalog(record, &self.fallback_image_url))
            .collect();
        debug!(event_name = "catalog.trending.served", books = books.len(), "trending books resolved");
        Ok(books)
    }
}

fn catalog_failure(error: anyhow::Error) -> ApplicationError {
    warn!(event_name = "catalog.trending.failed", error = %error, "trending lookup failed");
    ApplicationError::Catalog(format!("{error:#}"))
}

fn resolve_session_id(session_id: Option<&str>) -> String {
    session_id
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use bookworm_core::config::ConversationConfig;
    use bookworm_core::domain::conversation::Metadata;
    use bookworm_core::domain::book::BookRecord;
    use bookworm_core::domain::envelope::ResponseKind;
    use bookworm_core::errors::{ApplicationError, FailureClass};
    use bookworm_db::InMemoryOrderRepository;

    use super::{AgentRuntime, GREETING};
    use crate::session::AgentDependencies;
    use crate::testing::{ScriptedLlm, StaticCatalog};

    fn runtime(llm: ScriptedLlm) -> AgentRuntime {
        runtime_with(llm, StaticCatalog::default())
    }

    fn runtime_with(llm: ScriptedLlm, catalog: StaticCatalog) -> AgentRuntime {
        AgentRuntime::new(AgentDependencies {
            llm: Arc::new(llm),
            catalog: Arc::new(catalog),
            orders: Arc::new(InMemoryOrderRepository::default()),
            conversation: ConversationConfig {
                min_questions: 4,
                readiness_memory_threshold: 3,
                delivery_days: 5,
                session_idle_ttl_secs: 1800,
            },
            fallback_image_url: "https://covers.test/placeholder.png".to_owned(),
        })
    }

    #[tokio::test]
    async fn missing_session_id_is_minted_and_echoed() {
        let runtime = runtime(ScriptedLlm::new(["out_of_context"]));

        let outcome = runtime.handle_message(None, "hello", Metadata::new()).await.expect("turn");

        assert!(!outcome.session_id.is_empty());
        assert_eq!(runtime.sessions().len().await, 1);
    }

    #[tokio::test]
    async fn malformed_order_payload_is_rejected_before_routing() {
        let runtime = runtime(ScriptedLlm::failing());

        let outcome = runtime
            .place_order(Some("s-1"), &json!({"order_data": []}))
            .await
            .expect("outcome");

        assert_eq!(outcome.envelope.kind, ResponseKind::Error);
        assert_eq!(
            outcome.envelope.response.as_text(),
            Some("Error: Invalid order format. Please include both order and user details.")
        );
    }

    #[test]
    fn greeting_is_a_system_message() {
        let envelope = runtime(ScriptedLlm::failing()).greeting();
        assert_eq!(envelope.kind, ResponseKind::System);
        assert_eq!(envelope.messages[0].content, GREETING);
    }

    #[tokio::test]
    async fn trending_books_follow_trending_order_with_covers() {
        let catalog = StaticCatalog::new([
            BookRecord {
                id: Some(1),
                title: "Dune".to_owned(),
                image_url: Some("https://covers.test/dune.jpg".to_owned()),
                ..BookRecord::default()
            },
            BookRecord { id: Some(2), title: "Emma".to_owned(), ..BookRecord::default() },
            BookRecord { id: Some(3), title: "Carrie".to_owned(), ..BookRecord::default() },
        ])
        .with_trending([3, 1, 42]);

        let books = runtime_with(ScriptedLlm::failing(), catalog).trending_books().await.expect("shelf");

        let titles: Vec<&str> = books.iter().map(|book| book.title.as_str()).collect();
        assert_eq!(titles, ["Carrie", "Dune"]);
        assert_eq!(books[0].image_url, "https://covers.test/placeholder.png");
        assert_eq!(books[1].image_url, "https://covers.test/dune.jpg");
    }

    #[tokio::test]
    async fn trending_outage_is_a_catalog_failure() {
        let runtime = runtime_with(ScriptedLlm::failing(), StaticCatalog::unavailable());

        let error = runtime.trending_books().await.expect_err("catalog is down");

        assert!(matches!(error, ApplicationError::Catalog(_)));
        assert_eq!(error.class(), FailureClass::Unavailable);
        assert!(runtime.sessions().is_empty().await);
    }
}
