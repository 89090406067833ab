use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{Mutex, RwLock};
use tracing::debug;

use bookworm_core::config::ConversationConfig;
use bookworm_db::OrderRepository;

use crate::agents::{
    FraudReportAgent, OrderPlacementAgent, OrderQueryAgent, RecommendationAgent,
    RecommendationSettings,
};
use crate::catalog::BookCatalog;
use crate::intent::IntentClassifier;
use crate::llm::LlmClient;
use crate::operator::Operator;

/// Collaborators shared by every session. Agent state is never shared.
#[derive(Clone)]
pub struct AgentDependencies {
    pub llm: Arc<dyn LlmClient>,
    pub catalog: Arc<dyn BookCatalog>,
    pub orders: Arc<dyn OrderRepository>,
    pub conversation: ConversationConfig,
    pub fallback_image_url: String,
}

impl AgentDependencies {
    /// A fresh operator with all four agents, in routing order.
    pub fn build_operator(&self) -> Operator {
        let settings =
            RecommendationSettings::from_config(&self.conversation, self.fallback_image_url.clone());
        Operator::new(IntentClassifier::new(self.llm.clone()))
            .with_agent(Box::new(RecommendationAgent::new(
                self.llm.clone(),
                self.catalog.clone(),
                settings,
            )))
            .with_agent(Box::new(OrderQueryAgent::new(self.orders.clone())))
            .with_agent(Box::new(OrderPlacementAgent::new(
                self.orders.clone(),
                self.conversation.delivery_days,
            )))
            .with_agent(Box::new(FraudReportAgent::new(self.llm.clone())))
    }
}

struct SessionEntry {
    operator: Arc<Mutex<Operator>>,
    last_used: Instant,
}

/// Maps a session id to that session's operator. Each operator sits behind
/// its own mutex, so one conversation is processed by one task at a time.
/// Sessions idle for longer than the configured TTL are dropped whenever a
/// new one is created.
pub struct SessionStore {
    deps: AgentDependencies,
    idle_ttl: Duration,
    sessions: RwLock<HashMap<String, SessionEntry>>,
}

impl SessionStore {
    pub fn new(deps: AgentDependencies) -> Self {
        let idle_ttl = Duration::from_secs(deps.conversation.session_idle_ttl_secs);
        Self { deps, idle_ttl, sessions: RwLock::new(HashMap::new()) }
    }

    /// Returns the session's operator, creating it on first use.
    pub async fn session(&self, session_id: &str) -> Arc<Mutex<Operator>> {
        self.session_at(session_id, Instant::now()).await
    }

    async fn session_at(&self, session_id: &str, now: Instant) -> Arc<Mutex<Operator>> {
        let mut sessions = self.sessions.write().await;
        if let Some(entry) = sessions.get_mut(session_id) {
            entry.last_used = now;
            return entry.operator.clone();
        }

        let evicted = sweep(&mut sessions, now, self.idle_ttl);
        debug!(event_name = "chat.session.created", session_id, evicted, "new session");
        let operator = Arc::new(Mutex::new(self.deps.build_operator()));
        sessions.insert(
            session_id.to_string(),
            SessionEntry { operator: operator.clone(), last_used: now },
        );
        operator
    }

    /// Drops sessions not used within the idle TTL as of `now`.
    pub async fn evict_idle(&self, now: Instant) -> usize {
        let mut sessions = self.sessions.write().await;
        sweep(&mut sessions, now, self.idle_ttl)
    }

    pub async fn remove(&self, session_id: &str) -> bool {
        self.sessions.write().await.remove(session_id).is_some()
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}

fn sweep(sessions: &mut HashMap<String, SessionEntry>, now: Instant, ttl: Duration) -> usize {
    let before = sessions.len();
    sessions.retain(|_, entry| now.saturating_duration_since(entry.last_used) <= ttl);
    before - sessions.len()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::{Duration, Instant};

    use bookworm_core::config::ConversationConfig;
    use bookworm_db::InMemoryOrderRepository;

    use super::{AgentDependencies, SessionStore};
    use crate::testing::{ScriptedLlm, StaticCatalog};

    fn deps() -> AgentDependencies {
        AgentDependencies {
            llm: Arc::new(ScriptedLlm::failing()),
            catalog: Arc::new(StaticCatalog::default()),
            orders: Arc::new(InMemoryOrderRepository::default()),
            conversation: ConversationConfig {
                min_questions: 4,
                readiness_memory_threshold: 3,
                delivery_days: 5,
                session_idle_ttl_secs: 60,
            },
            fallback_image_url: "https://covers.test/placeholder.png".to_owned(),
        }
    }

    #[test]
    fn operator_registers_all_agents() {
        assert_eq!(deps().build_operator().len(), 4);
    }

    #[tokio::test]
    async fn sessions_are_isolated_and_reused() {
        let store = SessionStore::new(deps());

        let first = store.session("a").await;
        let again = store.session("a").await;
        let other = store.session("b").await;

        assert!(Arc::ptr_eq(&first, &again));
        assert!(!Arc::ptr_eq(&first, &other));
        assert_eq!(store.len().await, 2);
        assert!(store.remove("a").await);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn idle_sessions_expire() {
        let store = SessionStore::new(deps());
        let _ = store.session("a").await;
        let _ = store.session("b").await;

        assert_eq!(store.evict_idle(Instant::now()).await, 0);
        assert_eq!(store.evict_idle(Instant::now() + Duration::from_secs(61)).await, 2);
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn creating_a_session_sweeps_idle_ones() {
        let store = SessionStore::new(deps());
        let start = Instant::now();
        let _ = store.session_at("stale", start).await;
        let _ = store.session_at("busy", start).await;
        let _ = store.session_at("busy", start + Duration::from_secs(50)).await;

        let _ = store.session_at("fresh", start + Duration::from_secs(90)).await;

        assert_eq!(store.len().await, 2);
        assert!(!store.remove("stale").await);
        assert!(store.remove("busy").await);
    }
}
