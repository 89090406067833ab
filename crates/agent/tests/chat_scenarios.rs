use std::sync::Arc;

use serde_json::{json, Value};

use bookworm_agent::agents::fraud::{ASK_IMAGE, ASK_ISSUE_TYPE};
use bookworm_agent::agents::{RecommendationAgent, RecommendationSettings};
use bookworm_agent::testing::{ScriptedLlm, StaticCatalog};
use bookworm_agent::{AgentDependencies, AgentRuntime, ConversationalAgent, Intent, IntentClassifier};
use bookworm_core::config::ConversationConfig;
use bookworm_core::domain::conversation::{ConversationMemory, ConversationTurn, Metadata};
use bookworm_core::domain::envelope::{Payload, ResponseKind};
use bookworm_db::InMemoryOrderRepository;

fn runtime(llm: ScriptedLlm, catalog: StaticCatalog) -> (AgentRuntime, Arc<InMemoryOrderRepository>) {
    let orders = Arc::new(InMemoryOrderRepository::default());
    let runtime = AgentRuntime::new(AgentDependencies {
        llm: Arc::new(llm),
        catalog: Arc::new(catalog),
        orders: orders.clone(),
        conversation: ConversationConfig {
            min_questions: 4,
            readiness_memory_threshold: 3,
            delivery_days: 5,
            session_idle_ttl_secs: 1800,
        },
        fallback_image_url: "https://covers.test/placeholder.png".to_owned(),
    });
    (runtime, orders)
}

fn order_payload() -> Value {
    json!({
        "order_data": [{"title": "The Shining", "price": "12.50", "quantity": 2}],
        "user_details": {
            "user_id": "reader-7",
            "street": "12 Main St",
            "city": "Springfield",
            "state": "IL",
            "zip_code": "62704",
            "cardNumber": "1234567890123456",
            "expiryDate": "09/26",
            "cvv": "123"
        }
    })
}

#[tokio::test]
async fn horror_request_is_answered_with_a_question() {
    let classifier = IntentClassifier::new(Arc::new(ScriptedLlm::failing()));
    let intents = classifier.classify("I want horror books").await;
    assert!(intents.contains(Intent::BookRecommendation));

    let llm = ScriptedLlm::new(["Do you prefer supernatural or psychological horror?"]);
    let mut agent = RecommendationAgent::new(
        Arc::new(llm),
        Arc::new(StaticCatalog::default()),
        RecommendationSettings::default(),
    );
    let mut memory = ConversationMemory::default();
    let turn = ConversationTurn::new("I want horror books", Metadata::new());

    let reply = agent.handle(&turn, &mut memory).await.expect("reply");

    assert_eq!(reply.kind, ResponseKind::Question);
    assert_eq!(agent.question_count(), 1);
}

#[tokio::test]
async fn statement_reply_does_not_count_as_a_question() {
    let llm = ScriptedLlm::new(["Horror is a great genre."]);
    let mut agent = RecommendationAgent::new(
        Arc::new(llm),
        Arc::new(StaticCatalog::default()),
        RecommendationSettings::default(),
    );
    let turn = ConversationTurn::new("I want horror books", Metadata::new());

    let reply = agent.handle(&turn, &mut ConversationMemory::default()).await.expect("reply");

    assert_eq!(reply.kind, ResponseKind::Question);
    assert_eq!(agent.question_count(), 0);
}

#[tokio::test]
async fn bulk_order_is_confirmed_with_computed_total() {
    let (runtime, orders) = runtime(ScriptedLlm::failing(), StaticCatalog::default());

    let outcome = runtime.place_order(Some("shop-1"), &order_payload()).await.expect("order");

    assert_eq!(outcome.envelope.kind, ResponseKind::OrderConfirmation);
    let Payload::OrderConfirmation(confirmation) = &outcome.envelope.response else {
        panic!("expected confirmation, got {:?}", outcome.envelope.response);
    };
    assert_eq!(confirmation.total_cost, "25.00");
    assert_eq!(orders.line_count().await, 1);

    let rendered = serde_json::to_value(&outcome.envelope).expect("serialize");
    assert_eq!(rendered["type"], "order_confirmation");
    assert_eq!(rendered["response"]["total_cost"], "25.00");
    assert_eq!(rendered["next_node"], "END");
}

#[tokio::test]
async fn damaged_box_report_keeps_asking_for_an_image() {
    let llm = ScriptedLlm::new(["fraudulent_transactions", "fraudulent_transactions"]);
    let (runtime, _) = runtime(llm, StaticCatalog::default());

    let first = runtime
        .handle_message(Some("report-1"), "the box was damaged", Metadata::new())
        .await
        .expect("first turn");
    assert_eq!(first.envelope.messages[0].content, ASK_IMAGE);

    let second = runtime
        .handle_message(Some("report-1"), "it is really broken", Metadata::new())
        .await
        .expect("second turn");
    assert_eq!(second.envelope.messages[0].content, ASK_IMAGE);
}

#[tokio::test]
async fn recommendations_then_order_resets_recommendation_memory() {
    let llm = ScriptedLlm::new([
        "book_recommendation",
        "Which horror subgenre do you prefer?",
        "book_recommendation",
        "Great choice.",
        r#"[{"Title": "The Shining: A Novel", "ReasonForRecommendation": "Isolation dread", "Price": 8.99},
            {"Title": "Nonexistent Horror", "ReasonForRecommendation": "n/a", "Price": 1}]"#,
    ]);
    let (runtime, _) = runtime(llm, StaticCatalog::with_titles(["The Shining"]));

    let first = runtime
        .handle_message(Some("reader"), "I want horror books", Metadata::new())
        .await
        .expect("first turn");
    assert_eq!(first.envelope.kind, ResponseKind::Question);

    let second = runtime
        .handle_message(Some("reader"), "psychological horror please", Metadata::new())
        .await
        .expect("second turn");
    assert_eq!(second.envelope.kind, ResponseKind::Recommendation);
    let Payload::Recommendations(books) = &second.envelope.response else {
        panic!("expected recommendations");
    };
    assert_eq!(books.len(), 1);
    assert_eq!(books[0].title, "The Shining");
    assert_eq!(books[0].image_url, "https://covers.test/placeholder.png");

    let operator = runtime.sessions().session("reader").await;
    assert!(!operator.lock().await.memory().is_empty());

    runtime.place_order(Some("reader"), &order_payload()).await.expect("order");
    assert!(operator.lock().await.memory().is_empty());
}

#[tokio::test]
async fn sessions_do_not_share_conversation_state() {
    let llm = ScriptedLlm::new(["fraudulent_transactions", "fraudulent_transactions"]);
    let (runtime, _) = runtime(llm, StaticCatalog::default());

    runtime
        .handle_message(Some("alice"), "the box was damaged", Metadata::new())
        .await
        .expect("alice");
    let bob = runtime
        .handle_message(Some("bob"), "I have a problem", Metadata::new())
        .await
        .expect("bob");

    assert_eq!(runtime.sessions().len().await, 2);
    assert_eq!(bob.envelope.messages[0].content, ASK_ISSUE_TYPE);
}
