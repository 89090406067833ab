use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use bookworm_core::config::{ConversationConfig, DEFAULT_FALLBACK_IMAGE_URL};
use bookworm_core::domain::book::{normalize_title, RecommendationCandidate, RecommendedBook};
use bookworm_core::domain::conversation::{ConversationMemory, ConversationTurn, Message};
use bookworm_core::flows::{FlowEngine, RecommendationEvent, RecommendationFlow, RecommendationPhase};

use super::{AgentError, AgentKey, AgentReply, ConversationalAgent};
use crate::catalog::BookCatalog;
use crate::llm::{parse_json, LlmClient};

pub const RESET_MESSAGE: &str = "Conversation reset.";

const OFF_TOPIC_KEYWORDS: &[&str] = &[
    "weather",
    "news",
    "joke",
    "recipe",
    "food",
    "sports",
    "politics",
    "movies",
    "games",
    "unrelated topic",
    "non-book related",
];

const DISSATISFACTION_PHRASES: &[&str] = &[
    "don't recommend",
    "dont recommend",
    "don't like",
    "dont like",
    "didn't like",
    "didnt like",
    "not good",
    "bad recommendations",
    "poor suggestions",
    "stop recommendations",
];

const STEERING_REPLIES: [&str; 3] = [
    "I'm here to help you with book recommendations and information about books. Please ask something related to books.",
    "Remember, I’m your book assistant. How can I assist you with book recommendations or book-related information?",
    "It seems we're off track. Let's get back to discussing books! Please ask me anything about book recommendations or book-related topics.",
];

/// Questions already "spent" after a dissatisfaction report.
const DISSATISFIED_QUESTION_FLOOR: u32 = 2;

const FALLBACK_QUESTION: &str =
    "Could you tell me a little more about the kinds of books you enjoy?";

const CLARIFICATION_REQUEST: &str = "It seems you weren't satisfied with the previous recommendations. \
Could you tell me more about your preferences or specific genres, authors, or themes you're interested in? \
This will help me improve my suggestions.";

const GATHERING_INSTRUCTIONS: &str = "You are an assistant specializing in book recommendations. \
Your goal is to understand the user's preferences and provide personalized book recommendations. \
Follow these guidelines:\n\
1. Ask questions to learn the user's preferred genres and themes, specific interests within those genres, \
reading experience level, and books they enjoyed or disliked.\n\
2. Avoid repetitive questions and gather information quickly.\n\
3. Keep the conversation natural and avoid excessive follow-up questions.";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RecommendationSettings {
    pub min_questions: u32,
    pub readiness_memory_threshold: usize,
    pub fallback_image_url: String,
}

impl RecommendationSettings {
    pub fn from_config(conversation: &ConversationConfig, fallback_image_url: impl Into<String>) -> Self {
        Self {
            min_questions: conversation.min_questions,
            readiness_memory_threshold: conversation.readiness_memory_threshold,
            fallback_image_url: fallback_image_url.into(),
        }
    }
}

impl Default for RecommendationSettings {
    fn default() -> Self {
        Self {
            min_questions: 4,
            readiness_memory_threshold: 3,
            fallback_image_url: DEFAULT_FALLBACK_IMAGE_URL.to_string(),
        }
    }
}

/// Gathers reading preferences over several turns, then asks the oracle for
/// recommendations and enriches them from the catalog.
pub struct RecommendationAgent {
    llm: Arc<dyn LlmClient>,
    catalog: Arc<dyn BookCatalog>,
    settings: RecommendationSettings,
    flow: FlowEngine<RecommendationFlow>,
    question_count: u32,
    recommended_titles: BTreeSet<String>,
    out_of_context_count: u32,
}

impl RecommendationAgent {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        catalog: Arc<dyn BookCatalog>,
        settings: RecommendationSettings,
    ) -> Self {
        Self {
            llm,
            catalog,
            settings,
            flow: FlowEngine::new(RecommendationFlow),
            question_count: 0,
            recommended_titles: BTreeSet::new(),
            out_of_context_count: 0,
        }
    }

    pub fn phase(&self) -> RecommendationPhase {
        *self.flow.state()
    }

    pub fn question_count(&self) -> u32 {
        self.question_count
    }

    pub fn out_of_context_count(&self) -> u32 {
        self.out_of_context_count
    }

    /// Lower-cased main titles already shown in this session.
    pub fn recommended_titles(&self) -> &BTreeSet<String> {
        &self.recommended_titles
    }

    fn is_ready(&self, memory: &ConversationMemory) -> bool {
        self.question_count >= self.settings.min_questions
            || memory.len() > self.settings.readiness_memory_threshold
    }

    fn is_excluded(&self, title: &str) -> bool {
        self.recommended_titles.contains(&normalize_title(title).to_lowercase())
    }

    async fn converse(&self, input: &str, memory: &ConversationMemory) -> String {
        let prompt = format!("{GATHERING_INSTRUCTIONS}\n\nUser: {input}");
        match self.llm.complete(&prompt, memory.messages()).await {
            Ok(reply) if !reply.trim().is_empty() => reply.trim().to_string(),
            Ok(_) => FALLBACK_QUESTION.to_string(),
            Err(error) => {
                warn!(
                    event_name = "agent.recommendation.oracle_failed",
                    error = %error,
                    "preference question failed, using fallback question"
                );
                FALLBACK_QUESTION.to_string()
            }
        }
    }

    /// Candidates come back in oracle order; misses and excluded titles are skipped.
    async fn recommend_books(&mut self, memory: &ConversationMemory) -> Vec<RecommendedBook> {
        let prompt = recommendation_prompt(&memory.transcript(), &self.recommended_titles);
        let raw = match self.llm.complete(&prompt, &[]).await {
            Ok(raw) => raw,
            Err(error) => {
                warn!(
                    event_name = "agent.recommendation.oracle_failed",
                    error = %error,
                    "recommendation request failed"
                );
                return Vec::new();
            }
        };
        let Some(candidates) = parse_json::<Vec<RecommendationCandidate>>(&raw) else {
            warn!(
                event_name = "agent.recommendation.malformed_reply",
                "recommendation reply was not a JSON array of books"
            );
            return Vec::new();
        };

        let mut books = Vec::new();
        for candidate in candidates {
            let title = normalize_title(&candidate.title);
            if title.is_empty() || self.is_excluded(&title) {
                debug!(
                    event_name = "agent.recommendation.excluded",
                    title = %title,
                    "skipping previously recommended title"
                );
                continue;
            }

            let record = match self.catalog.find_book_by_title(&title).await {
                Ok(Some(record)) => record,
                Ok(None) => {
                    info!(
                        event_name = "agent.recommendation.catalog_miss",
                        title = %title,
                        "no catalog match for recommended title"
                    );
                    continue;
                }
                Err(error) => {
                    warn!(
                        event_name = "agent.recommendation.catalog_failed",
                        title = %title,
                        error = %error,
                        "catalog lookup failed"
                    );
                    continue;
                }
            };
            if self.is_excluded(&record.title) {
                continue;
            }

            self.recommended_titles.insert(title.to_lowercase());
            self.recommended_titles.insert(normalize_title(&record.title).to_lowercase());
            books.push(RecommendedBook::from_catalog(
                record,
                &candidate,
                &self.settings.fallback_image_url,
            ));
        }

        info!(
            event_name = "agent.recommendation.delivered",
            count = books.len(),
            "recommendations delivered"
        );
        books
    }
}

#[async_trait]
impl ConversationalAgent for RecommendationAgent {
    fn key(&self) -> AgentKey {
        AgentKey::Recommendation
    }

    async fn handle(
        &mut self,
        turn: &ConversationTurn,
        memory: &mut ConversationMemory,
    ) -> Result<AgentReply, AgentError> {
        let lowered = turn.lowercase_text();
        if lowered == "quit" {
            self.reset();
            memory.clear();
            return Ok(AgentReply::system(RESET_MESSAGE));
        }

        if is_off_topic(&lowered) {
            self.out_of_context_count += 1;
            let index = (self.out_of_context_count as usize).min(STEERING_REPLIES.len()) - 1;
            return Ok(AgentReply::system(STEERING_REPLIES[index]));
        }
        self.out_of_context_count = 0;

        if self.phase() == RecommendationPhase::Provided && is_dissatisfied(&lowered) {
            self.flow.apply(RecommendationEvent::DissatisfactionReported)?;
            self.question_count = self.question_count.max(DISSATISFIED_QUESTION_FLOOR);
            let reply = self.converse(CLARIFICATION_REQUEST, memory).await;
            memory.push(Message::human(turn.text()));
            memory.push(Message::ai(reply.clone()));
            return Ok(AgentReply::question(reply));
        }

        let reply = self.converse(turn.text(), memory).await;
        memory.push(Message::human(turn.text()));
        memory.push(Message::ai(reply.clone()));

        if self.is_ready(memory) {
            self.flow.apply(RecommendationEvent::ReadinessReached)?;
            let books = self.recommend_books(memory).await;
            self.flow.apply(RecommendationEvent::RecommendationsDelivered)?;
            return Ok(AgentReply::recommendations(books));
        }

        if reply.contains('?') {
            self.question_count += 1;
        }
        Ok(AgentReply::question(reply))
    }

    fn reset(&mut self) {
        self.flow.reset();
        self.question_count = 0;
        self.recommended_titles.clear();
        self.out_of_context_count = 0;
    }
}

fn is_off_topic(lowered: &str) -> bool {
    OFF_TOPIC_KEYWORDS.iter().any(|keyword| lowered.contains(keyword))
}

fn is_dissatisfied(lowered: &str) -> bool {
    DISSATISFACTION_PHRASES.iter().any(|phrase| lowered.contains(phrase))
}

fn recommendation_prompt(transcript: &str, excluded: &BTreeSet<String>) -> String {
    let excluded = if excluded.is_empty() {
        "(none)".to_string()
    } else {
        excluded.iter().cloned().collect::<Vec<_>>().join("\n")
    };
    format!(
        "You are a book recommendation specialist. Base your recommendations on this conversation:\n\n\
{transcript}\n\n\
DO NOT recommend any of these previously recommended books:\n{excluded}\n\n\
Recommend 5 personalized books, focusing on the most recent preferences and feedback. \
Respond ONLY with a JSON array of objects with these keys:\n\
- \"Title\": the exact title as printed on the cover, never including the author\n\
- \"ReasonForRecommendation\": a brief explanation\n\
- \"Price\": price in dollars without a currency symbol\n\
Return only the JSON array, with no additional text."
    )
}
