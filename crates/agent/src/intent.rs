use std::sync::Arc;

use tracing::{debug, warn};

use crate::agents::AgentKey;
use crate::llm::LlmClient;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Intent {
    BookRecommendation,
    OrderQuery,
    OrderPlacement,
    FraudulentTransactions,
    OutOfContext,
}

impl Intent {
    pub const ALL: [Intent; 5] = [
        Intent::BookRecommendation,
        Intent::OrderQuery,
        Intent::OrderPlacement,
        Intent::FraudulentTransactions,
        Intent::OutOfContext,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::BookRecommendation => "book_recommendation",
            Self::OrderQuery => "order_query",
            Self::OrderPlacement => "order_placement",
            Self::FraudulentTransactions => "fraudulent_transactions",
            Self::OutOfContext => "out_of_context",
        }
    }

    pub fn parse(token: &str) -> Option<Self> {
        let token = token.trim().trim_matches(|ch: char| matches!(ch, '"' | '\'' | '.' | '`'));
        Self::ALL.into_iter().find(|intent| intent.as_str().eq_ignore_ascii_case(token))
    }

    /// The agent that serves this intent. `OutOfContext` has none.
    pub fn agent_key(self) -> Option<AgentKey> {
        match self {
            Self::BookRecommendation => Some(AgentKey::Recommendation),
            Self::OrderQuery => Some(AgentKey::OrderQuery),
            Self::OrderPlacement => Some(AgentKey::OrderPlacement),
            Self::FraudulentTransactions => Some(AgentKey::FraudReport),
            Self::OutOfContext => None,
        }
    }
}

/// Intents in first-seen order, without repeats.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct IntentSet(Vec<Intent>);

impl IntentSet {
    pub fn insert(&mut self, intent: Intent) -> bool {
        if self.0.contains(&intent) {
            return false;
        }
        self.0.push(intent);
        true
    }

    pub fn contains(&self, intent: Intent) -> bool {
        self.0.contains(&intent)
    }

    pub fn iter(&self) -> impl Iterator<Item = Intent> + '_ {
        self.0.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn labels(&self) -> Vec<&'static str> {
        self.iter().map(Intent::as_str).collect()
    }
}

impl FromIterator<Intent> for IntentSet {
    fn from_iter<T: IntoIterator<Item = Intent>>(iter: T) -> Self {
        let mut set = Self::default();
        for intent in iter {
            set.insert(intent);
        }
        set
    }
}

const BOOK_KEYWORDS: &[&str] = &[
    "book",
    "books",
    "horror",
    "fantasy",
    "romance",
    "sci-fi",
    "mystery",
    "thriller",
    "action",
    "adventure",
    "recommend",
    "suggest",
    "novel",
];

/// Keywords that also match their inflections ("recommendations", "novels").
const BOOK_KEYWORD_STEMS: &[&str] = &["book", "recommend", "suggest", "novel"];

/// Request phrases, matched on whole words with whitespace collapsed.
const BOOK_PHRASES: &[&[&str]] = &[&["show", "me"], &["give", "me"]];

pub struct IntentClassifier {
    llm: Arc<dyn LlmClient>,
}

impl IntentClassifier {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }

    /// Never fails: an oracle error or an unusable reply yields `{out_of_context}`.
    /// The keyword backstop runs on every call.
    pub async fn classify(&self, text: &str) -> IntentSet {
        let mut intents = match self.llm.complete(&classification_prompt(text), &[]).await {
            Ok(reply) => parse_intents(&reply),
            Err(error) => {
                warn!(
                    event_name = "chat.intent.oracle_failed",
                    error = %error,
                    "intent classification failed, treating message as out of context"
                );
                IntentSet::default()
            }
        };
        if intents.is_empty() {
            intents.insert(Intent::OutOfContext);
        }

        if !intents.contains(Intent::BookRecommendation) && mentions_books(text) {
            intents.insert(Intent::BookRecommendation);
            debug!(
                event_name = "chat.intent.keyword_backstop",
                "added book_recommendation from keywords"
            );
        }

        intents
    }
}

fn classification_prompt(text: &str) -> String {
    format!(
        "Classify the user's message into one or more of the following intents: \
book_recommendation, order_query, order_placement, fraudulent_transactions, or out_of_context.\n\n\
Examples:\n\
- 'give me some horror books' -> book_recommendation\n\
- 'show me fantasy books' -> book_recommendation\n\
- 'recommend books' -> book_recommendation\n\
- 'what books do you suggest?' -> book_recommendation\n\
- 'where is my order?' -> order_query\n\
- 'show my order history' -> order_query\n\
- 'I want to buy the books in my cart' -> order_placement\n\
- 'there is a charge on my card I did not make' -> fraudulent_transactions\n\
- 'my book arrived damaged' -> fraudulent_transactions\n\
- 'what is the weather today?' -> out_of_context\n\n\
User message: {text}\n\n\
Return a comma-separated list of intents."
    )
}

/// Splits on commas and keeps the tokens that name a known intent.
pub fn parse_intents(reply: &str) -> IntentSet {
    reply.split(',').filter_map(Intent::parse).collect()
}

fn mentions_books(text: &str) -> bool {
    let lowered = text.to_ascii_lowercase();
    let tokens: Vec<&str> = lowered
        .split(|ch: char| !(ch.is_ascii_alphanumeric() || ch == '-'))
        .filter(|token| !token.is_empty())
        .collect();

    let keyword = tokens.iter().any(|token| {
        BOOK_KEYWORDS.contains(token) || BOOK_KEYWORD_STEMS.iter().any(|stem| token.starts_with(stem))
    });
    keyword || BOOK_PHRASES.iter().any(|phrase| tokens.windows(phrase.len()).any(|window| window == *phrase))
}
