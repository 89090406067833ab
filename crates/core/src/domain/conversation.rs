use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::text::preprocess;

pub type Metadata = Map<String, Value>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Human,
    Ai,
    Unknown,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn human(content: impl Into<String>) -> Self {
        Self { role: Role::Human, content: content.into() }
    }

    pub fn ai(content: impl Into<String>) -> Self {
        Self { role: Role::Ai, content: content.into() }
    }
}

/// One incoming user message. Lives for a single request.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ConversationTurn {
    pub raw_text: String,
    pub sanitized_text: String,
    pub metadata: Metadata,
}

impl ConversationTurn {
    pub fn new(raw_text: impl Into<String>, metadata: Metadata) -> Self {
        let raw_text = raw_text.into();
        let sanitized_text = preprocess(&raw_text);
        Self { raw_text, sanitized_text, metadata }
    }

    pub fn text(&self) -> &str {
        &self.sanitized_text
    }

    pub fn lowercase_text(&self) -> String {
        self.sanitized_text.to_lowercase()
    }

    pub fn metadata_str(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).and_then(Value::as_str).map(str::trim).filter(|value| !value.is_empty())
    }

    pub fn metadata_value(&self, key: &str) -> Option<&Value> {
        self.metadata.get(key).filter(|value| !value.is_null())
    }

    pub fn user_id(&self) -> Option<String> {
        match self.metadata_value("user_id")? {
            Value::String(text) if !text.trim().is_empty() => Some(text.trim().to_string()),
            Value::Number(number) => Some(number.to_string()),
            _ => None,
        }
    }
}

/// Append-only conversation log shared by the operator and the recommendation agent.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ConversationMemory {
    messages: Vec<Message>,
}

impl ConversationMemory {
    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }

    /// `role: content` lines in chronological order.
    pub fn transcript(&self) -> String {
        self.messages
            .iter()
            .map(|message| {
                let role = match message.role {
                    Role::Human => "human",
                    Role::Ai => "ai",
                    Role::Unknown => "unknown",
                };
                format!("{role}: {}", message.content)
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{ConversationMemory, ConversationTurn, Message, Metadata};

    #[test]
    fn turn_sanitizes_raw_text() {
        let turn = ConversationTurn::new("  caf\u{e9}\u{7} books ", Metadata::new());
        assert_eq!(turn.raw_text, "  caf\u{e9}\u{7} books ");
        assert_eq!(turn.text(), "cafe books");
    }

    #[test]
    fn user_id_accepts_text_or_number() {
        let mut metadata = Metadata::new();
        metadata.insert("user_id".to_owned(), json!(42));
        assert_eq!(ConversationTurn::new("hi", metadata).user_id().as_deref(), Some("42"));

        let mut metadata = Metadata::new();
        metadata.insert("user_id".to_owned(), json!("  "));
        assert_eq!(ConversationTurn::new("hi", metadata).user_id(), None);
    }

    #[test]
    fn transcript_keeps_chronological_order() {
        let mut memory = ConversationMemory::default();
        memory.push(Message::human("I like horror"));
        memory.push(Message::ai("Any favourite authors?"));

        assert_eq!(memory.transcript(), "human: I like horror\nai: Any favourite authors?");
        assert_eq!(memory.len(), 2);
        memory.clear();
        assert!(memory.is_empty());
    }
}
