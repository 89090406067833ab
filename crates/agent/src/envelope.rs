//! Builds the single envelope returned for a turn from the replies of the
//! agents that handled it.

use bookworm_core::domain::conversation::Message;
use bookworm_core::domain::envelope::{Payload, ResponseEnvelope, ResponseKind};

use crate::agents::AgentReply;

pub const FALLBACK_MESSAGE: &str =
    "I'm here to assist with books, orders, or related queries. Please ask a relevant question!";

/// Appends `message` unless a message with the same content is already present.
pub fn push_unique(messages: &mut Vec<Message>, message: Message) -> bool {
    if messages.iter().any(|existing| existing.content == message.content) {
        return false;
    }
    messages.push(message);
    true
}

/// Returned when no intent resolved to an agent.
pub fn fallback() -> ResponseEnvelope {
    ResponseEnvelope::new(
        ResponseKind::System,
        Payload::Text(FALLBACK_MESSAGE.to_string()),
        vec![Message::ai(FALLBACK_MESSAGE)],
    )
}

/// The recommendation payload travels alone; earlier messages are kept as-is.
pub fn short_circuit(reply: AgentReply, messages: Vec<Message>) -> ResponseEnvelope {
    ResponseEnvelope::new(reply.kind, reply.payload, messages)
}

/// One contributing agent keeps its kind and payload. Several contributors
/// collapse into a plain `response` whose text is the space-joined messages.
pub fn merge(mut replies: Vec<AgentReply>, messages: Vec<Message>) -> ResponseEnvelope {
    if replies.len() == 1 {
        if let Some(reply) = replies.pop() {
            return ResponseEnvelope::new(reply.kind, reply.payload, messages);
        }
    }
    let text = joined_text(&messages);
    ResponseEnvelope::new(ResponseKind::Response, Payload::Text(text), messages)
}

pub fn joined_text(messages: &[Message]) -> String {
    messages.iter().map(|message| message.content.as_str()).collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use bookworm_core::domain::conversation::Message;
    use bookworm_core::domain::envelope::{Payload, ResponseKind};

    use super::{fallback, merge, push_unique, FALLBACK_MESSAGE};
    use crate::agents::AgentReply;

    #[test]
    fn push_unique_keeps_first_occurrence() {
        let mut messages = vec![Message::ai("I can help with that.")];
        assert!(!push_unique(&mut messages, Message::ai("I can help with that.")));
        assert!(push_unique(&mut messages, Message::ai("Which order?")));
        assert_eq!(messages.len(), 2);
    }

    #[test]
    fn single_reply_keeps_kind() {
        let reply = AgentReply::question("Which genre?");
        let messages = vec![reply.message()];

        let envelope = merge(vec![reply], messages);

        assert_eq!(envelope.kind, ResponseKind::Question);
        assert_eq!(envelope.response, Payload::Text("Which genre?".to_owned()));
    }

    #[test]
    fn several_replies_become_plain_response() {
        let replies = vec![AgentReply::question("Which genre?"), AgentReply::error("No orders found.")];
        let messages = replies.iter().map(AgentReply::message).collect();

        let envelope = merge(replies, messages);

        assert_eq!(envelope.kind, ResponseKind::Response);
        assert_eq!(envelope.response, Payload::Text("Which genre? No orders found.".to_owned()));
        assert_eq!(envelope.messages.len(), 2);
    }

    #[test]
    fn fallback_is_a_system_envelope() {
        let envelope = fallback();
        assert_eq!(envelope.kind, ResponseKind::System);
        assert_eq!(envelope.messages[0].content, FALLBACK_MESSAGE);
        assert_eq!(envelope.next_node, "END");
    }
}
