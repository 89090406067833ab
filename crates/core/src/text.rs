//! Input and output text sanitation.

use unicode_normalization::UnicodeNormalization;

use crate::domain::envelope::{Payload, ResponseEnvelope, ResponseKind};

pub const ERROR_LABEL: &str = "Error: ";
pub const ORDER_CONFIRMATION_LABEL: &str = "Order Confirmation: ";

fn is_stripped_control(ch: char) -> bool {
    matches!(ch, '\u{00}'..='\u{1F}' | '\u{7F}'..='\u{9F}')
}

/// Trims, decomposes to an ASCII-compatible form and drops control
/// characters. Characters with no ASCII decomposition are dropped.
pub fn preprocess(raw: &str) -> String {
    raw.trim()
        .nfkd()
        .filter(|ch| ch.is_ascii() && !is_stripped_control(*ch))
        .collect::<String>()
        .trim()
        .to_string()
}

/// Drops control characters and collapses whitespace runs to one space.
pub fn sanitize_output(text: &str) -> String {
    text.split(|ch: char| ch.is_whitespace())
        .map(|word| word.chars().filter(|ch| !is_stripped_control(*ch)).collect::<String>())
        .filter(|word| !word.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Sanitizes outgoing text and labels error and confirmation text. Typed
/// payloads are rendered by the client and pass through untouched.
pub fn postprocess(envelope: ResponseEnvelope) -> ResponseEnvelope {
    let ResponseEnvelope { kind, response, messages, next_node } = envelope;

    let response = match response {
        Payload::Text(text) => Payload::Text(label(kind, sanitize_output(&text))),
        Payload::Other(value) => {
            let rendered = match value {
                serde_json::Value::String(text) => text,
                other => other.to_string(),
            };
            Payload::Text(label(kind, sanitize_output(&rendered)))
        }
        structured => structured,
    };

    let messages = messages
        .into_iter()
        .map(|mut message| {
            message.content = sanitize_output(&message.content);
            message
        })
        .collect();

    ResponseEnvelope { kind, response, messages, next_node }
}

fn label(kind: ResponseKind, text: String) -> String {
    let prefix = match kind {
        ResponseKind::Error => ERROR_LABEL,
        ResponseKind::OrderConfirmation => ORDER_CONFIRMATION_LABEL,
        _ => return text,
    };
    if text.starts_with(prefix) {
        text
    } else {
        format!("{prefix}{text}")
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use serde_json::json;

    use crate::domain::conversation::Message;
    use crate::domain::envelope::{Payload, ResponseEnvelope, ResponseKind};

    use super::{postprocess, preprocess, sanitize_output};

    #[test]
    fn preprocess_folds_accents_and_drops_controls() {
        assert_eq!(preprocess("  Cr\u{e8}me br\u{fb}l\u{e9}e\u{0} "), "Creme brulee");
        assert_eq!(preprocess("\u{7}\u{85} horror"), "horror");
        assert_eq!(preprocess("\u{2603} snow"), "snow");
        assert_eq!(preprocess("\u{fb01}ction"), "fiction");
    }

    #[test]
    fn sanitize_output_collapses_whitespace() {
        assert_eq!(sanitize_output("  a\n\n b\t\tc  "), "a b c");
        assert_eq!(sanitize_output("x\u{1b}y"), "xy");
    }

    #[test]
    fn postprocess_labels_errors_once() {
        let envelope = ResponseEnvelope::error("Card number   must be 16 digits.");
        let once = postprocess(envelope);
        assert_eq!(once.response, Payload::Text("Error: Card number must be 16 digits.".to_owned()));

        let twice = postprocess(once.clone());
        assert_eq!(twice, once);
        assert_eq!(twice.messages[0].content, "Card number must be 16 digits.");
    }

    #[test]
    fn postprocess_stringifies_untyped_payloads() {
        let envelope = ResponseEnvelope::new(
            ResponseKind::OrderConfirmation,
            Payload::Other(json!({"order_id": "abc"})),
            vec![Message::ai("placed")],
        );

        let processed = postprocess(envelope);
        assert_eq!(
            processed.response,
            Payload::Text("Order Confirmation: {\"order_id\":\"abc\"}".to_owned())
        );
    }

    #[test]
    fn postprocess_leaves_structured_payloads() {
        let envelope = ResponseEnvelope::new(
            ResponseKind::Recommendation,
            Payload::Recommendations(Vec::new()),
            Vec::new(),
        );
        assert_eq!(postprocess(envelope.clone()), envelope);
    }

    proptest! {
        #[test]
        fn preprocess_is_idempotent(input in any::<String>()) {
            let once = preprocess(&input);
            prop_assert_eq!(preprocess(&once), once);
        }

        #[test]
        fn sanitize_output_is_idempotent(input in any::<String>()) {
            let once = sanitize_output(&input);
            prop_assert_eq!(sanitize_output(&once), once);
        }
    }
}
