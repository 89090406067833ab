//! Conversational core of the bookstore assistant.
//!
//! A turn flows through a fixed pipeline:
//! 1. **Sanitize** the raw text (`bookworm_core::text`).
//! 2. **Classify** it into a set of intents (`intent`), LLM first with a keyword backstop.
//! 3. **Route** each resolved intent to its agent (`operator`), in registration order.
//! 4. **Merge** agent replies into one envelope (`envelope`), de-duplicated by content.
//!
//! Every session owns its own `Operator` and agent state (`session`); nothing
//! conversational is shared between sessions. The LLM and the book catalog are
//! collaborators behind traits (`llm`, `catalog`) and are never trusted: any
//! failure degrades to a documented default inside the agent that made the call.

pub mod agents;
pub mod catalog;
pub mod envelope;
pub mod intent;
pub mod llm;
pub mod operator;
pub mod runtime;
pub mod session;
pub mod testing;

pub use agents::{AgentError, AgentKey, AgentReply, ConversationalAgent};
pub use catalog::BookCatalog;
pub use intent::{Intent, IntentClassifier, IntentSet};
pub use llm::LlmClient;
pub use operator::Operator;
pub use runtime::{AgentRuntime, ChatOutcome};
pub use session::{AgentDependencies, SessionStore};
