use tracing::{debug, info};

use bookworm_core::domain::conversation::{ConversationMemory, ConversationTurn, Message};
use bookworm_core::domain::envelope::ResponseEnvelope;

use crate::agents::recommendation::RESET_MESSAGE;
use crate::agents::{AgentError, AgentKey, AgentReply, ConversationalAgent};
use crate::envelope;
use crate::intent::IntentClassifier;

const RESET_COMMANDS: &[&str] = &["quit", "clear"];

/// Routes one session's turns to its agents and owns the session's
/// conversation memory.
pub struct Operator {
    classifier: IntentClassifier,
    agents: Vec<Box<dyn ConversationalAgent>>,
    memory: ConversationMemory,
}

impl Operator {
    pub fn new(classifier: IntentClassifier) -> Self {
        Self { classifier, agents: Vec::new(), memory: ConversationMemory::default() }
    }

    /// Registers `agent`, replacing any agent already registered under its key.
    pub fn register(&mut self, agent: Box<dyn ConversationalAgent>) {
        let key = agent.key();
        match self.agents.iter_mut().find(|existing| existing.key() == key) {
            Some(slot) => *slot = agent,
            None => self.agents.push(agent),
        }
    }

    pub fn with_agent(mut self, agent: Box<dyn ConversationalAgent>) -> Self {
        self.register(agent);
        self
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    pub fn memory(&self) -> &ConversationMemory {
        &self.memory
    }

    /// Every agent back to its initial phase and memory cleared.
    pub fn reset(&mut self) {
        for agent in &mut self.agents {
            agent.reset();
        }
        self.memory.clear();
    }

    /// Handles one turn end to end. An agent error aborts the turn.
    pub async fn route(&mut self, turn: &ConversationTurn) -> Result<ResponseEnvelope, AgentError> {
        if RESET_COMMANDS.contains(&turn.lowercase_text().as_str()) {
            self.reset();
            info!(event_name = "chat.session.reset", "conversation reset by user");
            return Ok(AgentReply::system(RESET_MESSAGE).into_envelope());
        }

        let intents = self.classifier.classify(turn.text()).await;
        let mut keys: Vec<AgentKey> = Vec::new();
        for key in intents.iter().filter_map(|intent| intent.agent_key()) {
            if !keys.contains(&key) {
                keys.push(key);
            }
        }
        info!(
            event_name = "chat.intent.classified",
            intents = ?intents.labels(),
            agents = ?keys.iter().map(|key| key.as_str()).collect::<Vec<_>>(),
            "turn classified"
        );
        if keys.is_empty() {
            return Ok(envelope::fallback());
        }

        let mut replies = Vec::new();
        let mut messages = Vec::new();
        for key in keys {
            let Some(agent) = self.agents.iter_mut().find(|agent| agent.key() == key) else {
                debug!(event_name = "chat.route.unregistered", agent = key.as_str(), "no agent registered");
                continue;
            };
            let reply = agent.handle(turn, &mut self.memory).await?;
            envelope::push_unique(&mut messages, reply.message());

            if reply.is_recommendation() {
                debug!(
                    event_name = "chat.route.short_circuit",
                    agent = key.as_str(),
                    "recommendations returned, skipping remaining agents"
                );
                return Ok(envelope::short_circuit(reply, messages));
            }
            replies.push(reply);
        }

        if messages.is_empty() {
            return Ok(envelope::fallback());
        }
        self.remember(&messages);
        let completed_order = replies.iter().any(AgentReply::is_order_confirmation);
        let merged = envelope::merge(replies, messages);
        if completed_order {
            self.reset_recommendations();
        }
        Ok(merged)
    }

    /// Sends a turn straight to one agent, bypassing classification.
    pub async fn route_to(
        &mut self,
        key: AgentKey,
        turn: &ConversationTurn,
    ) -> Result<ResponseEnvelope, AgentError> {
        let Some(agent) = self.agents.iter_mut().find(|agent| agent.key() == key) else {
            return Ok(envelope::fallback());
        };
        let reply = agent.handle(turn, &mut self.memory).await?;
        let completed_order = reply.is_order_confirmation();
        let merged = reply.into_envelope();
        if completed_order {
            self.reset_recommendations();
        }
        Ok(merged)
    }

    fn remember(&mut self, messages: &[Message]) {
        let text = envelope::joined_text(messages);
        if self.memory.last().is_some_and(|last| last.content == text) {
            return;
        }
        self.memory.push(Message::ai(text));
    }

    fn reset_recommendations(&mut self) {
        if let Some(agent) = self.agents.iter_mut().find(|agent| agent.key() == AgentKey::Recommendation) {
            agent.reset();
        }
        self.memory.clear();
        debug!(event_name = "chat.session.order_completed", "recommendation state cleared after order");
    }
}
