use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{info, warn};

use bookworm_core::domain::conversation::{ConversationMemory, ConversationTurn};
use bookworm_core::domain::envelope::ResponseKind;
use bookworm_core::flows::{FlowEngine, FraudEvent, FraudPhase, FraudReportFlow};

use super::{AgentError, AgentKey, AgentReply, ConversationalAgent};
use crate::llm::{parse_json, LlmClient};

pub const ASK_ISSUE_TYPE: &str = "I'm sorry to hear you're having trouble. Is this about a damaged product \
or a fraudulent transaction on your account?";
pub const ASK_IMAGE: &str =
    "Please upload an image showing the issue (a photo of the item or a screenshot of the charge).";
pub const ASK_DESCRIPTION: &str = "Thank you. Please describe what happened in a few sentences.";
pub const REPORT_CANCELLED: &str = "Your report has been cancelled.";

const DAMAGE_KEYWORDS: &[&str] =
    &["damaged", "damage", "broken", "torn", "ripped", "defective", "crushed", "wet", "missing pages"];
const FRAUD_KEYWORDS: &[&str] = &[
    "fraud",
    "fraudulent",
    "unauthorized",
    "unauthorised",
    "charge",
    "charged",
    "scam",
    "stolen",
    "didn't make",
    "did not make",
    "transaction",
];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IssueType {
    DamagedProduct,
    FraudulentTransaction,
}

impl IssueType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::DamagedProduct => "damaged_product",
            Self::FraudulentTransaction => "fraudulent_transaction",
        }
    }

    /// Keyword classification. Damage wins when both match.
    pub fn classify(text: &str) -> Option<Self> {
        let lowered = text.to_lowercase();
        if DAMAGE_KEYWORDS.iter().any(|keyword| lowered.contains(keyword)) {
            Some(Self::DamagedProduct)
        } else if FRAUD_KEYWORDS.iter().any(|keyword| lowered.contains(keyword)) {
            Some(Self::FraudulentTransaction)
        } else {
            None
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Decision {
    Refund,
    Replace,
    Decline,
    Escalate,
}

impl Decision {
    fn parse(label: &str) -> Option<Self> {
        let label = label.trim().to_ascii_lowercase();
        match label.as_str() {
            "refund" => Some(Self::Refund),
            "replace" | "replacement" => Some(Self::Replace),
            "decline" => Some(Self::Decline),
            "escalate" | "escalate to human-agent" | "escalate to human agent" => Some(Self::Escalate),
            _ => None,
        }
    }

    fn allowed_for(self, issue: IssueType) -> bool {
        match (self, issue) {
            (Self::Refund | Self::Escalate, _) => true,
            (Self::Replace, IssueType::DamagedProduct) => true,
            (Self::Decline, IssueType::FraudulentTransaction) => true,
            _ => false,
        }
    }

    pub fn resolution(self, issue: IssueType) -> &'static str {
        match (issue, self) {
            (IssueType::DamagedProduct, Self::Refund) => {
                "We apologize for the inconvenience. A refund has been initiated for your damaged product."
            }
            (IssueType::DamagedProduct, Self::Replace) => {
                "We're sorry about the damaged product. A replacement will be shipped to you shortly."
            }
            (IssueType::FraudulentTransaction, Self::Refund) => {
                "We have processed a refund for the fraudulent transaction on your account."
            }
            (IssueType::FraudulentTransaction, Self::Decline) => {
                "After reviewing, we cannot process a refund for this transaction."
            }
            _ => "Your case requires further assistance. A human agent will contact you soon.",
        }
    }
}

#[derive(Debug, Deserialize)]
struct DecisionReply {
    decision: String,
    #[serde(default)]
    reason: String,
}

/// Walks a report through issue type, evidence image and description, then
/// asks the oracle for a decision.
pub struct FraudReportAgent {
    llm: Arc<dyn LlmClient>,
    flow: FlowEngine<FraudReportFlow>,
    issue: Option<IssueType>,
    image_url: Option<String>,
}

impl FraudReportAgent {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm, flow: FlowEngine::new(FraudReportFlow), issue: None, image_url: None }
    }

    pub fn phase(&self) -> FraudPhase {
        *self.flow.state()
    }

    pub fn issue(&self) -> Option<IssueType> {
        self.issue
    }

    fn classify_issue(&mut self, text: &str) -> Result<AgentReply, AgentError> {
        let Some(issue) = IssueType::classify(text) else {
            return Ok(AgentReply::question(ASK_ISSUE_TYPE));
        };
        self.flow.apply(FraudEvent::IssueClassified)?;
        self.issue = Some(issue);
        Ok(AgentReply::question(ASK_IMAGE))
    }

    async fn decide(&self, issue: IssueType, description: &str) -> Decision {
        let prompt = decision_prompt(issue, description, self.image_url.as_deref().unwrap_or(""));
        let raw = match self.llm.complete(&prompt, &[]).await {
            Ok(raw) => raw,
            Err(error) => {
                warn!(
                    event_name = "agent.fraud.oracle_failed",
                    error = %error,
                    "decision request failed, escalating"
                );
                return Decision::Escalate;
            }
        };
        let Some(reply) = parse_json::<DecisionReply>(&raw) else {
            warn!(event_name = "agent.fraud.malformed_reply", "decision reply was not JSON, escalating");
            return Decision::Escalate;
        };

        match Decision::parse(&reply.decision) {
            Some(decision) if decision.allowed_for(issue) => {
                info!(
                    event_name = "agent.fraud.decided",
                    issue = issue.as_str(),
                    decision = ?decision,
                    reason = %reply.reason,
                    "report decided"
                );
                decision
            }
            _ => {
                warn!(
                    event_name = "agent.fraud.invalid_decision",
                    issue = issue.as_str(),
                    decision = %reply.decision,
                    "decision not allowed for issue, escalating"
                );
                Decision::Escalate
            }
        }
    }
}

#[async_trait]
impl ConversationalAgent for FraudReportAgent {
    fn key(&self) -> AgentKey {
        AgentKey::FraudReport
    }

    async fn handle(
        &mut self,
        turn: &ConversationTurn,
        _memory: &mut ConversationMemory,
    ) -> Result<AgentReply, AgentError> {
        if turn.lowercase_text() == "cancel" {
            self.reset();
            return Ok(AgentReply::system(REPORT_CANCELLED));
        }

        match self.phase() {
            FraudPhase::Init => {
                self.flow.apply(FraudEvent::IssueReported)?;
                self.classify_issue(turn.text())
            }
            FraudPhase::ClarifyIssue => self.classify_issue(turn.text()),
            FraudPhase::RequestImage => {
                let Some(image_url) = turn.metadata_str("image_url") else {
                    return Ok(AgentReply::question(ASK_IMAGE));
                };
                self.flow.apply(FraudEvent::ImageProvided)?;
                self.image_url = Some(image_url.to_string());
                Ok(AgentReply::question(ASK_DESCRIPTION))
            }
            FraudPhase::RequestDescription | FraudPhase::Processing => {
                if self.phase() == FraudPhase::RequestDescription {
                    self.flow.apply(FraudEvent::DescriptionProvided)?;
                }
                let issue = self.issue.unwrap_or(IssueType::FraudulentTransaction);
                let decision = self.decide(issue, turn.text()).await;
                self.reset();
                Ok(AgentReply::text(ResponseKind::Resolution, decision.resolution(issue)))
            }
        }
    }

    fn reset(&mut self) {
        self.flow.reset();
        self.issue = None;
        self.image_url = None;
    }
}

fn decision_prompt(issue: IssueType, description: &str, image_url: &str) -> String {
    format!(
        "You are handling a customer issue for an online bookstore.\n\n\
Issue type: {issue}\n\
Customer description: \"{description}\"\n\
Evidence image: {image_url}\n\n\
Decide on exactly one action:\n\
- for damaged_product: \"Refund\", \"Replace\" or \"Escalate to Human-Agent\"\n\
- for fraudulent_transaction: \"Refund\", \"Decline\" or \"Escalate to Human-Agent\"\n\n\
Respond ONLY with JSON of the form {{\"decision\": \"<action>\", \"reason\": \"<short reason>\"}}.",
        issue = issue.as_str()
    )
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use bookworm_core::domain::conversation::{ConversationMemory, ConversationTurn, Metadata};
    use bookworm_core::domain::envelope::ResponseKind;
    use bookworm_core::flows::FraudPhase;

    use super::{FraudReportAgent, IssueType, ASK_DESCRIPTION, ASK_IMAGE, ASK_ISSUE_TYPE};
    use crate::agents::ConversationalAgent;
    use crate::testing::ScriptedLlm;

    fn turn(text: &str) -> ConversationTurn {
        ConversationTurn::new(text, Metadata::new())
    }

    fn image_turn(text: &str) -> ConversationTurn {
        let mut metadata = Metadata::new();
        metadata.insert("image_url".to_owned(), json!("https://uploads.test/box.jpg"));
        ConversationTurn::new(text, metadata)
    }

    #[test]
    fn issue_keywords_classify() {
        assert_eq!(IssueType::classify("the box was damaged"), Some(IssueType::DamagedProduct));
        assert_eq!(
            IssueType::classify("there is an unauthorized charge"),
            Some(IssueType::FraudulentTransaction)
        );
        assert_eq!(IssueType::classify("something is wrong"), None);
    }

    #[tokio::test]
    async fn damaged_report_waits_for_an_image() {
        let mut agent = FraudReportAgent::new(Arc::new(ScriptedLlm::failing()));
        let mut memory = ConversationMemory::default();

        let reply = agent.handle(&turn("the box was damaged"), &mut memory).await.expect("report");
        assert_eq!(reply.message_text(), ASK_IMAGE);
        assert_eq!(agent.phase(), FraudPhase::RequestImage);

        let reply = agent.handle(&turn("here it is"), &mut memory).await.expect("no image");
        assert_eq!(reply.message_text(), ASK_IMAGE);
        assert_eq!(agent.phase(), FraudPhase::RequestImage);
    }

    #[tokio::test]
    async fn unclassified_issue_reprompts() {
        let mut agent = FraudReportAgent::new(Arc::new(ScriptedLlm::failing()));
        let mut memory = ConversationMemory::default();

        let reply = agent.handle(&turn("I have a problem"), &mut memory).await.expect("report");
        assert_eq!(reply.message_text(), ASK_ISSUE_TYPE);
        assert_eq!(agent.phase(), FraudPhase::ClarifyIssue);

        agent.handle(&turn("still a problem"), &mut memory).await.expect("reprompt");
        assert_eq!(agent.phase(), FraudPhase::ClarifyIssue);

        agent.handle(&turn("a charge I did not make"), &mut memory).await.expect("classified");
        assert_eq!(agent.phase(), FraudPhase::RequestImage);
        assert_eq!(agent.issue(), Some(IssueType::FraudulentTransaction));
    }

    #[tokio::test]
    async fn full_report_resolves_with_oracle_decision() {
        let llm = ScriptedLlm::new([r#"```json
{"decision": "Replace", "reason": "cover torn in transit"}
```"#]);
        let mut agent = FraudReportAgent::new(Arc::new(llm));
        let mut memory = ConversationMemory::default();

        agent.handle(&turn("my book arrived torn"), &mut memory).await.expect("report");
        let reply = agent.handle(&image_turn("photo attached"), &mut memory).await.expect("image");
        assert_eq!(reply.message_text(), ASK_DESCRIPTION);

        let reply =
            agent.handle(&turn("the cover was ripped open"), &mut memory).await.expect("resolve");

        assert_eq!(reply.kind, ResponseKind::Resolution);
        assert!(reply.message_text().contains("replacement will be shipped"));
        assert_eq!(agent.phase(), FraudPhase::Init);
    }

    #[tokio::test]
    async fn decision_not_allowed_for_issue_escalates() {
        let llm = ScriptedLlm::new([r#"{"decision": "Replace", "reason": "?"}"#]);
        let mut agent = FraudReportAgent::new(Arc::new(llm));
        let mut memory = ConversationMemory::default();

        agent.handle(&turn("unauthorized charge"), &mut memory).await.expect("report");
        agent.handle(&image_turn("statement"), &mut memory).await.expect("image");
        let reply = agent.handle(&turn("I never bought this"), &mut memory).await.expect("resolve");

        assert!(reply.message_text().contains("human agent will contact you"));
    }

    #[tokio::test]
    async fn oracle_failure_escalates() {
        let mut agent = FraudReportAgent::new(Arc::new(ScriptedLlm::failing()));
        let mut memory = ConversationMemory::default();

        agent.handle(&turn("damaged book"), &mut memory).await.expect("report");
        agent.handle(&image_turn("photo"), &mut memory).await.expect("image");
        let reply = agent.handle(&turn("spine broken"), &mut memory).await.expect("resolve");

        assert_eq!(reply.kind, ResponseKind::Resolution);
        assert!(reply.message_text().contains("human agent will contact you"));
    }
}
