//! Decision policy: assertion in, ruling out
//!
//! Ordered rules, first match wins. Thresholds are inclusive lower bounds.
//! Anything that matches no rule resolves to `WAIT_FOR_MORE_INFO`.

use crate::events::{Assertion, AssertionType, DecisionType};

pub const DEFAULT_RESPOND_THRESHOLD: f64 = 0.7;
pub const DEFAULT_ESCALATE_THRESHOLD: f64 = 0.8;

/// Customer-visible text sent when a conversation is handed to a person
pub const ESCALATION_NOTICE: &str =
    "Your conversation has been escalated to a member of our support team.";

#[derive(Debug, Clone, PartialEq)]
pub struct ResponseDecision {
    pub should_respond: bool,
    pub decision: DecisionType,
    pub reasoning: String,
    pub response_content: Option<String>,
    pub next_actions: Vec<String>,
}

impl ResponseDecision {
    fn silent(decision: DecisionType, reasoning: String, next_actions: &[&str]) -> Self {
        Self {
            should_respond: false,
            decision,
            reasoning,
            response_content: None,
            next_actions: next_actions.iter().map(|a| (*a).to_string()).collect(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DecisionPolicy {
    pub respond_threshold: f64,
    pub escalate_threshold: f64,
}

impl Default for DecisionPolicy {
    fn default() -> Self {
        Self {
            respond_threshold: DEFAULT_RESPOND_THRESHOLD,
            escalate_threshold: DEFAULT_ESCALATE_THRESHOLD,
        }
    }
}

impl DecisionPolicy {
    pub fn decide(&self, assertion: &Assertion) -> ResponseDecision {
        let confidence = assertion.confidence;
        let recommendation = assertion
            .recommendation
            .as_deref()
            .filter(|r| !r.trim().is_empty());

        match (&assertion.assertion_type, recommendation) {
            (AssertionType::ResponseRecommendation, Some(text))
                if confidence >= self.respond_threshold =>
            {
                ResponseDecision {
                    should_respond: true,
                    decision: DecisionType::RespondToCustomer,
                    reasoning: format!(
                        "{} recommended a response with confidence {confidence:.2}",
                        assertion.agent_id
                    ),
                    response_content: Some(text.to_string()),
                    next_actions: vec!["send_response".to_string()],
                }
            }
            (AssertionType::ActionRequired, _) if confidence >= self.escalate_threshold => {
                ResponseDecision {
                    should_respond: true,
                    decision: DecisionType::EscalateToHuman,
                    reasoning: format!(
                        "{} flagged required action with confidence {confidence:.2}",
                        assertion.agent_id
                    ),
                    response_content: Some(ESCALATION_NOTICE.to_string()),
                    next_actions: vec![
                        "notify_supervisor".to_string(),
                        "assign_human_agent".to_string(),
                    ],
                }
            }
            (AssertionType::ActionRequired, _) => ResponseDecision::silent(
                DecisionType::WaitForMoreInfo,
                format!(
                    "Action required but confidence {confidence:.2} is below {:.2}",
                    self.escalate_threshold
                ),
                &["await_additional_assertions"],
            ),
            (AssertionType::CustomerSpendAnalysis, _) => ResponseDecision::silent(
                DecisionType::NoAction,
                "Spend analysis recorded for future orchestration".to_string(),
                &["update_customer_profile"],
            ),
            (AssertionType::NoActionNeeded, _) => ResponseDecision::silent(
                DecisionType::NoAction,
                format!("{} found no action needed", assertion.agent_id),
                &[],
            ),
            (other, _) => ResponseDecision::silent(
                DecisionType::WaitForMoreInfo,
                format!(
                    "No rule matched assertion type {other} at confidence {confidence:.2}; \
                     waiting for more information"
                ),
                &["await_additional_assertions"],
            ),
        }
    }
}
