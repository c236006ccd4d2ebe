//! Instructions sent to the completion service for each agent kind

use crate::events::{AgentKind, EvaluationEvent};
use crate::llm::{ChatMessage, CompletionOptions};

const JSON_CONTRACT: &str = "Reply with a single JSON object and nothing else: \
{\"type\": string, \"confidence\": number between 0 and 1, \"reasoning\": string, \
\"recommendation\": string or null}.";

fn system_prompt(kind: AgentKind) -> String {
    let role = match kind {
        AgentKind::ResponseRecommendation => {
            "You review customer support messages. Use type RESPONSE_RECOMMENDATION with a \
             reply in `recommendation` when a direct answer will help, ACTION_REQUIRED when a \
             person must intervene, or NO_ACTION_NEEDED when nothing should be sent."
        }
        AgentKind::SpendAnalysis => {
            "You assess the billing and retention risk in customer support messages. Use type \
             CUSTOMER_SPEND_ANALYSIS and summarize the spend signal in `reasoning`."
        }
    };
    format!("{role}\n\n{JSON_CONTRACT}")
}

/// Prompt for one evaluation, or `None` when it carries no customer text
pub fn build(kind: AgentKind, event: &EvaluationEvent) -> Option<(Vec<ChatMessage>, CompletionOptions)> {
    let message = event.evaluation.message.as_deref()?;
    let user = format!(
        "Classification: {:?} ({})\nSuggested actions: {}\n\nCustomer message:\n{message}",
        event.evaluation.classification,
        event.evaluation.reason,
        event.evaluation.suggested_actions.join(", "),
    );
    let options = CompletionOptions {
        system: Some(system_prompt(kind)),
        max_tokens: 1024,
        temperature: Some(0.0),
    };
    Some((vec![ChatMessage::user(user)], options))
}
