//! Agent output: the strict-JSON verdict a completion must contain

use crate::events::{AgentKind, Assertion, AssertionType};
use crate::llm::parse_json_completion;
use serde::Deserialize;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Verdict {
    #[serde(rename = "type")]
    pub assertion_type: AssertionType,
    pub confidence: f64,
    pub reasoning: String,
    #[serde(default)]
    pub recommendation: Option<String>,
}

/// Parse and check a completion. The error string describes what was wrong.
pub fn parse(kind: AgentKind, content: &str) -> Result<Assertion, String> {
    let verdict: Verdict = parse_json_completion(content).map_err(|e| e.to_string())?;
    if !verdict.confidence.is_finite() || !(0.0..=1.0).contains(&verdict.confidence) {
        return Err(format!("confidence {} outside [0, 1]", verdict.confidence));
    }
    let assertion_type = match kind {
        AgentKind::SpendAnalysis => AssertionType::CustomerSpendAnalysis,
        AgentKind::ResponseRecommendation => verdict.assertion_type,
    };
    Ok(Assertion {
        assertion_type,
        confidence: verdict.confidence,
        reasoning: verdict.reasoning,
        recommendation: verdict.recommendation.filter(|r| !r.trim().is_empty()),
        agent_id: kind.agent_id().to_string(),
    })
}
