//! Environment-driven configuration

use crate::broker::TopicMap;
use crate::llm::AnthropicConfig;
use crate::responder::DecisionPolicy;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{name}={value} is not a valid {expected}")]
    Invalid {
        name: &'static str,
        value: String,
        expected: &'static str,
    },
}

/// Keyword matching strategy for the command evaluator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MatcherKind {
    #[default]
    Substring,
    Token,
}

impl FromStr for MatcherKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "substring" => Ok(MatcherKind::Substring),
            "token" => Ok(MatcherKind::Token),
            _ => Err(format!("unknown matcher: {s}")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub db_path: String,
    pub port: u16,
    pub broker_url: String,
    /// Logical producer identity; one pooled producer per id
    pub client_id: String,
    pub topics: TopicMap,
    pub matcher: MatcherKind,
    pub policy: DecisionPolicy,
    /// Agents are only mounted when a key is configured
    pub anthropic: Option<AnthropicConfig>,
}

impl PipelineConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from any variable source; unset and empty values take defaults
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let db_path = var("SUPPORT_DB_PATH").unwrap_or_else(|| {
            let home = var("HOME").unwrap_or_else(|| "/tmp".to_string());
            format!("{home}/.support-pipeline/pipeline.db")
        });

        let defaults = TopicMap::default();
        let topics = TopicMap {
            evaluations: var("SUPPORT_TOPIC_EVALUATIONS").unwrap_or(defaults.evaluations),
            assertions: var("SUPPORT_TOPIC_ASSERTIONS").unwrap_or(defaults.assertions),
            updates: var("SUPPORT_TOPIC_UPDATES").unwrap_or(defaults.updates),
            decisions: var("SUPPORT_TOPIC_DECISIONS").unwrap_or(defaults.decisions),
        };

        let default_policy = DecisionPolicy::default();
        let policy = DecisionPolicy {
            respond_threshold: threshold(
                "SUPPORT_RESPOND_THRESHOLD",
                var("SUPPORT_RESPOND_THRESHOLD"),
                default_policy.respond_threshold,
            )?,
            escalate_threshold: threshold(
                "SUPPORT_ESCALATE_THRESHOLD",
                var("SUPPORT_ESCALATE_THRESHOLD"),
                default_policy.escalate_threshold,
            )?,
        };

        let anthropic = var("ANTHROPIC_API_KEY").map(|key| {
            let mut config = AnthropicConfig::new(key);
            if let Some(model) = var("SUPPORT_LLM_MODEL") {
                config.model = model;
            }
            if let Some(base_url) = var("SUPPORT_LLM_BASE_URL") {
                config.base_url = base_url;
            }
            config
        });

        Ok(Self {
            db_path,
            port: parse("SUPPORT_PORT", var("SUPPORT_PORT"), "port number")?.unwrap_or(8080),
            broker_url: var("SUPPORT_BROKER_URL")
                .unwrap_or_else(|| "http://localhost:8082".to_string()),
            client_id: var("SUPPORT_CLIENT_ID").unwrap_or_else(|| "support-pipeline".to_string()),
            topics,
            matcher: parse("SUPPORT_KEYWORD_MATCHER", var("SUPPORT_KEYWORD_MATCHER"), "matcher (substring|token)")?
                .unwrap_or_default(),
            policy,
            anthropic,
        })
    }
}

fn parse<T: FromStr>(
    name: &'static str,
    value: Option<String>,
    expected: &'static str,
) -> Result<Option<T>, ConfigError> {
    value
        .map(|v| {
            v.trim().parse().map_err(|_| ConfigError::Invalid {
                name,
                value: v.clone(),
                expected,
            })
        })
        .transpose()
}

fn threshold(name: &'static str, value: Option<String>, default: f64) -> Result<f64, ConfigError> {
    let raw = value.clone();
    let parsed: f64 = parse(name, value, "confidence in [0, 1]")?.unwrap_or(default);
    if parsed.is_finite() && (0.0..=1.0).contains(&parsed) {
        Ok(parsed)
    } else {
        Err(ConfigError::Invalid {
            name,
            value: raw.unwrap_or_default(),
            expected: "confidence in [0, 1]",
        })
    }
}
