//! Keyword intent detection
//!
//! Detection is a strategy behind `IntentDetector` so the matching technique
//! can change without touching the classification table.

use regex::Regex;

/// Which keyword families matched a message
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IntentSignals {
    pub urgent: bool,
    pub cancellation: bool,
    pub billing: bool,
}

/// Pluggable intent matching over raw customer text.
///
/// Implementations own case folding; callers pass the message as sent.
pub trait IntentDetector: Send + Sync {
    fn detect(&self, text: &str) -> IntentSignals;

    fn name(&self) -> &'static str;
}

/// Fixed keyword lists
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lexicon {
    pub urgency: Vec<String>,
    pub cancellation: Vec<String>,
    pub billing: Vec<String>,
}

fn words(list: &[&str]) -> Vec<String> {
    list.iter().map(|w| (*w).to_string()).collect()
}

impl Default for Lexicon {
    fn default() -> Self {
        Self {
            urgency: words(&[
                "urgent",
                "emergency",
                "asap",
                "immediately",
                "critical",
                "right now",
            ]),
            cancellation: words(&[
                "cancel",
                "unsubscribe",
                "terminate",
                "close my account",
                "delete my account",
                "stop my subscription",
            ]),
            billing: words(&[
                "bill",
                "invoice",
                "charge",
                "payment",
                "refund",
                "subscription",
                "price",
                "pricing",
                "plan",
            ]),
        }
    }
}

/// Plain substring containment. "cancel" matches "cancellation".
#[derive(Debug, Clone, Default)]
pub struct SubstringMatcher {
    lexicon: Lexicon,
}

impl SubstringMatcher {
    pub fn new(lexicon: &Lexicon) -> Self {
        let fold = |list: &[String]| -> Vec<String> { list.iter().map(|w| w.to_lowercase()).collect() };
        Self {
            lexicon: Lexicon {
                urgency: fold(&lexicon.urgency),
                cancellation: fold(&lexicon.cancellation),
                billing: fold(&lexicon.billing),
            },
        }
    }

    fn any(list: &[String], text: &str) -> bool {
        list.iter().any(|word| text.contains(word.as_str()))
    }
}

impl IntentDetector for SubstringMatcher {
    fn detect(&self, text: &str) -> IntentSignals {
        let text = text.to_lowercase();
        IntentSignals {
            urgent: Self::any(&self.lexicon.urgency, &text),
            cancellation: Self::any(&self.lexicon.cancellation, &text),
            billing: Self::any(&self.lexicon.billing, &text),
        }
    }

    fn name(&self) -> &'static str {
        "substring"
    }
}

/// Whole-word matching. "plan" does not match "explanation".
#[derive(Debug, Clone)]
pub struct TokenMatcher {
    urgency: Option<Regex>,
    cancellation: Option<Regex>,
    billing: Option<Regex>,
}

impl TokenMatcher {
    pub fn new(lexicon: &Lexicon) -> Result<Self, regex::Error> {
        Ok(Self {
            urgency: Self::compile(&lexicon.urgency)?,
            cancellation: Self::compile(&lexicon.cancellation)?,
            billing: Self::compile(&lexicon.billing)?,
        })
    }

    /// `\b(?:w1|w2|...)\b`, or `None` for an empty list
    fn compile(list: &[String]) -> Result<Option<Regex>, regex::Error> {
        if list.is_empty() {
            return Ok(None);
        }
        let alternation = list
            .iter()
            .map(|w| regex::escape(&w.to_lowercase()))
            .collect::<Vec<_>>()
            .join("|");
        Regex::new(&format!(r"\b(?:{alternation})\b")).map(Some)
    }

    fn is_match(re: Option<&Regex>, text: &str) -> bool {
        re.is_some_and(|re| re.is_match(text))
    }
}

impl IntentDetector for TokenMatcher {
    fn detect(&self, text: &str) -> IntentSignals {
        let text = text.to_lowercase();
        IntentSignals {
            urgent: Self::is_match(self.urgency.as_ref(), &text),
            cancellation: Self::is_match(self.cancellation.as_ref(), &text),
            billing: Self::is_match(self.billing.as_ref(), &text),
        }
    }

    fn name(&self) -> &'static str {
        "token"
    }
}
