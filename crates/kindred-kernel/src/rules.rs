//! Declarative message predicates used by persona escalation and boundaries.
//!
//! Every persona owns two ordered rule lists:
//!
//! - [`EscalationRule`] – a `(predicate, target persona id)` pair.  The first
//!   rule whose predicate matches an inbound message names the persona the
//!   session should switch to.
//! - [`Constraint`] – a `(predicate, notice)` pair.  When the predicate
//!   matches, the message crosses one of the persona's boundaries and the
//!   notice is surfaced to the user instead of silently blocking.
//!
//! Two built-in predicates are provided:
//! - [`KeywordPredicate`] – case-insensitive match of any of a list of
//!   keywords, anchored at the start of a word.
//! - [`PatternPredicate`] – regular-expression match.

use regex::Regex;

// ────────────────────────────────────────────────────────────────────────────
// Predicate trait
// ────────────────────────────────────────────────────────────────────────────

/// A single condition evaluated over raw message text.
///
/// Implement this trait to create custom escalation or boundary triggers.
pub trait Predicate: Send + Sync {
    /// Human-readable description, used in logs and rule listings.
    fn describe(&self) -> &str;

    /// Return `true` when `content` satisfies the condition.
    fn matches(&self, content: &str) -> bool;
}

// ────────────────────────────────────────────────────────────────────────────
// Built-in predicates
// ────────────────────────────────────────────────────────────────────────────

/// Matches when the lower-cased message contains any of `keywords` starting
/// at a word boundary: `"sad"` hits "sadly" but not "crusade".
pub struct KeywordPredicate {
    description: String,
    keywords: Vec<String>,
}

impl KeywordPredicate {
    /// Keywords are lower-cased on construction.
    pub fn new<I, S>(description: impl Into<String>, keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            description: description.into(),
            keywords: keywords
                .into_iter()
                .map(|k| k.as_ref().to_lowercase())
                .collect(),
        }
    }
}

impl Predicate for KeywordPredicate {
    fn describe(&self) -> &str {
        &self.description
    }

    fn matches(&self, content: &str) -> bool {
        let lowered = content.to_lowercase();
        self.keywords
            .iter()
            .filter(|k| !k.is_empty())
            .any(|k| starts_word_at_any(&lowered, k))
    }
}

fn starts_word_at_any(haystack: &str, needle: &str) -> bool {
    haystack.match_indices(needle).any(|(at, _)| {
        haystack[..at]
            .chars()
            .next_back()
            .is_none_or(|c| !c.is_alphanumeric())
    })
}

/// Matches when `pattern` finds a hit anywhere in the message.
pub struct PatternPredicate {
    description: String,
    pattern: Regex,
}

impl PatternPredicate {
    pub fn new(description: impl Into<String>, pattern: Regex) -> Self {
        Self {
            description: description.into(),
            pattern,
        }
    }
}

impl Predicate for PatternPredicate {
    fn describe(&self) -> &str {
        &self.description
    }

    fn matches(&self, content: &str) -> bool {
        self.pattern.is_match(content)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Rule pairs
// ────────────────────────────────────────────────────────────────────────────

/// Automatic persona transition: when `predicate` matches, switch to `target`.
pub struct EscalationRule {
    pub predicate: Box<dyn Predicate>,
    pub target: String,
}

impl EscalationRule {
    pub fn new(predicate: impl Predicate + 'static, target: impl Into<String>) -> Self {
        Self {
            predicate: Box::new(predicate),
            target: target.into(),
        }
    }
}

/// Persona boundary: when `predicate` matches, `notice` explains why the
/// persona will not go along with the request.
pub struct Constraint {
    pub predicate: Box<dyn Predicate>,
    pub notice: String,
}

impl Constraint {
    pub fn new(predicate: impl Predicate + 'static, notice: impl Into<String>) -> Self {
        Self {
            predicate: Box::new(predicate),
            notice: notice.into(),
        }
    }
}
