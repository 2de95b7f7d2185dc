//! [`Persona`] definitions and the immutable [`PersonaRegistry`].
//!
//! A persona is a named behavioural configuration: the system prompt handed
//! to response generation, a tone description, the boundaries it enforces and
//! the conditions under which it hands the conversation to another persona.
//!
//! The registry is built once at startup and shared via `Arc` between all
//! sessions; only the per-session [`PersonaMachine`][crate::PersonaMachine]
//! holds mutable state (the id of the active persona).

use std::fmt;
use std::sync::Arc;

use regex::Regex;
use tracing::warn;

use crate::rules::{Constraint, EscalationRule, KeywordPredicate, PatternPredicate, Predicate};

/// Id of the persona every session starts with unless configured otherwise.
pub const DEFAULT_PERSONA_ID: &str = "companion";

// ────────────────────────────────────────────────────────────────────────────
// Persona
// ────────────────────────────────────────────────────────────────────────────

/// A named voice the companion can adopt.
pub struct Persona {
    pub id: String,
    pub name: String,
    pub description: String,
    pub system_prompt: String,
    /// Free-form tone description (e.g. `"warm"`, `"precise"`).
    pub tone: String,
    /// Boundaries, evaluated in order.
    pub constraints: Vec<Constraint>,
    /// Transition triggers, evaluated in order; first match wins.
    pub escalation_rules: Vec<EscalationRule>,
}

impl Persona {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            system_prompt: String::new(),
            tone: String::new(),
            constraints: Vec::new(),
            escalation_rules: Vec::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    pub fn with_tone(mut self, tone: impl Into<String>) -> Self {
        self.tone = tone.into();
        self
    }

    /// Append an escalation rule: switch to `target` when `predicate` matches.
    pub fn escalate_to(
        mut self,
        target: impl Into<String>,
        predicate: impl Predicate + 'static,
    ) -> Self {
        self.escalation_rules
            .push(EscalationRule::new(predicate, target));
        self
    }

    /// Append a boundary that answers with `notice` when `predicate` matches.
    pub fn constrain(mut self, predicate: impl Predicate + 'static, notice: impl Into<String>) -> Self {
        self.constraints.push(Constraint::new(predicate, notice));
        self
    }
}

impl fmt::Debug for Persona {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Persona")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("tone", &self.tone)
            .field(
                "constraints",
                &self
                    .constraints
                    .iter()
                    .map(|c| c.predicate.describe())
                    .collect::<Vec<_>>(),
            )
            .field(
                "escalation_rules",
                &self
                    .escalation_rules
                    .iter()
                    .map(|r| (r.predicate.describe(), r.target.as_str()))
                    .collect::<Vec<_>>(),
            )
            .finish()
    }
}

// ────────────────────────────────────────────────────────────────────────────
// PersonaRegistry
// ────────────────────────────────────────────────────────────────────────────

/// Immutable, ordered set of personas keyed by id.
///
/// # Example
///
/// ```
/// use kindred_kernel::persona::{Persona, PersonaRegistry};
///
/// let registry = PersonaRegistry::new(vec![
///     Persona::new("host", "Host"),
///     Persona::new("guest", "Guest"),
/// ]);
/// assert!(registry.contains("guest"));
/// assert_eq!(registry.ids(), vec!["host", "guest"]);
/// ```
#[derive(Debug)]
pub struct PersonaRegistry {
    personas: Vec<Arc<Persona>>,
}

impl PersonaRegistry {
    /// Build a registry from `personas`.  When two personas share an id the
    /// first one is kept.
    pub fn new(personas: Vec<Persona>) -> Self {
        let mut kept: Vec<Arc<Persona>> = Vec::with_capacity(personas.len());
        for persona in personas {
            if kept.iter().any(|p| p.id == persona.id) {
                warn!(persona = %persona.id, "duplicate persona id ignored");
                continue;
            }
            kept.push(Arc::new(persona));
        }
        Self { personas: kept }
    }

    /// Look up a persona by id.
    pub fn get(&self, id: &str) -> Option<&Arc<Persona>> {
        self.personas.iter().find(|p| p.id == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    /// Persona ids in registration order.
    pub fn ids(&self) -> Vec<&str> {
        self.personas.iter().map(|p| p.id.as_str()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Persona>> {
        self.personas.iter()
    }

    pub fn len(&self) -> usize {
        self.personas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.personas.is_empty()
    }

    /// The three stock personas: `companion`, `engineer` and `coach`.
    pub fn builtin() -> Self {
        Self::new(vec![companion(), engineer(), coach()])
    }
}

impl Default for PersonaRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Built-in personas
// ────────────────────────────────────────────────────────────────────────────

const TECHNICAL_KEYWORDS: &[&str] = &[
    "debug",
    "function",
    "code",
    "bug",
    "compile",
    "stack trace",
    "exception",
    "refactor",
    "syntax",
    "error",
    "unit test",
];

const EMOTIONAL_KEYWORDS: &[&str] = &[
    "i feel",
    "feeling",
    "anxious",
    "overwhelmed",
    "stressed",
    "lonely",
    "burned out",
    "burnt out",
    "sad",
];

const DESTRUCTIVE_PATTERN: &str =
    r"(?i)(\bdrop\s+(table|database)\b|\btruncate\s+table\b|\brm\s+-rf\s+/)";

const CREDENTIAL_KEYWORDS: &[&str] = &[
    "password",
    "api key",
    "secret key",
    "private key",
    "credit card number",
];

fn technical() -> KeywordPredicate {
    KeywordPredicate::new("message is about programming or debugging", TECHNICAL_KEYWORDS)
}

fn emotional() -> KeywordPredicate {
    KeywordPredicate::new("message expresses feelings or emotional strain", EMOTIONAL_KEYWORDS)
}

fn companion() -> Persona {
    Persona::new(DEFAULT_PERSONA_ID, "Companion")
        .with_description("Friendly everyday conversation partner.")
        .with_system_prompt(
            "You are a warm, attentive companion. Keep replies natural and \
             adapt to the user's preferred tone.",
        )
        .with_tone("warm")
        .escalate_to("engineer", technical())
        .escalate_to("coach", emotional())
        .constrain(
            KeywordPredicate::new("message shares credentials", CREDENTIAL_KEYWORDS),
            "I can't store or repeat credentials like passwords or keys. Please keep those private.",
        )
}

fn engineer() -> Persona {
    let persona = Persona::new("engineer", "Engineer")
        .with_description("Precise technical helper for code and debugging.")
        .with_system_prompt(
            "You are a pragmatic software engineer. Be precise, show code when \
             useful, and explain trade-offs briefly.",
        )
        .with_tone("precise")
        .escalate_to("coach", emotional())
        .escalate_to(
            DEFAULT_PERSONA_ID,
            KeywordPredicate::new(
                "user wants to leave technical mode",
                ["just chat", "off topic", "something else", "take a break"],
            ),
        );

    match Regex::new(DESTRUCTIVE_PATTERN) {
        Ok(destructive) => persona.constrain(
            PatternPredicate::new("destructive operation", destructive),
            "I won't walk through destructive operations like dropping tables or wiping \
             filesystems. Let's find a safer approach.",
        ),
        Err(e) => {
            warn!(error = %e, "destructive-operation pattern rejected; constraint disabled");
            persona
        }
    }
}

fn coach() -> Persona {
    Persona::new("coach", "Coach")
        .with_description("Gentle reflective listener for wellbeing check-ins.")
        .with_system_prompt(
            "You are a supportive reflective coach. Listen first, ask open \
             questions, and never judge.",
        )
        .with_tone("gentle")
        .escalate_to("engineer", technical())
        .constrain(
            KeywordPredicate::new(
                "asks for medical advice",
                ["diagnose", "diagnosis", "prescribe", "medication", "dosage"],
            ),
            "I'm not able to give medical diagnoses or medication advice; a licensed \
             professional is the right person for that.",
        )
}
