use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Speaker of a single conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

/// The classified purpose of an inbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntentType {
    Chat,
    Task,
    Help,
    Reflection,
    /// Explicit control command (message starts with the command marker).
    Command,
}

impl IntentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            IntentType::Chat => "chat",
            IntentType::Task => "task",
            IntentType::Help => "help",
            IntentType::Reflection => "reflection",
            IntentType::Command => "command",
        }
    }
}

impl fmt::Display for IntentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of intent classification.  Derived per message, never stored.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Intent {
    #[serde(rename = "type")]
    pub kind: IntentType,
    /// Heuristic tiers use fixed values in `[0, 1]`; the semantic strategy
    /// reports the raw cosine similarity in `[-1, 1]`.
    pub confidence: f32,
}

impl Intent {
    pub fn new(kind: IntentType, confidence: f32) -> Self {
        Self { kind, confidence }
    }

    /// The hard-rule result for explicit commands.
    pub fn command() -> Self {
        Self::new(IntentType::Command, 1.0)
    }
}

/// One entry of the conversation history.
///
/// Lives only inside the retention buffer; turns are never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: String,
    pub intent: IntentType,
    pub timestamp: DateTime<Utc>,
}

impl Turn {
    /// Construct a turn stamped with the current UTC time.
    pub fn new(role: Role, content: impl Into<String>, intent: IntentType) -> Self {
        Self {
            role,
            content: content.into(),
            intent,
            timestamp: Utc::now(),
        }
    }

    pub fn user(content: impl Into<String>, intent: IntentType) -> Self {
        Self::new(Role::User, content, intent)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content, IntentType::Chat)
    }
}

/// Conversational register preferred by a user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tone {
    Formal,
    Playful,
    Concise,
    #[default]
    Casual,
}

impl fmt::Display for Tone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Tone::Formal => write!(f, "formal"),
            Tone::Playful => write!(f, "playful"),
            Tone::Concise => write!(f, "concise"),
            Tone::Casual => write!(f, "casual"),
        }
    }
}

/// How frequently a user tends to come back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InteractionRhythm {
    /// Back-to-back messages within a couple of minutes.
    Rapid,
    #[default]
    Steady,
    /// Returns after several days of silence.
    Sporadic,
}

impl fmt::Display for InteractionRhythm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InteractionRhythm::Rapid => write!(f, "rapid"),
            InteractionRhythm::Steady => write!(f, "steady"),
            InteractionRhythm::Sporadic => write!(f, "sporadic"),
        }
    }
}

/// Durable per-user tone and rhythm record.
///
/// Every field is always populated; a fresh record comes from
/// [`UserProfile::new`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: String,
    pub name: String,
    pub preferred_tone: Tone,
    pub interaction_rhythm: InteractionRhythm,
    pub do_not_mention: BTreeSet<String>,
    pub last_interaction: DateTime<Utc>,
}

impl UserProfile {
    /// Default record for a user seen for the first time.  The display name
    /// starts out as the user id.
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            preferred_tone: Tone::default(),
            interaction_rhythm: InteractionRhythm::default(),
            do_not_mention: BTreeSet::new(),
            last_interaction: Utc::now(),
        }
    }

    /// Merge the `Some` fields of `update` into this record.
    ///
    /// `last_interaction` is not touched here; the profile store stamps it.
    pub fn apply(&mut self, update: ProfileUpdate) {
        if let Some(name) = update.name {
            self.name = name;
        }
        if let Some(tone) = update.preferred_tone {
            self.preferred_tone = tone;
        }
        if let Some(rhythm) = update.interaction_rhythm {
            self.interaction_rhythm = rhythm;
        }
        if let Some(topics) = update.do_not_mention {
            self.do_not_mention = topics;
        }
    }
}

/// Partial set of profile fields for a merge update.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProfileUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferred_tone: Option<Tone>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interaction_rhythm: Option<InteractionRhythm>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub do_not_mention: Option<BTreeSet<String>>,
}

impl ProfileUpdate {
    pub fn tone(tone: Tone) -> Self {
        Self {
            preferred_tone: Some(tone),
            ..Self::default()
        }
    }
}

/// Error type shared across the kindred crates.
#[derive(Error, Debug)]
pub enum KindredError {
    #[error("Persona not found: {0}")]
    PersonaNotFound(String),

    #[error("Profile store error: {0}")]
    Profile(String),

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Configuration error: {0}")]
    Config(String),
}
