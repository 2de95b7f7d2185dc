//! [`Companion`] – the per-message cognition pipeline.
//!
//! Every inbound message runs through the same five stages:
//!
//! 1. **Dispatch** – explicit commands are answered immediately.
//! 2. **Classify** – [`IntentRouter::route`] decides what the user wants.
//! 3. **Persona** – escalation rules may move the session to another persona;
//!    boundary constraints may attach a notice.
//! 4. **Retain** – the user turn is appended to the session history.
//! 5. **Profile** – detected tone and rhythm are merged into the user profile.
//!
//! The result is handed to response generation, which lives outside this
//! crate.  Its reply comes back through [`Companion::record_reply`].
//!
//! # Concurrency
//!
//! Sessions are kept in a map of `Arc<tokio::sync::Mutex<Session>>`.  A
//! session's lock is held for the whole pipeline, so messages of one user are
//! processed strictly in order while other users proceed concurrently.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use kindred_kernel::{DEFAULT_PERSONA_ID, Persona, PersonaRegistry};
use kindred_memory::tone::{detect_rhythm, detect_tone};
use kindred_memory::{ProfileStore, RetentionPolicy};
use kindred_types::{Intent, KindredError, ProfileUpdate, Turn, UserProfile};
use parking_lot::Mutex as SyncMutex;
use tokio::sync::Mutex;
use tracing::{info, instrument, warn};

use crate::dispatcher::CommandDispatcher;
use crate::intent::IntentRouter;
use crate::session::Session;

// ─────────────────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Configuration bundle for [`Companion`].
#[derive(Debug, Clone)]
pub struct CompanionConfig {
    /// Persona every new session starts in.
    pub default_persona: String,
    /// Eviction constants for every session's retention buffer.
    pub retention: RetentionPolicy,
}

impl Default for CompanionConfig {
    fn default() -> Self {
        Self {
            default_persona: DEFAULT_PERSONA_ID.to_string(),
            retention: RetentionPolicy::default(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Outcome
// ─────────────────────────────────────────────────────────────────────────────

/// Everything response generation needs to answer a conversational message.
#[derive(Debug, Clone)]
pub struct Conversation {
    pub intent: Intent,
    /// The persona that should answer (after any escalation).
    pub persona: Arc<Persona>,
    /// Id of the persona that was active before an escalation, if one fired.
    pub escalated_from: Option<String>,
    /// Notice of the first boundary the message crossed, if any.
    pub boundary_notice: Option<String>,
    /// Retained history, oldest first, ending with this message.
    pub history: Vec<Turn>,
    pub profile: UserProfile,
}

/// Result of processing one inbound message.
#[derive(Debug, Clone)]
pub enum Outcome {
    /// An explicit command was handled; `reply` is final.
    Command { reply: String },
    /// A conversational message, ready for response generation.
    Conversation(Conversation),
}

// ─────────────────────────────────────────────────────────────────────────────
// Companion
// ─────────────────────────────────────────────────────────────────────────────

/// The conversational cognition core behind every chat session.
///
/// # Example
///
/// ```rust
/// # tokio_test_block(async {
/// use std::sync::Arc;
/// use kindred_kernel::PersonaRegistry;
/// use kindred_memory::{ProfileStore, SqliteBackend};
/// use kindred_runtime::{Companion, CompanionConfig, IntentRouter, Outcome};
///
/// let profiles = ProfileStore::open(SqliteBackend::open_in_memory().unwrap()).await.unwrap();
/// let companion = Companion::new(
///     CompanionConfig::default(),
///     Arc::new(PersonaRegistry::builtin()),
///     IntentRouter::heuristic_only(),
///     Arc::new(profiles),
/// )
/// .unwrap();
///
/// match companion.process("sam", "can you help me debug this function?").await.unwrap() {
///     Outcome::Conversation(c) => assert_eq!(c.persona.id, "engineer"),
///     Outcome::Command { .. } => unreachable!(),
/// }
/// # });
/// # fn tokio_test_block<F: std::future::Future>(f: F) -> F::Output {
/// #     tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(f)
/// # }
/// ```
pub struct Companion {
    config: CompanionConfig,
    registry: Arc<PersonaRegistry>,
    router: IntentRouter,
    dispatcher: CommandDispatcher,
    profiles: Arc<ProfileStore>,
    sessions: SyncMutex<HashMap<String, Arc<Mutex<Session>>>>,
}

impl Companion {
    /// # Errors
    ///
    /// Returns [`KindredError::PersonaNotFound`] when the configured default
    /// persona is not in `registry`.
    pub fn new(
        config: CompanionConfig,
        registry: Arc<PersonaRegistry>,
        router: IntentRouter,
        profiles: Arc<ProfileStore>,
    ) -> Result<Self, KindredError> {
        if !registry.contains(&config.default_persona) {
            return Err(KindredError::PersonaNotFound(config.default_persona));
        }
        Ok(Self {
            config,
            registry,
            router,
            dispatcher: CommandDispatcher::new(),
            profiles,
            sessions: SyncMutex::new(HashMap::new()),
        })
    }

    pub fn router(&self) -> &IntentRouter {
        &self.router
    }

    pub fn registry(&self) -> &PersonaRegistry {
        &self.registry
    }

    pub fn profiles(&self) -> &ProfileStore {
        &self.profiles
    }

    /// Number of sessions currently held in memory.
    pub fn active_sessions(&self) -> usize {
        self.sessions.lock().len()
    }

    /// Drop the in-memory session of `user_id`.  The profile is kept.
    pub fn end_session(&self, user_id: &str) -> bool {
        self.sessions.lock().remove(user_id).is_some()
    }

    fn session(&self, user_id: &str) -> Result<Arc<Mutex<Session>>, KindredError> {
        let mut sessions = self.sessions.lock();
        if let Some(existing) = sessions.get(user_id) {
            return Ok(Arc::clone(existing));
        }
        let session = Arc::new(Mutex::new(Session::new(
            Arc::clone(&self.registry),
            &self.config.default_persona,
            self.config.retention.clone(),
        )?));
        sessions.insert(user_id.to_string(), Arc::clone(&session));
        info!(user = %user_id, "session started");
        Ok(session)
    }

    /// Run one inbound message of `user_id` through the pipeline.
    ///
    /// # Errors
    ///
    /// Only profile-store failures are errors; classification degrades to the
    /// keyword heuristic instead of failing.
    #[instrument(skip(self, content))]
    pub async fn process(&self, user_id: &str, content: &str) -> Result<Outcome, KindredError> {
        let handle = self.session(user_id)?;
        let mut session = handle.lock().await;

        if let Some(reply) = self
            .dispatcher
            .handle(content, user_id, &mut session, &self.profiles)
            .await?
        {
            return Ok(Outcome::Command { reply });
        }

        let intent = self.router.route(content).await;

        let mut escalated_from = None;
        if let Some(target) = session.persona.check_escalation(content) {
            let from = session.persona.current().id.clone();
            if session.persona.set_persona(&target) {
                escalated_from = Some(from);
            } else {
                warn!(persona = %from, target = %target, "escalation target is not registered");
            }
        }
        let boundary_notice = session.persona.check_boundaries(content);

        session.history.add_turn(Turn::user(content, intent.kind));

        let mut update = ProfileUpdate::tone(detect_tone(content));
        // A first-time user has no previous visit to measure a gap against.
        if self.profiles.contains(user_id).await {
            let previous = self.profiles.get_profile(user_id).await?;
            update.interaction_rhythm = Some(detect_rhythm(previous.last_interaction, Utc::now()));
        }
        let profile = self.profiles.update_profile(user_id, update).await?;

        Ok(Outcome::Conversation(Conversation {
            intent,
            persona: session.persona.current_arc(),
            escalated_from,
            boundary_notice,
            history: session.history.history(),
            profile,
        }))
    }

    /// Append the generated reply to the session of `user_id`.
    ///
    /// Returns `false`, recording nothing, when `user_id` has no live session.
    pub async fn record_reply(&self, user_id: &str, content: &str) -> bool {
        let Some(handle) = self.existing_session(user_id) else {
            warn!(user = %user_id, "reply for a user without a session; dropped");
            return false;
        };
        handle.lock().await.history.add_turn(Turn::assistant(content));
        true
    }

    /// Ordered copy of the retained history of `user_id`; empty when the user
    /// has no live session.
    pub async fn history(&self, user_id: &str) -> Vec<Turn> {
        match self.existing_session(user_id) {
            Some(handle) => handle.lock().await.history.history(),
            None => Vec::new(),
        }
    }

    fn existing_session(&self, user_id: &str) -> Option<Arc<Mutex<Session>>> {
        self.sessions.lock().get(user_id).map(Arc::clone)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use kindred_memory::SqliteBackend;
    use kindred_types::{InteractionRhythm, IntentType, Role, Tone};

    async fn companion() -> Companion {
        let profiles = ProfileStore::open(SqliteBackend::open_in_memory().unwrap())
            .await
            .unwrap();
        Companion::new(
            CompanionConfig::default(),
            Arc::new(PersonaRegistry::builtin()),
            IntentRouter::heuristic_only(),
            Arc::new(profiles),
        )
        .unwrap()
    }

    fn conversation(outcome: Outcome) -> Conversation {
        match outcome {
            Outcome::Conversation(c) => c,
            Outcome::Command { reply } => panic!("unexpected command reply: {reply}"),
        }
    }

    // ── construction ─────────────────────────────────────────────────────────

    #[tokio::test]
    async fn unknown_default_persona_is_rejected() {
        let profiles = ProfileStore::open(SqliteBackend::open_in_memory().unwrap())
            .await
            .unwrap();
        let config = CompanionConfig {
            default_persona: "pirate".into(),
            ..CompanionConfig::default()
        };
        let result = Companion::new(
            config,
            Arc::new(PersonaRegistry::builtin()),
            IntentRouter::heuristic_only(),
            Arc::new(profiles),
        );
        assert!(matches!(result, Err(KindredError::PersonaNotFound(_))));
    }

    // ── pipeline ─────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn commands_preempt_classification_and_history() {
        let c = companion().await;
        let outcome = c.process("u", "/help").await.unwrap();
        assert!(matches!(outcome, Outcome::Command { ref reply } if reply.contains("/whoami")));
        assert!(c.history("u").await.is_empty());
    }

    #[tokio::test]
    async fn debugging_request_escalates_to_engineer() {
        let c = companion().await;
        let conv = conversation(
            c.process("u", "can you help me debug this function?")
                .await
                .unwrap(),
        );
        assert_eq!(conv.persona.id, "engineer");
        assert_eq!(conv.escalated_from.as_deref(), Some("companion"));
        assert_eq!(conv.intent.kind, IntentType::Help);
        assert_eq!(conv.history.len(), 1);
        assert_eq!(conv.history[0].role, Role::User);
    }

    #[tokio::test]
    async fn persona_persists_across_messages() {
        let c = companion().await;
        c.process("u", "this code won't compile").await.unwrap();
        let conv = conversation(c.process("u", "what about the next step").await.unwrap());
        assert_eq!(conv.persona.id, "engineer");
        assert!(conv.escalated_from.is_none());
    }

    #[tokio::test]
    async fn boundary_notice_is_attached() {
        let c = companion().await;
        let conv = conversation(c.process("u", "my password is hunter2").await.unwrap());
        assert!(conv.boundary_notice.unwrap().contains("credentials"));
        assert_eq!(conv.persona.id, "companion");
    }

    #[tokio::test]
    async fn profile_tracks_tone_and_rhythm() {
        let c = companion().await;
        let first = conversation(
            c.process("u", "Please kindly review this, regards.")
                .await
                .unwrap(),
        );
        assert_eq!(first.profile.preferred_tone, Tone::Formal);
        assert_eq!(first.profile.interaction_rhythm, InteractionRhythm::Steady);

        let second = conversation(c.process("u", "ok").await.unwrap());
        assert_eq!(second.profile.preferred_tone, Tone::Concise);
        assert_eq!(second.profile.interaction_rhythm, InteractionRhythm::Rapid);
    }

    #[tokio::test]
    async fn record_reply_appends_assistant_turn() {
        let c = companion().await;
        c.process("u", "tell me something nice").await.unwrap();
        assert!(c.record_reply("u", "You're doing great.").await);
        let history = c.history("u").await;
        assert_eq!(history.len(), 2);
        assert_eq!(history[1].role, Role::Assistant);
    }

    #[tokio::test]
    async fn clear_command_resets_history() {
        let c = companion().await;
        c.process("u", "hello").await.unwrap();
        c.process("u", "/forget").await.unwrap();
        assert!(c.history("u").await.is_empty());
    }

    #[tokio::test]
    async fn sessions_are_isolated() {
        let c = companion().await;
        c.process("a", "this function has a bug").await.unwrap();
        let conv = conversation(c.process("b", "good morning friend").await.unwrap());
        assert_eq!(conv.persona.id, "companion");
        assert_eq!(conv.history.len(), 1);
        assert_eq!(c.active_sessions(), 2);

        assert!(c.end_session("a"));
        assert_eq!(c.active_sessions(), 1);
    }

    #[tokio::test]
    async fn read_paths_do_not_open_sessions() {
        let c = companion().await;
        assert!(c.history("stranger").await.is_empty());
        assert!(!c.record_reply("stranger", "hello?").await);
        assert_eq!(c.active_sessions(), 0);
    }

    #[tokio::test]
    async fn history_stays_bounded_through_pipeline() {
        let c = companion().await;
        for i in 0..30 {
            let conv = conversation(c.process("u", &format!("message number {i}")).await.unwrap());
            assert!(conv.history.len() <= 20);
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn same_session_messages_are_serialised() {
        let c = Arc::new(companion().await);
        let mut handles = Vec::new();
        for i in 0..12 {
            let c = Arc::clone(&c);
            handles.push(tokio::spawn(async move {
                c.process("u", &format!("concurrent note {i}")).await
            }));
        }
        for h in handles {
            h.await.unwrap().unwrap();
        }
        assert_eq!(c.history("u").await.len(), 12);
    }
}
