//! [`PersonaMachine`] – per-session persona state machine.
//!
//! The states are the personas of a shared [`PersonaRegistry`]; the machine
//! only stores the id of the active one, so exactly one persona is active at
//! any time.  There are two ways to move between states:
//!
//! 1. an explicit [`set_persona`][PersonaMachine::set_persona] call, which
//!    only succeeds for ids present in the registry, and
//! 2. an escalation reported by
//!    [`check_escalation`][PersonaMachine::check_escalation] that the caller
//!    then applies with `set_persona`.
//!
//! The machine has no terminal state; it lives as long as the session.

use std::sync::Arc;

use kindred_types::KindredError;
use tracing::{debug, info};

use crate::persona::{Persona, PersonaRegistry};

/// Holds the active persona for one conversation session.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use kindred_kernel::{PersonaMachine, PersonaRegistry};
///
/// let registry = Arc::new(PersonaRegistry::builtin());
/// let mut machine = PersonaMachine::new(registry, "companion").unwrap();
///
/// let target = machine.check_escalation("can you help me debug this function?");
/// assert_eq!(target.as_deref(), Some("engineer"));
///
/// assert!(machine.set_persona("engineer"));
/// assert!(!machine.set_persona("nonexistent"));
/// assert_eq!(machine.current().id, "engineer");
/// ```
#[derive(Debug, Clone)]
pub struct PersonaMachine {
    registry: Arc<PersonaRegistry>,
    default: Arc<Persona>,
    current: Arc<Persona>,
}

impl PersonaMachine {
    /// Start a machine in the `default_id` persona.
    ///
    /// # Errors
    ///
    /// Returns [`KindredError::PersonaNotFound`] when `default_id` is not in
    /// the registry.
    pub fn new(registry: Arc<PersonaRegistry>, default_id: &str) -> Result<Self, KindredError> {
        let default = registry
            .get(default_id)
            .cloned()
            .ok_or_else(|| KindredError::PersonaNotFound(default_id.to_string()))?;
        Ok(Self {
            registry,
            current: Arc::clone(&default),
            default,
        })
    }

    /// The active persona.
    pub fn current(&self) -> &Persona {
        &self.current
    }

    /// Shared handle to the active persona, for handing to collaborators.
    pub fn current_arc(&self) -> Arc<Persona> {
        Arc::clone(&self.current)
    }

    pub fn registry(&self) -> &PersonaRegistry {
        &self.registry
    }

    /// Switch to persona `id`.
    ///
    /// Returns `false` and leaves the state unchanged when `id` is unknown.
    #[must_use]
    pub fn set_persona(&mut self, id: &str) -> bool {
        match self.registry.get(id) {
            Some(persona) => {
                if persona.id != self.current.id {
                    info!(from = %self.current.id, to = %persona.id, "persona transition");
                }
                self.current = Arc::clone(persona);
                true
            }
            None => {
                debug!(persona = %id, "set_persona rejected unknown id");
                false
            }
        }
    }

    /// Return to the configured default persona.
    pub fn reset(&mut self) {
        if self.current.id != self.default.id {
            debug!(from = %self.current.id, to = %self.default.id, "persona reset");
        }
        self.current = Arc::clone(&self.default);
    }

    /// Scan the active persona's escalation rules in order and return the
    /// target of the first rule whose predicate matches `content`.
    ///
    /// Rules pointing at the active persona itself are skipped.
    pub fn check_escalation(&self, content: &str) -> Option<String> {
        self.current
            .escalation_rules
            .iter()
            .filter(|rule| rule.target != self.current.id)
            .find(|rule| rule.predicate.matches(content))
            .map(|rule| {
                debug!(
                    persona = %self.current.id,
                    target = %rule.target,
                    rule = rule.predicate.describe(),
                    "escalation rule matched"
                );
                rule.target.clone()
            })
    }

    /// Evaluate the active persona's constraints in order and return the
    /// notice of the first one `content` violates.
    pub fn check_boundaries(&self, content: &str) -> Option<String> {
        self.current
            .constraints
            .iter()
            .find(|c| c.predicate.matches(content))
            .map(|c| {
                debug!(
                    persona = %self.current.id,
                    constraint = c.predicate.describe(),
                    "boundary constraint matched"
                );
                c.notice.clone()
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::KeywordPredicate;

    fn builtin_machine() -> PersonaMachine {
        PersonaMachine::new(Arc::new(PersonaRegistry::builtin()), "companion").unwrap()
    }

    // ------------------------------------------------------------------ construction

    #[test]
    fn starts_in_default_persona() {
        let m = builtin_machine();
        assert_eq!(m.current().id, "companion");
    }

    #[test]
    fn unknown_default_is_an_error() {
        let err = PersonaMachine::new(Arc::new(PersonaRegistry::builtin()), "pirate").unwrap_err();
        assert!(matches!(err, KindredError::PersonaNotFound(id) if id == "pirate"));
    }

    // ------------------------------------------------------------------ set_persona

    #[test]
    fn set_unknown_persona_returns_false_and_keeps_state() {
        let mut m = builtin_machine();
        assert!(!m.set_persona("nonexistent"));
        assert_eq!(m.current().id, "companion");
    }

    #[test]
    fn set_known_persona_transitions() {
        let mut m = builtin_machine();
        assert!(m.set_persona("coach"));
        assert_eq!(m.current().id, "coach");
        assert_eq!(m.current_arc().name, "Coach");
    }

    #[test]
    fn reset_returns_to_default() {
        let mut m = builtin_machine();
        assert!(m.set_persona("engineer"));
        m.reset();
        assert_eq!(m.current().id, "companion");
    }

    // ------------------------------------------------------------------ check_escalation

    #[test]
    fn companion_escalates_debugging_to_engineer() {
        let m = builtin_machine();
        assert_eq!(
            m.check_escalation("can you help me debug this function?"),
            Some("engineer".to_string())
        );
    }

    #[test]
    fn companion_escalates_feelings_to_coach() {
        let m = builtin_machine();
        assert_eq!(
            m.check_escalation("I feel really overwhelmed lately"),
            Some("coach".to_string())
        );
    }

    #[test]
    fn plain_chat_does_not_escalate() {
        let m = builtin_machine();
        assert_eq!(m.check_escalation("what a lovely morning"), None);
    }

    #[test]
    fn keywords_inside_longer_words_do_not_escalate() {
        let m = builtin_machine();
        assert_eq!(m.check_escalation("the ambassador led a crusade"), None);
        assert_eq!(
            m.check_escalation("I keep getting an error on startup"),
            Some("engineer".to_string())
        );
    }

    #[test]
    fn escalation_uses_current_persona_rules() {
        let mut m = builtin_machine();
        assert!(m.set_persona("engineer"));
        // Technical talk keeps the engineer; only leaving cues escalate.
        assert_eq!(m.check_escalation("this function has a bug"), None);
        assert_eq!(
            m.check_escalation("ok let's just chat for a bit"),
            Some("companion".to_string())
        );
    }

    #[test]
    fn first_matching_rule_wins() {
        let registry = PersonaRegistry::new(vec![
            crate::Persona::new("a", "A")
                .escalate_to("b", KeywordPredicate::new("x", ["x"]))
                .escalate_to("c", KeywordPredicate::new("x again", ["x"])),
            crate::Persona::new("b", "B"),
            crate::Persona::new("c", "C"),
        ]);
        let m = PersonaMachine::new(Arc::new(registry), "a").unwrap();
        assert_eq!(m.check_escalation("x marks the spot"), Some("b".into()));
    }

    #[test]
    fn self_targeting_rule_is_skipped() {
        let registry = PersonaRegistry::new(vec![
            crate::Persona::new("a", "A")
                .escalate_to("a", KeywordPredicate::new("loop", ["hello"]))
                .escalate_to("b", KeywordPredicate::new("hello", ["hello"])),
            crate::Persona::new("b", "B"),
        ]);
        let m = PersonaMachine::new(Arc::new(registry), "a").unwrap();
        assert_eq!(m.check_escalation("hello"), Some("b".into()));
    }

    // ------------------------------------------------------------------ check_boundaries

    #[test]
    fn boundary_returns_notice() {
        let m = builtin_machine();
        let notice = m.check_boundaries("here is my password: hunter2").unwrap();
        assert!(notice.contains("credentials"));
    }

    #[test]
    fn no_boundary_for_harmless_message() {
        let m = builtin_machine();
        assert!(m.check_boundaries("tell me a joke").is_none());
    }

    #[test]
    fn boundaries_follow_active_persona() {
        let mut m = builtin_machine();
        assert!(m.check_boundaries("what dosage should I take?").is_none());
        assert!(m.set_persona("coach"));
        assert!(m.check_boundaries("what dosage should I take?").is_some());
    }
}
