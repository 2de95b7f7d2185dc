//! [`Session`] – the mutable per-user state of one conversation.

use std::sync::Arc;

use kindred_kernel::{PersonaMachine, PersonaRegistry};
use kindred_memory::{RetentionBuffer, RetentionPolicy};
use kindred_types::KindredError;

/// One user's persona machine and retention buffer.
///
/// Neither half is synchronised; the [`Companion`][crate::Companion] wraps each
/// session in an async mutex so messages of the same user are processed one at
/// a time.
#[derive(Debug, Clone)]
pub struct Session {
    pub persona: PersonaMachine,
    pub history: RetentionBuffer,
}

impl Session {
    /// Start a session in `default_persona` with an empty history.
    pub fn new(
        registry: Arc<PersonaRegistry>,
        default_persona: &str,
        policy: RetentionPolicy,
    ) -> Result<Self, KindredError> {
        Ok(Self {
            persona: PersonaMachine::new(registry, default_persona)?,
            history: RetentionBuffer::new(policy),
        })
    }
}
