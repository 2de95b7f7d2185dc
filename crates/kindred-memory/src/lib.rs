//! `kindred-memory` – What the companion remembers.
//!
//! Two horizons of memory with very different lifetimes:
//!
//! # Modules
//!
//! - [`retention`] – [`RetentionBuffer`][retention::RetentionBuffer]: the
//!   short-term, per-session turn window.  Bounded, importance-weighted and
//!   never persisted.
//! - [`profile`] – [`ProfileStore`][profile::ProfileStore]: the durable
//!   per-user record of display name, tone, rhythm and off-limits topics,
//!   backed by a JSON file or a local SQLite database.
//! - [`tone`] – pure detectors that infer a [`Tone`][kindred_types::Tone] from
//!   message text and an
//!   [`InteractionRhythm`][kindred_types::InteractionRhythm] from the gap
//!   between visits.

pub mod profile;
pub mod retention;
pub mod tone;

pub use profile::{JsonFileBackend, ProfileBackend, ProfileError, ProfileStore, SqliteBackend};
pub use retention::{RetentionBuffer, RetentionPolicy};
