//! `kindred-kernel` – Persona Control
//!
//! Decides *which voice* answers.  It does not classify or generate; it holds
//! the persona registry and enforces transitions and boundaries.
//!
//! # Modules
//!
//! - [`persona`] – [`Persona`][persona::Persona] and the immutable
//!   [`PersonaRegistry`][persona::PersonaRegistry] built once at startup,
//!   including the built-in `companion`, `engineer` and `coach` personas.
//! - [`rules`] – the [`Predicate`][rules::Predicate] trait with keyword and
//!   regex implementations, plus the declarative
//!   [`EscalationRule`][rules::EscalationRule] and
//!   [`Constraint`][rules::Constraint] pairs every persona carries.
//! - [`machine`] – [`PersonaMachine`][machine::PersonaMachine]: the
//!   per-session state machine exposing `set_persona`, `check_escalation` and
//!   `check_boundaries`.

pub mod machine;
pub mod persona;
pub mod rules;

pub use machine::PersonaMachine;
pub use persona::{DEFAULT_PERSONA_ID, Persona, PersonaRegistry};
pub use rules::{Constraint, EscalationRule, KeywordPredicate, PatternPredicate, Predicate};
