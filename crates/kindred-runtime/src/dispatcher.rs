//! [`CommandDispatcher`] – the front door for explicit control commands.
//!
//! The first whitespace-delimited token of a message is matched,
//! case-insensitively, against a closed name → [`Command`] table.  Anything
//! that does not match yields `None` so the caller falls through to intent
//! classification.
//!
//! | command | tokens | reply |
//! |---------|--------|-------|
//! | [`Command::SwitchPersona`] | `/persona`, `/switch` | lists personas, or switches to the given id |
//! | [`Command::ClearMemory`]   | `/clear`, `/forget`   | empties the session history, back to the default persona |
//! | [`Command::WhoAmI`]        | `/whoami`             | name, preferred tone and rhythm |
//! | [`Command::Help`]          | `/help`               | this table |

use std::fmt::Write as _;

use kindred_memory::ProfileStore;
use kindred_types::KindredError;
use tracing::{debug, info};

use crate::intent::COMMAND_MARKER;
use crate::session::Session;

/// Every control command the dispatcher understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    SwitchPersona,
    ClearMemory,
    WhoAmI,
    Help,
}

impl Command {
    /// `(usage, summary)` shown by `/help`.
    fn help_entry(self) -> (&'static str, &'static str) {
        match self {
            Command::SwitchPersona => ("[id]", "list personas, or switch to one"),
            Command::ClearMemory => ("", "forget this conversation's history"),
            Command::WhoAmI => ("", "show what I know about you"),
            Command::Help => ("", "show this list"),
        }
    }
}

/// Name → command table.  Aliases share a variant; the first name listed for a
/// variant is the one `/help` shows.
const COMMAND_TABLE: &[(&str, Command)] = &[
    ("persona", Command::SwitchPersona),
    ("switch", Command::SwitchPersona),
    ("clear", Command::ClearMemory),
    ("forget", Command::ClearMemory),
    ("whoami", Command::WhoAmI),
    ("help", Command::Help),
];

const CLEARED_REPLY: &str = "Memory cleared. Let's start fresh.";

/// A parsed command with its optional argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation<'a> {
    pub command: Command,
    pub argument: Option<&'a str>,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct CommandDispatcher;

impl CommandDispatcher {
    pub fn new() -> Self {
        Self
    }

    /// Recognise a command in `content`.
    pub fn parse<'a>(&self, content: &'a str) -> Option<Invocation<'a>> {
        let mut tokens = content.split_whitespace();
        let name = tokens.next()?.strip_prefix(COMMAND_MARKER)?.to_lowercase();
        let command = COMMAND_TABLE
            .iter()
            .find(|(n, _)| *n == name)
            .map(|&(_, c)| c)?;
        Some(Invocation {
            command,
            argument: tokens.next(),
        })
    }

    /// Execute the command in `content` against `session`.
    ///
    /// Returns `Ok(None)` when `content` is not a known command.
    ///
    /// # Errors
    ///
    /// Only profile-store failures (from `/whoami`) are errors.
    pub async fn handle(
        &self,
        content: &str,
        user_id: &str,
        session: &mut Session,
        profiles: &ProfileStore,
    ) -> Result<Option<String>, KindredError> {
        let Some(invocation) = self.parse(content) else {
            return Ok(None);
        };
        debug!(user = %user_id, command = ?invocation.command, "command dispatched");

        let reply = match invocation.command {
            Command::SwitchPersona => switch_persona(session, invocation.argument),
            Command::ClearMemory => {
                session.history.clear();
                session.persona.reset();
                info!(user = %user_id, "session history cleared");
                CLEARED_REPLY.to_string()
            }
            Command::WhoAmI => {
                let profile = profiles.get_profile(user_id).await?;
                format!(
                    "Name: {}\nPreferred tone: {}\nInteraction rhythm: {}",
                    profile.name, profile.preferred_tone, profile.interaction_rhythm
                )
            }
            Command::Help => self.help_text(),
        };
        Ok(Some(reply))
    }

    /// The static command list, generated from the table.
    pub fn help_text(&self) -> String {
        let mut out = String::from("Commands:");
        let mut seen: Vec<Command> = Vec::new();
        for &(name, command) in COMMAND_TABLE {
            if seen.contains(&command) {
                continue;
            }
            seen.push(command);
            let aliases: Vec<String> = COMMAND_TABLE
                .iter()
                .filter(|(n, c)| *c == command && *n != name)
                .map(|(n, _)| format!("{COMMAND_MARKER}{n}"))
                .collect();
            let (usage, summary) = command.help_entry();
            let _ = write!(out, "\n  {COMMAND_MARKER}{name}");
            if !usage.is_empty() {
                let _ = write!(out, " {usage}");
            }
            let _ = write!(out, " – {summary}");
            if !aliases.is_empty() {
                let _ = write!(out, " (alias: {})", aliases.join(", "));
            }
        }
        out
    }
}

fn switch_persona(session: &mut Session, argument: Option<&str>) -> String {
    let available = session.persona.registry().ids().join(", ");
    match argument {
        None => {
            let current = session.persona.current();
            format!(
                "Current persona: {} ({}).\nAvailable: {available}",
                current.name, current.id
            )
        }
        Some(id) => {
            if session.persona.set_persona(id) {
                format!("Switched to {}.", session.persona.current().name)
            } else {
                format!("Persona '{id}' not found. Available: {available}")
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
