//! REPL – Read-Eval-Print Loop for the Kindred chat harness.
//!
//! Every line is handed to [`Companion::process`].  Command replies are
//! printed as-is; conversational messages print the context that response
//! generation would receive.  `/quit` and `/exit` are handled here and never
//! reach the companion.

use colored::Colorize;
use std::io::Write;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::Notify;

use kindred_runtime::{Companion, Conversation, Outcome};

/// Entry point for the interactive REPL.
///
/// Returns on EOF, `/quit`, `/exit`, or when `shutdown` is notified.
pub async fn run(companion: &Companion, user_id: &str, shutdown: Arc<Notify>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        print!("{} ", "you>".bold().cyan());
        std::io::stdout().flush().ok();

        let line = tokio::select! {
            _ = shutdown.notified() => break,
            read = lines.next_line() => match read {
                Ok(Some(line)) => line,
                Ok(None) => break, // EOF
                Err(e) => {
                    eprintln!("{}: {}", "Read error".red(), e);
                    break;
                }
            },
        };

        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        if is_quit(input) {
            println!("{}", "Goodbye.".green());
            break;
        }

        match companion.process(user_id, input).await {
            Ok(Outcome::Command { reply }) => {
                for l in reply.lines() {
                    println!("  {}", l);
                }
            }
            Ok(Outcome::Conversation(conversation)) => print_conversation(&conversation),
            Err(e) => println!("{}: {}", "Error".red(), e),
        }
    }
}

fn is_quit(input: &str) -> bool {
    matches!(input.to_lowercase().as_str(), "/quit" | "/exit")
}

fn print_conversation(c: &Conversation) {
    let persona = match &c.escalated_from {
        Some(from) => format!("{} (escalated from {})", c.persona.name, from),
        None => c.persona.name.clone(),
    };
    println!(
        "  {} {} {:.2}  {} {}",
        "intent".dimmed(),
        c.intent.kind.to_string().yellow(),
        c.intent.confidence,
        "persona".dimmed(),
        persona.bold()
    );
    if let Some(notice) = &c.boundary_notice {
        println!("  {} {}", "⚠".yellow().bold(), notice.yellow());
    }
    println!(
        "  {} {} turns  {} {}  {} {}",
        "history".dimmed(),
        c.history.len(),
        "tone".dimmed(),
        c.profile.preferred_tone,
        "rhythm".dimmed(),
        c.profile.interaction_rhythm
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quit_aliases_are_case_insensitive() {
        assert!(is_quit("/quit"));
        assert!(is_quit("/EXIT"));
        assert!(!is_quit("/clear"));
        assert!(!is_quit("quit"));
    }
}
