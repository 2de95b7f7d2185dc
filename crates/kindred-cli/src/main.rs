//! `kindred-cli` – Kindred Command Line Interface
//!
//! This binary is a local chat harness around the conversational cognition
//! core.  It:
//!
//! 1. Checks for `~/.kindred/config.toml`; runs a **First-Run Wizard** when the
//!    file is absent.
//! 2. Opens the user profile store and, when configured, warms up semantic
//!    intent routing against a local Ollama instance.
//! 3. Drops the user into an **interactive REPL** that shows, for every
//!    message, the routed intent, the answering persona, boundary notices and
//!    the adapted user profile.
//! 4. Intercepts **Ctrl-C** to leave the REPL cleanly.

mod config;
mod repl;

use colored::Colorize;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tracing::{info, warn};

use kindred_kernel::PersonaRegistry;
use kindred_memory::{JsonFileBackend, ProfileStore, SqliteBackend};
use kindred_runtime::{Companion, CompanionConfig, IntentRouter, OllamaEmbedder};
use kindred_types::KindredError;

use crate::config::{Config, EmbedderKind, ProfileBackendKind};

/// Upper bound for the one-time catalog embedding at startup.
const WARM_UP_BUDGET: Duration = Duration::from_secs(30);

fn main() -> ExitCode {
    // Hold the guard until exit so pending spans are flushed.
    let _telemetry = kindred_runtime::init_tracing("kindred");

    print_banner();

    // ── Ctrl-C handler ────────────────────────────────────────────────────
    let shutdown = Arc::new(Notify::new());
    let shutdown_signal = Arc::clone(&shutdown);
    if let Err(e) = ctrlc::set_handler(move || {
        println!();
        println!("{}", "⚠  Ctrl-C received – leaving Kindred …".yellow().bold());
        shutdown_signal.notify_one();
    }) {
        warn!(error = %e, "Failed to install Ctrl-C handler; use /quit to exit");
    }

    // ── Configuration ─────────────────────────────────────────────────────
    let cfg = match config::load() {
        Ok(Some(cfg)) => {
            println!(
                "  Config loaded from {}",
                config::config_path().display().to_string().bold()
            );
            cfg
        }
        Ok(None) => {
            let mut cfg = run_first_run_wizard();
            config::apply_env_overrides(&mut cfg);
            cfg
        }
        Err(e) => {
            println!("{}: {}", "Config error".red(), e);
            println!("  Using default configuration.");
            let mut cfg = Config::default();
            config::apply_env_overrides(&mut cfg);
            cfg
        }
    };

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("{}: {}", "Failed to start async runtime".red(), e);
            return ExitCode::FAILURE;
        }
    };

    runtime.block_on(async move {
        let companion = match build_companion(&cfg).await {
            Ok(c) => c,
            Err(e) => {
                eprintln!("{}: {}", "Startup failed".red().bold(), e);
                return ExitCode::FAILURE;
            }
        };

        println!();
        println!(
            "  Chatting as {}. Type {} for commands, {} to leave.\n",
            cfg.user_id.bold(),
            "/help".bold().cyan(),
            "/quit".bold().cyan()
        );

        repl::run(&companion, &cfg.user_id, shutdown).await;
        ExitCode::SUCCESS
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// Startup
// ─────────────────────────────────────────────────────────────────────────────

async fn build_companion(cfg: &Config) -> Result<Companion, KindredError> {
    let registry = Arc::new(PersonaRegistry::builtin());

    let profile_path = cfg.resolved_profile_path();
    let profiles = match cfg.profile_backend {
        ProfileBackendKind::Json => ProfileStore::open(JsonFileBackend::new(&profile_path)).await?,
        ProfileBackendKind::Sqlite => {
            ProfileStore::open(SqliteBackend::open(&profile_path)?).await?
        }
    };
    println!(
        "  Profiles       : {} ({})",
        profile_path.display().to_string().bold(),
        cfg.profile_backend
    );

    let router = match cfg.embedder {
        EmbedderKind::None => IntentRouter::heuristic_only(),
        EmbedderKind::Ollama => {
            let embedder = Arc::new(OllamaEmbedder::new(&cfg.ollama_url, &cfg.embedding_model));
            IntentRouter::semantic(embedder)
                .with_timeout(Duration::from_millis(cfg.embedding_timeout_ms))
                .with_catalog_timeout(WARM_UP_BUDGET)
        }
    };

    if router.is_semantic() {
        print!(
            "  Intent routing : warming up {} at {} … ",
            cfg.embedding_model.bold(),
            cfg.ollama_url.dimmed()
        );
        use std::io::Write;
        std::io::stdout().flush().ok();
        match tokio::time::timeout(WARM_UP_BUDGET, router.warm_up()).await {
            Ok(Ok(())) => println!("{}", "semantic".green()),
            Ok(Err(e)) => {
                println!("{}", "offline".yellow());
                println!("  {}", e.to_string().dimmed());
                println!("  Falling back to keywords until the embedder answers.");
            }
            Err(_) => {
                println!("{}", "timed out".yellow());
                println!("  Falling back to keywords until the embedder answers.");
            }
        }
    } else {
        println!("  Intent routing : {}", "keywords".cyan());
    }

    let companion = Companion::new(
        CompanionConfig {
            default_persona: cfg.default_persona.clone(),
            retention: cfg.retention.clone(),
        },
        registry,
        router,
        Arc::new(profiles),
    )?;
    info!(
        persona = %cfg.default_persona,
        embedder = %cfg.embedder,
        backend = %cfg.profile_backend,
        "companion ready"
    );
    Ok(companion)
}

// ─────────────────────────────────────────────────────────────────────────────
// First-Run Wizard
// ─────────────────────────────────────────────────────────────────────────────

fn run_first_run_wizard() -> Config {
    println!();
    println!("{}", "  ╔══════════════════════════════════════╗".bold().cyan());
    println!("{}", "  ║       Kindred First-Run Wizard       ║".bold().cyan());
    println!("{}", "  ╚══════════════════════════════════════╝".bold().cyan());
    println!();
    println!("  No configuration found.  Let's set up Kindred.\n");

    let mut cfg = Config::default();

    cfg.user_id = prompt_line(&format!("  Your name or handle [{}]: ", cfg.user_id), &cfg.user_id);

    let registry = PersonaRegistry::builtin();
    println!("  Starting persona ({}):", registry.ids().join(" / "));
    let persona = prompt_line(
        &format!("  Enter persona [{}]: ", cfg.default_persona),
        &cfg.default_persona,
    );
    if registry.contains(&persona) {
        cfg.default_persona = persona;
    } else {
        println!("  Unknown persona '{}'; keeping {}.", persona.yellow(), cfg.default_persona);
    }

    println!("  How should Kindred classify intent?");
    println!("    1) Keywords only  (default, offline)");
    println!("    2) Semantic, via a local Ollama embedding model");
    if prompt_line("  Enter choice [1]: ", "1") == "2" {
        cfg.embedder = EmbedderKind::Ollama;
        cfg.ollama_url = prompt_line(&format!("  Ollama URL [{}]: ", cfg.ollama_url), &cfg.ollama_url);
        cfg.embedding_model = prompt_line(
            &format!("  Embedding model [{}]: ", cfg.embedding_model),
            &cfg.embedding_model,
        );
    }

    println!("  Where should profiles be stored?");
    println!("    1) JSON file  (default)");
    println!("    2) SQLite database");
    if prompt_line("  Enter choice [1]: ", "1") == "2" {
        cfg.profile_backend = ProfileBackendKind::Sqlite;
    }

    match config::save(&cfg) {
        Ok(()) => println!(
            "\n  {} Config saved to {}\n",
            "✓".green().bold(),
            config::config_path().display().to_string().bold()
        ),
        Err(e) => println!("{}: {}", "Error saving config".red(), e),
    }
    cfg
}

// ─────────────────────────────────────────────────────────────────────────────
// Banner
// ─────────────────────────────────────────────────────────────────────────────

fn print_banner() {
    println!();
    println!("{}", r#"   __ __ _         __            __"#.bold().cyan());
    println!("{}", r#"  / //_/(_)__  ___/ /______ ___/ /"#.bold().cyan());
    println!("{}", r#" / ,<  / / _ \/ _  / __/ -_) _  / "#.bold().cyan());
    println!("{}", r#"/_/|_|/_/_//_/\_,_/_/  \__/\_,_/  "#.bold().cyan());
    println!();
    println!(
        "  {} {}",
        "Kindred".bold(),
        format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
    );
    println!("  Conversational cognition core");
    println!();
}

// ─────────────────────────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────────────────────────

fn prompt_line(msg: &str, default: &str) -> String {
    use std::io::{BufRead, Write};
    print!("{}", msg);
    std::io::stdout().flush().ok();
    let mut line = String::new();
    match std::io::stdin().lock().read_line(&mut line) {
        Ok(_) => {
            let t = line.trim().to_string();
            if t.is_empty() { default.to_string() } else { t }
        }
        Err(_) => default.to_string(),
    }
}
