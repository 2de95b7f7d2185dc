//! `kindred-runtime` – The Conversational Cognition Core
//!
//! Wires the persona kernel and the memory layer into the per-message
//! pipeline that runs before response generation.
//!
//! # Modules
//!
//! - [`companion`] – [`Companion`][companion::Companion]: the façade that
//!   drives dispatch → classification → persona → retention → profile for
//!   every inbound message, serialising messages per session.
//! - [`intent`] – [`IntentRouter`][intent::IntentRouter]: command rule,
//!   nearest-example semantic classification over an
//!   [`Embedder`][embedding::Embedder], and a keyword heuristic that takes
//!   over whenever embedding fails or times out.
//! - [`dispatcher`] – [`CommandDispatcher`][dispatcher::CommandDispatcher]:
//!   the closed `/persona`, `/clear`, `/whoami`, `/help` command table.
//! - [`embedding`] – the [`Embedder`][embedding::Embedder] adapter trait and
//!   [`OllamaEmbedder`][embedding::OllamaEmbedder], a client for a local
//!   [Ollama](https://ollama.com) server.
//! - [`session`] – [`Session`][session::Session]: one user's persona machine
//!   and retention buffer.
//! - [`telemetry`] – [`init_tracing`][telemetry::init_tracing]:
//!   initialises the global `tracing` subscriber with an optional OTLP span
//!   exporter.  Set `OTEL_EXPORTER_OTLP_ENDPOINT` to enable live trace export
//!   to Jaeger, Grafana Tempo, or any OTLP-compatible collector.

pub mod companion;
pub mod dispatcher;
pub mod embedding;
pub mod intent;
pub mod session;
pub mod telemetry;

pub use companion::{Companion, CompanionConfig, Conversation, Outcome};
pub use dispatcher::{Command, CommandDispatcher};
pub use embedding::{Embedder, EmbeddingError, OllamaEmbedder};
pub use intent::{HeuristicClassifier, IntentRouter, SemanticClassifier};
pub use session::Session;
pub use telemetry::{TracerProviderGuard, init_tracing};
