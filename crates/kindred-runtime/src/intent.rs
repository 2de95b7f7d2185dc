//! Intent classification – decides *what* the user wants.
//!
//! [`IntentRouter::route`] applies, in order:
//!
//! 1. **Command rule** – content starting with [`COMMAND_MARKER`] (after
//!    leading whitespace) is `{command, 1.0}`; nothing else runs.
//! 2. **Empty input** – `{chat, 0.1}`.
//! 3. **Semantic strategy** – when an [`Embedder`] is configured, the input is
//!    embedded and compared against a cached catalog of example utterances.
//!    The catalog is embedded once under its own budget; errors and timeouts
//!    fall through to step 4.
//! 4. **Heuristic strategy** – ordered keyword checks that never fail.
//!
//! # Example
//!
//! ```rust
//! # tokio_test_block(async {
//! use kindred_runtime::intent::IntentRouter;
//! use kindred_types::IntentType;
//!
//! let router = IntentRouter::heuristic_only();
//! assert_eq!(router.route("/clear").await.kind, IntentType::Command);
//! assert_eq!(router.route("remind me to stretch").await.kind, IntentType::Task);
//! # });
//! # fn tokio_test_block<F: std::future::Future>(f: F) -> F::Output {
//! #     tokio::runtime::Builder::new_current_thread().enable_time().build().unwrap().block_on(f)
//! # }
//! ```

use std::sync::Arc;
use std::time::Duration;

use kindred_types::{Intent, IntentType};
use tokio::sync::OnceCell;
use tracing::{debug, warn};

use crate::embedding::{Embedder, EmbeddingError};

/// Leading character that marks an explicit control command.
pub const COMMAND_MARKER: char = '/';

/// Budget for one semantic classification before the heuristic takes over.
pub const DEFAULT_EMBEDDING_TIMEOUT: Duration = Duration::from_secs(2);

/// Budget for the one-time catalog embedding on the first semantic route.
pub const DEFAULT_CATALOG_TIMEOUT: Duration = Duration::from_secs(30);

/// Confidence reported for empty input.
pub const EMPTY_INPUT_CONFIDENCE: f32 = 0.1;

/// Scan order of the semantic strategy.  On equal similarity the earlier type
/// wins.
pub const TIE_BREAK_ORDER: [IntentType; 4] = [
    IntentType::Task,
    IntentType::Reflection,
    IntentType::Help,
    IntentType::Chat,
];

/// Compute the cosine similarity between two equal-length vectors.
///
/// Returns a value in `[-1.0, 1.0]`, or `0.0` if either vector has zero norm.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Heuristic strategy
// ─────────────────────────────────────────────────────────────────────────────

const HELP_CUES: &[&str] = &[
    "help",
    "how do i",
    "how to",
    "explain",
    "what can you",
    "guide me",
    "tutorial",
];

const TASK_CUES: &[&str] = &[
    "remind",
    "schedule",
    "todo",
    "to-do",
    "to do list",
    "deadline",
    "set a ",
    "book a ",
    "create",
    "add ",
    "finish",
];

const REFLECTION_CUES: &[&str] = &[
    "i feel",
    "feeling",
    "i've been",
    "i have been",
    "looking back",
    "reflect",
    "grateful",
    "lately",
    "i wonder",
];

/// Keyword tiers, first match wins.
pub struct HeuristicClassifier {
    tiers: Vec<(IntentType, f32, &'static [&'static str])>,
}

impl Default for HeuristicClassifier {
    fn default() -> Self {
        Self {
            tiers: vec![
                (IntentType::Help, 0.8, HELP_CUES),
                (IntentType::Task, 0.8, TASK_CUES),
                (IntentType::Reflection, 0.7, REFLECTION_CUES),
            ],
        }
    }
}

impl HeuristicClassifier {
    /// Confidence of the fall-through `chat` result.
    pub const DEFAULT_CONFIDENCE: f32 = 0.5;

    pub fn classify(&self, content: &str) -> Intent {
        let lower = content.to_lowercase();
        self.tiers
            .iter()
            .find(|(_, _, cues)| cues.iter().any(|cue| lower.contains(cue)))
            .map(|&(kind, confidence, _)| Intent::new(kind, confidence))
            .unwrap_or_else(|| Intent::new(IntentType::Chat, Self::DEFAULT_CONFIDENCE))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Semantic strategy
// ─────────────────────────────────────────────────────────────────────────────

/// Example utterances per intent type.
pub type Catalog = Vec<(IntentType, Vec<String>)>;

type CachedCatalog = Vec<(IntentType, Vec<Vec<f32>>)>;

/// The built-in example catalog.
pub fn default_catalog() -> Catalog {
    let entry = |kind: IntentType, examples: &[&str]| -> (IntentType, Vec<String>) {
        (kind, examples.iter().map(|s| s.to_string()).collect())
    };
    vec![
        entry(
            IntentType::Task,
            &[
                "remind me to call mom tomorrow",
                "add buy milk to my todo list",
                "schedule a meeting for friday at 3pm",
                "set a timer for ten minutes",
            ],
        ),
        entry(
            IntentType::Reflection,
            &[
                "I feel like I've been drifting lately",
                "looking back, this week was rough",
                "I've been thinking about my goals",
                "today made me grateful for my friends",
            ],
        ),
        entry(
            IntentType::Help,
            &[
                "how do I use this?",
                "can you explain what you can do?",
                "I need help with something",
                "what commands are available?",
            ],
        ),
        entry(
            IntentType::Chat,
            &[
                "hey, how's it going?",
                "tell me a joke",
                "what did you do this weekend?",
                "haha that's funny",
            ],
        ),
    ]
}

/// Nearest-example classifier over an embedding space.
///
/// The catalog is embedded once, lazily, and cached for the classifier's
/// lifetime.  A failed warm-up leaves the cache empty so the next call
/// retries.
pub struct SemanticClassifier {
    embedder: Arc<dyn Embedder>,
    catalog: Catalog,
    cache: OnceCell<CachedCatalog>,
}

impl SemanticClassifier {
    pub fn new(embedder: Arc<dyn Embedder>) -> Self {
        Self::with_catalog(embedder, default_catalog())
    }

    /// Use a custom catalog.  Entries for [`IntentType::Command`] are ignored.
    pub fn with_catalog(embedder: Arc<dyn Embedder>, catalog: Catalog) -> Self {
        Self {
            embedder,
            catalog,
            cache: OnceCell::new(),
        }
    }

    /// Embed the catalog if that has not happened yet.
    pub async fn warm_up(&self) -> Result<(), EmbeddingError> {
        self.cached().await.map(|_| ())
    }

    pub fn is_warm(&self) -> bool {
        self.cache.initialized()
    }

    async fn cached(&self) -> Result<&CachedCatalog, EmbeddingError> {
        self.cache
            .get_or_try_init(|| async {
                let mut cached = CachedCatalog::with_capacity(self.catalog.len());
                let mut total = 0usize;
                for (kind, examples) in &self.catalog {
                    let mut vectors = Vec::with_capacity(examples.len());
                    for example in examples {
                        vectors.push(self.embedder.embed(example).await?);
                    }
                    total += vectors.len();
                    cached.push((*kind, vectors));
                }
                debug!(examples = total, "intent catalog embedded");
                Ok::<_, EmbeddingError>(cached)
            })
            .await
    }

    /// Classify `content` by its highest per-type cosine similarity.
    pub async fn classify(&self, content: &str) -> Result<Intent, EmbeddingError> {
        let cached = self.cached().await?;
        let query = self.embedder.embed(content).await?;

        let mut best: Option<Intent> = None;
        for kind in TIE_BREAK_ORDER {
            let type_max = cached
                .iter()
                .filter(|(k, _)| *k == kind)
                .flat_map(|(_, vectors)| vectors.iter())
                .map(|v| cosine_similarity(&query, v))
                .fold(None, |acc: Option<f32>, s| Some(acc.map_or(s, |a| a.max(s))));

            if let Some(score) = type_max
                && best.is_none_or(|b| score > b.confidence)
            {
                best = Some(Intent::new(kind, score));
            }
        }

        best.ok_or_else(|| EmbeddingError::BadResponse("intent catalog is empty".into()))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// IntentRouter
// ─────────────────────────────────────────────────────────────────────────────

/// Front door of intent classification.
pub struct IntentRouter {
    heuristic: HeuristicClassifier,
    semantic: Option<SemanticClassifier>,
    timeout: Duration,
    catalog_timeout: Duration,
}

impl IntentRouter {
    /// A router that never touches the network.
    pub fn heuristic_only() -> Self {
        Self {
            heuristic: HeuristicClassifier::default(),
            semantic: None,
            timeout: DEFAULT_EMBEDDING_TIMEOUT,
            catalog_timeout: DEFAULT_CATALOG_TIMEOUT,
        }
    }

    /// A router that prefers `embedder` and falls back to keywords.
    pub fn semantic(embedder: Arc<dyn Embedder>) -> Self {
        Self::with_classifier(SemanticClassifier::new(embedder))
    }

    pub fn with_classifier(classifier: SemanticClassifier) -> Self {
        Self {
            semantic: Some(classifier),
            ..Self::heuristic_only()
        }
    }

    /// Override the per-message embedding budget.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Override the budget for embedding the catalog on first use.
    pub fn with_catalog_timeout(mut self, timeout: Duration) -> Self {
        self.catalog_timeout = timeout;
        self
    }

    pub fn is_semantic(&self) -> bool {
        self.semantic.is_some()
    }

    /// Pay the one-time catalog embedding up front.  A no-op for a
    /// heuristic-only router.
    pub async fn warm_up(&self) -> Result<(), EmbeddingError> {
        match &self.semantic {
            Some(semantic) => semantic.warm_up().await,
            None => Ok(()),
        }
    }

    /// Classify one inbound message.  Never fails.
    pub async fn route(&self, content: &str) -> Intent {
        let trimmed = content.trim_start();
        if trimmed.starts_with(COMMAND_MARKER) {
            return Intent::command();
        }
        if trimmed.is_empty() {
            return Intent::new(IntentType::Chat, EMPTY_INPUT_CONFIDENCE);
        }

        if let Some(semantic) = &self.semantic {
            if let Some(intent) = self.route_semantic(semantic, content).await {
                debug!(intent = %intent.kind, confidence = intent.confidence, strategy = "semantic", "intent routed");
                return intent;
            }
        }

        let intent = self.heuristic.classify(content);
        debug!(intent = %intent.kind, confidence = intent.confidence, strategy = "heuristic", "intent routed");
        intent
    }

    // The per-message timeout covers only the query embedding.
    async fn route_semantic(&self, semantic: &SemanticClassifier, content: &str) -> Option<Intent> {
        if !semantic.is_warm() {
            match tokio::time::timeout(self.catalog_timeout, semantic.warm_up()).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    warn!(error = %e, "intent catalog embedding failed; using keyword heuristic");
                    return None;
                }
                Err(_) => {
                    let err = EmbeddingError::Timeout(self.catalog_timeout.as_millis() as u64);
                    warn!(error = %err, "intent catalog embedding timed out; using keyword heuristic");
                    return None;
                }
            }
        }

        match tokio::time::timeout(self.timeout, semantic.classify(content)).await {
            Ok(Ok(intent)) => Some(intent),
            Ok(Err(e)) => {
                warn!(error = %e, "semantic classification failed; using keyword heuristic");
                None
            }
            Err(_) => {
                let err = EmbeddingError::Timeout(self.timeout.as_millis() as u64);
                warn!(error = %err, "semantic classification timed out; using keyword heuristic");
                None
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
