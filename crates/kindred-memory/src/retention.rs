//! Conversation Retention Buffer.
//!
//! Keeps an ordered, bounded window of recent [`Turn`]s for a single session.
//! Eviction is soft and importance-weighted rather than strict LRU: once the
//! buffer grows past [`RetentionPolicy::max_history`], every turn outside the
//! protected tail is scored and only the ones above the decay threshold
//! survive.
//!
//! ## Model
//!
//! For the candidate at position `i` (0 = oldest) of a buffer holding `n`
//! turns before the prune:
//!
//! ```text
//! age        = n − 1 − i
//! recency    = max(0, 1 − age × age_decay)
//! importance = 0.9 reflection | 0.8 task, help | 0.5 otherwise
//! score      = recency × recency_weight + importance × importance_weight
//! ```
//!
//! Candidates with `score > decay_threshold` are kept in their original order,
//! followed by the `protected_count` most recent turns.  If the result is
//! still longer than `max_history`, only the most recent `max_history` turns
//! are kept.
//!
//! # Example
//!
//! ```rust
//! use kindred_memory::retention::RetentionBuffer;
//! use kindred_types::{IntentType, Turn};
//!
//! let mut buffer = RetentionBuffer::default();
//! for i in 0..25 {
//!     buffer.add_turn(Turn::user(format!("message {i}"), IntentType::Chat));
//!     assert!(buffer.len() <= 20);
//! }
//! // The newest turn is always retained.
//! assert_eq!(buffer.history().last().unwrap().content, "message 24");
//! ```

use kindred_types::{IntentType, Turn};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Buffer length that triggers a prune.
pub const MAX_HISTORY_SIZE: usize = 20;
/// Number of most recent turns that are never evicted by scoring.
pub const PROTECTED_COUNT: usize = 5;

// ─────────────────────────────────────────────────────────────────────────────
// RetentionPolicy
// ─────────────────────────────────────────────────────────────────────────────

/// Tunable constants of the eviction score.
///
/// The defaults reproduce the reference behaviour and should only be changed
/// deliberately.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetentionPolicy {
    pub max_history: usize,
    pub protected_count: usize,
    /// Recency lost per turn of age.
    pub age_decay: f64,
    pub recency_weight: f64,
    pub importance_weight: f64,
    /// Candidates must score strictly above this to survive.
    pub decay_threshold: f64,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            max_history: MAX_HISTORY_SIZE,
            protected_count: PROTECTED_COUNT,
            age_decay: 0.05,
            recency_weight: 0.6,
            importance_weight: 0.4,
            decay_threshold: 0.3,
        }
    }
}

impl RetentionPolicy {
    /// Base salience of a turn, derived from its intent.
    pub fn importance(&self, intent: IntentType) -> f64 {
        // Sentiment-based boosting is reserved and not applied.
        match intent {
            IntentType::Reflection => 0.9,
            IntentType::Task | IntentType::Help => 0.8,
            _ => 0.5,
        }
    }

    /// `max(0, 1 − age × age_decay)`.
    pub fn recency(&self, age: usize) -> f64 {
        (1.0 - age as f64 * self.age_decay).max(0.0)
    }

    /// Retention score of a turn `age` positions away from the newest one.
    pub fn score(&self, age: usize, intent: IntentType) -> f64 {
        self.recency(age) * self.recency_weight + self.importance(intent) * self.importance_weight
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// RetentionBuffer
// ─────────────────────────────────────────────────────────────────────────────

/// Bounded, ordered turn history for one session.
///
/// Not synchronised; callers serialise mutation per session.
#[derive(Debug, Clone, Default)]
pub struct RetentionBuffer {
    policy: RetentionPolicy,
    turns: Vec<Turn>,
}

impl RetentionBuffer {
    pub fn new(policy: RetentionPolicy) -> Self {
        Self {
            policy,
            turns: Vec::with_capacity(MAX_HISTORY_SIZE + 1),
        }
    }

    pub fn policy(&self) -> &RetentionPolicy {
        &self.policy
    }

    /// Append `turn` and prune if the buffer exceeds `max_history`.
    pub fn add_turn(&mut self, turn: Turn) {
        self.turns.push(turn);
        if self.turns.len() > self.policy.max_history {
            self.prune();
        }
    }

    /// Ordered copy of the retained turns (oldest first).
    pub fn history(&self) -> Vec<Turn> {
        self.turns.clone()
    }

    /// Drop every retained turn.
    pub fn clear(&mut self) {
        self.turns.clear();
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    fn prune(&mut self) {
        let before = self.turns.len();
        let protected_start = before.saturating_sub(self.policy.protected_count);

        let mut kept: Vec<Turn> = Vec::with_capacity(before);
        for (i, turn) in self.turns.drain(..).enumerate() {
            if i >= protected_start {
                kept.push(turn);
                continue;
            }
            let age = before - 1 - i;
            if self.policy.score(age, turn.intent) > self.policy.decay_threshold {
                kept.push(turn);
            }
        }

        // Safety net: keep the right-most `max_history` turns.
        if kept.len() > self.policy.max_history {
            let excess = kept.len() - self.policy.max_history;
            kept.drain(..excess);
        }

        debug!(before, after = kept.len(), "retention buffer pruned");
        self.turns = kept;
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn turn(i: usize, intent: IntentType) -> Turn {
        Turn::user(format!("turn {i}"), intent)
    }

    fn alternating(i: usize) -> IntentType {
        if i % 2 == 0 { IntentType::Chat } else { IntentType::Task }
    }

    // ── scoring ──────────────────────────────────────────────────────────────

    #[test]
    fn recency_decays_linearly_to_zero() {
        let p = RetentionPolicy::default();
        assert!((p.recency(0) - 1.0).abs() < 1e-9);
        assert!((p.recency(10) - 0.5).abs() < 1e-9);
        assert!(p.recency(20).abs() < 1e-9);
        assert_eq!(p.recency(35), 0.0);
    }

    #[test]
    fn importance_by_intent() {
        let p = RetentionPolicy::default();
        assert_eq!(p.importance(IntentType::Chat), 0.5);
        assert_eq!(p.importance(IntentType::Task), 0.8);
        assert_eq!(p.importance(IntentType::Help), 0.8);
        assert_eq!(p.importance(IntentType::Reflection), 0.9);
        assert_eq!(p.importance(IntentType::Command), 0.5);
    }

    #[test]
    fn score_combines_weights() {
        let p = RetentionPolicy::default();
        // recency 0.5 * 0.6 + 0.5 * 0.4 = 0.5
        assert!((p.score(10, IntentType::Chat) - 0.5).abs() < 1e-9);
        // fully decayed task still scores 0.32
        assert!((p.score(20, IntentType::Task) - 0.32).abs() < 1e-9);
    }

    // ── add_turn / prune ─────────────────────────────────────────────────────

    #[test]
    fn no_prune_at_or_below_capacity() {
        let mut buf = RetentionBuffer::default();
        for i in 0..20 {
            buf.add_turn(turn(i, IntentType::Chat));
        }
        assert_eq!(buf.len(), 20);
        assert_eq!(buf.history()[0].content, "turn 0");
    }

    #[test]
    fn alternating_chat_task_stays_bounded() {
        let mut buf = RetentionBuffer::default();
        for i in 0..25 {
            buf.add_turn(turn(i, alternating(i)));
            assert!(buf.len() <= 20, "length {} after turn {i}", buf.len());
        }
    }

    #[test]
    fn twenty_first_turn_evicts_oldest_chat_turns() {
        let mut buf = RetentionBuffer::default();
        for i in 0..21 {
            buf.add_turn(turn(i, alternating(i)));
        }
        // Chat turns at age 20 and 18 fall below the threshold; tasks survive.
        let contents: Vec<String> = buf.history().into_iter().map(|t| t.content).collect();
        assert_eq!(contents.len(), 19);
        assert!(!contents.contains(&"turn 0".to_string()));
        assert!(!contents.contains(&"turn 2".to_string()));
        assert!(contents.contains(&"turn 1".to_string()));
        assert!(contents.contains(&"turn 4".to_string()));
    }

    #[test]
    fn last_five_turns_always_survive() {
        let mut buf = RetentionBuffer::default();
        for i in 0..60 {
            buf.add_turn(turn(i, IntentType::Chat));
            let history = buf.history();
            let tail: Vec<&str> = history
                .iter()
                .rev()
                .take(5usize.min(i + 1))
                .map(|t| t.content.as_str())
                .collect();
            let expected: Vec<String> = (0..5usize.min(i + 1)).map(|k| format!("turn {}", i - k)).collect();
            assert_eq!(tail, expected.iter().map(String::as_str).collect::<Vec<_>>());
        }
    }

    #[test]
    fn survivors_keep_original_order() {
        let mut buf = RetentionBuffer::default();
        for i in 0..30 {
            let intent = if i % 3 == 0 { IntentType::Reflection } else { IntentType::Chat };
            buf.add_turn(turn(i, intent));
        }
        let order: Vec<usize> = buf
            .history()
            .iter()
            .map(|t| t.content.trim_start_matches("turn ").parse().unwrap())
            .collect();
        let mut sorted = order.clone();
        sorted.sort_unstable();
        assert_eq!(order, sorted);
    }

    #[test]
    fn safety_net_truncates_to_most_recent() {
        // With a negative threshold every candidate survives, so the hard cap
        // must kick in.
        let policy = RetentionPolicy {
            decay_threshold: -1.0,
            ..RetentionPolicy::default()
        };
        let mut buf = RetentionBuffer::new(policy);
        for i in 0..21 {
            buf.add_turn(turn(i, IntentType::Chat));
        }
        let history = buf.history();
        assert_eq!(history.len(), 20);
        assert_eq!(history[0].content, "turn 1");
        assert_eq!(history[19].content, "turn 20");
    }

    #[test]
    fn custom_policy_respected() {
        let policy = RetentionPolicy {
            max_history: 6,
            protected_count: 2,
            ..RetentionPolicy::default()
        };
        let mut buf = RetentionBuffer::new(policy);
        for i in 0..40 {
            buf.add_turn(turn(i, IntentType::Task));
            assert!(buf.len() <= 6);
        }
    }

    // ── history / clear ──────────────────────────────────────────────────────

    #[test]
    fn history_is_idempotent() {
        let mut buf = RetentionBuffer::default();
        for i in 0..7 {
            buf.add_turn(turn(i, IntentType::Help));
        }
        assert_eq!(buf.history(), buf.history());
    }

    #[test]
    fn history_is_a_copy() {
        let mut buf = RetentionBuffer::default();
        buf.add_turn(turn(0, IntentType::Chat));
        let mut snapshot = buf.history();
        snapshot.clear();
        assert_eq!(buf.len(), 1);
    }

    #[test]
    fn clear_empties_buffer() {
        let mut buf = RetentionBuffer::default();
        buf.add_turn(turn(0, IntentType::Chat));
        buf.clear();
        assert!(buf.is_empty());
        assert!(buf.history().is_empty());
    }
}
