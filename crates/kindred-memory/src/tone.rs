//! Pure tone and rhythm detectors feeding the user profile.

use chrono::{DateTime, Duration, Utc};
use kindred_types::{InteractionRhythm, Tone};
use once_cell::sync::Lazy;
use regex::Regex;

/// Messages shorter than this many characters read as concise.
pub const CONCISE_MAX_CHARS: usize = 20;

// Both patterns are constant; `None` only if they fail to compile, in which
// case the check never matches.
static POLITENESS: Lazy<Option<Regex>> = Lazy::new(|| {
    Regex::new(r"(?i)\b(please|kindly|regards|sincerely|thank you|dear)\b").ok()
});

static EMOJI: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"[\p{Extended_Pictographic}\p{Regional_Indicator}]").ok());

fn hit(pattern: &Lazy<Option<Regex>>, content: &str) -> bool {
    pattern.as_ref().is_some_and(|re| re.is_match(content))
}

/// Classify the register of a single message.
///
/// Checks run in order: politeness markers → [`Tone::Formal`], any emoji →
/// [`Tone::Playful`], fewer than [`CONCISE_MAX_CHARS`] characters →
/// [`Tone::Concise`], otherwise [`Tone::Casual`].
///
/// ```
/// use kindred_memory::tone::detect_tone;
/// use kindred_types::Tone;
///
/// assert_eq!(detect_tone("Please kindly review this, regards."), Tone::Formal);
/// assert_eq!(detect_tone("ok"), Tone::Concise);
/// ```
pub fn detect_tone(content: &str) -> Tone {
    if hit(&POLITENESS, content) {
        Tone::Formal
    } else if hit(&EMOJI, content) {
        Tone::Playful
    } else if content.chars().count() < CONCISE_MAX_CHARS {
        Tone::Concise
    } else {
        Tone::Casual
    }
}

/// Classify how quickly the user came back since `previous`.
pub fn detect_rhythm(previous: DateTime<Utc>, now: DateTime<Utc>) -> InteractionRhythm {
    let gap = now - previous;
    if gap < Duration::minutes(2) {
        InteractionRhythm::Rapid
    } else if gap < Duration::days(3) {
        InteractionRhythm::Steady
    } else {
        InteractionRhythm::Sporadic
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn politeness_markers_are_formal() {
        assert_eq!(detect_tone("Please kindly review this, regards."), Tone::Formal);
        assert_eq!(detect_tone("Thank you for the update"), Tone::Formal);
    }

    #[test]
    fn politeness_needs_word_boundary() {
        // "pleased" is not the marker "please".
        assert_eq!(
            detect_tone("I was pleased with how the weekend went overall"),
            Tone::Casual
        );
    }

    #[test]
    fn emoji_is_playful() {
        assert_eq!(detect_tone("😂😂 lol"), Tone::Playful);
        assert_eq!(detect_tone("the launch went great today, see you ☀ tomorrow"), Tone::Playful);
    }

    #[test]
    fn patterns_compile() {
        assert!(POLITENESS.is_some());
        assert!(EMOJI.is_some());
    }

    #[test]
    fn emoji_outside_the_pictographic_planes_is_playful() {
        assert_eq!(
            detect_tone("great work today team, see you all tomorrow ⭐"),
            Tone::Playful
        );
        assert_eq!(detect_tone("running late again, check your ⌚ please"), Tone::Formal);
        assert_eq!(detect_tone("running late again, check your ⌚ friend"), Tone::Playful);
        assert_eq!(detect_tone("alarm went off at six ⏰ no coffee yet"), Tone::Playful);
        assert_eq!(detect_tone("mahjong night was a blast 🀄 honestly"), Tone::Playful);
        assert_eq!(detect_tone("landed in Lisbon this morning 🇵🇹 finally"), Tone::Playful);
    }

    #[test]
    fn formal_beats_playful() {
        assert_eq!(detect_tone("please 🙏"), Tone::Formal);
    }

    #[test]
    fn short_text_is_concise() {
        assert_eq!(detect_tone("ok"), Tone::Concise);
        assert_eq!(detect_tone(""), Tone::Concise);
    }

    #[test]
    fn long_plain_text_is_casual() {
        assert_eq!(
            detect_tone("I went to the store and bought groceries today"),
            Tone::Casual
        );
    }

    #[test]
    fn concise_counts_characters_not_bytes() {
        // 19 multi-byte characters.
        let s = "ééééééééééééééééééé";
        assert_eq!(s.chars().count(), 19);
        assert_eq!(detect_tone(s), Tone::Concise);
    }

    #[test]
    fn rhythm_thresholds() {
        let now = Utc::now();
        assert_eq!(detect_rhythm(now - Duration::seconds(30), now), InteractionRhythm::Rapid);
        assert_eq!(detect_rhythm(now - Duration::hours(5), now), InteractionRhythm::Steady);
        assert_eq!(detect_rhythm(now - Duration::days(10), now), InteractionRhythm::Sporadic);
    }
}
