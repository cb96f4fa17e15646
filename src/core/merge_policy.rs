//! Assistant merge policy
//!
//! Live agent output arrives as many short fragments. This decides whether
//! an incoming fragment continues the previous transcript block or starts a
//! new one, using turn and message identity first and a text heuristic last.

use chrono::{DateTime, Utc};

use super::types::{ChatBlock, ChatRole};
use crate::config::MergeConfig;

const CONTINUATION_PUNCTUATION: &[char] = &[',', '.', ';', ':', ')', ']', '}'];
const OPEN_TRAILERS: &[char] = &[',', ';', ':', '(', '[', '{'];
const SENTENCE_END: &[char] = &['.', '!', '?'];
const QUOTES: &[char] = &['"', '\'', '`', '\u{201c}', '\u{201d}', '\u{2018}', '\u{2019}'];
const CONNECTORS: &[&str] = &["and ", "but ", "so ", "because ", "then ", "or "];

/// Identity and timing of an incoming fragment
#[derive(Debug, Clone, Default)]
pub struct MergeContext {
    pub created_at: Option<DateTime<Utc>>,
    pub turn_id: Option<String>,
    pub provider_message_id: Option<String>,
    /// Ignore message-ID matching and rely on the text heuristic alone
    pub force_split: bool,
}

/// Thresholds of the strict continuation check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MergeThresholds {
    pub max_fragment_runes: usize,
    pub max_combined_runes: usize,
    pub max_gap_ms: i64,
}

impl Default for MergeThresholds {
    fn default() -> Self {
        Self::from(&MergeConfig::default())
    }
}

impl From<&MergeConfig> for MergeThresholds {
    fn from(config: &MergeConfig) -> Self {
        Self {
            max_fragment_runes: config.max_fragment_runes,
            max_combined_runes: config.max_combined_runes,
            max_gap_ms: i64::try_from(config.max_gap_ms).unwrap_or(i64::MAX),
        }
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|s| !s.is_empty())
}

/// Decide whether `next_text` should be appended to `last`
pub fn should_merge(
    last: &ChatBlock,
    next_text: &str,
    ctx: &MergeContext,
    thresholds: &MergeThresholds,
) -> bool {
    if last.role != ChatRole::Agent {
        return false;
    }
    if next_text.trim().is_empty() {
        return false;
    }

    if let (Some(current), Some(next)) = (non_empty(&last.turn_id), non_empty(&ctx.turn_id)) {
        if current != next {
            return false;
        }
    }

    if ctx.force_split {
        return is_strict_continuation(last, next_text, ctx.created_at, thresholds);
    }

    match (
        non_empty(&last.provider_message_id),
        non_empty(&ctx.provider_message_id),
    ) {
        (Some(current), Some(next)) => current == next,
        (Some(_), None) | (None, Some(_)) => false,
        (None, None) => is_strict_continuation(last, next_text, ctx.created_at, thresholds),
    }
}

/// The text/timing heuristic used when identity does not decide
pub fn is_strict_continuation(
    last: &ChatBlock,
    next_text: &str,
    next_at: Option<DateTime<Utc>>,
    thresholds: &MergeThresholds,
) -> bool {
    let current = last.text.trim();
    let next = next_text.trim();
    if current.is_empty() || next.is_empty() {
        return false;
    }

    let next_len = next.chars().count();
    if next_len > thresholds.max_fragment_runes {
        return false;
    }
    if current.chars().count() + next_len > thresholds.max_combined_runes {
        return false;
    }
    if current.contains("\n\n") || next.contains("\n\n") {
        return false;
    }

    let (Some(current_at), Some(next_at)) = (last.created_at, next_at) else {
        return false;
    };
    let gap = (next_at - current_at).num_milliseconds().abs();
    if gap > thresholds.max_gap_ms {
        return false;
    }

    if has_explicit_boundary(current, next) {
        return false;
    }

    looks_like_continuation(current, next)
}

/// A sentence end followed by a capitalised fragment
fn has_explicit_boundary(current: &str, next: &str) -> bool {
    let ends_sentence = current.ends_with(SENTENCE_END);
    let starts_upper = next.chars().next().is_some_and(char::is_uppercase);
    ends_sentence && starts_upper
}

fn looks_like_continuation(current: &str, next: &str) -> bool {
    let Some(first) = next.chars().next() else {
        return false;
    };
    if first.is_lowercase() || CONTINUATION_PUNCTUATION.contains(&first) {
        return true;
    }
    if QUOTES.contains(&first) {
        return true;
    }

    let lowered = next.to_lowercase();
    if CONNECTORS.iter().any(|word| lowered.starts_with(word)) {
        return true;
    }

    current.ends_with(OPEN_TRAILERS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
    }

    fn agent(text: &str) -> ChatBlock {
        ChatBlock::new("agent:1", "s1", ChatRole::Agent, text).with_created_at(t0())
    }

    fn at(ms: i64) -> MergeContext {
        MergeContext {
            created_at: Some(t0() + Duration::milliseconds(ms)),
            ..Default::default()
        }
    }

    fn merge(last: &ChatBlock, next: &str, ctx: &MergeContext) -> bool {
        should_merge(last, next, ctx, &MergeThresholds::default())
    }

    #[test]
    fn never_merges_into_non_agent() {
        let user = ChatBlock::new("u", "s1", ChatRole::User, "hello,").with_created_at(t0());
        assert!(!merge(&user, "world", &at(10)));
    }

    #[test]
    fn blank_fragment_never_merges() {
        assert!(!merge(&agent("Hello,"), "   ", &at(10)));
    }

    #[test]
    fn sentence_boundary_splits() {
        assert!(!merge(&agent("Hello there."), "World", &at(100)));
    }

    #[test]
    fn comma_continuation_merges() {
        assert!(merge(&agent("Hello there,"), "world", &at(100)));
    }

    #[test]
    fn different_turns_split() {
        let mut last = agent("Hello,");
        last.turn_id = Some("t1".into());
        let mut ctx = at(10);
        ctx.turn_id = Some("t2".into());
        assert!(!merge(&last, "world", &ctx));
    }

    #[test]
    fn matching_message_ids_merge_regardless_of_text() {
        let last = agent("Done.").with_provider_message_id("m1");
        let mut ctx = at(60_000);
        ctx.provider_message_id = Some("m1".into());
        assert!(merge(&last, "Next paragraph", &ctx));
    }

    #[test]
    fn one_sided_message_id_splits() {
        let last = agent("Hello,").with_provider_message_id("m1");
        assert!(!merge(&last, "world", &at(10)));

        let mut ctx = at(10);
        ctx.provider_message_id = Some("m2".into());
        assert!(!merge(&agent("Hello,"), "world", &ctx));
    }

    #[test]
    fn force_split_ignores_message_ids() {
        let last = agent("Done.").with_provider_message_id("m1");
        let mut ctx = at(10);
        ctx.provider_message_id = Some("m1".into());
        ctx.force_split = true;
        assert!(!merge(&last, "Next", &ctx));

        let last = agent("and so,").with_provider_message_id("m1");
        ctx.provider_message_id = Some("m9".into());
        assert!(merge(&last, "more", &ctx));
    }

    #[test]
    fn fragment_length_boundary() {
        let ok = "a".repeat(96);
        let too_long = "a".repeat(97);
        assert!(merge(&agent("Hello,"), &ok, &at(10)));
        assert!(!merge(&agent("Hello,"), &too_long, &at(10)));
    }

    #[test]
    fn combined_length_boundary() {
        let current = format!("{},", "x".repeat(1109));
        let next = "y".repeat(90);
        assert!(merge(&agent(&current), &next, &at(10)));
        let next = "y".repeat(91);
        assert!(!merge(&agent(&current), &next, &at(10)));
    }

    #[test]
    fn timing_boundary() {
        assert!(merge(&agent("Hello,"), "world", &at(1200)));
        assert!(!merge(&agent("Hello,"), "world", &at(1201)));
        assert!(merge(&agent("Hello,"), "world", &at(-1200)));
    }

    #[test]
    fn missing_timestamp_splits() {
        let last = ChatBlock::new("a", "s1", ChatRole::Agent, "Hello,");
        assert!(!merge(&last, "world", &at(10)));
        assert!(!merge(&agent("Hello,"), "world", &MergeContext::default()));
    }

    #[test]
    fn paragraph_break_splits() {
        assert!(!merge(&agent("Hello\n\nthere,"), "world", &at(10)));
        assert!(!merge(&agent("Hello,"), "world\n\nagain", &at(10)));
    }

    #[test]
    fn continuation_markers() {
        assert!(merge(&agent("Tests pass"), "; lint is clean", &at(10)));
        assert!(merge(&agent("I ran it"), "\"quoted\"", &at(10)));
        assert!(merge(&agent("Fixed the parser"), "And the lexer", &at(10)));
        assert!(merge(&agent("See ("), "Figure", &at(10)));
        assert!(!merge(&agent("Fixed the parser"), "Next", &at(10)));
    }

    #[test]
    fn uppercase_after_open_trailer_merges() {
        assert!(merge(&agent("Steps:"), "Run tests", &at(10)));
    }
}
