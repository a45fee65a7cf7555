use std::cmp::Reverse;
use std::ops::Range;

use regex::Regex;

use crate::config::Config;
use crate::resolver::ValueMap;
use crate::types::{Mode, ResolvedValue, Suggestion};
use crate::zones::ExclusionZones;

/// Characters that join a match to a larger hyphenated or path-like token.
const COMPOUND_SEPARATORS: [char; 4] = ['-', '+', '.', '/'];

/// Why a match of a resolved value was not suggested.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Rejection {
    /// Already written as `&name;` or `{name}`.
    AlreadySymbolic,
    /// Part of a token such as `suse-custom-image` or `example.suse.com`.
    CompoundWord,
    /// Inside a quoted value, comment, code block, or other exclusion zone.
    Excluded,
    /// Intersects a longer match accepted earlier.
    Overlap,
}

/// Scan `text` for literal occurrences of resolved values.
///
/// Longer values are tried first so that a value nested inside another
/// ("SUSE" in "SUSE Linux Enterprise") loses to the longer match. Every match
/// passes the symbolic, compound-word, exclusion-zone, and overlap filters in
/// that order. Returns suggestions in acceptance order.
pub fn scan_occurrences(
    text: &str,
    values: &ValueMap,
    zones: &ExclusionZones,
    mode: Mode,
    config: &Config,
) -> Vec<Suggestion> {
    let mut ordered: Vec<&ResolvedValue> = values.iter().collect();
    ordered.sort_by_key(|r| return Reverse(r.value.chars().count()));

    let mut accepted: Vec<Suggestion> = Vec::new();

    for resolved in ordered {
        if config.ignores_phrase(&resolved.value) {
            tracing::debug!(value = %resolved.value, "value is on the ignore list");
            continue;
        }
        if resolved.value.chars().count() < config.minimum_match_length {
            continue;
        }
        let Some(pattern) = value_pattern(&resolved.value) else {
            continue;
        };

        for m in pattern.find_iter(text) {
            let range = m.range();
            if let Some(reason) = rejection(text, &range, &resolved.names, zones, &accepted, mode) {
                tracing::trace!(value = %resolved.value, start = range.start, ?reason, "match rejected");
                continue;
            }
            accepted.push(Suggestion {
                candidates: resolved.names.clone(),
                range,
                value: resolved.value.clone(),
            });
        }
    }

    return accepted;
}

/// Case-insensitive pattern for a value, flexible in whitespace, anchored on
/// word boundaries at whichever ends are word characters.
fn value_pattern(value: &str) -> Option<Regex> {
    let words: Vec<String> = value.split_whitespace().map(regex::escape).collect();
    if words.is_empty() {
        return None;
    }

    let trimmed = value.trim();
    let lead = if trimmed.chars().next().is_some_and(is_word_char) { r"\b" } else { "" };
    let trail = if trimmed.chars().next_back().is_some_and(is_word_char) { r"\b" } else { "" };
    let pattern = format!("(?i){lead}{}{trail}", words.join(r"\s+"));

    return match Regex::new(&pattern) {
        Ok(re) => Some(re),
        Err(e) => {
            tracing::warn!(value, error = %e, "cannot build match pattern, skipping value");
            None
        },
    };
}

/// Word characters as `\b` sees them.
fn is_word_char(c: char) -> bool {
    return c.is_alphanumeric() || c == '_';
}

/// The first filter that rejects a match, if any.
fn rejection(
    text: &str,
    range: &Range<usize>,
    candidates: &[String],
    zones: &ExclusionZones,
    accepted: &[Suggestion],
    mode: Mode,
) -> Option<Rejection> {
    let before = text.get(..range.start).unwrap_or("");
    let matched = text.get(range.clone()).unwrap_or("");
    let after = text.get(range.end..).unwrap_or("");

    if is_already_symbolic(before, after, mode) || is_own_reference(matched, candidates) {
        return Some(Rejection::AlreadySymbolic);
    }
    if is_compound_word(before, after) {
        return Some(Rejection::CompoundWord);
    }
    if zones.contains(range) {
        return Some(Rejection::Excluded);
    }
    if accepted.iter().any(|s| return s.overlaps(range)) {
        return Some(Rejection::Overlap);
    }
    return None;
}

/// The match sits directly between the reference delimiters.
fn is_already_symbolic(before: &str, after: &str, mode: Mode) -> bool {
    return before.chars().next_back() == Some(mode.reference_open())
        && after.chars().next() == Some(mode.reference_close());
}

/// The match is the reference text itself, as left behind by an unresolvable cycle.
fn is_own_reference(matched: &str, candidates: &[String]) -> bool {
    return candidates.iter().any(|c| return c.eq_ignore_ascii_case(matched));
}

/// A separator links the match to a non-whitespace neighbor on either side.
fn is_compound_word(before: &str, after: &str) -> bool {
    let mut prev = before.chars().rev();
    let joined_before = matches!(
        (prev.next(), prev.next()),
        (Some(sep), Some(c)) if COMPOUND_SEPARATORS.contains(&sep) && !c.is_whitespace()
    );

    let mut next = after.chars();
    let joined_after = matches!(
        (next.next(), next.next()),
        (Some(sep), Some(c)) if COMPOUND_SEPARATORS.contains(&sep) && !c.is_whitespace()
    );

    return joined_before || joined_after;
}
