use std::fmt::Write as _;
use std::ops::Range;

use serde::Serialize;

use crate::error::Error;
use crate::types::{Mode, Suggestion};

const BOLD: &str = "\x1b[1m";
const RESET: &str = "\x1b[0m";

/// Tag carried by every diagnostic so editors can attribute it.
const SOURCE: &str = "docreuse";

/// Zero-based line and character, counted in Unicode scalar values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Position {
    /// Character offset within the line.
    pub character: u32,
    /// Line number.
    pub line: u32,
}

/// Half-open span between two positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TextRange {
    /// Position just past the last character.
    pub end: Position,
    /// Position of the first character.
    pub start: Position,
}

/// How strongly an editor should present a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// A hint that never blocks anything.
    Information,
}

/// Replace the flagged text with one reference form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QuickFix {
    /// Replacement text, `&name;` or `{name}`.
    pub new_text: String,
    /// Byte range being replaced.
    pub offsets: Range<usize>,
    /// Range being replaced.
    pub range: TextRange,
    /// Human-readable action label.
    pub title: String,
}

/// Editor-facing form of a suggestion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    /// `replaceWithEntity` or `replaceWithAttribute`.
    pub code: &'static str,
    /// One fix per candidate, in candidate order.
    pub fixes: Vec<QuickFix>,
    /// One-line description.
    pub message: String,
    /// Byte range of the literal text.
    pub offsets: Range<usize>,
    /// Line/character range of the literal text.
    pub range: TextRange,
    /// Always informational.
    pub severity: Severity,
    /// Always `docreuse`.
    pub source: &'static str,
}

/// Byte offset of every line start, for offset to position conversion.
pub struct LineIndex<'a> {
    /// Byte offsets where each line begins; the first is always 0.
    starts: Vec<usize>,
    /// The indexed text.
    text: &'a str,
}

impl<'a> LineIndex<'a> {
    /// Index the line starts of `text`.
    pub fn new(text: &'a str) -> Self {
        let mut starts = vec![0];
        starts.extend(text.match_indices('\n').map(|(i, _)| return i.saturating_add(1)));
        return Self { starts, text };
    }

    /// Position of a byte offset. Offsets past the end clamp to the end.
    pub fn position(&self, offset: usize) -> Position {
        let offset = offset.min(self.text.len());
        let line = self.starts.partition_point(|&s| return s <= offset).saturating_sub(1);
        let line_start = self.starts.get(line).copied().unwrap_or(0);
        let character = self.text.get(line_start..offset).map_or(0, |s| return s.chars().count());

        return Position {
            character: u32::try_from(character).unwrap_or(u32::MAX),
            line: u32::try_from(line).unwrap_or(u32::MAX),
        };
    }

    /// Line/character range of a byte range.
    pub fn range(&self, offsets: &Range<usize>) -> TextRange {
        return TextRange {
            end: self.position(offsets.end),
            start: self.position(offsets.start),
        };
    }
}

/// Convert suggestions into diagnostics carrying one quick fix per candidate.
pub fn to_diagnostics(text: &str, suggestions: &[Suggestion], mode: Mode) -> Vec<Diagnostic> {
    let index = LineIndex::new(text);

    return suggestions
        .iter()
        .map(|s| {
            let range = index.range(&s.range);
            let literal = text.get(s.range.clone()).unwrap_or(&s.value);
            let fixes = s
                .candidates
                .iter()
                .map(|candidate| {
                    return QuickFix {
                        new_text: candidate.clone(),
                        offsets: s.range.clone(),
                        range,
                        title: format!("Replace with {candidate}"),
                    };
                })
                .collect();

            return Diagnostic {
                code: mode.diagnostic_code(),
                fixes,
                message: format!("\"{literal}\" can be replaced with {}", s.candidates.join(" or ")),
                offsets: s.range.clone(),
                range,
                severity: Severity::Information,
                source: SOURCE,
            };
        })
        .collect();
}

/// Replace one byte range of `text`. An invalid range leaves the text unchanged.
pub fn apply_fix(text: &str, range: &Range<usize>, new_text: &str) -> String {
    let (Some(before), Some(after)) = (text.get(..range.start), text.get(range.end..)) else {
        tracing::warn!(start = range.start, end = range.end, "fix range out of bounds, skipping");
        return text.to_string();
    };
    if range.start > range.end {
        tracing::warn!(start = range.start, end = range.end, "inverted fix range, skipping");
        return text.to_string();
    }
    return format!("{before}{new_text}{after}");
}

/// Apply the first candidate of every suggestion, back to front so earlier
/// offsets stay valid. Returns the rewritten text and the number of edits.
pub fn apply_suggestions(text: &str, suggestions: &[Suggestion]) -> (String, usize) {
    let mut ordered: Vec<&Suggestion> = suggestions.iter().collect();
    ordered.sort_by_key(|s| return std::cmp::Reverse(s.range.start));

    let mut out = text.to_string();
    let mut applied = 0_usize;
    for suggestion in ordered {
        let Some(candidate) = suggestion.candidates.first() else {
            continue;
        };
        out = apply_fix(&out, &suggestion.range, candidate);
        applied = applied.saturating_add(1);
    }
    return (out, applied);
}

/// Render an error as valid markdown with bold headings and print to stderr.
pub fn print_error(e: &Error) {
    let md = render_error(e);
    for line in md.lines() {
        if line.starts_with('#') {
            eprintln!("{BOLD}{line}{RESET}");
        } else {
            eprintln!("{line}");
        }
    }
}

/// Render an error as a structured markdown diagnostic.
///
/// Each variant produces a block with what happened and, where there is
/// one, how to fix it.
pub fn render_error(e: &Error) -> String {
    return match e {
        Error::DocumentNotFound { path } => format!(
            "\
# Error: Document Not Found

`{}` does not exist.
",
            path.display()
        ),
        Error::Io(e) => format!(
            "\
# Error: I/O

{e}
"
        ),
        Error::Json(e) => format!(
            "\
# Error: JSON Output

{e}
"
        ),
        Error::TomlDe(e) => format!(
            "\
# Error: Invalid TOML

{e}

## Fix

Check `.docreuse.toml` against the supported keys.
"
        ),
        Error::UnsupportedDocument { path } => render_unsupported_document(path),
        Error::WatcherSetup { reason } => format!(
            "\
# Error: Watcher Setup

{reason}
"
        ),
    };
}

fn render_unsupported_document(path: &std::path::Path) -> String {
    let mut out = format!(
        "\
# Error: Unsupported Document

Cannot tell whether `{}` uses entities or attributes.

## Supported extensions

",
        path.display()
    );
    let _ = writeln!(out, "- `.xml`, `.dbk`: DocBook entities");
    let _ = writeln!(out, "- `.adoc`, `.asciidoc`, `.asc`: AsciiDoc attributes");
    out.push_str(
        "\
\n## Fix

Pass the mode explicitly:

    docreuse scan --mode xml <path>
",
    );
    return out;
}
