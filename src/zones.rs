//! Exclusion zones: text ranges that must never be suggested for replacement.
//!
//! Every detector is a syntactic pass over the raw text, not a parser. Broken
//! markup simply yields fewer zones.

use std::ops::Range;
use std::sync::LazyLock;

use regex::Regex;

use crate::config::Config;
use crate::types::Mode;

/// Double-quoted string on a single line.
static QUOTED: LazyLock<Regex> = LazyLock::new(|| {
    return Regex::new(r#""[^"\n]*""#).expect("valid quote regex");
});

/// `<!-- ... -->`, possibly spanning lines.
static XML_COMMENT: LazyLock<Regex> = LazyLock::new(|| {
    return Regex::new(r"(?s)<!--.*?-->").expect("valid xml comment regex");
});

/// Any line starting with `//`. Delimiter lines of four or more slashes are
/// filtered out afterwards since they open comment blocks instead.
static ADOC_LINE_COMMENT: LazyLock<Regex> = LazyLock::new(|| {
    return Regex::new(r"(?m)^//[^\n]*$").expect("valid line comment regex");
});

/// `:name: value` attribute entry line, including unset forms.
static ATTRIBUTE_ENTRY_LINE: LazyLock<Regex> = LazyLock::new(|| {
    return Regex::new(r"(?m)^:!?[A-Za-z0-9_][A-Za-z0-9_-]*!?:.*$").expect("valid attribute entry regex");
});

/// Text in single or double backticks.
static INLINE_LITERAL: LazyLock<Regex> = LazyLock::new(|| {
    return Regex::new(r"``[^`\n]+?``|`[^`\n]+`").expect("valid inline literal regex");
});

/// `[[id]]`, `[[[id]]]`, `[#id]`, and `anchor:id[]`.
static ANCHOR: LazyLock<Regex> = LazyLock::new(|| {
    return Regex::new(r"\[\[\[?[^\]\n]*\]\]\]?|\[#[^\]\n]*\]|anchor:[^\[\s]+\[[^\]\n]*\]")
        .expect("valid anchor regex");
});

/// `<<target>>` and the target part of `xref:target[`.
static CROSS_REFERENCE: LazyLock<Regex> = LazyLock::new(|| {
    return Regex::new(r"<<[^>\n]*>>|xref:[^\[\s]+\[").expect("valid cross-reference regex");
});

/// Scheme-prefixed URL up to whitespace, a bracket, a quote, or an angle bracket.
static URL: LazyLock<Regex> = LazyLock::new(|| {
    return Regex::new(r#"(?i)\b(?:https?|ftp|file|mailto|irc|news|telnet):[^\s\[\]()<>"']+"#)
        .expect("valid url regex");
});

/// Block attribute line such as `[source,bash]` or `[literal#id]`.
static BLOCK_ATTRIBUTES: LazyLock<Regex> = LazyLock::new(|| {
    return Regex::new(r"^\[([^\[\]]*)\][ \t]*$").expect("valid block attribute regex");
});

/// Block title line such as `.Example output`.
static BLOCK_TITLE: LazyLock<Regex> = LazyLock::new(|| {
    return Regex::new(r"^\.[^\s.]").expect("valid block title regex");
});

/// The union of every detector's ranges, kept sorted and merged.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExclusionZones {
    /// Sorted, non-overlapping, non-adjacent ranges.
    ranges: Vec<Range<usize>>,
}

impl ExclusionZones {
    /// Whether `range` lies entirely inside the union of zones.
    pub fn contains(&self, range: &Range<usize>) -> bool {
        let idx = self.ranges.partition_point(|z| return z.start <= range.start);
        let Some(zone) = idx.checked_sub(1).and_then(|i| return self.ranges.get(i)) else {
            return false;
        };
        return range.end <= zone.end;
    }

    /// Merge arbitrary, possibly overlapping ranges into a union.
    pub fn from_ranges(mut ranges: Vec<Range<usize>>) -> Self {
        ranges.retain(|r| return r.start < r.end);
        ranges.sort_by_key(|r| return (r.start, r.end));

        let mut merged: Vec<Range<usize>> = Vec::with_capacity(ranges.len());
        for range in ranges {
            if let Some(last) = merged.last_mut()
                && range.start <= last.end
            {
                last.end = last.end.max(range.end);
                continue;
            }
            merged.push(range);
        }
        return Self { ranges: merged };
    }

    /// Whether there are no zones at all.
    pub fn is_empty(&self) -> bool {
        return self.ranges.is_empty();
    }

    /// The merged zones in ascending order.
    pub fn ranges(&self) -> &[Range<usize>] {
        return &self.ranges;
    }
}

/// Compute every range of `text` that may not originate a suggestion.
pub fn compute_exclusion_zones(text: &str, mode: Mode, config: &Config) -> ExclusionZones {
    let mut ranges = Vec::new();

    ranges.extend(QUOTED.find_iter(text).map(|m| {
        return m.start().saturating_add(1)..m.end().saturating_sub(1);
    }));
    ranges.extend(URL.find_iter(text).map(|m| return m.range()));

    match mode {
        Mode::AsciiDoc => {
            ranges.extend(
                ADOC_LINE_COMMENT
                    .find_iter(text)
                    .filter(|m| return !is_comment_block_delimiter(m.as_str()))
                    .map(|m| return m.range()),
            );
            ranges.extend(ATTRIBUTE_ENTRY_LINE.find_iter(text).map(|m| return m.range()));
            ranges.extend(INLINE_LITERAL.find_iter(text).map(|m| return m.range()));
            ranges.extend(ANCHOR.find_iter(text).map(|m| return m.range()));
            ranges.extend(CROSS_REFERENCE.find_iter(text).map(|m| return m.range()));
            let lines = split_lines(text);
            ranges.extend(comment_block_zones(&lines));
            ranges.extend(styled_block_zones(&lines, &config.no_replace_blocks));
        },
        Mode::Xml => {
            ranges.extend(XML_COMMENT.find_iter(text).map(|m| return m.range()));
            ranges.extend(tag_content_zones(text, &config.no_replace_tags));
        },
    }

    return ExclusionZones::from_ranges(ranges);
}

/// Elements named in `tags`, from the opening tag through the first matching close.
fn tag_content_zones(text: &str, tags: &[String]) -> Vec<Range<usize>> {
    let mut ranges = Vec::new();
    for tag in tags.iter().filter(|t| return !t.trim().is_empty()) {
        let name = regex::escape(tag.trim());
        let pattern = format!(r"(?s)<{name}(?:\s[^>]*[^/>])?\s*>.*?</{name}\s*>");
        let re = match Regex::new(&pattern) {
            Ok(re) => re,
            Err(e) => {
                tracing::warn!(tag = %tag, error = %e, "cannot build tag pattern, skipping");
                continue;
            },
        };
        ranges.extend(re.find_iter(text).map(|m| return m.range()));
    }
    return ranges;
}

/// One line of text with its byte span, newline excluded.
struct Line<'a> {
    /// Byte offset of the first character.
    start: usize,
    /// Byte offset just past the last character, before any `\r\n`.
    end: usize,
    /// The line content.
    text: &'a str,
}

/// Split text into lines while keeping byte offsets.
fn split_lines(text: &str) -> Vec<Line<'_>> {
    let mut lines = Vec::new();
    let mut start = 0_usize;
    for raw in text.split_inclusive('\n') {
        let content = raw.trim_end_matches(['\n', '\r']);
        lines.push(Line {
            start,
            end: start.saturating_add(content.len()),
            text: content,
        });
        start = start.saturating_add(raw.len());
    }
    return lines;
}

/// A delimiter line: four or more of one delimiter character, or `--`.
fn block_delimiter(line: &str) -> Option<&str> {
    let trimmed = line.trim_end();
    if trimmed == "--" {
        return Some(trimmed);
    }
    let first = trimmed.chars().next()?;
    if trimmed.len() >= 4 && "-.+=*_/".contains(first) && trimmed.chars().all(|c| return c == first) {
        return Some(trimmed);
    }
    return None;
}

/// A `////` comment block delimiter line.
fn is_comment_block_delimiter(line: &str) -> bool {
    return block_delimiter(line).is_some_and(|d| return d.starts_with('/'));
}

/// Index of the line closing the block opened at `open`, if any.
fn find_closing(lines: &[Line<'_>], open: usize, delimiter: &str) -> Option<usize> {
    return lines
        .iter()
        .enumerate()
        .skip(open.saturating_add(1))
        .find(|(_, l)| return l.text.trim_end() == delimiter)
        .map(|(i, _)| return i);
}

/// `////` comment blocks through their matching closing delimiter.
fn comment_block_zones(lines: &[Line<'_>]) -> Vec<Range<usize>> {
    let mut ranges = Vec::new();
    let mut i = 0_usize;
    while let Some(line) = lines.get(i) {
        let next = i.saturating_add(1);
        let Some(delimiter) = block_delimiter(line.text).filter(|d| return d.starts_with('/')) else {
            i = next;
            continue;
        };
        match find_closing(lines, i, delimiter).and_then(|k| return lines.get(k).map(|l| return (k, l))) {
            Some((k, close)) => {
                ranges.push(line.start..close.end);
                i = k.saturating_add(1);
            },
            None => i = next,
        }
    }
    return ranges;
}

/// First positional attribute of a block attribute line, without `#id`, `.role`, or `%option`.
fn block_style(line: &str) -> Option<String> {
    let cap = BLOCK_ATTRIBUTES.captures(line)?;
    let attrs = cap.get(1)?.as_str();
    let first = attrs.split(',').next()?.trim();
    let style: String = first.chars().take_while(|c| return !matches!(c, '#' | '.' | '%')).collect();
    if style.is_empty() || style.contains('=') {
        return None;
    }
    return Some(style.to_lowercase());
}

/// Style implied by an unstyled delimited block.
fn implicit_style(delimiter: &str) -> Option<&'static str> {
    return match delimiter.chars().next()? {
        '+' => Some("pass"),
        '-' if delimiter.len() >= 4 => Some("listing"),
        '.' => Some("literal"),
        _ => None,
    };
}

/// Content of blocks whose style is listed in `styles`.
///
/// A style line may be followed by further attribute or title lines before the
/// block itself. The block is either delimited, running to the matching
/// closing delimiter, or a paragraph running to the next blank line.
fn styled_block_zones(lines: &[Line<'_>], styles: &[String]) -> Vec<Range<usize>> {
    let wanted = |style: &str| return styles.iter().any(|s| return s.trim().eq_ignore_ascii_case(style));
    let mut ranges = Vec::new();
    let mut i = 0_usize;

    while let Some(line) = lines.get(i) {
        let next = i.saturating_add(1);

        if let Some(delimiter) = block_delimiter(line.text) {
            let open = i;
            // Other blocks are entered, not skipped: they may nest a styled block.
            i = next;
            if implicit_style(delimiter).is_some_and(wanted)
                && let Some(k) = find_closing(lines, open, delimiter)
                && let Some(close) = lines.get(k)
            {
                ranges.push(line.start..close.end);
                i = k.saturating_add(1);
            }
            continue;
        }

        let Some(style) = block_style(line.text).filter(|s| return wanted(s.as_str())) else {
            i = next;
            continue;
        };

        let mut j = next;
        while let Some(l) = lines.get(j)
            && (BLOCK_ATTRIBUTES.is_match(l.text) || BLOCK_TITLE.is_match(l.text))
        {
            j = j.saturating_add(1);
        }

        let Some(body) = lines.get(j) else {
            break;
        };

        if let Some(delimiter) = block_delimiter(body.text) {
            match find_closing(lines, j, delimiter).and_then(|k| return lines.get(k).map(|l| return (k, l))) {
                Some((k, close)) => {
                    tracing::trace!(style = %style, start = line.start, end = close.end, "excluding delimited block");
                    ranges.push(line.start..close.end);
                    i = k.saturating_add(1);
                },
                None => i = next,
            }
            continue;
        }

        let mut k = j;
        while let Some(l) = lines.get(k)
            && !l.text.trim().is_empty()
        {
            k = k.saturating_add(1);
        }
        if let Some(last) = k.checked_sub(1).and_then(|idx| return lines.get(idx))
            && k > j
        {
            ranges.push(line.start..last.end);
        }
        i = k.max(next);
    }

    return ranges;
}
