use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;

use crate::types::{Definition, Mode, ResolvedValue};

/// `&name;` entity reference. Character references (`&#160;`) never match.
static ENTITY_REFERENCE: LazyLock<Regex> = LazyLock::new(|| {
    return Regex::new(r"&([A-Za-z_:][A-Za-z0-9_.:-]*);").expect("valid entity reference regex");
});

/// `{name}` attribute reference.
pub(crate) static ATTRIBUTE_REFERENCE: LazyLock<Regex> = LazyLock::new(|| {
    return Regex::new(r"\{([A-Za-z0-9_][A-Za-z0-9_-]*)\}").expect("valid attribute reference regex");
});

/// Markers that would break literal matching, and their plain-text stand-ins.
const XML_NORMALIZATIONS: &[(&str, &str)] = &[
    ("&nbsp;", " "),
    ("&#160;", " "),
    ("&#xA0;", " "),
    ("&#xa0;", " "),
    ("&reg;", "®"),
    ("&#174;", "®"),
    ("&trade;", "™"),
    ("\u{a0}", " "),
];

/// AsciiDoc counterparts of `XML_NORMALIZATIONS`.
const ASCIIDOC_NORMALIZATIONS: &[(&str, &str)] = &[
    ("{nbsp}", " "),
    ("{sp}", " "),
    ("(R)", "®"),
    ("(TM)", "™"),
    ("\u{a0}", " "),
];

/// Resolved values grouped by final text, in first-discovery order.
///
/// Iteration order is stable for a given input, which keeps scans
/// deterministic when several values share a length.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValueMap {
    /// Grouped values in discovery order.
    entries: Vec<ResolvedValue>,
    /// Position of each final value in `entries`.
    index: HashMap<String, usize>,
}

impl ValueMap {
    /// Look up the names that resolve to exactly `value`.
    pub fn get(&self, value: &str) -> Option<&ResolvedValue> {
        let idx = *self.index.get(value)?;
        return self.entries.get(idx);
    }

    /// Record that `name` resolves to `value`.
    pub fn insert(&mut self, value: String, name: String) {
        if let Some(&idx) = self.index.get(&value)
            && let Some(entry) = self.entries.get_mut(idx)
        {
            if !entry.names.contains(&name) {
                entry.names.push(name);
            }
            return;
        }
        self.index.insert(value.clone(), self.entries.len());
        self.entries.push(ResolvedValue {
            names: vec![name],
            value,
        });
    }

    /// Whether no value was resolved.
    pub fn is_empty(&self) -> bool {
        return self.entries.is_empty();
    }

    /// Grouped values in discovery order.
    pub fn iter(&self) -> std::slice::Iter<'_, ResolvedValue> {
        return self.entries.iter();
    }

    /// Number of distinct resolved values.
    pub fn len(&self) -> usize {
        return self.entries.len();
    }
}

impl<'a> IntoIterator for &'a ValueMap {
    type IntoIter = std::slice::Iter<'a, ResolvedValue>;
    type Item = &'a ResolvedValue;

    fn into_iter(self) -> Self::IntoIter {
        return self.entries.iter();
    }
}

/// How resolution of a single definition ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    /// No known reference remains.
    Complete,
    /// A name recurred on its own expansion path; the partial value was kept.
    Cycle,
    /// A substitution changed nothing; the partial value was kept.
    Stall,
}

/// Expand nested references in every definition and group names by final value.
///
/// Pure and deterministic. Cycles and stalls truncate resolution of the
/// affected definition only; its partial value is kept and a warning logged.
pub fn resolve_definitions(definitions: &[Definition], mode: Mode) -> ValueMap {
    let (order, raw) = effective_definitions(definitions, mode);
    let mut expander = Expander::new(&raw, mode);
    let mut map = ValueMap::default();

    for name in order {
        let (resolved, outcome) = expander.resolve(name);
        match outcome {
            Outcome::Complete => {},
            Outcome::Cycle => {
                tracing::warn!(name, value = %resolved, "reference cycle detected, keeping partial value");
            },
            Outcome::Stall => {
                tracing::warn!(name, value = %resolved, "resolution stalled, keeping partial value");
            },
        }

        let value = normalize(&resolved, mode).trim().to_string();
        if value.is_empty() {
            continue;
        }
        map.insert(value, mode.reference_form(name));
    }

    return map;
}

/// Effective raw value per name plus first-appearance order.
/// XML keeps the first declaration of a name, AsciiDoc the last.
fn effective_definitions(definitions: &[Definition], mode: Mode) -> (Vec<&str>, HashMap<&str, &str>) {
    let mut order = Vec::new();
    let mut raw: HashMap<&str, &str> = HashMap::new();

    for def in definitions {
        let name = def.name.as_str();
        let value = def.raw_value.as_str();
        if raw.contains_key(name) {
            if mode == Mode::AsciiDoc {
                raw.insert(name, value);
            }
            continue;
        }
        order.push(name);
        raw.insert(name, value);
    }

    return (order, raw);
}

/// Expands definitions against the effective raw map.
///
/// Each reference is replaced by the fully expanded value of the name it
/// points to, so a name only counts as recurring when it is one of its own
/// ancestors. Names shared by sibling references (`&sle;` and `&sap;` both
/// using `&suse;`) expand normally.
struct Expander<'a> {
    /// Completed expansions by name. Partial values are never memoized.
    memo: HashMap<&'a str, String>,
    /// Syntax of references and their delimiters.
    mode: Mode,
    /// Effective raw value per name.
    raw: &'a HashMap<&'a str, &'a str>,
}

impl<'a> Expander<'a> {
    /// Expand `name`, whose ancestors are `path`.
    fn expand(&mut self, name: &'a str, path: &mut Vec<&'a str>) -> (String, Outcome) {
        if let Some(done) = self.memo.get(name) {
            return (done.clone(), Outcome::Complete);
        }
        let Some(&raw_value) = self.raw.get(name) else {
            return (self.mode.reference_form(name), Outcome::Complete);
        };

        path.push(name);
        let (value, outcome) = self.substitute(raw_value, path);
        path.pop();

        if outcome == Outcome::Complete {
            self.memo.insert(name, value.clone());
        } else {
            tracing::trace!(name, ?outcome, "expansion stopped early");
        }
        return (value, outcome);
    }

    /// Start an expander over the effective raw map.
    fn new(raw: &'a HashMap<&'a str, &'a str>, mode: Mode) -> Self {
        return Self {
            memo: HashMap::new(),
            mode,
            raw,
        };
    }

    /// Resolve one definition from the top.
    fn resolve(&mut self, name: &'a str) -> (String, Outcome) {
        return self.expand(name, &mut Vec::new());
    }

    /// Replace known references in `raw_value` until none remain, one recurs
    /// on `path`, or a substitution stalls.
    fn substitute(&mut self, raw_value: &str, path: &mut Vec<&'a str>) -> (String, Outcome) {
        let mut value = raw_value.to_string();

        loop {
            let Some(reference) = first_known_reference(&value, self.raw, self.mode) else {
                return (value, Outcome::Complete);
            };
            if path.contains(&reference) {
                return (value, Outcome::Cycle);
            }

            let (replacement, inner) = self.expand(reference, path);
            let next = value.replace(&self.mode.reference_form(reference), &replacement);
            if next == value {
                return (value, Outcome::Stall);
            }
            value = next;
            if inner != Outcome::Complete {
                return (value, inner);
            }
        }
    }
}

/// The first reference in `value` whose name is defined.
fn first_known_reference<'a>(value: &str, raw: &HashMap<&'a str, &'a str>, mode: Mode) -> Option<&'a str> {
    let pattern = match mode {
        Mode::AsciiDoc => &ATTRIBUTE_REFERENCE,
        Mode::Xml => &ENTITY_REFERENCE,
    };

    return pattern
        .captures_iter(value)
        .filter_map(|cap| return cap.get(1))
        .find_map(|m| return raw.get_key_value(m.as_str()).map(|(k, _)| return *k));
}

/// Replace escape markers with the plain text they render as.
fn normalize(value: &str, mode: Mode) -> String {
    let table = match mode {
        Mode::AsciiDoc => ASCIIDOC_NORMALIZATIONS,
        Mode::Xml => XML_NORMALIZATIONS,
    };

    let mut out = value.to_string();
    for (marker, replacement) in table {
        if out.contains(marker) {
            out = out.replace(marker, replacement);
        }
    }
    return out;
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use std::sync::{Arc, Mutex};

    use super::*;

    fn defs(pairs: &[(&str, &str)]) -> Vec<Definition> {
        pairs
            .iter()
            .map(|(name, value)| Definition {
                name: (*name).to_string(),
                raw_value: (*value).to_string(),
                source_file: PathBuf::from("defs"),
            })
            .collect()
    }

    /// Log sink shared between the subscriber and the test.
    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl std::io::Write for Captured {
        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }

        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }
    }

    /// Run `f` under a subscriber that records events, returning the WARN lines.
    fn capture_warnings<T>(f: impl FnOnce() -> T) -> (Vec<String>, T) {
        let sink = Captured::default();
        let writer = sink.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_ansi(false)
            .with_max_level(tracing::Level::TRACE)
            .with_writer(move || writer.clone())
            .finish();

        let out = tracing::subscriber::with_default(subscriber, f);
        let text = String::from_utf8(sink.0.lock().unwrap().clone()).unwrap();
        let warnings = text.lines().filter(|l| l.contains(" WARN ")).map(str::to_string).collect();
        (warnings, out)
    }

    fn names_for<'a>(map: &'a ValueMap, value: &str) -> Vec<&'a str> {
        map.get(value)
            .map(|r| r.names.iter().map(String::as_str).collect())
            .unwrap_or_default()
    }

    #[test]
    fn flat_definitions() {
        let map = resolve_definitions(&defs(&[("suse", "SUSE"), ("sle", "SUSE Linux Enterprise")]), Mode::Xml);
        assert_eq!(map.len(), 2);
        assert_eq!(names_for(&map, "SUSE"), vec!["&suse;"]);
        assert_eq!(names_for(&map, "SUSE Linux Enterprise"), vec!["&sle;"]);
    }

    #[test]
    fn nested_references_expand() {
        let map = resolve_definitions(
            &defs(&[
                ("sles", "{sle} Server"),
                ("sle", "{suse} Linux Enterprise"),
                ("suse", "SUSE"),
            ]),
            Mode::AsciiDoc,
        );
        assert_eq!(names_for(&map, "SUSE Linux Enterprise Server"), vec!["{sles}"]);
        assert_eq!(names_for(&map, "SUSE Linux Enterprise"), vec!["{sle}"]);
    }

    #[test]
    fn repeated_reference_is_not_a_cycle() {
        let map = resolve_definitions(&defs(&[("a", "&b; and &b;"), ("b", "B")]), Mode::Xml);
        assert_eq!(names_for(&map, "B and B"), vec!["&a;"]);
    }

    #[test]
    fn unknown_reference_left_untouched() {
        let map = resolve_definitions(&defs(&[("a", "&unknown; &b;"), ("b", "B")]), Mode::Xml);
        assert_eq!(names_for(&map, "&unknown; B"), vec!["&a;"]);
    }

    #[test]
    fn colliding_values_collect_all_names() {
        let map = resolve_definitions(
            &defs(&[("sle", "SUSE Linux Enterprise"), ("slea", "&sle;"), ("other", "Other")]),
            Mode::Xml,
        );
        assert_eq!(names_for(&map, "SUSE Linux Enterprise"), vec!["&sle;", "&slea;"]);
        let order: Vec<&str> = map.iter().map(|r| r.value.as_str()).collect();
        assert_eq!(order, vec!["SUSE Linux Enterprise", "Other"]);
    }

    #[test]
    fn mutual_cycle_terminates_with_partial_values() {
        let map = resolve_definitions(&defs(&[("a", "{b}"), ("b", "{a}")]), Mode::AsciiDoc);
        assert_eq!(names_for(&map, "{a}"), vec!["{a}"]);
        assert_eq!(names_for(&map, "{b}"), vec!["{b}"]);
    }

    #[test]
    fn self_reference_terminates() {
        let map = resolve_definitions(&defs(&[("a", "x &a;")]), Mode::Xml);
        assert_eq!(names_for(&map, "x &a;"), vec!["&a;"]);
    }

    #[test]
    fn stall_terminates() {
        let raw = HashMap::from([("a", "&b;"), ("b", "&b;")]);
        let (value, outcome) = Expander::new(&raw, Mode::Xml).resolve("a");
        assert_eq!(value, "&b;");
        assert_eq!(outcome, Outcome::Stall);
    }

    #[test]
    fn diamond_is_not_a_cycle() {
        let map = resolve_definitions(
            &defs(&[
                ("x", "&sle; for &sap;"),
                ("sle", "&suse; Linux Enterprise"),
                ("sap", "&suse; SAP"),
                ("suse", "SUSE"),
            ]),
            Mode::Xml,
        );
        assert_eq!(names_for(&map, "SUSE Linux Enterprise for SUSE SAP"), vec!["&x;"]);
        assert_eq!(names_for(&map, "SUSE SAP"), vec!["&sap;"]);
    }

    #[test]
    fn one_warning_per_cyclic_definition() {
        let (warnings, _) = capture_warnings(|| {
            return resolve_definitions(&defs(&[("a", "{b}"), ("b", "{a}"), ("c", "C")]), Mode::AsciiDoc);
        });
        assert_eq!(warnings.len(), 2, "{warnings:?}");
        assert!(warnings.iter().any(|w| w.contains("name=\"a\"") || w.contains("name=a")));
        assert!(warnings.iter().any(|w| w.contains("name=\"b\"") || w.contains("name=b")));

        let (warnings, _) = capture_warnings(|| {
            return resolve_definitions(
                &defs(&[("x", "{sle} {sap}"), ("sle", "{suse} L"), ("sap", "{suse} S"), ("suse", "SUSE")]),
                Mode::AsciiDoc,
            );
        });
        assert!(warnings.is_empty(), "{warnings:?}");
    }

    #[test]
    fn markers_normalized() {
        let map = resolve_definitions(
            &defs(&[("sle", "SUSE&nbsp;Linux&reg;"), ("slm", "SUSE{nbsp}Micro(R)")]),
            Mode::Xml,
        );
        assert!(map.get("SUSE Linux®").is_some());
        let map = resolve_definitions(&defs(&[("slm", "SUSE{nbsp}Micro(R)")]), Mode::AsciiDoc);
        assert!(map.get("SUSE Micro®").is_some());
    }

    #[test]
    fn xml_first_declaration_wins_asciidoc_last() {
        let pairs = [("a", "first"), ("a", "second")];
        let xml = resolve_definitions(&defs(&pairs), Mode::Xml);
        assert_eq!(names_for(&xml, "first"), vec!["&a;"]);
        let adoc = resolve_definitions(&defs(&pairs), Mode::AsciiDoc);
        assert_eq!(names_for(&adoc, "second"), vec!["{a}"]);
        assert_eq!(adoc.len(), 1);
    }

    #[test]
    fn blank_values_dropped() {
        let map = resolve_definitions(&defs(&[("empty", ""), ("space", "{nbsp}")]), Mode::AsciiDoc);
        assert!(map.is_empty());
    }

    #[test]
    fn resolution_is_idempotent() {
        let input = defs(&[("a", "&b; &c;"), ("b", "B"), ("c", "&a;"), ("d", "B")]);
        assert_eq!(resolve_definitions(&input, Mode::Xml), resolve_definitions(&input, Mode::Xml));
    }
}
