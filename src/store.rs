//! Definition discovery: find every file that contributes entities or attributes
//! to a document and parse each into raw name/value pairs.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::LazyLock;

use regex::Regex;

use crate::config::Config;
use crate::error::Error;
use crate::hasher::{self, Fingerprint};
use crate::resolver::ATTRIBUTE_REFERENCE;
use crate::types::{Definition, Mode};

/// `<!ENTITY name "value">` or single-quoted. Parameter and external entities never match.
static ENTITY_DECL: LazyLock<Regex> = LazyLock::new(|| {
    return Regex::new(r#"<!ENTITY\s+([^\s%"'<>]+)\s+(?:"([^"]*)"|'([^']*)')\s*>"#)
        .expect("valid entity regex");
});

/// `:name: value` attribute entry on a single line. Unset forms (`:name!:`) never match.
static ATTRIBUTE_ENTRY: LazyLock<Regex> = LazyLock::new(|| {
    return Regex::new(r"^:([A-Za-z0-9_][A-Za-z0-9_-]*):(?:[ \t]+(.*?))?[ \t]*$")
        .expect("valid attribute regex");
});

/// `include::path[attrs]` directive occupying a whole line.
static INCLUDE_DIRECTIVE: LazyLock<Regex> = LazyLock::new(|| {
    return Regex::new(r"(?m)^include::([^\[\n]+)\[[^\]\n]*\][ \t]*$")
        .expect("valid include regex");
});

/// Every definition contributing to one document, in discovery order.
#[derive(Debug, Clone)]
pub struct DefinitionStore {
    /// Parsed definitions, file by file in `files` order.
    pub definitions: Vec<Definition>,
    /// Definition files that were read successfully, in discovery order.
    pub files: Vec<PathBuf>,
    /// Syntax the definitions were parsed with.
    pub mode: Mode,
}

impl DefinitionStore {
    /// A store with no definitions. Scans against it produce nothing.
    pub const fn empty(mode: Mode) -> Self {
        return Self {
            definitions: Vec::new(),
            files: Vec::new(),
            mode,
        };
    }
}

/// Parsed definitions for one file, valid while the content fingerprint matches.
struct CachedFile {
    /// Definitions parsed from the file.
    definitions: Vec<Definition>,
    /// Fingerprint of the content they were parsed from.
    fingerprint: Fingerprint,
    /// Mode the file was parsed in.
    mode: Mode,
}

/// Per-file cache of parsed definitions keyed by absolute path.
/// An entry is reused only while the file's content fingerprint is unchanged.
#[derive(Default)]
pub struct DefinitionCache {
    /// Cached parse results by absolute path.
    entries: HashMap<PathBuf, CachedFile>,
}

impl DefinitionCache {
    /// Read a definition file and return its definitions, reparsing only on change.
    /// Returns `None` (after logging) if the file cannot be read.
    fn definitions_for(&mut self, path: &Path, mode: Mode) -> Option<Vec<Definition>> {
        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "cannot read definition file, skipping");
                self.entries.remove(path);
                return None;
            },
        };

        let fingerprint = hasher::fingerprint(&content);
        if let Some(cached) = self.entries.get(path)
            && cached.fingerprint == fingerprint
            && cached.mode == mode
        {
            tracing::trace!(path = %path.display(), "definition cache hit");
            return Some(cached.definitions.clone());
        }

        let definitions = parse_definitions(&content, path, mode);
        tracing::debug!(path = %path.display(), count = definitions.len(), "parsed definition file");
        self.entries.insert(
            path.to_path_buf(),
            CachedFile {
                definitions: definitions.clone(),
                fingerprint,
                mode,
            },
        );
        return Some(definitions);
    }

    /// Drop the cached entry for a file, forcing a reparse on next use.
    pub fn invalidate(&mut self, path: &Path) {
        self.entries.remove(path);
    }

    /// Whether no file is cached.
    pub fn is_empty(&self) -> bool {
        return self.entries.is_empty();
    }

    /// Number of cached files.
    pub fn len(&self) -> usize {
        return self.entries.len();
    }
}

/// Builds definition stores, keeping parsed files cached between builds.
#[derive(Default)]
pub struct DefinitionStoreBuilder {
    /// Parsed-file cache shared by every build from this builder.
    pub cache: DefinitionCache,
}

impl DefinitionStoreBuilder {
    /// Collect every definition relevant to `document`.
    ///
    /// # Errors
    ///
    /// Returns `Error::DocumentNotFound` if the document itself does not exist.
    /// Unreadable definition files are logged and skipped.
    pub fn build(&mut self, document: &Path, mode: Mode, config: &Config) -> Result<DefinitionStore, Error> {
        let files = discover_definition_files(document, mode, config)?;
        let mut store = DefinitionStore::empty(mode);

        for file in files {
            let Some(definitions) = self.cache.definitions_for(&file, mode) else {
                continue;
            };
            store.definitions.extend(definitions);
            store.files.push(file);
        }

        tracing::debug!(
            document = %document.display(),
            files = store.files.len(),
            definitions = store.definitions.len(),
            "built definition store"
        );
        return Ok(store);
    }
}

/// Collect every definition relevant to `document` without caching.
///
/// # Errors
///
/// Returns `Error::DocumentNotFound` if the document itself does not exist.
pub fn build_definition_store(document: &Path, mode: Mode, config: &Config) -> Result<DefinitionStore, Error> {
    return DefinitionStoreBuilder::default().build(document, mode, config);
}

/// List the files that contribute definitions to `document`, in discovery order.
///
/// XML documents ask the external entity helper; AsciiDoc documents follow
/// `include::` directives depth-first starting at the document itself.
///
/// # Errors
///
/// Returns `Error::DocumentNotFound` if the document itself does not exist.
pub fn discover_definition_files(document: &Path, mode: Mode, config: &Config) -> Result<Vec<PathBuf>, Error> {
    if !document.is_file() {
        return Err(Error::DocumentNotFound {
            path: document.to_path_buf(),
        });
    }

    let files = match mode {
        Mode::AsciiDoc => discover_attribute_files(document),
        Mode::Xml => discover_entity_files(document, config),
    };

    return Ok(files
        .into_iter()
        .filter(|f| {
            if config.excludes_definition_file(f) {
                tracing::info!(path = %f.display(), "excluding definition file");
                return false;
            }
            return true;
        })
        .collect());
}

/// Run the entity helper and collect the files it reports.
/// A helper that fails to run yields no files.
fn discover_entity_files(document: &Path, config: &Config) -> Vec<PathBuf> {
    let helper = config.entity_helper_path();
    let output = match Command::new(&helper).arg(document).output() {
        Ok(o) => o,
        Err(e) => {
            tracing::warn!(helper = %helper.display(), error = %e, "cannot run entity helper");
            return Vec::new();
        },
    };

    if !output.status.success() {
        tracing::warn!(
            helper = %helper.display(),
            status = %output.status,
            stderr = %String::from_utf8_lossy(&output.stderr).trim(),
            "entity helper failed"
        );
        return Vec::new();
    }

    let base = document.parent().unwrap_or_else(|| return Path::new(""));
    let stdout = String::from_utf8_lossy(&output.stdout);
    let mut seen = HashSet::new();
    let files: Vec<PathBuf> = stdout
        .split_whitespace()
        .map(|raw| return absolute_path(base.join(raw)))
        .filter(|p| return seen.insert(p.clone()))
        .collect();

    tracing::debug!(count = files.len(), "entity helper reported files");
    return files;
}

/// Canonical form of a definition file path, or at least an absolute one
/// when the file does not exist.
fn absolute_path(path: PathBuf) -> PathBuf {
    if let Ok(canonical) = std::fs::canonicalize(&path) {
        return canonical;
    }
    return std::path::absolute(&path).unwrap_or(path);
}

/// Include traversal state: files seen so far and the attributes they set.
#[derive(Default)]
struct IncludeWalk {
    /// Raw attribute values set before the current point of the walk.
    attributes: HashMap<String, String>,
    /// Files read, in discovery order.
    files: Vec<PathBuf>,
    /// Canonical paths already entered.
    visited: HashSet<PathBuf>,
}

impl IncludeWalk {
    /// Record the attribute entries of a content segment.
    fn learn_attributes(&mut self, segment: &str, path: &Path) {
        for definition in parse_attribute_entries(segment, path) {
            self.attributes.insert(definition.name, definition.raw_value);
        }
    }

    /// Substitute attributes set so far into an include target.
    fn expand_target(&self, target: &str) -> String {
        let mut expanded = target.to_string();
        for _ in 0..=self.attributes.len() {
            let next = ATTRIBUTE_REFERENCE
                .replace_all(&expanded, |cap: &regex::Captures<'_>| {
                    let whole = cap.get(0).map_or("", |m| return m.as_str());
                    return cap
                        .get(1)
                        .and_then(|name| return self.attributes.get(name.as_str()))
                        .map_or_else(|| return whole.to_string(), Clone::clone);
                })
                .into_owned();
            if next == expanded {
                break;
            }
            expanded = next;
        }
        return expanded;
    }
}

/// Depth-first include traversal, the document first.
fn discover_attribute_files(document: &Path) -> Vec<PathBuf> {
    let mut walk = IncludeWalk::default();
    walk_includes(document, &mut walk);
    return walk.files;
}

/// Visit one file, then each of its includes in declaration order.
/// Attributes set above an include are substituted into its target.
fn walk_includes(path: &Path, walk: &mut IncludeWalk) {
    let canonical = match std::fs::canonicalize(path) {
        Ok(p) => p,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "cannot resolve include, skipping");
            return;
        },
    };

    if !walk.visited.insert(canonical.clone()) {
        tracing::info!(path = %canonical.display(), "circular or repeated include, skipping");
        return;
    }

    let content = match std::fs::read_to_string(&canonical) {
        Ok(c) => c,
        Err(e) => {
            tracing::warn!(path = %canonical.display(), error = %e, "cannot read include, skipping");
            return;
        },
    };
    walk.files.push(canonical.clone());

    let dir = canonical.parent().unwrap_or_else(|| return Path::new("")).to_path_buf();
    let mut consumed = 0_usize;
    for cap in INCLUDE_DIRECTIVE.captures_iter(&content) {
        let (Some(directive), Some(target)) = (cap.get(0), cap.get(1)) else {
            continue;
        };
        walk.learn_attributes(content.get(consumed..directive.start()).unwrap_or(""), &canonical);
        consumed = directive.end();

        let target = walk.expand_target(target.as_str().trim());
        if target.is_empty() {
            continue;
        }
        if ATTRIBUTE_REFERENCE.is_match(&target) {
            tracing::warn!(
                path = %canonical.display(),
                include = %target,
                "include target holds an undefined attribute, skipping"
            );
            continue;
        }
        walk_includes(&dir.join(target), walk);
    }
    walk.learn_attributes(content.get(consumed..).unwrap_or(""), &canonical);
}

/// Extract `(name, raw value)` pairs from a definition file's content.
pub fn parse_definitions(content: &str, source_file: &Path, mode: Mode) -> Vec<Definition> {
    return match mode {
        Mode::AsciiDoc => parse_attribute_entries(content, source_file),
        Mode::Xml => parse_entity_declarations(content, source_file),
    };
}

/// Entity declarations over the whole content; quoted values may span lines.
fn parse_entity_declarations(content: &str, source_file: &Path) -> Vec<Definition> {
    return ENTITY_DECL
        .captures_iter(content)
        .filter_map(|cap| {
            let name = cap.get(1)?.as_str();
            let value = cap.get(2).or_else(|| return cap.get(3))?.as_str();
            return Some(Definition {
                name: name.to_string(),
                raw_value: value.to_string(),
                source_file: source_file.to_path_buf(),
            });
        })
        .collect();
}

/// Attribute entries, joining values continued with a trailing ` \`.
fn parse_attribute_entries(content: &str, source_file: &Path) -> Vec<Definition> {
    let mut definitions = Vec::new();
    let mut lines = content.lines();

    while let Some(line) = lines.next() {
        let Some(cap) = ATTRIBUTE_ENTRY.captures(line) else {
            continue;
        };
        let Some(name) = cap.get(1) else {
            continue;
        };
        let mut value = cap.get(2).map_or("", |m| return m.as_str()).to_string();

        while let Some(stripped) = strip_continuation(&value) {
            let Some(next) = lines.next() else {
                value = stripped;
                break;
            };
            value = format!("{stripped} {}", next.trim());
        }

        definitions.push(Definition {
            name: name.as_str().to_string(),
            raw_value: value,
            source_file: source_file.to_path_buf(),
        });
    }

    return definitions;
}

/// If a value ends with the ` \` continuation marker, return it without the marker.
fn strip_continuation(value: &str) -> Option<String> {
    if value == "\\" {
        return Some(String::new());
    }
    return value.strip_suffix(" \\").map(|v| return v.trim_end().to_string());
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    fn names(definitions: &[Definition]) -> Vec<(&str, &str)> {
        definitions
            .iter()
            .map(|d| (d.name.as_str(), d.raw_value.as_str()))
            .collect()
    }

    #[test]
    fn parses_entity_declarations() {
        let content = r#"
<!ENTITY suse "SUSE">
<!ENTITY sle 'SUSE Linux
Enterprise'>
<!ENTITY % param "ignored">
<!ENTITY ext SYSTEM "ext.ent">
<!ENTITY  slea   "&sle; for &arm;" >
"#;
        let defs = parse_definitions(content, Path::new("e.ent"), Mode::Xml);
        assert_eq!(
            names(&defs),
            vec![
                ("suse", "SUSE"),
                ("sle", "SUSE Linux\nEnterprise"),
                ("slea", "&sle; for &arm;"),
            ]
        );
        assert_eq!(defs[0].source_file, PathBuf::from("e.ent"));
    }

    #[test]
    fn parses_attribute_entries() {
        let content = "\
= Title
:suse: SUSE
:sle: SUSE Linux {nbsp}Enterprise
:empty:
:unset!:
:!unset2:
:long: first part \\
  second part
not :an: entry
";
        let defs = parse_definitions(content, Path::new("a.adoc"), Mode::AsciiDoc);
        assert_eq!(
            names(&defs),
            vec![
                ("suse", "SUSE"),
                ("sle", "SUSE Linux {nbsp}Enterprise"),
                ("empty", ""),
                ("long", "first part second part"),
            ]
        );
    }

    #[test]
    fn follows_includes_depth_first() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::create_dir(root.join("attrs")).unwrap();
        fs::write(root.join("main.adoc"), "include::attrs/a.adoc[]\ninclude::c.adoc[]\n").unwrap();
        fs::write(root.join("attrs/a.adoc"), ":a: A\ninclude::b.adoc[]\n").unwrap();
        fs::write(root.join("attrs/b.adoc"), ":b: B\n").unwrap();
        fs::write(root.join("c.adoc"), ":c: C\n").unwrap();

        let files = discover_definition_files(&root.join("main.adoc"), Mode::AsciiDoc, &Config::default()).unwrap();
        let names: Vec<String> = files
            .iter()
            .map(|f| f.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["main.adoc", "a.adoc", "b.adoc", "c.adoc"]);
    }

    #[test]
    fn include_targets_expand_attributes() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::create_dir(root.join("partials")).unwrap();
        fs::write(root.join("common.adoc"), ":partialsdir: partials\n").unwrap();
        fs::write(
            root.join("main.adoc"),
            "include::common.adoc[]\n:attrfile: attrs\ninclude::{partialsdir}/{attrfile}.adoc[]\ninclude::{nowhere}/x.adoc[]\n",
        )
        .unwrap();
        fs::write(root.join("partials/attrs.adoc"), ":a: A\n").unwrap();

        let store = build_definition_store(&root.join("main.adoc"), Mode::AsciiDoc, &Config::default()).unwrap();
        let names: Vec<String> = store
            .files
            .iter()
            .map(|f| f.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["main.adoc", "common.adoc", "attrs.adoc"]);
        assert!(store.definitions.iter().any(|d| d.name == "a"));
    }

    #[cfg(unix)]
    #[test]
    fn entity_files_are_absolute_and_canonical() {
        use std::os::unix::fs::PermissionsExt as _;

        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::create_dir(root.join("book")).unwrap();
        fs::write(root.join("entities.ent"), "<!ENTITY suse \"SUSE\">\n").unwrap();
        fs::write(root.join("book/index.xml"), "<book/>").unwrap();
        let helper = root.join("list-entities.sh");
        fs::write(&helper, "#!/bin/sh\necho ../entities.ent missing.ent\n").unwrap();
        fs::set_permissions(&helper, fs::Permissions::from_mode(0o755)).unwrap();
        let config = Config {
            entity_helper: Some(helper),
            ..Config::default()
        };

        let files = discover_definition_files(&root.join("book/index.xml"), Mode::Xml, &config).unwrap();
        assert_eq!(files.len(), 2);
        assert!(files.iter().all(|f| f.is_absolute()), "{files:?}");
        assert_eq!(files[0], fs::canonicalize(root.join("entities.ent")).unwrap());

        let mut builder = DefinitionStoreBuilder::default();
        let store = builder.build(&root.join("book/index.xml"), Mode::Xml, &config).unwrap();
        assert_eq!(store.files, vec![files[0].clone()]);
        builder.cache.invalidate(&files[0]);
        assert!(builder.cache.is_empty());
    }

    #[test]
    fn circular_includes_terminate() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::write(root.join("a.adoc"), ":a: A\ninclude::b.adoc[]\n").unwrap();
        fs::write(root.join("b.adoc"), ":b: B\ninclude::a.adoc[]\n").unwrap();

        let store = build_definition_store(&root.join("a.adoc"), Mode::AsciiDoc, &Config::default()).unwrap();
        assert_eq!(store.files.len(), 2);
        assert_eq!(names(&store.definitions), vec![("a", "A"), ("b", "B")]);
    }

    #[test]
    fn missing_include_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::write(root.join("main.adoc"), ":a: A\ninclude::missing.adoc[]\n").unwrap();

        let store = build_definition_store(&root.join("main.adoc"), Mode::AsciiDoc, &Config::default()).unwrap();
        assert_eq!(store.files.len(), 1);
        assert_eq!(store.definitions.len(), 1);
    }

    #[test]
    fn missing_document_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = build_definition_store(&dir.path().join("nope.adoc"), Mode::AsciiDoc, &Config::default());
        assert!(matches!(result, Err(Error::DocumentNotFound { .. })));
    }

    #[test]
    fn missing_entity_helper_yields_empty_store() {
        let dir = tempfile::tempdir().unwrap();
        let doc = dir.path().join("book.xml");
        fs::write(&doc, "<book/>").unwrap();
        let config = Config {
            entity_helper: Some(dir.path().join("no-such-helper")),
            ..Config::default()
        };

        let store = build_definition_store(&doc, Mode::Xml, &config).unwrap();
        assert!(store.definitions.is_empty());
    }

    #[test]
    fn cache_reparses_changed_file() {
        let dir = tempfile::tempdir().unwrap();
        let doc = dir.path().join("main.adoc");
        fs::write(&doc, ":a: first\n").unwrap();

        let mut builder = DefinitionStoreBuilder::default();
        let store = builder.build(&doc, Mode::AsciiDoc, &Config::default()).unwrap();
        assert_eq!(names(&store.definitions), vec![("a", "first")]);
        assert_eq!(builder.cache.len(), 1);

        fs::write(&doc, ":a: second\n").unwrap();
        let store = builder.build(&doc, Mode::AsciiDoc, &Config::default()).unwrap();
        assert_eq!(names(&store.definitions), vec![("a", "second")]);
    }
}
