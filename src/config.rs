use std::path::{Path, PathBuf};

use crate::error::Error;

/// Helper installed by DAPS that lists the entity files a DocBook document pulls in.
const DEFAULT_ENTITY_HELPER: &str = "/usr/share/daps/libexec/getentityname.py";

/// Default quiet period before the watcher rescans.
const DEFAULT_DEBOUNCE_MS: u64 = 300;

/// Values shorter than this many characters are never suggested.
const DEFAULT_MINIMUM_MATCH_LENGTH: usize = 3;

/// Project configuration loaded from `.docreuse.toml`.
/// Immutable once loaded and passed explicitly to every entry point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Optional DAPS installation root; the entity helper lives under `libexec/`.
    pub daps_root: Option<PathBuf>,
    /// Quiet period the watcher waits for before rescanning.
    pub debounce_ms: u64,
    /// Explicit entity helper path, overriding `daps_root`.
    pub entity_helper: Option<PathBuf>,
    /// Definition files whose path ends with one of these suffixes are skipped.
    pub exclude_definition_file_suffixes: Vec<String>,
    /// Resolved values that are never suggested (case-insensitive).
    pub ignore_phrases: Vec<String>,
    /// Shortest value, in characters, that may be suggested.
    pub minimum_match_length: usize,
    /// AsciiDoc block styles whose content is never rewritten.
    pub no_replace_blocks: Vec<String>,
    /// XML element names whose content is never rewritten.
    pub no_replace_tags: Vec<String>,
}

/// Raw TOML structure for `.docreuse.toml`.
#[derive(serde::Deserialize)]
#[serde(deny_unknown_fields)]
struct DocreuseTomlConfig {
    #[serde(default)]
    daps_root: Option<PathBuf>,
    #[serde(default)]
    debounce_ms: Option<u64>,
    #[serde(default)]
    entity_helper: Option<PathBuf>,
    #[serde(default)]
    exclude_definition_file_suffixes: Vec<String>,
    #[serde(default)]
    ignore_phrases: Vec<String>,
    #[serde(default)]
    minimum_match_length: Option<usize>,
    #[serde(default)]
    no_replace_blocks: Option<Vec<String>>,
    #[serde(default)]
    no_replace_tags: Option<Vec<String>>,
}

impl Default for Config {
    fn default() -> Self {
        return Self {
            daps_root: None,
            debounce_ms: DEFAULT_DEBOUNCE_MS,
            entity_helper: None,
            exclude_definition_file_suffixes: Vec::new(),
            ignore_phrases: Vec::new(),
            minimum_match_length: DEFAULT_MINIMUM_MATCH_LENGTH,
            no_replace_blocks: default_no_replace_blocks(),
            no_replace_tags: default_no_replace_tags(),
        };
    }
}

impl Config {
    /// Path of the external helper that lists entity files for an XML document.
    pub fn entity_helper_path(&self) -> PathBuf {
        if let Some(helper) = &self.entity_helper {
            return helper.clone();
        }
        return match &self.daps_root {
            Some(root) => root.join("libexec").join("getentityname.py"),
            None => PathBuf::from(DEFAULT_ENTITY_HELPER),
        };
    }

    /// Whether a definition file is excluded by its path suffix.
    pub fn excludes_definition_file(&self, path: &Path) -> bool {
        let path_str = path.to_string_lossy();
        return self
            .exclude_definition_file_suffixes
            .iter()
            .any(|suffix| return !suffix.is_empty() && path_str.ends_with(suffix.as_str()));
    }

    /// Whether a resolved value is on the ignore list.
    pub fn ignores_phrase(&self, value: &str) -> bool {
        return self
            .ignore_phrases
            .iter()
            .any(|phrase| return phrase.to_lowercase() == value.to_lowercase());
    }

    /// Load config from `.docreuse.toml` in the given root directory.
    /// Returns defaults if the file doesn't exist.
    /// Returns an error if the file exists but is malformed; never silently
    /// falls back to defaults when the user wrote a config file.
    ///
    /// # Errors
    ///
    /// Returns `Error::Io` if reading fails (other than not-found),
    /// or `Error::TomlDe` if the TOML is malformed.
    pub fn load(root: &Path) -> Result<Self, Error> {
        let path = root.join(".docreuse.toml");
        let content = match std::fs::read_to_string(&path) {
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "no config file, using defaults");
                return Ok(Self::default());
            },
            Err(e) => return Err(Error::Io(e)),
            Ok(c) => c,
        };

        return Self::parse(&content);
    }

    /// Parse config from TOML content. Absent keys take their defaults.
    ///
    /// # Errors
    ///
    /// Returns `Error::TomlDe` if the TOML is malformed or names an unknown key.
    pub fn parse(content: &str) -> Result<Self, Error> {
        let raw: DocreuseTomlConfig = toml::from_str(content)?;
        return Ok(Self {
            daps_root: raw.daps_root,
            debounce_ms: raw.debounce_ms.unwrap_or(DEFAULT_DEBOUNCE_MS),
            entity_helper: raw.entity_helper,
            exclude_definition_file_suffixes: raw.exclude_definition_file_suffixes,
            ignore_phrases: raw.ignore_phrases,
            minimum_match_length: raw
                .minimum_match_length
                .unwrap_or(DEFAULT_MINIMUM_MATCH_LENGTH),
            no_replace_blocks: raw.no_replace_blocks.unwrap_or_else(default_no_replace_blocks),
            no_replace_tags: raw.no_replace_tags.unwrap_or_else(default_no_replace_tags),
        });
    }
}

/// AsciiDoc block styles that hold code or verbatim text.
fn default_no_replace_blocks() -> Vec<String> {
    return ["listing", "literal", "pass", "source"]
        .iter()
        .map(|s| return (*s).to_string())
        .collect();
}

/// DocBook elements that hold code, commands, or verbatim text.
fn default_no_replace_tags() -> Vec<String> {
    return [
        "command",
        "computeroutput",
        "filename",
        "literal",
        "option",
        "programlisting",
        "replaceable",
        "screen",
        "systemitem",
        "userinput",
    ]
    .iter()
    .map(|s| return (*s).to_string())
    .collect();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_takes_defaults() {
        let config = Config::parse("").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.minimum_match_length, 3);
        assert!(config.no_replace_tags.iter().any(|t| t == "screen"));
    }

    #[test]
    fn explicit_lists_replace_defaults() {
        let config = Config::parse(
            r#"
ignore_phrases = ["SUSE"]
no_replace_tags = ["code"]
minimum_match_length = 5
"#,
        )
        .unwrap();
        assert_eq!(config.no_replace_tags, vec!["code".to_string()]);
        assert_eq!(config.minimum_match_length, 5);
        assert!(config.ignores_phrase("suse"));
        assert!(!config.ignores_phrase("SUSE Linux"));
    }

    #[test]
    fn unknown_key_is_an_error() {
        assert!(matches!(Config::parse("bogus = 1"), Err(Error::TomlDe(_))));
    }

    #[test]
    fn helper_path_precedence() {
        let mut config = Config::default();
        assert_eq!(config.entity_helper_path(), PathBuf::from(DEFAULT_ENTITY_HELPER));

        config.daps_root = Some(PathBuf::from("/opt/daps"));
        assert_eq!(
            config.entity_helper_path(),
            PathBuf::from("/opt/daps/libexec/getentityname.py")
        );

        config.entity_helper = Some(PathBuf::from("/bin/ents"));
        assert_eq!(config.entity_helper_path(), PathBuf::from("/bin/ents"));
    }

    #[test]
    fn excludes_by_suffix() {
        let config = Config::parse(r#"exclude_definition_file_suffixes = ["generic-entities.ent"]"#).unwrap();
        assert!(config.excludes_definition_file(Path::new("/doc/common/generic-entities.ent")));
        assert!(!config.excludes_definition_file(Path::new("/doc/product-entities.ent")));
    }

    #[test]
    fn missing_file_loads_defaults() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(Config::load(dir.path()).unwrap(), Config::default());
    }
}
