//! Core domain types for docreuse definitions, resolved values, and suggestions.
use std::ops::Range;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// A symbolic name bound to a raw, unresolved value, scoped to its declaring file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Definition {
    /// Entity or attribute name, without reference delimiters.
    pub name: String,
    /// Value as written in the source, possibly holding references to other definitions.
    pub raw_value: String,
    /// File the definition was declared in.
    pub source_file: PathBuf,
}

/// Which reuse syntax a document uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// AsciiDoc attributes, declared as `:name: value` and referenced as `{name}`.
    #[value(name = "asciidoc")]
    AsciiDoc,
    /// DocBook XML entities, declared as `<!ENTITY name "value">` and referenced as `&name;`.
    Xml,
}

impl Mode {
    /// The diagnostic code attached to suggestions in this mode.
    pub const fn diagnostic_code(self) -> &'static str {
        return match self {
            Mode::AsciiDoc => "replaceWithAttribute",
            Mode::Xml => "replaceWithEntity",
        };
    }

    /// Infer the mode from a document's file extension.
    ///
    /// # Errors
    ///
    /// Returns `Error::UnsupportedDocument` for extensions that are neither XML nor AsciiDoc.
    pub fn for_path(path: &Path) -> Result<Self, Error> {
        let ext = path.extension().and_then(|e| return e.to_str()).unwrap_or("");

        return match ext.to_ascii_lowercase().as_str() {
            "adoc" | "asc" | "asciidoc" => Ok(Mode::AsciiDoc),
            "dbk" | "xml" => Ok(Mode::Xml),
            _ => Err(Error::UnsupportedDocument {
                path: path.to_path_buf(),
            }),
        };
    }

    /// Character that opens a reference (`&` or `{`).
    pub const fn reference_open(self) -> char {
        return match self {
            Mode::AsciiDoc => '{',
            Mode::Xml => '&',
        };
    }

    /// Character that closes a reference (`;` or `}`).
    pub const fn reference_close(self) -> char {
        return match self {
            Mode::AsciiDoc => '}',
            Mode::Xml => ';',
        };
    }

    /// Format a definition name as the text that references it.
    pub fn reference_form(self, name: &str) -> String {
        return format!("{}{name}{}", self.reference_open(), self.reference_close());
    }
}

/// A fully expanded value and every reference form that produces it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedValue {
    /// Reference forms (`&name;` or `{name}`) in discovery order.
    pub names: Vec<String>,
    /// Final text after nested references were substituted and markers normalized.
    pub value: String,
}

/// A proposed replacement of literal text with a symbolic reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Suggestion {
    /// Reference forms that could replace the text, in discovery order.
    pub candidates: Vec<String>,
    /// Half-open byte range of the literal text in the document.
    pub range: Range<usize>,
    /// The resolved value that matched.
    pub value: String,
}

impl Suggestion {
    /// Whether two half-open ranges share at least one byte.
    pub const fn overlaps(&self, other: &Range<usize>) -> bool {
        return self.range.start < other.end && other.start < self.range.end;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_from_extension() {
        assert_eq!(Mode::for_path(Path::new("book/index.xml")).unwrap(), Mode::Xml);
        assert_eq!(Mode::for_path(Path::new("guide.DBK")).unwrap(), Mode::Xml);
        assert_eq!(Mode::for_path(Path::new("guide.adoc")).unwrap(), Mode::AsciiDoc);
        assert_eq!(Mode::for_path(Path::new("guide.asciidoc")).unwrap(), Mode::AsciiDoc);
        assert!(matches!(
            Mode::for_path(Path::new("entities.ent")),
            Err(Error::UnsupportedDocument { .. })
        ));
        assert!(Mode::for_path(Path::new("README")).is_err());
    }

    #[test]
    fn reference_forms() {
        assert_eq!(Mode::Xml.reference_form("sle"), "&sle;");
        assert_eq!(Mode::AsciiDoc.reference_form("sle"), "{sle}");
    }

    #[test]
    fn overlap_is_half_open() {
        let s = Suggestion {
            candidates: vec!["&a;".to_string()],
            range: 4..8,
            value: "SUSE".to_string(),
        };
        assert!(s.overlaps(&(7..9)));
        assert!(s.overlaps(&(0..20)));
        assert!(!s.overlaps(&(8..10)));
        assert!(!s.overlaps(&(0..4)));
    }
}
