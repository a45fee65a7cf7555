//! Content fingerprints used to invalidate cached definition files.
use sha2::{Digest as _, Sha256};

/// A content fingerprint: 64 hex chars, always lowercase.
/// Newtype prevents mixing with arbitrary strings.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint(
    /// The hex-encoded SHA-256 digest string.
    pub String,
);

/// Compute the fingerprint of a file's content.
///
/// Line endings are normalized first so a file re-saved with CRLF endings
/// does not count as changed.
pub fn fingerprint(content: &str) -> Fingerprint {
    let normalized = content.replace("\r\n", "\n");
    let hash = Sha256::digest(normalized.as_bytes());
    return Fingerprint(format!("{hash:x}"));
}

#[cfg(test)]
mod tests {
    use super::fingerprint;

    #[test]
    fn same_content_same_fingerprint() {
        assert_eq!(fingerprint("<!ENTITY a \"b\">"), fingerprint("<!ENTITY a \"b\">"));
    }

    #[test]
    fn edit_changes_fingerprint() {
        assert_ne!(fingerprint(":a: b\n"), fingerprint(":a: c\n"));
    }

    #[test]
    fn line_endings_ignored() {
        assert_eq!(fingerprint(":a: b\r\n:c: d\r\n"), fingerprint(":a: b\n:c: d\n"));
    }

    #[test]
    fn lowercase_hex() {
        let fp = fingerprint("");
        assert_eq!(fp.0.len(), 64);
        assert!(fp.0.chars().all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c)));
    }
}
