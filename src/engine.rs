//! End-to-end suggestion runs: definitions, resolution, exclusion zones, scan.

use std::path::{Path, PathBuf};

use crate::config::Config;
use crate::error::Error;
use crate::resolver::{self, ValueMap};
use crate::scanner;
use crate::store::DefinitionStoreBuilder;
use crate::types::{Mode, Suggestion};
use crate::zones;

/// Output of one complete scan of a document.
#[derive(Debug, Clone)]
pub struct Scan {
    /// Files that contributed definitions, in discovery order.
    pub definition_files: Vec<PathBuf>,
    /// Accepted suggestions in acceptance order.
    pub suggestions: Vec<Suggestion>,
    /// The resolved values the scan matched against.
    pub values: ValueMap,
}

/// Runs scans for one configuration, keeping parsed definition files cached
/// between runs. Holds no state shared with other engines.
pub struct SuggestionEngine {
    /// Store builder whose cache outlives individual scans.
    builder: DefinitionStoreBuilder,
    /// Configuration every scan runs with.
    config: Config,
}

impl SuggestionEngine {
    /// The configuration scans run with.
    pub const fn config(&self) -> &Config {
        return &self.config;
    }

    /// Forget cached definitions for a changed file.
    pub fn invalidate(&mut self, path: &Path) {
        self.builder.cache.invalidate(path);
    }

    /// Create an engine with an empty definition cache.
    pub fn new(config: Config) -> Self {
        return Self {
            builder: DefinitionStoreBuilder::default(),
            config,
        };
    }

    /// Resolve the definitions visible from `document` without scanning.
    ///
    /// # Errors
    ///
    /// Returns `Error::DocumentNotFound` if the document does not exist.
    pub fn resolve(&mut self, document: &Path, mode: Mode) -> Result<(Vec<PathBuf>, ValueMap), Error> {
        let store = self.builder.build(document, mode, &self.config)?;
        let values = resolver::resolve_definitions(&store.definitions, mode);
        return Ok((store.files, values));
    }

    /// Run one full scan of `text`, the current content of `document`.
    ///
    /// # Errors
    ///
    /// Returns `Error::DocumentNotFound` if the document does not exist.
    pub fn scan(&mut self, document: &Path, text: &str, mode: Mode) -> Result<Scan, Error> {
        let (definition_files, values) = self.resolve(document, mode)?;
        let zones = zones::compute_exclusion_zones(text, mode, &self.config);
        let suggestions = scanner::scan_occurrences(text, &values, &zones, mode, &self.config);

        tracing::debug!(
            document = %document.display(),
            values = values.len(),
            zones = zones.ranges().len(),
            suggestions = suggestions.len(),
            "scan complete"
        );

        return Ok(Scan {
            definition_files,
            suggestions,
            values,
        });
    }
}

/// Run one uncached scan of `text`, the current content of `document`.
///
/// # Errors
///
/// Returns `Error::DocumentNotFound` if the document does not exist.
pub fn suggest(document: &Path, text: &str, mode: Mode, config: &Config) -> Result<Vec<Suggestion>, Error> {
    let mut engine = SuggestionEngine::new(config.clone());
    return Ok(engine.scan(document, text, mode)?.suggestions);
}
