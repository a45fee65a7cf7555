//! Suggest replacing literal product names and phrases with the entity or
//! attribute references that already define them.

pub mod config;
pub mod diagnostics;
pub mod engine;
pub mod error;
pub mod hasher;
pub mod resolver;
pub mod scanner;
pub mod store;
pub mod types;
pub mod zones;

pub use config::Config;
pub use diagnostics::{Diagnostic, apply_fix, apply_suggestions, to_diagnostics};
pub use engine::{Scan, SuggestionEngine, suggest};
pub use error::Error;
pub use resolver::{ValueMap, resolve_definitions};
pub use scanner::scan_occurrences;
pub use store::{DefinitionStore, build_definition_store, discover_definition_files};
pub use types::{Definition, Mode, ResolvedValue, Suggestion};
pub use zones::{ExclusionZones, compute_exclusion_zones};
