//! CLI commands for docreuse: scan, definitions, fix.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use docreuse::diagnostics::{self, Diagnostic};
use docreuse::{Config, Error, Mode, ResolvedValue, SuggestionEngine};
use serde::Serialize;
use walkdir::WalkDir;

/// How command output is printed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Pretty-printed JSON on stdout.
    Json,
    /// One line per item.
    Text,
}

/// Diagnostics for one scanned document.
#[derive(Serialize)]
pub struct DocumentReport {
    /// Suggestions for the document, in scan order.
    pub diagnostics: Vec<Diagnostic>,
    /// Path of the document as given or walked.
    pub document: PathBuf,
}

/// Resolved definitions visible from one document.
#[derive(Serialize)]
struct DefinitionsReport<'a> {
    /// Files that contributed definitions.
    files: &'a [PathBuf],
    /// Resolved values with every reference form that produces them.
    values: Vec<&'a ResolvedValue>,
}

/// Print resolved definitions for a document.
///
/// # Errors
///
/// Returns `Error::UnsupportedDocument` if no mode is given and the extension
/// is unknown, `Error::DocumentNotFound` if the document is missing, or
/// `Error::Json` if JSON output fails.
pub fn definitions(document: &Path, mode: Option<Mode>, format: OutputFormat, config: Config) -> Result<(), Error> {
    let mode = mode_for(document, mode)?;
    let mut engine = SuggestionEngine::new(config);
    let (files, values) = engine.resolve(document, mode)?;

    match format {
        OutputFormat::Json => {
            let report = DefinitionsReport {
                files: &files,
                values: values.iter().collect(),
            };
            println!("{}", serde_json::to_string_pretty(&report)?);
        },
        OutputFormat::Text => {
            for resolved in &values {
                for name in &resolved.names {
                    println!("{name}\t{}", resolved.value);
                }
            }
            eprintln!("{} values from {} files", values.len(), files.len());
        },
    }
    return Ok(());
}

/// Replace every suggestion in a document with its first candidate.
///
/// # Errors
///
/// Returns `Error::Io` if the document cannot be read or written, or the
/// errors of a scan.
pub fn fix(document: &Path, mode: Option<Mode>, config: Config) -> Result<(), Error> {
    let mode = mode_for(document, mode)?;
    let text = read_document(document)?;
    let mut engine = SuggestionEngine::new(config);
    let scan = engine.scan(document, &text, mode)?;

    let (rewritten, count) = diagnostics::apply_suggestions(&text, &scan.suggestions);
    if count == 0 {
        eprintln!("Nothing to replace in {}.", document.display());
        return Ok(());
    }

    std::fs::write(document, rewritten)?;
    eprintln!("Replaced {count} occurrences in {}", document.display());
    return Ok(());
}

/// Mode given on the command line, else inferred from the extension.
///
/// # Errors
///
/// Returns `Error::UnsupportedDocument` if the extension is unknown.
pub fn mode_for(document: &Path, explicit: Option<Mode>) -> Result<Mode, Error> {
    return match explicit {
        Some(mode) => Ok(mode),
        None => Mode::for_path(document),
    };
}

/// Print diagnostics for a set of reports.
///
/// # Errors
///
/// Returns `Error::Json` if JSON output fails.
pub fn print_reports(reports: &[DocumentReport], format: OutputFormat) -> Result<(), Error> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(reports)?),
        OutputFormat::Text => {
            for report in reports {
                for d in &report.diagnostics {
                    println!(
                        "{}:{}:{}  {}  {}",
                        report.document.display(),
                        d.range.start.line.saturating_add(1),
                        d.range.start.character.saturating_add(1),
                        d.code,
                        d.message
                    );
                }
            }
        },
    }
    return Ok(());
}

/// Read a document, mapping a missing file to `Error::DocumentNotFound`.
///
/// # Errors
///
/// Returns `Error::DocumentNotFound` or `Error::Io`.
pub fn read_document(document: &Path) -> Result<String, Error> {
    return match std::fs::read_to_string(document) {
        Ok(text) => Ok(text),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(Error::DocumentNotFound {
            path: document.to_path_buf(),
        }),
        Err(e) => Err(Error::Io(e)),
    };
}

/// Scan one document into a report.
///
/// # Errors
///
/// Returns the errors of reading or scanning the document.
pub fn report_for(engine: &mut SuggestionEngine, document: &Path, mode: Mode) -> Result<DocumentReport, Error> {
    let text = read_document(document)?;
    let scan = engine.scan(document, &text, mode)?;
    return Ok(DocumentReport {
        diagnostics: diagnostics::to_diagnostics(&text, &scan.suggestions, mode),
        document: document.to_path_buf(),
    });
}

/// Scan documents and directories, print diagnostics, and exit 1 when any
/// suggestion was found.
///
/// # Errors
///
/// Returns `Error::DocumentNotFound` for a missing path,
/// `Error::UnsupportedDocument` for a file of unknown type, or the errors of
/// a scan.
pub fn scan(paths: &[PathBuf], mode: Option<Mode>, format: OutputFormat, config: Config) -> Result<ExitCode, Error> {
    let documents = collect_documents(paths, mode)?;
    let mut engine = SuggestionEngine::new(config);
    let mut reports = Vec::with_capacity(documents.len());

    for (document, doc_mode) in &documents {
        reports.push(report_for(&mut engine, document, *doc_mode)?);
    }

    print_reports(&reports, format)?;

    let total: usize = reports.iter().map(|r| return r.diagnostics.len()).sum();
    if total > 0 {
        if format == OutputFormat::Text {
            println!();
            println!("{total} suggestions in {} documents", documents.len());
        }
        return Ok(ExitCode::from(1));
    }
    if format == OutputFormat::Text {
        println!("No suggestions in {} documents", documents.len());
    }
    return Ok(ExitCode::SUCCESS);
}

/// Expand the given paths into documents with their modes.
/// Directories are walked in file-name order for supported extensions only.
///
/// # Errors
///
/// Returns `Error::DocumentNotFound` for a missing path, or
/// `Error::UnsupportedDocument` for an explicitly named file of unknown type.
fn collect_documents(paths: &[PathBuf], mode: Option<Mode>) -> Result<Vec<(PathBuf, Mode)>, Error> {
    let mut documents = Vec::new();

    for path in paths {
        if path.is_file() {
            documents.push((path.clone(), mode_for(path, mode)?));
            continue;
        }
        if !path.is_dir() {
            return Err(Error::DocumentNotFound { path: path.clone() });
        }

        for entry in WalkDir::new(path)
            .sort_by_file_name()
            .into_iter()
            .filter_map(Result::ok)
            .filter(|e| return e.file_type().is_file())
        {
            let Ok(inferred) = Mode::for_path(entry.path()) else {
                continue;
            };
            documents.push((entry.path().to_path_buf(), mode.unwrap_or(inferred)));
        }
    }

    tracing::debug!(count = documents.len(), "collected documents");
    return Ok(documents);
}
