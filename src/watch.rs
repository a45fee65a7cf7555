//! File watcher: scans a document on startup, then rescans when the document
//! or any definition file it pulls in changes.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use docreuse::{Error, Mode, SuggestionEngine, diagnostics};
use notify::{RecursiveMode, Watcher as _};

use crate::commands::{self, DocumentReport, OutputFormat};

/// Files that trigger a rescan and the directories watched for them.
#[derive(Default)]
struct WatchSet {
    /// Directories already attached to the watcher.
    dirs: HashSet<PathBuf>,
    /// Document and definition files, canonical where possible.
    files: HashSet<PathBuf>,
}

impl WatchSet {
    /// Whether any changed path is one of the tracked files.
    fn is_relevant(&self, changed: &[PathBuf]) -> bool {
        return changed.iter().any(|p| return self.files.contains(p) || self.files.contains(&canonical(p)));
    }

    /// Track `files` and watch their parent directories, attaching only new ones.
    fn track(&mut self, watcher: &mut notify::RecommendedWatcher, files: &[PathBuf]) {
        self.files = files.iter().map(|f| return canonical(f)).collect();

        for file in &self.files {
            let Some(dir) = file.parent() else {
                continue;
            };
            if self.dirs.contains(dir) || !dir.exists() {
                continue;
            }
            match watcher.watch(dir, RecursiveMode::NonRecursive) {
                Ok(()) => {
                    tracing::debug!(dir = %dir.display(), "watching directory");
                    self.dirs.insert(dir.to_path_buf());
                },
                Err(e) => tracing::warn!(dir = %dir.display(), error = %e, "cannot watch directory"),
            }
        }
    }
}

/// Canonical form of a path, or the path itself if it cannot be resolved.
fn canonical(path: &Path) -> PathBuf {
    return std::fs::canonicalize(path).unwrap_or_else(|_| return path.to_path_buf());
}

/// Create a filesystem watcher that sends changed paths on the given channel.
///
/// # Errors
///
/// Returns `Error::WatcherSetup` if the watcher cannot be created.
fn create_watcher(tx: crossbeam_channel::Sender<Vec<PathBuf>>) -> Result<notify::RecommendedWatcher, Error> {
    return notify::recommended_watcher(move |res: Result<notify::Event, notify::Error>| {
        if let Ok(event) = res
            && matches!(
                event.kind,
                notify::EventKind::Create(_) | notify::EventKind::Modify(_) | notify::EventKind::Remove(_)
            )
        {
            let _ = tx.send(event.paths);
        }
    })
    .map_err(|e| {
        return Error::WatcherSetup {
            reason: e.to_string(),
        };
    });
}

/// Entry point for the watch command.
///
/// Runs an initial scan, then watches the document and its definition files
/// and rescans on changes. Events arriving within the debounce window are
/// coalesced into one rescan; only the latest result is printed.
///
/// # Errors
///
/// Returns `Error::UnsupportedDocument` if the mode cannot be inferred, or
/// `Error::WatcherSetup` if the watcher cannot be created.
pub fn run(document: &Path, mode: Option<Mode>, format: OutputFormat, config: docreuse::Config) -> Result<ExitCode, Error> {
    let mode = commands::mode_for(document, mode)?;
    let debounce = Duration::from_millis(config.debounce_ms);
    let mut engine = SuggestionEngine::new(config);

    let (tx, rx) = crossbeam_channel::unbounded();
    let mut watcher = create_watcher(tx)?;
    let mut watch_set = WatchSet::default();

    eprintln!("watch: initial scan");
    let mut last_code = rescan(&mut engine, document, mode, format, &mut watcher, &mut watch_set);
    eprintln!(
        "watch: monitoring {} directories, press Ctrl+C to stop",
        watch_set.dirs.len()
    );

    while let Ok(mut changed) = rx.recv() {
        while let Ok(more) = rx.recv_timeout(debounce) {
            changed.extend(more);
        }
        if !watch_set.is_relevant(&changed) {
            tracing::trace!(count = changed.len(), "ignoring unrelated changes");
            continue;
        }
        for path in &changed {
            engine.invalidate(path);
        }
        eprintln!("watch: change detected, rescanning...");
        last_code = rescan(&mut engine, document, mode, format, &mut watcher, &mut watch_set);
    }

    return Ok(last_code);
}

/// Scan once, print the result, and refresh what is watched.
fn rescan(
    engine: &mut SuggestionEngine,
    document: &Path,
    mode: Mode,
    format: OutputFormat,
    watcher: &mut notify::RecommendedWatcher,
    watch_set: &mut WatchSet,
) -> ExitCode {
    let text = match commands::read_document(document) {
        Ok(t) => t,
        Err(e) => {
            diagnostics::print_error(&e);
            watch_set.track(watcher, &[document.to_path_buf()]);
            return ExitCode::from(2);
        },
    };
    let scan = match engine.scan(document, &text, mode) {
        Ok(s) => s,
        Err(e) => {
            diagnostics::print_error(&e);
            return ExitCode::from(2);
        },
    };

    let mut files = vec![document.to_path_buf()];
    files.extend(scan.definition_files.iter().cloned());
    watch_set.track(watcher, &files);

    let count = scan.suggestions.len();
    let report = DocumentReport {
        diagnostics: diagnostics::to_diagnostics(&text, &scan.suggestions, mode),
        document: document.to_path_buf(),
    };
    if let Err(e) = commands::print_reports(&[report], format) {
        diagnostics::print_error(&e);
        return ExitCode::from(2);
    }

    eprintln!("watch: {count} suggestions");
    if count > 0 {
        return ExitCode::from(1);
    }
    return ExitCode::SUCCESS;
}
