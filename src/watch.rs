//! Note watcher: runs `check` on startup, then re-checks every time the note
//! file is written, so anchors are re-validated against external edits.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use notify::{RecursiveMode, Watcher as _};

use crate::commands;
use crate::config;
use crate::error;

/// Debounce delay between filesystem events and re-check.
const DEBOUNCE_MS: u64 = 100;

/// Create a filesystem watcher that signals on writes to `note`.
///
/// Events for other files in the directory (the session file in
/// particular) are ignored, otherwise every check would trigger the next.
///
/// # Errors
///
/// Returns `Error::WatchFailed` if the watcher cannot be created.
fn create_watcher(
    note: PathBuf,
    tx: crossbeam_channel::Sender<()>,
) -> Result<notify::RecommendedWatcher, error::Error> {
    let note_name = note.file_name().map(std::ffi::OsStr::to_os_string);
    return notify::recommended_watcher(move |res: Result<notify::Event, notify::Error>| {
        if let Ok(event) = res
            && matches!(
                event.kind,
                notify::EventKind::Create(_) | notify::EventKind::Modify(_) | notify::EventKind::Remove(_)
            )
            && event.paths.iter().any(|p| return p.file_name().map(std::ffi::OsStr::to_os_string) == note_name)
        {
            let _ = tx.send(());
        }
    })
    .map_err(|e| {
        return error::Error::WatchFailed { reason: format!("watcher setup failed: {e}") };
    });
}

/// Entry point for the watch command.
///
/// Runs an initial check, then watches the note and re-checks on changes.
///
/// # Errors
///
/// Returns errors from config loading or watcher setup.
pub fn run(root: &Path) -> Result<ExitCode, error::Error> {
    eprintln!("watch: initial check");
    let mut last_code = run_check(root);

    let config = config::Config::load(root)?;
    let note = config.note_path(root);
    let dir = note.parent().filter(|p| return !p.as_os_str().is_empty()).unwrap_or(root).to_path_buf();

    let (tx, rx) = crossbeam_channel::unbounded();
    let mut watcher = create_watcher(note.clone(), tx)?;
    watcher.watch(&dir, RecursiveMode::NonRecursive).map_err(|e| {
        return error::Error::WatchFailed { reason: format!("cannot watch {}: {e}", dir.display()) };
    })?;

    eprintln!("watch: monitoring {}, press Ctrl+C to stop", note.display());

    while rx.recv().is_ok() {
        let debounce = Duration::from_millis(DEBOUNCE_MS);
        while rx.recv_timeout(debounce).is_ok() {}
        eprintln!("watch: note changed, re-checking...");
        last_code = run_check(root);
    }

    return Ok(last_code);
}

/// Run check once and print result. Returns the exit code from check.
fn run_check(root: &Path) -> ExitCode {
    return match commands::check(root, false) {
        Ok(code) => code,
        Err(e) => {
            crate::diagnostics::print_error(&e);
            ExitCode::from(3_u8)
        },
    };
}
