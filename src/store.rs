//! Session persistence and the on-disk workspace: config, topic, note file
//! and `.notelink.session`, loaded together and kept in sync.

use std::path::{Path, PathBuf};

use crate::anchor::detached_anchor_ids;
use crate::config::Config;
use crate::error::Error;
use crate::session::{SessionAction, SessionState, reduce};
use crate::topic::{OutputSection, Topic, load_topic};

/// Name of the session file, next to the config.
pub const SESSION_FILE: &str = ".notelink.session";

/// Everything one command works on.
#[derive(Debug)]
pub struct Workspace {
    /// Loaded configuration.
    pub config: Config,
    /// Note contents as last read from or written to disk.
    note_on_disk: String,
    /// Directory holding the config, note and session.
    pub root: PathBuf,
    /// Current session, already synced with the note file.
    pub session: SessionState,
    /// Active topic.
    pub topic: Topic,
}

impl Workspace {
    /// Run one action through the session reducer.
    pub fn apply(&mut self, action: SessionAction) {
        let state = std::mem::take(&mut self.session);
        self.session = reduce(state, action);
        return;
    }

    /// Path of the note file.
    pub fn note_path(&self) -> PathBuf {
        return self.config.note_path(&self.root);
    }

    /// Load config, topic, note and session from `root`.
    ///
    /// A note that differs from the session's last seen text is treated as an
    /// external edit: it is recorded with history and every anchor is
    /// re-validated against it.
    ///
    /// # Errors
    ///
    /// Returns errors from config loading, topic lookup, note reading,
    /// or session parsing.
    pub fn open(root: &Path) -> Result<Self, Error> {
        let config = Config::load(root)?;
        let topic = load_topic(&config.topic_path(root)?)?;
        let note_on_disk = read_note(&config.note_path(root))?;
        let stored = read_session(&root.join(SESSION_FILE))?;

        let topic_id = topic.metadata.id.clone();
        let mut workspace = Self {
            session: SessionState::for_topic(&topic_id, config.history_limit),
            config,
            note_on_disk,
            root: root.to_path_buf(),
            topic,
        };

        let note = workspace.note_on_disk.clone();
        if let Some(mut session) = stored {
            session.history_limit = workspace.config.history_limit;
            workspace.session = session;
            workspace.apply(SessionAction::SetTopic { topic_id });
            if workspace.session.editor_text != note {
                tracing::info!(note = %workspace.note_path().display(), "note changed outside notelink");
                let broken = detached_anchor_ids(&note, &workspace.session.editor_anchors);
                workspace.apply(SessionAction::SetEditorTextWithHistory { text: note });
                for section_id in broken {
                    tracing::debug!(section = %section_id, "linked block no longer matches");
                    workspace.apply(SessionAction::MarkAnchorDetached { section_id });
                }
            }
        } else {
            workspace.apply(SessionAction::SetEditorText { text: note });
        }

        return Ok(workspace);
    }

    /// Write the note (only if it changed) and the session.
    ///
    /// # Errors
    ///
    /// Returns `Error::Io` or `Error::Json` if either file cannot be written.
    pub fn save(&mut self) -> Result<(), Error> {
        if self.session.editor_text != self.note_on_disk {
            let path = self.note_path();
            std::fs::write(&path, &self.session.editor_text)?;
            tracing::info!(note = %path.display(), "note written");
            self.note_on_disk.clone_from(&self.session.editor_text);
        }
        return write_session(&self.root.join(SESSION_FILE), &self.session);
    }

    /// Look up a declared output section.
    ///
    /// # Errors
    ///
    /// Returns `Error::UnknownSection` listing the declared ids.
    pub fn section(&self, id: &str) -> Result<&OutputSection, Error> {
        return self.topic.output_section(id).ok_or_else(|| {
            return Error::UnknownSection {
                available: self.topic.output_template.sections.iter().map(|s| return s.id.clone()).collect(),
                id: id.to_string(),
            };
        });
    }
}

/// Validate that every anchor is stored under its own section id.
///
/// # Errors
///
/// Returns `Error::SessionCorrupt` naming the first mismatched key.
fn enforce_anchor_keys(state: &SessionState) -> Result<(), Error> {
    for (key, anchor) in &state.editor_anchors {
        if *key != anchor.section_id {
            return Err(Error::SessionCorrupt {
                reason: format!("anchor stored under `{key}` belongs to `{}`", anchor.section_id),
            });
        }
    }
    return Ok(());
}

/// Parse a session from JSON content.
///
/// # Errors
///
/// Returns `Error::Json` if the content is not a session document,
/// or `Error::SessionCorrupt` if anchors are filed under the wrong key.
pub fn parse_session(content: &str) -> Result<SessionState, Error> {
    let state: SessionState = serde_json::from_str(content)?;
    enforce_anchor_keys(&state)?;
    return Ok(state);
}

/// Read the note file; a missing note is an empty note.
///
/// # Errors
///
/// Returns `Error::Io` for read failures other than not-found.
fn read_note(path: &Path) -> Result<String, Error> {
    return match std::fs::read_to_string(path) {
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(String::new()),
        Err(e) => Err(Error::Io(e)),
        Ok(c) => Ok(c),
    };
}

/// Read and parse a session file. `Ok(None)` if there is none yet.
///
/// # Errors
///
/// Returns `Error::Io` for read failures other than not-found,
/// or any error from [`parse_session`].
pub fn read_session(path: &Path) -> Result<Option<SessionState>, Error> {
    let content = match std::fs::read_to_string(path) {
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(Error::Io(e)),
        Ok(c) => c,
    };
    return parse_session(&content).map(Some);
}

/// Write the session as pretty JSON.
///
/// # Errors
///
/// Returns `Error::Json` if serialization fails,
/// or `Error::Io` if the file cannot be written.
pub fn write_session(path: &Path, state: &SessionState) -> Result<(), Error> {
    let mut content = serde_json::to_string_pretty(state)?;
    content.push('\n');
    std::fs::write(path, content)?;
    return Ok(());
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::anchor::{Provenance, append_anchored};
    use crate::config::CONFIG_FILE;

    const TOPIC: &str = r#"{
        "metadata": { "id": "uti" },
        "outputTemplate": { "sections": [ { "id": "plan", "title": "Plan", "source": "editor" } ] }
    }"#;

    fn linked_session() -> SessionState {
        let provenance = Provenance { linked_at: Utc::now(), section_title: None, source: None };
        let linked = append_anchored("Intro", "plan", "Review in clinic\nSafety net given", &provenance);
        return reduce(SessionState::for_topic("uti", 50), SessionAction::CommitLinkedSection {
            anchor: linked.anchor,
            text: linked.next_text,
        });
    }

    fn workspace_dir() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("uti.json"), TOPIC).unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE), "topic = \"uti.json\"\n").unwrap();
        return dir;
    }

    #[test]
    fn session_round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(SESSION_FILE);
        assert!(read_session(&path).unwrap().is_none());
        let state = linked_session();
        write_session(&path, &state).unwrap();
        assert_eq!(read_session(&path).unwrap(), Some(state));
    }

    #[test]
    fn misfiled_anchor_is_corrupt() {
        let state = linked_session();
        let json = serde_json::to_string(&state).unwrap().replace("\"plan\":{", "\"other\":{");
        assert!(matches!(parse_session(&json), Err(Error::SessionCorrupt { .. })));
    }

    #[test]
    fn external_edit_is_recorded_and_rechecked() {
        let dir = workspace_dir();
        let state = linked_session();
        std::fs::write(dir.path().join("note.md"), state.editor_text.replace("clinic", "ED")).unwrap();
        write_session(&dir.path().join(SESSION_FILE), &state).unwrap();

        let mut workspace = Workspace::open(dir.path()).unwrap();
        assert!(workspace.session.editor_anchors.get("plan").unwrap().detached);
        assert!(workspace.session.editor_history.can_undo());

        workspace.apply(SessionAction::UndoEditorText);
        workspace.save().unwrap();
        let note = std::fs::read_to_string(dir.path().join("note.md")).unwrap();
        assert_eq!(note, state.editor_text);
        assert!(!workspace.session.editor_anchors.get("plan").unwrap().detached);
    }

    #[test]
    fn fresh_workspace_starts_without_history() {
        let dir = workspace_dir();
        std::fs::write(dir.path().join("note.md"), "Seen today.\n").unwrap();
        let workspace = Workspace::open(dir.path()).unwrap();
        assert_eq!(workspace.session.editor_text, "Seen today.\n");
        assert_eq!(workspace.session.active_topic_id, "uti");
        assert!(!workspace.session.editor_history.can_undo());
        assert!(workspace.section("plan").is_ok());
        assert!(matches!(workspace.section("nope"), Err(Error::UnknownSection { .. })));
    }
}
