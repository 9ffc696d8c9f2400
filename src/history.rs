//! Whole-note undo/redo.
//!
//! Snapshots are complete copies of the note, not diffs. Anchor state is
//! deliberately not part of a snapshot; the session recomputes it after
//! every transition.

use serde::{Deserialize, Serialize};

/// Default number of snapshots kept on each stack.
pub const DEFAULT_HISTORY_LIMIT: usize = 50;

/// Two bounded stacks of note snapshots.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EditorHistory {
    /// Snapshots to redo, nearest first.
    #[serde(default)]
    pub future: Vec<String>,
    /// Snapshots to undo, oldest first.
    #[serde(default)]
    pub past: Vec<String>,
}

impl EditorHistory {
    /// Whether there is anything to redo.
    pub const fn can_redo(&self) -> bool {
        return !self.future.is_empty();
    }

    /// Whether there is anything to undo.
    pub const fn can_undo(&self) -> bool {
        return !self.past.is_empty();
    }

    /// Record `previous` before a new edit. Clears the redo stack and drops
    /// the oldest snapshots beyond `limit`.
    pub fn record(&mut self, previous: String, limit: usize) {
        self.past.push(previous);
        trim_oldest(&mut self.past, limit);
        self.future.clear();
        return;
    }

    /// Step forward: returns the note to restore and stacks `current` for undo.
    pub fn redo(&mut self, current: String, limit: usize) -> Option<String> {
        if self.future.is_empty() {
            return None;
        }
        let next = self.future.remove(0);
        self.past.push(current);
        trim_oldest(&mut self.past, limit);
        return Some(next);
    }

    /// Step back: returns the note to restore and stacks `current` for redo.
    pub fn undo(&mut self, current: String, limit: usize) -> Option<String> {
        let previous = self.past.pop()?;
        self.future.insert(0, current);
        self.future.truncate(limit);
        return Some(previous);
    }
}

/// Keep only the newest `limit` entries of an oldest-first stack.
fn trim_oldest(stack: &mut Vec<String>, limit: usize) {
    let excess = stack.len().saturating_sub(limit);
    if excess > 0 {
        stack.drain(..excess);
    }
    return;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn undo_then_redo_round_trips() {
        let mut history = EditorHistory::default();
        history.record("a".to_string(), DEFAULT_HISTORY_LIMIT);
        history.record("ab".to_string(), DEFAULT_HISTORY_LIMIT);

        assert_eq!(history.undo("abc".to_string(), DEFAULT_HISTORY_LIMIT), Some("ab".to_string()));
        assert_eq!(history.undo("ab".to_string(), DEFAULT_HISTORY_LIMIT), Some("a".to_string()));
        assert_eq!(history.undo("a".to_string(), DEFAULT_HISTORY_LIMIT), None);

        assert_eq!(history.redo("a".to_string(), DEFAULT_HISTORY_LIMIT), Some("ab".to_string()));
        assert_eq!(history.redo("ab".to_string(), DEFAULT_HISTORY_LIMIT), Some("abc".to_string()));
        assert!(!history.can_redo());
    }

    #[test]
    fn new_edit_clears_redo() {
        let mut history = EditorHistory::default();
        history.record("a".to_string(), 10);
        let _ = history.undo("ab".to_string(), 10);
        assert!(history.can_redo());
        history.record("a".to_string(), 10);
        assert!(!history.can_redo());
    }

    #[test]
    fn depth_is_capped() {
        let mut history = EditorHistory::default();
        for i in 0..60 {
            history.record(format!("v{i}"), DEFAULT_HISTORY_LIMIT);
        }
        assert_eq!(history.past.len(), DEFAULT_HISTORY_LIMIT);
        assert_eq!(history.past.first().map(String::as_str), Some("v10"));
    }
}
