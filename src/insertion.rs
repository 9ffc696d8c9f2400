//! Refresh-else-recreate insertion of composed sections into the note.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::anchor::{
    DetachReason, EditorAnchor, Provenance, RefreshStatus, append_anchored, insert_anchored_at_cursor,
    refresh_anchored_block,
};
use crate::composer::ComposedSection;
use crate::session::SessionState;
use crate::types::Selection;

/// Where a fresh block goes when there is nothing to refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertMode {
    /// After the end of the note.
    Append,
    /// Over the current selection, when one is known.
    Cursor,
}

/// A request to write one composed section into the note.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InsertSectionIntent {
    /// Composed content.
    pub content: String,
    /// Placement for a fresh block.
    pub mode: InsertMode,
    /// Section id, also the anchor key.
    pub section_id: String,
    /// Heading recorded on the anchor.
    pub section_title: String,
    /// Data source recorded on the anchor.
    pub source: String,
}

/// Outcome of [`upsert_linked_section`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InsertSectionResult {
    /// Anchor to store for the section.
    pub anchor: EditorAnchor,
    /// Cursor offset after a cursor insertion; `None` for refreshes and appends.
    pub next_cursor: Option<usize>,
    /// Note after the write.
    pub next_text: String,
    /// Whether an existing block was refreshed rather than a new one written.
    pub updated_existing: bool,
}

/// Tally of one [`sync_linked_sections`] pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SyncCounts {
    /// Anchors skipped or newly found edited.
    pub detached: usize,
    /// Linked sections whose content is now empty; their blocks are kept.
    pub empty: usize,
    /// Anchors whose block is gone.
    pub missing: usize,
    /// Sections without an anchor.
    pub not_linked: usize,
    /// Blocks already holding their composed content.
    pub unchanged: usize,
    /// Blocks rewritten.
    pub updated: usize,
}

/// Result of refreshing every linked section at once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncOutcome {
    /// Anchors to store, one per linked section visited.
    pub anchors: Vec<EditorAnchor>,
    /// What happened to each section.
    pub counts: SyncCounts,
    /// Note after all refreshes.
    pub next_text: String,
}

/// Refresh every attached anchor with its section's current content.
///
/// Detached anchors are counted by why they detached and left alone;
/// sections that compose to nothing keep their old block. Nothing new is
/// inserted.
pub fn sync_linked_sections(state: &SessionState, sections: &[ComposedSection]) -> SyncOutcome {
    let mut counts = SyncCounts::default();
    let mut anchors = Vec::new();
    let mut next_text = state.editor_text.clone();

    for section in sections {
        let Some(anchor) = state.editor_anchors.get(&section.id) else {
            counts.not_linked = counts.not_linked.saturating_add(1);
            continue;
        };
        if anchor.detached {
            let tally = match anchor.detach_reason {
                Some(DetachReason::Missing) => &mut counts.missing,
                Some(DetachReason::Modified) | None => &mut counts.detached,
            };
            *tally = tally.saturating_add(1);
            continue;
        }
        if section.content.trim().is_empty() {
            counts.empty = counts.empty.saturating_add(1);
            continue;
        }

        let refreshed = refresh_anchored_block(&next_text, anchor, &section.content);
        let tally = match refreshed.status {
            RefreshStatus::Detached => &mut counts.detached,
            RefreshStatus::Missing => &mut counts.missing,
            RefreshStatus::Unchanged => &mut counts.unchanged,
            RefreshStatus::Updated => &mut counts.updated,
        };
        *tally = tally.saturating_add(1);
        next_text = refreshed.next_text;
        anchors.push(refreshed.anchor);
    }

    tracing::debug!(?counts, "linked sections synced");
    return SyncOutcome { anchors, counts, next_text };
}

/// Write `intent` into the note.
///
/// Blank content is a no-op. An attached anchor whose block is unedited is
/// refreshed in place; anything else gets a fresh block, appended or placed
/// at `selection` depending on the mode. `now` is recorded as the link time.
pub fn upsert_linked_section(
    state: &SessionState,
    intent: &InsertSectionIntent,
    selection: Option<Selection>,
    now: DateTime<Utc>,
) -> Option<InsertSectionResult> {
    if intent.content.trim().is_empty() {
        return None;
    }

    if let Some(existing) = state.editor_anchors.get(&intent.section_id)
        && !existing.detached
    {
        let refreshed = refresh_anchored_block(&state.editor_text, existing, &intent.content);
        if refreshed.updated {
            tracing::debug!(section_id = %intent.section_id, status = ?refreshed.status, "refreshed linked section");
            return Some(InsertSectionResult {
                anchor: refreshed.anchor,
                next_cursor: None,
                next_text: refreshed.next_text,
                updated_existing: true,
            });
        }
    }

    let provenance = Provenance {
        linked_at: now,
        section_title: Some(intent.section_title.clone()),
        source: Some(intent.source.clone()),
    };

    return match (intent.mode, selection) {
        (InsertMode::Cursor, Some(selection)) => {
            let inserted = insert_anchored_at_cursor(
                &state.editor_text,
                &intent.section_id,
                &intent.content,
                selection,
                &provenance,
            );
            Some(InsertSectionResult {
                anchor: inserted.anchor,
                next_cursor: Some(inserted.next_cursor),
                next_text: inserted.next_text,
                updated_existing: false,
            })
        },
        (InsertMode::Append | InsertMode::Cursor, _) => {
            let appended = append_anchored(&state.editor_text, &intent.section_id, &intent.content, &provenance);
            Some(InsertSectionResult {
                anchor: appended.anchor,
                next_cursor: None,
                next_text: appended.next_text,
                updated_existing: false,
            })
        },
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{SessionAction, reduce};

    fn intent(content: &str, mode: InsertMode) -> InsertSectionIntent {
        return InsertSectionIntent {
            content: content.to_string(),
            mode,
            section_id: "assessment".to_string(),
            section_title: "Assessment".to_string(),
            source: "structured".to_string(),
        };
    }

    fn commit(state: SessionState, result: InsertSectionResult) -> SessionState {
        return reduce(state, SessionAction::CommitLinkedSection { anchor: result.anchor, text: result.next_text });
    }

    fn section(id: &str, content: &str) -> ComposedSection {
        return ComposedSection {
            content: content.to_string(),
            id: id.to_string(),
            included: true,
            source: crate::topic::SectionSource::Structured,
            title: String::new(),
        };
    }

    fn with_text(text: &str) -> SessionState {
        return reduce(SessionState::default(), SessionAction::SetEditorText { text: text.to_string() });
    }

    #[test]
    fn blank_content_is_a_no_op() {
        let state = with_text("ab");
        assert!(upsert_linked_section(&state, &intent("  \n", InsertMode::Append), None, Utc::now()).is_none());
    }

    #[test]
    fn insert_then_refresh_in_place() {
        let state = with_text("ab");
        let first = upsert_linked_section(
            &state,
            &intent("X", InsertMode::Cursor),
            Some(Selection::cursor(1)),
            Utc::now(),
        )
        .unwrap();
        assert_eq!(first.next_text, "aX\nb");
        assert_eq!(first.next_cursor, Some(3));
        assert!(!first.updated_existing);
        let state = commit(state, first);

        let second = upsert_linked_section(
            &state,
            &intent("Y", InsertMode::Cursor),
            Some(Selection::cursor(0)),
            Utc::now(),
        )
        .unwrap();
        assert!(second.updated_existing);
        assert_eq!(second.next_cursor, None);
        assert!(second.next_text.contains('Y'));
        assert!(!second.next_text.contains('X'));
        assert_eq!(second.next_text, "aY\nb");
    }

    #[test]
    fn cursor_mode_without_selection_appends() {
        let state = with_text("Intro");
        let result = upsert_linked_section(&state, &intent("Plan", InsertMode::Cursor), None, Utc::now()).unwrap();
        assert_eq!(result.next_text, "Intro\n\nPlan\n");
        assert_eq!(result.next_cursor, None);
    }

    #[test]
    fn edited_block_is_never_overwritten() {
        let state = with_text("Intro");
        let first = upsert_linked_section(&state, &intent("Review in clinic\nSafety net given", InsertMode::Append), None, Utc::now())
            .unwrap();
        let state = commit(state, first);
        let edited = state.editor_text.replace("clinic", "ED");
        let state = reduce(state, SessionAction::SetEditorTextWithHistory { text: edited.clone() });
        assert!(state.editor_anchors.get("assessment").unwrap().detached);

        let second =
            upsert_linked_section(&state, &intent("Discharge", InsertMode::Append), None, Utc::now()).unwrap();
        assert!(!second.updated_existing);
        assert!(second.next_text.starts_with(&edited));
        assert!(second.next_text.ends_with("Discharge\n"));
        assert!(!second.anchor.detached);
    }

    #[test]
    fn sync_refreshes_attached_and_counts_the_rest() {
        let state = with_text("Intro");
        let first = upsert_linked_section(&state, &intent("Plan A", InsertMode::Append), None, Utc::now()).unwrap();
        let state = commit(state, first);

        let sections = vec![
            ComposedSection {
                content: "Plan B".to_string(),
                id: "assessment".to_string(),
                included: true,
                source: crate::topic::SectionSource::Structured,
                title: "Assessment".to_string(),
            },
            ComposedSection {
                content: "Unused".to_string(),
                id: "notes".to_string(),
                included: true,
                source: crate::topic::SectionSource::Editor,
                title: "Notes".to_string(),
            },
        ];
        let outcome = sync_linked_sections(&state, &sections);
        assert_eq!(outcome.next_text, "Intro\n\nPlan B\n");
        assert_eq!(outcome.counts, SyncCounts { not_linked: 1, updated: 1, ..SyncCounts::default() });
        assert_eq!(outcome.anchors.len(), 1);

        let state = reduce(state, SessionAction::SetEditorTextWithHistory { text: "Intro\n".to_string() });
        let outcome = sync_linked_sections(&state, &sections);
        assert_eq!(outcome.counts, SyncCounts { missing: 1, not_linked: 1, ..SyncCounts::default() });
        assert_eq!(outcome.next_text, "Intro\n");
    }

    #[test]
    fn sync_counts_edited_blocks_as_detached() {
        let state = with_text("Intro");
        let first =
            upsert_linked_section(&state, &intent("Review in clinic\nSafety net given", InsertMode::Append), None, Utc::now())
                .unwrap();
        let state = commit(state, first);
        let edited = state.editor_text.replace("clinic", "ED");
        let state = reduce(state, SessionAction::SetEditorTextWithHistory { text: edited.clone() });

        let outcome = sync_linked_sections(&state, &[section("assessment", "Discharge")]);
        assert_eq!(outcome.counts, SyncCounts { detached: 1, ..SyncCounts::default() });
        assert_eq!(outcome.next_text, edited);
    }

    #[test]
    fn emptied_section_keeps_its_block_and_anchor() {
        let state = with_text("Intro line\n\nOther para");
        let first = upsert_linked_section(
            &state,
            &intent("Duration: 3 days", InsertMode::Cursor),
            Some(Selection::cursor(11)),
            Utc::now(),
        )
        .unwrap();
        let state = commit(state, first);
        let linked = state.editor_text.clone();
        assert_eq!(linked, "Intro line\nDuration: 3 days\n\nOther para");

        let outcome = sync_linked_sections(&state, &[section("assessment", "")]);
        assert_eq!(outcome.counts, SyncCounts { empty: 1, ..SyncCounts::default() });
        assert_eq!(outcome.next_text, linked);
        assert!(outcome.anchors.is_empty());

        // Typing above the block and answering again still refreshes the block itself.
        let state = reduce(state, SessionAction::SetEditorTextWithHistory { text: format!("Added\n{linked}") });
        let outcome = sync_linked_sections(&state, &[section("assessment", "Duration: 5 days")]);
        assert_eq!(outcome.next_text, "Added\nIntro line\nDuration: 5 days\n\nOther para");
        assert_eq!(outcome.counts, SyncCounts { updated: 1, ..SyncCounts::default() });
        assert_eq!(outcome.anchors.first().unwrap().linked_text, "Duration: 5 days\n");
    }

    #[test]
    fn unchanged_content_reports_update_without_change() {
        let state = with_text("");
        let first = upsert_linked_section(&state, &intent("Plan", InsertMode::Append), None, Utc::now()).unwrap();
        let state = commit(state, first);
        let again = upsert_linked_section(&state, &intent("Plan", InsertMode::Append), None, Utc::now()).unwrap();
        assert!(again.updated_existing);
        assert_eq!(again.next_text, state.editor_text);
    }
}
