//! Linked blocks inside the free-text note.
//!
//! A section inserted into the note is remembered by an [`EditorAnchor`]: the
//! exact text written (content plus one trailing newline), its fingerprint,
//! and the offset it was last seen at. There are no markers in the note, so
//! the block is found again purely by text search, preferring the occurrence
//! closest to the last known offset. If the same block text appears twice the
//! closer one wins even when it is the wrong one; that is an accepted limit of
//! text-only storage.
//!
//! Every function here is pure: it takes the note and returns a new note.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::hasher::{BlockHash, hash_block};
use crate::types::{LinkState, Selection};

/// Boundary lines shorter than this are too generic to prove a block was
/// edited rather than deleted.
const MIN_BOUNDARY_CHARS: usize = 4;

/// Three or more consecutive newlines.
#[allow(clippy::expect_used, reason = "literal pattern, checked by tests")]
static BLANK_RUN: LazyLock<Regex> = LazyLock::new(|| return Regex::new(r"\n{3,}").expect("valid blank-run regex"));

/// Result of re-validating an anchor against the current note.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnchorCheck {
    /// Block found unedited at `start`.
    Clean {
        /// Byte offset of the block.
        start: usize,
    },
    /// Block is gone and nothing recognisable is left of it.
    Missing,
    /// Block was edited: a recognisable remnant is still in the note.
    Modified,
}

/// Where a located block sits in the note. `end` is exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnchorMatch {
    /// Exclusive end offset.
    pub end: usize,
    /// Start offset.
    pub start: usize,
}

/// Result of an anchored insert or append.
#[derive(Debug, Clone, PartialEq)]
pub struct AnchoredInsertion {
    /// Anchor recording the new block.
    pub anchor: EditorAnchor,
    /// Offset just after the inserted block.
    pub next_cursor: usize,
    /// Note with the block written in.
    pub next_text: String,
}

/// Why an anchor stopped tracking its block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetachReason {
    /// No trace of the block is left.
    Missing,
    /// The block was edited by hand.
    Modified,
}

/// Binding between a composed section and one block of the note.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EditorAnchor {
    /// Set once the block is known to be edited or gone.
    pub detached: bool,
    /// Why the anchor is detached; `None` while attached.
    #[serde(default)]
    pub detach_reason: Option<DetachReason>,
    /// Fingerprint of `linked_text`.
    pub last_hash: BlockHash,
    /// Byte offset the block was last seen at. Only a search hint.
    pub last_known_index: usize,
    /// When the block was first linked.
    pub linked_at: DateTime<Utc>,
    /// Exact block text last written, always newline-terminated.
    pub linked_text: String,
    /// Section this block was composed from.
    pub section_id: String,
    /// Section heading at link time.
    #[serde(default)]
    pub section_title: Option<String>,
    /// Section source kind at link time.
    #[serde(default)]
    pub source: Option<String>,
}

impl EditorAnchor {
    /// Copy of this anchor marked detached for `reason`.
    fn detach(&self, reason: DetachReason) -> Self {
        return Self { detached: true, detach_reason: Some(reason), ..self.clone() };
    }

    /// Anchor for `linked_text` written at `start`.
    fn link(section_id: &str, linked_text: String, start: usize, provenance: &Provenance) -> Self {
        return Self {
            detached: false,
            detach_reason: None,
            last_hash: hash_block(&linked_text),
            last_known_index: start,
            linked_at: provenance.linked_at,
            linked_text,
            section_id: section_id.to_string(),
            section_title: provenance.section_title.clone(),
            source: provenance.source.clone(),
        };
    }
}

/// Result of a plain (unlinked) insertion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Insertion {
    /// Offset the inserted text starts at.
    pub inserted_at: usize,
    /// Offset just after the inserted text.
    pub next_cursor: usize,
    /// Note with the text written in.
    pub next_text: String,
}

/// Descriptive metadata recorded on a new anchor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Provenance {
    /// Link time.
    pub linked_at: DateTime<Utc>,
    /// Section heading.
    pub section_title: Option<String>,
    /// Section source kind.
    pub source: Option<String>,
}

/// Result of [`refresh_anchored_block`].
#[derive(Debug, Clone, PartialEq)]
pub struct Refresh {
    /// Anchor after the refresh attempt.
    pub anchor: EditorAnchor,
    /// Note after the refresh attempt; untouched unless `status` is `Updated`.
    pub next_text: String,
    /// What happened.
    pub status: RefreshStatus,
    /// True for `Updated` and `Unchanged`: the link is still live.
    pub updated: bool,
}

/// Outcome of a refresh attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshStatus {
    /// Anchor was already detached, or the block was edited by hand.
    Detached,
    /// Block could not be found.
    Missing,
    /// Block already holds the new content.
    Unchanged,
    /// Block was rewritten in place.
    Updated,
}

/// Write `content` after the end of the note, separated by a blank line
/// when the note has any non-whitespace text.
pub fn append_anchored(text: &str, section_id: &str, content: &str, provenance: &Provenance) -> AnchoredInsertion {
    let linked_text = normalize_linked_text(content);
    let spacer = match text {
        t if t.trim().is_empty() => "",
        t if t.ends_with('\n') => "\n",
        _ => "\n\n",
    };
    let start = text.len().saturating_add(spacer.len());
    let next_text = format!("{text}{spacer}{linked_text}");
    let next_cursor = next_text.len();
    tracing::debug!(section_id, start, "appended linked block");
    return AnchoredInsertion {
        anchor: EditorAnchor::link(section_id, linked_text, start, provenance),
        next_cursor,
        next_text,
    };
}

/// Re-validate `anchor` against `text`.
pub fn check_anchor(text: &str, anchor: &EditorAnchor) -> AnchorCheck {
    if let Some(found) = find_anchor_match(text, anchor) {
        let body = text.get(found.start..found.end).unwrap_or_default();
        if hash_block(body) == anchor.last_hash {
            return AnchorCheck::Clean { start: found.start };
        }
        return AnchorCheck::Modified;
    }
    if has_surviving_boundary(text, &anchor.linked_text) {
        return AnchorCheck::Modified;
    }
    return AnchorCheck::Missing;
}

/// Collapse runs of three or more newlines to a single blank line.
pub fn collapse_blank_runs(text: &str) -> String {
    return BLANK_RUN.replace_all(text, "\n\n").into_owned();
}

/// Link state of a section given its anchor, if any.
pub fn derive_link_state(text: &str, anchor: Option<&EditorAnchor>) -> LinkState {
    let Some(anchor) = anchor else {
        return LinkState::NotLinked;
    };
    if anchor.detached {
        return match anchor.detach_reason {
            Some(DetachReason::Missing) => LinkState::LinkedMissing,
            Some(DetachReason::Modified) | None => LinkState::LinkedModified,
        };
    }
    return match check_anchor(text, anchor) {
        AnchorCheck::Clean { .. } => LinkState::LinkedClean,
        AnchorCheck::Missing => LinkState::LinkedMissing,
        AnchorCheck::Modified => LinkState::LinkedModified,
    };
}

/// Ids of currently attached anchors whose block no longer checks clean.
pub fn detached_anchor_ids(text: &str, anchors: &BTreeMap<String, EditorAnchor>) -> Vec<String> {
    return anchors
        .iter()
        .filter(|(_, anchor)| return !anchor.detached)
        .filter(|(_, anchor)| return !matches!(check_anchor(text, anchor), AnchorCheck::Clean { .. }))
        .map(|(id, _)| return id.clone())
        .collect();
}

/// Locate the anchored block in `text`.
///
/// Tries the last known offset first, then every exact occurrence, picking
/// the one closest to the last known offset (lowest offset on a tie).
pub fn find_anchor_match(text: &str, anchor: &EditorAnchor) -> Option<AnchorMatch> {
    let needle = anchor.linked_text.as_str();
    if needle.is_empty() {
        return None;
    }

    let hint = anchor.last_known_index;
    if let Some(end) = hint.checked_add(needle.len())
        && text.get(hint..end) == Some(needle)
    {
        return Some(AnchorMatch { end, start: hint });
    }

    let start = text
        .match_indices(needle)
        .map(|(idx, _)| return idx)
        .min_by_key(|idx| return (idx.abs_diff(hint), *idx))?;
    tracing::debug!(section_id = %anchor.section_id, hint, start, "anchor relocated");
    return Some(AnchorMatch { end: start.saturating_add(needle.len()), start });
}

/// Whether the first or last line of a vanished block is still in the note.
fn has_surviving_boundary(text: &str, linked_text: &str) -> bool {
    let mut lines = linked_text.lines().filter(|line| return line.trim().chars().count() >= MIN_BOUNDARY_CHARS);
    let first = lines.next();
    let last = lines.next_back();
    return [first, last].into_iter().flatten().any(|line| return text.contains(line));
}

/// Write `content` as a linked block over the selection.
pub fn insert_anchored_at_cursor(
    text: &str,
    section_id: &str,
    content: &str,
    selection: Selection,
    provenance: &Provenance,
) -> AnchoredInsertion {
    let linked_text = normalize_linked_text(content);
    let inserted = insert_text_at_cursor(text, &linked_text, selection);
    tracing::debug!(section_id, start = inserted.inserted_at, "inserted linked block");
    return AnchoredInsertion {
        anchor: EditorAnchor::link(section_id, linked_text, inserted.inserted_at, provenance),
        next_cursor: inserted.next_cursor,
        next_text: inserted.next_text,
    };
}

/// Replace the selection with `insert`. Out-of-range or mid-character
/// offsets are clamped first.
pub fn insert_text_at_cursor(text: &str, insert: &str, selection: Selection) -> Insertion {
    let selection = selection.clamp_to(text);
    let before = text.get(..selection.start).unwrap_or_default();
    let after = text.get(selection.end..).unwrap_or_default();
    return Insertion {
        inserted_at: before.len(),
        next_cursor: before.len().saturating_add(insert.len()),
        next_text: format!("{before}{insert}{after}"),
    };
}

/// Section content as it is written into the note: exactly one trailing
/// newline is guaranteed.
pub fn normalize_linked_text(content: &str) -> String {
    if content.ends_with('\n') {
        return content.to_string();
    }
    return format!("{content}\n");
}

/// Re-validate every anchor after the note was replaced.
///
/// Detached anchors are re-checked too: an undo that restores a block
/// re-attaches its anchor.
pub fn recompute_anchor_states(
    text: &str,
    anchors: &BTreeMap<String, EditorAnchor>,
) -> BTreeMap<String, EditorAnchor> {
    return anchors
        .iter()
        .map(|(id, anchor)| {
            let next = match check_anchor(text, anchor) {
                AnchorCheck::Clean { start } => EditorAnchor {
                    detached: false,
                    detach_reason: None,
                    last_known_index: start,
                    ..anchor.clone()
                },
                AnchorCheck::Missing => anchor.detach(DetachReason::Missing),
                AnchorCheck::Modified => anchor.detach(DetachReason::Modified),
            };
            if next.detached && !anchor.detached {
                tracing::debug!(section_id = %id, reason = ?next.detach_reason, "anchor detached");
            }
            return (id.clone(), next);
        })
        .collect();
}

/// Rewrite an attached block with freshly composed content.
///
/// Never touches the note unless the block is found unedited. Blank content
/// leaves both the note and the anchor as they are: a block is never
/// shrunk to a bare newline.
pub fn refresh_anchored_block(text: &str, anchor: &EditorAnchor, new_content: &str) -> Refresh {
    let unchanged_note = |anchor: EditorAnchor, status: RefreshStatus| {
        return Refresh { anchor, next_text: text.to_string(), status, updated: false };
    };

    if anchor.detached {
        return unchanged_note(anchor.clone(), RefreshStatus::Detached);
    }
    if new_content.trim().is_empty() {
        tracing::debug!(section_id = %anchor.section_id, "refresh skipped, section is empty");
        return Refresh {
            anchor: anchor.clone(),
            next_text: text.to_string(),
            status: RefreshStatus::Unchanged,
            updated: true,
        };
    }

    let found = match check_anchor(text, anchor) {
        AnchorCheck::Clean { start } => AnchorMatch { end: start.saturating_add(anchor.linked_text.len()), start },
        AnchorCheck::Missing => {
            tracing::debug!(section_id = %anchor.section_id, "refresh found no block");
            return unchanged_note(anchor.detach(DetachReason::Missing), RefreshStatus::Missing);
        },
        AnchorCheck::Modified => {
            tracing::debug!(section_id = %anchor.section_id, "refresh found an edited block");
            return unchanged_note(anchor.detach(DetachReason::Modified), RefreshStatus::Detached);
        },
    };

    let linked_text = normalize_linked_text(new_content);
    let refreshed = EditorAnchor {
        last_hash: hash_block(&linked_text),
        last_known_index: found.start,
        linked_text: linked_text.clone(),
        ..anchor.clone()
    };

    if text.get(found.start..found.end) == Some(linked_text.as_str()) {
        return Refresh { anchor: refreshed, next_text: text.to_string(), status: RefreshStatus::Unchanged, updated: true };
    }

    let before = text.get(..found.start).unwrap_or_default();
    let after = text.get(found.end..).unwrap_or_default();
    return Refresh {
        anchor: refreshed,
        next_text: format!("{before}{linked_text}{after}"),
        status: RefreshStatus::Updated,
        updated: true,
    };
}

/// Delete the anchored block, then collapse any blank-line runs left behind.
/// Returns the note untouched if the block cannot be found.
pub fn remove_anchored_block(text: &str, anchor: &EditorAnchor) -> String {
    let Some(found) = find_anchor_match(text, anchor) else {
        return text.to_string();
    };
    let before = text.get(..found.start).unwrap_or_default();
    let after = text.get(found.end..).unwrap_or_default();
    return collapse_blank_runs(&format!("{before}{after}"));
}
