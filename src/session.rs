//! Consultation session state and its single-writer reducer.
//!
//! Every change goes through [`reduce`]: one action in, one new state out.
//! Whenever the note is replaced (typing, undo, redo, a linked insertion, an
//! external write) every anchor is re-validated before the new state is
//! returned, so composed link states can always be trusted.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::anchor::{DetachReason, EditorAnchor, recompute_anchor_states};
use crate::history::{DEFAULT_HISTORY_LIMIT, EditorHistory};
use crate::types::FieldValue;

/// Working differential plus the evidence assigned to each diagnosis.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DdxState {
    /// Findings against a diagnosis, in assignment order.
    #[serde(default)]
    pub evidence_against: Vec<EvidenceEntry>,
    /// Findings supporting a diagnosis, in assignment order.
    #[serde(default)]
    pub evidence_for: Vec<EvidenceEntry>,
    /// Clinician-ordered candidate diagnoses.
    #[serde(default)]
    pub working_diagnoses: Vec<WorkingDiagnosis>,
}

/// Findings attached to one diagnosis on one side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvidenceEntry {
    /// Diagnosis name.
    pub diagnosis: String,
    /// Findings, never empty while stored.
    pub items: Vec<String>,
}

/// Which side of the argument a finding sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvidenceSide {
    /// Argues against the diagnosis.
    Against,
    /// Supports the diagnosis.
    For,
}

/// Everything a consultation session can be asked to do.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionAction {
    /// Add a free-text diagnosis (trimmed; blank or duplicate names ignored).
    AddCustomDiagnosis {
        /// Diagnosis name.
        name: String,
    },
    /// Seed structured answers without overwriting anything already answered.
    ApplyStructuredDefaults {
        /// Default answers by field id.
        values: BTreeMap<String, FieldValue>,
    },
    /// Select or deselect a finding for a diagnosis. Selecting on one side
    /// removes it from the other.
    AssignEvidence {
        /// Diagnosis name.
        diagnosis: String,
        /// Finding text.
        item: String,
        /// Add (`true`) or remove (`false`).
        selected: bool,
        /// Side to assign to.
        side: EvidenceSide,
    },
    /// Replace the note and record a linked block in one step.
    CommitLinkedSection {
        /// Anchor for the written block.
        anchor: EditorAnchor,
        /// Note containing the block.
        text: String,
    },
    /// Flag an anchor as broken without touching the note. A reason already
    /// recorded is kept; otherwise the block counts as edited.
    MarkAnchorDetached {
        /// Section whose anchor to detach.
        section_id: String,
    },
    /// Step forward in note history.
    RedoEditorText,
    /// Drop a diagnosis and its evidence.
    RemoveDiagnosis {
        /// Diagnosis name.
        name: String,
    },
    /// Forget an anchor. The note is untouched.
    RemoveEditorAnchor {
        /// Section whose anchor to drop.
        section_id: String,
    },
    /// Move a diagnosis within the working list. Out-of-range or identical
    /// indices are ignored.
    ReorderDiagnosis {
        /// Current index.
        from: usize,
        /// Target index.
        to: usize,
    },
    /// Clear the session but stay on the same topic.
    ResetSession,
    /// Record or replace an anchor.
    SetEditorAnchor {
        /// The anchor, keyed by its own section id.
        anchor: EditorAnchor,
    },
    /// Replace the note without history; clears undo and redo.
    SetEditorText {
        /// New note.
        text: String,
    },
    /// Replace the note, recording the previous one for undo.
    SetEditorTextWithHistory {
        /// New note.
        text: String,
    },
    /// Set (`Some`) or clear (`None`) a hand-written export text.
    SetExportOverride {
        /// Override text.
        text: Option<String>,
    },
    /// Make one diagnosis the only primary.
    SetPrimaryDiagnosis {
        /// Diagnosis name.
        name: String,
    },
    /// Record one structured answer.
    SetStructuredResponse {
        /// Field id.
        field_id: String,
        /// Answer.
        value: FieldValue,
    },
    /// Switch topic. Switching to a different topic clears all session state.
    SetTopic {
        /// New topic id.
        topic_id: String,
    },
    /// Add a diagnosis if absent, remove it (and its evidence) if present.
    ToggleDiagnosis {
        /// Diagnosis name.
        name: String,
    },
    /// Flip one red-flag confirmation (`rf-<index>`).
    ToggleRedFlag {
        /// Checklist key.
        flag_id: String,
    },
    /// Flip whether a section goes into the composed output.
    ToggleSectionInclusion {
        /// Used when the user has not toggled this section before.
        include_by_default: bool,
        /// Section id.
        section_id: String,
    },
    /// Step back in note history.
    UndoEditorText,
}

/// All session-scoped state for one consultation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionState {
    /// Topic the session was started on.
    #[serde(default)]
    pub active_topic_id: String,
    /// Differential diagnosis work.
    #[serde(default)]
    pub ddx: DdxState,
    /// Linked blocks keyed by section id.
    #[serde(default)]
    pub editor_anchors: BTreeMap<String, EditorAnchor>,
    /// Undo/redo snapshots of the note.
    #[serde(default)]
    pub editor_history: EditorHistory,
    /// The note as last seen.
    #[serde(default)]
    pub editor_text: String,
    /// Hand-written export text that replaces the composed output.
    #[serde(default)]
    pub export_override: Option<String>,
    /// Undo/redo depth. Comes from configuration, not persisted.
    #[serde(skip, default = "default_history_limit")]
    pub history_limit: usize,
    /// Red-flag confirmations keyed `rf-<index>`.
    #[serde(default)]
    pub red_flags_confirmed: BTreeMap<String, bool>,
    /// User inclusion toggles keyed by section id.
    #[serde(default)]
    pub section_inclusions: BTreeMap<String, bool>,
    /// Structured answers keyed by field id.
    #[serde(default)]
    pub structured_responses: BTreeMap<String, FieldValue>,
}

impl Default for SessionState {
    fn default() -> Self {
        return Self {
            active_topic_id: String::new(),
            ddx: DdxState::default(),
            editor_anchors: BTreeMap::new(),
            editor_history: EditorHistory::default(),
            editor_text: String::new(),
            export_override: None,
            history_limit: DEFAULT_HISTORY_LIMIT,
            red_flags_confirmed: BTreeMap::new(),
            section_inclusions: BTreeMap::new(),
            structured_responses: BTreeMap::new(),
        };
    }
}

impl SessionState {
    /// Fresh session for a topic.
    pub fn for_topic(topic_id: &str, history_limit: usize) -> Self {
        return Self { active_topic_id: topic_id.to_string(), history_limit, ..Self::default() };
    }

    /// Whether a section is currently included in the composed output.
    pub fn is_included(&self, section_id: &str, include_by_default: bool) -> bool {
        return self.section_inclusions.get(section_id).copied().unwrap_or(include_by_default);
    }
}

/// A diagnosis on the working list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkingDiagnosis {
    /// Marked as the leading diagnosis.
    #[serde(default)]
    pub is_primary: bool,
    /// Diagnosis name, unique within the list.
    pub name: String,
}

/// Serde default for the skipped history limit.
const fn default_history_limit() -> usize {
    return DEFAULT_HISTORY_LIMIT;
}

/// Drop a diagnosis from the list and from both evidence sides.
fn drop_diagnosis(mut ddx: DdxState, name: &str) -> DdxState {
    ddx.working_diagnoses.retain(|d| return d.name != name);
    ddx.evidence_for.retain(|e| return e.diagnosis != name);
    ddx.evidence_against.retain(|e| return e.diagnosis != name);
    return ddx;
}

/// Apply one action and return the next state.
pub fn reduce(state: SessionState, action: SessionAction) -> SessionState {
    return match action {
        SessionAction::AddCustomDiagnosis { name } => {
            let name = name.trim();
            if name.is_empty() || state.ddx.working_diagnoses.iter().any(|d| return d.name == name) {
                return state;
            }
            let mut ddx = state.ddx.clone();
            ddx.working_diagnoses.push(WorkingDiagnosis { is_primary: false, name: name.to_string() });
            SessionState { ddx, ..state }
        },
        SessionAction::ApplyStructuredDefaults { values } => {
            let mut structured_responses = values;
            structured_responses.extend(state.structured_responses.clone());
            SessionState { structured_responses, ..state }
        },
        SessionAction::AssignEvidence { diagnosis, item, selected, side } => {
            let mut ddx = state.ddx.clone();
            let (target_selected, other_selected) = match side {
                EvidenceSide::Against => (false, selected),
                EvidenceSide::For => (selected, false),
            };
            ddx.evidence_for = upsert_evidence(ddx.evidence_for, &diagnosis, &item, target_selected);
            ddx.evidence_against = upsert_evidence(ddx.evidence_against, &diagnosis, &item, other_selected);
            SessionState { ddx, ..state }
        },
        SessionAction::CommitLinkedSection { anchor, text } => {
            let mut next = set_editor_text(state, text, true);
            next.editor_anchors.insert(anchor.section_id.clone(), anchor);
            next
        },
        SessionAction::MarkAnchorDetached { section_id } => {
            let mut editor_anchors = state.editor_anchors.clone();
            let Some(anchor) = editor_anchors.get_mut(&section_id) else {
                return state;
            };
            anchor.detached = true;
            anchor.detach_reason.get_or_insert(DetachReason::Modified);
            SessionState { editor_anchors, ..state }
        },
        SessionAction::RedoEditorText => {
            let mut editor_history = state.editor_history.clone();
            let Some(next_text) = editor_history.redo(state.editor_text.clone(), state.history_limit) else {
                return state;
            };
            let editor_anchors = recompute_anchor_states(&next_text, &state.editor_anchors);
            SessionState { editor_anchors, editor_history, editor_text: next_text, ..state }
        },
        SessionAction::RemoveDiagnosis { name } => {
            let ddx = drop_diagnosis(state.ddx.clone(), &name);
            SessionState { ddx, ..state }
        },
        SessionAction::RemoveEditorAnchor { section_id } => {
            let mut editor_anchors = state.editor_anchors.clone();
            editor_anchors.remove(&section_id);
            SessionState { editor_anchors, ..state }
        },
        SessionAction::ReorderDiagnosis { from, to } => {
            let len = state.ddx.working_diagnoses.len();
            if from >= len || to >= len || from == to {
                return state;
            }
            let mut ddx = state.ddx.clone();
            let moved = ddx.working_diagnoses.remove(from);
            ddx.working_diagnoses.insert(to, moved);
            SessionState { ddx, ..state }
        },
        SessionAction::ResetSession => SessionState::for_topic(&state.active_topic_id, state.history_limit),
        SessionAction::SetEditorAnchor { anchor } => {
            let mut editor_anchors = state.editor_anchors.clone();
            editor_anchors.insert(anchor.section_id.clone(), anchor);
            SessionState { editor_anchors, ..state }
        },
        SessionAction::SetEditorText { text } => set_editor_text(state, text, false),
        SessionAction::SetEditorTextWithHistory { text } => set_editor_text(state, text, true),
        SessionAction::SetExportOverride { text } => SessionState { export_override: text, ..state },
        SessionAction::SetPrimaryDiagnosis { name } => {
            let mut ddx = state.ddx.clone();
            for diagnosis in &mut ddx.working_diagnoses {
                diagnosis.is_primary = diagnosis.name == name;
            }
            SessionState { ddx, ..state }
        },
        SessionAction::SetStructuredResponse { field_id, value } => {
            let mut structured_responses = state.structured_responses.clone();
            structured_responses.insert(field_id, value);
            SessionState { structured_responses, ..state }
        },
        SessionAction::SetTopic { topic_id } => {
            if state.active_topic_id == topic_id {
                return state;
            }
            SessionState::for_topic(&topic_id, state.history_limit)
        },
        SessionAction::ToggleDiagnosis { name } => {
            if state.ddx.working_diagnoses.iter().any(|d| return d.name == name) {
                let ddx = drop_diagnosis(state.ddx.clone(), &name);
                return SessionState { ddx, ..state };
            }
            let mut ddx = state.ddx.clone();
            ddx.working_diagnoses.push(WorkingDiagnosis { is_primary: false, name });
            SessionState { ddx, ..state }
        },
        SessionAction::ToggleRedFlag { flag_id } => {
            let mut red_flags_confirmed = state.red_flags_confirmed.clone();
            let current = red_flags_confirmed.get(&flag_id).copied().unwrap_or(false);
            red_flags_confirmed.insert(flag_id, !current);
            SessionState { red_flags_confirmed, ..state }
        },
        SessionAction::ToggleSectionInclusion { include_by_default, section_id } => {
            let current = state.is_included(&section_id, include_by_default);
            let mut section_inclusions = state.section_inclusions.clone();
            section_inclusions.insert(section_id, !current);
            SessionState { section_inclusions, ..state }
        },
        SessionAction::UndoEditorText => {
            let mut editor_history = state.editor_history.clone();
            let Some(previous) = editor_history.undo(state.editor_text.clone(), state.history_limit) else {
                return state;
            };
            let editor_anchors = recompute_anchor_states(&previous, &state.editor_anchors);
            SessionState { editor_anchors, editor_history, editor_text: previous, ..state }
        },
    };
}

/// Replace the note and re-validate every anchor against it.
fn set_editor_text(state: SessionState, text: String, with_history: bool) -> SessionState {
    if state.editor_text == text {
        return state;
    }
    let editor_anchors = recompute_anchor_states(&text, &state.editor_anchors);
    let mut editor_history = state.editor_history.clone();
    if with_history {
        editor_history.record(state.editor_text.clone(), state.history_limit);
    } else {
        editor_history = EditorHistory::default();
    }
    return SessionState { editor_anchors, editor_history, editor_text: text, ..state };
}

/// Add or remove one finding for a diagnosis; entries left empty are dropped.
fn upsert_evidence(mut entries: Vec<EvidenceEntry>, diagnosis: &str, item: &str, selected: bool) -> Vec<EvidenceEntry> {
    let Some(position) = entries.iter().position(|e| return e.diagnosis == diagnosis) else {
        if selected {
            entries.push(EvidenceEntry { diagnosis: diagnosis.to_string(), items: vec![item.to_string()] });
        }
        return entries;
    };

    let Some(entry) = entries.get_mut(position) else {
        return entries;
    };
    let has_item = entry.items.iter().any(|i| return i == item);
    if selected && !has_item {
        entry.items.push(item.to_string());
    } else if !selected && has_item {
        entry.items.retain(|i| return i != item);
    }

    if entry.items.is_empty() {
        entries.remove(position);
    }
    return entries;
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::anchor::{Provenance, append_anchored};

    fn provenance() -> Provenance {
        return Provenance { linked_at: Utc::now(), section_title: None, source: None };
    }

    fn typed(state: SessionState, text: &str) -> SessionState {
        return reduce(state, SessionAction::SetEditorTextWithHistory { text: text.to_string() });
    }

    #[test]
    fn undo_and_redo_walk_history() {
        let state = typed(typed(SessionState::default(), "a"), "ab");
        let undone = reduce(state, SessionAction::UndoEditorText);
        assert_eq!(undone.editor_text, "a");
        let redone = reduce(undone, SessionAction::RedoEditorText);
        assert_eq!(redone.editor_text, "ab");
        let nothing = reduce(redone.clone(), SessionAction::RedoEditorText);
        assert_eq!(nothing, redone);
    }

    #[test]
    fn history_depth_follows_limit() {
        let mut state = SessionState::for_topic("uti", 5);
        for i in 0..9 {
            state = typed(state, &format!("v{i}"));
        }
        assert_eq!(state.editor_history.past.len(), 5);
    }

    #[test]
    fn text_without_history_clears_stacks() {
        let state = typed(typed(SessionState::default(), "a"), "ab");
        let state = reduce(state, SessionAction::SetEditorText { text: "xyz".to_string() });
        assert!(!state.editor_history.can_undo());
        assert!(!state.editor_history.can_redo());
    }

    #[test]
    fn undo_and_redo_recompute_anchor_status() {
        let linked = append_anchored("Intro", "plan", "Review in clinic", &provenance());
        let state = typed(SessionState::default(), "Intro");
        let state = reduce(state, SessionAction::CommitLinkedSection {
            anchor: linked.anchor.clone(),
            text: linked.next_text.clone(),
        });
        assert!(!state.editor_anchors.get("plan").unwrap().detached);

        let edited = typed(state, &linked.next_text.replace("clinic", "ED"));
        assert!(edited.editor_anchors.get("plan").unwrap().detached);

        let undone = reduce(edited, SessionAction::UndoEditorText);
        assert!(!undone.editor_anchors.get("plan").unwrap().detached);

        let redone = reduce(undone, SessionAction::RedoEditorText);
        assert!(redone.editor_anchors.get("plan").unwrap().detached);
    }

    #[test]
    fn switching_topic_clears_session() {
        let state = SessionState::for_topic("uti", 50);
        let state = reduce(state, SessionAction::ToggleRedFlag { flag_id: "rf-0".to_string() });
        let same = reduce(state.clone(), SessionAction::SetTopic { topic_id: "uti".to_string() });
        assert_eq!(same, state);
        let other = reduce(state, SessionAction::SetTopic { topic_id: "sore-throat".to_string() });
        assert!(other.red_flags_confirmed.is_empty());
        assert_eq!(other.active_topic_id, "sore-throat");
    }

    #[test]
    fn structured_defaults_do_not_overwrite_answers() {
        let state = reduce(SessionState::default(), SessionAction::SetStructuredResponse {
            field_id: "duration".to_string(),
            value: FieldValue::Text("3 days".to_string()),
        });
        let mut values = BTreeMap::new();
        values.insert("duration".to_string(), FieldValue::Text("1 day".to_string()));
        values.insert("fever".to_string(), FieldValue::Flag(false));
        let state = reduce(state, SessionAction::ApplyStructuredDefaults { values });
        assert_eq!(state.structured_responses.get("duration"), Some(&FieldValue::Text("3 days".to_string())));
        assert_eq!(state.structured_responses.get("fever"), Some(&FieldValue::Flag(false)));
    }

    #[test]
    fn section_inclusion_toggles_from_default() {
        let state = reduce(SessionState::default(), SessionAction::ToggleSectionInclusion {
            include_by_default: false,
            section_id: "ddx".to_string(),
        });
        assert!(state.is_included("ddx", false));
        let state = reduce(state, SessionAction::ToggleSectionInclusion {
            include_by_default: false,
            section_id: "ddx".to_string(),
        });
        assert!(!state.is_included("ddx", false));
    }

    #[test]
    fn differential_edits() {
        let mut state = SessionState::default();
        for name in ["UTI", "Pyelonephritis", " UTI ", "  "] {
            state = reduce(state, SessionAction::AddCustomDiagnosis { name: name.to_string() });
        }
        assert_eq!(state.ddx.working_diagnoses.len(), 2);

        state = reduce(state, SessionAction::SetPrimaryDiagnosis { name: "Pyelonephritis".to_string() });
        let primaries: Vec<&str> = state
            .ddx
            .working_diagnoses
            .iter()
            .filter(|d| d.is_primary)
            .map(|d| d.name.as_str())
            .collect();
        assert_eq!(primaries, vec!["Pyelonephritis"]);

        state = reduce(state, SessionAction::ReorderDiagnosis { from: 1, to: 0 });
        assert_eq!(state.ddx.working_diagnoses.first().unwrap().name, "Pyelonephritis");
        let unchanged = reduce(state.clone(), SessionAction::ReorderDiagnosis { from: 0, to: 7 });
        assert_eq!(unchanged, state);
    }

    #[test]
    fn evidence_moves_between_sides_and_empties_are_dropped() {
        let mut state = reduce(SessionState::default(), SessionAction::ToggleDiagnosis { name: "UTI".to_string() });
        state = reduce(state, SessionAction::AssignEvidence {
            diagnosis: "UTI".to_string(),
            item: "Dysuria".to_string(),
            selected: true,
            side: EvidenceSide::For,
        });
        assert_eq!(state.ddx.evidence_for.len(), 1);

        state = reduce(state, SessionAction::AssignEvidence {
            diagnosis: "UTI".to_string(),
            item: "Dysuria".to_string(),
            selected: true,
            side: EvidenceSide::Against,
        });
        assert!(state.ddx.evidence_for.is_empty());
        assert_eq!(state.ddx.evidence_against.first().unwrap().items, vec!["Dysuria".to_string()]);

        state = reduce(state, SessionAction::ToggleDiagnosis { name: "UTI".to_string() });
        assert!(state.ddx.working_diagnoses.is_empty());
        assert!(state.ddx.evidence_against.is_empty());
    }

    #[test]
    fn anchors_can_be_marked_and_removed() {
        let linked = append_anchored("", "plan", "Plan", &provenance());
        let state = reduce(SessionState::default(), SessionAction::SetEditorAnchor { anchor: linked.anchor });
        let state = reduce(state, SessionAction::MarkAnchorDetached { section_id: "plan".to_string() });
        assert!(state.editor_anchors.get("plan").unwrap().detached);
        assert_eq!(state.editor_anchors.get("plan").unwrap().detach_reason, Some(DetachReason::Modified));
        let state = reduce(state, SessionAction::RemoveEditorAnchor { section_id: "plan".to_string() });
        assert!(state.editor_anchors.is_empty());
    }
}
