//! Clinical workup commands: structured answers, red flags, section
//! inclusion and the working differential.

use std::collections::BTreeMap;
use std::path::Path;

use crate::composer::red_flag_key;
use crate::error;
use crate::session::{EvidenceSide, SessionAction};
use crate::store::Workspace;
use crate::types::FieldValue;

/// Edits to the working differential.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DdxEdit {
    /// Add a diagnosis by name.
    Add(String),
    /// Select or deselect a finding for a diagnosis.
    Evidence {
        /// Diagnosis name.
        diagnosis: String,
        /// Finding text.
        item: String,
        /// Deselect instead of select.
        remove: bool,
        /// Side to assign to.
        side: EvidenceSide,
    },
    /// Print the current differential.
    List,
    /// Make a diagnosis the only primary.
    Primary(String),
    /// Drop a diagnosis and its evidence.
    Remove(String),
    /// Move a diagnosis; positions are 1-based.
    Reorder {
        /// Current position.
        from: usize,
        /// Target position.
        to: usize,
    },
    /// Add a diagnosis, or drop it if already listed.
    Toggle(String),
}

/// Apply one differential edit and print the resulting list.
///
/// # Errors
///
/// Returns `Error::UnknownDiagnosis` for edits naming a diagnosis that is
/// not on the list, or errors from opening or saving the workspace.
pub fn ddx(root: &Path, edit: DdxEdit) -> Result<(), error::Error> {
    let mut workspace = Workspace::open(root)?;

    let action = match edit {
        DdxEdit::Add(name) => Some(SessionAction::AddCustomDiagnosis { name }),
        DdxEdit::Evidence { diagnosis, item, remove, side } => {
            require_diagnosis(&workspace, &diagnosis)?;
            Some(SessionAction::AssignEvidence { diagnosis, item, selected: !remove, side })
        },
        DdxEdit::List => None,
        DdxEdit::Primary(name) => {
            require_diagnosis(&workspace, &name)?;
            Some(SessionAction::SetPrimaryDiagnosis { name })
        },
        DdxEdit::Remove(name) => {
            require_diagnosis(&workspace, &name)?;
            Some(SessionAction::RemoveDiagnosis { name })
        },
        DdxEdit::Reorder { from, to } => Some(SessionAction::ReorderDiagnosis {
            from: from.saturating_sub(1),
            to: to.saturating_sub(1),
        }),
        DdxEdit::Toggle(name) => Some(SessionAction::ToggleDiagnosis { name }),
    };

    if let Some(action) = action {
        workspace.apply(action);
        workspace.save()?;
    }
    print_differential(&workspace);
    return Ok(());
}

/// Toggle a red-flag checklist entry by its 0-based index.
///
/// # Errors
///
/// Returns `Error::UnknownRedFlag` if the index is outside the checklist.
pub fn flag(root: &Path, index: usize) -> Result<(), error::Error> {
    let mut workspace = Workspace::open(root)?;
    let count = workspace.topic.reasoning.red_flags.len();
    let Some(label) = workspace.topic.reasoning.red_flags.get(index).cloned() else {
        return Err(error::Error::UnknownRedFlag { count, index });
    };

    let key = red_flag_key(index);
    workspace.apply(SessionAction::ToggleRedFlag { flag_id: key.clone() });
    workspace.save()?;

    let confirmed = workspace.session.red_flags_confirmed.get(&key).copied().unwrap_or(false);
    let mark = if confirmed { "assessed" } else { "cleared" };
    println!("{label}: {mark}");
    return Ok(());
}

/// Toggle whether a section goes into the composed output.
///
/// # Errors
///
/// Returns `Error::UnknownSection` or errors from opening or saving the workspace.
pub fn include(root: &Path, section_id: &str) -> Result<(), error::Error> {
    let mut workspace = Workspace::open(root)?;
    let include_by_default = workspace.section(section_id)?.include_by_default;
    workspace.apply(SessionAction::ToggleSectionInclusion {
        include_by_default,
        section_id: section_id.to_string(),
    });
    workspace.save()?;

    let state = if workspace.session.is_included(section_id, include_by_default) { "included" } else { "excluded" };
    println!("{section_id}: {state}");
    return Ok(());
}

/// Answer `normal` for every select field of a structured group that offers
/// it, leaving answers already given alone.
///
/// # Errors
///
/// Returns `Error::UnknownField` if the topic has no group `group_id`.
pub fn normal(root: &Path, group_id: &str) -> Result<(), error::Error> {
    let mut workspace = Workspace::open(root)?;
    let Some(group) = workspace.topic.structured_section(group_id) else {
        return Err(error::Error::UnknownField { id: group_id.to_string() });
    };

    let values: BTreeMap<String, FieldValue> = group
        .fields
        .iter()
        .filter(|f| return f.offers_normal() && !workspace.session.structured_responses.contains_key(&f.id))
        .map(|f| return (f.id.clone(), FieldValue::Text("normal".to_string())))
        .collect();
    if values.is_empty() {
        eprintln!("Nothing to mark normal in `{group_id}`.");
        return Ok(());
    }

    let labels: Vec<String> =
        group.fields.iter().filter(|f| return values.contains_key(&f.id)).map(|f| return f.label.clone()).collect();
    workspace.apply(SessionAction::ApplyStructuredDefaults { values });
    workspace.save()?;
    for label in labels {
        println!("{label}: normal");
    }
    return Ok(());
}

/// Print the working differential with its evidence counts.
fn print_differential(workspace: &Workspace) {
    let ddx = &workspace.session.ddx;
    if ddx.working_diagnoses.is_empty() {
        println!("No working diagnoses.");
        return;
    }
    for (i, diagnosis) in ddx.working_diagnoses.iter().enumerate() {
        let tally = |entries: &[crate::session::EvidenceEntry]| {
            return entries.iter().find(|e| return e.diagnosis == diagnosis.name).map_or(0, |e| return e.items.len());
        };
        let primary = if diagnosis.is_primary { " *" } else { "" };
        println!(
            "{}. {}{primary}  (+{} / -{})",
            i.saturating_add(1),
            diagnosis.name,
            tally(&ddx.evidence_for),
            tally(&ddx.evidence_against)
        );
    }
    return;
}

/// Fail unless `name` is on the working list.
///
/// # Errors
///
/// Returns `Error::UnknownDiagnosis` listing the current diagnoses.
fn require_diagnosis(workspace: &Workspace, name: &str) -> Result<(), error::Error> {
    let working = &workspace.session.ddx.working_diagnoses;
    if working.iter().any(|d| return d.name == name) {
        return Ok(());
    }
    return Err(error::Error::UnknownDiagnosis {
        name: name.to_string(),
        working: working.iter().map(|d| return d.name.clone()).collect(),
    });
}

/// Record a structured answer. Several values make a list; a single
/// `true`/`false` a toggle; a number a numeric answer.
///
/// # Errors
///
/// Returns `Error::UnknownField` if no structured group declares `field_id`.
pub fn set(root: &Path, field_id: &str, values: &[String]) -> Result<(), error::Error> {
    let mut workspace = Workspace::open(root)?;
    let Some(field) = workspace
        .topic
        .structured_fields
        .iter()
        .flat_map(|group| return group.fields.iter())
        .find(|f| return f.id == field_id)
    else {
        return Err(error::Error::UnknownField { id: field_id.to_string() });
    };
    let label = field.label.clone();

    let value = FieldValue::infer(values);
    let shown = value.display();
    workspace.apply(SessionAction::SetStructuredResponse { field_id: field_id.to_string(), value });
    workspace.save()?;
    println!("{label}: {shown}");
    return Ok(());
}
