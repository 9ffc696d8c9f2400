//! Section composition: turns session state into the text of each declared
//! output section, and the sections into one composed note.

use serde::Serialize;

use crate::anchor::derive_link_state;
use crate::hasher::{BlockHash, hash_block};
use crate::session::SessionState;
use crate::topic::{OutputSection, SectionSource, Topic};
use crate::types::LinkState;
use crate::visibility::evaluate_show_if;

/// One section's content plus its inclusion flag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComposedSection {
    /// Composed text; empty when there is nothing to say.
    pub content: String,
    /// Section id.
    pub id: String,
    /// Whether the section goes into the composed output.
    pub included: bool,
    /// Data source.
    pub source: SectionSource,
    /// Heading.
    pub title: String,
}

/// Everything a caller needs to display one section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ComposerSection {
    /// Composed text.
    pub content: String,
    /// Fingerprint of `content`.
    pub content_hash: BlockHash,
    /// Section id.
    pub id: String,
    /// Default inclusion declared by the topic.
    pub include_by_default: bool,
    /// Effective inclusion after user toggles.
    pub included: bool,
    /// Where the section stands relative to the note.
    pub link_state: LinkState,
    /// Data source.
    pub source: SectionSource,
    /// Heading.
    pub title: String,
}

/// Sections with content hash and link state, in template order.
pub fn build_composer_sections(topic: &Topic, state: &SessionState) -> Vec<ComposerSection> {
    return composed_sections(topic, state)
        .into_iter()
        .map(|section| {
            let include_by_default = topic.output_section(&section.id).is_none_or(|s| return s.include_by_default);
            let link_state = derive_link_state(&state.editor_text, state.editor_anchors.get(&section.id));
            return ComposerSection {
                content_hash: hash_block(&section.content),
                content: section.content,
                id: section.id,
                include_by_default,
                included: section.included,
                link_state,
                source: section.source,
                title: section.title,
            };
        })
        .collect();
}

/// Working differential: primary first, then the rest in stored order,
/// followed by the supporting and contrary evidence blocks.
pub fn compose_ddx(state: &SessionState) -> String {
    let diagnoses = &state.ddx.working_diagnoses;
    if diagnoses.is_empty() {
        return String::new();
    }

    let ranked = diagnoses
        .iter()
        .filter(|d| return d.is_primary)
        .take(1)
        .chain(diagnoses.iter().filter(|d| return !d.is_primary));

    let mut lines = vec!["Working differentials:".to_string()];
    for (i, diagnosis) in ranked.enumerate() {
        let marker = if diagnosis.is_primary { " *" } else { "" };
        lines.push(format!("{}. {}{marker}", i.saturating_add(1), diagnosis.name));
    }

    for (heading, bullet, entries) in [
        ("Supports", '+', &state.ddx.evidence_for),
        ("Against", '-', &state.ddx.evidence_against),
    ] {
        for entry in entries.iter().filter(|e| return !e.items.is_empty()) {
            lines.push(String::new());
            lines.push(format!("{heading} {}:", entry.diagnosis));
            lines.extend(entry.items.iter().map(|item| return format!("{bullet} {item}")));
        }
    }

    return lines.join("\n");
}

/// Included, non-empty sections as `## <title>` blocks separated by blank lines.
pub fn compose_output(topic: &Topic, state: &SessionState) -> String {
    return composed_sections(topic, state)
        .into_iter()
        .filter(|s| return s.included && !s.content.is_empty())
        .map(|s| return format!("## {}\n{}", s.title, s.content))
        .collect::<Vec<_>>()
        .join("\n\n");
}

/// "Red flags assessed: ..." for every confirmed checklist entry, in
/// checklist order. Empty when nothing is confirmed.
pub fn compose_reasoning_summary(topic: &Topic, state: &SessionState) -> String {
    let confirmed: Vec<&str> = topic
        .reasoning
        .red_flags
        .iter()
        .enumerate()
        .filter(|(i, _)| return state.red_flags_confirmed.get(&red_flag_key(*i)).copied().unwrap_or(false))
        .map(|(_, label)| return label.as_str())
        .collect();

    if confirmed.is_empty() {
        return String::new();
    }
    return format!("Red flags assessed: {}", confirmed.join(", "));
}

/// Content of one declared section.
pub fn compose_section(topic: &Topic, state: &SessionState, section: &OutputSection) -> String {
    return match section.source {
        SectionSource::Ddx => compose_ddx(state),
        SectionSource::Editor => state.editor_text.trim().to_string(),
        SectionSource::Reasoning => compose_reasoning_summary(topic, state),
        SectionSource::Structured => section
            .structured_section_id
            .as_deref()
            .map(|id| return compose_structured_section(topic, state, id))
            .unwrap_or_default(),
    };
}

/// `label: value` lines for every visible, answered field of a group.
/// Unknown groups compose to the empty string.
pub fn compose_structured_section(topic: &Topic, state: &SessionState, structured_section_id: &str) -> String {
    let Some(group) = topic.structured_section(structured_section_id) else {
        return String::new();
    };

    let mut lines = Vec::new();
    for field in &group.fields {
        if let Some(expression) = &field.show_if
            && !evaluate_show_if(expression, &state.structured_responses)
        {
            continue;
        }
        let Some(value) = state.structured_responses.get(&field.id) else {
            continue;
        };
        if !value.is_meaningful() {
            continue;
        }
        lines.push(format!("{}: {}", field.label, value.display()));
    }
    return lines.join("\n");
}

/// Every declared section with its composed content, in template order.
pub fn composed_sections(topic: &Topic, state: &SessionState) -> Vec<ComposedSection> {
    return topic
        .output_template
        .sections
        .iter()
        .map(|section| {
            return ComposedSection {
                content: compose_section(topic, state, section),
                id: section.id.clone(),
                included: state.is_included(&section.id, section.include_by_default),
                source: section.source,
                title: section.title.clone(),
            };
        })
        .collect();
}

/// Confirmation key for the red flag at `index`.
pub fn red_flag_key(index: usize) -> String {
    return format!("rf-{index}");
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::session::{EvidenceEntry, WorkingDiagnosis};
    use crate::topic::{OutputTemplate, Reasoning, StructuredField, StructuredSection, TopicMetadata};
    use crate::types::FieldValue;

    fn field(id: &str, label: &str, show_if: Option<&str>) -> StructuredField {
        return StructuredField {
            id: id.to_string(),
            kind: "text".to_string(),
            label: label.to_string(),
            options: Vec::new(),
            show_if: show_if.map(str::to_string),
        };
    }

    fn section(id: &str, title: &str, source: SectionSource, group: Option<&str>, include: bool) -> OutputSection {
        return OutputSection {
            id: id.to_string(),
            include_by_default: include,
            source,
            structured_section_id: group.map(str::to_string),
            title: title.to_string(),
        };
    }

    fn topic() -> Topic {
        return Topic {
            metadata: TopicMetadata { display_name: "UTI".to_string(), id: "uti".to_string() },
            output_template: OutputTemplate {
                sections: vec![
                    section("hx", "History", SectionSource::Structured, Some("history"), true),
                    section("notes", "Notes", SectionSource::Editor, None, true),
                    section("rf", "Red flags", SectionSource::Reasoning, None, true),
                    section("ddx", "Differential", SectionSource::Ddx, None, false),
                ],
            },
            reasoning: Reasoning { red_flags: vec!["Loin pain".to_string(), "Rigors".to_string(), "Vomiting".to_string()] },
            snippets: Vec::new(),
            structured_fields: vec![StructuredSection {
                fields: vec![
                    field("a", "Duration", None),
                    field("fever", "Fever", None),
                    field("temp", "Temperature", Some("fever == true")),
                    field("symptoms", "Symptoms", None),
                ],
                id: "history".to_string(),
                title: "History".to_string(),
            }],
        };
    }

    fn answers(state: &mut SessionState, pairs: &[(&str, FieldValue)]) {
        state.structured_responses = pairs.iter().map(|(k, v)| return ((*k).to_string(), v.clone())).collect();
    }

    #[test]
    fn structured_section_single_answer() {
        let topic = topic();
        let mut state = SessionState::default();
        assert_eq!(compose_structured_section(&topic, &state, "history"), "");
        answers(&mut state, &[("a", FieldValue::Text("3 days".to_string()))]);
        assert_eq!(compose_structured_section(&topic, &state, "history"), "Duration: 3 days");
    }

    #[test]
    fn structured_section_skips_hidden_false_and_empty() {
        let topic = topic();
        let mut state = SessionState::default();
        answers(&mut state, &[
            ("a", FieldValue::Text("  ".to_string())),
            ("fever", FieldValue::Flag(false)),
            ("temp", FieldValue::Number(38.5)),
            ("symptoms", FieldValue::List(vec!["dysuria".to_string(), "frequency".to_string()])),
        ]);
        assert_eq!(compose_structured_section(&topic, &state, "history"), "Symptoms: dysuria, frequency");

        state.structured_responses.insert("fever".to_string(), FieldValue::Flag(true));
        assert_eq!(
            compose_structured_section(&topic, &state, "history"),
            "Fever: true\nTemperature: 38.5\nSymptoms: dysuria, frequency"
        );
        assert_eq!(compose_structured_section(&topic, &state, "exam"), "");
    }

    #[test]
    fn reasoning_lists_confirmed_flags_in_checklist_order() {
        let topic = topic();
        let mut state = SessionState::default();
        assert_eq!(compose_reasoning_summary(&topic, &state), "");
        state.red_flags_confirmed = BTreeMap::from([
            ("rf-2".to_string(), true),
            ("rf-0".to_string(), true),
            ("rf-1".to_string(), false),
            ("rf-9".to_string(), true),
        ]);
        assert_eq!(compose_reasoning_summary(&topic, &state), "Red flags assessed: Loin pain, Vomiting");
    }

    #[test]
    fn ddx_primary_and_evidence() {
        let mut state = SessionState::default();
        state.ddx.working_diagnoses = vec![WorkingDiagnosis { is_primary: true, name: "UTI".to_string() }];
        state.ddx.evidence_for =
            vec![EvidenceEntry { diagnosis: "UTI".to_string(), items: vec!["Dysuria".to_string()] }];
        let ddx = compose_ddx(&state);
        assert!(ddx.contains("1. UTI *"));
        assert!(ddx.contains("Supports UTI:\n+ Dysuria"));
    }

    #[test]
    fn ddx_ranks_primary_first() {
        let mut state = SessionState::default();
        state.ddx.working_diagnoses = vec![
            WorkingDiagnosis { is_primary: false, name: "Cystitis".to_string() },
            WorkingDiagnosis { is_primary: true, name: "Pyelonephritis".to_string() },
            WorkingDiagnosis { is_primary: false, name: "STI".to_string() },
        ];
        state.ddx.evidence_against =
            vec![EvidenceEntry { diagnosis: "STI".to_string(), items: vec!["No discharge".to_string()] }];
        assert_eq!(
            compose_ddx(&state),
            "Working differentials:\n1. Pyelonephritis *\n2. Cystitis\n3. STI\n\nAgainst STI:\n- No discharge"
        );
        assert_eq!(compose_ddx(&SessionState::default()), "");
    }

    #[test]
    fn output_joins_included_non_empty_sections() {
        let topic = topic();
        let mut state = SessionState::default();
        assert_eq!(compose_output(&topic, &state), "");

        state.editor_text = "\n  Patient well.  \n".to_string();
        answers(&mut state, &[("a", FieldValue::Text("3 days".to_string()))]);
        state.ddx.working_diagnoses = vec![WorkingDiagnosis { is_primary: false, name: "UTI".to_string() }];
        assert_eq!(compose_output(&topic, &state), "## History\nDuration: 3 days\n\n## Notes\nPatient well.");

        state.section_inclusions.insert("hx".to_string(), false);
        state.section_inclusions.insert("ddx".to_string(), true);
        assert_eq!(
            compose_output(&topic, &state),
            "## Notes\nPatient well.\n\n## Differential\nWorking differentials:\n1. UTI"
        );
    }

    #[test]
    fn composer_sections_carry_hash_and_link_state() {
        let topic = topic();
        let mut state = SessionState::default();
        answers(&mut state, &[("a", FieldValue::Text("3 days".to_string()))]);
        let sections = build_composer_sections(&topic, &state);
        assert_eq!(sections.len(), 4);
        let hx = sections.first().unwrap();
        assert_eq!(hx.content_hash, hash_block("Duration: 3 days"));
        assert_eq!(hx.link_state, LinkState::NotLinked);
        let ddx = sections.last().unwrap();
        assert!(!ddx.include_by_default);
        assert!(!ddx.included);
    }
}
