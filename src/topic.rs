//! Topic configuration: the output sections, structured field groups,
//! red-flag checklist and snippet library a consultation works from.
//!
//! Topics are JSON documents produced by the topic build pipeline. Only the
//! parts the composition engine reads are modelled; unknown keys are ignored.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use walkdir::WalkDir;

use crate::error::Error;

/// Declaration of one section of the composed note.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputSection {
    /// Stable identifier, also the anchor key.
    pub id: String,
    /// Whether the section is included when the user has not toggled it.
    #[serde(default = "default_true")]
    pub include_by_default: bool,
    /// Data source the content is derived from.
    pub source: SectionSource,
    /// Structured field group to dump, for `structured` sections.
    #[serde(default)]
    pub structured_section_id: Option<String>,
    /// Heading shown above the section.
    pub title: String,
}

/// Reasoning aids attached to a topic.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reasoning {
    /// Red-flag checklist; confirmations are keyed `rf-<index>` into this list.
    #[serde(default)]
    pub red_flags: Vec<String>,
}

/// Where a section's content comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SectionSource {
    /// Working differential and evidence.
    Ddx,
    /// The free-text note itself.
    Editor,
    /// Confirmed red flags.
    Reasoning,
    /// A structured field group.
    Structured,
}

impl SectionSource {
    /// Lowercase name, identical to the serialized form.
    pub const fn name(self) -> &'static str {
        return match self {
            SectionSource::Ddx => "ddx",
            SectionSource::Editor => "editor",
            SectionSource::Reasoning => "reasoning",
            SectionSource::Structured => "structured",
        };
    }
}

/// A reusable block of template text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snippet {
    /// Library grouping.
    #[serde(default)]
    pub category: String,
    /// Raw template text, placeholders unresolved.
    pub content: String,
    /// Stable identifier.
    pub id: String,
    /// Human-readable name.
    #[serde(default)]
    pub label: String,
    /// Free-form search tags.
    #[serde(default)]
    pub tags: Vec<String>,
    /// Short trigger typed in the editor, e.g. `;sn`.
    #[serde(default)]
    pub trigger: String,
}

/// One form field inside a structured group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StructuredField {
    /// Response key.
    pub id: String,
    /// Form control kind, e.g. `text`, `select`, `toggle`.
    #[serde(default, rename = "type")]
    pub kind: String,
    /// Label written in front of the answer.
    pub label: String,
    /// Allowed answers for `select` fields.
    #[serde(default)]
    pub options: Vec<String>,
    /// Visibility expression; see [`crate::visibility`].
    #[serde(default)]
    pub show_if: Option<String>,
}

impl StructuredField {
    /// Whether this is a select field offering a `normal` answer.
    pub fn offers_normal(&self) -> bool {
        return self.kind == "select" && self.options.iter().any(|o| return o == "normal");
    }
}

/// A named group of form fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructuredSection {
    /// Fields in declaration order.
    #[serde(default)]
    pub fields: Vec<StructuredField>,
    /// Group identifier referenced by `structuredSectionId`.
    pub id: String,
    /// Group heading.
    #[serde(default)]
    pub title: String,
}

/// A loaded topic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Topic {
    /// Identity of the topic.
    pub metadata: TopicMetadata,
    /// Declared note layout.
    #[serde(default)]
    pub output_template: OutputTemplate,
    /// Red-flag checklist and related aids.
    #[serde(default)]
    pub reasoning: Reasoning,
    /// Snippet library.
    #[serde(default)]
    pub snippets: Vec<Snippet>,
    /// Structured field groups.
    #[serde(default)]
    pub structured_fields: Vec<StructuredSection>,
}

impl Topic {
    /// Look up a declared output section by id.
    pub fn output_section(&self, id: &str) -> Option<&OutputSection> {
        return self.output_template.sections.iter().find(|s| return s.id == id);
    }

    /// Look up a snippet by id, falling back to its trigger.
    pub fn snippet(&self, key: &str) -> Option<&Snippet> {
        return self
            .snippets
            .iter()
            .find(|s| return s.id == key)
            .or_else(|| return self.snippets.iter().find(|s| return !s.trigger.is_empty() && s.trigger == key));
    }

    /// Look up a structured field group by id.
    pub fn structured_section(&self, id: &str) -> Option<&StructuredSection> {
        return self.structured_fields.iter().find(|s| return s.id == id);
    }
}

/// Identity of a topic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopicMetadata {
    /// Name shown to the user.
    #[serde(default)]
    pub display_name: String,
    /// Stable identifier, e.g. `sore-throat`.
    pub id: String,
}

/// Ordered list of output sections.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputTemplate {
    /// Sections in note order.
    #[serde(default)]
    pub sections: Vec<OutputSection>,
}

/// Serde default for `includeByDefault`.
const fn default_true() -> bool {
    return true;
}

/// Find a topic file under `topics_dir` whose file stem or metadata id is `id`.
///
/// # Errors
///
/// Returns `Error::TopicNotFound` if no JSON file under the directory matches.
pub fn find_topic(topics_dir: &Path, id: &str) -> Result<PathBuf, Error> {
    let candidates: Vec<PathBuf> = WalkDir::new(topics_dir)
        .into_iter()
        .filter_map(Result::ok)
        .map(walkdir::DirEntry::into_path)
        .filter(|p| return p.extension().is_some_and(|ext| return ext == "json"))
        .collect();

    if let Some(by_stem) = candidates
        .iter()
        .find(|p| return p.file_stem().is_some_and(|stem| return stem == id))
    {
        return Ok(by_stem.clone());
    }

    for path in &candidates {
        if let Ok(topic) = load_topic(path)
            && topic.metadata.id == id
        {
            return Ok(path.clone());
        }
    }

    return Err(Error::TopicNotFound { name: id.to_string(), searched: topics_dir.to_path_buf() });
}

/// Read and deserialize a topic JSON file.
///
/// # Errors
///
/// Returns `Error::FileNotFound` if the file cannot be read,
/// or `Error::TopicInvalid` if it is not a topic document.
pub fn load_topic(path: &Path) -> Result<Topic, Error> {
    let content = std::fs::read_to_string(path)
        .map_err(|_err| return Error::FileNotFound { path: path.to_path_buf() })?;
    return serde_json::from_str(&content).map_err(|err| {
        return Error::TopicInvalid { path: path.to_path_buf(), reason: err.to_string() };
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOPIC: &str = r#"{
        "version": "runtime",
        "metadata": { "id": "uti", "displayName": "UTI", "specialty": "GP" },
        "snippets": [
            { "id": "uti-hx", "trigger": ";uti", "label": "History", "category": "history",
              "content": "Dysuria for [Duration]" }
        ],
        "reasoning": { "redFlags": ["Loin pain", "Rigors"], "mustNotMiss": [] },
        "structuredFields": [
            { "id": "history", "title": "History",
              "fields": [ { "id": "duration", "label": "Duration", "type": "text" },
                          { "id": "fever", "label": "Fever", "type": "toggle", "showIf": "" },
                          { "id": "abdo", "label": "Abdomen", "type": "select", "options": ["normal", "tender"] } ] }
        ],
        "outputTemplate": { "sections": [
            { "id": "hx", "title": "History", "source": "structured", "structuredSectionId": "history", "includeByDefault": true },
            { "id": "notes", "title": "Notes", "source": "editor" }
        ] }
    }"#;

    #[test]
    fn parses_camel_case_topic_and_ignores_extra_keys() {
        let topic: Topic = serde_json::from_str(TOPIC).unwrap();
        assert_eq!(topic.metadata.id, "uti");
        assert_eq!(topic.reasoning.red_flags.len(), 2);
        let hx = topic.output_section("hx").unwrap();
        assert_eq!(hx.source, SectionSource::Structured);
        assert_eq!(hx.structured_section_id.as_deref(), Some("history"));
        let notes = topic.output_section("notes").unwrap();
        assert!(notes.include_by_default);
        let history = topic.structured_section("history").unwrap();
        let normals: Vec<&str> =
            history.fields.iter().filter(|f| return f.offers_normal()).map(|f| return f.id.as_str()).collect();
        assert_eq!(normals, vec!["abdo"]);
    }

    #[test]
    fn snippets_resolve_by_id_or_trigger() {
        let topic: Topic = serde_json::from_str(TOPIC).unwrap();
        assert_eq!(topic.snippet("uti-hx").unwrap().label, "History");
        assert_eq!(topic.snippet(";uti").unwrap().id, "uti-hx");
        assert!(topic.snippet("nope").is_none());
    }

    #[test]
    fn find_topic_by_stem_then_metadata_id() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("gp");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::write(nested.join("urinary.json"), TOPIC).unwrap();

        let by_stem = find_topic(dir.path(), "urinary").unwrap();
        assert_eq!(by_stem, nested.join("urinary.json"));
        let by_id = find_topic(dir.path(), "uti").unwrap();
        assert_eq!(by_id, nested.join("urinary.json"));
        assert!(find_topic(dir.path(), "asthma").is_err());
    }
}
