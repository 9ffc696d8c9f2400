//! Export renderers: the composed note as-is, or regrouped as SOAP or SBAR.

use crate::composer::{compose_ddx, compose_output, compose_reasoning_summary, compose_structured_section};
use crate::session::SessionState;
use crate::topic::Topic;

/// Placeholder written under an empty heading.
const NOT_DOCUMENTED: &str = "Not documented.";

/// Supported export layouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ExportFormat {
    /// Composed output, or the hand-written override when set.
    Plain,
    /// Situation, Background, Assessment, Recommendation.
    Sbar,
    /// Subjective, Objective, Assessment, Plan.
    Soap,
}

/// Assessment block shared by SOAP and SBAR.
fn assessment(topic: &Topic, state: &SessionState) -> String {
    return join_blocks(&[
        compose_structured_section(topic, state, "assessment"),
        compose_ddx(state),
        compose_reasoning_summary(topic, state),
    ]);
}

/// Render the session in `format`.
pub fn export(format: ExportFormat, topic: &Topic, state: &SessionState) -> String {
    return match format {
        ExportFormat::Plain => export_plain(topic, state),
        ExportFormat::Sbar => export_sbar(topic, state),
        ExportFormat::Soap => export_soap(topic, state),
    };
}

/// Composed output unless a non-blank override has been written.
fn export_plain(topic: &Topic, state: &SessionState) -> String {
    if let Some(text) = &state.export_override
        && !text.trim().is_empty()
    {
        return text.trim().to_string();
    }
    return compose_output(topic, state).trim().to_string();
}

fn export_sbar(topic: &Topic, state: &SessionState) -> String {
    let background = compose_structured_section(topic, state, "history").trim().to_string();
    let exam = compose_structured_section(topic, state, "exam");
    return headed(&[
        ("Situation", state.editor_text.trim().to_string()),
        ("Background", background),
        ("Assessment", join_blocks(&[assessment(topic, state), exam])),
        ("Recommendation", plan(topic, state)),
    ]);
}

fn export_soap(topic: &Topic, state: &SessionState) -> String {
    let subjective = join_blocks(&[compose_structured_section(topic, state, "history"), state.editor_text.clone()]);
    let objective = join_blocks(&[
        compose_structured_section(topic, state, "exam"),
        compose_structured_section(topic, state, "investigations"),
    ]);
    return headed(&[
        ("S: Subjective", subjective),
        ("O: Objective", objective),
        ("A: Assessment", assessment(topic, state)),
        ("P: Plan", plan(topic, state)),
    ]);
}

/// Headings each followed by their block, separated by blank lines.
fn headed(blocks: &[(&str, String)]) -> String {
    return blocks
        .iter()
        .map(|(heading, body)| {
            let body = if body.is_empty() { NOT_DOCUMENTED } else { body.as_str() };
            return format!("{heading}\n{body}");
        })
        .collect::<Vec<_>>()
        .join("\n\n");
}

/// Trimmed, non-empty blocks joined by newlines.
fn join_blocks(blocks: &[String]) -> String {
    return blocks
        .iter()
        .map(|block| return block.trim())
        .filter(|block| return !block.is_empty())
        .collect::<Vec<_>>()
        .join("\n");
}

/// Plan block shared by SOAP and SBAR.
fn plan(topic: &Topic, state: &SessionState) -> String {
    return join_blocks(&[
        compose_structured_section(topic, state, "plan"),
        compose_structured_section(topic, state, "safety-net"),
    ]);
}
