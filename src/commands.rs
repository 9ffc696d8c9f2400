//! Note and link commands: init, snippets, expand, compose, sections, link,
//! sync, unlink, check, undo, redo, export, reset.

use std::collections::BTreeMap;
use std::path::Path;
use std::process::ExitCode;

use chrono::Utc;
use serde::Serialize;

use crate::anchor::{derive_link_state, insert_text_at_cursor, remove_anchored_block};
use crate::composer::{build_composer_sections, compose_output, compose_section, composed_sections};
use crate::config;
use crate::error;
use crate::export::{ExportFormat, export as render_export};
use crate::insertion::{InsertMode, InsertSectionIntent, sync_linked_sections, upsert_linked_section};
use crate::session::SessionAction;
use crate::store::{SESSION_FILE, Workspace};
use crate::tokens::{UnresolvedToken, apply_resolutions, default_resolutions, parse_tokens};
use crate::topic::{SectionSource, load_topic};
use crate::types::{LinkState, Selection};

/// Where expanded snippet text goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    /// After the end of the note, on a line of its own.
    Append,
    /// Over a selection in the note.
    At(Selection),
    /// Standard output only; the note is untouched.
    Print,
}

/// One row of `check` output.
#[derive(Serialize)]
struct CheckRow {
    /// Section id.
    id: String,
    /// Link state.
    state: LinkState,
}

/// Re-validate every linked section against the note.
/// Exit 0 when all are clean, 1 when any was edited, 2 when any is gone.
///
/// # Errors
///
/// Returns errors from opening or saving the workspace.
pub fn check(root: &Path, json: bool) -> Result<ExitCode, error::Error> {
    let mut workspace = Workspace::open(root)?;
    workspace.save()?;

    let rows: Vec<CheckRow> = workspace
        .session
        .editor_anchors
        .iter()
        .map(|(id, anchor)| {
            return CheckRow { id: id.clone(), state: derive_link_state(&workspace.session.editor_text, Some(anchor)) };
        })
        .collect();

    let count = |state: LinkState| return rows.iter().filter(|r| return r.state == state).count();
    let modified = count(LinkState::LinkedModified);
    let missing = count(LinkState::LinkedMissing);

    if json {
        println!("{}", serde_json::to_string_pretty(&rows)?);
    } else {
        for row in rows.iter().filter(|r| return r.state != LinkState::LinkedClean) {
            let tag = if row.state == LinkState::LinkedMissing { "MISSING " } else { "MODIFIED" };
            println!("{tag} {} ({})", row.id, row.state.label());
        }
    }

    // Exit code priority: missing (2) > modified (1) > clean (0).
    if missing > 0 {
        if !json {
            println!();
            println!("{missing} missing, {modified} modified");
        }
        return Ok(ExitCode::from(2));
    } else if modified > 0 {
        if !json {
            println!();
            println!("{modified} modified");
        }
        return Ok(ExitCode::from(1));
    } else {
        if !json {
            println!("All {} linked sections clean", rows.len());
        }
        return Ok(ExitCode::SUCCESS);
    }
}

/// Print the composed note, or one section's content.
///
/// # Errors
///
/// Returns errors from opening the workspace, or `Error::UnknownSection`.
pub fn compose(root: &Path, section: Option<&str>) -> Result<(), error::Error> {
    let workspace = Workspace::open(root)?;
    let text = match section {
        Some(id) => compose_section(&workspace.topic, &workspace.session, workspace.section(id)?),
        None => compose_output(&workspace.topic, &workspace.session),
    };
    if !text.is_empty() {
        println!("{text}");
    }
    return Ok(());
}

/// Expand a snippet's placeholders and print it or write it into the note.
///
/// `sets` are `PLACEHOLDER=VALUE` pairs where the placeholder is the raw
/// token (`[Site]`, `{left|right}`) or a variable's bare name (`Site`).
/// With `defaults`, choices without a value take their default option.
///
/// # Errors
///
/// Returns `Error::UnknownSnippet`, `Error::InvalidResolution`, or
/// `Error::UnresolvedPlaceholders` when a placeholder is left without a value.
pub fn expand(
    root: &Path,
    snippet_key: &str,
    sets: &[String],
    defaults: bool,
    placement: Placement,
) -> Result<(), error::Error> {
    let mut workspace = Workspace::open(root)?;
    let Some(snippet) = workspace.topic.snippet(snippet_key) else {
        return Err(error::Error::UnknownSnippet { id: snippet_key.to_string() });
    };
    let snippet_id = snippet.id.clone();
    let parsed = parse_tokens(&snippet.content);

    let mut resolutions = BTreeMap::new();
    for input in sets {
        let (raw, value) = parse_resolution(input, &parsed.tokens)?;
        resolutions.insert(raw, value);
    }
    if defaults {
        for (raw, value) in default_resolutions(&parsed.tokens) {
            resolutions.entry(raw).or_insert(value);
        }
    }

    let unresolved: Vec<String> = parsed
        .tokens
        .iter()
        .filter(|t| return !resolutions.contains_key(t.raw()))
        .map(|t| return t.raw().to_string())
        .collect();
    if !unresolved.is_empty() {
        return Err(error::Error::UnresolvedPlaceholders { snippet: snippet_id, tokens: unresolved });
    }

    let text = apply_resolutions(&parsed.text_with_dates_resolved, &resolutions);
    let note = &workspace.session.editor_text;
    let next_text = match placement {
        Placement::Append => {
            let spacer = if note.is_empty() || note.ends_with('\n') { "" } else { "\n" };
            format!("{note}{spacer}{text}\n")
        },
        Placement::At(selection) => insert_text_at_cursor(note, &text, selection).next_text,
        Placement::Print => {
            println!("{text}");
            return Ok(());
        },
    };

    workspace.apply(SessionAction::SetEditorTextWithHistory { text: next_text });
    workspace.save()?;
    tracing::info!(snippet = %snippet_id, "snippet written into note");
    eprintln!("Inserted snippet `{snippet_id}` into {}", workspace.config.note.display());
    return Ok(());
}

/// Write the export in `format` to standard output. An override file, when
/// given, is stored first; `clear_override` drops a stored one.
///
/// # Errors
///
/// Returns errors from opening or saving the workspace, or reading the override.
pub fn export(
    root: &Path,
    format: ExportFormat,
    override_from: Option<&Path>,
    clear_override: bool,
) -> Result<(), error::Error> {
    let mut workspace = Workspace::open(root)?;
    if clear_override || override_from.is_some() {
        let text = override_from
            .map(|path| {
                return std::fs::read_to_string(path)
                    .map_err(|_err| return error::Error::FileNotFound { path: path.to_path_buf() });
            })
            .transpose()?;
        workspace.apply(SessionAction::SetExportOverride { text });
        workspace.save()?;
    }

    let text = render_export(format, &workspace.topic, &workspace.session);
    if text.trim().is_empty() {
        eprintln!("Nothing to export yet.");
    } else {
        println!("{text}");
    }
    return Ok(());
}

/// Output a comprehensive reference document for notelink.
pub fn info(root: &Path, json: bool) {
    return crate::info::run(root, json);
}

/// Point this directory at a topic and start a fresh session on it.
///
/// # Errors
///
/// Returns `Error::TopicNotFound` or `Error::TopicInvalid` if the topic can't
/// be loaded, or errors from writing the config or session.
pub fn init(root: &Path, topic: &str) -> Result<(), error::Error> {
    let current = config::Config::load(root)?;
    let topic_path = config::resolve_topic(root, &current.topics_dir, topic)?;
    let loaded = load_topic(&topic_path)?;

    config::set_topic(root, topic)?;
    let mut workspace = Workspace::open(root)?;
    let note = workspace.session.editor_text.clone();
    workspace.apply(SessionAction::ResetSession);
    workspace.apply(SessionAction::SetEditorText { text: note });
    workspace.save()?;

    tracing::info!(topic = %loaded.metadata.id, "session initialised");
    println!(
        "Started {} session ({} sections, {} snippets) in {SESSION_FILE}",
        loaded.metadata.display_name,
        loaded.output_template.sections.len(),
        loaded.snippets.len()
    );
    return Ok(());
}

/// Compose a section and write it into the note as a linked block:
/// refreshed in place if its block is untouched, otherwise inserted at
/// `at` or appended.
///
/// # Errors
///
/// Returns `Error::UnknownSection`, `Error::InvalidSelection`, or errors
/// from opening or saving the workspace.
pub fn link(root: &Path, section_id: &str, at: Option<&str>) -> Result<(), error::Error> {
    let mut workspace = Workspace::open(root)?;
    let section = workspace.section(section_id)?.clone();
    if section.source == SectionSource::Editor {
        eprintln!("Section `{section_id}` is the note itself, nothing to link.");
        return Ok(());
    }

    let selection = at.map(parse_selection).transpose()?;
    let intent = InsertSectionIntent {
        content: compose_section(&workspace.topic, &workspace.session, &section),
        mode: if selection.is_some() { InsertMode::Cursor } else { InsertMode::Append },
        section_id: section.id.clone(),
        section_title: section.title.clone(),
        source: section.source.name().to_string(),
    };

    let Some(result) = upsert_linked_section(&workspace.session, &intent, selection, Utc::now()) else {
        eprintln!("Section `{section_id}` is empty, nothing to link.");
        return Ok(());
    };

    let updated_existing = result.updated_existing;
    let next_cursor = result.next_cursor;
    workspace.apply(SessionAction::CommitLinkedSection { anchor: result.anchor, text: result.next_text });
    workspace.save()?;

    tracing::info!(section = %section_id, updated_existing, "section linked");
    if updated_existing {
        println!("Refreshed `{section_id}` in place");
    } else if let Some(cursor) = next_cursor {
        println!("Linked `{section_id}` at cursor, next cursor {cursor}");
    } else {
        println!("Linked `{section_id}` at end of note");
    }
    return Ok(());
}

/// Parse a `PLACEHOLDER=VALUE` argument into a raw token and its value.
///
/// # Errors
///
/// Returns `Error::InvalidResolution` if there is no `=`, or the placeholder
/// matches no token in the snippet.
fn parse_resolution(input: &str, tokens: &[UnresolvedToken]) -> Result<(String, String), error::Error> {
    let invalid = || return error::Error::InvalidResolution { input: input.to_string() };
    let (key, value) = input.split_once('=').ok_or_else(invalid)?;

    let raw = tokens.iter().find_map(|token| {
        if token.raw() == key {
            return Some(token.raw().to_string());
        }
        if let UnresolvedToken::Variable(variable) = token
            && variable.name == key
        {
            return Some(variable.raw.clone());
        }
        return None;
    });
    return raw.map(|raw| return (raw, value.to_string())).ok_or_else(invalid);
}

/// Parse `START` or `START..END` byte offsets.
///
/// # Errors
///
/// Returns `Error::InvalidSelection` if either offset is not a number.
pub fn parse_selection(input: &str) -> Result<Selection, error::Error> {
    let invalid = || return error::Error::InvalidSelection { input: input.to_string() };
    let offset = |s: &str| return s.trim().parse::<usize>().map_err(|_err| return invalid());
    return match input.split_once("..") {
        Some((start, end)) => Ok(Selection::new(offset(start)?, offset(end)?)),
        None => Ok(Selection::cursor(offset(input)?)),
    };
}

/// Step forward in note history.
///
/// # Errors
///
/// Returns errors from opening or saving the workspace.
pub fn redo(root: &Path) -> Result<(), error::Error> {
    return step_history(root, SessionAction::RedoEditorText, "redo");
}

/// Clear the consultation (note included) but keep the topic.
///
/// # Errors
///
/// Returns errors from opening or saving the workspace.
pub fn reset(root: &Path) -> Result<(), error::Error> {
    let mut workspace = Workspace::open(root)?;
    workspace.apply(SessionAction::ResetSession);
    workspace.save()?;
    tracing::info!("session reset");
    println!("Session reset for {}", workspace.topic.metadata.display_name);
    return Ok(());
}

/// List declared sections with inclusion and link state.
///
/// # Errors
///
/// Returns errors from opening the workspace or serializing JSON.
pub fn sections(root: &Path, json: bool) -> Result<(), error::Error> {
    let workspace = Workspace::open(root)?;
    let sections = build_composer_sections(&workspace.topic, &workspace.session);

    if json {
        println!("{}", serde_json::to_string_pretty(&sections)?);
        return Ok(());
    }

    for section in &sections {
        let included = if section.included { "x" } else { " " };
        let empty = if section.content.is_empty() { "  (empty)" } else { "" };
        println!(
            "[{included}] {:<16} {:<10} {:<22} {:<8} {}{empty}",
            section.id,
            section.source.name(),
            section.link_state.label(),
            section.link_state.tone().name(),
            section.title
        );
    }
    return Ok(());
}

/// List the topic's snippet library by category.
///
/// # Errors
///
/// Returns errors from opening the workspace.
pub fn snippets(root: &Path) -> Result<(), error::Error> {
    let workspace = Workspace::open(root)?;
    let mut by_category: BTreeMap<&str, Vec<_>> = BTreeMap::new();
    for snippet in &workspace.topic.snippets {
        by_category.entry(snippet.category.as_str()).or_default().push(snippet);
    }

    if by_category.is_empty() {
        println!("No snippets in this topic.");
        return Ok(());
    }

    for (category, snippets) in by_category {
        let heading = if category.is_empty() { "uncategorised" } else { category };
        println!("## {heading}");
        for snippet in snippets {
            let tokens = parse_tokens(&snippet.content).tokens.len();
            println!("{:<10} {:<20} {} ({tokens} placeholders)", snippet.trigger, snippet.id, snippet.label);
        }
        println!();
    }
    return Ok(());
}

/// Shared body of `undo` and `redo`.
///
/// # Errors
///
/// Returns errors from opening or saving the workspace.
fn step_history(root: &Path, action: SessionAction, verb: &str) -> Result<(), error::Error> {
    let mut workspace = Workspace::open(root)?;
    let history = &workspace.session.editor_history;
    let possible = match action {
        SessionAction::RedoEditorText => history.can_redo(),
        _ => history.can_undo(),
    };
    if !possible {
        eprintln!("Nothing to {verb}.");
        return Ok(());
    }
    workspace.apply(action);
    workspace.save()?;
    tracing::info!(verb, "note history step");
    println!("{verb}: note restored ({} bytes)", workspace.session.editor_text.len());
    return Ok(());
}

/// Refresh every linked section whose block is untouched.
///
/// # Errors
///
/// Returns errors from opening or saving the workspace.
pub fn sync(root: &Path) -> Result<(), error::Error> {
    let mut workspace = Workspace::open(root)?;
    if workspace.session.editor_anchors.is_empty() {
        eprintln!("No linked sections. Run `notelink link <section>` first.");
        return Ok(());
    }

    let sections = composed_sections(&workspace.topic, &workspace.session);
    let outcome = sync_linked_sections(&workspace.session, &sections);
    for anchor in outcome.anchors {
        workspace.apply(SessionAction::SetEditorAnchor { anchor });
    }
    workspace.apply(SessionAction::SetEditorTextWithHistory { text: outcome.next_text });
    workspace.save()?;

    let c = outcome.counts;
    println!(
        "Updated {}, unchanged {}, empty {}, detached {}, missing {}, not linked {}",
        c.updated, c.unchanged, c.empty, c.detached, c.missing, c.not_linked
    );
    return Ok(());
}

/// Step back in note history.
///
/// # Errors
///
/// Returns errors from opening or saving the workspace.
pub fn undo(root: &Path) -> Result<(), error::Error> {
    return step_history(root, SessionAction::UndoEditorText, "undo");
}

/// Forget a section's link. Unless `keep_text` is set, an untouched block is
/// also removed from the note.
///
/// # Errors
///
/// Returns `Error::UnknownSection` if the section has no link,
/// or errors from opening or saving the workspace.
pub fn unlink(root: &Path, section_id: &str, keep_text: bool) -> Result<(), error::Error> {
    let mut workspace = Workspace::open(root)?;
    let Some(anchor) = workspace.session.editor_anchors.get(section_id).cloned() else {
        return Err(error::Error::UnknownSection {
            available: workspace.session.editor_anchors.keys().cloned().collect(),
            id: section_id.to_string(),
        });
    };

    let removed_text = !keep_text && !anchor.detached;
    if removed_text {
        let text = remove_anchored_block(&workspace.session.editor_text, &anchor);
        workspace.apply(SessionAction::SetEditorTextWithHistory { text });
    }
    workspace.apply(SessionAction::RemoveEditorAnchor { section_id: section_id.to_string() });
    workspace.save()?;

    if removed_text {
        println!("Unlinked `{section_id}` and removed its block");
    } else {
        println!("Unlinked `{section_id}`, note left as is");
    }
    return Ok(());
}
