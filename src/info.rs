use std::path::Path;

use serde::Serialize;

use crate::config::{CONFIG_FILE, Config};
use crate::store::{SESSION_FILE, read_session};
use crate::topic::load_topic;

/// Output the comprehensive notelink reference document.
pub fn run(root: &Path, json: bool) {
    let state = gather_state(root);

    if json {
        print_json(&state);
    } else {
        print_markdown(&state);
    }
    return;
}

// ── State gathering ───────────────────────────────────────────────────

/// Snapshot of the working directory.
struct CurrentState {
    /// Whether `.notelink.toml` exists.
    config_found: bool,
    /// Structured field ids with labels, in topic order.
    fields: Vec<(String, String)>,
    /// Linked sections in the stored session, if any session exists.
    linked_sections: Option<usize>,
    /// Configured note path.
    note: String,
    /// Output section ids with titles, in template order.
    sections: Vec<(String, String)>,
    /// Configured topic and whether it loaded.
    topic: Option<(String, bool)>,
}

fn gather_state(root: &Path) -> CurrentState {
    let config_found = root.join(CONFIG_FILE).exists();
    let config = Config::load(root).unwrap_or_default();
    let linked_sections = read_session(&root.join(SESSION_FILE))
        .ok()
        .flatten()
        .map(|s| return s.editor_anchors.len());

    let loaded = config.topic_path(root).ok().and_then(|p| return load_topic(&p).ok());
    let topic = config.topic.clone().map(|t| return (t, loaded.is_some()));
    let (sections, fields) = loaded
        .map(|t| {
            let sections: Vec<(String, String)> =
                t.output_template.sections.iter().map(|s| return (s.id.clone(), s.title.clone())).collect();
            let fields: Vec<(String, String)> = t
                .structured_fields
                .iter()
                .flat_map(|g| return g.fields.iter())
                .map(|f| return (f.id.clone(), f.label.clone()))
                .collect();
            return (sections, fields);
        })
        .unwrap_or_default();

    return CurrentState {
        config_found,
        fields,
        linked_sections,
        note: config.note.display().to_string(),
        sections,
        topic,
    };
}

// ── Markdown output ───────────────────────────────────────────────────

fn print_markdown(state: &CurrentState) {
    let version = env!("CARGO_PKG_VERSION");
    print_markdown_header(version);
    print_markdown_state(state);
    println!();
    print_markdown_exit_codes();
    return;
}

fn print_markdown_header(version: &str) {
    print!(
        "\
# notelink {version}

Compose consultation notes from structured answers and keep inserted
sections refreshable, without ever overwriting text edited by hand.

## Snippet Placeholders

    @date(+7d)               date 7 days (d), weeks (w) or months (m) ahead, DD/MM/YYYY
    {{mild|moderate*|severe}}  choice, `*` marks the default
    [Site]                   free-text value

## Workflow

    notelink init --topic <id|path>   Choose a topic and start a session
    notelink set <field> <values...>  Record a structured answer
    notelink normal [group]           Answer `normal` where a select field offers it
    notelink flag <index>             Toggle a red-flag checklist entry
    notelink ddx add|primary|evidence Work the differential
    notelink link <section> [--at N]  Insert a section as a linked block
    notelink sync                     Refresh every untouched linked block
    notelink check                    Report edited or missing blocks (exit 0/1/2)
    notelink expand <snippet>         Fill in a snippet's placeholders
    notelink export --format soap     Plain, SOAP or SBAR export
    notelink undo | redo              Step through note history

## Link States

| State           | Label                 |
|-----------------|-----------------------|
| not_linked      | Not inserted          |
| linked_clean    | Linked                |
| linked_modified | Modified after insert |
| linked_missing  | Link missing          |

## Configuration (.notelink.toml)

    note = \"note.md\"          # the free-text note
    topic = \"sore-throat\"     # topic id or path to a topic JSON file
    topics_dir = \"topics\"     # searched when topic is an id
    history_limit = 50        # undo/redo depth

Set `NOTELINK_LOG=notelink=debug` to see anchor decisions on stderr.

## Current State

"
    );
    return;
}

fn print_markdown_state(state: &CurrentState) {
    if state.config_found {
        println!("Config:   {CONFIG_FILE} (found)");
    } else {
        println!("Config:   {CONFIG_FILE} (not found)");
    }
    println!("Note:     {}", state.note);

    match &state.topic {
        Some((topic, true)) => println!("Topic:    {topic}"),
        Some((topic, false)) => println!("Topic:    {topic} (cannot be loaded)"),
        None => println!("Topic:    (none)"),
    }

    match state.linked_sections {
        Some(n) => println!("Session:  {SESSION_FILE} ({n} linked sections)"),
        None => println!("Session:  {SESSION_FILE} (not found)"),
    }

    if !state.sections.is_empty() {
        let list = state.sections.iter().map(|(id, title)| return format!("{id} ({title})")).collect::<Vec<_>>();
        println!("Sections: {}", list.join(", "));
    }
    if !state.fields.is_empty() {
        let list = state.fields.iter().map(|(id, label)| return format!("{id} ({label})")).collect::<Vec<_>>();
        println!("Fields:   {}", list.join(", "));
    }
    return;
}

fn print_markdown_exit_codes() {
    print!(
        "\
## Exit Codes

| Code | Meaning |
|------|---------|
| 0    | Success / all linked sections clean |
| 1    | Linked sections modified after insert |
| 2    | Linked sections missing |
| 3    | Runtime error |
"
    );
    return;
}

// ── JSON output ───────────────────────────────────────────────────────

#[derive(Serialize)]
struct ExitCodeInfo {
    code: u8,
    meaning: String,
}

#[derive(Serialize)]
struct IdLabel {
    id: String,
    label: String,
}

#[derive(Serialize)]
struct InfoJson {
    current_state: StateJson,
    exit_codes: Vec<ExitCodeInfo>,
    link_states: Vec<IdLabel>,
    version: String,
}

#[derive(Serialize)]
struct StateJson {
    config_found: bool,
    fields: Vec<IdLabel>,
    linked_sections: Option<usize>,
    note: String,
    sections: Vec<IdLabel>,
    topic: Option<String>,
    topic_loaded: bool,
}

fn id_labels(pairs: &[(String, String)]) -> Vec<IdLabel> {
    return pairs.iter().map(|(id, label)| return IdLabel { id: id.clone(), label: label.clone() }).collect();
}

fn print_json(state: &CurrentState) {
    use crate::types::LinkState;

    let info = InfoJson {
        current_state: StateJson {
            config_found: state.config_found,
            fields: id_labels(&state.fields),
            linked_sections: state.linked_sections,
            note: state.note.clone(),
            sections: id_labels(&state.sections),
            topic: state.topic.as_ref().map(|(t, _)| return t.clone()),
            topic_loaded: state.topic.as_ref().is_some_and(|(_, loaded)| return *loaded),
        },
        exit_codes: vec![
            ExitCodeInfo { code: 0, meaning: "Success / all linked sections clean".to_string() },
            ExitCodeInfo { code: 1, meaning: "Linked sections modified after insert".to_string() },
            ExitCodeInfo { code: 2, meaning: "Linked sections missing".to_string() },
            ExitCodeInfo { code: 3, meaning: "Runtime error".to_string() },
        ],
        link_states: [LinkState::NotLinked, LinkState::LinkedClean, LinkState::LinkedModified, LinkState::LinkedMissing]
            .into_iter()
            .map(|s| return IdLabel { id: s.name().to_string(), label: s.label().to_string() })
            .collect(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    };

    // serde_json::to_string_pretty won't fail on this structure.
    let json = serde_json::to_string_pretty(&info).unwrap_or_default();
    println!("{json}");
    return;
}
