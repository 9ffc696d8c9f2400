use std::fmt::Write as _;

use crate::error::Error;

const BOLD: &str = "\x1b[1m";
const RESET: &str = "\x1b[0m";

/// Render an error as valid markdown with bold headings and print to stderr.
pub fn print_error(e: &Error) {
    let md = render_error(e);
    for line in md.lines() {
        if line.starts_with('#') {
            eprintln!("{BOLD}{line}{RESET}");
        } else {
            eprintln!("{line}");
        }
    }
    return;
}

/// Render an error as a structured markdown diagnostic.
///
/// Each variant produces a block with what happened and, where there is one,
/// how to fix it.
pub fn render_error(e: &Error) -> String {
    return match e {
        Error::NoTopic => render_no_topic(),
        Error::TopicNotFound { name, searched } => render_topic_not_found(name, searched),
        Error::UnknownDiagnosis { name, working } => render_unknown_diagnosis(name, working),
        Error::UnknownSection { available, id } => render_unknown_section(id, available),
        Error::UnresolvedPlaceholders { snippet, tokens } => render_unresolved(snippet, tokens),
        _ => render_generic(e),
    };
}

fn render_generic(e: &Error) -> String {
    return match e {
        Error::ConfigEdit { path, reason } => format!(
            "\
# Error: Config Unreadable

Could not parse `{}`: {reason}

## Fix

Correct the TOML by hand, then re-run the command.
",
            path.display()
        ),

        Error::FileNotFound { path } => format!(
            "\
# Error: File Not Found

`{}` does not exist.
",
            path.display()
        ),

        Error::InvalidResolution { input } => format!(
            "\
# Error: Invalid Placeholder Value

`{input}` does not name a placeholder in this snippet.

## Fix

Use `--set NAME=VALUE` for `[NAME]`, or the raw placeholder text:

    --set '{{left|right}}=left'
"
        ),

        Error::InvalidSelection { input } => format!(
            "\
# Error: Invalid Selection

`{input}` is not a byte offset.

## Fix

    --at 120         insert at offset 120
    --at 120..164    replace bytes 120 to 164
"
        ),

        Error::SessionCorrupt { reason } => format!(
            "\
# Error: Session Corrupt

{reason}

## Fix

Start the session again (the note file is kept):

    notelink reset
"
        ),

        Error::TopicInvalid { path, reason } => format!(
            "\
# Error: Invalid Topic

`{}` is not a topic document: {reason}
",
            path.display()
        ),

        Error::UnknownField { id } => format!(
            "\
# Error: Unknown Field

No structured field `{id}` in this topic.

## Fix

List the topic's sections and fields:

    notelink info
"
        ),

        Error::UnknownRedFlag { count, index } => format!(
            "\
# Error: Unknown Red Flag

Index {index} is outside the checklist ({count} entries, numbered from 0).
"
        ),

        Error::UnknownSnippet { id } => format!(
            "\
# Error: Unknown Snippet

No snippet with id or trigger `{id}`.

## Fix

    notelink snippets
"
        ),

        Error::WatchFailed { reason } => format!(
            "\
# Error: Watch Failed

{reason}
"
        ),

        Error::Io(e) => format!(
            "\
# Error: I/O

{e}
"
        ),
        Error::Json(e) => format!(
            "\
# Error: Invalid JSON

{e}
"
        ),
        Error::TomlDe(e) => format!(
            "\
# Error: Invalid TOML

{e}
"
        ),
        // Already handled in render_error, but need exhaustive match.
        _ => format!(
            "\
# Error

{e}
"
        ),
    };
}

fn render_no_topic() -> String {
    return "\
# Error: No Topic

This directory has no topic configured.

## Fix

Choose a topic by id (searched under `topics/`) or by path:

    notelink init --topic sore-throat
"
    .to_string();
}

fn render_topic_not_found(name: &str, searched: &std::path::Path) -> String {
    return format!(
        "\
# Error: Topic Not Found

No topic `{name}` under `{}`.

## Fix

Pass the path to the topic JSON file, or set `topics_dir` in `.notelink.toml`.
",
        searched.display()
    );
}

fn render_unknown_diagnosis(name: &str, working: &[String]) -> String {
    let mut out = format!(
        "\
# Error: Unknown Diagnosis

`{name}` is not on the working differential.
"
    );
    if working.is_empty() {
        out.push_str(
            "\
\n## Fix

    notelink ddx add <name>
",
        );
    } else {
        out.push_str("\n## Working diagnoses\n\n");
        for w in working {
            let _ = writeln!(out, "- `{w}`");
        }
    }
    return out;
}

fn render_unknown_section(id: &str, available: &[String]) -> String {
    let mut out = format!(
        "\
# Error: Unknown Section

No section `{id}`.
"
    );
    if !available.is_empty() {
        out.push_str("\n## Available sections\n\n");
        for a in available {
            let _ = writeln!(out, "- `{a}`");
        }
    }
    return out;
}

fn render_unresolved(snippet: &str, tokens: &[String]) -> String {
    let mut out = format!(
        "\
# Error: Unresolved Placeholders

Snippet `{snippet}` still has placeholders without a value:

"
    );
    for t in tokens {
        let _ = writeln!(out, "- `{t}`");
    }
    out.push_str(
        "\
\n## Fix

Give each a value with `--set`, or take choice defaults with `--defaults`.
",
    );
    return out;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_section_lists_alternatives() {
        let md = render_error(&Error::UnknownSection {
            available: vec!["plan".to_string(), "ddx".to_string()],
            id: "pln".to_string(),
        });
        assert!(md.starts_with("# Error: Unknown Section"));
        assert!(md.contains("- `plan`"));
    }

    #[test]
    fn unresolved_placeholders_point_at_set() {
        let md = render_error(&Error::UnresolvedPlaceholders {
            snippet: "sn".to_string(),
            tokens: vec!["[Site]".to_string()],
        });
        assert!(md.contains("- `[Site]`"));
        assert!(md.contains("--set"));
    }

    #[test]
    fn invalid_resolution_shows_literal_braces() {
        let md = render_error(&Error::InvalidResolution { input: "x".to_string() });
        assert!(md.contains("'{left|right}=left'"));
    }
}
