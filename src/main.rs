mod anchor;
mod commands;
mod composer;
mod config;
mod diagnostics;
mod error;
mod export;
mod hasher;
mod history;
mod info;
mod insertion;
mod session;
mod store;
mod tokens;
mod topic;
mod types;
mod visibility;
mod watch;
mod workup;

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt as _, util::SubscriberInitExt as _};

use crate::commands::Placement;
use crate::export::ExportFormat;
use crate::session::EvidenceSide;
use crate::workup::DdxEdit;

#[derive(Parser)]
#[command(name = "notelink", version, about = "Compose consultation notes with refreshable linked sections")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Report linked sections edited or missing since insert (exit 0/1/2)
    Check {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Print the composed note, or one section's content
    Compose {
        /// Section id; omit for the whole note
        section: Option<String>,
    },
    /// Work the differential diagnosis; lists it when no action is given
    Ddx {
        #[command(subcommand)]
        action: Option<DdxCommand>,
    },
    /// Fill in a snippet's placeholders and print it or write it into the note
    Expand {
        /// Snippet id or trigger
        snippet: String,
        /// Placeholder value, e.g. `--set Site=left` or `--set '{a|b}=b'`
        #[arg(long = "set", value_name = "PLACEHOLDER=VALUE")]
        sets: Vec<String>,
        /// Take the default option for choices without a value
        #[arg(long)]
        defaults: bool,
        /// Insert into the note at START or over START..END (byte offsets)
        #[arg(long, conflicts_with = "append")]
        at: Option<String>,
        /// Append to the end of the note
        #[arg(long)]
        append: bool,
    },
    /// Print the note for export
    Export {
        /// Layout to render
        #[arg(long, value_enum, default_value_t = ExportFormat::Plain)]
        format: ExportFormat,
        /// Store this file's text as the plain export
        #[arg(long, value_name = "FILE")]
        override_from: Option<PathBuf>,
        /// Drop a stored plain export override
        #[arg(long, conflicts_with = "override_from")]
        clear_override: bool,
    },
    /// Toggle a red-flag checklist entry (0-based index)
    Flag {
        /// Checklist index
        index: usize,
    },
    /// Toggle whether a section goes into the composed note
    Include {
        /// Section id
        section: String,
    },
    /// Output a comprehensive reference document (syntax, config, state)
    Info {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Choose a topic and start a fresh session
    Init {
        /// Topic id (searched under topics_dir) or path to a topic JSON file
        #[arg(long)]
        topic: String,
    },
    /// Write a section into the note as a linked block
    Link {
        /// Section id
        section: String,
        /// Insert at START or over START..END (byte offsets) instead of appending
        #[arg(long)]
        at: Option<String>,
    },
    /// Answer `normal` for every select field of a group that offers it
    Normal {
        /// Structured group id
        #[arg(default_value = "exam")]
        group: String,
    },
    /// Step forward in note history
    Redo,
    /// Clear the session and the note, keeping the topic
    Reset,
    /// List sections with inclusion and link state
    Sections {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Record a structured answer; several values make a list
    Set {
        /// Field id
        field: String,
        /// Answer
        #[arg(required = true)]
        values: Vec<String>,
    },
    /// List the topic's snippets
    Snippets,
    /// Refresh every linked section whose block is untouched
    Sync,
    /// Step back in note history
    Undo,
    /// Forget a section's link, removing its untouched block
    Unlink {
        /// Section id
        section: String,
        /// Keep the block's text in the note
        #[arg(long)]
        keep_text: bool,
    },
    /// Watch the note and re-check links on every change
    Watch,
}

#[derive(Subcommand)]
enum DdxCommand {
    /// Add a diagnosis
    Add {
        /// Diagnosis name
        name: String,
    },
    /// Assign a finding to a diagnosis
    Evidence {
        /// Diagnosis name
        diagnosis: String,
        /// Finding text
        item: String,
        /// Record as evidence against instead of for
        #[arg(long)]
        against: bool,
        /// Remove the finding instead of adding it
        #[arg(long)]
        remove: bool,
    },
    /// Make a diagnosis the primary
    Primary {
        /// Diagnosis name
        name: String,
    },
    /// Remove a diagnosis and its evidence
    Remove {
        /// Diagnosis name
        name: String,
    },
    /// Move a diagnosis (1-based positions)
    Reorder {
        /// Current position
        from: usize,
        /// Target position
        to: usize,
    },
    /// Add a diagnosis, or remove it if already listed
    Toggle {
        /// Diagnosis name
        name: String,
    },
}

impl DdxCommand {
    /// Translate the CLI form into a workup edit.
    fn into_edit(self) -> DdxEdit {
        return match self {
            DdxCommand::Add { name } => DdxEdit::Add(name),
            DdxCommand::Evidence { diagnosis, item, against, remove } => DdxEdit::Evidence {
                diagnosis,
                item,
                remove,
                side: if against { EvidenceSide::Against } else { EvidenceSide::For },
            },
            DdxCommand::Primary { name } => DdxEdit::Primary(name),
            DdxCommand::Remove { name } => DdxEdit::Remove(name),
            DdxCommand::Reorder { from, to } => DdxEdit::Reorder { from, to },
            DdxCommand::Toggle { name } => DdxEdit::Toggle(name),
        };
    }
}

/// Map a unit result onto a success exit code.
fn done(result: Result<(), error::Error>) -> Result<ExitCode, error::Error> {
    return result.map(|()| return ExitCode::SUCCESS);
}

/// Route log output to stderr, filtered by `NOTELINK_LOG`.
fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_env("NOTELINK_LOG")
        .unwrap_or_else(|_err| return tracing_subscriber::EnvFilter::new("notelink=warn"));
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init();
    return;
}

fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();
    let root = Path::new(".");

    let result = match cli.command {
        Commands::Check { json } => commands::check(root, json),
        Commands::Compose { section } => done(commands::compose(root, section.as_deref())),
        Commands::Ddx { action } => done(workup::ddx(root, action.map_or(DdxEdit::List, DdxCommand::into_edit))),
        Commands::Expand { snippet, sets, defaults, at, append } => {
            let placement = match (at, append) {
                (Some(at), _) => commands::parse_selection(&at).map(Placement::At),
                (None, true) => Ok(Placement::Append),
                (None, false) => Ok(Placement::Print),
            };
            placement.and_then(|p| return done(commands::expand(root, &snippet, &sets, defaults, p)))
        },
        Commands::Export { format, override_from, clear_override } => {
            done(commands::export(root, format, override_from.as_deref(), clear_override))
        },
        Commands::Flag { index } => done(workup::flag(root, index)),
        Commands::Include { section } => done(workup::include(root, &section)),
        Commands::Info { json } => {
            commands::info(root, json);
            Ok(ExitCode::SUCCESS)
        },
        Commands::Init { topic } => done(commands::init(root, &topic)),
        Commands::Link { section, at } => done(commands::link(root, &section, at.as_deref())),
        Commands::Normal { group } => done(workup::normal(root, &group)),
        Commands::Redo => done(commands::redo(root)),
        Commands::Reset => done(commands::reset(root)),
        Commands::Sections { json } => done(commands::sections(root, json)),
        Commands::Set { field, values } => done(workup::set(root, &field, &values)),
        Commands::Snippets => done(commands::snippets(root)),
        Commands::Sync => done(commands::sync(root)),
        Commands::Undo => done(commands::undo(root)),
        Commands::Unlink { section, keep_text } => done(commands::unlink(root, &section, keep_text)),
        Commands::Watch => watch::run(root),
    };

    return match result {
        Ok(code) => code,
        Err(e) => {
            diagnostics::print_error(&e);
            ExitCode::from(3_u8)
        },
    };
}
