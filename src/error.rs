/// Crate-level error types for notelink diagnostics.
use std::path::PathBuf;

/// Failures of the outer surfaces: configuration, topic loading, session
/// persistence, argument parsing and the watcher. The composition engine
/// itself never fails; it reports statuses instead.
#[allow(clippy::error_impl_error, reason = "crate-internal error type in binary")]
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// `.notelink.toml` exists but is not a valid TOML document for editing.
    #[error("config edit failed: {}: {reason}", path.display())]
    ConfigEdit {
        /// Config file that could not be parsed.
        path: PathBuf,
        /// Description of the parse failure.
        reason: String,
    },

    /// A required file does not exist on disk.
    #[error("file not found: {}", path.display())]
    FileNotFound {
        /// Path to the missing file.
        path: PathBuf,
    },

    /// A `--set` argument is not of the form `PLACEHOLDER=VALUE`.
    #[error("invalid placeholder value: `{input}` (expected PLACEHOLDER=VALUE)")]
    InvalidResolution {
        /// The argument as given.
        input: String,
    },

    /// A `--at` argument is not `START` or `START..END`.
    #[error("invalid selection: `{input}` (expected START or START..END)")]
    InvalidSelection {
        /// The argument as given.
        input: String,
    },

    /// Underlying I/O error from the filesystem.
    #[error("io: {0}")]
    Io(
        /// The wrapped I/O error.
        #[from]
        std::io::Error,
    ),

    /// JSON (de)serialization failed.
    #[error("json: {0}")]
    Json(
        /// The wrapped JSON error.
        #[from]
        serde_json::Error,
    ),

    /// No topic is configured for this directory.
    #[error("no topic configured (run `notelink init --topic <id>`)")]
    NoTopic,

    /// The session file exists but its contents are inconsistent.
    #[error("session corrupt: {reason}")]
    SessionCorrupt {
        /// Description of the inconsistency.
        reason: String,
    },

    /// TOML deserialization failed.
    #[error("toml deserialize: {0}")]
    TomlDe(
        /// The wrapped TOML deserialization error.
        #[from]
        toml::de::Error,
    ),

    /// A topic file exists but is not a topic document.
    #[error("invalid topic: {}: {reason}", path.display())]
    TopicInvalid {
        /// Topic file that failed to deserialize.
        path: PathBuf,
        /// Description of the failure.
        reason: String,
    },

    /// No topic file matches the configured id.
    #[error("topic not found: `{name}` under {}", searched.display())]
    TopicNotFound {
        /// Topic id or file stem that was looked up.
        name: String,
        /// Directory that was searched.
        searched: PathBuf,
    },

    /// Placeholders left without a value after expansion.
    #[error("unresolved placeholders in `{snippet}`: {}", tokens.join(", "))]
    UnresolvedPlaceholders {
        /// Snippet id.
        snippet: String,
        /// Raw placeholder text still missing a value.
        tokens: Vec<String>,
    },

    /// Diagnosis is not on the working list.
    #[error("unknown diagnosis: `{name}`")]
    UnknownDiagnosis {
        /// Diagnosis name as given.
        name: String,
        /// Diagnoses currently on the list.
        working: Vec<String>,
    },

    /// No structured field with this id in the topic.
    #[error("unknown field: `{id}`")]
    UnknownField {
        /// Field id as given.
        id: String,
    },

    /// Red-flag index outside the checklist.
    #[error("unknown red flag: {index} (checklist has {count})")]
    UnknownRedFlag {
        /// Number of checklist entries.
        count: usize,
        /// Index as given.
        index: usize,
    },

    /// No output section with this id in the topic.
    #[error("unknown section: `{id}`")]
    UnknownSection {
        /// Section ids the topic declares.
        available: Vec<String>,
        /// Section id as given.
        id: String,
    },

    /// No snippet with this id or trigger in the topic.
    #[error("unknown snippet: `{id}`")]
    UnknownSnippet {
        /// Snippet id or trigger as given.
        id: String,
    },

    /// The filesystem watcher could not be set up.
    #[error("watch failed: {reason}")]
    WatchFailed {
        /// Description of the failure.
        reason: String,
    },
}
