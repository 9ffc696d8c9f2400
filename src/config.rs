use std::path::{Path, PathBuf};

use crate::error::Error;
use crate::history::DEFAULT_HISTORY_LIMIT;
use crate::topic::find_topic;

/// Name of the per-directory configuration file.
pub const CONFIG_FILE: &str = ".notelink.toml";

/// Project configuration loaded from `.notelink.toml`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Undo/redo depth.
    pub history_limit: usize,
    /// The free-text note, relative to the root.
    pub note: PathBuf,
    /// Topic id or path to a topic JSON file.
    pub topic: Option<String>,
    /// Directory searched when `topic` is an id.
    pub topics_dir: PathBuf,
}

/// Raw TOML structure for `.notelink.toml`.
#[derive(serde::Deserialize)]
struct NotelinkTomlConfig {
    #[serde(default)]
    history_limit: Option<usize>,
    #[serde(default)]
    note: Option<PathBuf>,
    #[serde(default)]
    topic: Option<String>,
    #[serde(default)]
    topics_dir: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        return Self {
            history_limit: DEFAULT_HISTORY_LIMIT,
            note: PathBuf::from("note.md"),
            topic: None,
            topics_dir: PathBuf::from("topics"),
        };
    }
}

impl Config {
    /// Load config from `.notelink.toml` in the given root directory.
    /// Returns defaults if the file doesn't exist. A file that exists but is
    /// malformed is an error, never a silent fallback.
    ///
    /// # Errors
    ///
    /// Returns `Error::Io` if reading fails (other than not-found),
    /// or `Error::TomlDe` if the TOML is malformed.
    pub fn load(root: &Path) -> Result<Self, Error> {
        let path = root.join(CONFIG_FILE);
        let content = match std::fs::read_to_string(&path) {
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => return Err(Error::Io(e)),
            Ok(c) => c,
        };

        let raw: NotelinkTomlConfig = toml::from_str(&content)?;
        let defaults = Self::default();
        return Ok(Self {
            history_limit: raw.history_limit.unwrap_or(defaults.history_limit),
            note: raw.note.unwrap_or(defaults.note),
            topic: raw.topic,
            topics_dir: raw.topics_dir.unwrap_or(defaults.topics_dir),
        });
    }

    /// Path of the note file under `root`.
    pub fn note_path(&self, root: &Path) -> PathBuf {
        return root.join(&self.note);
    }

    /// Locate the configured topic file. A value naming an existing file is
    /// used as a path; anything else is looked up as an id under `topics_dir`.
    ///
    /// # Errors
    ///
    /// Returns `Error::NoTopic` if no topic is configured,
    /// or `Error::TopicNotFound` if the id matches no topic file.
    pub fn topic_path(&self, root: &Path) -> Result<PathBuf, Error> {
        let Some(topic) = &self.topic else {
            return Err(Error::NoTopic);
        };
        return resolve_topic(root, &self.topics_dir, topic);
    }
}

/// Parse a `.notelink.toml` into a format-preserving document.
/// Returns an empty document if the file doesn't exist.
///
/// # Errors
///
/// Returns `Error::Io` on read failure or `Error::ConfigEdit` on parse failure.
fn read_config_doc(root: &Path) -> Result<(PathBuf, toml_edit::DocumentMut), Error> {
    let config_path = root.join(CONFIG_FILE);
    let content = match std::fs::read_to_string(&config_path) {
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
        Err(e) => return Err(Error::Io(e)),
        Ok(c) => c,
    };

    let doc: toml_edit::DocumentMut = content.parse().map_err(|e: toml_edit::TomlError| {
        return Error::ConfigEdit { path: config_path.clone(), reason: e.to_string() };
    })?;

    return Ok((config_path, doc));
}

/// Resolve a topic reference to a file: an existing path wins, then an id
/// lookup under `topics_dir`.
///
/// # Errors
///
/// Returns `Error::TopicNotFound` if neither matches.
pub fn resolve_topic(root: &Path, topics_dir: &Path, topic: &str) -> Result<PathBuf, Error> {
    let as_path = root.join(topic);
    if as_path.is_file() {
        return Ok(as_path);
    }
    return find_topic(&root.join(topics_dir), topic);
}

/// Record the topic in `.notelink.toml`, keeping the rest of the file as written.
///
/// # Errors
///
/// Returns `Error::ConfigEdit` if the existing file can't be parsed,
/// or `Error::Io` if writing fails.
pub fn set_topic(root: &Path, topic: &str) -> Result<(), Error> {
    let (config_path, mut doc) = read_config_doc(root)?;
    doc["topic"] = toml_edit::value(topic);
    std::fs::write(&config_path, doc.to_string())?;
    return Ok(());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(dir.path()).unwrap();
        assert_eq!(config, Config::default());
        assert!(matches!(config.topic_path(dir.path()), Err(Error::NoTopic)));
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE), "note = [").unwrap();
        assert!(matches!(Config::load(dir.path()), Err(Error::TomlDe(_))));
    }

    #[test]
    fn values_override_defaults() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE), "note = \"consult.txt\"\nhistory_limit = 5\n").unwrap();
        let config = Config::load(dir.path()).unwrap();
        assert_eq!(config.note, PathBuf::from("consult.txt"));
        assert_eq!(config.history_limit, 5);
        assert_eq!(config.topics_dir, PathBuf::from("topics"));
    }

    #[test]
    fn set_topic_preserves_comments() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        std::fs::write(&path, "# clinic laptop\nnote = \"consult.txt\"\n").unwrap();
        set_topic(dir.path(), "uti").unwrap();
        set_topic(dir.path(), "sore-throat").unwrap();
        let written = std::fs::read_to_string(&path).unwrap();
        assert!(written.starts_with("# clinic laptop\n"));
        assert_eq!(Config::load(dir.path()).unwrap().topic.as_deref(), Some("sore-throat"));
    }
}
