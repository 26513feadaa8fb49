//! Whole-list persistence of the chat list.
//!
//! Every mutation rewrites `chats.json` in the platform data directory in
//! full. The write goes through a temp file in the same directory and a
//! rename, so a crash mid-save leaves the previous snapshot intact. There is
//! no schema versioning and no migration format.

use std::error::Error as StdError;
use std::fmt;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use tempfile::NamedTempFile;

use crate::core::chat::Chat;

const CHATS_FILE: &str = "chats.json";

/// Errors that can occur while loading or saving the chat list.
#[derive(Debug)]
pub enum StoreError {
    /// Failed to read the chats file from disk.
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The chats file exists but is not valid JSON for the current model.
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    /// Failed to write or atomically replace the chats file.
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::Read { path, source } => {
                write!(f, "Failed to read chats at {}: {}", path.display(), source)
            }
            StoreError::Parse { path, source } => {
                write!(f, "Failed to parse chats at {}: {}", path.display(), source)
            }
            StoreError::Write { path, source } => {
                write!(f, "Failed to write chats at {}: {}", path.display(), source)
            }
        }
    }
}

impl StdError for StoreError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            StoreError::Read { source, .. } => Some(source),
            StoreError::Parse { source, .. } => Some(source),
            StoreError::Write { source, .. } => Some(source),
        }
    }
}

/// Handle on the on-disk chats file.
#[derive(Debug, Clone)]
pub struct ChatsFile {
    path: PathBuf,
}

impl ChatsFile {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Resolve the default location: `$CAUSERIE_DATA_DIR/chats.json` when the
    /// override is set (tests rely on this), otherwise the platform data dir.
    pub fn default_location() -> Self {
        if let Some(dir) = std::env::var_os("CAUSERIE_DATA_DIR") {
            return Self::new(PathBuf::from(dir).join(CHATS_FILE));
        }
        let proj_dirs = ProjectDirs::from("org", "permacommons", "causerie")
            .expect("Failed to determine data directory");
        Self::new(proj_dirs.data_dir().join(CHATS_FILE))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the persisted chat list. A missing file is an empty list.
    pub fn load(&self) -> Result<Vec<Chat>, StoreError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let contents = fs::read_to_string(&self.path).map_err(|source| StoreError::Read {
            path: self.path.clone(),
            source,
        })?;
        serde_json::from_str(&contents).map_err(|source| StoreError::Parse {
            path: self.path.clone(),
            source,
        })
    }

    /// Serialize the full chat list and atomically replace the file.
    pub fn save(&self, chats: &[Chat]) -> Result<(), StoreError> {
        let parent = self.path.parent().filter(|dir| !dir.as_os_str().is_empty());

        if let Some(dir) = parent {
            fs::create_dir_all(dir).map_err(|source| StoreError::Write {
                path: self.path.clone(),
                source,
            })?;
        }

        let contents = serde_json::to_string(chats).map_err(|source| StoreError::Parse {
            path: self.path.clone(),
            source,
        })?;

        let write_err = |source: std::io::Error| StoreError::Write {
            path: self.path.clone(),
            source,
        };

        let mut temp_file = match parent {
            Some(dir) => NamedTempFile::new_in(dir),
            None => NamedTempFile::new(),
        }
        .map_err(write_err)?;

        temp_file
            .write_all(contents.as_bytes())
            .map_err(write_err)?;
        temp_file.as_file_mut().sync_all().map_err(write_err)?;
        temp_file
            .persist(&self.path)
            .map_err(|err| write_err(err.error))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::message::Message;

    fn chats_file_in(dir: &tempfile::TempDir) -> ChatsFile {
        ChatsFile::new(dir.path().join(CHATS_FILE))
    }

    #[test]
    fn missing_file_loads_as_empty_list() {
        let dir = tempfile::tempdir().unwrap();
        let file = chats_file_in(&dir);
        assert!(file.load().unwrap().is_empty());
    }

    #[test]
    fn chats_round_trip_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let file = chats_file_in(&dir);

        let mut chat = Chat::new();
        chat.name = "Errands".to_string();
        chat.messages.push(Message::user("remind me about milk"));
        chat.messages.push(Message::assistant("Noted: milk."));

        file.save(std::slice::from_ref(&chat)).unwrap();
        let loaded = file.load().unwrap();

        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].id, chat.id);
        assert_eq!(loaded[0].name, "Errands");
        assert_eq!(loaded[0].messages.len(), 2);
        assert_eq!(loaded[0].messages[1].content, "Noted: milk.");
    }

    #[test]
    fn save_replaces_the_previous_snapshot_wholesale() {
        let dir = tempfile::tempdir().unwrap();
        let file = chats_file_in(&dir);

        file.save(&[Chat::new(), Chat::new()]).unwrap();
        file.save(&[Chat::new()]).unwrap();

        assert_eq!(file.load().unwrap().len(), 1);
        // No stray temp files left behind after the rename.
        let entries: Vec<_> = fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn corrupt_file_surfaces_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let file = chats_file_in(&dir);
        fs::write(file.path(), "{not json").unwrap();

        match file.load() {
            Err(StoreError::Parse { path, .. }) => assert_eq!(path, file.path()),
            other => panic!("expected parse error, got {:?}", other.map(|c| c.len())),
        }
    }

    #[test]
    fn save_creates_missing_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let file = ChatsFile::new(dir.path().join("nested").join("deep").join(CHATS_FILE));
        file.save(&[Chat::new()]).unwrap();
        assert_eq!(file.load().unwrap().len(), 1);
    }
}
