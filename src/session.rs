use std::fs;
use std::path::PathBuf;

use tracing::debug;

use crate::config;
use crate::error::{GcliError, Result};
use crate::history::{self, LoadedHistory};
use crate::request::GenerateRequest;

/// Name shown until the conversation is saved as a session.
pub const UNSAVED: &str = "[unsaved]";

const EXTENSION: &str = "json";

/// Names become file stems, so separators and dots are refused.
pub fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() || name.contains(['/', '\\', '.']) {
        return Err(GcliError::InvalidSessionName(name.to_owned()));
    }
    Ok(())
}

/// Named conversations stored as history documents in one directory.
#[derive(Debug, Clone)]
pub struct SessionStore {
    dir: PathBuf,
}

impl SessionStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Store under `<config dir>/gcli/sessions`.
    pub fn open_default() -> Result<Self> {
        Ok(Self::new(config::sessions_dir()?))
    }

    pub fn path(&self, name: &str) -> Result<PathBuf> {
        validate_name(name)?;
        Ok(self.dir.join(format!("{name}.{EXTENSION}")))
    }

    /// Session names, sorted.
    pub fn list(&self) -> Result<Vec<String>> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(error) => return Err(error.into()),
        };

        let mut names = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some(EXTENSION) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) {
                names.push(stem.to_owned());
            }
        }
        names.sort();
        Ok(names)
    }

    pub fn save(&self, name: &str, request: &GenerateRequest) -> Result<PathBuf> {
        let path = self.path(name)?;
        fs::create_dir_all(&self.dir)?;
        history::save(&path, request)?;
        debug!(path = %path.display(), "session saved");
        Ok(path)
    }

    pub fn load(&self, name: &str) -> Result<LoadedHistory> {
        history::load(&self.path(name)?)
    }

    pub fn delete(&self, name: &str) -> Result<()> {
        fs::remove_file(self.path(name)?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_with_separators_are_rejected() {
        assert!(validate_name("work").is_ok());
        for bad in ["", "a/b", "a\\b", "notes.v2", ".."] {
            assert!(
                matches!(validate_name(bad), Err(GcliError::InvalidSessionName(_))),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn missing_directory_lists_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path().join("absent"));
        assert!(store.list().unwrap().is_empty());
    }
}
