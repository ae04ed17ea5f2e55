//! Persists the last-used project across restarts.

use crate::{
    error::{IndexError, Result},
    utils,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const SESSION_VERSION: &str = "1.0";

/// The persisted session record.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SessionState {
    pub project_path: PathBuf,
    #[serde(default)]
    pub config_file: Option<PathBuf>,
    /// Unix timestamp of the last save.
    pub last_accessed: u64,
    pub version: String,
}

/// Reads and writes the session file in a cache directory.
#[derive(Clone, Debug)]
pub struct SessionManager {
    session_file: PathBuf,
}

impl SessionManager {
    pub fn new(cache_dir: impl AsRef<Path>) -> Self {
        Self { session_file: cache_dir.as_ref().join("session.json") }
    }

    /// Saves the session atomically (temp file, then rename). Failures
    /// are logged, never fatal.
    pub fn save(&self, project_path: &Path, config_file: Option<&Path>) {
        if let Err(err) = self.try_save(project_path, config_file) {
            warn!("failed to save session: {err}");
        }
    }

    fn try_save(&self, project_path: &Path, config_file: Option<&Path>) -> Result<()> {
        utils::create_parent_dir_all(&self.session_file)?;
        let state = SessionState {
            project_path: project_path.to_path_buf(),
            config_file: config_file.map(|path| path.to_path_buf()),
            last_accessed: crate::cache::unix_now(),
            version: SESSION_VERSION.to_string(),
        };
        let temp = self.session_file.with_extension("tmp");
        utils::write_json_file(&state, &temp)?;
        std::fs::rename(&temp, &self.session_file)
            .map_err(|err| IndexError::io(err, &self.session_file))?;
        debug!("session saved: \"{}\"", project_path.display());
        Ok(())
    }

    /// Loads the last session. Returns `None` when there is none, the
    /// record is unreadable, or the project directory no longer exists.
    pub fn load(&self) -> Option<SessionState> {
        if !self.session_file.exists() {
            debug!("no saved session found");
            return None;
        }
        let state: SessionState = match utils::read_json_file(&self.session_file) {
            Ok(state) => state,
            Err(err) => {
                warn!("failed to load session: {err}");
                return None;
            }
        };
        if !state.project_path.is_dir() {
            info!(
                "saved project directory no longer exists: \"{}\"",
                state.project_path.display()
            );
            return None;
        }
        debug!("loaded session: \"{}\"", state.project_path.display());
        Some(state)
    }

    pub fn clear(&self) {
        if self.session_file.exists() {
            if let Err(err) = std::fs::remove_file(&self.session_file) {
                warn!("failed to clear session: {err}");
            }
        }
    }

    pub fn has_session(&self) -> bool {
        self.session_file.exists()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_roundtrip() {
        let cache = tempfile::tempdir().unwrap();
        let project = tempfile::tempdir().unwrap();
        let manager = SessionManager::new(cache.path());
        assert!(!manager.has_session());
        assert!(manager.load().is_none());

        manager.save(project.path(), None);
        assert!(manager.has_session());
        let state = manager.load().unwrap();
        assert_eq!(state.project_path, project.path());
        assert_eq!(state.version, SESSION_VERSION);

        manager.clear();
        assert!(!manager.has_session());
    }

    #[test]
    fn vanished_project_discards_the_session() {
        let cache = tempfile::tempdir().unwrap();
        let manager = SessionManager::new(cache.path());
        let project = tempfile::tempdir().unwrap();
        let project_path = project.path().to_path_buf();
        manager.save(&project_path, None);
        drop(project);

        assert!(manager.load().is_none());
        // the file itself remains until cleared
        assert!(manager.has_session());
    }

    #[test]
    fn save_is_atomic_on_disk() {
        let cache = tempfile::tempdir().unwrap();
        let project = tempfile::tempdir().unwrap();
        let manager = SessionManager::new(cache.path());
        manager.save(project.path(), Some(Path::new("/p/config.json")));

        // no temp file left behind
        let leftovers: Vec<_> = std::fs::read_dir(cache.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.path().extension().is_some_and(|ext| ext == "tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }
}
