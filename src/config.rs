use crate::{
    error::Result,
    utils,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Where to find the project and where to keep its cache.
///
/// The cache directory holds the symbol database (or the per-file JSON
/// blobs of the fallback backend), the header-tracker snapshot and the
/// session file.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectPathsConfig {
    /// Project root directory.
    pub root: PathBuf,
    /// Directory for all persisted index state.
    pub cache: PathBuf,
    /// Path to the compile database.
    pub compile_commands: PathBuf,
    /// Optional user sanitization rules appended to the built-in set.
    pub sanitize_rules: Option<PathBuf>,
}

impl ProjectPathsConfig {
    pub fn builder() -> ProjectPathsConfigBuilder {
        ProjectPathsConfigBuilder::default()
    }

    /// Creates the default layout rooted at the given directory.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        Self::builder().root(root).build()
    }

    /// Returns `true` if the file lives inside the project root.
    pub fn is_project_file(&self, file: &Path) -> bool {
        file.starts_with(&self.root)
    }

    /// Path of the header-tracker snapshot inside the cache dir.
    pub fn header_tracker_file(&self) -> PathBuf {
        self.cache.join("header_tracker.json")
    }

    /// Path of the symbol database inside the cache dir.
    pub fn database_file(&self) -> PathBuf {
        self.cache.join("index.db")
    }

    /// Path of the session file inside the cache dir.
    pub fn session_file(&self) -> PathBuf {
        self.cache.join("session.json")
    }

    /// Converts all `\\` separators to `/`.
    ///
    /// This is a noop on other platforms.
    pub fn slash_paths(&mut self) {
        cfg_if::cfg_if! {
            if #[cfg(windows)] {
                use path_slash::PathBufExt;
                for path in [
                    &mut self.root,
                    &mut self.cache,
                    &mut self.compile_commands,
                ] {
                    *path = PathBuf::from(path.to_slash_lossy().as_ref());
                }
                if let Some(rules) = self.sanitize_rules.as_mut() {
                    *rules = PathBuf::from(rules.to_slash_lossy().as_ref());
                }
            }
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct ProjectPathsConfigBuilder {
    root: Option<PathBuf>,
    cache: Option<PathBuf>,
    compile_commands: Option<PathBuf>,
    sanitize_rules: Option<PathBuf>,
}

impl ProjectPathsConfigBuilder {
    pub fn root(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = Some(root.into());
        self
    }

    pub fn cache(mut self, cache: impl Into<PathBuf>) -> Self {
        self.cache = Some(cache.into());
        self
    }

    pub fn compile_commands(mut self, path: impl Into<PathBuf>) -> Self {
        self.compile_commands = Some(path.into());
        self
    }

    pub fn sanitize_rules(mut self, path: impl Into<PathBuf>) -> Self {
        self.sanitize_rules = Some(path.into());
        self
    }

    pub fn build(self) -> Result<ProjectPathsConfig> {
        let root = self.root.unwrap_or_else(|| PathBuf::from("."));
        let root = utils::canonicalize(root)?;
        let cache = self.cache.unwrap_or_else(|| root.join(".clang-index"));
        let compile_commands =
            self.compile_commands.unwrap_or_else(|| root.join("compile_commands.json"));
        Ok(ProjectPathsConfig { root, cache, compile_commands, sanitize_rules: self.sanitize_rules })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn can_build_default_layout() {
        let dir = tempfile::tempdir().unwrap();
        let paths = ProjectPathsConfig::new(dir.path()).unwrap();
        assert_eq!(paths.compile_commands.file_name().unwrap(), "compile_commands.json");
        assert!(paths.cache.starts_with(&paths.root));
        assert!(paths.is_project_file(&paths.root.join("src/main.cpp")));
        assert!(!paths.is_project_file(Path::new("/elsewhere/main.cpp")));
    }

    #[test]
    fn cache_layout_is_stable() {
        let dir = tempfile::tempdir().unwrap();
        let paths = ProjectPathsConfig::new(dir.path()).unwrap();
        assert_eq!(paths.database_file().file_name().unwrap(), "index.db");
        assert_eq!(paths.header_tracker_file().file_name().unwrap(), "header_tracker.json");
        assert_eq!(paths.session_file().file_name().unwrap(), "session.json");
    }
}
