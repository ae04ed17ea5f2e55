#![doc = include_str!("../README.md")]
#![warn(rustdoc::all)]
#![deny(unused_must_use, rust_2018_idioms)]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]

#[macro_use]
extern crate tracing;

pub mod error;

pub mod analyzer;
pub use analyzer::{Analyzer, AnalyzerOptions, IndexStats, IndexSummary, IndexingStatus};

pub mod cache;
pub use cache::{CacheBackend, JsonBackend, SqliteBackend};

pub mod commands;
pub use commands::{CompileCommands, CompileCommandsStats};

pub mod config;
pub use config::ProjectPathsConfig;

pub mod extract;

pub mod frontend;
pub use frontend::{ClangFrontend, Frontend};

pub mod headers;
pub use headers::HeaderTracker;

pub mod incremental;
pub use incremental::{AnalysisResult, ChangeScanner, ChangeSet, IncrementalAnalyzer};

pub mod report;

pub mod resolver;
pub use resolver::DependencyGraph;

pub mod search;
pub use search::{ClassLookup, SearchEngine, SearchFilters, SearchResults};

pub mod session;
pub use session::{SessionManager, SessionState};

pub mod symbols;
pub use symbols::{Symbol, SymbolKind};

pub mod utils;

use crate::error::Result;
use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

/// An indexed C/C++ project: the facade the tool layer talks to.
///
/// Owns the analyzer, the query engine and the session record. All query
/// methods are pure reads over the in-memory state and run concurrently
/// with indexing.
pub struct Project {
    /// The layout of the project.
    pub paths: ProjectPathsConfig,
    analyzer: Arc<Analyzer>,
    search: SearchEngine,
    session: SessionManager,
}

impl std::fmt::Debug for Project {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Project").field("paths", &self.paths).finish_non_exhaustive()
    }
}

impl Project {
    /// Convenience function to call `ProjectBuilder::default()`.
    pub fn builder() -> ProjectBuilder {
        ProjectBuilder::default()
    }

    /// Opens the project rooted at `root` with the default frontend and
    /// cache backend, restoring any persisted index state.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        Self::builder().paths(ProjectPathsConfig::new(root.into())?).build()
    }

    /// Reopens the project recorded in the given cache directory's
    /// session file, if it still exists on disk.
    pub fn restore_last_session(cache_dir: &Path) -> Result<Option<Self>> {
        let Some(state) = SessionManager::new(cache_dir).load() else { return Ok(None) };
        Ok(Some(Self::open(state.project_path)?))
    }

    /// The analyzer driving this project.
    pub fn analyzer(&self) -> &Arc<Analyzer> {
        &self.analyzer
    }

    /// Runs the full indexing pipeline over every translation unit.
    pub fn index_project(&self) -> Result<IndexSummary> {
        self.analyzer.index_project()
    }

    /// Re-analyzes exactly what changed since the last run.
    pub fn refresh_if_needed(&self) -> Result<AnalysisResult> {
        IncrementalAnalyzer::new(&self.analyzer).refresh_if_needed()
    }

    pub fn get_indexing_status(&self) -> IndexingStatus {
        self.analyzer.indexing_status()
    }

    pub fn get_stats(&self) -> IndexStats {
        self.analyzer.stats()
    }

    pub fn get_parse_errors(&self) -> std::collections::BTreeMap<PathBuf, String> {
        self.analyzer.parse_errors()
    }

    pub fn get_compile_commands_stats(&self) -> CompileCommandsStats {
        self.analyzer.commands().read().unwrap().stats()
    }

    pub fn search_classes(
        &self,
        pattern: &str,
        filters: &SearchFilters,
    ) -> Result<SearchResults> {
        self.search.search_classes(pattern, filters)
    }

    pub fn search_functions(
        &self,
        pattern: &str,
        filters: &SearchFilters,
    ) -> Result<SearchResults> {
        self.search.search_functions(pattern, filters)
    }

    pub fn search_symbols(
        &self,
        pattern: &str,
        symbol_types: Option<&[String]>,
        filters: &SearchFilters,
    ) -> Result<search::SymbolSearchResults> {
        self.search.search_symbols(pattern, symbol_types, filters)
    }

    pub fn get_class_info(&self, class_name: &str) -> Result<Option<ClassLookup>> {
        self.search.get_class_info(class_name)
    }

    pub fn get_function_signature(
        &self,
        function_name: &str,
        class_name: Option<&str>,
    ) -> Vec<String> {
        self.search.get_function_signature(function_name, class_name)
    }

    pub fn get_derived_classes(&self, class_name: &str) -> Vec<search::SymbolMatch> {
        self.search.get_derived_classes(class_name)
    }

    /// Symbols in files whose path ends with `file_name`. A miss comes
    /// back as a structured error carrying similar indexed file names.
    pub fn find_symbols_in_file(&self, file_name: &str) -> Result<Vec<search::SymbolMatch>> {
        let symbols = self.search.find_symbols_in_file(file_name);
        if symbols.is_empty() {
            let similar = self.search.similar_file_names(file_name);
            if !similar.is_empty() {
                return Err(error::IndexError::msg(format!(
                    "no indexed file matches \"{file_name}\"; similar files: {}",
                    similar
                        .iter()
                        .map(|p| p.display().to_string())
                        .collect::<Vec<_>>()
                        .join(", ")
                )));
            }
        }
        Ok(symbols)
    }

    /// The session record manager for this project's cache directory.
    pub fn session(&self) -> &SessionManager {
        &self.session
    }
}

/// Builds a [`Project`], defaulting to the libclang frontend and the
/// SQLite cache backend with a JSON fallback.
#[derive(Default)]
pub struct ProjectBuilder {
    paths: Option<ProjectPathsConfig>,
    frontend: Option<Arc<dyn Frontend>>,
    backend: Option<Arc<dyn CacheBackend>>,
    options: AnalyzerOptions,
}

impl ProjectBuilder {
    #[must_use]
    pub fn paths(mut self, paths: ProjectPathsConfig) -> Self {
        self.paths = Some(paths);
        self
    }

    /// Overrides the frontend; tests use this to index without a
    /// loadable libclang.
    #[must_use]
    pub fn frontend(mut self, frontend: Arc<dyn Frontend>) -> Self {
        self.frontend = Some(frontend);
        self
    }

    /// Overrides the cache backend.
    #[must_use]
    pub fn backend(mut self, backend: Arc<dyn CacheBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Sets the maximum number of parallel parse workers.
    ///
    /// # Panics
    ///
    /// if `jobs == 0`
    #[must_use]
    pub fn jobs(mut self, jobs: usize) -> Self {
        assert!(jobs > 0);
        self.options.jobs = jobs;
        self
    }

    /// Disables the hardcoded fallback arguments for files missing from
    /// the compile database.
    #[must_use]
    pub fn no_fallback_args(mut self) -> Self {
        self.options.fallback_args = false;
        self
    }

    #[must_use]
    pub fn parse_timeout(mut self, timeout: std::time::Duration) -> Self {
        self.options.parse_timeout = timeout;
        self
    }

    pub fn build(self) -> Result<Project> {
        let Self { paths, frontend, backend, options } = self;

        let mut paths = match paths {
            Some(paths) => paths,
            None => ProjectPathsConfig::new(".")?,
        };
        // ensures we always use `/` paths on windows
        paths.slash_paths();

        let frontend: Arc<dyn Frontend> = match frontend {
            Some(frontend) => frontend,
            None => Arc::new(ClangFrontend::new()?),
        };

        let backend: Arc<dyn CacheBackend> = match backend {
            Some(backend) => backend,
            None => match SqliteBackend::open(&paths.database_file()) {
                Ok(backend) => Arc::new(backend),
                Err(err) => {
                    // degraded but functional; transitive dependency
                    // queries are unavailable on this backend
                    warn!("embedded database unavailable ({err}), using JSON cache backend");
                    Arc::new(JsonBackend::open(&paths.cache)?)
                }
            },
        };

        let analyzer = Arc::new(Analyzer::new(paths.clone(), frontend, backend, options));
        analyzer.load_cache()?;

        let search = SearchEngine::new(analyzer.indexes());
        let session = SessionManager::new(&paths.cache);
        session.save(&paths.root, None);

        Ok(Project { paths, analyzer, search, session })
    }
}
