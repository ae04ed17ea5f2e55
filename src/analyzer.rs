//! Drives parse, extraction, merge and persistence for one project.
//!
//! The analyzer owns the in-memory indexes behind a single reader-writer
//! lock, schedules translation units onto a rayon pool and reconciles the
//! records the workers emit. Determinism of the final state does not rely
//! on scheduling: header processing is first-win unique, dependency
//! updates are idempotent, and the definition-wins merge commutes for
//! identical inputs.

use crate::{
    cache::{CacheBackend, FileMetadata, META_COMPILE_COMMANDS_HASH},
    commands::CompileCommands,
    config::ProjectPathsConfig,
    error::{IndexError, Result},
    extract::SymbolExtractor,
    frontend::{Frontend, ParseOptions, ParsedUnit},
    headers::{HeaderSnapshot, HeaderTracker},
    resolver::DependencyGraph,
    symbols::Symbol,
    utils,
};
use serde::Serialize;
use std::{
    collections::{BTreeMap, HashMap},
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc, Mutex, RwLock,
    },
    time::{Duration, Instant},
};

/// Tuning knobs for the analyzer.
#[derive(Clone, Debug)]
pub struct AnalyzerOptions {
    /// Worker count; 1 disables parallelism.
    pub jobs: usize,
    /// Use hardcoded default arguments for files absent from the compile
    /// database.
    pub fallback_args: bool,
    /// Per-TU wall-clock budget. A unit that exceeds it is recorded as a
    /// parse error and its symbols are discarded.
    pub parse_timeout: Duration,
}

impl Default for AnalyzerOptions {
    fn default() -> Self {
        Self {
            jobs: num_cpus::get(),
            fallback_args: true,
            parse_timeout: Duration::from_secs(60),
        }
    }
}

/// The in-memory indexes, all guarded by one reader-writer lock.
#[derive(Debug, Default)]
pub struct SymbolIndexes {
    pub class_index: HashMap<String, Vec<Arc<Symbol>>>,
    pub function_index: HashMap<String, Vec<Arc<Symbol>>>,
    pub file_index: HashMap<PathBuf, Vec<Arc<Symbol>>>,
    pub usr_index: HashMap<String, Arc<Symbol>>,
    pub file_hashes: HashMap<PathBuf, String>,
}

impl SymbolIndexes {
    /// Replaces everything owned by `file` with the new batch, applying
    /// the definition-wins merge against records from other files.
    pub fn replace_file(&mut self, file: &Path, symbols: Vec<Symbol>) {
        self.remove_file(file);
        for symbol in symbols {
            self.insert(Arc::new(symbol));
        }
    }

    fn insert(&mut self, symbol: Arc<Symbol>) {
        self.file_index.entry(symbol.file.clone()).or_default().push(symbol.clone());

        let into_name_indexes = if symbol.usr.is_empty() {
            true
        } else {
            match self.usr_index.get(&symbol.usr) {
                Some(existing) => {
                    if symbol.is_richer_than(existing) {
                        let stale = existing.clone();
                        self.usr_index.insert(symbol.usr.clone(), symbol.clone());
                        self.remove_from_name_indexes(&stale);
                        true
                    } else {
                        // keep the richer record in the primary indexes;
                        // this one stays reachable through file queries
                        false
                    }
                }
                None => {
                    self.usr_index.insert(symbol.usr.clone(), symbol.clone());
                    true
                }
            }
        };

        if into_name_indexes {
            if symbol.kind.is_class_like() {
                self.class_index.entry(symbol.name.clone()).or_default().push(symbol);
            } else if symbol.kind.is_callable() {
                self.function_index.entry(symbol.name.clone()).or_default().push(symbol);
            }
        }
    }

    /// Drops every record owned by `file` from all indexes.
    pub fn remove_file(&mut self, file: &Path) {
        let Some(symbols) = self.file_index.remove(file) else { return };
        for symbol in symbols {
            if !symbol.usr.is_empty() {
                if let Some(existing) = self.usr_index.get(&symbol.usr) {
                    if Arc::ptr_eq(existing, &symbol) {
                        self.usr_index.remove(&symbol.usr);
                    }
                }
            }
            self.remove_from_name_indexes(&symbol);
        }
    }

    fn remove_from_name_indexes(&mut self, symbol: &Arc<Symbol>) {
        let bucket = if symbol.kind.is_class_like() {
            self.class_index.get_mut(&symbol.name)
        } else if symbol.kind.is_callable() {
            self.function_index.get_mut(&symbol.name)
        } else {
            None
        };
        if let Some(entries) = bucket {
            entries.retain(|entry| !Arc::ptr_eq(entry, symbol));
            if entries.is_empty() {
                if symbol.kind.is_class_like() {
                    self.class_index.remove(&symbol.name);
                } else {
                    self.function_index.remove(&symbol.name);
                }
            }
        }
    }

    pub fn symbol_count(&self) -> usize {
        self.file_index.values().map(|symbols| symbols.len()).sum()
    }
}

/// Outcome of indexing one file.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FileOutcome {
    Parsed,
    Cached,
    Failed,
}

/// Summary of a full indexing run.
#[derive(Clone, Debug, Default, Serialize)]
pub struct IndexSummary {
    pub files_total: usize,
    pub files_parsed: usize,
    pub files_cached: usize,
    pub files_failed: usize,
    pub elapsed_seconds: f64,
}

/// Progress numbers for `get_indexing_status`.
#[derive(Clone, Debug, Serialize)]
pub struct IndexingStatus {
    pub is_indexing: bool,
    pub files_total: usize,
    pub files_processed: usize,
    pub symbol_count: usize,
    pub is_fully_indexed: bool,
}

/// Aggregate statistics for `get_stats`.
#[derive(Clone, Debug, Serialize)]
pub struct IndexStats {
    pub files_indexed: usize,
    pub symbol_count: usize,
    pub class_names: usize,
    pub function_names: usize,
    pub processed_headers: usize,
    pub parse_errors: usize,
    pub dependency_stats: crate::cache::DependencyStats,
}

/// Orchestrator for one project's index.
pub struct Analyzer {
    paths: ProjectPathsConfig,
    options: AnalyzerOptions,
    frontend: Arc<dyn Frontend>,
    backend: Arc<dyn CacheBackend>,
    dependency_graph: DependencyGraph,
    header_tracker: Arc<HeaderTracker>,
    commands: RwLock<CompileCommands>,
    indexes: Arc<RwLock<SymbolIndexes>>,
    compile_commands_hash: Mutex<String>,
    parse_errors: Mutex<BTreeMap<PathBuf, String>>,
    indexing: AtomicBool,
    files_total: AtomicUsize,
    files_processed: AtomicUsize,
    fully_indexed: AtomicBool,
}

impl std::fmt::Debug for Analyzer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Analyzer").field("paths", &self.paths).finish_non_exhaustive()
    }
}

impl Analyzer {
    pub fn new(
        paths: ProjectPathsConfig,
        frontend: Arc<dyn Frontend>,
        backend: Arc<dyn CacheBackend>,
        options: AnalyzerOptions,
    ) -> Self {
        let builtin = frontend.builtin_include_dir().map(|dir| dir.to_path_buf());
        let commands = CompileCommands::load(&paths, builtin);
        let dependency_graph = DependencyGraph::new(backend.clone());
        Self {
            paths,
            options,
            frontend,
            backend,
            dependency_graph,
            header_tracker: Arc::new(HeaderTracker::new()),
            commands: RwLock::new(commands),
            indexes: Arc::new(RwLock::new(SymbolIndexes::default())),
            compile_commands_hash: Mutex::new(String::new()),
            parse_errors: Mutex::new(BTreeMap::new()),
            indexing: AtomicBool::new(false),
            files_total: AtomicUsize::new(0),
            files_processed: AtomicUsize::new(0),
            fully_indexed: AtomicBool::new(false),
        }
    }

    pub fn paths(&self) -> &ProjectPathsConfig {
        &self.paths
    }

    pub fn dependency_graph(&self) -> &DependencyGraph {
        &self.dependency_graph
    }

    pub fn header_tracker(&self) -> &HeaderTracker {
        &self.header_tracker
    }

    pub fn backend(&self) -> &Arc<dyn CacheBackend> {
        &self.backend
    }

    /// Shared handle to the in-memory indexes, for the search engine.
    pub fn indexes(&self) -> Arc<RwLock<SymbolIndexes>> {
        self.indexes.clone()
    }

    pub(crate) fn commands(&self) -> &RwLock<CompileCommands> {
        &self.commands
    }

    pub(crate) fn compile_commands_hash(&self) -> String {
        self.compile_commands_hash.lock().unwrap().clone()
    }

    pub(crate) fn set_compile_commands_hash(&self, hash: String) {
        *self.compile_commands_hash.lock().unwrap() = hash;
    }

    pub fn fallback_args_enabled(&self) -> bool {
        self.options.fallback_args
    }

    /// Restores file hashes, symbols, the header-tracker snapshot and the
    /// compile-commands fingerprint from the cache.
    pub fn load_cache(&self) -> Result<()> {
        let metadata = self.backend.all_file_metadata()?;
        let symbols = self.backend.load_all_symbols()?;
        {
            let mut indexes = self.indexes.write().unwrap();
            for row in &metadata {
                if !row.file_hash.is_empty() {
                    indexes.file_hashes.insert(row.file_path.clone(), row.file_hash.clone());
                }
            }
            let mut by_file: BTreeMap<PathBuf, Vec<Symbol>> = BTreeMap::new();
            for symbol in symbols {
                by_file.entry(symbol.file.clone()).or_default().push(symbol);
            }
            for (file, symbols) in by_file {
                indexes.replace_file(&file, symbols);
            }
        }

        let snapshot_path = self.paths.header_tracker_file();
        if snapshot_path.exists() {
            match utils::read_json_file::<HeaderSnapshot>(&snapshot_path) {
                Ok(snapshot) => self.header_tracker.restore_processed_headers(snapshot),
                Err(err) => warn!("ignoring unreadable header tracker snapshot: {err}"),
            }
        }

        if let Some(hash) = self.backend.meta(META_COMPILE_COMMANDS_HASH)? {
            self.set_compile_commands_hash(hash);
        }
        debug!(
            "cache loaded: {} files, {} headers tracked",
            metadata.len(),
            self.header_tracker.processed_count()
        );
        Ok(())
    }

    /// Indexes every translation unit under the project root.
    pub fn index_project(&self) -> Result<IndexSummary> {
        let started = Instant::now();
        self.indexing.store(true, Ordering::SeqCst);
        self.fully_indexed.store(false, Ordering::SeqCst);

        let sources: Vec<PathBuf> =
            utils::project_sources(&self.paths.root).iter().map(utils::normalized).collect();
        self.files_total.store(sources.len(), Ordering::SeqCst);
        self.files_processed.store(0, Ordering::SeqCst);
        info!("indexing {} translation units", sources.len());

        let outcomes = self.run_workers(&sources, false);

        self.persist_session_state()?;
        self.indexing.store(false, Ordering::SeqCst);
        self.fully_indexed.store(true, Ordering::SeqCst);

        let summary = IndexSummary {
            files_total: sources.len(),
            files_parsed: outcomes.iter().filter(|o| **o == FileOutcome::Parsed).count(),
            files_cached: outcomes.iter().filter(|o| **o == FileOutcome::Cached).count(),
            files_failed: outcomes.iter().filter(|o| **o == FileOutcome::Failed).count(),
            elapsed_seconds: started.elapsed().as_secs_f64(),
        };
        info!(
            "indexing finished: {} parsed, {} cached, {} failed in {:.2}s",
            summary.files_parsed, summary.files_cached, summary.files_failed,
            summary.elapsed_seconds
        );
        Ok(summary)
    }

    /// Re-parses the given set, bypassing the content-hash cache.
    pub fn reanalyze_files(&self, files: &[PathBuf]) -> usize {
        if files.is_empty() {
            return 0;
        }
        self.files_total.store(files.len(), Ordering::SeqCst);
        self.files_processed.store(0, Ordering::SeqCst);
        self.indexing.store(true, Ordering::SeqCst);
        let outcomes = self.run_workers(files, true);
        self.indexing.store(false, Ordering::SeqCst);
        if let Err(err) = self.persist_session_state() {
            warn!("failed to persist session state: {err}");
        }
        outcomes.iter().filter(|o| **o != FileOutcome::Failed).count()
    }

    /// Schedules the files onto workers. With one job the files run
    /// sequentially on the calling thread; the contracts hold either
    /// way.
    fn run_workers(&self, files: &[PathBuf], force: bool) -> Vec<FileOutcome> {
        if self.options.jobs > 1 && files.len() > 1 {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(self.options.jobs)
                .build()
                .expect("worker pool construction cannot fail");
            pool.install(|| {
                use rayon::prelude::*;
                files.par_iter().map(|file| self.index_one(file, force)).collect()
            })
        } else {
            files.iter().map(|file| self.index_one(file, force)).collect()
        }
    }

    fn index_one(&self, file: &Path, force: bool) -> FileOutcome {
        let outcome = self.index_file(file, force);
        self.files_processed.fetch_add(1, Ordering::SeqCst);
        match outcome {
            Ok(outcome) => outcome,
            Err(err) => {
                error!("failed to index \"{}\": {err}", file.display());
                self.record_parse_error(file, err.to_string());
                FileOutcome::Failed
            }
        }
    }

    /// Parses one translation unit and merges its results. `force`
    /// bypasses the content-hash cache check.
    pub fn index_file(&self, file: &Path, force: bool) -> Result<FileOutcome> {
        let file = utils::normalized(file);
        let content_hash = utils::content_hash(&file)?;

        if !force && self.is_up_to_date(&file, &content_hash) {
            trace!("\"{}\" is up to date", file.display());
            return Ok(FileOutcome::Cached);
        }

        let args = self
            .commands
            .read()
            .unwrap()
            .args_with_fallback(&file, self.options.fallback_args)
            .unwrap_or_else(|| {
                warn!(
                    "no compile arguments for \"{}\", parsing without arguments",
                    file.display()
                );
                Vec::new()
            });

        let started = Instant::now();
        let unit = self.parse_with_retries(&file, &args)?;
        if started.elapsed() > self.options.parse_timeout {
            self.record_parse_error(&file, "exceeded per-file parse budget".to_string());
            return Err(IndexError::parse(&file, "exceeded per-file parse budget"));
        }

        let extraction =
            SymbolExtractor::new(&file, &self.paths, &self.header_tracker).extract(&unit);

        if unit.has_errors() {
            self.record_parse_error(&file, unit.error_messages().join("\n"));
        } else {
            self.parse_errors.lock().unwrap().remove(&file);
        }

        self.merge_and_persist(&file, &content_hash, extraction, &unit, &args)?;
        Ok(FileOutcome::Parsed)
    }

    fn is_up_to_date(&self, file: &Path, content_hash: &str) -> bool {
        let known = {
            let indexes = self.indexes.read().unwrap();
            indexes.file_hashes.get(file).map(|hash| hash == content_hash)
        };
        match known {
            Some(matches) => matches,
            // not in memory: fall back to the metadata row
            None => match self.backend.file_metadata(file) {
                Ok(Some(metadata)) => metadata.file_hash == content_hash,
                Ok(None) => false,
                Err(err) => {
                    // a cache error means re-parse, never stale data
                    warn!("cache lookup failed for \"{}\": {err}", file.display());
                    false
                }
            },
        }
    }

    /// Runs the parse retry ladder: full options first, then
    /// progressively laxer ones. A unit with fatal diagnostics triggers
    /// the next rung; a partially parsed unit with plain errors is used
    /// as-is.
    fn parse_with_retries(&self, file: &Path, args: &[String]) -> Result<ParsedUnit> {
        let mut last_error = None;
        let mut fatal_unit = None;
        for (attempt, options) in ParseOptions::retry_ladder().into_iter().enumerate() {
            match self.frontend.parse(file, args, options) {
                Ok(unit) => {
                    let has_fatal = unit
                        .diagnostics
                        .iter()
                        .any(|d| d.severity == crate::frontend::DiagnosticSeverity::Fatal);
                    if !has_fatal {
                        if attempt > 0 {
                            debug!(
                                "\"{}\" parsed on retry {attempt} with laxer options",
                                file.display()
                            );
                        }
                        return Ok(unit);
                    }
                    fatal_unit = Some(unit);
                }
                Err(err) => {
                    debug!("parse attempt {attempt} failed for \"{}\": {err}", file.display());
                    last_error = Some(err);
                }
            }
        }
        // symbols from partially parsed units are still worth emitting
        if let Some(unit) = fatal_unit {
            warn!("\"{}\" parsed with fatal diagnostics, keeping partial result", file.display());
            return Ok(unit);
        }
        Err(last_error.unwrap_or_else(|| IndexError::parse(file, "all parse attempts failed")))
    }

    /// Inserts the extraction into the in-memory indexes and writes
    /// through to the cache, one file's worth per writer section.
    fn merge_and_persist(
        &self,
        source: &Path,
        content_hash: &str,
        extraction: crate::extract::Extraction,
        unit: &ParsedUnit,
        args: &[String],
    ) -> Result<()> {
        let mut by_file: BTreeMap<PathBuf, Vec<Symbol>> = BTreeMap::new();
        for symbol in extraction.symbols {
            by_file.entry(symbol.file.clone()).or_default().push(symbol);
        }
        let source_symbols = by_file.remove(source).unwrap_or_default();

        {
            let mut indexes = self.indexes.write().unwrap();
            indexes.replace_file(source, source_symbols.clone());
            indexes.file_hashes.insert(source.to_path_buf(), content_hash.to_string());
            for ((header, hash), symbols) in
                extraction.claimed_headers.iter().map(|claim| {
                    let symbols = by_file.get(&claim.0).cloned().unwrap_or_default();
                    (claim.clone(), symbols)
                })
            {
                indexes.replace_file(&header, symbols);
                indexes.file_hashes.insert(header, hash);
            }
        }

        let mut metadata = FileMetadata::new(source, content_hash);
        metadata.compile_args_hash = utils::hash_args(args);
        metadata.symbol_count = source_symbols.len() as u64;
        self.backend.store_file(&metadata, &source_symbols, &unit.includes)?;

        for (header, hash) in &extraction.claimed_headers {
            let symbols = by_file.remove(header).unwrap_or_default();
            self.backend.store_symbols(header, &symbols)?;
            self.header_tracker.mark_completed(header, hash);
        }
        Ok(())
    }

    /// Writes the header-tracker snapshot and the compile-commands
    /// fingerprint.
    pub fn persist_session_state(&self) -> Result<()> {
        utils::write_json_file(
            &self.header_tracker.processed_headers(),
            self.paths.header_tracker_file(),
        )?;
        let hash = self.commands.read().unwrap().content_hash().to_string();
        self.backend.set_meta(META_COMPILE_COMMANDS_HASH, &hash)?;
        self.set_compile_commands_hash(hash);
        Ok(())
    }

    /// Removes a deleted file: its cache rows, its dependency edges, its
    /// tracker entry and its in-memory records.
    pub fn remove_file(&self, file: &Path) -> Result<()> {
        info!("removing deleted file \"{}\"", file.display());
        self.backend.remove_file(file)?;
        {
            let mut indexes = self.indexes.write().unwrap();
            indexes.remove_file(file);
            indexes.file_hashes.remove(file);
        }
        if utils::is_header(file) {
            self.header_tracker.invalidate_header(file);
        }
        self.parse_errors.lock().unwrap().remove(file);
        Ok(())
    }

    pub fn record_parse_error(&self, file: &Path, message: String) {
        self.parse_errors.lock().unwrap().insert(file.to_path_buf(), message);
    }

    pub fn parse_errors(&self) -> BTreeMap<PathBuf, String> {
        self.parse_errors.lock().unwrap().clone()
    }

    pub fn indexing_status(&self) -> IndexingStatus {
        let symbol_count = self.indexes.read().unwrap().symbol_count();
        IndexingStatus {
            is_indexing: self.indexing.load(Ordering::SeqCst),
            files_total: self.files_total.load(Ordering::SeqCst),
            files_processed: self.files_processed.load(Ordering::SeqCst),
            symbol_count,
            is_fully_indexed: self.fully_indexed.load(Ordering::SeqCst),
        }
    }

    pub fn stats(&self) -> IndexStats {
        let indexes = self.indexes.read().unwrap();
        IndexStats {
            files_indexed: indexes.file_index.len(),
            symbol_count: indexes.symbol_count(),
            class_names: indexes.class_index.len(),
            function_names: indexes.function_index.len(),
            processed_headers: self.header_tracker.processed_count(),
            parse_errors: self.parse_errors.lock().unwrap().len(),
            dependency_stats: self.dependency_graph.stats(),
        }
    }
}
