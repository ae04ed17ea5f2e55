//! Persistent storage for symbols, file metadata, dependency edges and
//! the header-tracker snapshot.
//!
//! Two backends live behind [`CacheBackend`]: the embedded SQLite store
//! ([`SqliteBackend`]) and a plain-file JSON fallback ([`JsonBackend`]).
//! They behave identically except for the transitive reverse-reachability
//! query, which only the relational store can answer; the JSON backend
//! reports the capability as absent and the incremental coordinator runs
//! in a degraded mode.

use crate::{
    error::Result,
    symbols::Symbol,
};
use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeSet,
    path::{Path, PathBuf},
    time::{SystemTime, UNIX_EPOCH},
};

pub mod json;
pub mod sqlite;
pub use json::JsonBackend;
pub use sqlite::SqliteBackend;

/// Meta key of the compile database content hash.
pub const META_COMPILE_COMMANDS_HASH: &str = "compile_commands_hash";

/// One row of per-file bookkeeping.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FileMetadata {
    pub file_path: PathBuf,
    /// Content digest of the file when it was indexed.
    pub file_hash: String,
    /// 16-hex fingerprint of the argument vector used to parse it.
    #[serde(default)]
    pub compile_args_hash: String,
    /// Unix timestamp of the indexing run.
    pub indexed_at: u64,
    pub symbol_count: u64,
}

impl FileMetadata {
    pub fn new(file_path: impl Into<PathBuf>, file_hash: impl Into<String>) -> Self {
        Self {
            file_path: file_path.into(),
            file_hash: file_hash.into(),
            compile_args_hash: String::new(),
            indexed_at: unix_now(),
            symbol_count: 0,
        }
    }
}

/// Current unix time in whole seconds.
pub(crate) fn unix_now() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or_default()
}

/// Aggregate numbers over the dependency table.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct DependencyStats {
    pub total_dependencies: usize,
    pub unique_source_files: usize,
    pub unique_included_files: usize,
    pub avg_includes_per_file: f64,
}

/// Storage backend for one project's index.
///
/// Writers serialize on the backend's internal lock; readers never
/// observe a half-updated file because every per-file mutation runs in a
/// single transaction.
pub trait CacheBackend: Send + Sync {
    /// Looks up the bookkeeping row for a file.
    fn file_metadata(&self, file: &Path) -> Result<Option<FileMetadata>>;

    /// All bookkeeping rows, for the change scanner's deletion sweep.
    fn all_file_metadata(&self) -> Result<Vec<FileMetadata>>;

    /// Atomically replaces the symbols owned by `file`.
    fn store_symbols(&self, file: &Path, symbols: &[Symbol]) -> Result<()>;

    /// Writes the metadata row, its symbol rows and its outgoing
    /// dependency edges in one transaction.
    fn store_file(
        &self,
        metadata: &FileMetadata,
        symbols: &[Symbol],
        includes: &[PathBuf],
    ) -> Result<()>;

    /// Symbols owned by one file.
    fn load_symbols(&self, file: &Path) -> Result<Vec<Symbol>>;

    /// Every stored symbol, for warm starts.
    fn load_all_symbols(&self) -> Result<Vec<Symbol>>;

    /// Removes the metadata row, the symbol rows and every dependency
    /// edge touching `file`, atomically.
    fn remove_file(&self, file: &Path) -> Result<()>;

    /// Upserts only the `compile_args_hash` column for a file.
    fn set_compile_args_hash(&self, file: &Path, args_hash: &str) -> Result<()>;

    /// Deletes all edges rooted at `source` and inserts the new set, in
    /// one transaction. Returns the number of edges inserted.
    fn update_dependencies(&self, source: &Path, includes: &[PathBuf]) -> Result<usize>;

    /// Direct reverse lookup: sources with an edge onto `included`.
    fn dependents_of(&self, included: &Path) -> Result<BTreeSet<PathBuf>>;

    /// Forward lookup: everything `source` includes.
    fn dependencies_of(&self, source: &Path) -> Result<BTreeSet<PathBuf>>;

    /// Removes every edge where `file` appears as either endpoint.
    /// Returns the number of edges removed.
    fn remove_file_dependencies(&self, file: &Path) -> Result<usize>;

    /// Transitive reverse reachability. `None` when the backend lacks
    /// the capability (JSON fallback); `Some` result visits every node
    /// at most once and terminates on cycles.
    fn transitive_dependents(&self, included: &Path) -> Option<Result<BTreeSet<PathBuf>>>;

    fn dependency_stats(&self) -> Result<DependencyStats>;

    /// Clears the whole dependency table, returning the removed count.
    fn clear_dependencies(&self) -> Result<usize>;

    /// Reads a small metadata value (compile-commands fingerprint etc.).
    fn meta(&self, key: &str) -> Result<Option<String>>;

    /// Writes a small metadata value.
    fn set_meta(&self, key: &str, value: &str) -> Result<()>;
}
