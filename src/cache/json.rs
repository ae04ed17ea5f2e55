//! Plain-file fallback backend.
//!
//! Stores one JSON blob per indexed file (metadata plus symbols) under
//! the cache directory, a `dependencies.json` edge map and a small
//! `meta.json`. Behavior matches the relational backend except for the
//! transitive reverse-reachability query, which this backend refuses:
//! [`CacheBackend::transitive_dependents`] returns `None` and the
//! incremental coordinator degrades to direct-dependent fan-out.

use crate::{
    cache::{CacheBackend, DependencyStats, FileMetadata},
    error::Result,
    symbols::Symbol,
    utils,
};
use serde::{Deserialize, Serialize};
use std::{
    collections::{BTreeMap, BTreeSet},
    path::{Path, PathBuf},
    sync::Mutex,
};

/// Contents of one per-file blob.
#[derive(Debug, Serialize, Deserialize)]
struct FileBlob {
    metadata: FileMetadata,
    #[serde(default)]
    symbols: Vec<Symbol>,
}

#[derive(Debug, Default)]
struct JsonState {
    /// metadata per file, mirrored from the blobs on open
    files: BTreeMap<PathBuf, FileMetadata>,
    /// source -> included
    dependencies: BTreeMap<PathBuf, BTreeSet<PathBuf>>,
    meta: BTreeMap<String, String>,
}

/// Plain-file JSON backend rooted at a cache directory.
#[derive(Debug)]
pub struct JsonBackend {
    dir: PathBuf,
    state: Mutex<JsonState>,
}

impl JsonBackend {
    pub fn open(dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(dir.join("files"))
            .map_err(|err| crate::error::IndexError::io(err, dir))?;

        let mut state = JsonState::default();
        if let Ok(entries) = std::fs::read_dir(dir.join("files")) {
            for entry in entries.filter_map(|e| e.ok()) {
                match utils::read_json_file::<FileBlob>(entry.path()) {
                    Ok(blob) => {
                        state.files.insert(blob.metadata.file_path.clone(), blob.metadata);
                    }
                    Err(err) => warn!(
                        "ignoring unreadable cache blob \"{}\": {err}",
                        entry.path().display()
                    ),
                }
            }
        }
        if dir.join("dependencies.json").exists() {
            state.dependencies = utils::read_json_file(dir.join("dependencies.json"))?;
        }
        if dir.join("meta.json").exists() {
            state.meta = utils::read_json_file(dir.join("meta.json"))?;
        }
        Ok(Self { dir: dir.to_path_buf(), state: Mutex::new(state) })
    }

    fn blob_path(&self, file: &Path) -> PathBuf {
        let key = utils::content_hash_bytes(file.to_string_lossy().as_bytes());
        self.dir.join("files").join(format!("{key}.json"))
    }

    fn read_blob(&self, file: &Path) -> Result<Option<FileBlob>> {
        let path = self.blob_path(file);
        if !path.exists() {
            return Ok(None);
        }
        Ok(Some(utils::read_json_file(path)?))
    }

    fn write_blob(&self, blob: &FileBlob) -> Result<()> {
        utils::write_json_file(blob, self.blob_path(&blob.metadata.file_path))
    }

    fn persist_dependencies(&self, state: &JsonState) -> Result<()> {
        utils::write_json_file(&state.dependencies, self.dir.join("dependencies.json"))
    }

    fn persist_meta(&self, state: &JsonState) -> Result<()> {
        utils::write_json_file(&state.meta, self.dir.join("meta.json"))
    }
}

impl CacheBackend for JsonBackend {
    fn file_metadata(&self, file: &Path) -> Result<Option<FileMetadata>> {
        Ok(self.state.lock().unwrap().files.get(file).cloned())
    }

    fn all_file_metadata(&self) -> Result<Vec<FileMetadata>> {
        Ok(self.state.lock().unwrap().files.values().cloned().collect())
    }

    fn store_symbols(&self, file: &Path, symbols: &[Symbol]) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        let metadata = match state.files.get(file) {
            Some(metadata) => metadata.clone(),
            None => FileMetadata::new(file, ""),
        };
        let blob = FileBlob { metadata: metadata.clone(), symbols: symbols.to_vec() };
        self.write_blob(&blob)?;
        state.files.insert(file.to_path_buf(), metadata);
        Ok(())
    }

    fn store_file(
        &self,
        metadata: &FileMetadata,
        symbols: &[Symbol],
        includes: &[PathBuf],
    ) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        let blob = FileBlob { metadata: metadata.clone(), symbols: symbols.to_vec() };
        self.write_blob(&blob)?;
        state.files.insert(metadata.file_path.clone(), metadata.clone());
        state
            .dependencies
            .insert(metadata.file_path.clone(), includes.iter().cloned().collect());
        self.persist_dependencies(&state)
    }

    fn load_symbols(&self, file: &Path) -> Result<Vec<Symbol>> {
        Ok(self.read_blob(file)?.map(|blob| blob.symbols).unwrap_or_default())
    }

    fn load_all_symbols(&self) -> Result<Vec<Symbol>> {
        let files: Vec<PathBuf> = self.state.lock().unwrap().files.keys().cloned().collect();
        let mut symbols = Vec::new();
        for file in files {
            symbols.extend(self.load_symbols(&file)?);
        }
        Ok(symbols)
    }

    fn remove_file(&self, file: &Path) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.files.remove(file);
        let path = self.blob_path(file);
        if path.exists() {
            std::fs::remove_file(&path)
                .map_err(|err| crate::error::IndexError::io(err, path))?;
        }
        state.dependencies.remove(file);
        for includes in state.dependencies.values_mut() {
            includes.remove(file);
        }
        self.persist_dependencies(&state)
    }

    fn set_compile_args_hash(&self, file: &Path, args_hash: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        let mut blob = self.read_blob(file)?.unwrap_or_else(|| FileBlob {
            metadata: FileMetadata::new(file, ""),
            symbols: Vec::new(),
        });
        blob.metadata.compile_args_hash = args_hash.to_string();
        self.write_blob(&blob)?;
        state.files.insert(file.to_path_buf(), blob.metadata);
        Ok(())
    }

    fn update_dependencies(&self, source: &Path, includes: &[PathBuf]) -> Result<usize> {
        let mut state = self.state.lock().unwrap();
        let unique: BTreeSet<PathBuf> = includes.iter().cloned().collect();
        let count = unique.len();
        state.dependencies.insert(source.to_path_buf(), unique);
        self.persist_dependencies(&state)?;
        Ok(count)
    }

    fn dependents_of(&self, included: &Path) -> Result<BTreeSet<PathBuf>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .dependencies
            .iter()
            .filter(|(_, includes)| includes.contains(included))
            .map(|(source, _)| source.clone())
            .collect())
    }

    fn dependencies_of(&self, source: &Path) -> Result<BTreeSet<PathBuf>> {
        Ok(self.state.lock().unwrap().dependencies.get(source).cloned().unwrap_or_default())
    }

    fn remove_file_dependencies(&self, file: &Path) -> Result<usize> {
        let mut state = self.state.lock().unwrap();
        let mut removed = state.dependencies.remove(file).map(|set| set.len()).unwrap_or(0);
        for includes in state.dependencies.values_mut() {
            if includes.remove(file) {
                removed += 1;
            }
        }
        self.persist_dependencies(&state)?;
        Ok(removed)
    }

    fn transitive_dependents(&self, _included: &Path) -> Option<Result<BTreeSet<PathBuf>>> {
        // graph queries are the relational backend's capability
        None
    }

    fn dependency_stats(&self) -> Result<DependencyStats> {
        let state = self.state.lock().unwrap();
        let total: usize = state.dependencies.values().map(|set| set.len()).sum();
        let sources = state.dependencies.iter().filter(|(_, set)| !set.is_empty()).count();
        let includes: BTreeSet<&PathBuf> = state.dependencies.values().flatten().collect();
        Ok(DependencyStats {
            total_dependencies: total,
            unique_source_files: sources,
            unique_included_files: includes.len(),
            avg_includes_per_file: if sources > 0 { total as f64 / sources as f64 } else { 0.0 },
        })
    }

    fn clear_dependencies(&self) -> Result<usize> {
        let mut state = self.state.lock().unwrap();
        let removed = state.dependencies.values().map(|set| set.len()).sum();
        state.dependencies.clear();
        self.persist_dependencies(&state)?;
        Ok(removed)
    }

    fn meta(&self, key: &str) -> Result<Option<String>> {
        Ok(self.state.lock().unwrap().meta.get(key).cloned())
    }

    fn set_meta(&self, key: &str, value: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.meta.insert(key.to_string(), value.to_string());
        self.persist_meta(&state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::backend_tests;

    fn backend(dir: &Path) -> JsonBackend {
        JsonBackend::open(dir).unwrap()
    }

    #[test]
    fn file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        backend_tests::file_roundtrip(&backend(dir.path()));
    }

    #[test]
    fn removal_is_complete() {
        let dir = tempfile::tempdir().unwrap();
        backend_tests::removal_is_complete(&backend(dir.path()));
    }

    #[test]
    fn dependency_edges_are_replaced_atomically() {
        let dir = tempfile::tempdir().unwrap();
        backend_tests::dependency_edges_are_replaced_atomically(&backend(dir.path()));
    }

    #[test]
    fn deletion_removes_both_endpoints() {
        let dir = tempfile::tempdir().unwrap();
        backend_tests::deletion_removes_both_endpoints(&backend(dir.path()));
    }

    #[test]
    fn meta_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        backend_tests::meta_roundtrip(&backend(dir.path()));
    }

    #[test]
    fn args_hash_upsert() {
        let dir = tempfile::tempdir().unwrap();
        backend_tests::args_hash_upsert(&backend(dir.path()));
    }

    #[test]
    fn stats_count_edges() {
        let dir = tempfile::tempdir().unwrap();
        backend_tests::stats_count_edges(&backend(dir.path()));
    }

    #[test]
    fn refuses_graph_queries() {
        let dir = tempfile::tempdir().unwrap();
        let backend = backend(dir.path());
        assert!(backend.transitive_dependents(Path::new("/p/w.h")).is_none());
    }

    #[test]
    fn state_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let backend = backend(dir.path());
            backend.set_meta("k", "v").unwrap();
            backend
                .store_file(&FileMetadata::new("/p/a.cpp", "h1"), &[], &[PathBuf::from("/p/w.h")])
                .unwrap();
        }
        let backend = backend(dir.path());
        assert_eq!(backend.meta("k").unwrap(), Some("v".to_string()));
        assert!(backend.file_metadata(Path::new("/p/a.cpp")).unwrap().is_some());
        assert_eq!(
            backend.dependents_of(Path::new("/p/w.h")).unwrap(),
            BTreeSet::from([PathBuf::from("/p/a.cpp")])
        );
    }
}
