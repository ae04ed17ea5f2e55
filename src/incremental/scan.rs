//! Detects drift between the on-disk project and the cached index.

use crate::{
    analyzer::Analyzer,
    utils,
};
use std::{
    collections::BTreeSet,
    fmt,
    path::{Path, PathBuf},
};

/// All detected changes since the last analysis.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ChangeSet {
    pub compile_commands_changed: bool,
    /// Source files that are new to the index.
    pub added: BTreeSet<PathBuf>,
    /// Source files whose content hash changed.
    pub modified_sources: BTreeSet<PathBuf>,
    /// Tracked headers whose content hash changed.
    pub modified_headers: BTreeSet<PathBuf>,
    /// Files present in the cache or tracker but gone from disk.
    pub removed: BTreeSet<PathBuf>,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        !self.compile_commands_changed
            && self.added.is_empty()
            && self.modified_sources.is_empty()
            && self.modified_headers.is_empty()
            && self.removed.is_empty()
    }

    pub fn total_changes(&self) -> usize {
        self.added.len()
            + self.modified_sources.len()
            + self.modified_headers.len()
            + self.removed.len()
    }
}

impl fmt::Display for ChangeSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        if self.compile_commands_changed {
            parts.push("compile database changed".to_string());
        }
        if !self.added.is_empty() {
            parts.push(format!("{} added", self.added.len()));
        }
        if !self.modified_sources.is_empty() {
            parts.push(format!("{} modified", self.modified_sources.len()));
        }
        if !self.modified_headers.is_empty() {
            parts.push(format!("{} headers modified", self.modified_headers.len()));
        }
        if !self.removed.is_empty() {
            parts.push(format!("{} removed", self.removed.len()));
        }
        if parts.is_empty() {
            f.write_str("no changes")
        } else {
            f.write_str(&parts.join(", "))
        }
    }
}

enum FileChange {
    Added,
    Modified,
    Unchanged,
}

/// Walks disk and cache to produce the [`ChangeSet`].
pub struct ChangeScanner<'a> {
    analyzer: &'a Analyzer,
}

impl<'a> ChangeScanner<'a> {
    pub fn new(analyzer: &'a Analyzer) -> Self {
        Self { analyzer }
    }

    /// Produces the full change set: compile database drift, added and
    /// modified sources, modified or deleted tracked headers, and cache
    /// rows whose files vanished.
    pub fn scan_for_changes(&self) -> ChangeSet {
        let mut changes = ChangeSet::default();

        if self.compile_commands_changed() {
            changes.compile_commands_changed = true;
            info!("compile database has changed");
        }

        // headers are tracked through the header tracker below, so the
        // source sweep skips them
        for source in utils::project_sources(&self.analyzer.paths().root) {
            let source = utils::normalized(&source);
            match self.check_file(&source) {
                FileChange::Added => {
                    debug!("detected new file \"{}\"", source.display());
                    changes.added.insert(source);
                }
                FileChange::Modified => {
                    debug!("detected modified file \"{}\"", source.display());
                    changes.modified_sources.insert(source);
                }
                FileChange::Unchanged => {}
            }
        }

        for (header, tracked_hash) in self.analyzer.header_tracker().processed_headers() {
            let header = utils::normalized(&header);
            if !header.exists() {
                debug!("detected deleted header \"{}\"", header.display());
                changes.removed.insert(header);
                continue;
            }
            match utils::content_hash(&header) {
                Ok(hash) if hash != tracked_hash => {
                    debug!("detected modified header \"{}\"", header.display());
                    changes.modified_headers.insert(header);
                }
                Ok(_) => {}
                Err(err) => warn!("error checking header \"{}\": {err}", header.display()),
            }
        }

        match self.analyzer.backend().all_file_metadata() {
            Ok(rows) => {
                for row in rows {
                    let cached = utils::normalized(&row.file_path);
                    if !cached.exists() {
                        debug!("detected deleted file \"{}\"", cached.display());
                        changes.removed.insert(cached);
                    }
                }
            }
            Err(err) => warn!("error listing cached files: {err}"),
        }

        if changes.is_empty() {
            debug!("no changes detected");
        } else {
            info!("change scan complete: {changes}");
        }
        changes
    }

    fn check_file(&self, file: &Path) -> FileChange {
        let cached_hash = match self.analyzer.backend().file_metadata(file) {
            Ok(Some(metadata)) if !metadata.file_hash.is_empty() => Some(metadata.file_hash),
            Ok(_) => None,
            Err(err) => {
                warn!("error reading metadata for \"{}\": {err}", file.display());
                None
            }
        };
        // after a warm start the database may be behind the in-memory
        // hash table, which then decides
        let cached_hash = cached_hash.or_else(|| {
            self.analyzer.indexes().read().unwrap().file_hashes.get(file).cloned()
        });

        let Some(cached_hash) = cached_hash else { return FileChange::Added };
        match utils::content_hash(file) {
            Ok(hash) if hash == cached_hash => FileChange::Unchanged,
            Ok(_) => FileChange::Modified,
            Err(err) => {
                warn!("error hashing \"{}\": {err}", file.display());
                FileChange::Modified
            }
        }
    }

    fn compile_commands_changed(&self) -> bool {
        let stored = self.analyzer.compile_commands_hash();
        let path = &self.analyzer.paths().compile_commands;
        if !path.exists() {
            // it existed before iff a hash was stored
            return !stored.is_empty();
        }
        match utils::content_hash(path) {
            Ok(hash) => hash != stored,
            Err(err) => {
                warn!("error checking compile database: {err}");
                false
            }
        }
    }
}
