//! Per-file argument diffs across compile database versions.

use crate::{
    cache::CacheBackend,
    utils,
};
use std::{
    collections::{BTreeSet, HashMap},
    path::{Path, PathBuf},
    sync::Arc,
};

/// Files whose compile database entries appeared, vanished or changed.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CommandsDiff {
    pub added: BTreeSet<PathBuf>,
    pub removed: BTreeSet<PathBuf>,
    pub changed: BTreeSet<PathBuf>,
}

/// Compares compile database versions and persists per-file argument
/// fingerprints for the next comparison.
pub struct CompileCommandsDiffer {
    backend: Arc<dyn CacheBackend>,
}

impl CompileCommandsDiffer {
    pub fn new(backend: Arc<dyn CacheBackend>) -> Self {
        Self { backend }
    }

    /// Computes the entry-level diff. `changed` uses list equality on the
    /// argument vectors, so reordering counts as a change.
    pub fn compute_diff(
        old_commands: &HashMap<PathBuf, Vec<String>>,
        new_commands: &HashMap<PathBuf, Vec<String>>,
    ) -> CommandsDiff {
        let mut diff = CommandsDiff::default();
        for file in new_commands.keys() {
            if !old_commands.contains_key(file) {
                diff.added.insert(file.clone());
            }
        }
        for (file, old_args) in old_commands {
            match new_commands.get(file) {
                None => {
                    diff.removed.insert(file.clone());
                }
                Some(new_args) if new_args != old_args => {
                    diff.changed.insert(file.clone());
                }
                Some(_) => {}
            }
        }
        debug!(
            "compile commands diff: +{} -{} ~{}",
            diff.added.len(),
            diff.removed.len(),
            diff.changed.len()
        );
        diff
    }

    /// Stores the 16-hex argument fingerprint of every entry so the next
    /// load can compare cheaply. Returns how many were stored.
    pub fn store_current_commands(&self, commands: &HashMap<PathBuf, Vec<String>>) -> usize {
        let mut stored = 0;
        for (file, args) in commands {
            match self.backend.set_compile_args_hash(file, &utils::hash_args(args)) {
                Ok(()) => stored += 1,
                Err(err) => {
                    error!("failed to store args hash for \"{}\": {err}", file.display())
                }
            }
        }
        debug!("stored {stored} compile command hashes");
        stored
    }

    /// Compares the current arguments against the stored fingerprint.
    /// Missing fingerprints count as changed.
    pub fn has_args_changed(&self, file: &Path, current_args: &[String]) -> bool {
        let stored = match self.backend.file_metadata(file) {
            Ok(Some(metadata)) if !metadata.compile_args_hash.is_empty() => {
                metadata.compile_args_hash
            }
            _ => return true,
        };
        utils::hash_args(current_args) != stored
    }
}
