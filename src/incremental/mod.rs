//! Turns a detected [`ChangeSet`] into a minimal re-analysis plan.
//!
//! Priorities mirror blast radius: a compile database change first (it
//! can alter preprocessing everywhere, so the header tracker resets),
//! then header changes fanned out to their transitive dependents, then
//! isolated source changes and new files. Deleted files drop their cache
//! rows, dependency edges and tracker entries without any re-parse.

use crate::{
    analyzer::Analyzer,
    error::Result,
};
use serde::Serialize;
use std::{
    collections::BTreeSet,
    path::{Path, PathBuf},
    time::Instant,
};

pub mod diff;
pub mod scan;
pub use diff::{CommandsDiff, CompileCommandsDiffer};
pub use scan::{ChangeScanner, ChangeSet};

/// Outcome of one incremental pass.
#[derive(Clone, Debug, Default, Serialize)]
pub struct AnalysisResult {
    pub files_analyzed: usize,
    pub files_removed: usize,
    pub elapsed_seconds: f64,
    #[serde(skip)]
    pub changes: ChangeSet,
}

impl AnalysisResult {
    pub fn no_changes() -> Self {
        Self::default()
    }
}

impl std::fmt::Display for AnalysisResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "analyzed {} files, removed {} files in {:.2}s",
            self.files_analyzed, self.files_removed, self.elapsed_seconds
        )
    }
}

/// Coordinates incremental re-analysis for one analyzer.
pub struct IncrementalAnalyzer<'a> {
    analyzer: &'a Analyzer,
}

impl<'a> IncrementalAnalyzer<'a> {
    pub fn new(analyzer: &'a Analyzer) -> Self {
        Self { analyzer }
    }

    /// Scans for drift and re-parses exactly the affected set.
    pub fn refresh_if_needed(&self) -> Result<AnalysisResult> {
        info!("starting incremental analysis");
        let started = Instant::now();

        let changes = ChangeScanner::new(self.analyzer).scan_for_changes();
        if changes.is_empty() {
            info!("no changes detected, cache is up to date");
            return Ok(AnalysisResult::no_changes());
        }

        let mut to_analyze: BTreeSet<PathBuf> = BTreeSet::new();

        if changes.compile_commands_changed {
            to_analyze.extend(self.handle_compile_commands_change()?);
        }

        for header in &changes.modified_headers {
            to_analyze.extend(self.handle_header_change(header));
        }

        to_analyze.extend(changes.modified_sources.iter().cloned());
        to_analyze.extend(changes.added.iter().cloned());

        for removed in &changes.removed {
            if let Err(err) = self.analyzer.remove_file(removed) {
                warn!("failed to remove \"{}\" from cache: {err}", removed.display());
            }
        }
        // nothing that vanished gets re-parsed
        to_analyze.retain(|file| !changes.removed.contains(file) && file.exists());

        let files: Vec<PathBuf> = to_analyze.into_iter().collect();
        let files_analyzed = if files.is_empty() {
            0
        } else {
            info!("re-analyzing {} files", files.len());
            self.analyzer.reanalyze_files(&files)
        };
        self.analyzer.persist_session_state()?;

        let result = AnalysisResult {
            files_analyzed,
            files_removed: changes.removed.len(),
            elapsed_seconds: started.elapsed().as_secs_f64(),
            changes,
        };
        info!("incremental analysis complete: {result}");
        Ok(result)
    }

    /// Reloads the compile database, diffs it entry by entry and seeds
    /// the re-analysis set with added and changed files. The header
    /// tracker resets wholesale because argument changes can alter
    /// preprocessing for any header.
    fn handle_compile_commands_change(&self) -> Result<BTreeSet<PathBuf>> {
        info!("handling compile database change");

        let old_commands = self.analyzer.commands().read().unwrap().file_to_args().clone();
        self.analyzer.commands().write().unwrap().reload();
        let new_commands = self.analyzer.commands().read().unwrap().file_to_args().clone();

        let diff = CompileCommandsDiffer::compute_diff(&old_commands, &new_commands);
        info!(
            "compile commands diff: +{} -{} ~{}",
            diff.added.len(),
            diff.removed.len(),
            diff.changed.len()
        );

        let differ = CompileCommandsDiffer::new(self.analyzer.backend().clone());
        differ.store_current_commands(&new_commands);

        self.analyzer.header_tracker().clear_all();
        info!("header tracking invalidated due to compile database change");

        Ok(diff.added.union(&diff.changed).cloned().collect())
    }

    /// Expands one modified header into the set of files to re-parse and
    /// invalidates its tracker entry.
    fn handle_header_change(&self, header: &Path) -> BTreeSet<PathBuf> {
        info!("handling header change \"{}\"", header.display());

        let dependents = match self.analyzer.dependency_graph().find_transitive_dependents(header)
        {
            Some(dependents) => dependents,
            None => {
                // degraded mode: the backend cannot answer reachability,
                // fall back to the directly affected sources
                warn!(
                    "backend lacks transitive dependency queries, \
                     falling back to direct dependents of \"{}\"",
                    header.display()
                );
                self.analyzer.dependency_graph().find_dependents(header)
            }
        };
        info!("header \"{}\" affects {} files", header.display(), dependents.len());

        self.analyzer.header_tracker().invalidate_header(header);
        dependents
    }
}
