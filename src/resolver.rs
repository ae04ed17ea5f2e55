//! Resolves the include relationships between translation units and
//! headers.
//!
//! The graph is persistent: edges live in the cache backend so that a
//! later session can fan a header change out to exactly the affected
//! translation units without re-parsing anything first. `source ->
//! included` is the edge direction; reverse lookup is the query that
//! matters.

use crate::cache::{CacheBackend, DependencyStats};
use crate::error::Result;
use std::{
    collections::BTreeSet,
    path::{Path, PathBuf},
    sync::Arc,
};

/// Forward and reverse include graph stored in the cache backend.
#[derive(Clone)]
pub struct DependencyGraph {
    backend: Arc<dyn CacheBackend>,
}

impl std::fmt::Debug for DependencyGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DependencyGraph").finish_non_exhaustive()
    }
}

impl DependencyGraph {
    pub fn new(backend: Arc<dyn CacheBackend>) -> Self {
        Self { backend }
    }

    /// Replaces the edge set rooted at `source` with the new include
    /// list. This is the only mutation path for a source's edges; there
    /// are no partial updates.
    pub fn update_dependencies(&self, source: &Path, includes: &[PathBuf]) -> Result<usize> {
        let inserted = self.backend.update_dependencies(source, includes)?;
        trace!("updated dependencies for \"{}\": {inserted} includes", source.display());
        Ok(inserted)
    }

    /// Files with a direct edge onto `header`. Failures are contained:
    /// logged and returned as an empty set.
    pub fn find_dependents(&self, header: &Path) -> BTreeSet<PathBuf> {
        match self.backend.dependents_of(header) {
            Ok(dependents) => dependents,
            Err(err) => {
                error!("failed to find dependents of \"{}\": {err}", header.display());
                BTreeSet::new()
            }
        }
    }

    /// Everything `source` includes, directly or transitively as
    /// reported by the frontend.
    pub fn find_dependencies(&self, source: &Path) -> BTreeSet<PathBuf> {
        match self.backend.dependencies_of(source) {
            Ok(includes) => includes,
            Err(err) => {
                error!("failed to find dependencies of \"{}\": {err}", source.display());
                BTreeSet::new()
            }
        }
    }

    /// Reverse reachability: every file that depends on `header` through
    /// any include chain. Returns `None` when the backend lacks the
    /// capability, which puts callers into degraded direct-dependents
    /// mode.
    pub fn find_transitive_dependents(&self, header: &Path) -> Option<BTreeSet<PathBuf>> {
        match self.backend.transitive_dependents(header) {
            Some(Ok(dependents)) => Some(dependents),
            Some(Err(err)) => {
                error!(
                    "failed to find transitive dependents of \"{}\": {err}",
                    header.display()
                );
                Some(BTreeSet::new())
            }
            None => None,
        }
    }

    /// Removes every edge touching `path`, as source or as included.
    pub fn remove_file_dependencies(&self, path: &Path) -> Result<usize> {
        let removed = self.backend.remove_file_dependencies(path)?;
        trace!("removed {removed} dependency edges for \"{}\"", path.display());
        Ok(removed)
    }

    pub fn stats(&self) -> DependencyStats {
        self.backend.dependency_stats().unwrap_or_else(|err| {
            error!("failed to compute dependency stats: {err}");
            DependencyStats::default()
        })
    }

    pub fn clear_all_dependencies(&self) -> Result<usize> {
        self.backend.clear_dependencies()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{JsonBackend, SqliteBackend};

    fn graph() -> DependencyGraph {
        DependencyGraph::new(Arc::new(SqliteBackend::open_in_memory().unwrap()))
    }

    #[test]
    fn reverse_lookup_finds_every_includer() {
        let graph = graph();
        graph
            .update_dependencies(Path::new("/p/a.cpp"), &[PathBuf::from("/p/w.h")])
            .unwrap();
        graph
            .update_dependencies(Path::new("/p/b.cpp"), &[PathBuf::from("/p/w.h")])
            .unwrap();

        assert_eq!(
            graph.find_dependents(Path::new("/p/w.h")),
            BTreeSet::from([PathBuf::from("/p/a.cpp"), PathBuf::from("/p/b.cpp")])
        );
    }

    #[test]
    fn transitive_closure_is_a_fixed_point() {
        let graph = graph();
        // a.cpp -> b.h -> c.h, d.cpp -> c.h
        graph.update_dependencies(Path::new("/p/a.cpp"), &[PathBuf::from("/p/b.h")]).unwrap();
        graph.update_dependencies(Path::new("/p/b.h"), &[PathBuf::from("/p/c.h")]).unwrap();
        graph.update_dependencies(Path::new("/p/d.cpp"), &[PathBuf::from("/p/c.h")]).unwrap();

        let closure = graph.find_transitive_dependents(Path::new("/p/c.h")).unwrap();

        // the closure contains all direct dependents..
        let direct = graph.find_dependents(Path::new("/p/c.h"));
        assert!(direct.is_subset(&closure));
        // ..and is closed under taking direct dependents of its members
        for member in &closure {
            assert!(graph.find_dependents(member).is_subset(&closure));
        }
        assert_eq!(
            closure,
            BTreeSet::from([
                PathBuf::from("/p/a.cpp"),
                PathBuf::from("/p/b.h"),
                PathBuf::from("/p/d.cpp"),
            ])
        );
    }

    #[test]
    fn removal_leaves_no_edge_behind() {
        let graph = graph();
        graph.update_dependencies(Path::new("/p/a.cpp"), &[PathBuf::from("/p/w.h")]).unwrap();
        graph.update_dependencies(Path::new("/p/w.h"), &[PathBuf::from("/p/x.h")]).unwrap();

        graph.remove_file_dependencies(Path::new("/p/w.h")).unwrap();
        assert!(graph.find_dependents(Path::new("/p/w.h")).is_empty());
        assert!(graph.find_dependencies(Path::new("/p/w.h")).is_empty());
        assert!(graph.find_dependents(Path::new("/p/x.h")).is_empty());
    }

    #[test]
    fn json_backend_degrades_transitive_queries() {
        let dir = tempfile::tempdir().unwrap();
        let graph = DependencyGraph::new(Arc::new(JsonBackend::open(dir.path()).unwrap()));
        graph.update_dependencies(Path::new("/p/a.cpp"), &[PathBuf::from("/p/w.h")]).unwrap();

        assert!(graph.find_transitive_dependents(Path::new("/p/w.h")).is_none());
        // direct lookup still works
        assert_eq!(
            graph.find_dependents(Path::new("/p/w.h")),
            BTreeSet::from([PathBuf::from("/p/a.cpp")])
        );
    }
}
