//! Embedded relational backend.
//!
//! Symbols are stored with their indexed columns plus the full record as
//! a JSON blob, so schema growth never needs a migration of the hot
//! columns. The dependency table powers the recursive reverse-reachability
//! query that makes header fan-out cheap.

use crate::{
    cache::{unix_now, CacheBackend, DependencyStats, FileMetadata},
    error::Result,
    symbols::Symbol,
    utils,
};
use rusqlite::{params, Connection, OptionalExtension};
use std::{
    collections::BTreeSet,
    path::{Path, PathBuf},
    sync::Mutex,
};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS symbols (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    usr TEXT NOT NULL,
    name TEXT NOT NULL,
    qualified_name TEXT NOT NULL,
    kind TEXT NOT NULL,
    file TEXT NOT NULL,
    line INTEGER NOT NULL,
    is_definition INTEGER NOT NULL,
    data TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_symbols_usr ON symbols(usr);
CREATE INDEX IF NOT EXISTS idx_symbols_name ON symbols(name);
CREATE INDEX IF NOT EXISTS idx_symbols_qualified ON symbols(qualified_name);
CREATE INDEX IF NOT EXISTS idx_symbols_file ON symbols(file);

CREATE TABLE IF NOT EXISTS file_metadata (
    file_path TEXT PRIMARY KEY,
    file_hash TEXT NOT NULL,
    compile_args_hash TEXT NOT NULL DEFAULT '',
    indexed_at INTEGER NOT NULL,
    symbol_count INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS file_dependencies (
    source_file TEXT NOT NULL,
    included_file TEXT NOT NULL,
    is_direct INTEGER NOT NULL DEFAULT 1,
    include_depth INTEGER NOT NULL DEFAULT 1,
    detected_at INTEGER NOT NULL,
    UNIQUE(source_file, included_file)
);
CREATE INDEX IF NOT EXISTS idx_deps_source ON file_dependencies(source_file);
CREATE INDEX IF NOT EXISTS idx_deps_included ON file_dependencies(included_file);

CREATE TABLE IF NOT EXISTS meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
"#;

/// SQLite-backed cache. The connection lives behind a mutex, which is
/// what serializes writers; readers share it the same way.
pub struct SqliteBackend {
    conn: Mutex<Connection>,
}

impl std::fmt::Debug for SqliteBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteBackend").finish_non_exhaustive()
    }
}

impl SqliteBackend {
    /// Opens (and initializes) the database file, creating parent
    /// directories as needed.
    pub fn open(path: &Path) -> Result<Self> {
        utils::create_parent_dir_all(path)?;
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    /// In-memory database, used by tests.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    fn decode_symbol(data: &str) -> Result<Symbol> {
        serde_json::from_str(data).map_err(Into::into)
    }
}

fn path_str(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

fn insert_symbols(conn: &Connection, file: &str, symbols: &[Symbol]) -> Result<()> {
    let mut stmt = conn.prepare_cached(
        "INSERT INTO symbols (usr, name, qualified_name, kind, file, line, is_definition, data)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
    )?;
    for symbol in symbols {
        stmt.execute(params![
            symbol.usr,
            symbol.name,
            symbol.qualified_name,
            symbol.kind.as_str(),
            file,
            symbol.line,
            symbol.is_definition,
            serde_json::to_string(symbol)?,
        ])?;
    }
    Ok(())
}

fn insert_dependencies(conn: &Connection, source: &str, includes: &[PathBuf]) -> Result<usize> {
    let now = unix_now();
    let unique: BTreeSet<String> = includes.iter().map(|p| path_str(p)).collect();
    let mut stmt = conn.prepare_cached(
        "INSERT OR REPLACE INTO file_dependencies
         (source_file, included_file, is_direct, include_depth, detected_at)
         VALUES (?1, ?2, 1, 1, ?3)",
    )?;
    for included in &unique {
        stmt.execute(params![source, included, now])?;
    }
    Ok(unique.len())
}

fn upsert_metadata(conn: &Connection, metadata: &FileMetadata) -> Result<()> {
    conn.execute(
        "INSERT INTO file_metadata (file_path, file_hash, compile_args_hash, indexed_at, symbol_count)
         VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT(file_path) DO UPDATE SET
             file_hash = excluded.file_hash,
             compile_args_hash = excluded.compile_args_hash,
             indexed_at = excluded.indexed_at,
             symbol_count = excluded.symbol_count",
        params![
            path_str(&metadata.file_path),
            metadata.file_hash,
            metadata.compile_args_hash,
            metadata.indexed_at,
            metadata.symbol_count,
        ],
    )?;
    Ok(())
}

fn row_to_metadata(row: &rusqlite::Row<'_>) -> rusqlite::Result<FileMetadata> {
    Ok(FileMetadata {
        file_path: PathBuf::from(row.get::<_, String>(0)?),
        file_hash: row.get(1)?,
        compile_args_hash: row.get(2)?,
        indexed_at: row.get(3)?,
        symbol_count: row.get(4)?,
    })
}

impl CacheBackend for SqliteBackend {
    fn file_metadata(&self, file: &Path) -> Result<Option<FileMetadata>> {
        let conn = self.conn.lock().unwrap();
        let metadata = conn
            .query_row(
                "SELECT file_path, file_hash, compile_args_hash, indexed_at, symbol_count
                 FROM file_metadata WHERE file_path = ?1",
                params![path_str(file)],
                row_to_metadata,
            )
            .optional()?;
        Ok(metadata)
    }

    fn all_file_metadata(&self) -> Result<Vec<FileMetadata>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT file_path, file_hash, compile_args_hash, indexed_at, symbol_count
             FROM file_metadata",
        )?;
        let rows = stmt.query_map([], row_to_metadata)?;
        let mut all = Vec::new();
        for row in rows {
            all.push(row?);
        }
        Ok(all)
    }

    fn store_symbols(&self, file: &Path, symbols: &[Symbol]) -> Result<()> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        let file = path_str(file);
        tx.execute("DELETE FROM symbols WHERE file = ?1", params![file])?;
        insert_symbols(&tx, &file, symbols)?;
        tx.commit()?;
        Ok(())
    }

    fn store_file(
        &self,
        metadata: &FileMetadata,
        symbols: &[Symbol],
        includes: &[PathBuf],
    ) -> Result<()> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        let file = path_str(&metadata.file_path);
        tx.execute("DELETE FROM symbols WHERE file = ?1", params![file])?;
        insert_symbols(&tx, &file, symbols)?;
        tx.execute("DELETE FROM file_dependencies WHERE source_file = ?1", params![file])?;
        insert_dependencies(&tx, &file, includes)?;
        upsert_metadata(&tx, metadata)?;
        tx.commit()?;
        Ok(())
    }

    fn load_symbols(&self, file: &Path) -> Result<Vec<Symbol>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare_cached("SELECT data FROM symbols WHERE file = ?1")?;
        let rows = stmt.query_map(params![path_str(file)], |row| row.get::<_, String>(0))?;
        let mut symbols = Vec::new();
        for row in rows {
            symbols.push(Self::decode_symbol(&row?)?);
        }
        Ok(symbols)
    }

    fn load_all_symbols(&self) -> Result<Vec<Symbol>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT data FROM symbols")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        let mut symbols = Vec::new();
        for row in rows {
            match Self::decode_symbol(&row?) {
                Ok(symbol) => symbols.push(symbol),
                // a corrupted row means the file gets re-parsed, never
                // silently served stale
                Err(err) => warn!("dropping corrupted symbol row: {err}"),
            }
        }
        Ok(symbols)
    }

    fn remove_file(&self, file: &Path) -> Result<()> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        let file = path_str(file);
        tx.execute("DELETE FROM symbols WHERE file = ?1", params![file])?;
        tx.execute("DELETE FROM file_metadata WHERE file_path = ?1", params![file])?;
        tx.execute(
            "DELETE FROM file_dependencies WHERE source_file = ?1 OR included_file = ?1",
            params![file],
        )?;
        tx.commit()?;
        Ok(())
    }

    fn set_compile_args_hash(&self, file: &Path, args_hash: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let updated = conn.execute(
            "UPDATE file_metadata SET compile_args_hash = ?1 WHERE file_path = ?2",
            params![args_hash, path_str(file)],
        )?;
        if updated == 0 {
            conn.execute(
                "INSERT OR IGNORE INTO file_metadata
                 (file_path, file_hash, compile_args_hash, indexed_at, symbol_count)
                 VALUES (?1, '', ?2, ?3, 0)",
                params![path_str(file), args_hash, unix_now()],
            )?;
        }
        Ok(())
    }

    fn update_dependencies(&self, source: &Path, includes: &[PathBuf]) -> Result<usize> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        let source = path_str(source);
        tx.execute("DELETE FROM file_dependencies WHERE source_file = ?1", params![source])?;
        let inserted = insert_dependencies(&tx, &source, includes)?;
        tx.commit()?;
        Ok(inserted)
    }

    fn dependents_of(&self, included: &Path) -> Result<BTreeSet<PathBuf>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare_cached(
            "SELECT DISTINCT source_file FROM file_dependencies WHERE included_file = ?1",
        )?;
        let rows = stmt.query_map(params![path_str(included)], |row| row.get::<_, String>(0))?;
        let mut dependents = BTreeSet::new();
        for row in rows {
            dependents.insert(PathBuf::from(row?));
        }
        Ok(dependents)
    }

    fn dependencies_of(&self, source: &Path) -> Result<BTreeSet<PathBuf>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare_cached(
            "SELECT included_file FROM file_dependencies WHERE source_file = ?1",
        )?;
        let rows = stmt.query_map(params![path_str(source)], |row| row.get::<_, String>(0))?;
        let mut includes = BTreeSet::new();
        for row in rows {
            includes.insert(PathBuf::from(row?));
        }
        Ok(includes)
    }

    fn remove_file_dependencies(&self, file: &Path) -> Result<usize> {
        let conn = self.conn.lock().unwrap();
        let removed = conn.execute(
            "DELETE FROM file_dependencies WHERE source_file = ?1 OR included_file = ?1",
            params![path_str(file)],
        )?;
        Ok(removed)
    }

    fn transitive_dependents(&self, included: &Path) -> Option<Result<BTreeSet<PathBuf>>> {
        let query = || -> Result<BTreeSet<PathBuf>> {
            let conn = self.conn.lock().unwrap();
            // UNION (not UNION ALL) de-duplicates, which is what bounds
            // the recursion on include cycles.
            let mut stmt = conn.prepare_cached(
                "WITH RECURSIVE dependents(file_path) AS (
                     SELECT DISTINCT source_file
                     FROM file_dependencies
                     WHERE included_file = ?1
                     UNION
                     SELECT fd.source_file
                     FROM file_dependencies fd
                     JOIN dependents d ON fd.included_file = d.file_path
                 )
                 SELECT file_path FROM dependents",
            )?;
            let rows =
                stmt.query_map(params![path_str(included)], |row| row.get::<_, String>(0))?;
            let mut dependents = BTreeSet::new();
            for row in rows {
                dependents.insert(PathBuf::from(row?));
            }
            Ok(dependents)
        };
        Some(query())
    }

    fn dependency_stats(&self) -> Result<DependencyStats> {
        let conn = self.conn.lock().unwrap();
        let total: usize =
            conn.query_row("SELECT COUNT(*) FROM file_dependencies", [], |row| row.get(0))?;
        let sources: usize = conn.query_row(
            "SELECT COUNT(DISTINCT source_file) FROM file_dependencies",
            [],
            |row| row.get(0),
        )?;
        let includes: usize = conn.query_row(
            "SELECT COUNT(DISTINCT included_file) FROM file_dependencies",
            [],
            |row| row.get(0),
        )?;
        Ok(DependencyStats {
            total_dependencies: total,
            unique_source_files: sources,
            unique_included_files: includes,
            avg_includes_per_file: if sources > 0 { total as f64 / sources as f64 } else { 0.0 },
        })
    }

    fn clear_dependencies(&self) -> Result<usize> {
        let conn = self.conn.lock().unwrap();
        let removed = conn.execute("DELETE FROM file_dependencies", [])?;
        Ok(removed)
    }

    fn meta(&self, key: &str) -> Result<Option<String>> {
        let conn = self.conn.lock().unwrap();
        let value = conn
            .query_row("SELECT value FROM meta WHERE key = ?1", params![key], |row| row.get(0))
            .optional()?;
        Ok(value)
    }

    fn set_meta(&self, key: &str, value: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO meta (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, value],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::backend_tests;

    fn backend() -> SqliteBackend {
        SqliteBackend::open_in_memory().unwrap()
    }

    #[test]
    fn file_roundtrip() {
        backend_tests::file_roundtrip(&backend());
    }

    #[test]
    fn removal_is_complete() {
        backend_tests::removal_is_complete(&backend());
    }

    #[test]
    fn dependency_edges_are_replaced_atomically() {
        backend_tests::dependency_edges_are_replaced_atomically(&backend());
    }

    #[test]
    fn deletion_removes_both_endpoints() {
        backend_tests::deletion_removes_both_endpoints(&backend());
    }

    #[test]
    fn meta_roundtrip() {
        backend_tests::meta_roundtrip(&backend());
    }

    #[test]
    fn args_hash_upsert() {
        backend_tests::args_hash_upsert(&backend());
    }

    #[test]
    fn stats_count_edges() {
        backend_tests::stats_count_edges(&backend());
    }

    #[test]
    fn transitive_dependents_walks_the_chain() {
        let backend = backend();
        // a.cpp -> b.h -> c.h
        backend
            .update_dependencies(Path::new("/p/a.cpp"), &[PathBuf::from("/p/b.h")])
            .unwrap();
        backend
            .update_dependencies(Path::new("/p/b.h"), &[PathBuf::from("/p/c.h")])
            .unwrap();

        let dependents = backend.transitive_dependents(Path::new("/p/c.h")).unwrap().unwrap();
        assert_eq!(
            dependents,
            BTreeSet::from([PathBuf::from("/p/a.cpp"), PathBuf::from("/p/b.h")])
        );
    }

    #[test]
    fn transitive_dependents_terminates_on_cycles() {
        let backend = backend();
        // x.h and y.h include each other through guards
        backend
            .update_dependencies(Path::new("/p/x.h"), &[PathBuf::from("/p/y.h")])
            .unwrap();
        backend
            .update_dependencies(Path::new("/p/y.h"), &[PathBuf::from("/p/x.h")])
            .unwrap();
        backend
            .update_dependencies(Path::new("/p/a.cpp"), &[PathBuf::from("/p/x.h")])
            .unwrap();

        let dependents = backend.transitive_dependents(Path::new("/p/x.h")).unwrap().unwrap();
        assert_eq!(
            dependents,
            BTreeSet::from([
                PathBuf::from("/p/a.cpp"),
                PathBuf::from("/p/x.h"),
                PathBuf::from("/p/y.h"),
            ])
        );
    }

    #[test]
    fn persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("index.db");
        {
            let backend = SqliteBackend::open(&db).unwrap();
            backend.set_meta("k", "v").unwrap();
        }
        let backend = SqliteBackend::open(&db).unwrap();
        assert_eq!(backend.meta("k").unwrap(), Some("v".to_string()));
    }
}
