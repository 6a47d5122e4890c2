//! Relational store for symbols, nodes, and edges.
//!
//! Single-writer SQLite persistence. All mutation goes through one
//! connection owned by the orchestrator process; readers (downstream SQL
//! clients) coexist under SQLite's own locking. Writes are batched into
//! explicit transactions and committed at package boundaries so a crash
//! mid-run leaves every completed package consistent with its
//! `index_metadata` row.

use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use rusqlite::{params, Connection, OptionalExtension, Transaction};
use tracing::debug;

use crate::facts::Node;

/// Rows per insert transaction in bulk paths.
pub const BATCH_ROWS: usize = 5000;

/// Upper bound on SQL parameters per grouped lookup.
const LOOKUP_CHUNK: usize = 500;

/// Package attribution for an edge whose target is not in `symbol_index`.
pub const UNKNOWN_PACKAGE: &str = "unknown";

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS symbol_index (
    fqn       TEXT PRIMARY KEY,
    uri       TEXT NOT NULL,
    package   TEXT NOT NULL,
    line      INTEGER,
    is_entity INTEGER
);

CREATE TABLE IF NOT EXISTS nodes (
    fqn              TEXT PRIMARY KEY,
    type             TEXT NOT NULL,
    package          TEXT NOT NULL,
    line             INTEGER,
    visibility       TEXT NOT NULL,
    has_override     INTEGER NOT NULL DEFAULT 0,
    is_transactional INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS edges (
    id           INTEGER PRIMARY KEY AUTOINCREMENT,
    from_fqn     TEXT NOT NULL,
    edge_type    TEXT NOT NULL,
    to_fqn       TEXT NOT NULL,
    kind         TEXT NOT NULL,
    from_package TEXT NOT NULL,
    to_package   TEXT NOT NULL,
    from_line    INTEGER
);

CREATE INDEX IF NOT EXISTS idx_edges_to_fqn       ON edges(to_fqn);
CREATE INDEX IF NOT EXISTS idx_edges_from_fqn     ON edges(from_fqn);
CREATE INDEX IF NOT EXISTS idx_edges_from_package ON edges(from_package);
CREATE INDEX IF NOT EXISTS idx_edges_to_package   ON edges(to_package);

CREATE TABLE IF NOT EXISTS index_metadata (
    package      TEXT PRIMARY KEY,
    content_hash TEXT NOT NULL,
    indexed_at   INTEGER NOT NULL
);
";

const DROP_ALL: &str = "
DROP TABLE IF EXISTS symbol_index;
DROP TABLE IF EXISTS nodes;
DROP TABLE IF EXISTS edges;
DROP TABLE IF EXISTS index_metadata;
";

/// One `symbol_index` row, minus the package (supplied at write time).
#[derive(Debug, Clone)]
pub struct SymbolRow {
    pub fqn: String,
    pub uri: String,
    pub line: Option<i64>,
    pub is_entity: Option<bool>,
}

/// One fully attributed `edges` row.
#[derive(Debug, Clone)]
pub struct EdgeRow {
    pub from_fqn: String,
    pub edge_type: String,
    pub to_fqn: String,
    pub kind: String,
    pub from_package: String,
    pub to_package: String,
    pub from_line: Option<i64>,
}

/// Row counts surfaced by the status command and the run report.
#[derive(Debug, Clone, Default)]
pub struct StoreCounts {
    pub symbols: i64,
    pub nodes: i64,
    pub edges: i64,
    pub packages: i64,
}

/// Result of atomically replacing one package's symbols.
#[derive(Debug, Clone, Default)]
pub struct SymbolWriteOutcome {
    pub written: usize,
    /// Upserts that overwrote a row owned by a different package.
    pub collisions: usize,
}

pub struct Store {
    conn: Connection,
}

impl Store {
    /// Open (and create if absent) the store at `path`.
    ///
    /// `init=true` drops and recreates all four tables; `init=false`
    /// creates whatever is missing and leaves existing rows alone.
    pub fn open(path: &Path, init: bool) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("failed to open store at {}", path.display()))?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;

        if init {
            conn.execute_batch(DROP_ALL)
                .context("failed to drop existing tables")?;
        }
        conn.execute_batch(SCHEMA).context("failed to create schema")?;

        debug!(path = %path.display(), init, "store opened");
        Ok(Self { conn })
    }

    /// In-memory store for tests.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn })
    }

    /// Stored content hash for a package, if it was ever indexed.
    pub fn metadata_hash(&self, package: &str) -> Result<Option<String>> {
        let hash = self
            .conn
            .query_row(
                "SELECT content_hash FROM index_metadata WHERE package = ?1",
                params![package],
                |row| row.get(0),
            )
            .optional()?;
        Ok(hash)
    }

    /// All `(package, content_hash, indexed_at)` metadata rows.
    pub fn all_metadata(&self) -> Result<Vec<(String, String, i64)>> {
        let mut stmt = self.conn.prepare(
            "SELECT package, content_hash, indexed_at FROM index_metadata ORDER BY package",
        )?;
        let rows = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Atomically replace every row attributable to `package` and record
    /// its new content hash.
    ///
    /// Cascade-deletes `symbol_index`, `nodes`, `edges`, and
    /// `index_metadata` for the package, upserts the new symbols, and
    /// writes the metadata row, all in one transaction; intermediate
    /// states are never observable.
    pub fn replace_package_symbols(
        &mut self,
        package: &str,
        content_hash: &str,
        indexed_at: i64,
        symbols: &[SymbolRow],
    ) -> Result<SymbolWriteOutcome> {
        let tx = self.conn.transaction()?;
        cascade_delete(&tx, package)?;

        let mut outcome = SymbolWriteOutcome::default();
        {
            let mut owner_stmt =
                tx.prepare_cached("SELECT package FROM symbol_index WHERE fqn = ?1")?;
            let mut upsert_stmt = tx.prepare_cached(
                "INSERT OR REPLACE INTO symbol_index (fqn, uri, package, line, is_entity)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )?;
            for symbol in symbols {
                let owner: Option<String> = owner_stmt
                    .query_row(params![symbol.fqn], |row| row.get(0))
                    .optional()?;
                if owner.is_some_and(|o| o != package) {
                    outcome.collisions += 1;
                }
                upsert_stmt.execute(params![
                    symbol.fqn,
                    symbol.uri,
                    package,
                    symbol.line,
                    symbol.is_entity,
                ])?;
                outcome.written += 1;
            }
        }

        tx.execute(
            "INSERT OR REPLACE INTO index_metadata (package, content_hash, indexed_at)
             VALUES (?1, ?2, ?3)",
            params![package, content_hash, indexed_at],
        )?;
        tx.commit()?;

        debug!(
            package,
            symbols = outcome.written,
            collisions = outcome.collisions,
            "replaced package symbols"
        );
        Ok(outcome)
    }

    /// Upsert node rows for a package in one transaction.
    pub fn upsert_nodes(&mut self, package: &str, nodes: &[Node]) -> Result<usize> {
        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare_cached(
                "INSERT OR REPLACE INTO nodes
                     (fqn, type, package, line, visibility, has_override, is_transactional)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            )?;
            for node in nodes {
                stmt.execute(params![
                    node.fqn,
                    node.node_type,
                    package,
                    node.line,
                    node.visibility,
                    node.has_override,
                    node.is_transactional,
                ])?;
            }
        }
        tx.commit()?;
        Ok(nodes.len())
    }

    /// Append edge rows in one transaction. Duplicates are permitted.
    pub fn insert_edges(&mut self, edges: &[EdgeRow]) -> Result<usize> {
        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare_cached(
                "INSERT INTO edges
                     (from_fqn, edge_type, to_fqn, kind, from_package, to_package, from_line)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            )?;
            for edge in edges {
                stmt.execute(params![
                    edge.from_fqn,
                    edge.edge_type,
                    edge.to_fqn,
                    edge.kind,
                    edge.from_package,
                    edge.to_package,
                    edge.from_line,
                ])?;
            }
        }
        tx.commit()?;
        Ok(edges.len())
    }

    /// Grouped `fqn -> package` lookup against `symbol_index`.
    ///
    /// Issued once per edge batch; FQNs absent from the index are simply
    /// missing from the returned map.
    pub fn lookup_packages(&self, fqns: &[String]) -> Result<HashMap<String, String>> {
        let mut resolved = HashMap::with_capacity(fqns.len());
        for chunk in fqns.chunks(LOOKUP_CHUNK) {
            let placeholders = vec!["?"; chunk.len()].join(", ");
            let sql = format!(
                "SELECT fqn, package FROM symbol_index WHERE fqn IN ({})",
                placeholders
            );
            let mut stmt = self.conn.prepare(&sql)?;
            let rows = stmt.query_map(rusqlite::params_from_iter(chunk.iter()), |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?;
            for row in rows {
                let (fqn, package) = row?;
                resolved.insert(fqn, package);
            }
        }
        Ok(resolved)
    }

    /// Symbol rows for one package, ordered by FQN. Test and status helper.
    pub fn symbols_for_package(&self, package: &str) -> Result<Vec<(String, String)>> {
        let mut stmt = self.conn.prepare(
            "SELECT fqn, uri FROM symbol_index WHERE package = ?1 ORDER BY fqn",
        )?;
        let rows = stmt
            .query_map(params![package], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Drop a package's metadata row, marking it dirty for the next run.
    ///
    /// Used when analysis fails partway: the package's edges may be
    /// partial, and a missing metadata row forces a full rebuild instead
    /// of a skip.
    pub fn delete_metadata(&mut self, package: &str) -> Result<()> {
        self.conn.execute(
            "DELETE FROM index_metadata WHERE package = ?1",
            params![package],
        )?;
        Ok(())
    }

    /// Edge rows originating in one package, in insertion order.
    pub fn edges_from_package(&self, package: &str) -> Result<Vec<EdgeRow>> {
        let mut stmt = self.conn.prepare(
            "SELECT from_fqn, edge_type, to_fqn, kind, from_package, to_package, from_line
             FROM edges WHERE from_package = ?1 ORDER BY id",
        )?;
        let rows = stmt
            .query_map(params![package], |row| {
                Ok(EdgeRow {
                    from_fqn: row.get(0)?,
                    edge_type: row.get(1)?,
                    to_fqn: row.get(2)?,
                    kind: row.get(3)?,
                    from_package: row.get(4)?,
                    to_package: row.get(5)?,
                    from_line: row.get(6)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn counts(&self) -> Result<StoreCounts> {
        Ok(StoreCounts {
            symbols: self.count("symbol_index")?,
            nodes: self.count("nodes")?,
            edges: self.count("edges")?,
            packages: self.count("index_metadata")?,
        })
    }

    pub fn count_edges_from_package(&self, package: &str) -> Result<i64> {
        let count = self.conn.query_row(
            "SELECT COUNT(*) FROM edges WHERE from_package = ?1",
            params![package],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    fn count(&self, table: &'static str) -> Result<i64> {
        let count = self
            .conn
            .query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| {
                row.get(0)
            })?;
        Ok(count)
    }
}

/// The four-table cascade delete for one package.
///
/// Runs inside the caller's transaction; never committed on its own.
fn cascade_delete(tx: &Transaction<'_>, package: &str) -> Result<()> {
    tx.execute(
        "DELETE FROM symbol_index WHERE package = ?1",
        params![package],
    )?;
    tx.execute("DELETE FROM nodes WHERE package = ?1", params![package])?;
    tx.execute(
        "DELETE FROM edges WHERE from_package = ?1 OR to_package = ?1",
        params![package],
    )?;
    tx.execute(
        "DELETE FROM index_metadata WHERE package = ?1",
        params![package],
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn symbol(fqn: &str) -> SymbolRow {
        SymbolRow {
            fqn: fqn.to_string(),
            uri: format!("file:///src/{}.java", fqn.replace('.', "/")),
            line: None,
            is_entity: Some(false),
        }
    }

    fn edge(from: &str, to: &str, from_package: &str, to_package: &str) -> EdgeRow {
        EdgeRow {
            from_fqn: from.to_string(),
            edge_type: "call".to_string(),
            to_fqn: to.to_string(),
            kind: "standard".to_string(),
            from_package: from_package.to_string(),
            to_package: to_package.to_string(),
            from_line: Some(3),
        }
    }

    #[test]
    fn test_replace_package_symbols_is_upsert() {
        let mut store = Store::open_in_memory().unwrap();
        store
            .replace_package_symbols("p1", "h1", 1, &[symbol("com.ex.A"), symbol("com.ex.B")])
            .unwrap();
        store
            .replace_package_symbols("p1", "h2", 2, &[symbol("com.ex.A")])
            .unwrap();

        let rows = store.symbols_for_package("p1").unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].0, "com.ex.A");
        assert_eq!(store.metadata_hash("p1").unwrap().as_deref(), Some("h2"));
    }

    #[test]
    fn test_cross_package_collision_is_counted_and_last_writer_wins() {
        let mut store = Store::open_in_memory().unwrap();
        store
            .replace_package_symbols("p1", "h1", 1, &[symbol("com.ex.A")])
            .unwrap();
        let outcome = store
            .replace_package_symbols("p2", "h2", 2, &[symbol("com.ex.A")])
            .unwrap();

        assert_eq!(outcome.collisions, 1);
        let resolved = store
            .lookup_packages(&["com.ex.A".to_string()])
            .unwrap();
        assert_eq!(resolved.get("com.ex.A").map(String::as_str), Some("p2"));
    }

    #[test]
    fn test_cascade_delete_spares_other_packages() {
        let mut store = Store::open_in_memory().unwrap();
        store
            .replace_package_symbols("p1", "h1", 1, &[symbol("com.p1.A")])
            .unwrap();
        store
            .replace_package_symbols("p2", "h2", 1, &[symbol("com.p2.B")])
            .unwrap();
        store
            .insert_edges(&[
                edge("com.p1.A.f()", "com.p2.B.g()", "p1", "p2"),
                edge("com.p2.B.g()", "com.p1.A.f()", "p2", "p1"),
            ])
            .unwrap();

        // Re-index p1: both edges touch p1 and must go; p2's symbols stay.
        store.replace_package_symbols("p1", "h3", 2, &[]).unwrap();

        let counts = store.counts().unwrap();
        assert_eq!(counts.edges, 0);
        assert_eq!(store.symbols_for_package("p2").unwrap().len(), 1);
        assert_eq!(store.metadata_hash("p2").unwrap().as_deref(), Some("h2"));
    }

    #[test]
    fn test_duplicate_edges_are_preserved() {
        let mut store = Store::open_in_memory().unwrap();
        let row = edge("com.ex.A.f()", "com.ex.B.g()", "p1", "unknown");
        store.insert_edges(&[row.clone(), row]).unwrap();
        assert_eq!(store.counts().unwrap().edges, 2);
    }

    #[test]
    fn test_lookup_packages_chunks_large_inputs() {
        let mut store = Store::open_in_memory().unwrap();
        let symbols: Vec<SymbolRow> = (0..1200)
            .map(|i| symbol(&format!("com.ex.C{}", i)))
            .collect();
        store
            .replace_package_symbols("p1", "h1", 1, &symbols)
            .unwrap();

        let fqns: Vec<String> = (0..1200).map(|i| format!("com.ex.C{}", i)).collect();
        let resolved = store.lookup_packages(&fqns).unwrap();
        assert_eq!(resolved.len(), 1200);
        assert!(resolved.values().all(|p| p == "p1"));
    }

    #[test]
    fn test_open_init_drops_existing_rows() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("facts.db");
        {
            let mut store = Store::open(&db_path, true).unwrap();
            store
                .replace_package_symbols("p1", "h1", 1, &[symbol("com.ex.A")])
                .unwrap();
        }
        {
            let store = Store::open(&db_path, false).unwrap();
            assert_eq!(store.counts().unwrap().symbols, 1);
        }
        {
            let store = Store::open(&db_path, true).unwrap();
            assert_eq!(store.counts().unwrap().symbols, 0);
        }
    }
}
