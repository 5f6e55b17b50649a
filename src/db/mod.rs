// Database module
// The connection manager: one owned SQLite handle, a result cache, bootstrap and backups.
// Constructed once at startup and shared as Arc<Database>; models never open their own connection.

pub mod backup;
pub mod bootstrap;
pub mod cache;
pub mod row;

use std::cell::{Cell, Ref, RefCell};
use std::path::PathBuf;
use std::time::Instant;

use parking_lot::ReentrantMutex;
use rusqlite::{params_from_iter, Connection};
use serde::Serialize;

pub use rusqlite::types::Value as SqlValue;
pub use row::Row;

use crate::config::{DbConfig, Environment};
use crate::error::{DalError, Result};
use cache::{cache_key, QueryCache};

/// Outcome of a mutating statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecResult {
    pub changes: usize,
    pub last_insert_id: i64,
}

/// Diagnostics snapshot returned by `Database::info`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DbInfo {
    pub connected: bool,
    pub path: String,
    pub environment: Environment,
    pub cache_entries: usize,
    pub cache_capacity: usize,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub transaction_depth: u32,
    pub pragmas: Option<PragmaInfo>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PragmaInfo {
    pub journal_mode: String,
    pub cache_size: i64,
    pub synchronous: i64,
    pub foreign_keys: bool,
    pub temp_store: i64,
    pub mmap_size: i64,
}

struct State {
    conn: RefCell<Option<Connection>>,
    cache: RefCell<QueryCache>,
    tx_depth: Cell<u32>,
}

/// The connection manager.
///
/// All statements go through one connection guarded by a re-entrant lock: other threads
/// wait, while the thread that owns an open transaction can call back into the manager
/// (models calling models) without deadlocking. The handle is only borrowed mutably to
/// open or close it, so closures passed to `transaction` or `with_connection` may run
/// further statements.
pub struct Database {
    config: DbConfig,
    state: ReentrantMutex<State>,
}

impl Database {
    /// Create a manager. Nothing is opened until first use.
    pub fn new(config: DbConfig) -> Self {
        let cache = QueryCache::new(config.query_cache_size);
        Self {
            config,
            state: ReentrantMutex::new(State {
                conn: RefCell::new(None),
                cache: RefCell::new(cache),
                tx_depth: Cell::new(0),
            }),
        }
    }

    /// Create a manager and connect immediately, failing fast on bootstrap errors.
    pub fn open(config: DbConfig) -> Result<Self> {
        let db = Self::new(config);
        db.connect()?;
        Ok(db)
    }

    pub fn config(&self) -> &DbConfig {
        &self.config
    }

    /// Open the database, apply pragmas and run bootstrap. Idempotent.
    pub fn connect(&self) -> Result<()> {
        let state = self.state.lock();
        self.ensure_open(&state)
    }

    pub fn is_connected(&self) -> bool {
        let state = self.state.lock();
        let connected = state.conn.borrow().is_some();
        connected
    }

    fn ensure_open(&self, state: &State) -> Result<()> {
        if state.conn.borrow().is_some() {
            return Ok(());
        }
        let conn = self.open_connection()?;
        *state.conn.try_borrow_mut().map_err(|_| connection_in_use())? = Some(conn);
        Ok(())
    }

    /// The live handle, connecting first if needed.
    fn live<'a>(&self, state: &'a State) -> Result<Ref<'a, Connection>> {
        self.ensure_open(state)?;
        Ref::filter_map(state.conn.borrow(), Option::as_ref).map_err(|_| not_connected())
    }

    fn open_connection(&self) -> Result<Connection> {
        let config = &self.config;

        let conn = if config.in_memory {
            Connection::open_in_memory()
                .map_err(|e| DalError::Bootstrap(format!("cannot open in-memory database: {}", e)))?
        } else {
            if let Some(parent) = config.db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent).map_err(|e| {
                    DalError::Bootstrap(format!(
                        "cannot create database directory {}: {}. Check directory permissions.",
                        parent.display(),
                        e
                    ))
                })?;
            }
            Connection::open(&config.db_path).map_err(|e| {
                DalError::Bootstrap(format!("cannot open {}: {}", config.db_path.display(), e))
            })?
        };

        if !config.in_memory {
            std::fs::create_dir_all(&config.backup_dir).map_err(|e| {
                DalError::Bootstrap(format!(
                    "cannot create backup directory {}: {}",
                    config.backup_dir.display(),
                    e
                ))
            })?;
        }

        bootstrap::apply_pragmas(&conn, config)
            .map_err(|e| DalError::Bootstrap(format!("cannot apply pragmas: {}", e)))?;
        let report = bootstrap::run_bootstrap(&conn, config)?;

        log::info!(
            "Database connected: {} ({}, schema_created={}, seeded={})",
            config.location(),
            config.environment,
            report.schema_created,
            report.seeded
        );
        Ok(conn)
    }

    /// Run `f` against the live handle, connecting first if needed.
    /// Bypasses the query cache; statements that may write should go through `execute`.
    /// `f` may call back into the manager; only `close` is refused while it runs.
    pub fn with_connection<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let state = self.state.lock();
        let conn = self.live(&state)?;
        f(&conn)
    }

    /// Run a read query, answering from the cache when possible.
    pub fn query(&self, sql: &str, params: &[SqlValue]) -> Result<Vec<Row>> {
        self.run_query(sql, params, false)
    }

    /// First row of a read query, or None.
    pub fn query_one(&self, sql: &str, params: &[SqlValue]) -> Result<Option<Row>> {
        Ok(self.query(sql, params)?.into_iter().next())
    }

    /// Ad hoc read-only query. Statements that could write are rejected before running.
    pub fn raw(&self, sql: &str, params: &[SqlValue]) -> Result<Vec<Row>> {
        self.run_query(sql, params, true)
    }

    /// First row of an ad hoc read-only query.
    pub fn raw_one(&self, sql: &str, params: &[SqlValue]) -> Result<Option<Row>> {
        Ok(self.raw(sql, params)?.into_iter().next())
    }

    fn run_query(&self, sql: &str, params: &[SqlValue], read_only: bool) -> Result<Vec<Row>> {
        let state = self.state.lock();
        let conn = self.live(&state)?;

        // Uncommitted rows must never reach the shared cache
        let use_cache = state.cache.borrow().is_enabled() && state.tx_depth.get() == 0;
        let key = cache_key(sql, params);
        if use_cache {
            let cached = state.cache.borrow_mut().get(&key);
            if let Some(rows) = cached {
                if self.config.verbose {
                    log::debug!("cache hit: {}", sql);
                }
                return Ok(rows);
            }
        }

        let started = Instant::now();
        let mut stmt = conn.prepare_cached(sql)?;
        let is_read = stmt.readonly();
        if read_only && !is_read {
            return Err(DalError::ReadOnly(sql.to_string()));
        }

        let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
        let mut result = stmt.query(params_from_iter(params.iter()))?;
        let mut rows = Vec::new();
        while let Some(row) = result.next()? {
            let mut record = Row::new();
            for (i, name) in columns.iter().enumerate() {
                record.insert(name.clone(), row::value_ref_to_json(row.get_ref(i)?));
            }
            rows.push(record);
        }
        drop(result);
        drop(stmt);

        self.log_timing(sql, started);

        let mut cache = state.cache.borrow_mut();
        if is_read {
            if use_cache {
                cache.insert(key, rows.clone());
            }
        } else {
            // A write slipped in through query(); treat it like execute()
            cache.clear();
        }
        Ok(rows)
    }

    /// Run a mutating statement. Clears the whole query cache.
    pub fn execute(&self, sql: &str, params: &[SqlValue]) -> Result<ExecResult> {
        let state = self.state.lock();
        let conn = self.live(&state)?;

        let started = Instant::now();
        let outcome = conn
            .prepare_cached(sql)
            .and_then(|mut stmt| stmt.execute(params_from_iter(params.iter())));
        // Clear even on failure: a partially applied statement must not leave stale rows
        state.cache.borrow_mut().clear();
        let changes = outcome?;
        self.log_timing(sql, started);

        Ok(ExecResult {
            changes,
            last_insert_id: conn.last_insert_rowid(),
        })
    }

    /// Run a multi-statement script verbatim. Clears the whole query cache.
    pub fn execute_batch(&self, sql: &str) -> Result<()> {
        let state = self.state.lock();
        let conn = self.live(&state)?;
        let outcome = conn.execute_batch(sql);
        state.cache.borrow_mut().clear();
        Ok(outcome?)
    }

    /// Run `f` inside one transaction. Everything `f` does commits together or not at all.
    /// A nested call on the same thread joins the outer transaction.
    pub fn transaction<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Database) -> Result<T>,
    {
        let guard = self.state.lock();

        let nested = if guard.tx_depth.get() > 0 {
            guard.tx_depth.set(guard.tx_depth.get() + 1);
            true
        } else {
            self.live(&guard)?.execute_batch("BEGIN IMMEDIATE")?;
            guard.tx_depth.set(1);
            false
        };

        let mut scope = TxScope {
            db: self,
            nested,
            finished: false,
        };
        let result = f(self);
        scope.finish(result.is_ok())?;
        drop(guard);
        result
    }

    fn end_transaction(&self, nested: bool, commit: bool) -> Result<()> {
        let state = self.state.lock();
        state.tx_depth.set(state.tx_depth.get().saturating_sub(1));
        if nested {
            return Ok(());
        }

        let conn = state.conn.borrow();
        let mut cache = state.cache.borrow_mut();
        let Some(conn) = conn.as_ref() else {
            // Closed mid-transaction; SQLite already rolled back
            state.tx_depth.set(0);
            cache.clear();
            return Ok(());
        };

        if commit {
            if let Err(e) = conn.execute_batch("COMMIT") {
                let _ = conn.execute_batch("ROLLBACK");
                cache.clear();
                return Err(e.into());
            }
        } else {
            if let Err(e) = conn.execute_batch("ROLLBACK") {
                log::warn!("Rollback failed: {}", e);
            }
            cache.clear();
        }
        Ok(())
    }

    /// Snapshot the database into the backup directory and rotate old snapshots.
    pub fn backup(&self) -> Result<PathBuf> {
        let state = self.state.lock();
        let conn = self.live(&state)?;
        backup::snapshot(&conn, &self.config)
    }

    /// Connectivity, cache and pragma diagnostics. Does not connect.
    pub fn info(&self) -> Result<DbInfo> {
        let state = self.state.lock();
        let conn = state.conn.borrow();
        let pragmas = match conn.as_ref() {
            Some(conn) => Some(read_pragmas(conn)?),
            None => None,
        };
        let cache = state.cache.borrow();
        Ok(DbInfo {
            connected: conn.is_some(),
            path: self.config.location(),
            environment: self.config.environment,
            cache_entries: cache.len(),
            cache_capacity: cache.capacity(),
            cache_hits: cache.hits(),
            cache_misses: cache.misses(),
            transaction_depth: state.tx_depth.get(),
            pragmas,
        })
    }

    /// Release the handle and clear the cache. Safe to call when already closed.
    /// Refused while a `with_connection` closure still holds the handle.
    pub fn close(&self) -> Result<()> {
        let state = self.state.lock();
        let taken = state.conn.try_borrow_mut().map_err(|_| connection_in_use())?.take();
        state.cache.borrow_mut().clear();
        state.tx_depth.set(0);
        if let Some(conn) = taken {
            conn.close().map_err(|(_, e)| DalError::Database(e))?;
            log::info!("Database closed: {}", self.config.location());
        }
        Ok(())
    }

    pub fn clear_cache(&self) {
        let state = self.state.lock();
        state.cache.borrow_mut().clear();
    }

    pub fn cache_len(&self) -> usize {
        let state = self.state.lock();
        let len = state.cache.borrow().len();
        len
    }

    fn log_timing(&self, sql: &str, started: Instant) {
        let elapsed_ms = started.elapsed().as_millis();
        if elapsed_ms > u128::from(self.config.slow_query_ms) {
            log::warn!("Slow query ({} ms): {}", elapsed_ms, sql);
        } else if self.config.verbose {
            log::debug!("query ({} ms): {}", elapsed_ms, sql);
        }
    }
}

/// Ends the transaction on every exit path, including a panic inside the closure.
struct TxScope<'a> {
    db: &'a Database,
    nested: bool,
    finished: bool,
}

impl TxScope<'_> {
    fn finish(&mut self, commit: bool) -> Result<()> {
        self.finished = true;
        self.db.end_transaction(self.nested, commit)
    }
}

impl Drop for TxScope<'_> {
    fn drop(&mut self) {
        if !self.finished {
            if let Err(e) = self.db.end_transaction(self.nested, false) {
                log::error!("Failed to roll back abandoned transaction: {}", e);
            }
        }
    }
}

fn not_connected() -> DalError {
    DalError::Bootstrap("database is not connected".to_string())
}

fn connection_in_use() -> DalError {
    DalError::InvalidArgument("the connection is borrowed by with_connection".to_string())
}

fn read_pragmas(conn: &Connection) -> Result<PragmaInfo> {
    let journal_mode: String = conn.query_row("PRAGMA journal_mode", [], |row| row.get(0))?;
    let cache_size: i64 = conn.query_row("PRAGMA cache_size", [], |row| row.get(0))?;
    let synchronous: i64 = conn.query_row("PRAGMA synchronous", [], |row| row.get(0))?;
    let foreign_keys: i64 = conn.query_row("PRAGMA foreign_keys", [], |row| row.get(0))?;
    let temp_store: i64 = conn.query_row("PRAGMA temp_store", [], |row| row.get(0))?;
    let mmap_size: i64 = conn
        .query_row("PRAGMA mmap_size", [], |row| row.get(0))
        .unwrap_or_default();
    Ok(PragmaInfo {
        journal_mode,
        cache_size,
        synchronous,
        foreign_keys: foreign_keys != 0,
        temp_store,
        mmap_size,
    })
}
