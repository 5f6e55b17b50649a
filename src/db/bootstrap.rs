// Database bootstrap
// Pragmas, schema creation and baseline seed data. Scripts are opaque text executed verbatim.

use std::borrow::Cow;
use std::path::Path;

use rusqlite::Connection;

use crate::config::DbConfig;
use crate::constants::PRIMARY_CONTENT_TABLE;
use crate::error::{DalError, Result};

/// Schema shipped with the crate, used when no DB_SCHEMA_PATH is configured.
pub const DEFAULT_SCHEMA: &str = include_str!("schema.sql");

/// Seed data shipped with the crate, used when no DB_SEED_PATH is configured.
pub const DEFAULT_SEED: &str = include_str!("seed.sql");

/// What happened during bootstrap, for logging and diagnostics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BootstrapReport {
    pub schema_created: bool,
    pub seeded: bool,
}

/// Apply connection pragmas. Must run on every fresh connection.
pub fn apply_pragmas(conn: &Connection, config: &DbConfig) -> Result<()> {
    let foreign_keys = if config.foreign_keys { "ON" } else { "OFF" };
    conn.execute_batch(&format!("PRAGMA foreign_keys = {};", foreign_keys))?;

    // In-memory databases report "memory" here and keep working
    conn.execute_batch("PRAGMA journal_mode = WAL;")?;

    conn.execute_batch(&format!("PRAGMA cache_size = {};", config.cache_size))?;
    conn.execute_batch(&format!("PRAGMA synchronous = {};", config.synchronous.as_pragma()))?;
    conn.execute_batch("PRAGMA temp_store = MEMORY;")?;
    conn.execute_batch(&format!("PRAGMA mmap_size = {};", config.mmap_size))?;
    conn.busy_timeout(std::time::Duration::from_millis(config.busy_timeout_ms))?;

    Ok(())
}

/// Check whether a table exists in the main schema.
pub fn table_exists(conn: &Connection, name: &str) -> Result<bool> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1)",
        [name],
        |row| row.get(0),
    )?;
    Ok(exists)
}

/// Create the schema if the primary content table is missing, then seed it if empty.
/// Any failure here is fatal for startup.
pub fn run_bootstrap(conn: &Connection, config: &DbConfig) -> Result<BootstrapReport> {
    let mut report = BootstrapReport::default();

    let has_schema = table_exists(conn, PRIMARY_CONTENT_TABLE)
        .map_err(|e| DalError::Bootstrap(format!("schema check failed: {}", e)))?;

    if !has_schema {
        let schema = load_schema(config)?;
        conn.execute_batch(&schema)
            .map_err(|e| DalError::Bootstrap(format!("schema script failed: {}", e)))?;
        if !table_exists(conn, PRIMARY_CONTENT_TABLE)? {
            return Err(DalError::Bootstrap(format!(
                "schema script did not create the {} table",
                PRIMARY_CONTENT_TABLE
            )));
        }
        report.schema_created = true;
        log::info!("Created database schema");
    }

    if config.seed_enabled && primary_table_is_empty(conn)? {
        if let Some(seed) = load_seed(config) {
            conn.execute_batch(&seed)
                .map_err(|e| DalError::Bootstrap(format!("seed script failed: {}", e)))?;
            report.seeded = true;
            log::info!("Seeded baseline data");
        }
    }

    Ok(report)
}

fn primary_table_is_empty(conn: &Connection) -> Result<bool> {
    let count: i64 = conn.query_row(
        &format!("SELECT COUNT(*) FROM {}", PRIMARY_CONTENT_TABLE),
        [],
        |row| row.get(0),
    )?;
    Ok(count == 0)
}

fn load_schema(config: &DbConfig) -> Result<Cow<'static, str>> {
    match &config.schema_path {
        Some(path) => read_script(path).map(Cow::Owned).map_err(|e| {
            DalError::Bootstrap(format!("cannot read schema {}: {}", path.display(), e))
        }),
        None => Ok(Cow::Borrowed(DEFAULT_SCHEMA)),
    }
}

/// A missing seed file only warns; the database is still usable without it.
fn load_seed(config: &DbConfig) -> Option<Cow<'static, str>> {
    match &config.seed_path {
        Some(path) => match read_script(path) {
            Ok(sql) => Some(Cow::Owned(sql)),
            Err(e) => {
                log::warn!("Skipping seed data, cannot read {}: {}", path.display(), e);
                None
            }
        },
        None => Some(Cow::Borrowed(DEFAULT_SEED)),
    }
}

fn read_script(path: &Path) -> std::io::Result<String> {
    std::fs::read_to_string(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded_config() -> DbConfig {
        let mut config = DbConfig::test();
        config.seed_enabled = true;
        config
    }

    fn count(conn: &Connection, table: &str) -> i64 {
        conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| row.get(0))
            .unwrap()
    }

    #[test]
    fn test_fresh_bootstrap_creates_and_seeds() {
        let conn = Connection::open_in_memory().unwrap();
        let config = seeded_config();
        apply_pragmas(&conn, &config).unwrap();

        let report = run_bootstrap(&conn, &config).unwrap();
        assert!(report.schema_created);
        assert!(report.seeded);
        assert!(count(&conn, "movies") > 0);
        assert!(count(&conn, "categories") > 0);
    }

    #[test]
    fn test_bootstrap_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        let config = seeded_config();
        run_bootstrap(&conn, &config).unwrap();
        let movies = count(&conn, "movies");

        // Second run: schema present, table not empty, nothing to do
        let report = run_bootstrap(&conn, &config).unwrap();
        assert_eq!(report, BootstrapReport::default());
        assert_eq!(count(&conn, "movies"), movies);
    }

    #[test]
    fn test_test_profile_skips_seed() {
        let conn = Connection::open_in_memory().unwrap();
        let report = run_bootstrap(&conn, &DbConfig::test()).unwrap();
        assert!(report.schema_created);
        assert!(!report.seeded);
        assert_eq!(count(&conn, "movies"), 0);
    }

    #[test]
    fn test_missing_seed_file_is_not_fatal() {
        let conn = Connection::open_in_memory().unwrap();
        let mut config = seeded_config();
        config.seed_path = Some("/nonexistent/cinevault/seed.sql".into());

        let report = run_bootstrap(&conn, &config).unwrap();
        assert!(report.schema_created);
        assert!(!report.seeded);
    }

    #[test]
    fn test_broken_schema_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let schema_path = dir.path().join("schema.sql");
        std::fs::write(&schema_path, "CREATE TABLE movies (id INTEGER PRIMARY KEY;").unwrap();

        let conn = Connection::open_in_memory().unwrap();
        let mut config = DbConfig::test();
        config.schema_path = Some(schema_path);

        let err = run_bootstrap(&conn, &config).unwrap_err();
        assert!(matches!(err, DalError::Bootstrap(_)));
    }
}
