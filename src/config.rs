// CineVault configuration
// Environment-driven settings for the connection manager.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::Serialize;

use crate::constants::*;
use crate::error::{DalError, Result};

/// Deployment profile. `Test` runs against an in-memory store without seed data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Development,
    Production,
    Test,
}

impl FromStr for Environment {
    type Err = DalError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" => Ok(Environment::Development),
            "production" | "prod" => Ok(Environment::Production),
            "test" => Ok(Environment::Test),
            other => Err(DalError::Config(format!("unknown APP_ENV '{}'", other))),
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Environment::Development => "development",
            Environment::Production => "production",
            Environment::Test => "test",
        };
        f.write_str(s)
    }
}

/// SQLite `synchronous` pragma values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SyncMode {
    Off,
    Normal,
    Full,
    Extra,
}

impl SyncMode {
    pub fn as_pragma(&self) -> &'static str {
        match self {
            SyncMode::Off => "OFF",
            SyncMode::Normal => "NORMAL",
            SyncMode::Full => "FULL",
            SyncMode::Extra => "EXTRA",
        }
    }
}

impl FromStr for SyncMode {
    type Err = DalError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "OFF" | "0" => Ok(SyncMode::Off),
            "NORMAL" | "1" => Ok(SyncMode::Normal),
            "FULL" | "2" => Ok(SyncMode::Full),
            "EXTRA" | "3" => Ok(SyncMode::Extra),
            other => Err(DalError::Config(format!("unknown DB_SYNCHRONOUS '{}'", other))),
        }
    }
}

/// Connection manager configuration.
#[derive(Debug, Clone)]
pub struct DbConfig {
    pub environment: Environment,
    /// Storage file. Ignored when `in_memory` is set.
    pub db_path: PathBuf,
    pub in_memory: bool,
    pub cache_size: i64,
    pub synchronous: SyncMode,
    pub foreign_keys: bool,
    pub mmap_size: i64,
    pub busy_timeout_ms: u64,
    /// Queries slower than this are logged at warn level. Nothing is aborted.
    pub slow_query_ms: u64,
    /// Maximum cached result sets. 0 disables the cache.
    pub query_cache_size: usize,
    pub backup_dir: PathBuf,
    pub backup_retention: usize,
    pub backup_interval_secs: Option<u64>,
    pub verbose: bool,
    pub schema_path: Option<PathBuf>,
    pub seed_path: Option<PathBuf>,
    pub seed_enabled: bool,
}

impl DbConfig {
    /// Defaults for a file-backed database at `db_path`.
    pub fn new(db_path: impl Into<PathBuf>) -> Self {
        let db_path = db_path.into();
        let backup_dir = default_backup_dir(&db_path);
        Self {
            environment: Environment::Development,
            db_path,
            in_memory: false,
            cache_size: DEFAULT_CACHE_SIZE,
            synchronous: SyncMode::Normal,
            foreign_keys: true,
            mmap_size: DEFAULT_MMAP_SIZE,
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
            slow_query_ms: DEFAULT_SLOW_QUERY_MS,
            query_cache_size: DEFAULT_QUERY_CACHE_SIZE,
            backup_dir,
            backup_retention: DEFAULT_BACKUP_RETENTION,
            backup_interval_secs: None,
            verbose: false,
            schema_path: None,
            seed_path: None,
            seed_enabled: true,
        }
    }

    /// In-memory profile used by tests: schema only, no seed data.
    pub fn test() -> Self {
        let mut config = Self::new(":memory:");
        config.environment = Environment::Test;
        config.in_memory = true;
        config.seed_enabled = false;
        config.backup_dir = std::env::temp_dir().join("cinevault-test-backups");
        config
    }

    /// Load configuration from the process environment.
    ///
    /// | Env Var                   | Default                       |
    /// |---------------------------|-------------------------------|
    /// | `APP_ENV`                 | `development`                 |
    /// | `DB_PATH`                 | `~/.cinevault/cinevault.db`   |
    /// | `DB_CACHE_SIZE`           | `-64000`                      |
    /// | `DB_SYNCHRONOUS`          | `NORMAL`                      |
    /// | `DB_FOREIGN_KEYS`         | `true`                        |
    /// | `DB_MMAP_SIZE`            | `268435456`                   |
    /// | `DB_SLOW_QUERY_MS`        | `100`                         |
    /// | `DB_QUERY_CACHE_SIZE`     | `100`                         |
    /// | `DB_BACKUP_DIR`           | `<db dir>/backups`            |
    /// | `DB_BACKUP_RETENTION`     | `7`                           |
    /// | `DB_BACKUP_INTERVAL_SECS` | unset                         |
    /// | `DB_VERBOSE`              | `false`                       |
    /// | `DB_SCHEMA_PATH`          | unset (embedded schema)       |
    /// | `DB_SEED_PATH`            | unset (embedded seed)         |
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as `from_env` but reads values through `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let environment = match lookup("APP_ENV") {
            Some(v) => v.parse()?,
            None => Environment::Development,
        };

        let mut config = if environment == Environment::Test {
            Self::test()
        } else {
            let db_path = match lookup("DB_PATH") {
                Some(p) => PathBuf::from(p),
                None => default_db_path()?,
            };
            let mut config = Self::new(db_path);
            config.environment = environment;
            config
        };

        if let Some(v) = lookup("DB_CACHE_SIZE") {
            config.cache_size = parse_number("DB_CACHE_SIZE", &v)?;
        }
        if let Some(v) = lookup("DB_SYNCHRONOUS") {
            config.synchronous = v.parse()?;
        }
        if let Some(v) = lookup("DB_FOREIGN_KEYS") {
            config.foreign_keys = parse_bool("DB_FOREIGN_KEYS", &v)?;
        }
        if let Some(v) = lookup("DB_MMAP_SIZE") {
            config.mmap_size = parse_number("DB_MMAP_SIZE", &v)?;
        }
        if let Some(v) = lookup("DB_SLOW_QUERY_MS") {
            config.slow_query_ms = parse_number("DB_SLOW_QUERY_MS", &v)?;
        }
        if let Some(v) = lookup("DB_QUERY_CACHE_SIZE") {
            config.query_cache_size = parse_number("DB_QUERY_CACHE_SIZE", &v)?;
        }
        if let Some(v) = lookup("DB_BACKUP_DIR") {
            config.backup_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("DB_BACKUP_RETENTION") {
            config.backup_retention = parse_number("DB_BACKUP_RETENTION", &v)?;
            if config.backup_retention == 0 {
                return Err(DalError::Config(
                    "DB_BACKUP_RETENTION must keep at least one backup".to_string(),
                ));
            }
        }
        if let Some(v) = lookup("DB_BACKUP_INTERVAL_SECS") {
            let secs: u64 = parse_number("DB_BACKUP_INTERVAL_SECS", &v)?;
            config.backup_interval_secs = (secs > 0).then_some(secs);
        }
        if let Some(v) = lookup("DB_VERBOSE") {
            config.verbose = parse_bool("DB_VERBOSE", &v)?;
        }
        config.schema_path = lookup("DB_SCHEMA_PATH").map(PathBuf::from);
        config.seed_path = lookup("DB_SEED_PATH").map(PathBuf::from);

        Ok(config)
    }

    /// Point at another storage file. A backup directory derived from the old path follows it.
    pub fn with_db_path(mut self, db_path: impl Into<PathBuf>) -> Self {
        let db_path = db_path.into();
        if self.backup_dir == default_backup_dir(&self.db_path) {
            self.backup_dir = default_backup_dir(&db_path);
        }
        self.db_path = db_path;
        self.in_memory = false;
        self
    }

    /// Display form of the storage location.
    pub fn location(&self) -> String {
        if self.in_memory {
            ":memory:".to_string()
        } else {
            self.db_path.display().to_string()
        }
    }
}

/// Default database path: ~/.cinevault/cinevault.db
pub fn default_db_path() -> Result<PathBuf> {
    let home = directories::BaseDirs::new()
        .ok_or_else(|| DalError::Config("Could not determine home directory".to_string()))?;
    Ok(home.home_dir().join(APP_DATA_DIR).join(DB_FILENAME))
}

fn default_backup_dir(db_path: &std::path::Path) -> PathBuf {
    db_path
        .parent()
        .map(|p| p.join(BACKUP_FOLDER))
        .unwrap_or_else(|| PathBuf::from(BACKUP_FOLDER))
}

fn parse_number<T: FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| DalError::Config(format!("{} must be a number, got '{}'", key, value)))
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(DalError::Config(format!("{} must be a boolean, got '{}'", key, value))),
    }
}
