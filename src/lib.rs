// CineVault - Library Entry Point
// Embedded SQLite data access layer for a movie and series catalog.

pub mod config;
pub mod constants;
pub mod db;
pub mod error;
pub mod model;
pub mod models;

use std::sync::Arc;

pub use config::{DbConfig, Environment, SyncMode};
pub use db::backup::{spawn_backup_worker, BackupWorker};
pub use db::{Database, DbInfo, ExecResult, Row, SqlValue};
pub use error::{DalError, Result};
pub use model::{BaseModel, Condition, Conditions, FindOptions, Page, SortOrder};
pub use models::{BrowseFilter, ContentKind, Dal};

/// Open the database described by `config` and wire up every model.
/// Bootstrap failures surface here, before any model is handed out.
pub fn open(config: DbConfig) -> Result<Dal> {
    let db = Arc::new(Database::open(config)?);
    Ok(Dal::new(db))
}
