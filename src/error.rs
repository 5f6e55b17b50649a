// CineVault Error Types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DalError {
    #[error("Bootstrap failed: {0}")]
    Bootstrap(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid column name: {0}")]
    InvalidColumn(String),

    #[error("Column {column} is not sortable on {table}")]
    InvalidSortColumn { table: String, column: String },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Statement is not read-only: {0}")]
    ReadOnly(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Backup error: {0}")]
    Backup(String),
}

pub type Result<T> = std::result::Result<T, DalError>;
