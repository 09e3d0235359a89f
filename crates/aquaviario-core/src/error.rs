// crates/aquaviario-core/src/error.rs

use std::path::PathBuf;

use aquaviario_parser::ParserError;
use thiserror::Error;

use crate::config::ConfigError;
use crate::tiers::TableAddress;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("failed to ingest {path}: {source}")]
    Ingest {
        path: PathBuf,
        #[source]
        source: ParserError,
    },

    #[error("table {table} has columns {found:?}, expected {expected:?}")]
    SchemaMismatch {
        table: String,
        expected: Vec<String>,
        found: Vec<String>,
    },

    #[error("table {table} would contain column '{column}' more than once")]
    DuplicateColumn { table: String, column: String },

    #[error("failed to write {address}: {source}")]
    Write {
        address: TableAddress,
        #[source]
        source: Box<PipelineError>,
    },

    #[error("'{0}' is not a valid table name")]
    InvalidTableName(String),

    #[error("table {0} does not exist")]
    TableNotFound(TableAddress),

    #[error("invalid discovery pattern: {0}")]
    Pattern(#[from] glob::PatternError),

    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Polars operation failed: {0}")]
    Polars(#[from] polars::error::PolarsError),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, PipelineError>;
