use std::path::PathBuf;

use thiserror::Error;

/// Errors produced by the punch storage and migration layers. The CLI layer
/// wraps these into [anyhow::Error] for presentation.
#[derive(Error, Debug)]
pub enum PunchError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("punch-out time {out_ms} is earlier than punch-in time {in_ms}")]
    InvalidTimeRange { in_ms: i64, out_ms: i64 },

    #[error("failed to read punch file {path}: {source}")]
    StorageRead {
        path: PathBuf,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("failed to write punch file {path}: {source}")]
    StorageWrite {
        path: PathBuf,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("cannot detect the schema version of a punch file document")]
    UnknownSchemaVersion,

    #[error("no migration path from schema version {from} to {to}")]
    UnsupportedMigrationPath { from: u32, to: u32 },
}

pub type PunchResult<T> = Result<T, PunchError>;
