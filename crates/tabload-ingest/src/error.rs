//! Error types for the load pipeline
//!
//! Every variant is logged where it is detected and then propagated unchanged
//! to `main`, which prints the message and exits with status 1.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for ingest operations
pub type Result<T> = std::result::Result<T, IngestError>;

#[derive(Error, Debug)]
pub enum IngestError {
    /// The external retrieval tool could not be started or exited non-zero
    #[error("Fetch failed: `{command}` {status}. Check that the tool is installed and its credentials are configured.")]
    Fetch {
        command: String,
        status: String,
        output: String,
    },

    /// Download and extraction produced no CSV files
    #[error("No CSV files found under '{}' after download/unzip.", .dir.display())]
    EmptyResult { dir: PathBuf },

    /// Connection or load settings are missing or invalid
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A chunk could not be written to the destination table
    #[error(transparent)]
    ChunkWrite(#[from] Box<ChunkWriteError>),

    #[error("CSV error in '{}': {source}", .path.display())]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    /// Structurally invalid tabular input (ragged rows, bad header)
    #[error("Invalid dataset: {0}")]
    InvalidDataset(String),

    #[error("Archive error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl IngestError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn invalid_dataset(msg: impl Into<String>) -> Self {
        Self::InvalidDataset(msg.into())
    }

    /// The chunk failure carried by this error, if any
    pub fn as_chunk_write(&self) -> Option<&ChunkWriteError> {
        match self {
            Self::ChunkWrite(err) => Some(err.as_ref()),
            _ => None,
        }
    }
}

/// Failure writing one chunk.
///
/// Carries enough position information for an operator to resume by hand:
/// rows before `start` are committed, rows from `start` on are not.
#[derive(Error, Debug)]
#[error(
    "Failed to upload chunk {chunk_index} (rows {start}-{end}) into {table}: {source}"
)]
pub struct ChunkWriteError {
    pub table: String,
    pub chunk_index: usize,
    pub start: usize,
    pub end: usize,
    /// Index of the last chunk that committed, `None` when the first chunk failed
    pub last_committed_chunk: Option<usize>,
    pub rows_committed: usize,
    #[source]
    pub source: Box<dyn std::error::Error + Send + Sync>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_write_message_names_range() {
        let err = IngestError::from(Box::new(ChunkWriteError {
            table: "dbo.airline_delay_causes".to_string(),
            chunk_index: 2,
            start: 1000,
            end: 1200,
            last_committed_chunk: Some(1),
            rows_committed: 1000,
            source: "connection reset".into(),
        }));

        let msg = err.to_string();
        assert!(msg.contains("chunk 2"));
        assert!(msg.contains("rows 1000-1200"));
        assert!(msg.contains("connection reset"));
        assert_eq!(err.as_chunk_write().unwrap().last_committed_chunk, Some(1));
    }

    #[test]
    fn test_empty_result_message() {
        let err = IngestError::EmptyResult {
            dir: PathBuf::from("data"),
        };
        assert_eq!(
            err.to_string(),
            "No CSV files found under 'data' after download/unzip."
        );
    }
}
