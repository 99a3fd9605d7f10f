//! Run configuration
//!
//! Built once from the parsed command line (clap has already merged the
//! environment and `.env`) and handed to the pipeline. Nothing below this
//! module reads environment variables.

use crate::connection::ConnectionSettings;
use crate::error::{IngestError, Result};
use crate::report::VerifyOptions;
use crate::target::{LoadMode, TargetTable};
use crate::{ConnectionArgs, LoadArgs, TableArgs, VerifyArgs};
use std::path::PathBuf;

/// Settings for `tabload load`
#[derive(Debug, Clone)]
pub struct LoadConfig {
    pub dataset: String,
    pub download_dir: PathBuf,
    pub kaggle_bin: PathBuf,
    pub target: TargetTable,
    pub mode: LoadMode,
    pub chunk_size: usize,
    pub connection: ConnectionSettings,
}

/// Settings for `tabload verify`
#[derive(Debug, Clone)]
pub struct VerifyConfig {
    pub target: TargetTable,
    pub connection: ConnectionSettings,
    pub options: VerifyOptions,
    pub json: bool,
}

impl From<&ConnectionArgs> for ConnectionSettings {
    fn from(args: &ConnectionArgs) -> Self {
        Self {
            database_url: args.database_url.clone(),
            conn_str: args.conn_str.clone(),
        }
    }
}

impl TryFrom<&TableArgs> for TargetTable {
    type Error = IngestError;

    fn try_from(args: &TableArgs) -> Result<Self> {
        TargetTable::resolve(&args.table, args.schema.as_deref())
    }
}

impl TryFrom<&LoadArgs> for LoadConfig {
    type Error = IngestError;

    fn try_from(args: &LoadArgs) -> Result<Self> {
        if args.chunk_size == 0 {
            return Err(IngestError::config("CHUNK_SIZE must be greater than 0"));
        }

        let dataset = args.dataset.trim();
        if dataset.is_empty() {
            return Err(IngestError::config("KAGGLE_DATASET must not be empty"));
        }

        Ok(Self {
            dataset: dataset.to_string(),
            download_dir: args.download_dir.clone(),
            kaggle_bin: args.kaggle_bin.clone(),
            target: TargetTable::try_from(&args.table)?,
            mode: args.mode.parse()?,
            chunk_size: args.chunk_size,
            connection: ConnectionSettings::from(&args.connection),
        })
    }
}

impl TryFrom<&VerifyArgs> for VerifyConfig {
    type Error = IngestError;

    fn try_from(args: &VerifyArgs) -> Result<Self> {
        if args.sample < 0 {
            return Err(IngestError::config("sample size must not be negative"));
        }

        let json = match args.format.to_ascii_lowercase().as_str() {
            "table" | "text" => false,
            "json" => true,
            other => {
                return Err(IngestError::config(format!(
                    "unknown output format '{other}' (expected table or json)"
                )))
            },
        };

        let stats_column = Some(args.stats_column.trim())
            .filter(|c| !c.is_empty())
            .map(str::to_string);
        let distinct_columns = args
            .distinct
            .iter()
            .map(|c| c.trim())
            .filter(|c| !c.is_empty())
            .map(str::to_string)
            .collect();

        Ok(Self {
            target: TargetTable::try_from(&args.table)?,
            connection: ConnectionSettings::from(&args.connection),
            options: VerifyOptions {
                sample_size: args.sample,
                stats_column,
                distinct_columns,
            },
            json,
        })
    }
}
