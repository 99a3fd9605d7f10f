//! Dataset fetcher
//!
//! Downloads a dataset with the `kaggle` command-line tool, makes sure every
//! archive is unpacked and returns the CSV files it produced.
//!
//! ```text
//! kaggle datasets download -d <dataset> -p <dir> --unzip -q
//! ```
//!
//! Partial downloads are left on disk when anything fails.

use crate::error::{IngestError, Result};
use std::ffi::OsString;
use std::fs::File;
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::{debug, error, info, instrument};
use walkdir::WalkDir;

/// Default retrieval tool
pub const DEFAULT_KAGGLE_BIN: &str = "kaggle";

/// Default dataset identifier
pub const DEFAULT_DATASET: &str = "giovamata/airlinedelaycauses";

/// Default download directory
pub const DEFAULT_DOWNLOAD_DIR: &str = "data";

#[derive(Debug, Clone)]
pub struct DatasetFetcher {
    program: OsString,
}

impl Default for DatasetFetcher {
    fn default() -> Self {
        Self::new(DEFAULT_KAGGLE_BIN)
    }
}

impl DatasetFetcher {
    pub fn new(program: impl Into<OsString>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn args(dataset: &str, out_dir: &Path) -> Vec<OsString> {
        vec![
            "datasets".into(),
            "download".into(),
            "-d".into(),
            dataset.into(),
            "-p".into(),
            out_dir.as_os_str().to_owned(),
            "--unzip".into(),
            "-q".into(),
        ]
    }

    /// Human readable command line, for logs and errors
    pub fn command_line(&self, dataset: &str, out_dir: &Path) -> String {
        std::iter::once(self.program.clone())
            .chain(Self::args(dataset, out_dir))
            .map(|a| a.to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Download `dataset` into `out_dir` and list the CSV files found there.
    #[instrument(skip(self))]
    pub async fn fetch(&self, dataset: &str, out_dir: &Path) -> Result<Vec<PathBuf>> {
        tokio::fs::create_dir_all(out_dir).await?;

        let command = self.command_line(dataset, out_dir);
        info!("[CMD] {}", command);

        let output = Command::new(&self.program)
            .args(Self::args(dataset, out_dir))
            .output()
            .await
            .map_err(|e| {
                error!(command = %command, error = %e, "Failed to start retrieval tool");
                IngestError::Fetch {
                    command: command.clone(),
                    status: format!("could not be started ({e})"),
                    output: String::new(),
                }
            })?;

        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));
        if !combined.trim().is_empty() {
            info!("{}", combined.trim_end());
        }

        if !output.status.success() {
            error!(command = %command, status = %output.status, "Retrieval tool failed");
            return Err(IngestError::Fetch {
                command,
                status: output.status.to_string(),
                output: combined,
            });
        }

        let extracted = extract_archives(out_dir)?;
        if extracted > 0 {
            info!(archives = extracted, "Extracted leftover archives");
        }

        let csvs = find_csv_files(out_dir)?;
        if csvs.is_empty() {
            error!(dir = %out_dir.display(), "No CSV files after download/unzip");
            return Err(IngestError::EmptyResult {
                dir: out_dir.to_path_buf(),
            });
        }

        info!("CSVs found:");
        for path in &csvs {
            info!("   - {}", path.display());
        }
        Ok(csvs)
    }
}

fn has_extension(path: &Path, ext: &str) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case(ext))
}

/// Unpack every `*.zip` directly inside `dir` into `dir`, then delete it.
///
/// Returns how many archives were extracted.
pub fn extract_archives(dir: &Path) -> Result<usize> {
    let mut archives: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_file() && has_extension(p, "zip"))
        .collect();
    archives.sort();

    for path in &archives {
        info!("Unzipping: {}", path.display());
        let mut archive = zip::ZipArchive::new(File::open(path)?)?;
        archive.extract(dir)?;
        std::fs::remove_file(path)?;
    }

    Ok(archives.len())
}

/// All `*.csv` files under `dir`, recursively, sorted by path.
pub fn find_csv_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut csvs = Vec::new();
    for entry in WalkDir::new(dir).follow_links(true) {
        let entry = entry.map_err(|e| {
            IngestError::Io(
                e.into_io_error()
                    .unwrap_or_else(|| std::io::Error::other("filesystem loop while scanning")),
            )
        })?;
        if entry.file_type().is_file() && has_extension(entry.path(), "csv") {
            debug!(path = %entry.path().display(), "Found CSV");
            csvs.push(entry.into_path());
        }
    }
    csvs.sort();
    Ok(csvs)
}
