//! End-to-end load orchestration
//!
//! Order matters: the connection is resolved before anything is downloaded, so
//! a missing `DATABASE_URL` fails fast without touching the network.

use crate::cast::smart_cast;
use crate::config::LoadConfig;
use crate::dataset::Dataset;
use crate::error::{IngestError, Result};
use crate::fetch::DatasetFetcher;
use crate::loader::{BatchedLoader, LoadReport, TableSink};
use crate::normalize::normalize_dataset;
use crate::sink::PgTableSink;
use crate::target::{LoadMode, TargetTable};
use std::path::Path;
use tracing::info;

/// Read a CSV file and return it normalized and cast, ready to load.
pub fn prepare_dataset(path: &Path) -> Result<Dataset> {
    let raw = Dataset::read_csv(path)?;
    info!(
        rows = raw.row_count(),
        columns = raw.column_count(),
        "Read {}",
        path.display()
    );
    let normalized = normalize_dataset(raw)?;
    smart_cast(&normalized)
}

/// Prepare `path` and write it through `sink`.
pub async fn load_file<S>(
    path: &Path,
    sink: &mut S,
    target: &TargetTable,
    mode: LoadMode,
    loader: &BatchedLoader,
) -> Result<LoadReport>
where
    S: TableSink + ?Sized,
{
    let dataset = prepare_dataset(path)?;
    loader.load(sink, &dataset, target, mode).await
}

/// Full run: resolve connection, download, pick the first CSV, load it.
pub async fn run(config: &LoadConfig) -> Result<LoadReport> {
    let descriptor = config.connection.resolve()?;
    let pool = descriptor.connect_lazy()?;
    let loader = BatchedLoader::with_chunk_size(config.chunk_size)?;

    let fetcher = DatasetFetcher::new(config.kaggle_bin.as_os_str());
    let csvs = fetcher.fetch(&config.dataset, &config.download_dir).await?;
    let first = csvs.first().ok_or_else(|| IngestError::EmptyResult {
        dir: config.download_dir.clone(),
    })?;
    info!("Using {}", first.display());

    let mut sink = PgTableSink::new(pool);
    let report = load_file(first, &mut sink, &config.target, config.mode, &loader).await?;
    info!(
        rows = report.rows_written,
        chunks = report.chunks_written,
        "Done"
    );
    Ok(report)
}
