//! Batched loader
//!
//! Splits a [`Dataset`] into fixed-size row windows and hands them, one at a
//! time and in ascending order, to a [`TableSink`]. The first window uses the
//! configured [`LoadMode`]; every later window appends.
//!
//! There is no retry and no rollback across windows. The first failing
//! window stops the run with a [`ChunkWriteError`] that records how far the
//! load got; windows written before it stay committed.

use crate::dataset::{Dataset, DatasetSlice};
use crate::error::{ChunkWriteError, IngestError, Result};
use crate::target::{LoadMode, TargetTable};
use async_trait::async_trait;
use serde::Serialize;
use tracing::{error, info, warn};

/// Default number of rows per chunk
pub const DEFAULT_CHUNK_SIZE: usize = 500;

/// One planned write: rows `[start, end)` written with `mode`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkPlan {
    pub index: usize,
    pub start: usize,
    pub end: usize,
    pub mode: LoadMode,
    pub total_rows: usize,
}

impl ChunkPlan {
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Share of rows already written when this chunk starts, in percent
    pub fn percent_complete(&self) -> f64 {
        if self.total_rows == 0 {
            return 100.0;
        }
        self.start as f64 / self.total_rows as f64 * 100.0
    }

    /// Whether this chunk creates or recreates the destination table
    pub fn is_first(&self) -> bool {
        self.index == 0
    }
}

/// Partition `total_rows` into `[0, size), [size, 2*size), ...`.
///
/// The last window is truncated to `total_rows`. Zero rows gives no windows.
pub fn plan_chunks(total_rows: usize, chunk_size: usize, initial_mode: LoadMode) -> Vec<ChunkPlan> {
    let chunk_size = chunk_size.max(1);
    (0..total_rows)
        .step_by(chunk_size)
        .enumerate()
        .map(|(index, start)| ChunkPlan {
            index,
            start,
            end: (start + chunk_size).min(total_rows),
            mode: initial_mode.for_chunk(index),
            total_rows,
        })
        .collect()
}

/// Destination that accepts one chunk at a time.
///
/// An implementation must make each call all-or-nothing: either every row of
/// `rows` is committed when it returns `Ok`, or none is.
#[async_trait]
pub trait TableSink: Send {
    async fn write_chunk(
        &mut self,
        target: &TargetTable,
        plan: &ChunkPlan,
        rows: DatasetSlice<'_>,
    ) -> Result<()>;
}

/// Outcome of a completed load
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoadReport {
    pub table: String,
    pub mode: LoadMode,
    pub rows_written: usize,
    pub chunks_written: usize,
    pub columns: usize,
}

#[derive(Debug, Clone)]
pub struct BatchedLoader {
    chunk_size: usize,
}

impl Default for BatchedLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl BatchedLoader {
    pub fn new() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    pub fn with_chunk_size(chunk_size: usize) -> Result<Self> {
        if chunk_size == 0 {
            return Err(IngestError::config("chunk size must be greater than 0"));
        }
        Ok(Self { chunk_size })
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Write `dataset` into `target`, one chunk at a time.
    pub async fn load<S>(
        &self,
        sink: &mut S,
        dataset: &Dataset,
        target: &TargetTable,
        mode: LoadMode,
    ) -> Result<LoadReport>
    where
        S: TableSink + ?Sized,
    {
        if dataset.column_count() == 0 {
            return Err(IngestError::invalid_dataset("dataset has no columns"));
        }

        info!(
            "Loading {} rows, {} cols into {} (mode={})",
            dataset.row_count(),
            dataset.column_count(),
            target,
            mode
        );

        let plans = plan_chunks(dataset.row_count(), self.chunk_size, mode);
        if plans.is_empty() {
            warn!(table = %target, "Dataset has no rows; nothing written");
        }

        let mut rows_written = 0;
        let mut last_committed: Option<usize> = None;

        for plan in &plans {
            info!(
                "Processing rows {} to {} ({:.1}% complete)",
                plan.start,
                plan.end,
                plan.percent_complete()
            );

            let rows = dataset.slice(plan.start..plan.end);
            if let Err(err) = sink.write_chunk(target, plan, rows).await {
                error!(
                    chunk = plan.index,
                    start = plan.start,
                    end = plan.end,
                    error = %err,
                    "Failed to upload chunk {}-{}",
                    plan.start,
                    plan.end
                );
                return Err(Box::new(ChunkWriteError {
                    table: target.to_string(),
                    chunk_index: plan.index,
                    start: plan.start,
                    end: plan.end,
                    last_committed_chunk: last_committed,
                    rows_committed: rows_written,
                    source: Box::new(err),
                })
                .into());
            }

            rows_written += plan.len();
            last_committed = Some(plan.index);
        }

        Ok(LoadReport {
            table: target.to_string(),
            mode,
            rows_written,
            chunks_written: plans.len(),
            columns: dataset.column_count(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::{Column, ColumnData};
    use std::sync::{Arc, Mutex};
    use tracing_subscriber::fmt::MakeWriter;

    #[derive(Clone, Default)]
    struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

    impl std::io::Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl<'a> MakeWriter<'a> for CapturedLogs {
        type Writer = Self;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    struct DiscardSink;

    #[async_trait]
    impl TableSink for DiscardSink {
        async fn write_chunk(
            &mut self,
            _target: &TargetTable,
            _plan: &ChunkPlan,
            _rows: DatasetSlice<'_>,
        ) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_plan_covers_rows_once() {
        for total in [0usize, 1, 499, 500, 501, 1200, 2000] {
            let plans = plan_chunks(total, 500, LoadMode::Append);
            assert_eq!(plans.iter().map(ChunkPlan::len).sum::<usize>(), total);

            let mut expected_start = 0;
            for (i, plan) in plans.iter().enumerate() {
                assert_eq!(plan.index, i);
                assert_eq!(plan.start, expected_start);
                assert!(plan.len() <= 500 && !plan.is_empty());
                expected_start = plan.end;
            }
            assert_eq!(expected_start, total);
        }
    }

    #[test]
    fn test_plan_modes() {
        for mode in [LoadMode::Replace, LoadMode::Append] {
            let plans = plan_chunks(1600, 500, mode);
            assert_eq!(plans[0].mode, mode);
            assert!(plans[1..].iter().all(|p| p.mode == LoadMode::Append));
        }
    }

    #[test]
    fn test_plan_1200_rows() {
        let plans = plan_chunks(1200, 500, LoadMode::Replace);
        let windows: Vec<_> = plans.iter().map(|p| (p.start, p.end, p.mode)).collect();
        assert_eq!(
            windows,
            vec![
                (0, 500, LoadMode::Replace),
                (500, 1000, LoadMode::Append),
                (1000, 1200, LoadMode::Append),
            ]
        );

        let progress: Vec<String> = plans
            .iter()
            .map(|p| format!("{:.1}", p.percent_complete()))
            .collect();
        assert_eq!(progress, vec!["0.0", "41.7", "83.3"]);
    }

    #[test]
    fn test_zero_chunk_size_rejected() {
        assert!(BatchedLoader::with_chunk_size(0).is_err());
        assert_eq!(BatchedLoader::new().chunk_size(), DEFAULT_CHUNK_SIZE);
    }

    #[tokio::test]
    async fn test_progress_lines_logged() {
        let logs = CapturedLogs::default();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(logs.clone())
            .with_ansi(false)
            .without_time()
            .with_max_level(tracing::Level::INFO)
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let dataset = Dataset::new(vec![Column::new(
            "n",
            ColumnData::Integer((0..1200).map(Some).collect()),
        )])
        .unwrap();
        let target = TargetTable::resolve("delays", None).unwrap();
        BatchedLoader::new()
            .load(&mut DiscardSink, &dataset, &target, LoadMode::Replace)
            .await
            .unwrap();

        let output = String::from_utf8(logs.0.lock().unwrap().clone()).unwrap();
        let progress: Vec<&str> = output
            .lines()
            .filter_map(|line| line.find("Processing rows").map(|i| &line[i..]))
            .collect();
        assert_eq!(
            progress,
            vec![
                "Processing rows 0 to 500 (0.0% complete)",
                "Processing rows 500 to 1000 (41.7% complete)",
                "Processing rows 1000 to 1200 (83.3% complete)",
            ]
        );
    }
}
