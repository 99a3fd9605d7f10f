//! Pipeline tests against in-memory sinks
//!
//! Covers:
//! - Chunk windows, modes and ordering as seen by the sink
//! - Failure part way through a load
//! - Normalization and casting of a real CSV file

use async_trait::async_trait;
use std::fmt::Write as _;
use std::path::PathBuf;
use tabload_ingest::dataset::{ColumnType, DatasetSlice, Value};
use tabload_ingest::loader::{BatchedLoader, ChunkPlan, TableSink};
use tabload_ingest::target::{LoadMode, TargetTable};
use tabload_ingest::{pipeline, IngestError};
use tempfile::TempDir;

#[derive(Debug, Clone, PartialEq)]
struct WrittenChunk {
    index: usize,
    start: usize,
    end: usize,
    mode: LoadMode,
    columns: Vec<String>,
    first_row: Vec<String>,
}

/// Records every chunk it is handed; optionally fails on one chunk index.
#[derive(Default)]
struct RecordingSink {
    chunks: Vec<WrittenChunk>,
    fail_on: Option<usize>,
}

impl RecordingSink {
    fn failing_on(index: usize) -> Self {
        Self {
            chunks: Vec::new(),
            fail_on: Some(index),
        }
    }
}

fn render(value: Value<'_>) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::Integer(v) => v.to_string(),
        Value::Float(v) => v.to_string(),
        Value::Text(v) => v.to_string(),
    }
}

#[async_trait]
impl TableSink for RecordingSink {
    async fn write_chunk(
        &mut self,
        _target: &TargetTable,
        plan: &ChunkPlan,
        rows: DatasetSlice<'_>,
    ) -> tabload_ingest::Result<()> {
        if self.fail_on == Some(plan.index) {
            return Err(IngestError::config("connection reset by peer"));
        }
        self.chunks.push(WrittenChunk {
            index: plan.index,
            start: rows.rows().start,
            end: rows.rows().end,
            mode: plan.mode,
            columns: rows.columns().iter().map(|c| c.name.clone()).collect(),
            first_row: rows.row(0).map(render).collect(),
        });
        Ok(())
    }
}

/// Airline-style CSV with `rows` data rows; row 3 has a bad year.
fn write_delays_csv(rows: usize) -> (TempDir, PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("DelayedFlights.csv");

    let mut content = String::from(",Year,Month, Arr Delay ,Origin,Flight ID,WeatherDelay\n");
    for i in 0..rows {
        let year = if i == 3 { "bad" } else { "2008" };
        let weather = if i % 2 == 0 { "NA" } else { "7" };
        writeln!(
            content,
            "{i},{year},{},{}.5,ATL,{},{weather}",
            i % 12 + 1,
            i,
            1000 + i
        )
        .unwrap();
    }
    std::fs::write(&path, content).unwrap();
    (dir, path)
}

fn target() -> TargetTable {
    TargetTable::resolve("dbo.airline_delay_causes", None).unwrap()
}

// ============================================================================
// Chunking
// ============================================================================

#[tokio::test]
async fn test_1200_rows_replace_windows_and_modes() {
    let (_dir, path) = write_delays_csv(1200);
    let mut sink = RecordingSink::default();

    let report = pipeline::load_file(
        &path,
        &mut sink,
        &target(),
        LoadMode::Replace,
        &BatchedLoader::new(),
    )
    .await
    .unwrap();

    let windows: Vec<_> = sink
        .chunks
        .iter()
        .map(|c| (c.index, c.start, c.end, c.mode))
        .collect();
    assert_eq!(
        windows,
        vec![
            (0, 0, 500, LoadMode::Replace),
            (1, 500, 1000, LoadMode::Append),
            (2, 1000, 1200, LoadMode::Append),
        ]
    );
    assert_eq!(report.rows_written, 1200);
    assert_eq!(report.chunks_written, 3);
    assert_eq!(report.columns, 7);
    assert_eq!(report.table, "dbo.airline_delay_causes");
}

#[tokio::test]
async fn test_append_mode_every_chunk_appends() {
    let (_dir, path) = write_delays_csv(30);
    let mut sink = RecordingSink::default();
    let loader = BatchedLoader::with_chunk_size(10).unwrap();

    pipeline::load_file(&path, &mut sink, &target(), LoadMode::Append, &loader)
        .await
        .unwrap();

    assert_eq!(sink.chunks.len(), 3);
    assert!(sink.chunks.iter().all(|c| c.mode == LoadMode::Append));
}

#[tokio::test]
async fn test_header_only_file_writes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("empty.csv");
    std::fs::write(&path, "Year,Month\n").unwrap();
    let mut sink = RecordingSink::default();

    let report = pipeline::load_file(
        &path,
        &mut sink,
        &target(),
        LoadMode::Replace,
        &BatchedLoader::new(),
    )
    .await
    .unwrap();

    assert!(sink.chunks.is_empty());
    assert_eq!(report.rows_written, 0);
    assert_eq!(report.chunks_written, 0);
}

// ============================================================================
// Failure
// ============================================================================

#[tokio::test]
async fn test_failure_on_third_chunk_keeps_first_two() {
    let (_dir, path) = write_delays_csv(1200);
    let mut sink = RecordingSink::failing_on(2);

    let err = pipeline::load_file(
        &path,
        &mut sink,
        &target(),
        LoadMode::Replace,
        &BatchedLoader::new(),
    )
    .await
    .unwrap_err();

    assert_eq!(sink.chunks.len(), 2);

    let chunk = err.as_chunk_write().expect("chunk write error");
    assert_eq!(chunk.chunk_index, 2);
    assert_eq!((chunk.start, chunk.end), (1000, 1200));
    assert_eq!(chunk.last_committed_chunk, Some(1));
    assert_eq!(chunk.rows_committed, 1000);

    let message = err.to_string();
    assert!(message.contains("chunk 2"));
    assert!(message.contains("1000-1200"));
    assert!(message.contains("connection reset by peer"));
}

#[tokio::test]
async fn test_failure_on_first_chunk_commits_nothing() {
    let (_dir, path) = write_delays_csv(10);
    let mut sink = RecordingSink::failing_on(0);

    let err = pipeline::load_file(
        &path,
        &mut sink,
        &target(),
        LoadMode::Append,
        &BatchedLoader::new(),
    )
    .await
    .unwrap_err();

    let chunk = err.as_chunk_write().unwrap();
    assert_eq!(chunk.last_committed_chunk, None);
    assert_eq!(chunk.rows_committed, 0);
}

// ============================================================================
// Normalize + cast
// ============================================================================

#[test]
fn test_prepare_dataset_normalizes_and_casts() {
    let (_dir, path) = write_delays_csv(5);
    let dataset = pipeline::prepare_dataset(&path).unwrap();

    assert_eq!(
        dataset.column_names(),
        vec![
            "unnamed_0",
            "year",
            "month",
            "arr_delay",
            "origin",
            "flight_id",
            "weatherdelay"
        ]
    );

    let year = dataset.column("year").unwrap();
    assert_eq!(year.column_type(), ColumnType::Integer);
    assert_eq!(year.data.get(2), Value::Integer(2008));
    assert_eq!(year.data.get(3), Value::Null);

    let arr_delay = dataset.column("arr_delay").unwrap();
    assert_eq!(arr_delay.column_type(), ColumnType::Float);
    assert_eq!(arr_delay.data.get(1), Value::Float(1.5));

    // no cast rule matches, inference alone decides
    let flight_id = dataset.column("flight_id").unwrap();
    assert_eq!(flight_id.column_type(), ColumnType::Integer);
    assert_eq!(flight_id.data.get(0), Value::Integer(1000));

    let weather = dataset.column("weatherdelay").unwrap();
    assert_eq!(weather.data.get(0), Value::Null);
    assert_eq!(weather.data.get(1), Value::Integer(7));
}

#[tokio::test]
async fn test_sink_sees_normalized_columns() {
    let (_dir, path) = write_delays_csv(3);
    let mut sink = RecordingSink::default();

    pipeline::load_file(
        &path,
        &mut sink,
        &target(),
        LoadMode::Replace,
        &BatchedLoader::new(),
    )
    .await
    .unwrap();

    let chunk = &sink.chunks[0];
    assert_eq!(chunk.columns[3], "arr_delay");
    assert_eq!(
        chunk.first_row,
        vec!["0", "2008", "1", "0.5", "ATL", "1000", "NULL"]
    );
}

#[test]
fn test_colliding_headers_get_suffixes() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("collide.csv");
    std::fs::write(&path, "Arr Delay,arr_delay,ARR-DELAY\n1,2,3\n").unwrap();

    let dataset = pipeline::prepare_dataset(&path).unwrap();
    assert_eq!(
        dataset.column_names(),
        vec!["arr_delay", "arr_delay_1", "arr_delay_2"]
    );
}
