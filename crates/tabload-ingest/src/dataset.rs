//! Column-oriented tabular dataset
//!
//! A [`Dataset`] is an ordered list of named [`Column`]s of equal length.
//! Each column carries an explicit type tag through [`ColumnData`]; every
//! cell is nullable.
//!
//! CSV input is read with type inference per column: a column whose
//! non-null cells all parse as integers becomes [`ColumnType::Integer`],
//! otherwise all floats gives [`ColumnType::Float`], otherwise
//! [`ColumnType::Text`]. A column with no values at all is `Float`.

use crate::error::{IngestError, Result};
use std::collections::HashSet;
use std::ops::Range;
use std::path::Path;
use tracing::debug;

/// Cell contents treated as missing when reading CSV
pub const NULL_MARKERS: &[&str] = &["", "NA", "N/A", "#N/A", "NaN", "nan", "NULL", "null"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Integer,
    Float,
    Text,
}

impl ColumnType {
    /// PostgreSQL column type used when creating the destination table
    pub fn sql_type(self) -> &'static str {
        match self {
            ColumnType::Integer => "BIGINT",
            ColumnType::Float => "DOUBLE PRECISION",
            ColumnType::Text => "TEXT",
        }
    }
}

impl std::fmt::Display for ColumnType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ColumnType::Integer => write!(f, "integer"),
            ColumnType::Float => write!(f, "float"),
            ColumnType::Text => write!(f, "text"),
        }
    }
}

/// A single cell borrowed from a column
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value<'a> {
    Null,
    Integer(i64),
    Float(f64),
    Text(&'a str),
}

#[derive(Debug, Clone, PartialEq)]
pub enum ColumnData {
    Integer(Vec<Option<i64>>),
    Float(Vec<Option<f64>>),
    Text(Vec<Option<String>>),
}

impl ColumnData {
    pub fn column_type(&self) -> ColumnType {
        match self {
            ColumnData::Integer(_) => ColumnType::Integer,
            ColumnData::Float(_) => ColumnType::Float,
            ColumnData::Text(_) => ColumnType::Text,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            ColumnData::Integer(v) => v.len(),
            ColumnData::Float(v) => v.len(),
            ColumnData::Text(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Cell at `row`; out of range reads as null
    pub fn get(&self, row: usize) -> Value<'_> {
        match self {
            ColumnData::Integer(v) => v.get(row).copied().flatten().map_or(Value::Null, Value::Integer),
            ColumnData::Float(v) => v.get(row).copied().flatten().map_or(Value::Null, Value::Float),
            ColumnData::Text(v) => v
                .get(row)
                .and_then(|cell| cell.as_deref())
                .map_or(Value::Null, Value::Text),
        }
    }

    pub fn null_count(&self) -> usize {
        match self {
            ColumnData::Integer(v) => v.iter().filter(|c| c.is_none()).count(),
            ColumnData::Float(v) => v.iter().filter(|c| c.is_none()).count(),
            ColumnData::Text(v) => v.iter().filter(|c| c.is_none()).count(),
        }
    }

    /// Infer the narrowest column type that holds every non-null cell.
    pub fn infer(cells: Vec<Option<String>>) -> Self {
        let present = || cells.iter().flatten().map(|s| s.trim());

        if present().next().is_some() && present().all(|s| s.parse::<i64>().is_ok()) {
            return ColumnData::Integer(
                cells
                    .iter()
                    .map(|c| c.as_deref().and_then(|s| s.trim().parse().ok()))
                    .collect(),
            );
        }

        if present().all(|s| parse_float(s).is_some()) {
            return ColumnData::Float(
                cells
                    .iter()
                    .map(|c| c.as_deref().and_then(|s| parse_float(s.trim())))
                    .collect(),
            );
        }

        ColumnData::Text(cells)
    }

    /// Convert to integers; anything without an exact integer value becomes null.
    pub fn coerce_integer(&self) -> ColumnData {
        match self {
            ColumnData::Integer(v) => ColumnData::Integer(v.clone()),
            ColumnData::Float(v) => {
                ColumnData::Integer(v.iter().map(|c| c.and_then(float_to_integer)).collect())
            },
            ColumnData::Text(v) => ColumnData::Integer(
                v.iter()
                    .map(|c| c.as_deref().and_then(parse_integer_lenient))
                    .collect(),
            ),
        }
    }

    /// Convert to floats; unparseable text becomes null.
    pub fn coerce_float(&self) -> ColumnData {
        match self {
            ColumnData::Integer(v) => {
                ColumnData::Float(v.iter().map(|c| c.map(|i| i as f64)).collect())
            },
            ColumnData::Float(v) => ColumnData::Float(v.clone()),
            ColumnData::Text(v) => ColumnData::Float(
                v.iter()
                    .map(|c| c.as_deref().and_then(|s| parse_float(s.trim())))
                    .collect(),
            ),
        }
    }
}

/// Parse a finite or infinite float; NaN counts as missing.
fn parse_float(s: &str) -> Option<f64> {
    s.parse::<f64>().ok().filter(|f| !f.is_nan())
}

fn float_to_integer(f: f64) -> Option<i64> {
    if f.is_finite() && f.fract() == 0.0 && f >= i64::MIN as f64 && f < i64::MAX as f64 {
        Some(f as i64)
    } else {
        None
    }
}

fn parse_integer_lenient(s: &str) -> Option<i64> {
    let s = s.trim();
    s.parse::<i64>()
        .ok()
        .or_else(|| parse_float(s).and_then(float_to_integer))
}

#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub data: ColumnData,
}

impl Column {
    pub fn new(name: impl Into<String>, data: ColumnData) -> Self {
        Self {
            name: name.into(),
            data,
        }
    }

    pub fn column_type(&self) -> ColumnType {
        self.data.column_type()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    columns: Vec<Column>,
    row_count: usize,
}

impl Dataset {
    /// Build a dataset, checking that every column has the same length and
    /// that column names are unique.
    pub fn new(columns: Vec<Column>) -> Result<Self> {
        let row_count = columns.first().map_or(0, |c| c.data.len());

        if let Some(bad) = columns.iter().find(|c| c.data.len() != row_count) {
            return Err(IngestError::invalid_dataset(format!(
                "column '{}' has {} rows, expected {}",
                bad.name,
                bad.data.len(),
                row_count
            )));
        }

        let mut seen = HashSet::new();
        if let Some(dup) = columns.iter().find(|c| !seen.insert(c.name.as_str())) {
            return Err(IngestError::invalid_dataset(format!(
                "duplicate column name '{}'",
                dup.name
            )));
        }

        Ok(Self { columns, row_count })
    }

    /// Build a dataset from a header and string rows, inferring column types.
    ///
    /// Cells listed in [`NULL_MARKERS`] become null. Blank header cells are
    /// named `Unnamed: {position}`.
    pub fn from_rows<H, R>(headers: H, rows: R) -> Result<Self>
    where
        H: IntoIterator,
        H::Item: AsRef<str>,
        R: IntoIterator,
        R::Item: IntoIterator,
        <R::Item as IntoIterator>::Item: AsRef<str>,
    {
        let mut acc = RowAccumulator::new(headers);
        for row in rows {
            acc.push_row(row)?;
        }
        acc.finish()
    }

    /// Read a comma separated file with a header row.
    ///
    /// Records are read one at a time into a reused buffer and their cells
    /// appended straight to the column vectors.
    pub fn read_csv(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let csv_err = |source| IngestError::Csv {
            path: path.to_path_buf(),
            source,
        };

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .from_path(path)
            .map_err(csv_err)?;

        let mut acc = RowAccumulator::new(reader.headers().map_err(csv_err)?.iter());
        let mut record = csv::StringRecord::new();
        while reader.read_record(&mut record).map_err(csv_err)? {
            acc.push_row(record.iter())?;
        }

        let dataset = acc.finish()?;
        debug!(
            path = %path.display(),
            rows = dataset.row_count(),
            columns = dataset.column_count(),
            "Parsed CSV"
        );
        Ok(dataset)
    }

    pub fn row_count(&self) -> usize {
        self.row_count
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    /// Replace every column name, keeping data and order.
    pub fn with_column_names(self, names: Vec<String>) -> Result<Self> {
        if names.len() != self.columns.len() {
            return Err(IngestError::invalid_dataset(format!(
                "expected {} column names, got {}",
                self.columns.len(),
                names.len()
            )));
        }
        let columns = self
            .columns
            .into_iter()
            .zip(names)
            .map(|(col, name)| Column::new(name, col.data))
            .collect();
        Self::new(columns)
    }

    /// Borrow a contiguous window of rows.
    ///
    /// The range is clamped to the dataset.
    pub fn slice(&self, rows: Range<usize>) -> DatasetSlice<'_> {
        let end = rows.end.min(self.row_count);
        let start = rows.start.min(end);
        DatasetSlice {
            dataset: self,
            rows: start..end,
        }
    }
}

/// Untyped cells collected column by column until every row is in
struct RowAccumulator {
    headers: Vec<String>,
    cells: Vec<Vec<Option<String>>>,
    rows: usize,
}

impl RowAccumulator {
    fn new<H>(headers: H) -> Self
    where
        H: IntoIterator,
        H::Item: AsRef<str>,
    {
        let headers: Vec<String> = headers
            .into_iter()
            .enumerate()
            .map(|(i, h)| {
                let h = h.as_ref();
                if h.trim().is_empty() {
                    format!("Unnamed: {i}")
                } else {
                    h.to_string()
                }
            })
            .collect();
        let cells = vec![Vec::new(); headers.len()];
        Self {
            headers,
            cells,
            rows: 0,
        }
    }

    fn push_row<R>(&mut self, row: R) -> Result<()>
    where
        R: IntoIterator,
        R::Item: AsRef<str>,
    {
        let row_idx = self.rows;
        let mut width = 0;
        for (col_idx, cell) in row.into_iter().enumerate() {
            let column = self.cells.get_mut(col_idx).ok_or_else(|| {
                IngestError::invalid_dataset(format!(
                    "row {row_idx} has more fields than the {} header columns",
                    self.headers.len()
                ))
            })?;
            let cell = cell.as_ref();
            column.push((!NULL_MARKERS.contains(&cell)).then(|| cell.to_string()));
            width += 1;
        }
        if width != self.headers.len() {
            return Err(IngestError::invalid_dataset(format!(
                "row {row_idx} has {width} fields, expected {}",
                self.headers.len()
            )));
        }
        self.rows += 1;
        Ok(())
    }

    fn finish(self) -> Result<Dataset> {
        let columns = self
            .headers
            .into_iter()
            .zip(self.cells)
            .map(|(name, values)| Column::new(name, ColumnData::infer(values)))
            .collect();
        Dataset::new(columns)
    }
}

/// Borrowed row window over a [`Dataset`]
#[derive(Debug, Clone)]
pub struct DatasetSlice<'a> {
    dataset: &'a Dataset,
    rows: Range<usize>,
}

impl<'a> DatasetSlice<'a> {
    pub fn columns(&self) -> &'a [Column] {
        self.dataset.columns()
    }

    pub fn rows(&self) -> Range<usize> {
        self.rows.clone()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Cells of one row, in column order. `row` is relative to the window.
    pub fn row(&self, row: usize) -> impl Iterator<Item = Value<'a>> + '_ {
        let absolute = self.rows.start + row;
        self.dataset.columns().iter().map(move |c| c.data.get(absolute))
    }
}
