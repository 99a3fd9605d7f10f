//! Destination table identity and write mode

use crate::error::{IngestError, Result};
use serde::{Deserialize, Serialize};

/// Default destination table
pub const DEFAULT_TABLE_NAME: &str = "dbo.airline_delay_causes";

/// `(schema, name)` of the destination table.
///
/// Resolved once per run and immutable afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetTable {
    schema: Option<String>,
    name: String,
}

impl TargetTable {
    /// Resolve from a `schema.name` or bare `name` string.
    ///
    /// The string is split on its first `.`. A non-blank `schema_override`
    /// replaces whatever schema the string carried.
    pub fn resolve(table: &str, schema_override: Option<&str>) -> Result<Self> {
        let table = table.trim();
        let (schema, name) = match table.split_once('.') {
            Some((schema, name)) => (Some(schema.trim()), name.trim()),
            None => (None, table),
        };

        if name.is_empty() {
            return Err(IngestError::config(format!(
                "table name '{table}' has an empty table part"
            )));
        }

        let schema = schema_override
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .or(schema.filter(|s| !s.is_empty()))
            .map(str::to_string);

        Ok(Self {
            schema,
            name: name.to_string(),
        })
    }

    pub fn schema(&self) -> Option<&str> {
        self.schema.as_deref()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Fully quoted identifier for use in SQL text
    pub fn qualified(&self) -> String {
        match &self.schema {
            Some(schema) => format!("{}.{}", quote_ident(schema), quote_ident(&self.name)),
            None => quote_ident(&self.name),
        }
    }
}

impl std::fmt::Display for TargetTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.schema {
            Some(schema) => write!(f, "{}.{}", schema, self.name),
            None => write!(f, "{}", self.name),
        }
    }
}

/// Quote a SQL identifier, doubling embedded quotes.
pub fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

/// How the first chunk treats an existing destination table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LoadMode {
    /// Drop and recreate the table, then write
    Replace,
    /// Create the table if missing, then write
    #[default]
    Append,
}

impl LoadMode {
    pub fn as_str(self) -> &'static str {
        match self {
            LoadMode::Replace => "replace",
            LoadMode::Append => "append",
        }
    }

    /// Mode for chunk `chunk_index` when the run started with `self`.
    pub fn for_chunk(self, chunk_index: usize) -> LoadMode {
        if chunk_index == 0 {
            self
        } else {
            LoadMode::Append
        }
    }
}

impl std::str::FromStr for LoadMode {
    type Err = IngestError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "replace" => Ok(LoadMode::Replace),
            "append" => Ok(LoadMode::Append),
            other => Err(IngestError::config(format!(
                "invalid load mode '{other}', expected 'replace' or 'append'"
            ))),
        }
    }
}

impl std::fmt::Display for LoadMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
