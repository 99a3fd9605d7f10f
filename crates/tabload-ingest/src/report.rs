//! Read-only verification of a loaded table
//!
//! Runs a handful of queries against the destination and collects them in a
//! [`VerificationReport`]: row count, column list, a sample of rows and
//! summary statistics. Columns named in [`VerifyOptions`] that the table does
//! not have are skipped with a warning.

use crate::error::Result;
use crate::target::{quote_ident, TargetTable};
use comfy_table::{presets::UTF8_FULL, Table};
use serde::Serialize;
use sqlx::{PgPool, Row};
use tracing::{info, warn};

pub const DEFAULT_SAMPLE_SIZE: i64 = 10;
pub const DEFAULT_STATS_COLUMN: &str = "arrdelay";
pub const DEFAULT_DISTINCT_COLUMNS: &[&str] = &["origin", "dest"];

#[derive(Debug, Clone)]
pub struct VerifyOptions {
    pub sample_size: i64,
    pub stats_column: Option<String>,
    pub distinct_columns: Vec<String>,
}

impl Default for VerifyOptions {
    fn default() -> Self {
        Self {
            sample_size: DEFAULT_SAMPLE_SIZE,
            stats_column: Some(DEFAULT_STATS_COLUMN.to_string()),
            distinct_columns: DEFAULT_DISTINCT_COLUMNS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnInfo {
    pub name: String,
    pub data_type: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NumericStats {
    pub column: String,
    pub avg: Option<f64>,
    pub max: Option<f64>,
    pub min: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VerificationReport {
    pub table: String,
    pub row_count: i64,
    pub columns: Vec<ColumnInfo>,
    pub sample: Vec<Vec<Option<String>>>,
    pub stats: Option<NumericStats>,
    pub distinct_counts: Vec<(String, i64)>,
}

fn has_column(columns: &[ColumnInfo], name: &str) -> bool {
    columns.iter().any(|c| c.name == name)
}

/// `SELECT "a"::text, "b"::text FROM t LIMIT $1`
pub fn sample_sql(target: &TargetTable, columns: &[ColumnInfo]) -> String {
    let list = columns
        .iter()
        .map(|c| format!("{}::text", quote_ident(&c.name)))
        .collect::<Vec<_>>()
        .join(", ");
    format!("SELECT {} FROM {} LIMIT $1", list, target.qualified())
}

/// Aggregate query for the numeric column and the distinct-count columns.
pub fn stats_sql(target: &TargetTable, stats_column: Option<&str>, distinct: &[&str]) -> String {
    let mut parts = Vec::new();
    if let Some(col) = stats_column {
        let col = quote_ident(col);
        parts.push(format!("AVG({col})::float8"));
        parts.push(format!("MAX({col})::float8"));
        parts.push(format!("MIN({col})::float8"));
    }
    for col in distinct {
        parts.push(format!("COUNT(DISTINCT {})", quote_ident(col)));
    }
    format!("SELECT {} FROM {}", parts.join(", "), target.qualified())
}

/// Run every verification query against `target`.
pub async fn verify_table(
    pool: &PgPool,
    target: &TargetTable,
    options: &VerifyOptions,
) -> Result<VerificationReport> {
    let count_sql = format!("SELECT COUNT(*) FROM {}", target.qualified());
    info!("Executing query: {}", count_sql);
    let row_count: i64 = sqlx::query_scalar(&count_sql).fetch_one(pool).await?;
    info!("Total rows in {}: {}", target, row_count);

    let columns: Vec<ColumnInfo> = sqlx::query_as::<_, (String, String)>(
        r#"
        SELECT column_name::text, data_type::text
        FROM information_schema.columns
        WHERE table_schema = COALESCE($1, current_schema())
          AND table_name = $2
        ORDER BY ordinal_position
        "#,
    )
    .bind(target.schema())
    .bind(target.name())
    .fetch_all(pool)
    .await?
    .into_iter()
    .map(|(name, data_type)| ColumnInfo { name, data_type })
    .collect();

    let sample = if columns.is_empty() {
        Vec::new()
    } else {
        let sql = sample_sql(target, &columns);
        info!("Executing query: {}", sql);
        sqlx::query(&sql)
            .bind(options.sample_size)
            .fetch_all(pool)
            .await?
            .iter()
            .map(|row| {
                (0..columns.len())
                    .map(|i| row.try_get::<Option<String>, _>(i))
                    .collect::<std::result::Result<Vec<_>, _>>()
            })
            .collect::<std::result::Result<Vec<_>, _>>()?
    };

    let stats_column = options.stats_column.as_deref().filter(|col| {
        let present = has_column(&columns, col);
        if !present {
            warn!(column = %col, "Statistics column not in table; skipping");
        }
        present
    });
    let distinct: Vec<&str> = options
        .distinct_columns
        .iter()
        .map(String::as_str)
        .filter(|col| {
            let present = has_column(&columns, col);
            if !present {
                warn!(column = %col, "Distinct-count column not in table; skipping");
            }
            present
        })
        .collect();

    let (stats, distinct_counts) = if stats_column.is_none() && distinct.is_empty() {
        (None, Vec::new())
    } else {
        let sql = stats_sql(target, stats_column, &distinct);
        info!("Executing query: {}", sql);
        let row = sqlx::query(&sql).fetch_one(pool).await?;

        let offset = if stats_column.is_some() { 3 } else { 0 };
        let stats = match stats_column {
            Some(col) => Some(NumericStats {
                column: col.to_string(),
                avg: row.try_get(0)?,
                max: row.try_get(1)?,
                min: row.try_get(2)?,
            }),
            None => None,
        };
        let counts = distinct
            .iter()
            .enumerate()
            .map(|(i, col)| Ok((col.to_string(), row.try_get::<i64, _>(offset + i)?)))
            .collect::<Result<Vec<_>>>()?;
        (stats, counts)
    };

    Ok(VerificationReport {
        table: target.to_string(),
        row_count,
        columns,
        sample,
        stats,
        distinct_counts,
    })
}

fn cell(value: &Option<String>) -> String {
    value.clone().unwrap_or_else(|| "NULL".to_string())
}

fn number(value: Option<f64>) -> String {
    value.map_or_else(|| "NULL".to_string(), |v| format!("{v:.2}"))
}

/// Plain-text rendering for terminals
pub fn render_text(report: &VerificationReport) -> String {
    let mut out = String::new();
    out.push_str(&format!("Total rows in {}: {}\n\n", report.table, report.row_count));

    out.push_str("Column names in the table:\n");
    for column in &report.columns {
        out.push_str(&format!("  - {} ({})\n", column.name, column.data_type));
    }

    if !report.sample.is_empty() {
        let mut table = Table::new();
        table
            .load_preset(UTF8_FULL)
            .set_header(report.columns.iter().map(|c| c.name.as_str()));
        for row in &report.sample {
            table.add_row(row.iter().map(cell));
        }
        out.push_str(&format!("\nSample of data:\n{table}\n"));
    }

    if report.stats.is_some() || !report.distinct_counts.is_empty() {
        let mut table = Table::new();
        table.load_preset(UTF8_FULL).set_header(vec!["statistic", "value"]);
        if let Some(stats) = &report.stats {
            table.add_row(vec![format!("avg({})", stats.column), number(stats.avg)]);
            table.add_row(vec![format!("max({})", stats.column), number(stats.max)]);
            table.add_row(vec![format!("min({})", stats.column), number(stats.min)]);
        }
        for (column, count) in &report.distinct_counts {
            table.add_row(vec![format!("distinct({column})"), count.to_string()]);
        }
        out.push_str(&format!("\nBasic statistics:\n{table}\n"));
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn columns(names: &[&str]) -> Vec<ColumnInfo> {
        names
            .iter()
            .map(|n| ColumnInfo {
                name: n.to_string(),
                data_type: "text".to_string(),
            })
            .collect()
    }

    #[test]
    fn test_sample_sql() {
        let target = TargetTable::resolve("dbo.delays", None).unwrap();
        assert_eq!(
            sample_sql(&target, &columns(&["year", "origin"])),
            "SELECT \"year\"::text, \"origin\"::text FROM \"dbo\".\"delays\" LIMIT $1"
        );
    }

    #[test]
    fn test_stats_sql() {
        let target = TargetTable::resolve("delays", None).unwrap();
        assert_eq!(
            stats_sql(&target, Some("arrdelay"), &["origin", "dest"]),
            "SELECT AVG(\"arrdelay\")::float8, MAX(\"arrdelay\")::float8, MIN(\"arrdelay\")::float8, \
             COUNT(DISTINCT \"origin\"), COUNT(DISTINCT \"dest\") FROM \"delays\""
        );
        assert_eq!(
            stats_sql(&target, None, &["dest"]),
            "SELECT COUNT(DISTINCT \"dest\") FROM \"delays\""
        );
    }

    #[test]
    fn test_render_text() {
        let report = VerificationReport {
            table: "dbo.delays".to_string(),
            row_count: 1200,
            columns: columns(&["origin", "arrdelay"]),
            sample: vec![vec![Some("ATL".to_string()), None]],
            stats: Some(NumericStats {
                column: "arrdelay".to_string(),
                avg: Some(12.5),
                max: Some(300.0),
                min: None,
            }),
            distinct_counts: vec![("origin".to_string(), 42)],
        };

        let text = render_text(&report);
        assert!(text.contains("Total rows in dbo.delays: 1200"));
        assert!(text.contains("  - arrdelay (text)"));
        assert!(text.contains("ATL"));
        assert!(text.contains("12.50"));
        assert!(text.contains("distinct(origin)"));
        assert!(text.contains("NULL"));
    }

    #[test]
    fn test_default_options() {
        let options = VerifyOptions::default();
        assert_eq!(options.sample_size, 10);
        assert_eq!(options.stats_column.as_deref(), Some("arrdelay"));
        assert_eq!(options.distinct_columns, vec!["origin", "dest"]);
    }
}
