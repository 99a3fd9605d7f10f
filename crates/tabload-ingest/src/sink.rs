//! PostgreSQL table sink
//!
//! Each chunk is written in its own transaction: on the first chunk the
//! schema and table are created when missing (or the table dropped and
//! recreated for [`LoadMode::Replace`]), then the rows go in as a single
//! multi-row `INSERT`. Column names are used exactly as they appear in the
//! dataset.
//!
//! Appending to an existing table issues no DDL at all, so a role with only
//! `INSERT` on the table can load it. PostgreSQL checks the `CREATE`
//! privilege before it looks at `IF NOT EXISTS`.

use crate::dataset::{Column, ColumnData, DatasetSlice};
use crate::error::{IngestError, Result};
use crate::loader::{ChunkPlan, TableSink};
use crate::target::{quote_ident, LoadMode, TargetTable};
use async_trait::async_trait;
use sqlx::{PgConnection, PgPool, Postgres, QueryBuilder};
use tracing::debug;

/// Bind parameter limit of the PostgreSQL wire protocol
pub const MAX_BIND_PARAMS: usize = u16::MAX as usize;

pub struct PgTableSink {
    pool: PgPool,
}

impl PgTableSink {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

pub fn create_schema_sql(schema: &str) -> String {
    format!("CREATE SCHEMA IF NOT EXISTS {}", quote_ident(schema))
}

pub fn drop_table_sql(target: &TargetTable) -> String {
    format!("DROP TABLE IF EXISTS {}", target.qualified())
}

pub fn create_table_sql(target: &TargetTable, columns: &[Column], if_not_exists: bool) -> String {
    let definitions = columns
        .iter()
        .map(|c| format!("{} {}", quote_ident(&c.name), c.column_type().sql_type()))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "CREATE TABLE {}{} ({})",
        if if_not_exists { "IF NOT EXISTS " } else { "" },
        target.qualified(),
        definitions
    )
}

/// What already exists at the destination when the first chunk starts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DestinationState {
    pub schema_exists: bool,
    pub table_exists: bool,
}

async fn destination_state(conn: &mut PgConnection, target: &TargetTable) -> Result<DestinationState> {
    let table_exists: bool = sqlx::query_scalar("SELECT to_regclass($1) IS NOT NULL")
        .bind(target.qualified())
        .fetch_one(&mut *conn)
        .await?;

    let schema_exists: bool = match target.schema() {
        Some(schema) => {
            sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM pg_namespace WHERE nspname = $1)")
                .bind(schema)
                .fetch_one(&mut *conn)
                .await?
        },
        None => true,
    };

    Ok(DestinationState {
        schema_exists,
        table_exists,
    })
}

/// Statements run before the rows of `plan`, in order.
pub fn preamble_sql(
    target: &TargetTable,
    plan: &ChunkPlan,
    columns: &[Column],
    state: DestinationState,
) -> Vec<String> {
    if !plan.is_first() || (plan.mode == LoadMode::Append && state.table_exists) {
        return Vec::new();
    }

    let mut statements = Vec::new();
    if let Some(schema) = target.schema().filter(|_| !state.schema_exists) {
        statements.push(create_schema_sql(schema));
    }
    match plan.mode {
        LoadMode::Replace => {
            statements.push(drop_table_sql(target));
            statements.push(create_table_sql(target, columns, false));
        },
        LoadMode::Append => statements.push(create_table_sql(target, columns, true)),
    }
    statements
}

fn insert_query<'a>(target: &TargetTable, rows: &DatasetSlice<'a>) -> QueryBuilder<'a, Postgres> {
    let columns = rows.columns();
    let column_list = columns
        .iter()
        .map(|c| quote_ident(&c.name))
        .collect::<Vec<_>>()
        .join(", ");

    let mut builder: QueryBuilder<'a, Postgres> =
        QueryBuilder::new(format!("INSERT INTO {} ({}) ", target.qualified(), column_list));

    builder.push_values(rows.rows(), |mut b, row| {
        for column in columns {
            match &column.data {
                ColumnData::Integer(values) => {
                    b.push_bind(values.get(row).copied().flatten());
                },
                ColumnData::Float(values) => {
                    b.push_bind(values.get(row).copied().flatten());
                },
                ColumnData::Text(values) => {
                    b.push_bind(values.get(row).and_then(|v| v.as_deref()));
                },
            }
        }
    });

    builder
}

#[async_trait]
impl TableSink for PgTableSink {
    async fn write_chunk(
        &mut self,
        target: &TargetTable,
        plan: &ChunkPlan,
        rows: DatasetSlice<'_>,
    ) -> Result<()> {
        let params = rows.len() * rows.columns().len();
        if params > MAX_BIND_PARAMS {
            return Err(IngestError::config(format!(
                "chunk of {} rows x {} columns needs {} bind parameters (limit {}); lower CHUNK_SIZE",
                rows.len(),
                rows.columns().len(),
                params,
                MAX_BIND_PARAMS
            )));
        }

        let mut tx = self.pool.begin().await?;

        if plan.is_first() {
            let state = destination_state(&mut tx, target).await?;
            debug!(table = %target, ?state, "Destination state");
            for statement in preamble_sql(target, plan, rows.columns(), state) {
                debug!(sql = %statement, "Executing DDL");
                sqlx::query(&statement).execute(&mut *tx).await?;
            }
        }

        if !rows.is_empty() {
            let mut query = insert_query(target, &rows);
            let result = query.build().execute(&mut *tx).await?;
            debug!(chunk = plan.index, rows = result.rows_affected(), "Inserted chunk");
        }

        tx.commit().await?;
        Ok(())
    }
}
