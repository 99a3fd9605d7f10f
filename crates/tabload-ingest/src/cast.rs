//! Heuristic numeric coercion for well-known airline delay columns

use crate::dataset::{Column, Dataset};
use crate::error::Result;
use tracing::debug;

/// Target type chosen for a column by name
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CastRule {
    Integer,
    Float,
    Keep,
}

/// Pick the cast rule for a (normalized) column name. Matching ignores case.
pub fn rule_for(name: &str) -> CastRule {
    let low = name.to_lowercase();
    if low == "year" || low == "month" {
        CastRule::Integer
    } else if low.ends_with("_ct") || low.ends_with("_delay") || low.starts_with("arr_") {
        CastRule::Float
    } else {
        CastRule::Keep
    }
}

/// Return a new dataset with matching columns coerced to numbers.
///
/// Never fails on cell contents: values that do not parse become null.
pub fn smart_cast(dataset: &Dataset) -> Result<Dataset> {
    let columns = dataset
        .columns()
        .iter()
        .map(|col| {
            let data = match rule_for(&col.name) {
                CastRule::Integer => col.data.coerce_integer(),
                CastRule::Float => col.data.coerce_float(),
                CastRule::Keep => return col.clone(),
            };
            let introduced = data.null_count().saturating_sub(col.data.null_count());
            debug!(
                column = %col.name,
                from = %col.column_type(),
                to = %data.column_type(),
                nulls_introduced = introduced,
                "Coerced column"
            );
            Column::new(col.name.clone(), data)
        })
        .collect();

    Dataset::new(columns)
}
