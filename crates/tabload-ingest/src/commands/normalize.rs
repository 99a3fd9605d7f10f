//! `tabload normalize` command implementation
//!
//! Dry run over a local CSV: shows how each column would be renamed and typed
//! without connecting to the database.

use crate::cast::smart_cast;
use crate::dataset::Dataset;
use crate::error::Result;
use crate::normalize::normalize_dataset;
use comfy_table::{presets::UTF8_FULL, Table};
use std::path::Path;

/// One row of the dry-run table: original name, loaded name, type, nulls
pub fn describe(raw: &Dataset, loaded: &Dataset) -> Vec<[String; 4]> {
    raw.columns()
        .iter()
        .zip(loaded.columns())
        .map(|(before, after)| {
            [
                before.name.clone(),
                after.name.clone(),
                after.column_type().sql_type().to_string(),
                after.data.null_count().to_string(),
            ]
        })
        .collect()
}

pub async fn run(path: &Path) -> Result<()> {
    let raw = Dataset::read_csv(path)?;
    let loaded = smart_cast(&normalize_dataset(raw.clone())?)?;

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_header(vec!["Column", "Normalized", "Type", "Nulls"]);
    for row in describe(&raw, &loaded) {
        table.add_row(row.to_vec());
    }

    println!("{} ({} rows)", path.display(), loaded.row_count());
    println!("{table}");
    Ok(())
}
