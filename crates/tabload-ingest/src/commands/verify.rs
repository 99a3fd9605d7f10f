//! `tabload verify` command implementation
//!
//! Prints a read-only report of the destination table to stdout.

use crate::config::VerifyConfig;
use crate::error::Result;
use crate::report::{render_text, verify_table};
use crate::VerifyArgs;

pub async fn run(args: &VerifyArgs) -> Result<()> {
    let config = VerifyConfig::try_from(args)?;
    let pool = config.connection.resolve()?.connect_lazy()?;

    let report = verify_table(&pool, &config.target, &config.options).await?;
    pool.close().await;

    if config.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!("{}", render_text(&report));
    }

    Ok(())
}
