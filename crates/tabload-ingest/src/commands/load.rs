//! `tabload load` command implementation
//!
//! Downloads the dataset and loads its first CSV into the destination table.

use crate::config::LoadConfig;
use crate::error::Result;
use crate::pipeline;
use crate::LoadArgs;
use tracing::debug;

pub async fn run(args: &LoadArgs) -> Result<()> {
    let config = LoadConfig::try_from(args)?;
    debug!(
        dataset = %config.dataset,
        target = %config.target,
        mode = %config.mode,
        chunk_size = config.chunk_size,
        "Load configuration"
    );

    pipeline::run(&config).await?;
    Ok(())
}
