//! Unload and truncate command implementations

use std::path::PathBuf;

use crate::cli::commands::{GlobalArgs, Workspace};
use crate::cli::error::CliError;

/// Unload command arguments
#[derive(Debug, Clone)]
pub struct UnloadArgs {
    pub table: String,
    pub output: PathBuf,
    /// Catalog format name; comma-separated with `"` enclosure when absent
    pub format: Option<String>,
    pub header: bool,
    /// Overwrite an existing output file
    pub force: bool,
}

/// Write a table to a delimited file
pub fn handle_unload(global: &GlobalArgs, args: &UnloadArgs) -> Result<(), CliError> {
    if args.output.exists() && !args.force {
        return Err(CliError::FileWriteError(
            args.output.clone(),
            "file exists (use --force to overwrite)".to_string(),
        ));
    }
    let workspace = Workspace::open(global)?;
    let rows = workspace.pipeline.unload(
        &args.table,
        &args.output,
        args.format.as_deref(),
        args.header,
    )?;
    println!(
        "Unloaded {} row(s) from {} to {}",
        rows,
        args.table,
        args.output.display()
    );
    Ok(())
}

/// Remove every row of a table and forget its load history
pub fn handle_truncate(global: &GlobalArgs, table: &str) -> Result<(), CliError> {
    let workspace = Workspace::open(global)?;
    let removed = workspace.pipeline.truncate(table)?;
    workspace.save()?;
    println!("Truncated {} ({} row(s) removed)", table, removed);
    Ok(())
}
