//! Validate command implementation

use crate::cli::commands::{GlobalArgs, load_catalog};
use crate::cli::error::CliError;

/// Handle the validate command
///
/// Loading a catalog already checks names, references and transform cycles,
/// so this reports what was found.
pub fn handle_validate(args: &GlobalArgs) -> Result<(), CliError> {
    let path = args.catalog_path();
    let catalog = load_catalog(&path)?;
    catalog.transform_order()?;

    println!("Catalog {} is valid", path.display());
    for (kind, names) in catalog.summary() {
        if names.is_empty() {
            continue;
        }
        println!("  {} ({}): {}", kind, names.len(), names.join(", "));
    }
    Ok(())
}
