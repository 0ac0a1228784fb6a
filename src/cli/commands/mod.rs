//! CLI command implementations
//!
//! Every command opens a [`Workspace`]: the workspace directory, its
//! `.data-load.toml`, the catalog file and the persisted pipeline state.

pub mod load;
pub mod show;
pub mod transform;
pub mod unload;
pub mod validate;

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::catalog::Catalog;
use crate::cli::error::CliError;
use crate::config::LoaderConfig;
use crate::pipeline::Pipeline;
use crate::stage::LocalSourceStore;

/// Options shared by all commands
#[derive(Debug, Clone)]
pub struct GlobalArgs {
    /// Workspace directory (config, relative stage paths, state)
    pub workspace: PathBuf,
    /// Catalog file, relative to the workspace unless absolute
    pub catalog: PathBuf,
    /// Principal reported to the authorizer
    pub principal: Option<String>,
}

impl GlobalArgs {
    pub fn catalog_path(&self) -> PathBuf {
        if self.catalog.is_absolute() {
            self.catalog.clone()
        } else {
            self.workspace.join(&self.catalog)
        }
    }
}

/// An opened workspace
pub struct Workspace {
    pub config: LoaderConfig,
    pub pipeline: Pipeline<LocalSourceStore>,
    state_dir: PathBuf,
}

impl Workspace {
    /// Read config, catalog and state
    pub fn open(args: &GlobalArgs) -> Result<Self, CliError> {
        let config = LoaderConfig::load(&args.workspace)?;
        let catalog = load_catalog(&args.catalog_path())?;
        let state_dir = config.state_dir(&args.workspace);
        debug!(state = %state_dir.display(), "Opening workspace");

        let mut pipeline = Pipeline::new(
            catalog,
            LocalSourceStore::with_base_dir(&args.workspace),
        )
        .with_state(&state_dir)?;
        if let Some(principal) = &args.principal {
            pipeline = pipeline.with_principal(principal);
        }
        Ok(Self {
            config,
            pipeline,
            state_dir,
        })
    }

    /// Persist tables, history and views
    pub fn save(&self) -> Result<(), CliError> {
        self.pipeline.save_state(&self.state_dir)?;
        Ok(())
    }
}

pub(crate) fn load_catalog(path: &Path) -> Result<Catalog, CliError> {
    if !path.exists() {
        return Err(CliError::FileNotFound(path.to_path_buf()));
    }
    Ok(Catalog::load(path)?)
}

/// Print a value as pretty JSON on stdout
pub(crate) fn print_json<T: serde::Serialize>(value: &T) -> Result<(), CliError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
