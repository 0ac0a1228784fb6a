//! CLI binary entry point for data-loading-cli

#[cfg(feature = "cli")]
use clap::{Parser, Subcommand};
#[cfg(feature = "cli")]
use data_loading_sdk::cli::commands::{
    GlobalArgs,
    load::{LoadArgs, handle_load},
    show::{ShowArgs, handle_history, handle_show},
    transform::{handle_run, handle_transform},
    unload::{UnloadArgs, handle_truncate, handle_unload},
    validate::handle_validate,
};
#[cfg(feature = "cli")]
use data_loading_sdk::config::LoaderConfig;
#[cfg(feature = "cli")]
use std::path::PathBuf;

#[cfg(feature = "cli")]
#[derive(Parser)]
#[command(name = "data-loading-cli")]
#[command(about = "Load staged files into tables, run transforms and query the results")]
#[command(version)]
struct Cli {
    /// Workspace directory (holds .data-load.toml and the state directory)
    #[arg(short, long, global = true, default_value = ".")]
    workspace: PathBuf,
    /// Catalog file, relative to the workspace
    #[arg(short, long, global = true, default_value = "catalog.yaml")]
    catalog: PathBuf,
    /// Principal reported to the authorizer
    #[arg(long, global = true)]
    principal: Option<String>,
    #[command(subcommand)]
    command: Commands,
}

#[cfg(feature = "cli")]
#[derive(Subcommand)]
enum Commands {
    /// Check a catalog file and list its definitions
    Validate,
    /// Load a stage into a table
    Load {
        /// Stage name
        stage: String,
        /// Target table
        table: String,
        /// File format (defaults to the stage's format)
        #[arg(short, long)]
        format: Option<String>,
        /// ABORT_STATEMENT, CONTINUE, SKIP_FILE or SKIP_FILE_<n>
        #[arg(long)]
        on_error: Option<String>,
        /// Load only these files of the stage
        #[arg(long = "file")]
        files: Vec<String>,
        /// Reload files already in the load history
        #[arg(long)]
        force: bool,
        /// Decode and coerce without committing
        #[arg(long)]
        validate_only: bool,
        /// Map JSON keys onto same-named columns
        #[arg(long)]
        match_by_column_name: bool,
        #[arg(long)]
        json: bool,
    },
    /// Run a transform (all transforms in dependency order when omitted)
    Transform {
        name: Option<String>,
        #[arg(long)]
        json: bool,
    },
    /// Run a job (all jobs in order when omitted)
    Run {
        job: Option<String>,
        #[arg(long)]
        json: bool,
    },
    /// Print a table or view
    Show {
        name: String,
        #[arg(short, long)]
        limit: Option<usize>,
        #[arg(long)]
        json: bool,
    },
    /// Write a table to a delimited file
    Unload {
        table: String,
        output: PathBuf,
        /// Catalog file format (comma-separated text when omitted)
        #[arg(short, long)]
        format: Option<String>,
        /// Write a header record
        #[arg(long)]
        header: bool,
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
    /// Remove every row of a table and forget its load history
    Truncate { table: String },
    /// Show the files loaded into a table
    History {
        table: String,
        #[arg(long)]
        json: bool,
    },
}

#[cfg(feature = "cli")]
fn init_logging(workspace: &std::path::Path) {
    use tracing_subscriber::EnvFilter;

    let default_level = LoaderConfig::load(workspace)
        .map(|c| c.logging.level)
        .unwrap_or_else(|_| "info".to_string());
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[cfg(feature = "cli")]
fn main() {
    let cli = Cli::parse();
    init_logging(&cli.workspace);

    let global = GlobalArgs {
        workspace: cli.workspace,
        catalog: cli.catalog,
        principal: cli.principal,
    };

    let result = match cli.command {
        Commands::Validate => handle_validate(&global).map(|_| 0),
        Commands::Load {
            stage,
            table,
            format,
            on_error,
            files,
            force,
            validate_only,
            match_by_column_name,
            json,
        } => {
            let args = LoadArgs {
                stage,
                table,
                format,
                on_error,
                files,
                force,
                validate_only,
                match_by_column_name,
                json,
            };
            handle_load(&global, &args)
        }
        Commands::Transform { name, json } => {
            handle_transform(&global, name.as_deref(), json).map(|_| 0)
        }
        Commands::Run { job, json } => handle_run(&global, job.as_deref(), json),
        Commands::Show { name, limit, json } => {
            let args = ShowArgs { name, limit, json };
            handle_show(&global, &args).map(|_| 0)
        }
        Commands::Unload {
            table,
            output,
            format,
            header,
            force,
        } => {
            let args = UnloadArgs {
                table,
                output,
                format,
                header,
                force,
            };
            handle_unload(&global, &args).map(|_| 0)
        }
        Commands::Truncate { table } => handle_truncate(&global, &table).map(|_| 0),
        Commands::History { table, json } => handle_history(&global, &table, json).map(|_| 0),
    };

    match result {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}

#[cfg(not(feature = "cli"))]
fn main() {
    eprintln!("CLI feature is not enabled. Build with --features cli");
    std::process::exit(1);
}
