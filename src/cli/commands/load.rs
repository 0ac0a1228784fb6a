//! Load command implementation

use crate::cli::commands::{GlobalArgs, Workspace, print_json};
use crate::cli::error::CliError;
use crate::load::{LoadRequest, LoadResult};
use crate::models::ErrorPolicy;

/// Rejections printed in the text summary
const SHOWN_REJECTIONS: usize = 10;

/// Load command arguments
#[derive(Debug, Clone)]
pub struct LoadArgs {
    pub stage: String,
    pub table: String,
    pub format: Option<String>,
    /// Overrides the configured policy
    pub on_error: Option<String>,
    pub files: Vec<String>,
    pub force: bool,
    pub validate_only: bool,
    pub match_by_column_name: bool,
    pub json: bool,
}

/// Handle the load command; returns the process exit code
pub fn handle_load(global: &GlobalArgs, args: &LoadArgs) -> Result<i32, CliError> {
    let workspace = Workspace::open(global)?;

    let on_error = match &args.on_error {
        Some(raw) => raw.parse::<ErrorPolicy>().map_err(CliError::InvalidArgument)?,
        None => workspace.config.load.on_error,
    };
    let mut options = workspace.config.load_options();
    options.force |= args.force;
    options.validate_only = args.validate_only;
    options.match_by_column_name = args.match_by_column_name;
    if !args.files.is_empty() {
        options.files = Some(args.files.clone());
    }

    let mut request = LoadRequest::new(&args.stage, &args.table)
        .on_error(on_error)
        .with_options(options);
    if let Some(format) = &args.format {
        request = request.with_format(format);
    }

    let result = workspace.pipeline.load(&request)?;
    if result.committed {
        workspace.save()?;
    }

    if args.json {
        print_json(&result)?;
    } else {
        print_summary(&result);
    }
    Ok(result.status.exit_code())
}

fn print_summary(result: &LoadResult) {
    let verb = if result.committed { "Loaded" } else { "Validated" };
    println!(
        "{} {} of {} row(s) into {} ({} rejected, {} discarded) - {:?}",
        verb,
        result.rows_inserted,
        result.rows_attempted,
        result.table,
        result.rows_rejected,
        result.rows_discarded,
        result.status
    );
    for file in &result.files {
        print!(
            "  {:<18} {}  parsed={} loaded={} rejected={}",
            format!("{:?}", file.status),
            file.file,
            file.rows_parsed,
            file.rows_loaded,
            file.rows_rejected
        );
        match (&file.first_error, file.first_error_record) {
            (Some(error), Some(record)) => println!("  first error at record {}: {}", record, error),
            _ => println!(),
        }
    }
    for rejection in result.rejections.iter().take(SHOWN_REJECTIONS) {
        println!(
            "  rejected {}:{} [{}] {}",
            rejection.file,
            rejection.record_number,
            rejection.code(),
            rejection.raw
        );
    }
    let hidden = result.rejections.len().saturating_sub(SHOWN_REJECTIONS) as u64
        + result.rejections_unrecorded;
    if hidden > 0 {
        println!("  ... {} more rejection(s)", hidden);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    const CATALOG: &str = r#"
tables:
  - name: users
    columns:
      - { name: id, type: INTEGER, nullable: false }
      - { name: name, type: VARCHAR }
formats:
  - { name: csv, type: CSV }
stages:
  - { name: users_stage, url: "data", file_format: csv }
"#;

    fn workspace(data: &str) -> (TempDir, GlobalArgs) {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("catalog.yaml"), CATALOG).unwrap();
        fs::create_dir(dir.path().join("data")).unwrap();
        fs::write(dir.path().join("data/users.csv"), data).unwrap();
        let global = GlobalArgs {
            workspace: dir.path().to_path_buf(),
            catalog: "catalog.yaml".into(),
            principal: None,
        };
        (dir, global)
    }

    fn args(on_error: &str) -> LoadArgs {
        LoadArgs {
            stage: "users_stage".to_string(),
            table: "users".to_string(),
            format: None,
            on_error: Some(on_error.to_string()),
            files: Vec::new(),
            force: false,
            validate_only: false,
            match_by_column_name: false,
            json: true,
        }
    }

    #[test]
    fn partial_load_exits_with_two_and_saves_state() {
        let (_dir, global) = workspace("1,a\nx,b\n");
        assert_eq!(handle_load(&global, &args("CONTINUE")).unwrap(), 2);

        let reopened = Workspace::open(&global).unwrap();
        assert_eq!(reopened.pipeline.history("users").len(), 1);
        assert_eq!(reopened.pipeline.relation("users").unwrap().len(), 1);
    }

    #[test]
    fn clean_load_exits_with_zero() {
        let (_dir, global) = workspace("1,a\n2,b\n");
        assert_eq!(handle_load(&global, &args("abort")).unwrap(), 0);
    }

    #[test]
    fn unknown_error_policy_is_rejected() {
        let (_dir, global) = workspace("1,a\n");
        assert!(matches!(
            handle_load(&global, &args("retry")),
            Err(CliError::InvalidArgument(_))
        ));
    }
}
