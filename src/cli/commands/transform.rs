//! Transform and run command implementations

use crate::cli::commands::{GlobalArgs, Workspace, print_json};
use crate::cli::error::CliError;
use crate::load::LoadStatus;
use crate::pipeline::StepOutcome;
use crate::transform::TransformResult;

fn print_transform(result: &TransformResult) {
    println!(
        "{} {} ({} row(s), columns: {})",
        match result.materialization {
            crate::models::Materialization::View => "Registered view",
            crate::models::Materialization::Table => "Built table",
        },
        result.name,
        result.rows,
        result.columns.join(", ")
    );
}

/// Run one transform, or every transform in dependency order
pub fn handle_transform(
    global: &GlobalArgs,
    name: Option<&str>,
    json: bool,
) -> Result<(), CliError> {
    let workspace = Workspace::open(global)?;
    let results = match name {
        Some(name) => vec![workspace.pipeline.run_transform(name)?],
        None => workspace.pipeline.run_transforms()?,
    };
    workspace.save()?;

    if json {
        return print_json(&results);
    }
    for result in &results {
        print_transform(result);
    }
    Ok(())
}

/// Run one job, or every job in declaration order; returns the exit code
///
/// The exit code is the worst load status seen across all steps.
pub fn handle_run(global: &GlobalArgs, job: Option<&str>, json: bool) -> Result<i32, CliError> {
    let workspace = Workspace::open(global)?;
    if workspace.pipeline.catalog().jobs.is_empty() && job.is_none() {
        return Err(CliError::InvalidArgument(
            "the catalog declares no jobs".to_string(),
        ));
    }
    let runs = match job {
        Some(name) => vec![(name.to_string(), workspace.pipeline.run_job(name)?)],
        None => workspace.pipeline.run_jobs()?,
    };
    workspace.save()?;

    let mut worst = LoadStatus::Success;
    for (_, outcomes) in &runs {
        for outcome in outcomes {
            if let StepOutcome::Load(result) = outcome {
                worst = match (worst, result.status) {
                    (LoadStatus::Failure, _) | (_, LoadStatus::Failure) => LoadStatus::Failure,
                    (LoadStatus::PartialSuccess, _) | (_, LoadStatus::PartialSuccess) => {
                        LoadStatus::PartialSuccess
                    }
                    _ => LoadStatus::Success,
                };
            }
        }
    }

    if json {
        print_json(&runs)?;
        return Ok(worst.exit_code());
    }
    for (name, outcomes) in &runs {
        println!("Job {}", name);
        for outcome in outcomes {
            match outcome {
                StepOutcome::Load(result) => println!(
                    "  load {}: {} inserted, {} rejected, {} file(s) skipped - {:?}",
                    result.table,
                    result.rows_inserted,
                    result.rows_rejected,
                    result.files_skipped,
                    result.status
                ),
                StepOutcome::Transform(result) => {
                    print!("  ");
                    print_transform(result);
                }
                StepOutcome::Truncate {
                    table,
                    rows_removed,
                } => println!("  truncate {}: {} row(s) removed", table, rows_removed),
            }
        }
    }
    Ok(worst.exit_code())
}
