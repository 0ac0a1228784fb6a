//! Show and history command implementations

use crate::cli::commands::{GlobalArgs, Workspace, print_json};
use crate::cli::error::CliError;
use crate::query::{Query, Relation};

/// Show command arguments
#[derive(Debug, Clone)]
pub struct ShowArgs {
    /// Table or view
    pub name: String,
    pub limit: Option<usize>,
    pub json: bool,
}

/// Render a relation as an aligned text table
pub fn render_table(relation: &Relation) -> String {
    let headers = relation.short_names();
    let cells: Vec<Vec<String>> = relation
        .rows
        .iter()
        .map(|row| {
            row.iter()
                .map(|v| if v.is_null() { "NULL".to_string() } else { v.to_string() })
                .collect()
        })
        .collect();

    let mut widths: Vec<usize> = headers.iter().map(|h| h.chars().count()).collect();
    for row in &cells {
        for (i, cell) in row.iter().enumerate() {
            widths[i] = widths[i].max(cell.chars().count());
        }
    }

    let line = |values: &[String]| -> String {
        values
            .iter()
            .zip(&widths)
            .map(|(v, w)| format!("{:<width$}", v, width = *w))
            .collect::<Vec<_>>()
            .join(" | ")
            .trim_end()
            .to_string()
    };

    let mut out = line(&headers);
    out.push('\n');
    out.push_str(
        &widths
            .iter()
            .map(|w| "-".repeat(*w))
            .collect::<Vec<_>>()
            .join("-+-"),
    );
    out.push('\n');
    for row in &cells {
        out.push_str(&line(row));
        out.push('\n');
    }
    out
}

/// Print a table or view
pub fn handle_show(global: &GlobalArgs, args: &ShowArgs) -> Result<(), CliError> {
    let workspace = Workspace::open(global)?;
    let relation = match args.limit {
        Some(n) => workspace.pipeline.query(&Query::from(&args.name).limit(n))?,
        None => workspace.pipeline.relation(&args.name)?,
    };

    if args.json {
        return print_json(&relation.to_json_rows());
    }
    print!("{}", render_table(&relation));
    println!("({} row(s))", relation.len());
    Ok(())
}

/// Print the load history of a table
pub fn handle_history(global: &GlobalArgs, table: &str, json: bool) -> Result<(), CliError> {
    let workspace = Workspace::open(global)?;
    let entries = workspace.pipeline.history(table);
    if json {
        return print_json(&entries);
    }
    if entries.is_empty() {
        println!("No files loaded into {}", table);
        return Ok(());
    }
    for entry in &entries {
        println!(
            "{}  {}  rows={}  sha256={}  load={}",
            entry.loaded_at.format("%Y-%m-%d %H:%M:%S"),
            entry.file,
            entry.rows_loaded,
            &entry.content_hash[..entry.content_hash.len().min(12)],
            entry.load_id
        );
    }
    Ok(())
}
