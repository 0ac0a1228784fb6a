//! End-to-end tests over files on disk: DDL catalogs, unload round trips, persisted state

use std::fs;
use std::path::Path;

use chrono::NaiveDate;
use data_loading_sdk::catalog::Catalog;
use data_loading_sdk::load::{LoadRequest, LoadStatus};
use data_loading_sdk::models::{ErrorPolicy, FileFormat, Value};
use data_loading_sdk::pipeline::Pipeline;
use data_loading_sdk::stage::LocalSourceStore;
use data_loading_sdk::store::TableStore;
use data_loading_sdk::unload::encode_rows;
use tempfile::TempDir;

const TICKIT_CATALOG: &str = r#"
ddl: |
  create table users(
      userid integer not null,
      username char(8),
      firstname varchar(30),
      city varchar(30),
      likesports boolean);
  create table "date"(
      dateid smallint not null,
      caldate date not null,
      holiday boolean);
  create table sales(
      salesid integer not null,
      sellerid integer not null,
      qtysold smallint not null,
      pricepaid decimal(8,2),
      saletime timestamp);
formats:
  - { name: pipe, type: CSV, field_delimiter: "|", null_if: [""] }
  - { name: tab, type: CSV, field_delimiter: "\t", null_if: [""] }
  - { name: quoted, type: CSV, field_optionally_enclosed_by: '"', null_if: ["", "NULL"] }
stages:
  - { name: tickit_users, url: "tickit", pattern: "allusers_pipe.txt", file_format: pipe }
  - { name: tickit_dates, url: "tickit", pattern: "date2008_pipe.txt", file_format: pipe }
  - { name: tickit_sales, url: "tickit", pattern: "sales_tab.txt", file_format: tab }
  - { name: unloaded, url: "out", file_format: quoted }
"#;

fn write(dir: &Path, name: &str, content: &str) {
    let path = dir.join(name);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, content).unwrap();
}

fn tickit_workspace() -> TempDir {
    let dir = TempDir::new().unwrap();
    write(
        dir.path(),
        "tickit/allusers_pipe.txt",
        "1|JSG99FHE|Rafael|Kent|t\n2|PGL08LJI|Vladimir|Augusta|\n3|IFT66TXU|Lars|NULL|f\n",
    );
    write(
        dir.path(),
        "tickit/date2008_pipe.txt",
        "1827|2008-01-01|t\n1828|2008-01-02|f\n",
    );
    write(
        dir.path(),
        "tickit/sales_tab.txt",
        "1\t36861\t4\t728.00\t2008-02-18 02:36:48\n2\t8117\t2\t76.00\t2008-06-06 05:00:16\n",
    );
    dir
}

fn open(dir: &Path) -> Pipeline<LocalSourceStore> {
    Pipeline::new(
        Catalog::from_yaml(TICKIT_CATALOG).unwrap(),
        LocalSourceStore::with_base_dir(dir),
    )
}

#[test]
fn loads_tickit_files_into_ddl_tables() {
    let dir = tickit_workspace();
    let p = open(dir.path());
    assert_eq!(p.create_tables().unwrap(), vec!["users", "date", "sales"]);

    for (stage, table, rows) in [
        ("tickit_users", "users", 3),
        ("tickit_dates", "date", 2),
        ("tickit_sales", "sales", 2),
    ] {
        let result = p.load(&LoadRequest::new(stage, table)).unwrap();
        assert_eq!(result.status, LoadStatus::Success, "{table}: {:?}", result.rejections);
        assert_eq!(result.rows_inserted, rows);
    }

    let users = p.tables().snapshot("users").unwrap();
    assert_eq!(users.rows[1][4], Value::Null);
    assert_eq!(users.rows[2][3], Value::from("NULL"));
    assert_eq!(users.rows[0][4], Value::Boolean(true));

    let dates = p.tables().snapshot("date").unwrap();
    assert_eq!(
        dates.rows[0][1],
        Value::Date(NaiveDate::from_ymd_opt(2008, 1, 1).unwrap())
    );

    let sales = p.tables().snapshot("sales").unwrap();
    assert_eq!(sales.rows[0][3], Value::Float(728.0));
    assert_eq!(sales.rows[1][4].to_string(), "2008-06-06 05:00:16");
}

#[test]
fn username_longer_than_char_8_is_rejected() {
    let dir = tickit_workspace();
    write(
        dir.path(),
        "tickit/allusers_pipe.txt",
        "1|JSG99FHE|Rafael|Kent|t\n2|TOOLONGNAME|Vladimir|Augusta|f\n",
    );
    let p = open(dir.path());
    let result = p
        .load(&LoadRequest::new("tickit_users", "users").on_error(ErrorPolicy::Continue))
        .unwrap();
    assert_eq!(result.rows_inserted, 1);
    assert_eq!(result.rejections[0].column.as_deref(), Some("username"));
    assert_eq!(result.rejections[0].code(), "TYPE_COERCION_ERROR");
}

#[test]
fn unloaded_table_loads_back_identically() {
    let dir = tickit_workspace();
    let p = open(dir.path());
    p.load(&LoadRequest::new("tickit_users", "users")).unwrap();
    p.load(&LoadRequest::new("tickit_sales", "sales")).unwrap();

    // Values that need enclosure or could be mistaken for NULL
    p.tables()
        .append_rows(
            "users",
            vec![vec![
                Value::Integer(4),
                Value::from(""),
                Value::from("O\"Brien, Jr"),
                Value::from("NULL"),
                Value::Null,
            ]],
        )
        .unwrap();

    for table in ["users", "sales"] {
        let path = dir.path().join("out").join(format!("{table}.csv"));
        let written = p.unload(table, &path, Some("quoted"), false).unwrap();
        let original = p.tables().snapshot(table).unwrap();
        assert_eq!(written, original.len());

        p.tables()
            .create_table(original.schema.renamed(format!("{table}_copy")), false)
            .unwrap();
        let result = p
            .load(
                &LoadRequest::new("unloaded", format!("{table}_copy"))
                    .with_files(vec![format!("{table}.csv")]),
            )
            .unwrap();
        assert_eq!(result.rows_rejected, 0, "{:?}", result.rejections);

        let copy = p.tables().snapshot(&format!("{table}_copy")).unwrap();
        assert_eq!(*copy.rows, *original.rows, "{table} differs after round trip");
    }
}

#[test]
fn encoding_needs_an_escape_or_enclosure_for_ambiguous_text() {
    let format = FileFormat::csv("bare").with_escape_unenclosed(None);
    let err = encode_rows(&[], &[vec![Value::from("a,b")]], &format, false);
    assert!(err.is_err());
}

#[test]
fn state_survives_a_restart() {
    let dir = tickit_workspace();
    let state = dir.path().join(".data-load");
    {
        let p = open(dir.path());
        p.load(&LoadRequest::new("tickit_users", "users")).unwrap();
        p.save_state(&state).unwrap();
    }
    let p = open(dir.path()).with_state(&state).unwrap();
    assert_eq!(p.tables().snapshot("users").unwrap().len(), 3);

    // Unchanged file is skipped after the restart
    let again = p.load(&LoadRequest::new("tickit_users", "users")).unwrap();
    assert_eq!(again.files_skipped, 1);
    assert_eq!(p.tables().snapshot("users").unwrap().len(), 3);
}
