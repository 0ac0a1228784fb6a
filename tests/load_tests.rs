//! Integration tests for load policies and accounting

use data_loading_sdk::decode::RawRow;
use data_loading_sdk::error::IngestError;
use data_loading_sdk::load::{FileStatus, LoadExecutor, LoadHistory, LoadOptions, LoadStatus};
use data_loading_sdk::models::{
    ColumnDef, DataType, ErrorPolicy, FileFormat, StageLocation, TableSchema, Value,
};
use data_loading_sdk::stage::MemorySourceStore;
use data_loading_sdk::store::{MemoryTableStore, TableStore};

fn varchar() -> DataType {
    DataType::Varchar { max_length: None }
}

/// Eight columns of the bike-share trips feed
fn trips_schema() -> TableSchema {
    TableSchema::new(
        "trips",
        vec![
            ColumnDef::new("tripduration", DataType::Integer),
            ColumnDef::new("starttime", DataType::Timestamp),
            ColumnDef::new("stoptime", DataType::Timestamp),
            ColumnDef::new("start_station_id", DataType::Integer),
            ColumnDef::new("start_station_name", varchar()),
            ColumnDef::new("end_station_id", DataType::Integer),
            ColumnDef::new("bikeid", DataType::Integer),
            ColumnDef::new("usertype", varchar()),
        ],
    )
}

/// Nine fields per record: the trips columns plus a trailing birth year
const TRIPS_NINE_FIELDS: &str = "\
196,\"2018-01-01 00:00:04\",\"2018-01-01 00:03:20\",72,\"W 52 St & 11 Ave\",505,31956,\"Subscriber\",1992
207,\"2018-01-01 00:00:21\",\"2018-01-01 00:03:48\",72,\"W 52 St & 11 Ave\",3255,32536,\"Subscriber\",1969
613,\"2018-01-01 00:01:24\",\"2018-01-01 00:11:37\",79,\"Franklin St & W Broadway\",3081,16069,\"Customer\",
";

fn trips_format() -> FileFormat {
    FileFormat::csv("trips_csv").with_enclosure('"')
}

fn users_schema() -> TableSchema {
    TableSchema::new(
        "users",
        vec![
            ColumnDef::new("id", DataType::Integer).not_null(),
            ColumnDef::new("name", varchar()),
        ],
    )
}

fn users_tables() -> MemoryTableStore {
    let tables = MemoryTableStore::new();
    tables.create_table(users_schema(), false).unwrap();
    tables
}

fn pipe() -> FileFormat {
    FileFormat::csv("pipe").with_delimiter('|')
}

#[test]
fn abort_leaves_the_table_unchanged() {
    let sources = MemorySourceStore::new();
    sources.put("memory://users/a.txt", "3|carol\n4|dave\n");
    sources.put("memory://users/b.txt", "5|erin\nnot-a-number|frank\n6|grace\n");
    let tables = users_tables();
    tables
        .append_rows(
            "users",
            vec![
                vec![Value::Integer(1), Value::from("alice")],
                vec![Value::Integer(2), Value::from("bob")],
            ],
        )
        .unwrap();
    let history = LoadHistory::new();

    let err = LoadExecutor::new(&sources, &tables)
        .with_history(&history)
        .execute(
            &StageLocation::new("users", "memory://users/"),
            &pipe(),
            "users",
            ErrorPolicy::Abort,
            &LoadOptions::default(),
        )
        .unwrap_err();

    match err {
        IngestError::LoadAborted { table, rejection } => {
            assert_eq!(table, "users");
            assert_eq!(rejection.file, "memory://users/b.txt");
            assert_eq!(rejection.record_number, 2);
            assert_eq!(rejection.code(), "TYPE_COERCION_ERROR");
        }
        other => panic!("expected LoadAborted, got {other:?}"),
    }
    // Rows from the clean first file are not committed either
    assert_eq!(tables.snapshot("users").unwrap().len(), 2);
    assert!(history.entries("users").is_empty());
}

#[test]
fn continue_accounts_for_every_row_and_keeps_raw_content() {
    let sources = MemorySourceStore::new();
    sources.put(
        "memory://users/a.txt",
        "1|alice\nx|bob\n|carol\n4|dave|extra\n5|erin\n",
    );
    let tables = users_tables();

    let result = LoadExecutor::new(&sources, &tables)
        .execute(
            &StageLocation::new("users", "memory://users/"),
            &pipe().with_null_if(&[""]),
            "users",
            ErrorPolicy::Continue,
            &LoadOptions::default(),
        )
        .unwrap();

    assert_eq!(result.rows_attempted, 5);
    assert_eq!(result.rows_inserted, 2);
    assert_eq!(result.rows_rejected, 3);
    assert_eq!(result.rows_inserted + result.rows_rejected, result.rows_attempted);
    assert!(result.is_balanced());
    assert_eq!(result.status, LoadStatus::PartialSuccess);
    assert_eq!(tables.snapshot("users").unwrap().len(), 2);

    let codes: Vec<_> = result.rejections.iter().map(|r| r.code()).collect();
    assert_eq!(
        codes,
        vec!["TYPE_COERCION_ERROR", "CONSTRAINT_VIOLATION", "COLUMN_COUNT_MISMATCH"]
    );
    assert_eq!(
        result.rejections[0].raw,
        RawRow::Delimited(vec![Some("x".to_string()), Some("bob".to_string())])
    );
    assert_eq!(result.rejections[1].column.as_deref(), Some("id"));
    assert_eq!(
        result.rejections[2].raw,
        RawRow::Delimited(vec![
            Some("4".to_string()),
            Some("dave".to_string()),
            Some("extra".to_string())
        ])
    );
    let record_numbers: Vec<_> = result.rejections.iter().map(|r| r.record_number).collect();
    assert_eq!(record_numbers, vec![2, 3, 4]);
}

#[test]
fn extra_field_is_rejected_when_column_count_is_checked() {
    let sources = MemorySourceStore::new();
    sources.put("memory://trips/2018-01.csv", TRIPS_NINE_FIELDS);
    let tables = MemoryTableStore::new();
    tables.create_table(trips_schema(), false).unwrap();

    let result = LoadExecutor::new(&sources, &tables)
        .execute(
            &StageLocation::new("trips", "memory://trips/"),
            &trips_format().with_column_count_check(true),
            "trips",
            ErrorPolicy::Continue,
            &LoadOptions::default(),
        )
        .unwrap();

    assert_eq!(result.rows_inserted, 0);
    assert_eq!(result.rows_rejected, 3);
    assert!(
        result
            .rejections
            .iter()
            .all(|r| r.code() == "COLUMN_COUNT_MISMATCH")
    );
    assert_eq!(result.status, LoadStatus::Failure);
    assert_eq!(result.files[0].status, FileStatus::LoadFailed);
    assert!(tables.snapshot("trips").unwrap().is_empty());
}

#[test]
fn extra_field_is_dropped_when_column_count_is_not_checked() {
    let sources = MemorySourceStore::new();
    sources.put("memory://trips/2018-01.csv", TRIPS_NINE_FIELDS);
    let tables = MemoryTableStore::new();
    tables.create_table(trips_schema(), false).unwrap();

    let result = LoadExecutor::new(&sources, &tables)
        .execute(
            &StageLocation::new("trips", "memory://trips/"),
            &trips_format().with_column_count_check(false),
            "trips",
            ErrorPolicy::Abort,
            &LoadOptions::default(),
        )
        .unwrap();

    assert_eq!(result.rows_inserted, 3);
    assert_eq!(result.status, LoadStatus::Success);
    let snapshot = tables.snapshot("trips").unwrap();
    for row in snapshot.rows.iter() {
        assert_eq!(row.len(), 8);
    }
    assert_eq!(snapshot.rows[0][0], Value::Integer(196));
    assert_eq!(snapshot.rows[0][4], Value::from("W 52 St & 11 Ave"));
    assert_eq!(snapshot.rows[2][7], Value::from("Customer"));
}

#[test]
fn empty_string_sentinel_is_null_but_literal_null_is_text() {
    let sources = MemorySourceStore::new();
    sources.put(
        "memory://tickit/venue_pipe.txt",
        "1|Toyota Park|Bridgeview|IL|0\n2|Pier 40||NULL|\n",
    );
    let tables = MemoryTableStore::new();
    tables
        .create_table(
            TableSchema::new(
                "venue",
                vec![
                    ColumnDef::new("venueid", DataType::Integer).not_null(),
                    ColumnDef::new("venuename", DataType::Varchar { max_length: Some(100) }),
                    ColumnDef::new("venuecity", DataType::Varchar { max_length: Some(30) }),
                    ColumnDef::new("venuestate", varchar()),
                    ColumnDef::new("venueseats", DataType::Integer),
                ],
            ),
            false,
        )
        .unwrap();

    let result = LoadExecutor::new(&sources, &tables)
        .execute(
            &StageLocation::new("tickit", "memory://tickit/"),
            &pipe().with_null_if(&[""]),
            "venue",
            ErrorPolicy::Abort,
            &LoadOptions::default(),
        )
        .unwrap();
    assert_eq!(result.rows_inserted, 2);

    let rows = tables.snapshot("venue").unwrap().rows;
    assert_eq!(rows[1][2], Value::Null);
    assert_eq!(rows[1][3], Value::from("NULL"));
    assert_eq!(rows[1][4], Value::Null);
    assert_eq!(rows[0][4], Value::Integer(0));
}

#[test]
fn skip_file_discards_the_whole_file_and_moves_on() {
    let sources = MemorySourceStore::new();
    sources.put("memory://users/a.txt", "1|alice\nx|bob\n3|carol\n");
    sources.put("memory://users/b.txt", "4|dave\n5|erin\n");
    let tables = users_tables();

    let result = LoadExecutor::new(&sources, &tables)
        .execute(
            &StageLocation::new("users", "memory://users/"),
            &pipe(),
            "users",
            ErrorPolicy::SkipFile,
            &LoadOptions::default(),
        )
        .unwrap();

    assert_eq!(result.files[0].status, FileStatus::LoadFailed);
    assert_eq!(result.files[1].status, FileStatus::Loaded);
    assert_eq!(result.rows_inserted, 2);
    assert_eq!(result.rows_rejected, 1);
    assert_eq!(result.rows_discarded, 1);
    assert!(result.is_balanced());
    assert_eq!(result.status, LoadStatus::PartialSuccess);

    let ids: Vec<_> = tables
        .snapshot("users")
        .unwrap()
        .rows
        .iter()
        .map(|r| r[0].clone())
        .collect();
    assert_eq!(ids, vec![Value::Integer(4), Value::Integer(5)]);
}

#[test]
fn skip_file_after_n_tolerates_fewer_rejections() {
    let sources = MemorySourceStore::new();
    sources.put("memory://users/a.txt", "1|alice\nx|bob\n3|carol\n");
    let tables = users_tables();

    let result = LoadExecutor::new(&sources, &tables)
        .execute(
            &StageLocation::new("users", "memory://users/"),
            &pipe(),
            "users",
            ErrorPolicy::SkipFileAfter(2),
            &LoadOptions::default(),
        )
        .unwrap();

    assert_eq!(result.files[0].status, FileStatus::PartiallyLoaded);
    assert_eq!(result.files[0].first_error_record, Some(2));
    assert_eq!(result.rows_inserted, 2);
    assert_eq!(result.rows_discarded, 0);
}

#[test]
fn history_skips_unchanged_files_unless_forced() {
    let sources = MemorySourceStore::new();
    sources.put("memory://users/a.txt", "1|alice\n");
    let tables = users_tables();
    let history = LoadHistory::new();
    let stage = StageLocation::new("users", "memory://users/");
    let executor = LoadExecutor::new(&sources, &tables).with_history(&history);

    let first = executor
        .execute(&stage, &pipe(), "users", ErrorPolicy::Abort, &LoadOptions::default())
        .unwrap();
    assert_eq!(first.rows_inserted, 1);

    let second = executor
        .execute(&stage, &pipe(), "users", ErrorPolicy::Abort, &LoadOptions::default())
        .unwrap();
    assert_eq!(second.files_skipped, 1);
    assert_eq!(second.files[0].status, FileStatus::Skipped);
    assert_eq!(second.rows_attempted, 0);

    // Changed content is loaded again
    sources.put("memory://users/a.txt", "1|alice\n2|bob\n");
    let third = executor
        .execute(&stage, &pipe(), "users", ErrorPolicy::Abort, &LoadOptions::default())
        .unwrap();
    assert_eq!(third.rows_inserted, 2);

    let forced = executor
        .execute(
            &stage,
            &pipe(),
            "users",
            ErrorPolicy::Abort,
            &LoadOptions {
                force: true,
                ..LoadOptions::default()
            },
        )
        .unwrap();
    assert_eq!(forced.files_skipped, 0);
    assert_eq!(tables.snapshot("users").unwrap().len(), 5);
}

#[test]
fn validate_only_commits_nothing() {
    let sources = MemorySourceStore::new();
    sources.put("memory://users/a.txt", "1|alice\nx|bob\n");
    let tables = users_tables();
    let history = LoadHistory::new();

    let result = LoadExecutor::new(&sources, &tables)
        .with_history(&history)
        .execute(
            &StageLocation::new("users", "memory://users/"),
            &pipe(),
            "users",
            ErrorPolicy::Continue,
            &LoadOptions {
                validate_only: true,
                ..LoadOptions::default()
            },
        )
        .unwrap();

    assert!(!result.committed);
    assert_eq!(result.rows_inserted, 1);
    assert_eq!(result.rows_rejected, 1);
    assert!(tables.snapshot("users").unwrap().is_empty());
    assert!(history.entries("users").is_empty());
}

#[test]
fn parallel_loads_match_sequential_loads() {
    let sources = MemorySourceStore::new();
    for i in 0..6 {
        let content: String = (0..20)
            .map(|j| {
                if j == 7 {
                    format!("bad{}|row\n", i)
                } else {
                    format!("{}|user{}\n", i * 100 + j, j)
                }
            })
            .collect();
        sources.put(format!("memory://users/part-{}.txt", i), content);
    }
    let stage = StageLocation::new("users", "memory://users/");

    let run = |parallelism: usize| {
        let tables = users_tables();
        let result = LoadExecutor::new(&sources, &tables)
            .execute(
                &stage,
                &pipe(),
                "users",
                ErrorPolicy::Continue,
                &LoadOptions {
                    parallelism,
                    ..LoadOptions::default()
                },
            )
            .unwrap();
        let rows = tables.snapshot("users").unwrap().rows;
        let rejected: Vec<_> = result
            .rejections
            .iter()
            .map(|r| (r.file.clone(), r.record_number))
            .collect();
        (rows, rejected)
    };

    let (sequential_rows, sequential_rejected) = run(1);
    let (parallel_rows, parallel_rejected) = run(4);
    assert_eq!(sequential_rows.len(), 114);
    assert_eq!(sequential_rows, parallel_rows);
    assert_eq!(sequential_rejected, parallel_rejected);
}

#[test]
fn rejection_cap_keeps_the_count() {
    let sources = MemorySourceStore::new();
    sources.put("memory://users/a.txt", "a|1\nb|2\nc|3\n4|ok\n");
    let tables = users_tables();

    let result = LoadExecutor::new(&sources, &tables)
        .execute(
            &StageLocation::new("users", "memory://users/"),
            &pipe(),
            "users",
            ErrorPolicy::Continue,
            &LoadOptions {
                max_recorded_rejections: Some(1),
                ..LoadOptions::default()
            },
        )
        .unwrap();

    assert_eq!(result.rows_rejected, 3);
    assert_eq!(result.rejections.len(), 1);
    assert_eq!(result.rejections_unrecorded, 2);
}
