//! Dataframe Host Tests
//!
//! End-to-end behavior through the public surface: building a table,
//! planning and running queries, the plan cache, appending rows and the
//! command line driver.

use std::fs;
use std::path::PathBuf;

use serde_json::{json, Value};
use tempfile::TempDir;

use dfengine::cli::{run_command, CliErrorCode, Command, QueryArgs};
use dfengine::column::{Column, NullStorage, Storage};
use dfengine::config::EngineConfig;
use dfengine::cursor::CellValue;
use dfengine::dataframe::{Dataframe, DataframeError};
use dfengine::query::{FilterSpec, FilterValue, FilterValueList, LimitSpec, QuerySpec, SortSpec};
use dfengine::strings::StringPool;
use dfengine::types::{DuplicateState, Op, SortState};

fn single_column(values: Vec<FilterValue>) -> Dataframe {
    let mut builder = Dataframe::builder(["v"]);
    for v in values {
        builder.add_row(vec![v]).unwrap();
    }
    builder.build().unwrap()
}

fn run(df: &mut Dataframe, mut spec: QuerySpec, values: Vec<FilterValue>) -> Vec<u32> {
    let plan = df.plan_query(&mut spec).unwrap();
    let mut fetcher = FilterValueList::for_filters(&spec.filters, values);
    let mut cursor = df.query(&plan);
    cursor.execute(&mut fetcher);
    let mut out = Vec::new();
    while !cursor.eof() {
        out.push(cursor.table_index());
        cursor.next();
    }
    out
}

fn filtered(col: u32, op: Op) -> QuerySpec {
    QuerySpec {
        filters: vec![FilterSpec::new(col, op)],
        ..Default::default()
    }
}

// =============================================================================
// WORKED EXAMPLES
// =============================================================================

/// Test: Equality on a sorted column returns the matching run.
#[test]
fn test_sorted_equality() {
    let mut df = single_column([10, 10, 20, 30].map(FilterValue::Int64).to_vec());
    assert_eq!(run(&mut df, filtered(0, Op::Eq), vec![10i64.into()]), vec![0, 1]);
}

/// Test: Greater-than on a sorted column returns the tail.
#[test]
fn test_sorted_greater_than() {
    let mut df = single_column([10, 10, 20, 30].map(FilterValue::Int64).to_vec());
    assert_eq!(run(&mut df, filtered(0, Op::Gt), vec![15i64.into()]), vec![2, 3]);
}

/// Test: Descending sort with limit one returns the maximum.
#[test]
fn test_descending_limit_one() {
    let mut df = single_column([10, 10, 20, 30].map(FilterValue::Int64).to_vec());
    let spec = QuerySpec {
        sort: vec![SortSpec::desc(0)],
        limit: LimitSpec {
            limit: Some(1),
            offset: None,
        },
        ..Default::default()
    };
    assert_eq!(run(&mut df, spec, vec![]), vec![3]);
}

/// Test: Non-null filter plus ascending sort over a sparse string column.
#[test]
fn test_sparse_strings_sorted() {
    let mut df = single_column(vec!["b".into(), FilterValue::Null, "a".into()]);
    let spec = QuerySpec {
        filters: vec![FilterSpec::new(0, Op::IsNotNull)],
        sort: vec![SortSpec::asc(0)],
        ..Default::default()
    };
    assert_eq!(run(&mut df, spec, vec![FilterValue::Null]), vec![2, 0]);
}

/// Test: IN list over an unsorted signed column.
#[test]
fn test_in_list_on_int32() {
    let column = Column::new(
        Storage::Int32(vec![5, 6, 7, 5].into()),
        NullStorage::NonNull,
        SortState::Unsorted,
        DuplicateState::HasDuplicates,
    )
    .unwrap();
    let mut df = Dataframe::new(
        vec!["v".to_string()],
        vec![column],
        StringPool::new(),
        EngineConfig::default(),
    )
    .unwrap();
    let list = FilterValue::List(vec![5i64.into(), 7i64.into()]);
    assert_eq!(run(&mut df, filtered(0, Op::In), vec![list]), vec![0, 2, 3]);
}

// =============================================================================
// PLAN CACHE
// =============================================================================

/// Test: Repeated shapes hit the cache even with different values.
#[test]
fn test_cache_serves_repeated_shapes() {
    let mut df = single_column((0..50).map(FilterValue::Int64).collect());
    assert_eq!(run(&mut df, filtered(0, Op::Lt), vec![3i64.into()]), vec![0, 1, 2]);
    assert_eq!(run(&mut df, filtered(0, Op::Ge), vec![48i64.into()]), vec![48, 49]);
    assert_eq!(run(&mut df, filtered(0, Op::Lt), vec![2i64.into()]), vec![0, 1]);

    let stats = df.metrics().snapshot();
    assert_eq!(stats.plans_built, 2);
    assert_eq!(stats.cache_hits, 1);
    assert_eq!(stats.cache_misses, 2);
    assert_eq!(stats.executions, 3);
    assert_eq!(stats.rows_returned, 7);
    assert_eq!(df.cached_plans(), 2);
}

/// Test: A rejected spec is counted and returns the planner error.
#[test]
fn test_rejected_spec() {
    let mut df = single_column(vec![1i64.into()]);
    let mut spec = filtered(9, Op::Eq);
    let err = df.plan_query(&mut spec).unwrap_err();
    assert!(matches!(err, DataframeError::Planner(_)));
    assert_eq!(df.metrics().snapshot().plans_rejected, 1);
    assert_eq!(df.cached_plans(), 0);
}

// =============================================================================
// APPENDING ROWS
// =============================================================================

/// Test: Appended rows are visible and stale plans are dropped.
#[test]
fn test_push_row_then_query() {
    let mut df = single_column([1, 2, 3].map(FilterValue::Int64).to_vec());
    assert_eq!(run(&mut df, filtered(0, Op::Ge), vec![2i64.into()]), vec![1, 2]);
    assert_eq!(df.cached_plans(), 1);

    df.push_row(vec![0i64.into()]).unwrap();
    assert_eq!(df.row_count(), 4);
    assert_eq!(df.cached_plans(), 0);
    assert_eq!(run(&mut df, filtered(0, Op::Ge), vec![2i64.into()]), vec![1, 2]);
    assert_eq!(run(&mut df, filtered(0, Op::Lt), vec![1i64.into()]), vec![3]);
}

/// Test: Appending doubles with signed zeros and NaN keeps filters,
/// distinct and min/max consistent.
#[test]
fn test_push_row_doubles() {
    let mut df = single_column(vec![(-0.0).into(), 1.5.into()]);
    df.push_row(vec![0.0.into()]).unwrap();
    df.push_row(vec![f64::NAN.into()]).unwrap();
    df.push_row(vec![(-0.0).into()]).unwrap();

    assert_eq!(run(&mut df, filtered(0, Op::Eq), vec![0.0.into()]), vec![0, 2, 4]);
    assert_eq!(run(&mut df, filtered(0, Op::Ne), vec![0.0.into()]), vec![1, 3]);
    assert!(run(&mut df, filtered(0, Op::Eq), vec![f64::NAN.into()]).is_empty());

    let distinct = QuerySpec {
        distinct: vec![dfengine::query::DistinctSpec { col: 0 }],
        ..Default::default()
    };
    assert_eq!(run(&mut df, distinct, vec![]), vec![0, 1, 3]);

    for (sort, expected) in [(SortSpec::asc(0), 0), (SortSpec::desc(0), 3)] {
        let spec = QuerySpec {
            sort: vec![sort],
            limit: LimitSpec {
                limit: Some(1),
                offset: None,
            },
            ..Default::default()
        };
        assert_eq!(run(&mut df, spec, vec![]), vec![expected], "{:?}", sort);
    }
}

/// Test: An indexed double column finds both signed zeros after appends.
#[test]
fn test_push_row_doubles_indexed() {
    let mut df = single_column(vec![2.0.into(), (-0.0).into()]);
    df.add_index(vec![0]).unwrap();
    df.push_row(vec![0.0.into()]).unwrap();
    df.push_row(vec![f64::NAN.into()]).unwrap();
    assert_eq!(run(&mut df, filtered(0, Op::Eq), vec![(-0.0).into()]), vec![1, 2]);
    assert_eq!(run(&mut df, filtered(0, Op::Eq), vec![2i64.into()]), vec![0]);
}

/// Test: A row of the wrong width is rejected without mutation.
#[test]
fn test_push_row_wrong_width() {
    let mut df = single_column(vec![1i64.into()]);
    let err = df.push_row(vec![1i64.into(), 2i64.into()]).unwrap_err();
    assert!(matches!(err, DataframeError::RowWidth { expected: 1, actual: 2 }));
    assert_eq!(df.row_count(), 1);
}

/// Test: Cells read through the cursor reflect the stored values.
#[test]
fn test_cursor_cells() {
    let mut builder = Dataframe::builder(["name", "dur"]);
    builder.add_row(vec!["x".into(), 2.5.into()]).unwrap();
    builder.add_row(vec![FilterValue::Null, 1.0.into()]).unwrap();
    let mut df = builder.build().unwrap();

    let mut spec = QuerySpec {
        sort: vec![SortSpec::asc(1)],
        ..Default::default()
    };
    let plan = df.plan_query(&mut spec).unwrap();
    let mut cursor = df.query(&plan);
    cursor.execute(&mut FilterValueList::default());
    assert_eq!(cursor.cell_value(0), CellValue::Null);
    assert_eq!(cursor.cell_value(1), CellValue::Double(1.0));
    cursor.next();
    assert_eq!(cursor.cell_value(0), CellValue::String("x"));
    cursor.next();
    assert!(cursor.eof());
}

// =============================================================================
// COMMAND LINE
// =============================================================================

fn write(dir: &TempDir, name: &str, value: Value) -> PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, value.to_string()).unwrap();
    path
}

fn cli_args(dir: &TempDir, query: Value) -> QueryArgs {
    let table = json!({
        "columns": ["id", "thread", "dur"],
        "rows": [[0, "main", 30], [1, "io", 10], [2, "main", 20], [3, null, 40]],
        "indexes": [[1]],
        "id_column": "id"
    });
    QueryArgs {
        table: write(dir, "table.json", table),
        query: write(dir, "query.json", query),
        config: None,
    }
}

fn lines(out: Vec<u8>) -> Vec<Value> {
    String::from_utf8(out)
        .unwrap()
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect()
}

/// Test: The query command prints matching rows in sort order.
#[test]
fn test_cli_query() {
    let dir = TempDir::new().unwrap();
    let args = cli_args(
        &dir,
        json!({
            "filters": [{"col": 1, "op": "eq"}],
            "sort": [{"col": 2, "direction": "descending"}],
            "values": ["main"]
        }),
    );
    let mut out = Vec::new();
    run_command(Command::Query(args), &mut out).unwrap();
    assert_eq!(
        lines(out),
        vec![
            json!({"id": 0, "thread": "main", "dur": 30}),
            json!({"id": 2, "thread": "main", "dur": 20}),
        ]
    );
}

/// Test: The plan command prints a decodable plan.
#[test]
fn test_cli_plan() {
    let dir = TempDir::new().unwrap();
    let args = cli_args(&dir, json!({"filters": [{"col": 2, "op": "gt"}], "values": [15]}));
    let mut out = Vec::new();
    run_command(Command::Plan(args), &mut out).unwrap();
    let printed = lines(out);
    let encoded = printed[0].as_str().unwrap();
    assert!(dfengine::plan::QueryPlan::deserialize(encoded).is_ok());
}

/// Test: The explain command lists instruction names.
#[test]
fn test_cli_explain() {
    let dir = TempDir::new().unwrap();
    let args = cli_args(&dir, json!({"filters": [{"col": 0, "op": "eq"}], "values": [2]}));
    let mut out = Vec::new();
    run_command(Command::Explain(args), &mut out).unwrap();
    let explain = &lines(out)[0];
    let steps = explain["steps"].as_array().unwrap();
    assert!(!steps.is_empty());
    assert!(steps.iter().all(|s| s["name"].is_string()));
}

/// Test: An invalid query is reported as a rejected plan.
#[test]
fn test_cli_rejects_bad_query() {
    let dir = TempDir::new().unwrap();
    let args = cli_args(&dir, json!({"sort": [{"col": 7}]}));
    let mut out = Vec::new();
    let err = run_command(Command::Query(args), &mut out).unwrap_err();
    assert_eq!(err.code(), &CliErrorCode::PlanRejected);
    assert!(out.is_empty());
}
