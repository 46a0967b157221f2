//! Plan Serialization Tests
//!
//! A serialized plan must decode to an identical plan, re-encode to the
//! identical string, and run to the same rows. Malformed blobs must be
//! rejected with a format error rather than a panic.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use dfengine::config::EngineConfig;
use dfengine::dataframe::Dataframe;
use dfengine::plan::{PlanFormatError, QueryPlan};
use dfengine::query::{
    DistinctSpec, FilterSpec, FilterValue, FilterValueList, LimitSpec, QuerySpec, SortSpec,
};
use dfengine::types::Op;

fn table() -> Dataframe {
    let mut builder = Dataframe::builder(["id", "ts", "dur", "name", "depth", "ratio"])
        .id_column("id")
        .dense_null("ratio")
        .index(vec![4]);
    let names = ["main", "render", "gc", "io"];
    for i in 0..40i64 {
        let name = if i % 7 == 3 {
            FilterValue::Null
        } else {
            FilterValue::from(names[(i % 4) as usize])
        };
        let ratio = if i % 5 == 0 {
            FilterValue::Null
        } else {
            FilterValue::Double(i as f64 / 8.0)
        };
        builder
            .add_row(vec![
                FilterValue::Int64(i),
                FilterValue::Int64(i * 10),
                FilterValue::Int64((i * 37) % 11 - 5),
                name,
                FilterValue::Int64(i % 3),
                ratio,
            ])
            .unwrap();
    }
    builder.build().unwrap()
}

/// Query shapes covering every family of instructions the planner emits.
fn specs() -> Vec<(QuerySpec, Vec<FilterValue>)> {
    let limit_one = LimitSpec {
        limit: Some(1),
        offset: None,
    };
    vec![
        (QuerySpec::default(), vec![]),
        (
            QuerySpec {
                filters: vec![FilterSpec::new(0, Op::Eq)],
                ..Default::default()
            },
            vec![FilterValue::Int64(12)],
        ),
        (
            QuerySpec {
                filters: vec![FilterSpec::new(1, Op::Ge), FilterSpec::new(1, Op::Lt)],
                ..Default::default()
            },
            vec![FilterValue::Int64(50), FilterValue::Double(200.5)],
        ),
        (
            QuerySpec {
                filters: vec![FilterSpec::new(3, Op::Glob), FilterSpec::new(2, Op::Ne)],
                sort: vec![SortSpec::desc(5), SortSpec::asc(3)],
                ..Default::default()
            },
            vec![FilterValue::from("*r*"), FilterValue::Int64(0)],
        ),
        (
            QuerySpec {
                filters: vec![FilterSpec::new(4, Op::Eq)],
                distinct: vec![DistinctSpec { col: 2 }],
                limit: LimitSpec {
                    limit: Some(3),
                    offset: Some(1),
                },
                ..Default::default()
            },
            vec![FilterValue::Int64(1)],
        ),
        (
            QuerySpec {
                filters: vec![FilterSpec::new(2, Op::In), FilterSpec::new(5, Op::IsNotNull)],
                sort: vec![SortSpec::desc(2)],
                limit: limit_one,
                ..Default::default()
            },
            vec![
                FilterValue::List(vec![FilterValue::Int64(-5), FilterValue::Int64(3)]),
                FilterValue::Null,
            ],
        ),
        (
            QuerySpec {
                filters: vec![FilterSpec::new(3, Op::Regex), FilterSpec::new(5, Op::IsNull)],
                cols_used: 0b101,
                ..Default::default()
            },
            vec![FilterValue::from("^(main|io)$"), FilterValue::Null],
        ),
    ]
}

fn rows(df: &Dataframe, plan: &QueryPlan, spec: &QuerySpec, values: &[FilterValue]) -> Vec<u32> {
    let mut fetcher = FilterValueList::for_filters(&spec.filters, values.to_vec());
    let mut cursor = df.query(plan);
    cursor.execute(&mut fetcher);
    let mut out = Vec::new();
    while !cursor.eof() {
        out.push(cursor.table_index());
        cursor.next();
    }
    out
}

// =============================================================================
// ROUND TRIPS
// =============================================================================

/// Test: serialize(deserialize(s)) == s and the decoded plan is equal.
#[test]
fn test_round_trip_is_byte_identical() {
    let mut df = table();
    for (mut spec, _) in specs() {
        let plan = df.plan_query(&mut spec).unwrap();
        let encoded = plan.serialize();
        let decoded = QueryPlan::deserialize(&encoded).unwrap();
        assert_eq!(&decoded, plan.as_ref(), "{:?}", spec);
        assert_eq!(decoded.serialize(), encoded);
    }
}

/// Test: A decoded plan returns the same rows as the original.
#[test]
fn test_decoded_plan_runs_identically() {
    let mut df = table();
    for (mut spec, values) in specs() {
        let plan = df.plan_query(&mut spec).unwrap();
        let decoded = QueryPlan::deserialize(&plan.serialize()).unwrap();
        assert_eq!(
            rows(&df, &decoded, &spec, &values),
            rows(&df, &plan, &spec, &values),
            "{:?}",
            spec
        );
    }
}

/// Test: Planning the same spec twice serializes identically.
#[test]
fn test_planning_is_deterministic() {
    let config = EngineConfig {
        plan_cache_capacity: 0,
        ..Default::default()
    };
    let base = table();
    let mut df = Dataframe::new(
        base.column_names().to_vec(),
        base.columns().to_vec(),
        base.pool().clone(),
        config,
    )
    .unwrap();
    for (spec, _) in specs() {
        let first = df.plan_query(&mut spec.clone()).unwrap().serialize();
        let second = df.plan_query(&mut spec.clone()).unwrap().serialize();
        assert_eq!(first, second);
    }
}

// =============================================================================
// MALFORMED INPUT
// =============================================================================

fn encoded_bytes() -> Vec<u8> {
    let mut df = table();
    let (mut spec, _) = specs().remove(3);
    let plan = df.plan_query(&mut spec).unwrap();
    STANDARD.decode(plan.serialize()).unwrap()
}

/// Test: Non-Base64 input is rejected.
#[test]
fn test_rejects_invalid_base64() {
    assert!(matches!(
        QueryPlan::deserialize("not base64!"),
        Err(PlanFormatError::InvalidBase64(_))
    ));
}

/// Test: Unknown opcode tags are rejected.
#[test]
fn test_rejects_unknown_opcode() {
    let mut bytes = encoded_bytes();
    // First record starts after the 32-byte params and the u64 count.
    bytes[40..44].copy_from_slice(&0xFFu32.to_le_bytes());
    assert_eq!(
        QueryPlan::deserialize(&STANDARD.encode(&bytes)),
        Err(PlanFormatError::UnknownOpcode(0xFF))
    );
}

/// Test: Truncated and padded blobs are rejected.
#[test]
fn test_rejects_bad_lengths() {
    let bytes = encoded_bytes();
    for cut in [1, 4, 20, bytes.len() - 8] {
        let truncated = &bytes[..bytes.len() - cut];
        assert!(QueryPlan::deserialize(&STANDARD.encode(truncated)).is_err(), "cut {}", cut);
    }

    let mut padded = bytes.clone();
    padded.extend_from_slice(&[0, 0, 0, 0]);
    assert_eq!(
        QueryPlan::deserialize(&STANDARD.encode(&padded)),
        Err(PlanFormatError::TrailingBytes(4))
    );

    assert!(QueryPlan::deserialize("").is_err());
}
