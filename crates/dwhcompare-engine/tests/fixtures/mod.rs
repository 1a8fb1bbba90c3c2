//! Fixtures for reconciliation tests
//!
//! Two small warehouses: a PostgreSQL `left_db` and a Redshift `right_db`,
//! both served by one in-memory source. Fingerprints are canned per window;
//! the reference instant is 2024-03-15, so this month starts 2024-03-01 and
//! last month 2024-02-01.

#![allow(dead_code)]

use chrono::{DateTime, TimeZone, Utc};
use dwhcompare_catalog::{MockSourceBuilder, MockTable, ResultSet, ScalarValue};
use dwhcompare_core::{DataSourceAlias, EngineKind, Window};
use dwhcompare_engine::{JoinKeyRule, ReconcileOptions, SideOptions};

pub const LEFT: &str = "left_db";
pub const RIGHT: &str = "right_db";

pub fn as_of() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 15, 9, 30, 0).unwrap()
}

pub fn left_alias() -> DataSourceAlias {
    DataSourceAlias::new(LEFT, EngineKind::Postgres)
}

pub fn right_alias() -> DataSourceAlias {
    DataSourceAlias::new(RIGHT, EngineKind::Redshift)
}

/// Options with the same rule on both sides
pub fn options(rule: JoinKeyRule) -> ReconcileOptions {
    ReconcileOptions::new(
        SideOptions::new(left_alias(), rule.clone()),
        SideOptions::new(right_alias(), rule),
        as_of(),
    )
}

pub fn orders(schema: &str) -> MockTable {
    MockTable::new(schema, "orders")
        .column("id", "integer")
        .column("amount", "numeric(12,2)")
        .column("created_at", "timestamp without time zone")
}

pub fn orders_without_date(schema: &str) -> MockTable {
    MockTable::new(schema, "orders")
        .column("id", "bigint")
        .column("amount", "numeric(12,2)")
}

/// `FROM "schema"."table"` as rendered for PostgreSQL and Redshift
pub fn from(schema: &str, table: &str) -> String {
    format!("FROM \"{}\".\"{}\"", schema, table)
}

/// Needle selecting the predicate of a dated window
pub fn window_needle(window: Window) -> Option<&'static str> {
    match window {
        Window::All => None,
        Window::ThisMonth => Some(">= DATE '2024-03-01'"),
        Window::LastMonth => Some(">= DATE '2024-02-01' AND"),
        Window::BeforeLastMonth => Some("< DATE '2024-02-01'"),
    }
}

/// Fingerprint row as the database returns it: every value as text
pub fn fingerprint(row_count: i64, aggregates: &[i64], row_hash: Option<i64>) -> ResultSet {
    let mut columns = vec!["row_count".to_string()];
    let mut values = vec![ScalarValue::Text(row_count.to_string())];

    for (i, aggregate) in aggregates.iter().enumerate() {
        columns.push(format!("c{}", i));
        values.push(ScalarValue::Text(aggregate.to_string()));
    }
    if let Some(hash) = row_hash {
        columns.push("row_hash".to_string());
        values.push(ScalarValue::Text(hash.to_string()));
    }

    ResultSet::new(columns, vec![values])
}

/// One-row result of arbitrary text values
pub fn text_values(values: &[&str]) -> ResultSet {
    ResultSet::new(
        (0..values.len()).map(|i| format!("v{}", i)).collect(),
        vec![values.iter().map(|v| ScalarValue::Text(v.to_string())).collect()],
    )
}

/// Register a canned fingerprint for one table and window
pub fn with_fingerprint(
    builder: MockSourceBuilder,
    source: &str,
    table: (&str, &str),
    window: Window,
    result: ResultSet,
) -> MockSourceBuilder {
    let clause = from(table.0, table.1);
    let mut needles = vec![clause.as_str()];
    needles.extend(window_needle(window));
    builder.with_statement(source, &needles, result)
}

/// Register the same fingerprint for every window on both sides
pub fn with_identical_fingerprints(
    mut builder: MockSourceBuilder,
    left_table: (&str, &str),
    right_table: (&str, &str),
    result: ResultSet,
) -> MockSourceBuilder {
    for window in Window::ALL {
        builder = with_fingerprint(builder, LEFT, left_table, window, result.clone());
        builder = with_fingerprint(builder, RIGHT, right_table, window, result.clone());
    }
    builder
}
