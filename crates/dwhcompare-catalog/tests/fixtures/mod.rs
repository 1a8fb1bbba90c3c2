//! Test fixtures for data source integration tests
//!
//! Reusable table definitions resembling a small warehouse.

use dwhcompare_catalog::{MockTable, ResultSet, ScalarValue};

/// Orders table as stored in the `prod` schema
pub fn orders_table() -> MockTable {
    MockTable::new("prod", "orders")
        .column("id", "integer")
        .column("customer_id", "integer")
        .column("total_amount", "numeric(10,2)")
        .column("status", "character varying(32)")
        .column("created_at", "timestamp without time zone")
}

/// Customers table without any date column
pub fn customers_table() -> MockTable {
    MockTable::new("prod", "customers")
        .column("id", "integer")
        .column("email", "text")
        .column("is_active", "boolean")
}

/// View without columns
pub fn empty_view() -> MockTable {
    MockTable::new("reporting", "v_placeholder").table_type("VIEW")
}

/// One-row result of text values
pub fn text_row(columns: &[&str], values: &[&str]) -> ResultSet {
    ResultSet::new(
        columns.iter().map(|c| c.to_string()).collect(),
        vec![values.iter().map(|v| ScalarValue::Text(v.to_string())).collect()],
    )
}
