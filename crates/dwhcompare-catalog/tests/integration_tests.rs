//! Integration tests for data sources
//!
//! Tests requiring a live database are marked with `#[ignore]` and can be
//! run with `cargo test -- --ignored`.
//!
//! ## Running Tests
//!
//! ```bash
//! # Run all non-ignored tests (no credentials required)
//! cargo test -p dwhcompare-catalog --test integration_tests
//!
//! # Run PostgreSQL integration tests
//! DWHCOMPARE_TEST_PG="host=localhost dbname=dwh user=reader password=secret" \
//! cargo test -p dwhcompare-catalog --features postgres --test integration_tests -- --ignored
//! ```

mod fixtures;

use dwhcompare_catalog::{
    CatalogFilter, CatalogReader, FetchError, MockSource, MockSourceBuilder, ScalarValue, StatementRunner,
    WarehouseAdapter,
};
use dwhcompare_core::{CatalogRow, DataSourceAlias, EngineKind};
use pretty_assertions::assert_eq;

fn postgres_alias(name: &str) -> DataSourceAlias {
    DataSourceAlias::new(name, EngineKind::Postgres)
}

// =============================================================================
// Mock Source Tests (No credentials required)
// =============================================================================

#[tokio::test]
async fn test_mock_catalog_workflow() {
    let source = MockSourceBuilder::new()
        .with_table("dwh", fixtures::orders_table())
        .with_table("dwh", fixtures::customers_table())
        .with_table("dwh", fixtures::empty_view())
        .build();

    let rows = source
        .list_columns(&postgres_alias("dwh"), &CatalogFilter::new())
        .await
        .unwrap();

    assert_eq!(rows.len(), 9);
    assert_eq!(
        rows[0],
        CatalogRow::column("prod", "orders", "id", "integer", 1)
    );
    assert_eq!(rows[8], CatalogRow::table("reporting", "v_placeholder"));
}

#[tokio::test]
async fn test_mock_catalog_filters_combine() {
    let source = MockSourceBuilder::new()
        .with_table("dwh", fixtures::orders_table())
        .with_table("dwh", fixtures::customers_table())
        .with_table("dwh", fixtures::empty_view())
        .build();

    let views = source
        .list_columns(
            &postgres_alias("dwh"),
            &CatalogFilter::new().with_table_types(["VIEW"]),
        )
        .await
        .unwrap();
    assert_eq!(views, vec![CatalogRow::table("reporting", "v_placeholder")]);

    let customers = source
        .list_columns(
            &postgres_alias("dwh"),
            &CatalogFilter::new().with_schemas(["prod"]).with_tables(["customers"]),
        )
        .await
        .unwrap();
    assert_eq!(customers.len(), 3);
    assert!(customers.iter().all(|r| r.table == "customers"));
}

#[tokio::test]
async fn test_mock_sources_are_isolated() {
    let source = MockSourceBuilder::new()
        .with_table("left", fixtures::orders_table())
        .with_table("right", fixtures::customers_table())
        .with_statement("left", &["orders"], fixtures::text_row(&["n"], &["5"]))
        .build();

    let right_rows = source
        .list_columns(&postgres_alias("right"), &CatalogFilter::new())
        .await
        .unwrap();
    assert!(right_rows.iter().all(|r| r.table == "customers"));

    let left_value = source
        .execute_scalar(&postgres_alias("left"), "SELECT COUNT(*) FROM orders")
        .await
        .unwrap();
    assert_eq!(left_value, ScalarValue::Text("5".into()));

    let right_result = source
        .execute(&postgres_alias("right"), "SELECT COUNT(*) FROM orders")
        .await;
    assert!(matches!(right_result, Err(FetchError::QueryError(_))));
}

#[tokio::test]
async fn test_mock_statement_log_order() {
    let source = MockSourceBuilder::new()
        .with_statement("a", &["SELECT"], fixtures::text_row(&["x"], &["1"]))
        .with_statement("b", &["SELECT"], fixtures::text_row(&["x"], &["2"]))
        .build();

    source.execute(&postgres_alias("a"), "SELECT 1").await.unwrap();
    source.execute(&postgres_alias("b"), "SELECT 2").await.unwrap();
    source.execute(&postgres_alias("a"), "SELECT 3").await.unwrap();

    let log: Vec<(String, String)> = source
        .statements()
        .await
        .into_iter()
        .map(|s| (s.source, s.sql))
        .collect();

    assert_eq!(
        log,
        vec![
            ("a".to_string(), "SELECT 1".to_string()),
            ("b".to_string(), "SELECT 2".to_string()),
            ("a".to_string(), "SELECT 3".to_string()),
        ]
    );
}

#[tokio::test]
async fn test_mock_latency_simulation() {
    let source = MockSourceBuilder::new()
        .with_table("dwh", fixtures::customers_table())
        .with_latency(20)
        .build();

    let start = std::time::Instant::now();
    source.test_connection(&postgres_alias("dwh")).await.unwrap();
    assert!(start.elapsed() >= std::time::Duration::from_millis(20));
}

#[tokio::test]
async fn test_mock_from_fixture_file() {
    let dir = std::env::temp_dir().join(format!("dwhcompare-fixture-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join("fixture.json");
    std::fs::write(
        &path,
        r#"{
            "sources": {
                "dwh": {
                    "tables": [
                        {"schema": "gold", "name": "events", "columns": [
                            {"name": "id", "data_type": "bigint"},
                            {"name": "happened_on", "data_type": "date"}
                        ]}
                    ],
                    "statements": [
                        {"contains": ["\"gold\".\"events\""], "columns": ["row_count"], "rows": [[42]]}
                    ]
                }
            }
        }"#,
    )
    .unwrap();

    let source = MockSource::from_fixture_file(&path).unwrap();
    let rows = source
        .list_columns(&postgres_alias("dwh"), &CatalogFilter::new())
        .await
        .unwrap();
    assert_eq!(rows.len(), 2);

    let count = source
        .execute_scalar(&postgres_alias("dwh"), "SELECT COUNT(*) FROM \"gold\".\"events\"")
        .await
        .unwrap();
    assert_eq!(count.as_i128(), Some(42));

    std::fs::remove_dir_all(&dir).ok();
}

#[tokio::test]
async fn test_mock_fixture_file_errors() {
    let missing = MockSource::from_fixture_file(std::path::Path::new("/nonexistent/fixture.json"));
    assert!(matches!(missing, Err(FetchError::ConfigError(_))));
}

#[tokio::test]
async fn test_adapter_as_trait_object() {
    let source = MockSourceBuilder::new()
        .with_table("dwh", fixtures::customers_table())
        .build();
    let adapter: &dyn WarehouseAdapter = &source;

    assert_eq!(adapter.name(), "Mock");
    assert!(adapter.test_connection(&postgres_alias("dwh")).await.is_ok());
    let rows = adapter
        .list_columns(&postgres_alias("dwh"), &CatalogFilter::new())
        .await
        .unwrap();
    assert_eq!(rows.len(), 3);
}

// =============================================================================
// PostgreSQL Tests (credentials required)
// =============================================================================

#[tokio::test]
#[ignore]
async fn test_postgres_catalog_and_statement() {
    let Ok(conn_str) = std::env::var("DWHCOMPARE_TEST_PG") else {
        eprintln!("Skipping PostgreSQL test: set DWHCOMPARE_TEST_PG");
        return;
    };

    #[cfg(feature = "postgres")]
    {
        use dwhcompare_catalog::PostgresSource;

        let source = PostgresSource::from_connection_string(&conn_str, false)
            .await
            .expect("Failed to connect");
        let alias = postgres_alias("live");

        source.test_connection(&alias).await.expect("Connection test failed");

        let rows = source
            .list_columns(&alias, &CatalogFilter::new())
            .await
            .expect("Catalog query failed");
        assert!(rows
            .iter()
            .all(|r| r.schema != "pg_catalog" && r.schema != "information_schema"));

        let value = source
            .execute_scalar(&alias, "SELECT CAST(COUNT(*) AS TEXT) FROM (VALUES (1), (2)) v(x)")
            .await
            .expect("Statement failed");
        assert_eq!(value.as_i128(), Some(2));
    }

    #[cfg(not(feature = "postgres"))]
    {
        let _ = conn_str;
        eprintln!("PostgreSQL feature not enabled. Rebuild with --features postgres");
    }
}
