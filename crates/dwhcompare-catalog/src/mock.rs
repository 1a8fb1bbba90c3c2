//! In-memory data source for testing
//!
//! Serves predefined catalogs and statement results without connecting to
//! anything. It's useful for:
//! - Unit testing the reconciliation engine
//! - CLI demos without real credentials (via JSON fixtures)
//! - Simulating catalog and statement failures
//!
//! ## Usage
//!
//! ```rust,ignore
//! use dwhcompare_catalog::{MockSourceBuilder, MockTable, ResultSet};
//!
//! let source = MockSourceBuilder::new()
//!     .with_table("left_db", MockTable::new("prod", "orders").column("id", "integer"))
//!     .with_statement("left_db", &["\"prod\".\"orders\""], ResultSet::default())
//!     .build();
//! ```
//!
//! Statements are matched by substring: among the rules of a source whose
//! needles all occur in the SQL, the one with the most needles wins, ties
//! going to the rule registered first.

use crate::adapter::{
    CatalogFilter, CatalogReader, FetchError, ResultSet, ScalarValue, StatementRunner, WarehouseAdapter,
};
use dwhcompare_core::{CatalogRow, DataSourceAlias};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::RwLock;

fn default_table_type() -> String {
    "BASE TABLE".to_string()
}

/// Column of a mock table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MockColumn {
    pub name: String,
    pub data_type: String,
}

/// Table served by the mock catalog
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MockTable {
    pub schema: String,
    pub name: String,

    #[serde(default = "default_table_type")]
    pub table_type: String,

    /// Columns in ordinal order
    #[serde(default)]
    pub columns: Vec<MockColumn>,
}

impl MockTable {
    pub fn new(schema: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            name: name.into(),
            table_type: default_table_type(),
            columns: Vec::new(),
        }
    }

    /// Append a column
    pub fn column(mut self, name: impl Into<String>, data_type: impl Into<String>) -> Self {
        self.columns.push(MockColumn {
            name: name.into(),
            data_type: data_type.into(),
        });
        self
    }

    pub fn table_type(mut self, table_type: impl Into<String>) -> Self {
        self.table_type = table_type.into();
        self
    }

    fn catalog_rows(&self) -> Vec<CatalogRow> {
        if self.columns.is_empty() {
            return vec![CatalogRow::table(&self.schema, &self.name)];
        }

        self.columns
            .iter()
            .zip(1u32..)
            .map(|(column, ordinal)| {
                CatalogRow::column(&self.schema, &self.name, &column.name, &column.data_type, ordinal)
            })
            .collect()
    }
}

/// Canned result for statements containing every needle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatementRule {
    pub contains: Vec<String>,

    #[serde(default)]
    pub columns: Vec<String>,

    #[serde(default)]
    pub rows: Vec<Vec<ScalarValue>>,
}

impl StatementRule {
    fn matches(&self, sql: &str) -> bool {
        self.contains.iter().all(|needle| sql.contains(needle.as_str()))
    }

    fn result(&self) -> ResultSet {
        ResultSet::new(self.columns.clone(), self.rows.clone())
    }
}

/// Everything the mock serves for one source
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MockSourceData {
    #[serde(default)]
    pub tables: Vec<MockTable>,

    #[serde(default)]
    pub statements: Vec<StatementRule>,
}

/// JSON fixture: source name to data
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MockFixture {
    #[serde(default)]
    pub sources: BTreeMap<String, MockSourceData>,
}

/// Statement recorded by the mock
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedStatement {
    pub source: String,
    pub sql: String,
}

/// Mock data source for testing
///
/// Clones share state, so one instance can serve both sides of a comparison
/// while tests inspect the statement log.
#[derive(Clone)]
pub struct MockSource {
    /// Catalog and statement rules by source name
    data: Arc<RwLock<HashMap<String, MockSourceData>>>,

    /// Catalog errors by source name
    catalog_errors: Arc<RwLock<HashMap<String, FetchError>>>,

    /// Statement errors by source name
    statement_errors: Arc<RwLock<HashMap<String, FetchError>>>,

    /// Every statement executed, in order
    log: Arc<RwLock<Vec<RecordedStatement>>>,

    /// Simulate connection failure
    fail_connection: bool,

    /// Simulate query latency (milliseconds)
    latency_ms: u64,
}

impl MockSource {
    /// Create a new mock source with no data
    pub fn new() -> Self {
        Self::from_data(HashMap::new())
    }

    fn from_data(data: HashMap<String, MockSourceData>) -> Self {
        Self {
            data: Arc::new(RwLock::new(data)),
            catalog_errors: Arc::new(RwLock::new(HashMap::new())),
            statement_errors: Arc::new(RwLock::new(HashMap::new())),
            log: Arc::new(RwLock::new(Vec::new())),
            fail_connection: false,
            latency_ms: 0,
        }
    }

    /// Create a mock source from a parsed fixture
    pub fn from_fixture(fixture: MockFixture) -> Self {
        Self::from_data(fixture.sources.into_iter().collect())
    }

    /// Load a JSON fixture file
    pub fn from_fixture_file(path: &Path) -> Result<Self, FetchError> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            FetchError::ConfigError(format!("Cannot read fixture {}: {}", path.display(), e))
        })?;
        let fixture: MockFixture = serde_json::from_str(&contents).map_err(|e| {
            FetchError::ConfigError(format!("Invalid fixture {}: {}", path.display(), e))
        })?;
        Ok(Self::from_fixture(fixture))
    }

    /// Add a table to a source's catalog
    pub async fn add_table(&self, source: &str, table: MockTable) {
        self.data
            .write()
            .await
            .entry(source.to_string())
            .or_default()
            .tables
            .push(table);
    }

    /// Add a statement rule to a source
    pub async fn add_statement(&self, source: &str, rule: StatementRule) {
        self.data
            .write()
            .await
            .entry(source.to_string())
            .or_default()
            .statements
            .push(rule);
    }

    /// Fail catalog reads for a source
    pub async fn add_catalog_error(&self, source: &str, error: FetchError) {
        self.catalog_errors.write().await.insert(source.to_string(), error);
    }

    /// Fail every statement for a source
    pub async fn add_statement_error(&self, source: &str, error: FetchError) {
        self.statement_errors.write().await.insert(source.to_string(), error);
    }

    /// Configure to fail all connection tests
    pub fn with_connection_failure(mut self) -> Self {
        self.fail_connection = true;
        self
    }

    /// Configure simulated latency for all operations
    pub fn with_latency(mut self, latency_ms: u64) -> Self {
        self.latency_ms = latency_ms;
        self
    }

    /// Statements executed so far
    pub async fn statements(&self) -> Vec<RecordedStatement> {
        self.log.read().await.clone()
    }

    /// Statements executed so far against one source
    pub async fn statements_for(&self, source: &str) -> Vec<String> {
        self.log
            .read()
            .await
            .iter()
            .filter(|s| s.source == source)
            .map(|s| s.sql.clone())
            .collect()
    }

    /// Names of the sources with data
    pub async fn source_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.data.read().await.keys().cloned().collect();
        names.sort();
        names
    }

    async fn simulate_latency(&self) {
        if self.latency_ms > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(self.latency_ms)).await;
        }
    }
}

impl Default for MockSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl CatalogReader for MockSource {
    async fn list_columns(
        &self,
        source: &DataSourceAlias,
        filter: &CatalogFilter,
    ) -> Result<Vec<CatalogRow>, FetchError> {
        self.simulate_latency().await;

        if let Some(error) = self.catalog_errors.read().await.get(&source.name) {
            return Err(error.clone());
        }

        let data = self.data.read().await;
        let tables = data
            .get(&source.name)
            .ok_or_else(|| FetchError::ConfigError(format!("Unknown mock source '{}'", source.name)))?;

        Ok(tables
            .tables
            .iter()
            .filter(|t| filter.matches(&t.schema, &t.name, &t.table_type))
            .flat_map(MockTable::catalog_rows)
            .collect())
    }
}

#[async_trait::async_trait]
impl StatementRunner for MockSource {
    async fn execute(&self, source: &DataSourceAlias, sql: &str) -> Result<ResultSet, FetchError> {
        self.simulate_latency().await;

        self.log.write().await.push(RecordedStatement {
            source: source.name.clone(),
            sql: sql.to_string(),
        });

        if let Some(error) = self.statement_errors.read().await.get(&source.name) {
            return Err(error.clone());
        }

        let data = self.data.read().await;
        let rules = data
            .get(&source.name)
            .map(|d| d.statements.as_slice())
            .unwrap_or_default();

        // max_by_key keeps the last maximum, so scan in reverse for first-wins ties
        rules
            .iter()
            .rev()
            .filter(|rule| rule.matches(sql))
            .max_by_key(|rule| rule.contains.len())
            .map(StatementRule::result)
            .ok_or_else(|| {
                FetchError::QueryError(format!("No mock result on '{}' for statement: {}", source.name, sql))
            })
    }
}

#[async_trait::async_trait]
impl WarehouseAdapter for MockSource {
    fn name(&self) -> &'static str {
        "Mock"
    }

    async fn test_connection(&self, source: &DataSourceAlias) -> Result<(), FetchError> {
        self.simulate_latency().await;

        if self.fail_connection {
            return Err(FetchError::NetworkError("Simulated connection failure".to_string()));
        }

        if self.data.read().await.contains_key(&source.name) {
            Ok(())
        } else {
            Err(FetchError::ConfigError(format!("Unknown mock source '{}'", source.name)))
        }
    }
}

/// Builder for creating a MockSource
pub struct MockSourceBuilder {
    data: HashMap<String, MockSourceData>,
    catalog_errors: HashMap<String, FetchError>,
    statement_errors: HashMap<String, FetchError>,
    fail_connection: bool,
    latency_ms: u64,
}

impl MockSourceBuilder {
    pub fn new() -> Self {
        Self {
            data: HashMap::new(),
            catalog_errors: HashMap::new(),
            statement_errors: HashMap::new(),
            fail_connection: false,
            latency_ms: 0,
        }
    }

    /// Add a table to a source
    pub fn with_table(mut self, source: &str, table: MockTable) -> Self {
        self.data.entry(source.to_string()).or_default().tables.push(table);
        self
    }

    /// Add a statement rule to a source
    pub fn with_statement(mut self, source: &str, contains: &[&str], result: ResultSet) -> Self {
        self.data
            .entry(source.to_string())
            .or_default()
            .statements
            .push(StatementRule {
                contains: contains.iter().map(|s| s.to_string()).collect(),
                columns: result.columns,
                rows: result.rows,
            });
        self
    }

    pub fn with_catalog_error(mut self, source: &str, error: FetchError) -> Self {
        self.catalog_errors.insert(source.to_string(), error);
        self
    }

    pub fn with_statement_error(mut self, source: &str, error: FetchError) -> Self {
        self.statement_errors.insert(source.to_string(), error);
        self
    }

    pub fn with_connection_failure(mut self) -> Self {
        self.fail_connection = true;
        self
    }

    pub fn with_latency(mut self, latency_ms: u64) -> Self {
        self.latency_ms = latency_ms;
        self
    }

    pub fn build(self) -> MockSource {
        MockSource {
            data: Arc::new(RwLock::new(self.data)),
            catalog_errors: Arc::new(RwLock::new(self.catalog_errors)),
            statement_errors: Arc::new(RwLock::new(self.statement_errors)),
            log: Arc::new(RwLock::new(Vec::new())),
            fail_connection: self.fail_connection,
            latency_ms: self.latency_ms,
        }
    }
}

impl Default for MockSourceBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dwhcompare_core::EngineKind;

    fn alias(name: &str) -> DataSourceAlias {
        DataSourceAlias::new(name, EngineKind::Postgres)
    }

    fn one_value(value: i64) -> ResultSet {
        ResultSet::new(vec!["v".into()], vec![vec![ScalarValue::Int(value)]])
    }

    #[tokio::test]
    async fn catalog_rows_with_ordinals() {
        let source = MockSourceBuilder::new()
            .with_table("db", MockTable::new("gold", "orders").column("id", "integer").column("total", "numeric"))
            .with_table("db", MockTable::new("gold", "empty_view").table_type("VIEW"))
            .build();

        let rows = source.list_columns(&alias("db"), &CatalogFilter::new()).await.unwrap();

        assert_eq!(rows.len(), 3);
        assert_eq!(rows[1].column.as_ref().unwrap().ordinal, 2);
        assert_eq!(rows[2], CatalogRow::table("gold", "empty_view"));
    }

    #[tokio::test]
    async fn catalog_filter_applies() {
        let source = MockSourceBuilder::new()
            .with_table("db", MockTable::new("gold", "orders").column("id", "integer"))
            .with_table("db", MockTable::new("gold", "v_orders").table_type("VIEW").column("id", "integer"))
            .with_table("db", MockTable::new("silver", "orders").column("id", "integer"))
            .build();

        let filter = CatalogFilter::new().with_schemas(["gold"]).with_table_types(["BASE TABLE"]);
        let rows = source.list_columns(&alias("db"), &filter).await.unwrap();

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].table, "orders");
        assert_eq!(rows[0].schema, "gold");
    }

    #[tokio::test]
    async fn unknown_source_is_an_error() {
        let source = MockSource::new();
        let result = source.list_columns(&alias("nope"), &CatalogFilter::new()).await;
        assert!(matches!(result, Err(FetchError::ConfigError(_))));
    }

    #[tokio::test]
    async fn most_specific_rule_wins() {
        let source = MockSourceBuilder::new()
            .with_statement("db", &["orders"], one_value(1))
            .with_statement("db", &["orders", "WHERE"], one_value(2))
            .with_statement("db", &["orders", "LIMIT"], one_value(3))
            .build();

        let db = alias("db");
        assert_eq!(
            source.execute_scalar(&db, "SELECT 1 FROM orders").await.unwrap(),
            ScalarValue::Int(1)
        );
        assert_eq!(
            source.execute_scalar(&db, "SELECT 1 FROM orders WHERE x").await.unwrap(),
            ScalarValue::Int(2)
        );
        assert_eq!(
            source.execute_scalar(&db, "SELECT 1 FROM orders WHERE x LIMIT 1").await.unwrap(),
            ScalarValue::Int(2)
        );
        assert!(source.execute(&db, "SELECT 1 FROM users").await.is_err());
        assert_eq!(source.statements_for("db").await.len(), 4);
    }

    #[tokio::test]
    async fn configured_errors() {
        let source = MockSourceBuilder::new()
            .with_table("db", MockTable::new("s", "t"))
            .with_catalog_error("db", FetchError::PermissionDenied("no".into()))
            .with_statement_error("db", FetchError::NetworkError("down".into()))
            .build();

        let db = alias("db");
        assert!(matches!(
            source.list_columns(&db, &CatalogFilter::new()).await,
            Err(FetchError::PermissionDenied(_))
        ));
        assert!(matches!(source.execute(&db, "SELECT 1").await, Err(FetchError::NetworkError(_))));
    }

    #[tokio::test]
    async fn connection_checks() {
        let source = MockSourceBuilder::new().with_table("db", MockTable::new("s", "t")).build();
        assert!(source.test_connection(&alias("db")).await.is_ok());
        assert!(source.test_connection(&alias("other")).await.is_err());

        let failing = source.clone().with_connection_failure();
        assert!(matches!(
            failing.test_connection(&alias("db")).await,
            Err(FetchError::NetworkError(_))
        ));
    }

    #[tokio::test]
    async fn clones_share_state() {
        let source = MockSource::new();
        let cloned = source.clone();

        cloned.add_table("db", MockTable::new("s", "t")).await;
        cloned
            .add_statement(
                "db",
                StatementRule {
                    contains: vec!["t".into()],
                    columns: vec!["n".into()],
                    rows: vec![vec![ScalarValue::Text("7".into())]],
                },
            )
            .await;

        assert_eq!(source.source_names().await, vec!["db".to_string()]);
        let value = source.execute_scalar(&alias("db"), "SELECT n FROM t").await.unwrap();
        assert_eq!(value.as_i128(), Some(7));
        assert_eq!(cloned.statements().await.len(), 1);
    }

    #[test]
    fn fixture_parsing() {
        let fixture: MockFixture = serde_json::from_str(
            r#"{
                "sources": {
                    "left_db": {
                        "tables": [
                            {"schema": "gold", "name": "orders", "columns": [{"name": "id", "data_type": "integer"}]}
                        ],
                        "statements": [
                            {"contains": ["orders"], "columns": ["row_count"], "rows": [["10"]]}
                        ]
                    }
                }
            }"#,
        )
        .unwrap();

        let data = &fixture.sources["left_db"];
        assert_eq!(data.tables[0].table_type, "BASE TABLE");
        assert_eq!(data.statements[0].rows[0][0], ScalarValue::Text("10".into()));
    }
}
