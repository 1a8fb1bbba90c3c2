//! Collaborator traits for reading catalogs and running statements

use dwhcompare_core::{CatalogRow, DataSourceAlias};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Restricts what a catalog read returns
///
/// Every list is optional; empty means unrestricted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogFilter {
    /// Schema names
    #[serde(default)]
    pub schemas: Vec<String>,

    /// Table names
    #[serde(default)]
    pub tables: Vec<String>,

    /// Table types such as `BASE TABLE` or `VIEW`
    #[serde(default)]
    pub table_types: Vec<String>,
}

impl CatalogFilter {
    /// Unrestricted filter
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_schemas<I, S>(mut self, schemas: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.schemas = schemas.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_tables<I, S>(mut self, tables: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tables = tables.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_table_types<I, S>(mut self, table_types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.table_types = table_types.into_iter().map(Into::into).collect();
        self
    }

    pub fn is_unrestricted(&self) -> bool {
        self.schemas.is_empty() && self.tables.is_empty() && self.table_types.is_empty()
    }

    /// Whether a table passes the filter
    ///
    /// Table types compare case-insensitively.
    pub fn matches(&self, schema: &str, table: &str, table_type: &str) -> bool {
        (self.schemas.is_empty() || self.schemas.iter().any(|s| s == schema))
            && (self.tables.is_empty() || self.tables.iter().any(|t| t == table))
            && (self.table_types.is_empty()
                || self
                    .table_types
                    .iter()
                    .any(|t| t.eq_ignore_ascii_case(table_type)))
    }
}

/// Single value returned by a statement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ScalarValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl ScalarValue {
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Integer view of the value
    ///
    /// Text is parsed, so aggregates rendered as text by the database keep
    /// their full precision. Floats convert only when integral.
    pub fn as_i128(&self) -> Option<i128> {
        match self {
            Self::Null => None,
            Self::Bool(b) => Some(i128::from(*b)),
            Self::Int(i) => Some(i128::from(*i)),
            Self::Float(f) if f.fract() == 0.0 && f.is_finite() => Some(*f as i128),
            Self::Float(_) => None,
            Self::Text(s) => {
                let s = s.trim();
                s.parse::<i128>().ok().or_else(|| {
                    // NUMERIC sums may come back as `123.000`
                    let (whole, fraction) = s.split_once('.')?;
                    if fraction.chars().all(|c| c == '0') {
                        whole.parse::<i128>().ok()
                    } else {
                        None
                    }
                })
            }
        }
    }

    pub fn as_text(&self) -> Option<String> {
        match self {
            Self::Null => None,
            Self::Bool(b) => Some(b.to_string()),
            Self::Int(i) => Some(i.to_string()),
            Self::Float(f) => Some(f.to_string()),
            Self::Text(s) => Some(s.clone()),
        }
    }
}

impl fmt::Display for ScalarValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "NULL"),
            Self::Bool(b) => write!(f, "{}", b),
            Self::Int(i) => write!(f, "{}", i),
            Self::Float(x) => write!(f, "{}", x),
            Self::Text(s) => write!(f, "{}", s),
        }
    }
}

/// Tabular statement result
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResultSet {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<ScalarValue>>,
}

impl ResultSet {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<ScalarValue>>) -> Self {
        Self { columns, rows }
    }

    /// First column of the first row
    pub fn scalar(&self) -> Result<ScalarValue, FetchError> {
        self.rows
            .first()
            .and_then(|row| row.first())
            .cloned()
            .ok_or_else(|| FetchError::InvalidResponse("Statement returned no rows".to_string()))
    }

    /// The only row of the result
    pub fn single_row(&self) -> Result<&[ScalarValue], FetchError> {
        match self.rows.as_slice() {
            [row] => Ok(row),
            rows => Err(FetchError::InvalidResponse(format!(
                "Expected exactly one row, got {}",
                rows.len()
            ))),
        }
    }
}

/// Errors that can occur when talking to a data source
#[derive(Debug, Clone, thiserror::Error)]
pub enum FetchError {
    #[error("Authentication failed: {0}")]
    AuthenticationError(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Query failed: {0}")]
    QueryError(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

/// Lists tables and columns of a data source
#[async_trait::async_trait]
pub trait CatalogReader: Send + Sync {
    /// All `(schema, table, column, data_type)` tuples passing the filter
    ///
    /// System schemas are never returned. Tables without columns appear as
    /// a row without a column.
    async fn list_columns(
        &self,
        source: &DataSourceAlias,
        filter: &CatalogFilter,
    ) -> Result<Vec<CatalogRow>, FetchError>;
}

/// Runs SQL statements against a data source
#[async_trait::async_trait]
pub trait StatementRunner: Send + Sync {
    /// Execute a statement and return every row
    async fn execute(&self, source: &DataSourceAlias, sql: &str) -> Result<ResultSet, FetchError>;

    /// Execute a statement and return the first column of the first row
    async fn execute_scalar(&self, source: &DataSourceAlias, sql: &str) -> Result<ScalarValue, FetchError> {
        self.execute(source, sql).await?.scalar()
    }
}

/// A data source the reconciliation engine can read from
#[async_trait::async_trait]
pub trait WarehouseAdapter: CatalogReader + StatementRunner {
    /// Get the adapter name (e.g., "PostgreSQL", "Mock")
    fn name(&self) -> &'static str;

    /// Test the connection for a source
    async fn test_connection(&self, source: &DataSourceAlias) -> Result<(), FetchError>;
}
