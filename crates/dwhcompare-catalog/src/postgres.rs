//! PostgreSQL / Redshift data source
//!
//! Reads the catalog from `information_schema` and runs fingerprint
//! statements over the simple query protocol, so every value comes back as
//! text. Works with PostgreSQL 9.4+ and Amazon Redshift.
//!
//! ## Usage
//!
//! ```rust,ignore
//! let source = PostgresSource::from_connection_string(
//!     "host=localhost port=5432 dbname=dwh user=reader password=secret",
//!     false,
//! ).await?;
//! ```
//!
//! Without the `postgres` feature every constructor returns a configuration
//! error.

use crate::adapter::{
    CatalogFilter, CatalogReader, FetchError, ResultSet, ScalarValue, StatementRunner, WarehouseAdapter,
};
use dwhcompare_core::{CatalogRow, DataSourceAlias};

#[cfg(feature = "postgres")]
use tokio_postgres::{Client, Config as PgConfig, NoTls, SimpleQueryMessage};

#[cfg(feature = "postgres")]
use postgres_native_tls::MakeTlsConnector;

#[cfg(feature = "postgres")]
use native_tls::TlsConnector;

#[cfg(not(feature = "postgres"))]
const NOT_COMPILED: &str = "PostgreSQL support not compiled. Rebuild with: cargo build --features postgres";

/// Catalog query; tables without columns come back with NULL column fields
///
/// Filters are inlined as escaped literals so the same statement runs over
/// the simple query protocol on Redshift, which lacks array parameters.
pub fn catalog_query(filter: &CatalogFilter) -> String {
    let mut sql = String::from(
        "SELECT t.table_schema, t.table_name, c.column_name, c.data_type, c.ordinal_position \
         FROM information_schema.tables t \
         LEFT JOIN information_schema.columns c \
         ON c.table_schema = t.table_schema AND c.table_name = t.table_name \
         WHERE t.table_schema NOT IN ('information_schema', 'pg_catalog', 'pg_internal')",
    );

    let clauses = [
        ("t.table_schema", filter.schemas.clone()),
        ("t.table_name", filter.tables.clone()),
        ("UPPER(t.table_type)", normalized_table_types(filter)),
    ];
    for (expr, values) in clauses {
        if !values.is_empty() {
            let list = values
                .iter()
                .map(|v| quote_literal(v))
                .collect::<Vec<_>>()
                .join(", ");
            sql.push_str(&format!(" AND {} IN ({})", expr, list));
        }
    }

    sql.push_str(" ORDER BY t.table_schema, t.table_name, c.ordinal_position");
    sql
}

/// SQL string literal with doubled quotes
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// PostgreSQL or Redshift connection serving one data source
pub struct PostgresSource {
    #[cfg(feature = "postgres")]
    client: Client,

    /// Connection host
    host: String,

    /// Database name
    database: String,

    #[cfg(not(feature = "postgres"))]
    _phantom: std::marker::PhantomData<()>,
}

impl PostgresSource {
    /// Connect using a libpq-style connection string or URL
    #[cfg(feature = "postgres")]
    pub async fn from_connection_string(conn_str: &str, tls: bool) -> Result<Self, FetchError> {
        let config: PgConfig = conn_str
            .parse()
            .map_err(|e| FetchError::ConfigError(format!("Invalid connection string: {}", e)))?;

        let host = config
            .get_hosts()
            .first()
            .map(|h| format!("{:?}", h))
            .unwrap_or_else(|| "localhost".to_string());
        let database = config.get_dbname().unwrap_or("postgres").to_string();

        let client = if tls {
            let connector = TlsConnector::builder()
                .build()
                .map_err(|e| FetchError::ConfigError(format!("Failed to create TLS connector: {}", e)))?;

            let (client, connection) = config
                .connect(MakeTlsConnector::new(connector))
                .await
                .map_err(|e| classify(e, &format!("Failed to connect to {} with TLS", host)))?;

            let label = host.clone();
            tokio::spawn(async move {
                if let Err(e) = connection.await {
                    tracing::error!(host = %label, "PostgreSQL TLS connection error: {}", e);
                }
            });
            client
        } else {
            let (client, connection) = config
                .connect(NoTls)
                .await
                .map_err(|e| classify(e, &format!("Failed to connect to {}", host)))?;

            let label = host.clone();
            tokio::spawn(async move {
                if let Err(e) = connection.await {
                    tracing::error!(host = %label, "PostgreSQL connection error: {}", e);
                }
            });
            client
        };

        tracing::debug!(host = %host, database = %database, tls, "Connected");

        Ok(Self { client, host, database })
    }

    #[cfg(not(feature = "postgres"))]
    pub async fn from_connection_string(_conn_str: &str, _tls: bool) -> Result<Self, FetchError> {
        Err(FetchError::ConfigError(NOT_COMPILED.to_string()))
    }

    /// Get the connection host
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Get the database name
    pub fn database(&self) -> &str {
        &self.database
    }
}

/// Map a driver error onto the fetch taxonomy
#[cfg(feature = "postgres")]
fn classify(error: tokio_postgres::Error, context: &str) -> FetchError {
    let message = format!("{}: {}", context, error);

    if let Some(db) = error.as_db_error() {
        let code = db.code().code();
        if code.starts_with("28") {
            return FetchError::AuthenticationError(message);
        }
        if code == "42501" {
            return FetchError::PermissionDenied(message);
        }
        return FetchError::QueryError(message);
    }

    if error.is_closed() {
        FetchError::NetworkError(message)
    } else {
        FetchError::QueryError(message)
    }
}

/// Turn text result rows into a result set
///
/// Text columns from the simple query protocol are kept as text; SQL NULL
/// becomes [`ScalarValue::Null`].
pub fn text_rows_to_result(columns: Vec<String>, rows: Vec<Vec<Option<String>>>) -> ResultSet {
    ResultSet::new(
        columns,
        rows.into_iter()
            .map(|row| {
                row.into_iter()
                    .map(|v| v.map(ScalarValue::Text).unwrap_or(ScalarValue::Null))
                    .collect()
            })
            .collect(),
    )
}

/// Uppercased table types, matching `information_schema.tables.table_type`
pub fn normalized_table_types(filter: &CatalogFilter) -> Vec<String> {
    filter.table_types.iter().map(|t| t.to_uppercase()).collect()
}

/// Build a catalog row from nullable column fields
pub fn catalog_row(
    schema: String,
    table: String,
    column: Option<String>,
    data_type: Option<String>,
    ordinal: Option<i32>,
) -> CatalogRow {
    match (column, data_type) {
        (Some(name), Some(data_type)) => CatalogRow::column(
            schema,
            table,
            name,
            data_type,
            ordinal.and_then(|o| u32::try_from(o).ok()).unwrap_or(0),
        ),
        _ => CatalogRow::table(schema, table),
    }
}

#[async_trait::async_trait]
impl CatalogReader for PostgresSource {
    #[cfg(feature = "postgres")]
    async fn list_columns(
        &self,
        source: &DataSourceAlias,
        filter: &CatalogFilter,
    ) -> Result<Vec<CatalogRow>, FetchError> {
        let result = self.execute(source, &catalog_query(filter)).await?;

        let mut catalog = Vec::with_capacity(result.rows.len());
        for row in result.rows {
            let mut fields = row.into_iter().map(|v| v.as_text());
            let mut next = || fields.next().flatten();

            let (Some(schema), Some(table)) = (next(), next()) else {
                return Err(FetchError::InvalidResponse(
                    "Catalog row without schema or table name".to_string(),
                ));
            };
            let column = next();
            let data_type = next();
            let ordinal = next().and_then(|o| o.parse::<i32>().ok());

            catalog.push(catalog_row(schema, table, column, data_type, ordinal));
        }

        tracing::debug!(source = %source, rows = catalog.len(), "Catalog fetched");
        Ok(catalog)
    }

    #[cfg(not(feature = "postgres"))]
    async fn list_columns(
        &self,
        _source: &DataSourceAlias,
        _filter: &CatalogFilter,
    ) -> Result<Vec<CatalogRow>, FetchError> {
        Err(FetchError::ConfigError(NOT_COMPILED.to_string()))
    }
}

#[async_trait::async_trait]
impl StatementRunner for PostgresSource {
    #[cfg(feature = "postgres")]
    async fn execute(&self, source: &DataSourceAlias, sql: &str) -> Result<ResultSet, FetchError> {
        let messages = self
            .client
            .simple_query(sql)
            .await
            .map_err(|e| classify(e, &format!("Statement on {} failed", source)))?;

        let mut columns: Vec<String> = Vec::new();
        let mut rows = Vec::new();

        for message in messages {
            if let SimpleQueryMessage::Row(row) = message {
                if columns.is_empty() {
                    columns = row.columns().iter().map(|c| c.name().to_string()).collect();
                }

                let mut values = Vec::with_capacity(row.len());
                for i in 0..row.len() {
                    let value = row
                        .try_get(i)
                        .map_err(|e| FetchError::InvalidResponse(e.to_string()))?;
                    values.push(value.map(str::to_string));
                }
                rows.push(values);
            }
        }

        Ok(text_rows_to_result(columns, rows))
    }

    #[cfg(not(feature = "postgres"))]
    async fn execute(&self, _source: &DataSourceAlias, _sql: &str) -> Result<ResultSet, FetchError> {
        Err(FetchError::ConfigError(NOT_COMPILED.to_string()))
    }
}

#[async_trait::async_trait]
impl WarehouseAdapter for PostgresSource {
    fn name(&self) -> &'static str {
        "PostgreSQL"
    }

    #[cfg(feature = "postgres")]
    async fn test_connection(&self, source: &DataSourceAlias) -> Result<(), FetchError> {
        self.client
            .simple_query("SELECT 1")
            .await
            .map_err(|e| classify(e, &format!("Connection test on {} failed", source)))?;
        Ok(())
    }

    #[cfg(not(feature = "postgres"))]
    async fn test_connection(&self, _source: &DataSourceAlias) -> Result<(), FetchError> {
        Err(FetchError::ConfigError(NOT_COMPILED.to_string()))
    }
}
