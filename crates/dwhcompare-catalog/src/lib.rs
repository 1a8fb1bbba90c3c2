//! Data source collaborators for the reconciliation engine
//!
//! Two narrow interfaces, a [`CatalogReader`] listing tables and columns and
//! a [`StatementRunner`] executing SQL, combined into [`WarehouseAdapter`].
//!
//! ## Features
//!
//! - `postgres` - PostgreSQL/Redshift support via `tokio-postgres`
//!
//! [`MockSource`] is always available and can be loaded from JSON fixtures.
//!
//! ## Example
//!
//! ```rust,ignore
//! use dwhcompare_catalog::{CatalogFilter, CatalogReader, PostgresSource};
//! use dwhcompare_core::{DataSourceAlias, EngineKind};
//!
//! let source = PostgresSource::from_connection_string("host=localhost dbname=dwh", false).await?;
//! let alias = DataSourceAlias::new("dwh", EngineKind::Postgres);
//! let rows = source.list_columns(&alias, &CatalogFilter::new()).await?;
//! ```

pub mod adapter;
pub mod mock;
pub mod postgres;

pub use adapter::{
    CatalogFilter, CatalogReader, FetchError, ResultSet, ScalarValue, StatementRunner, WarehouseAdapter,
};
pub use mock::{MockColumn, MockFixture, MockSource, MockSourceBuilder, MockSourceData, MockTable, StatementRule};
pub use postgres::PostgresSource;
