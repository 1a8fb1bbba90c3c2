//! dwhcompare core
//!
//! Data model shared by every crate: engines, windows, the
//! Type-to-Expression Catalog, catalog descriptors, the report model and
//! configuration.
//! Never rename discrepancy codes - they are part of the report format.

pub mod dialect;
pub mod window;
pub mod templates;
pub mod schema;
pub mod diagnostic;
pub mod report;
pub mod config;

pub use dialect::{DataSourceAlias, EngineKind, Side, UnknownEngine};
pub use window::{Window, WindowBounds};
pub use templates::{
    EngineTemplates, ExpressionCatalog, ExpressionTemplate, TemplateError, TemplateOverrides, TypeFamily,
};
pub use schema::{CatalogColumn, CatalogRow, ColumnDescriptor, ProfileColumn, TableDescriptor, TableProfile};
pub use diagnostic::{DiscrepancyCode, Finding, Severity};
pub use report::{
    DiscrepancyRow, Report, ReportBuilder, ReportSummary, ReportVersion, SourceSummary, TypeMismatch,
    WindowOutcome, WindowStatus,
};
pub use config::{ComparisonConfig, Config, ConfigError, RegexSubject, SourceConfig};
