//! Reconciliation Orchestrator
//!
//! Runs the schema comparison, then fingerprints every table present on both
//! sides, and merges all fragments into one [`Report`] keyed by join key.
//! Any fetch failure aborts the run; there is no partial report.

use crate::error::ReconcileError;
use crate::fingerprint::FingerprintEngine;
use crate::join_key::JoinKeyRule;
use crate::schema_comparator::{compare, SideCatalog};
use chrono::{DateTime, Utc};
use dwhcompare_catalog::{CatalogFilter, WarehouseAdapter};
use dwhcompare_core::{
    Config, DataSourceAlias, ExpressionCatalog, Report, ReportBuilder, Side, Window, WindowBounds,
};

/// Source and join-key rule of one side
#[derive(Debug, Clone)]
pub struct SideOptions {
    pub source: DataSourceAlias,
    pub rule: JoinKeyRule,
}

impl SideOptions {
    pub fn new(source: DataSourceAlias, rule: JoinKeyRule) -> Self {
        Self { source, rule }
    }
}

/// Everything a run needs, resolved up front
#[derive(Debug, Clone)]
pub struct ReconcileOptions {
    pub left: SideOptions,
    pub right: SideOptions,
    pub filter: CatalogFilter,

    /// Windows to fingerprint, evaluated in [`Window`] order
    pub windows: Vec<Window>,

    /// Reference instant for window bounds
    pub as_of: DateTime<Utc>,

    /// Copied into the report
    pub metadata: Option<serde_json::Value>,
}

impl ReconcileOptions {
    /// Unfiltered run over every window
    pub fn new(left: SideOptions, right: SideOptions, as_of: DateTime<Utc>) -> Self {
        Self {
            left,
            right,
            filter: CatalogFilter::new(),
            windows: Window::ALL.to_vec(),
            as_of,
            metadata: None,
        }
    }

    pub fn with_filter(mut self, filter: CatalogFilter) -> Self {
        self.filter = filter;
        self
    }

    pub fn with_windows(mut self, windows: impl IntoIterator<Item = Window>) -> Self {
        self.windows = windows.into_iter().collect();
        self
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Resolve options for two configured sources
    ///
    /// Uses the `[comparison]` filters, windows and schema sensitivity and
    /// each source's table regex.
    pub fn from_config(
        config: &Config,
        left: &str,
        right: &str,
        as_of: DateTime<Utc>,
    ) -> Result<Self, ReconcileError> {
        let comparison = &config.comparison;

        let side = |name: &str| -> Result<SideOptions, ReconcileError> {
            let source = config
                .source(name)
                .map_err(|e| ReconcileError::Configuration(e.to_string()))?;
            let rule = JoinKeyRule::new(
                source.table_regex.as_deref(),
                source.regex_subject,
                comparison.ignore_schema,
            )?;
            Ok(SideOptions::new(DataSourceAlias::new(name, source.engine), rule))
        };

        let filter = CatalogFilter::new()
            .with_schemas(comparison.schemas.iter().cloned())
            .with_tables(comparison.tables.iter().cloned())
            .with_table_types(comparison.table_types.iter().cloned());

        Ok(Self::new(side(left)?, side(right)?, as_of)
            .with_filter(filter)
            .with_windows(comparison.windows.iter().copied()))
    }
}

/// Runs reconciliations against one template catalog
#[derive(Debug, Clone)]
pub struct Reconciler {
    catalog: ExpressionCatalog,
}

impl Reconciler {
    pub fn new(catalog: ExpressionCatalog) -> Self {
        Self { catalog }
    }

    /// Built-in templates merged with the config's overrides
    pub fn from_config(config: &Config) -> Result<Self, ReconcileError> {
        let overrides = config
            .template_overrides()
            .map_err(|e| ReconcileError::Configuration(e.to_string()))?;
        Ok(Self::new(ExpressionCatalog::builtin().with_overrides(&overrides)?))
    }

    pub fn catalog(&self) -> &ExpressionCatalog {
        &self.catalog
    }

    /// Run a full reconciliation
    ///
    /// Every call to a source is awaited in turn: left catalog, right
    /// catalog, then per table and window the left and right fingerprints.
    pub async fn run<L, R>(&self, options: &ReconcileOptions, left: &L, right: &R) -> Result<Report, ReconcileError>
    where
        L: WarehouseAdapter + ?Sized,
        R: WarehouseAdapter + ?Sized,
    {
        let left_source = &options.left.source;
        let right_source = &options.right.source;

        if options.windows.is_empty() {
            return Err(ReconcileError::Configuration("No windows to compare".to_string()));
        }
        let mut windows = options.windows.clone();
        windows.sort();
        windows.dedup();

        self.catalog
            .validate_for(&[left_source.engine, right_source.engine])?;

        tracing::info!(left = %left_source, right = %right_source, as_of = %options.as_of, "Starting reconciliation");

        let left_catalog = SideCatalog::fetch(
            Side::Left,
            left,
            left_source,
            &options.filter,
            &options.left.rule,
            &self.catalog,
        )
        .await?;
        let right_catalog = SideCatalog::fetch(
            Side::Right,
            right,
            right_source,
            &options.filter,
            &options.right.rule,
            &self.catalog,
        )
        .await?;

        tracing::info!(
            left_tables = left_catalog.tables.len(),
            right_tables = right_catalog.tables.len(),
            "Catalogs fetched"
        );

        let comparison = compare(&left_catalog, &right_catalog)?;
        let mut builder = ReportBuilder::new();
        comparison.record(&mut builder);

        let pairs = comparison.table_pairs();
        tracing::info!(
            tables = pairs.len(),
            only_left = comparison.tables.left_only.len(),
            only_right = comparison.tables.right_only.len(),
            "Schema compared"
        );

        let engine = FingerprintEngine::new(&self.catalog, WindowBounds::from_as_of(options.as_of));
        for pair in &pairs {
            let outcomes = engine
                .compare_table(left, left_source, right, right_source, pair, &windows)
                .await?;
            for outcome in outcomes {
                builder.window(&pair.join_key, outcome);
            }
        }

        if let Some(metadata) = &options.metadata {
            builder.metadata(metadata.clone());
        }

        let report = builder.build(options.as_of, left_catalog.summary(), right_catalog.summary());

        tracing::info!(
            rows = report.rows.len(),
            discrepant = report.summary.discrepant_tables,
            "Reconciliation finished"
        );

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use dwhcompare_core::EngineKind;

    const CONFIG: &str = r#"
[sources.legacy]
engine = "postgres"
connection = "host=localhost"
table_regex = '^legacy\.(.*)$'
regex_subject = "qualified"

[sources.dwh]
engine = "redshift"
connection_env = "DWH_URL"

[comparison]
left = "legacy"
right = "dwh"
ignore_schema = true
schemas = ["legacy", "public"]
windows = ["all", "last_month"]
"#;

    #[test]
    fn options_from_config() {
        let config = Config::from_toml(CONFIG).unwrap();
        let as_of = Utc.with_ymd_and_hms(2024, 3, 15, 0, 0, 0).unwrap();

        let options = ReconcileOptions::from_config(&config, "legacy", "dwh", as_of).unwrap();

        assert_eq!(options.left.source, DataSourceAlias::new("legacy", EngineKind::Postgres));
        assert_eq!(options.right.source.engine, EngineKind::Redshift);
        assert_eq!(options.left.rule.normalize("legacy", "orders").unwrap(), "orders");
        assert_eq!(options.right.rule.normalize("public", "orders").unwrap(), "orders");
        assert_eq!(options.filter.schemas, vec!["legacy".to_string(), "public".to_string()]);
        assert_eq!(options.windows, vec![Window::All, Window::LastMonth]);
    }

    #[test]
    fn unknown_source_is_configuration_error() {
        let config = Config::from_toml(CONFIG).unwrap();
        let err = ReconcileOptions::from_config(&config, "legacy", "nope", Utc::now()).unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn reconciler_applies_overrides() {
        let config = Config::from_toml(
            r#"
[templates.postgres.types]
geometry = "text"
"#,
        )
        .unwrap();

        let reconciler = Reconciler::from_config(&config).unwrap();
        assert!(reconciler
            .catalog()
            .family_of(EngineKind::Postgres, "geometry")
            .is_ok());
    }
}
