//! Schema Comparator
//!
//! Forward-only pipeline: fetch each side, derive tables, reconcile tables,
//! prune columns to tables present on both sides, reconcile columns. Every
//! stage takes its input by reference and returns a new value.

use crate::error::ReconcileError;
use crate::join_key::{assign_join_keys, JoinKeyRule};
use crate::set_reconciler::{reconcile, Matched, Reconciliation};
use dwhcompare_catalog::{CatalogFilter, CatalogReader};
use dwhcompare_core::{
    CatalogRow, ColumnDescriptor, DataSourceAlias, ExpressionCatalog, ReportBuilder, Side,
    SourceSummary, TableDescriptor, TableProfile, TemplateError, TypeMismatch,
};
use std::collections::{BTreeMap, BTreeSet};

/// Everything read from one side
#[derive(Debug, Clone, PartialEq)]
pub struct SideCatalog {
    pub side: Side,
    pub source: DataSourceAlias,

    /// Ordered by join key
    pub tables: Vec<TableDescriptor>,

    pub columns: Vec<ColumnDescriptor>,
}

impl SideCatalog {
    /// Fetch and describe one side
    pub async fn fetch<R>(
        side: Side,
        reader: &R,
        source: &DataSourceAlias,
        filter: &CatalogFilter,
        rule: &JoinKeyRule,
        catalog: &ExpressionCatalog,
    ) -> Result<Self, ReconcileError>
    where
        R: CatalogReader + ?Sized,
    {
        let rows = reader
            .list_columns(source, filter)
            .await
            .map_err(|source| ReconcileError::SourceUnavailable { side, source })?;

        tracing::debug!(side = %side, source = %source, rows = rows.len(), "Catalog rows received");

        Self::build(side, source.clone(), rows, rule, catalog)
    }

    /// Describe one side from catalog rows
    pub fn build(
        side: Side,
        source: DataSourceAlias,
        rows: Vec<CatalogRow>,
        rule: &JoinKeyRule,
        catalog: &ExpressionCatalog,
    ) -> Result<Self, ReconcileError> {
        let distinct: BTreeSet<(String, String)> = rows
            .iter()
            .map(|row| (row.schema.clone(), row.table.clone()))
            .collect();

        let tables = assign_join_keys(side, distinct, rule)?;
        let keys: BTreeMap<(&str, &str), &str> = tables
            .iter()
            .map(|t| ((t.schema.as_str(), t.name.as_str()), t.join_key.as_str()))
            .collect();

        let mut columns = Vec::new();
        for row in &rows {
            let Some(column) = &row.column else {
                continue;
            };
            let Some(join_key) = keys.get(&(row.schema.as_str(), row.table.as_str())) else {
                continue;
            };

            let unsupported = |error: TemplateError| match error {
                TemplateError::UnsupportedType { engine, data_type } => ReconcileError::UnsupportedType {
                    side,
                    engine,
                    table: format!("{}.{}", row.schema, row.table),
                    column: column.name.clone(),
                    data_type,
                },
                other => other.into(),
            };

            let family = catalog
                .family_of(source.engine, &column.data_type)
                .map_err(unsupported)?;
            let cast_expression = catalog
                .cast_expression(source.engine, &column.data_type, &column.name)
                .map_err(unsupported)?;

            columns.push(ColumnDescriptor {
                table_join_key: join_key.to_string(),
                column_name: column.name.clone(),
                data_type: column.data_type.clone(),
                family,
                cast_expression,
                ordinal: column.ordinal,
            });
        }

        Ok(Self {
            side,
            source,
            tables,
            columns,
        })
    }

    /// Table by join key
    pub fn table(&self, join_key: &str) -> Option<&TableDescriptor> {
        self.tables
            .binary_search_by(|t| t.join_key.as_str().cmp(join_key))
            .ok()
            .map(|i| &self.tables[i])
    }

    /// Folded profile over every column of a table on this side
    pub fn profile(&self, join_key: &str) -> TableProfile {
        TableProfile::fold(
            join_key,
            self.columns.iter().filter(|c| c.table_join_key == join_key),
        )
    }

    pub fn summary(&self) -> SourceSummary {
        SourceSummary::new(&self.source, self.tables.len(), self.columns.len())
    }
}

/// Table and column reconciliation of two sides
#[derive(Debug, Clone, PartialEq)]
pub struct SchemaComparison {
    pub tables: Reconciliation<TableDescriptor>,

    /// Columns of tables present on both sides only
    pub columns: Reconciliation<ColumnDescriptor>,
}

/// A table present on both sides, ready to fingerprint
#[derive(Debug, Clone, PartialEq)]
pub struct TablePair {
    pub join_key: String,
    pub left: TableDescriptor,
    pub right: TableDescriptor,

    /// Profiles over `columns` only, both laid out in left catalog order
    pub left_profile: TableProfile,
    pub right_profile: TableProfile,

    /// Matched columns with the same type family, in left catalog order
    pub columns: Vec<Matched<ColumnDescriptor>>,
}

impl TablePair {
    /// Date column shared by both sides, if any
    pub fn shared_date_column(&self) -> Option<&str> {
        match (&self.left_profile.date_column, &self.right_profile.date_column) {
            (Some(left), Some(right)) if left == right => Some(left.as_str()),
            _ => None,
        }
    }
}

/// Reconcile tables, prune, then reconcile columns
pub fn compare(left: &SideCatalog, right: &SideCatalog) -> Result<SchemaComparison, ReconcileError> {
    let tables = reconcile(left.tables.iter().cloned(), right.tables.iter().cloned())?;

    let surviving: BTreeSet<&str> = tables.matched.iter().map(|m| m.key.as_str()).collect();
    let pruned = |catalog: &SideCatalog| -> Vec<ColumnDescriptor> {
        catalog
            .columns
            .iter()
            .filter(|c| surviving.contains(c.table_join_key.as_str()))
            .cloned()
            .collect()
    };

    let columns = reconcile(pruned(left), pruned(right))?;

    tracing::debug!(
        tables_matched = tables.matched.len(),
        tables_only_left = tables.left_only.len(),
        tables_only_right = tables.right_only.len(),
        columns_matched = columns.matched.len(),
        "Schema compared"
    );

    Ok(SchemaComparison { tables, columns })
}

impl SchemaComparison {
    /// Add table and column discrepancies to a report
    pub fn record(&self, builder: &mut ReportBuilder) {
        for table in &self.tables.left_only {
            builder.left_table(&table.join_key, table.qualified_name());
        }
        for table in &self.tables.right_only {
            builder.right_table(&table.join_key, table.qualified_name());
        }
        for matched in &self.tables.matched {
            builder
                .left_table(&matched.key, matched.left.qualified_name())
                .right_table(&matched.key, matched.right.qualified_name());
        }

        for column in &self.columns.left_only {
            builder.column_only_in_left(&column.table_join_key, column.column_name.clone());
        }
        for column in &self.columns.right_only {
            builder.column_only_in_right(&column.table_join_key, column.column_name.clone());
        }
        for matched in self.columns.differing() {
            builder.type_mismatch(
                &matched.key.table,
                TypeMismatch {
                    column: matched.key.column.clone(),
                    left_type: matched.left.data_type.clone(),
                    right_type: matched.right.data_type.clone(),
                    left_family: matched.left.family,
                    right_family: matched.right.family,
                },
            );
        }
    }

    /// Tables to fingerprint, ordered by join key
    pub fn table_pairs(&self) -> Vec<TablePair> {
        let mut by_table: BTreeMap<&str, Vec<Matched<ColumnDescriptor>>> = BTreeMap::new();
        for matched in self.columns.matched.iter().filter(|m| !m.payload_differs()) {
            by_table
                .entry(matched.key.table.as_str())
                .or_default()
                .push(matched.clone());
        }

        self.tables
            .matched
            .iter()
            .map(|table| {
                let mut columns = by_table.remove(table.key.as_str()).unwrap_or_default();
                columns.sort_by(|a, b| {
                    a.left
                        .ordinal
                        .cmp(&b.left.ordinal)
                        .then_with(|| a.key.column.cmp(&b.key.column))
                });

                let (left_profile, right_profile) = matched_profiles(&table.key, &columns);
                TablePair {
                    join_key: table.key.clone(),
                    left: table.left.clone(),
                    right: table.right.clone(),
                    left_profile,
                    right_profile,
                    columns,
                }
            })
            .collect()
    }
}

/// Fold both sides over the columns they share
///
/// The right side takes the left ordinals, so both profiles list the same
/// columns in the same order and name the same date column.
fn matched_profiles(join_key: &str, columns: &[Matched<ColumnDescriptor>]) -> (TableProfile, TableProfile) {
    let left = TableProfile::fold(join_key, columns.iter().map(|m| &m.left));

    let right_columns: Vec<ColumnDescriptor> = columns
        .iter()
        .map(|m| ColumnDescriptor {
            ordinal: m.left.ordinal,
            ..m.right.clone()
        })
        .collect();
    let right = TableProfile::fold(join_key, &right_columns);

    (left, right)
}

#[cfg(test)]
mod tests {
    use super::*;
    use dwhcompare_core::{EngineKind, RegexSubject, TypeFamily};
    use pretty_assertions::assert_eq;

    fn side(side: Side, engine: EngineKind, rows: Vec<CatalogRow>, rule: &JoinKeyRule) -> SideCatalog {
        SideCatalog::build(
            side,
            DataSourceAlias::new(side.to_string(), engine),
            rows,
            rule,
            &ExpressionCatalog::builtin(),
        )
        .unwrap()
    }

    #[test]
    fn build_assigns_keys_and_casts() {
        let rule = JoinKeyRule::identity(false);
        let catalog = side(
            Side::Left,
            EngineKind::Postgres,
            vec![
                CatalogRow::column("gold", "orders", "id", "integer", 1),
                CatalogRow::column("gold", "orders", "placed_on", "date", 2),
                CatalogRow::table("gold", "empty"),
            ],
            &rule,
        );

        let keys: Vec<&str> = catalog.tables.iter().map(|t| t.join_key.as_str()).collect();
        assert_eq!(keys, vec!["gold.empty", "gold.orders"]);
        assert_eq!(catalog.columns.len(), 2);
        assert_eq!(catalog.columns[0].cast_expression, "CAST(\"id\" AS TEXT)");
        assert_eq!(catalog.columns[1].family, TypeFamily::Date);
        assert_eq!(
            catalog.profile("gold.orders").date_column.as_deref(),
            Some("placed_on")
        );
        assert!(catalog.table("gold.empty").is_some());
        assert_eq!(catalog.summary().tables, 2);
    }

    #[test]
    fn unsupported_type_names_the_column() {
        let err = SideCatalog::build(
            Side::Right,
            DataSourceAlias::new("r", EngineKind::Postgres),
            vec![CatalogRow::column("s", "t", "shape", "geometry", 1)],
            &JoinKeyRule::identity(true),
            &ExpressionCatalog::builtin(),
        )
        .unwrap_err();

        match err {
            ReconcileError::UnsupportedType {
                side,
                table,
                column,
                data_type,
                ..
            } => {
                assert_eq!(side, Side::Right);
                assert_eq!(table, "s.t");
                assert_eq!(column, "shape");
                assert_eq!(data_type, "geometry");
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn one_sided_table_columns_are_pruned() {
        let rule = JoinKeyRule::identity(true);
        let left = side(
            Side::Left,
            EngineKind::Postgres,
            vec![
                CatalogRow::column("a", "orders", "id", "integer", 1),
                CatalogRow::column("a", "audit", "id", "integer", 1),
                CatalogRow::column("a", "audit", "who", "text", 2),
            ],
            &rule,
        );
        let right = side(
            Side::Right,
            EngineKind::MySql,
            vec![CatalogRow::column("b", "orders", "id", "int", 1)],
            &rule,
        );

        let comparison = compare(&left, &right).unwrap();

        assert_eq!(comparison.tables.left_only.len(), 1);
        assert_eq!(comparison.tables.left_only[0].name, "audit");
        assert!(comparison.columns.left_only.is_empty());
        assert_eq!(comparison.columns.matched.len(), 1);
    }

    #[test]
    fn columnless_table_is_never_matched_alone() {
        let rule = JoinKeyRule::identity(true);
        let left = side(Side::Left, EngineKind::Postgres, vec![CatalogRow::table("a", "v")], &rule);
        let right = side(Side::Right, EngineKind::Postgres, vec![], &rule);

        let comparison = compare(&left, &right).unwrap();

        assert_eq!(comparison.tables.left_only.len(), 1);
        assert!(comparison.tables.matched.is_empty());
    }

    #[test]
    fn records_columns_and_type_mismatches() {
        let left_rule = JoinKeyRule::new(Some(r"^prod\.(.*)$"), RegexSubject::QualifiedName, false).unwrap();
        let right_rule = JoinKeyRule::identity(true);
        let left = side(
            Side::Left,
            EngineKind::Postgres,
            vec![
                CatalogRow::column("prod", "orders", "id", "integer", 1),
                CatalogRow::column("prod", "orders", "amount", "numeric(12,2)", 2),
                CatalogRow::column("prod", "orders", "created_at", "timestamp", 3),
            ],
            &left_rule,
        );
        let right = side(
            Side::Right,
            EngineKind::Redshift,
            vec![
                CatalogRow::column("public", "orders", "id", "bigint", 1),
                CatalogRow::column("public", "orders", "amount", "character varying(20)", 2),
                CatalogRow::column("public", "orders", "note", "text", 3),
            ],
            &right_rule,
        );

        let comparison = compare(&left, &right).unwrap();
        let mut builder = ReportBuilder::new();
        comparison.record(&mut builder);
        let report = builder.build(chrono::Utc::now(), left.summary(), right.summary());

        let row = report.row("orders").unwrap();
        assert_eq!(row.left_table.as_deref(), Some("prod.orders"));
        assert_eq!(row.right_table.as_deref(), Some("public.orders"));
        assert_eq!(row.columns_only_in_left, vec!["created_at".to_string()]);
        assert_eq!(row.columns_only_in_right, vec!["note".to_string()]);
        assert_eq!(row.type_mismatches.len(), 1);
        assert_eq!(row.type_mismatches[0].column, "amount");
        assert_eq!(row.type_mismatches[0].left_family, TypeFamily::Numeric);
        assert_eq!(row.type_mismatches[0].right_family, TypeFamily::Text);

        let pairs = comparison.table_pairs();
        assert_eq!(pairs.len(), 1);
        let names: Vec<&str> = pairs[0].columns.iter().map(|m| m.key.column.as_str()).collect();
        assert_eq!(names, vec!["id"]);
        assert_eq!(pairs[0].left_profile.date_column, None);
        assert_eq!(pairs[0].right_profile.date_column, None);
        assert_eq!(pairs[0].shared_date_column(), None);
        assert_eq!(pairs[0].left_profile.concatenated_cast_expression, "CAST(\"id\" AS TEXT)");
    }

    #[test]
    fn date_column_comes_from_shared_columns() {
        let rule = JoinKeyRule::identity(true);
        let left = side(
            Side::Left,
            EngineKind::Postgres,
            vec![
                CatalogRow::column("prod", "orders", "id", "integer", 1),
                CatalogRow::column("prod", "orders", "created_at", "timestamp", 2),
                CatalogRow::column("prod", "orders", "updated_at", "timestamp", 3),
                CatalogRow::column("prod", "orders", "shipped_on", "date", 4),
            ],
            &rule,
        );
        let right = side(
            Side::Right,
            EngineKind::Redshift,
            vec![
                CatalogRow::column("public", "orders", "shipped_on", "date", 1),
                CatalogRow::column("public", "orders", "id", "bigint", 2),
                CatalogRow::column("public", "orders", "updated_at", "timestamp", 3),
            ],
            &rule,
        );

        let comparison = compare(&left, &right).unwrap();
        let pairs = comparison.table_pairs();
        let pair = &pairs[0];

        assert_eq!(left.profile("orders").date_column.as_deref(), Some("created_at"));
        assert_eq!(right.profile("orders").date_column.as_deref(), Some("shipped_on"));
        assert_eq!(pair.left_profile.date_column.as_deref(), Some("updated_at"));
        assert_eq!(pair.right_profile.date_column.as_deref(), Some("updated_at"));
        assert_eq!(pair.shared_date_column(), Some("updated_at"));

        let right_order: Vec<&str> = pair.right_profile.columns.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(right_order, vec!["id", "updated_at", "shipped_on"]);
    }
}
