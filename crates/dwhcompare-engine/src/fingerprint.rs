//! Content Fingerprint Engine
//!
//! One aggregate query per table, window and side: the row count plus a
//! hash-and-sum per column and one over the whole row. Only the aggregates
//! leave the data source.
//!
//! Sum-of-hash fingerprints can collide; two different column contents may
//! produce the same aggregate.

use crate::error::ReconcileError;
use crate::schema_comparator::TablePair;
use dwhcompare_catalog::{ScalarValue, StatementRunner};
use dwhcompare_core::{
    DataSourceAlias, ExpressionCatalog, Side, TableDescriptor, Window, WindowBounds, WindowOutcome,
    WindowStatus,
};

/// Aggregates of one table under one window on one side
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fingerprint {
    pub table_join_key: String,
    pub window: Window,
    pub row_count: i64,

    /// One aggregate per fingerprinted column, in fingerprint order
    pub per_column_aggregate: Vec<i128>,

    /// Aggregate over the concatenated row; absent without columns
    pub row_aggregate: Option<i128>,
}

impl Fingerprint {
    /// Compare with the right side's fingerprint
    ///
    /// Aggregates are subtracted elementwise; `columns` names them.
    pub fn diff(&self, right: &Fingerprint, columns: &[String]) -> WindowStatus {
        let row_count_delta = self.row_count - right.row_count;

        let differing_columns: Vec<String> = columns
            .iter()
            .enumerate()
            .filter(|(i, _)| {
                self.per_column_aggregate.get(*i).copied().unwrap_or(0)
                    - right.per_column_aggregate.get(*i).copied().unwrap_or(0)
                    != 0
            })
            .map(|(_, name)| name.clone())
            .collect();

        let row_hash_differs = self.row_aggregate != right.row_aggregate;

        if row_count_delta == 0 && differing_columns.is_empty() && !row_hash_differs {
            WindowStatus::Match {
                row_count: self.row_count,
            }
        } else {
            WindowStatus::Mismatch {
                row_count_delta,
                left_row_count: self.row_count,
                right_row_count: right.row_count,
                differing_columns,
                row_hash_differs,
            }
        }
    }
}

/// Builds and runs fingerprint queries
#[derive(Debug, Clone, Copy)]
pub struct FingerprintEngine<'a> {
    catalog: &'a ExpressionCatalog,
    bounds: WindowBounds,
}

impl<'a> FingerprintEngine<'a> {
    pub fn new(catalog: &'a ExpressionCatalog, bounds: WindowBounds) -> Self {
        Self { catalog, bounds }
    }

    pub fn bounds(&self) -> &WindowBounds {
        &self.bounds
    }

    /// Fingerprint query for one table and window
    ///
    /// Result columns: `row_count`, `c0..cN` per cast expression and
    /// `row_hash` when there is at least one column.
    pub fn build_query(
        &self,
        source: &DataSourceAlias,
        table: &TableDescriptor,
        casts: &[String],
        window: Window,
        date_column: Option<&str>,
    ) -> Result<String, ReconcileError> {
        let engine = source.engine;
        let mut select = vec![format!("{} AS row_count", self.catalog.row_count_expression(engine)?)];

        for (i, cast) in casts.iter().enumerate() {
            select.push(format!(
                "{} AS c{}",
                self.catalog.column_hash_expression(engine, cast)?,
                i
            ));
        }
        if !casts.is_empty() {
            select.push(format!(
                "{} AS row_hash",
                self.catalog.row_hash_expression(engine, casts)?
            ));
        }

        let mut sql = format!(
            "SELECT {} FROM {}",
            select.join(", "),
            engine.qualified_name(&table.schema, &table.name)
        );

        if window.requires_date_column() {
            let column = date_column.ok_or_else(|| {
                ReconcileError::Configuration(format!(
                    "Window '{}' needs a date column but {} has none",
                    window, table
                ))
            })?;
            if let Some(predicate) = self.catalog.window_predicate(engine, window, column, &self.bounds)? {
                sql.push_str(" WHERE ");
                sql.push_str(&predicate);
            }
        }

        Ok(sql)
    }

    /// Run one fingerprint query
    #[allow(clippy::too_many_arguments)]
    pub async fn fingerprint<R>(
        &self,
        side: Side,
        runner: &R,
        source: &DataSourceAlias,
        table: &TableDescriptor,
        join_key: &str,
        casts: &[String],
        window: Window,
        date_column: Option<&str>,
    ) -> Result<Fingerprint, ReconcileError>
    where
        R: StatementRunner + ?Sized,
    {
        let sql = self.build_query(source, table, casts, window, date_column)?;
        tracing::debug!(side = %side, table = %table, window = %window, sql = %sql, "Fingerprint query");

        let result = runner
            .execute(source, &sql)
            .await
            .map_err(|source| ReconcileError::SourceUnavailable { side, source })?;

        let invalid = |reason: String| ReconcileError::InvalidFingerprint {
            side,
            table: table.qualified_name(),
            window,
            reason,
        };

        let row = result.single_row().map_err(|e| invalid(e.to_string()))?;
        let expected = 1 + casts.len() + usize::from(!casts.is_empty());
        if row.len() < expected {
            return Err(invalid(format!("expected {} values, got {}", expected, row.len())));
        }

        let row_count = row[0]
            .as_i128()
            .and_then(|n| i64::try_from(n).ok())
            .ok_or_else(|| invalid(format!("row count '{}' is not an integer", row[0])))?;

        let aggregate = |value: &ScalarValue| -> Result<i128, ReconcileError> {
            match value {
                ScalarValue::Null => Ok(0),
                other => other
                    .as_i128()
                    .ok_or_else(|| invalid(format!("aggregate '{}' is not an integer", other))),
            }
        };

        let per_column_aggregate = row[1..=casts.len()]
            .iter()
            .map(&aggregate)
            .collect::<Result<Vec<_>, _>>()?;

        let row_aggregate = if casts.is_empty() {
            None
        } else {
            Some(aggregate(&row[casts.len() + 1])?)
        };

        Ok(Fingerprint {
            table_join_key: join_key.to_string(),
            window,
            row_count,
            per_column_aggregate,
            row_aggregate,
        })
    }

    /// Evaluate every requested window for a table
    ///
    /// Windows are independent: one window's result never short-circuits
    /// another. Dated windows run only when the shared columns include a date
    /// or timestamp column.
    pub async fn compare_table<L, R>(
        &self,
        left: &L,
        left_source: &DataSourceAlias,
        right: &R,
        right_source: &DataSourceAlias,
        pair: &TablePair,
        windows: &[Window],
    ) -> Result<Vec<WindowOutcome>, ReconcileError>
    where
        L: StatementRunner + ?Sized,
        R: StatementRunner + ?Sized,
    {
        let names: Vec<String> = pair.columns.iter().map(|m| m.key.column.clone()).collect();
        let left_casts: Vec<String> = pair.columns.iter().map(|m| m.left.cast_expression.clone()).collect();
        let right_casts: Vec<String> = pair.columns.iter().map(|m| m.right.cast_expression.clone()).collect();

        let mut outcomes = Vec::with_capacity(windows.len());
        for &window in windows {
            let date_column = if window.requires_date_column() {
                match pair.shared_date_column() {
                    Some(column) => Some(column),
                    None => {
                        let reason = skip_reason(pair);
                        tracing::warn!(table = %pair.join_key, window = %window, "Window skipped: {}", reason);
                        outcomes.push(WindowOutcome {
                            window,
                            status: WindowStatus::Skipped { reason },
                        });
                        continue;
                    }
                }
            } else {
                None
            };

            let left_fp = self
                .fingerprint(
                    Side::Left,
                    left,
                    left_source,
                    &pair.left,
                    &pair.join_key,
                    &left_casts,
                    window,
                    date_column,
                )
                .await?;
            let right_fp = self
                .fingerprint(
                    Side::Right,
                    right,
                    right_source,
                    &pair.right,
                    &pair.join_key,
                    &right_casts,
                    window,
                    date_column,
                )
                .await?;

            outcomes.push(WindowOutcome {
                window,
                status: left_fp.diff(&right_fp, &names),
            });
        }

        Ok(outcomes)
    }
}

fn skip_reason(pair: &TablePair) -> String {
    match &pair.left_profile.date_column {
        Some(column) => format!("date column '{}' is not usable on both sides", column),
        None => "no date column shared by both sides".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use dwhcompare_core::EngineKind;
    use pretty_assertions::assert_eq;

    fn engine_bounds() -> WindowBounds {
        WindowBounds::from_as_of(Utc.with_ymd_and_hms(2024, 3, 15, 12, 0, 0).unwrap())
    }

    fn table() -> TableDescriptor {
        TableDescriptor {
            schema: "gold".to_string(),
            name: "orders".to_string(),
            join_key: "orders".to_string(),
        }
    }

    fn fp(row_count: i64, aggregates: Vec<i128>, row: Option<i128>) -> Fingerprint {
        Fingerprint {
            table_join_key: "orders".to_string(),
            window: Window::All,
            row_count,
            per_column_aggregate: aggregates,
            row_aggregate: row,
        }
    }

    #[test]
    fn identical_fingerprints_match() {
        let columns = vec!["id".to_string(), "amount".to_string()];
        let left = fp(100, vec![5, 7], Some(9));
        assert_eq!(left.diff(&left.clone(), &columns), WindowStatus::Match { row_count: 100 });
    }

    #[test]
    fn diff_names_differing_columns_in_order() {
        let columns = vec!["id".to_string(), "amount".to_string(), "note".to_string()];
        let left = fp(10, vec![1, 2, 3], Some(4));
        let right = fp(8, vec![1, 5, 0], Some(4));

        assert_eq!(
            left.diff(&right, &columns),
            WindowStatus::Mismatch {
                row_count_delta: 2,
                left_row_count: 10,
                right_row_count: 8,
                differing_columns: vec!["amount".to_string(), "note".to_string()],
                row_hash_differs: false,
            }
        );
    }

    #[test]
    fn row_hash_alone_is_a_mismatch() {
        let columns = vec!["a".to_string()];
        let status = fp(3, vec![1], Some(1)).diff(&fp(3, vec![1], Some(2)), &columns);
        assert!(matches!(status, WindowStatus::Mismatch { row_hash_differs: true, .. }));
    }

    #[test]
    fn query_for_all_window() {
        let catalog = ExpressionCatalog::builtin();
        let engine = FingerprintEngine::new(&catalog, engine_bounds());
        let source = DataSourceAlias::new("left", EngineKind::Postgres);

        let sql = engine
            .build_query(&source, &table(), &["CAST(\"id\" AS TEXT)".to_string()], Window::All, None)
            .unwrap();

        assert!(sql.starts_with("SELECT CAST(COUNT(*) AS TEXT) AS row_count, "));
        assert!(sql.contains("MD5(COALESCE(CAST(\"id\" AS TEXT), '<null>'))"));
        assert!(sql.contains(" AS c0, "));
        assert!(sql.contains(" AS row_hash FROM \"gold\".\"orders\""));
        assert!(!sql.contains("WHERE"));
    }

    #[test]
    fn query_for_dated_window() {
        let catalog = ExpressionCatalog::builtin();
        let engine = FingerprintEngine::new(&catalog, engine_bounds());
        let source = DataSourceAlias::new("right", EngineKind::MySql);

        let sql = engine
            .build_query(&source, &table(), &[], Window::LastMonth, Some("created_at"))
            .unwrap();

        assert!(sql.ends_with(
            "FROM `gold`.`orders` WHERE `created_at` >= '2024-02-01' AND `created_at` < '2024-03-01'"
        ));
        assert!(!sql.contains("row_hash"));
    }

    #[test]
    fn dated_window_without_column_is_rejected() {
        let catalog = ExpressionCatalog::builtin();
        let engine = FingerprintEngine::new(&catalog, engine_bounds());
        let source = DataSourceAlias::new("left", EngineKind::Postgres);

        let err = engine
            .build_query(&source, &table(), &[], Window::ThisMonth, None)
            .unwrap_err();
        assert!(err.is_configuration());
    }
}
