//! Discrepancy report (stable v1)
//!
//! This schema is STABLE and VERSIONED.
//! Breaking changes require a new version.

use crate::dialect::{DataSourceAlias, EngineKind};
use crate::diagnostic::{DiscrepancyCode, Finding};
use crate::templates::TypeFamily;
use crate::window::Window;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Report schema version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportVersion {
    /// Major version (breaking changes)
    pub major: u32,

    /// Minor version (backward-compatible additions)
    pub minor: u32,
}

impl ReportVersion {
    /// Current report schema version
    pub const CURRENT: ReportVersion = ReportVersion { major: 1, minor: 0 };
}

impl std::fmt::Display for ReportVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// What was read from one side
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceSummary {
    pub name: String,
    pub engine: EngineKind,

    /// Tables after filtering
    pub tables: usize,

    /// Columns after filtering
    pub columns: usize,
}

impl SourceSummary {
    pub fn new(source: &DataSourceAlias, tables: usize, columns: usize) -> Self {
        Self {
            name: source.name.clone(),
            engine: source.engine,
            tables,
            columns,
        }
    }
}

/// Summary counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportSummary {
    /// Tables present on both sides
    pub tables_compared: usize,

    pub tables_only_in_left: usize,
    pub tables_only_in_right: usize,
    pub columns_only_in_left: usize,
    pub columns_only_in_right: usize,
    pub type_mismatches: usize,

    pub windows_matched: usize,
    pub windows_mismatched: usize,
    pub windows_skipped: usize,

    /// Rows with at least one discrepancy
    pub discrepant_tables: usize,
}

/// Column present on both sides with different type families
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeMismatch {
    pub column: String,
    pub left_type: String,
    pub right_type: String,
    pub left_family: TypeFamily,
    pub right_family: TypeFamily,
}

/// Outcome of one window for one table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WindowStatus {
    /// Row count and every aggregate equal
    Match { row_count: i64 },

    Mismatch {
        /// left minus right
        row_count_delta: i64,
        left_row_count: i64,
        right_row_count: i64,

        /// Columns with a non-zero aggregate delta, in fingerprint order
        differing_columns: Vec<String>,

        /// Whole-row aggregate differs
        row_hash_differs: bool,
    },

    /// Window not evaluated for this table
    Skipped { reason: String },
}

/// Window result within a row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowOutcome {
    pub window: Window,
    pub status: WindowStatus,
}

impl WindowOutcome {
    pub fn is_mismatch(&self) -> bool {
        matches!(self.status, WindowStatus::Mismatch { .. })
    }
}

/// Everything known about one join key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscrepancyRow {
    pub join_key: String,

    /// `schema.table` on the left, absent when the table is right-only
    pub left_table: Option<String>,

    /// `schema.table` on the right, absent when the table is left-only
    pub right_table: Option<String>,

    pub columns_only_in_left: Vec<String>,
    pub columns_only_in_right: Vec<String>,
    pub type_mismatches: Vec<TypeMismatch>,

    /// One outcome per evaluated window, in window order
    pub windows: Vec<WindowOutcome>,
}

impl DiscrepancyRow {
    pub fn new(join_key: impl Into<String>) -> Self {
        Self {
            join_key: join_key.into(),
            left_table: None,
            right_table: None,
            columns_only_in_left: Vec::new(),
            columns_only_in_right: Vec::new(),
            type_mismatches: Vec::new(),
            windows: Vec::new(),
        }
    }

    pub fn is_matched(&self) -> bool {
        self.left_table.is_some() && self.right_table.is_some()
    }

    /// Whether anything differs for this key
    pub fn has_discrepancy(&self) -> bool {
        !self.is_matched()
            || !self.columns_only_in_left.is_empty()
            || !self.columns_only_in_right.is_empty()
            || !self.type_mismatches.is_empty()
            || self.windows.iter().any(WindowOutcome::is_mismatch)
    }

    /// Outcome of a window, if evaluated
    pub fn window(&self, window: Window) -> Option<&WindowStatus> {
        self.windows
            .iter()
            .find(|o| o.window == window)
            .map(|o| &o.status)
    }

    /// Flatten into display findings
    pub fn findings(&self) -> Vec<Finding> {
        let key = self.join_key.as_str();
        let mut findings = Vec::new();

        match (&self.left_table, &self.right_table) {
            (Some(left), None) => findings.push(Finding::new(
                DiscrepancyCode::TableOnlyInLeft,
                key,
                format!("Table {} exists only in the left source", left),
            )),
            (None, Some(right)) => findings.push(Finding::new(
                DiscrepancyCode::TableOnlyInRight,
                key,
                format!("Table {} exists only in the right source", right),
            )),
            _ => {}
        }

        for column in &self.columns_only_in_left {
            findings.push(
                Finding::new(
                    DiscrepancyCode::ColumnOnlyInLeft,
                    key,
                    format!("Column '{}' exists only in the left source", column),
                )
                .with_column(column),
            );
        }

        for column in &self.columns_only_in_right {
            findings.push(
                Finding::new(
                    DiscrepancyCode::ColumnOnlyInRight,
                    key,
                    format!("Column '{}' exists only in the right source", column),
                )
                .with_column(column),
            );
        }

        for mismatch in &self.type_mismatches {
            findings.push(
                Finding::new(
                    DiscrepancyCode::ColumnTypeMismatch,
                    key,
                    format!(
                        "Column '{}' is {} ({}) on the left but {} ({}) on the right",
                        mismatch.column,
                        mismatch.left_type,
                        mismatch.left_family,
                        mismatch.right_type,
                        mismatch.right_family
                    ),
                )
                .with_column(&mismatch.column),
            );
        }

        for outcome in &self.windows {
            match &outcome.status {
                WindowStatus::Match { .. } => {}
                WindowStatus::Mismatch {
                    row_count_delta,
                    left_row_count,
                    right_row_count,
                    differing_columns,
                    row_hash_differs,
                } => {
                    if *row_count_delta != 0 {
                        findings.push(
                            Finding::new(
                                DiscrepancyCode::RowCountMismatch,
                                key,
                                format!(
                                    "Row count differs by {} ({} vs {})",
                                    row_count_delta, left_row_count, right_row_count
                                ),
                            )
                            .with_window(outcome.window),
                        );
                    }
                    if !differing_columns.is_empty() {
                        findings.push(
                            Finding::new(
                                DiscrepancyCode::ContentMismatch,
                                key,
                                format!("Content differs in: {}", differing_columns.join(", ")),
                            )
                            .with_window(outcome.window),
                        );
                    } else if *row_hash_differs {
                        findings.push(
                            Finding::new(DiscrepancyCode::ContentMismatch, key, "Row content differs")
                                .with_window(outcome.window),
                        );
                    }
                }
                WindowStatus::Skipped { reason } => findings.push(
                    Finding::new(DiscrepancyCode::WindowSkipped, key, reason.clone())
                        .with_window(outcome.window),
                ),
            }
        }

        findings
    }
}

/// Reconciliation report (report.json v1)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    /// Schema version
    pub version: ReportVersion,

    /// Generation time (RFC 3339)
    pub timestamp: String,

    /// Reference instant used for window bounds
    pub as_of: DateTime<Utc>,

    pub left: SourceSummary,
    pub right: SourceSummary,

    pub summary: ReportSummary,

    /// One row per join key, ordered by join key
    pub rows: Vec<DiscrepancyRow>,

    /// Metadata
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

impl Report {
    /// Check if anything differs between the sources
    pub fn has_discrepancies(&self) -> bool {
        self.summary.discrepant_tables > 0
    }

    /// Row for a join key
    pub fn row(&self, join_key: &str) -> Option<&DiscrepancyRow> {
        self.rows
            .binary_search_by(|r| r.join_key.as_str().cmp(join_key))
            .ok()
            .map(|i| &self.rows[i])
    }

    /// All findings in row order
    pub fn findings(&self) -> Vec<Finding> {
        self.rows.iter().flat_map(DiscrepancyRow::findings).collect()
    }

    /// Serialize to JSON string
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Save to file
    pub fn save_to_file(&self, path: &std::path::Path) -> Result<(), std::io::Error> {
        let json = self.to_json().map_err(std::io::Error::other)?;
        std::fs::write(path, json)
    }

    /// Load a previously saved report
    pub fn load_from_file(path: &std::path::Path) -> Result<Self, std::io::Error> {
        let json = std::fs::read_to_string(path)?;
        serde_json::from_str(&json).map_err(std::io::Error::other)
    }
}

/// Collects fragments from every stage, keyed by join key
#[derive(Debug, Default)]
pub struct ReportBuilder {
    rows: BTreeMap<String, DiscrepancyRow>,
    metadata: Option<serde_json::Value>,
}

impl ReportBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    fn row_mut(&mut self, join_key: &str) -> &mut DiscrepancyRow {
        self.rows
            .entry(join_key.to_string())
            .or_insert_with(|| DiscrepancyRow::new(join_key))
    }

    /// Record a table seen on the left
    pub fn left_table(&mut self, join_key: &str, table: impl Into<String>) -> &mut Self {
        self.row_mut(join_key).left_table = Some(table.into());
        self
    }

    /// Record a table seen on the right
    pub fn right_table(&mut self, join_key: &str, table: impl Into<String>) -> &mut Self {
        self.row_mut(join_key).right_table = Some(table.into());
        self
    }

    pub fn column_only_in_left(&mut self, join_key: &str, column: impl Into<String>) -> &mut Self {
        self.row_mut(join_key).columns_only_in_left.push(column.into());
        self
    }

    pub fn column_only_in_right(&mut self, join_key: &str, column: impl Into<String>) -> &mut Self {
        self.row_mut(join_key).columns_only_in_right.push(column.into());
        self
    }

    pub fn type_mismatch(&mut self, join_key: &str, mismatch: TypeMismatch) -> &mut Self {
        self.row_mut(join_key).type_mismatches.push(mismatch);
        self
    }

    /// Record a window outcome; a second outcome for the same window replaces the first
    pub fn window(&mut self, join_key: &str, outcome: WindowOutcome) -> &mut Self {
        let windows = &mut self.row_mut(join_key).windows;
        match windows.iter_mut().find(|o| o.window == outcome.window) {
            Some(existing) => *existing = outcome,
            None => {
                windows.push(outcome);
                windows.sort_by_key(|o| o.window);
            }
        }
        self
    }

    pub fn metadata(&mut self, metadata: serde_json::Value) -> &mut Self {
        self.metadata = Some(metadata);
        self
    }

    /// Finish the report
    pub fn build(self, as_of: DateTime<Utc>, left: SourceSummary, right: SourceSummary) -> Report {
        let mut summary = ReportSummary::default();
        let mut rows = Vec::with_capacity(self.rows.len());

        for (_, mut row) in self.rows {
            row.columns_only_in_left.sort();
            row.columns_only_in_left.dedup();
            row.columns_only_in_right.sort();
            row.columns_only_in_right.dedup();
            row.type_mismatches.sort_by(|a, b| a.column.cmp(&b.column));
            row.type_mismatches.dedup();

            match (&row.left_table, &row.right_table) {
                (Some(_), Some(_)) => summary.tables_compared += 1,
                (Some(_), None) => summary.tables_only_in_left += 1,
                (None, Some(_)) => summary.tables_only_in_right += 1,
                (None, None) => {}
            }
            summary.columns_only_in_left += row.columns_only_in_left.len();
            summary.columns_only_in_right += row.columns_only_in_right.len();
            summary.type_mismatches += row.type_mismatches.len();

            for outcome in &row.windows {
                match outcome.status {
                    WindowStatus::Match { .. } => summary.windows_matched += 1,
                    WindowStatus::Mismatch { .. } => summary.windows_mismatched += 1,
                    WindowStatus::Skipped { .. } => summary.windows_skipped += 1,
                }
            }

            if row.has_discrepancy() {
                summary.discrepant_tables += 1;
            }

            rows.push(row);
        }

        Report {
            version: ReportVersion::CURRENT,
            timestamp: Utc::now().to_rfc3339(),
            as_of,
            left,
            right,
            summary,
            rows,
            metadata: self.metadata,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    fn sources() -> (SourceSummary, SourceSummary) {
        (
            SourceSummary::new(&DataSourceAlias::new("left_db", EngineKind::Postgres), 2, 5),
            SourceSummary::new(&DataSourceAlias::new("right_db", EngineKind::MySql), 2, 4),
        )
    }

    fn as_of() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 15, 0, 0, 0).unwrap()
    }

    #[test]
    fn empty_report() {
        let (left, right) = sources();
        let report = ReportBuilder::new().build(as_of(), left, right);

        assert_eq!(report.version, ReportVersion::CURRENT);
        assert!(report.rows.is_empty());
        assert!(!report.has_discrepancies());
    }

    #[test]
    fn fragments_merge_by_join_key() {
        let mut builder = ReportBuilder::new();
        builder
            .left_table("orders", "prod.orders")
            .right_table("orders", "public.orders")
            .column_only_in_left("orders", "created_at")
            .column_only_in_left("orders", "created_at")
            .left_table("audit", "prod.audit")
            .window(
                "orders",
                WindowOutcome {
                    window: Window::All,
                    status: WindowStatus::Match { row_count: 100 },
                },
            );

        let (left, right) = sources();
        let report = builder.build(as_of(), left, right);

        assert_eq!(report.rows.len(), 2);
        assert_eq!(report.rows[0].join_key, "audit");

        let orders = report.row("orders").unwrap();
        assert_eq!(orders.columns_only_in_left, vec!["created_at".to_string()]);
        assert_eq!(orders.window(Window::All), Some(&WindowStatus::Match { row_count: 100 }));

        assert_eq!(report.summary.tables_compared, 1);
        assert_eq!(report.summary.tables_only_in_left, 1);
        assert_eq!(report.summary.columns_only_in_left, 1);
        assert_eq!(report.summary.windows_matched, 1);
        assert_eq!(report.summary.discrepant_tables, 2);
    }

    #[test]
    fn window_outcomes_stay_ordered() {
        let mut builder = ReportBuilder::new();
        builder.left_table("t", "s.t").right_table("t", "s.t");
        for window in [Window::BeforeLastMonth, Window::All, Window::ThisMonth] {
            builder.window(
                "t",
                WindowOutcome {
                    window,
                    status: WindowStatus::Match { row_count: 1 },
                },
            );
        }

        let (left, right) = sources();
        let report = builder.build(as_of(), left, right);
        let windows: Vec<Window> = report.rows[0].windows.iter().map(|o| o.window).collect();

        assert_eq!(windows, vec![Window::All, Window::ThisMonth, Window::BeforeLastMonth]);
        assert!(!report.has_discrepancies());
    }

    #[test]
    fn mismatch_findings() {
        let mut row = DiscrepancyRow::new("orders");
        row.left_table = Some("a.orders".to_string());
        row.right_table = Some("b.orders".to_string());
        row.windows.push(WindowOutcome {
            window: Window::LastMonth,
            status: WindowStatus::Mismatch {
                row_count_delta: 0,
                left_row_count: 10,
                right_row_count: 10,
                differing_columns: vec!["amount".to_string()],
                row_hash_differs: true,
            },
        });

        let findings = row.findings();
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].code, DiscrepancyCode::ContentMismatch);
        assert_eq!(findings[0].window, Some(Window::LastMonth));
        assert!(row.has_discrepancy());
    }

    #[test]
    fn report_serialization() {
        let mut builder = ReportBuilder::new();
        builder
            .left_table("t", "s.t")
            .window(
                "t",
                WindowOutcome {
                    window: Window::ThisMonth,
                    status: WindowStatus::Skipped {
                        reason: "no date column".to_string(),
                    },
                },
            )
            .metadata(serde_json::json!({ "config_hash": "abc" }));

        let (left, right) = sources();
        let report = builder.build(as_of(), left, right);
        let json = report.to_json().unwrap();

        assert!(json.contains("\"kind\": \"skipped\""));
        assert!(json.contains("\"window\": \"this_month\""));

        let parsed: Report = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, report);
    }
}
