//! Discrepancy codes and findings
//!
//! Codes are stable and part of the report format.
//! Never rename or remove a code; add new ones instead.

use crate::window::Window;
use serde::{Deserialize, Serialize};

/// Discrepancy code registry (v1)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DiscrepancyCode {
    // Table presence
    /// Table exists only in the left source
    TableOnlyInLeft,

    /// Table exists only in the right source
    TableOnlyInRight,

    // Column presence and types
    /// Column exists only in the left source
    ColumnOnlyInLeft,

    /// Column exists only in the right source
    ColumnOnlyInRight,

    /// Column exists on both sides with different type families
    ColumnTypeMismatch,

    // Content
    /// Row counts differ within a window
    RowCountMismatch,

    /// Column or row aggregates differ within a window
    ContentMismatch,

    /// Window not compared (no common date column)
    WindowSkipped,
}

impl DiscrepancyCode {
    /// Stable string identifier
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TableOnlyInLeft => "TABLE_ONLY_IN_LEFT",
            Self::TableOnlyInRight => "TABLE_ONLY_IN_RIGHT",
            Self::ColumnOnlyInLeft => "COLUMN_ONLY_IN_LEFT",
            Self::ColumnOnlyInRight => "COLUMN_ONLY_IN_RIGHT",
            Self::ColumnTypeMismatch => "COLUMN_TYPE_MISMATCH",
            Self::RowCountMismatch => "ROW_COUNT_MISMATCH",
            Self::ContentMismatch => "CONTENT_MISMATCH",
            Self::WindowSkipped => "WINDOW_SKIPPED",
        }
    }

    /// Default severity of the code
    pub fn severity(&self) -> Severity {
        match self {
            Self::ColumnTypeMismatch => Severity::Warn,
            Self::WindowSkipped => Severity::Info,
            _ => Severity::Error,
        }
    }
}

impl std::fmt::Display for DiscrepancyCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Finding severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warn,
    Error,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Info => write!(f, "info"),
            Self::Warn => write!(f, "warn"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// One discrepancy, flattened for display
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finding {
    pub code: DiscrepancyCode,
    pub severity: Severity,

    /// Table join key
    pub join_key: String,

    pub message: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub window: Option<Window>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub column: Option<String>,
}

impl Finding {
    /// Create a finding with the code's default severity
    pub fn new(code: DiscrepancyCode, join_key: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code,
            severity: code.severity(),
            join_key: join_key.into(),
            message: message.into(),
            window: None,
            column: None,
        }
    }

    pub fn with_window(mut self, window: Window) -> Self {
        self.window = Some(window);
        self
    }

    pub fn with_column(mut self, column: impl Into<String>) -> Self {
        self.column = Some(column.into());
        self
    }
}
