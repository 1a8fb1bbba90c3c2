//! Reconciliation error taxonomy
//!
//! Discrepancies between the sources are never errors; they are data in the
//! report. Everything here aborts the run.

use dwhcompare_catalog::FetchError;
use dwhcompare_core::{EngineKind, Side, TemplateError, Window};

/// Errors that abort a reconciliation run
#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    /// Unknown engine, missing template, invalid regex
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Unsupported data type '{data_type}' for {table}.{column} on the {side} side ({engine})")]
    UnsupportedType {
        side: Side,
        engine: EngineKind,
        table: String,
        column: String,
        data_type: String,
    },

    #[error("Cannot derive a join key from '{subject}': {reason}")]
    Normalization { subject: String, reason: String },

    #[error("{first} and {second} on the {side} side both map to join key '{join_key}'")]
    AmbiguousJoinKey {
        side: Side,
        join_key: String,
        first: String,
        second: String,
    },

    #[error("The {side} source is unavailable: {source}")]
    SourceUnavailable {
        side: Side,
        #[source]
        source: FetchError,
    },

    #[error("Invalid fingerprint for {table} ({window}) on the {side} side: {reason}")]
    InvalidFingerprint {
        side: Side,
        table: String,
        window: Window,
        reason: String,
    },
}

impl ReconcileError {
    /// Whether the operator has to fix configuration (as opposed to connectivity)
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::Configuration(_)
                | Self::UnsupportedType { .. }
                | Self::Normalization { .. }
                | Self::AmbiguousJoinKey { .. }
        )
    }

    /// Whether a data source failed
    pub fn is_source_unavailable(&self) -> bool {
        matches!(self, Self::SourceUnavailable { .. } | Self::InvalidFingerprint { .. })
    }
}

impl From<TemplateError> for ReconcileError {
    fn from(error: TemplateError) -> Self {
        Self::Configuration(error.to_string())
    }
}
