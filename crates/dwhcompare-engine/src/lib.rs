//! dwhcompare engine - reconciliation logic
//!
//! - Join-key normalization
//! - Generic set reconciliation
//! - Schema comparison
//! - Content fingerprints per time window
//! - Orchestration into a single report

pub mod error;
pub mod join_key;
pub mod set_reconciler;
pub mod schema_comparator;
pub mod fingerprint;
pub mod orchestrator;

pub use error::ReconcileError;
pub use join_key::{assign_join_keys, normalize, JoinKeyRule};
pub use set_reconciler::{reconcile, ColumnKey, JoinRecord, Matched, Reconciliation};
pub use schema_comparator::{compare, SchemaComparison, SideCatalog, TablePair};
pub use fingerprint::{Fingerprint, FingerprintEngine};
pub use orchestrator::{ReconcileOptions, Reconciler, SideOptions};
