//! Set Reconciler
//!
//! The single left/right/both diff used for tables and columns. Records join
//! on [`JoinRecord::join_key`]; everything else a record carries is payload
//! that travels with it into the result. Inputs are sets: order does not
//! matter and exact duplicates collapse.

use crate::error::ReconcileError;
use dwhcompare_core::{ColumnDescriptor, Side, TableDescriptor, TypeFamily};
use std::collections::BTreeMap;
use std::fmt;

/// A record the reconciler can join
pub trait JoinRecord: Clone + PartialEq {
    type Key: Ord + Clone + fmt::Display + fmt::Debug;
    type Payload: PartialEq + fmt::Debug;

    /// Equi-join key
    fn join_key(&self) -> Self::Key;

    /// Non-join fields compared on matched records
    fn payload(&self) -> Self::Payload;

    /// Name used in error messages
    fn label(&self) -> String;
}

/// Record present on both sides
#[derive(Debug, Clone, PartialEq)]
pub struct Matched<T: JoinRecord> {
    pub key: T::Key,
    pub left: T,
    pub right: T,
}

impl<T: JoinRecord> Matched<T> {
    /// Whether the non-join fields differ between sides
    pub fn payload_differs(&self) -> bool {
        self.left.payload() != self.right.payload()
    }
}

/// Partition of two record sets
///
/// Every input record lands in exactly one of the three collections, each
/// ordered by join key.
#[derive(Debug, Clone, PartialEq)]
pub struct Reconciliation<T: JoinRecord> {
    pub left_only: Vec<T>,
    pub right_only: Vec<T>,
    pub matched: Vec<Matched<T>>,
}

impl<T: JoinRecord> Reconciliation<T> {
    /// Matched records whose payload differs
    pub fn differing(&self) -> impl Iterator<Item = &Matched<T>> {
        self.matched.iter().filter(|m| m.payload_differs())
    }

    pub fn is_identical(&self) -> bool {
        self.left_only.is_empty() && self.right_only.is_empty() && self.differing().next().is_none()
    }
}

/// Full outer equi-join of two record sets
pub fn reconcile<T, L, R>(left: L, right: R) -> Result<Reconciliation<T>, ReconcileError>
where
    T: JoinRecord,
    L: IntoIterator<Item = T>,
    R: IntoIterator<Item = T>,
{
    let mut left = index(Side::Left, left)?;
    let right = index(Side::Right, right)?;

    let mut right_only = Vec::new();
    let mut matched = Vec::new();

    for (key, right_record) in right {
        match left.remove(&key) {
            Some(left_record) => matched.push(Matched {
                key,
                left: left_record,
                right: right_record,
            }),
            None => right_only.push(right_record),
        }
    }

    Ok(Reconciliation {
        left_only: left.into_values().collect(),
        right_only,
        matched,
    })
}

fn index<T, I>(side: Side, records: I) -> Result<BTreeMap<T::Key, T>, ReconcileError>
where
    T: JoinRecord,
    I: IntoIterator<Item = T>,
{
    let mut by_key: BTreeMap<T::Key, T> = BTreeMap::new();

    for record in records {
        let key = record.join_key();
        match by_key.get(&key) {
            Some(existing) if *existing == record => {}
            Some(existing) => {
                let (a, b) = (existing.label(), record.label());
                let (first, second) = if a <= b { (a, b) } else { (b, a) };
                return Err(ReconcileError::AmbiguousJoinKey {
                    side,
                    join_key: key.to_string(),
                    first,
                    second,
                });
            }
            None => {
                by_key.insert(key, record);
            }
        }
    }

    Ok(by_key)
}

impl JoinRecord for TableDescriptor {
    type Key = String;
    type Payload = ();

    fn join_key(&self) -> String {
        self.join_key.clone()
    }

    fn payload(&self) -> Self::Payload {}

    fn label(&self) -> String {
        self.qualified_name()
    }
}

/// `(table_join_key, column_name)`
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ColumnKey {
    pub table: String,
    pub column: String,
}

impl fmt::Display for ColumnKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.table, self.column)
    }
}

impl JoinRecord for ColumnDescriptor {
    type Key = ColumnKey;

    /// The type family; raw type names differ across engines
    type Payload = TypeFamily;

    fn join_key(&self) -> ColumnKey {
        ColumnKey {
            table: self.table_join_key.clone(),
            column: self.column_name.clone(),
        }
    }

    fn payload(&self) -> TypeFamily {
        self.family
    }

    fn label(&self) -> String {
        format!("{}.{} ({})", self.table_join_key, self.column_name, self.data_type)
    }
}
