//! Catalog descriptors
//!
//! Read-only snapshots of what a source's catalog reports. Nothing here
//! survives a run.

use crate::templates::TypeFamily;
use serde::{Deserialize, Serialize};
use std::fmt;

/// One column as reported by a catalog
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CatalogColumn {
    pub name: String,

    /// Engine type name as reported (e.g. `character varying`)
    pub data_type: String,

    /// 1-based position within the table
    pub ordinal: u32,
}

/// One `(schema, table, column?)` tuple from a catalog
///
/// A table without columns is a single row with `column = None`, so it still
/// takes part in table reconciliation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CatalogRow {
    pub schema: String,
    pub table: String,

    #[serde(default)]
    pub column: Option<CatalogColumn>,
}

impl CatalogRow {
    /// Row carrying a column
    pub fn column(
        schema: impl Into<String>,
        table: impl Into<String>,
        name: impl Into<String>,
        data_type: impl Into<String>,
        ordinal: u32,
    ) -> Self {
        Self {
            schema: schema.into(),
            table: table.into(),
            column: Some(CatalogColumn {
                name: name.into(),
                data_type: data_type.into(),
                ordinal,
            }),
        }
    }

    /// Row for a table without columns
    pub fn table(schema: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            table: table.into(),
            column: None,
        }
    }
}

/// Table identity on one side
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TableDescriptor {
    pub schema: String,
    pub name: String,

    /// Canonical key shared with the other side
    pub join_key: String,
}

impl TableDescriptor {
    /// `schema.name` as stored in the source
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.schema, self.name)
    }
}

impl fmt::Display for TableDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.schema, self.name)
    }
}

/// Column identity and canonical expression on one side
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ColumnDescriptor {
    pub table_join_key: String,
    pub column_name: String,

    /// Engine type name as reported
    pub data_type: String,

    pub family: TypeFamily,

    /// Canonical text expression, rendered once at fetch time
    pub cast_expression: String,

    pub ordinal: u32,
}

/// Column as it takes part in a fingerprint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileColumn {
    pub name: String,
    pub cast_expression: String,
}

/// Folded view of all columns of one table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableProfile {
    pub table_join_key: String,

    /// Columns in catalog order
    pub columns: Vec<ProfileColumn>,

    /// Cast expressions joined with `, ` in column order
    pub concatenated_cast_expression: String,

    /// First date or timestamp column in catalog order
    pub date_column: Option<String>,
}

impl TableProfile {
    /// Fold the columns of one table
    ///
    /// Input order does not matter; columns are ordered by ordinal, then name.
    pub fn fold<'a>(
        table_join_key: impl Into<String>,
        columns: impl IntoIterator<Item = &'a ColumnDescriptor>,
    ) -> Self {
        let mut ordered: Vec<&ColumnDescriptor> = columns.into_iter().collect();
        ordered.sort_by(|a, b| {
            a.ordinal
                .cmp(&b.ordinal)
                .then_with(|| a.column_name.cmp(&b.column_name))
        });

        let date_column = ordered
            .iter()
            .find(|c| c.family.is_temporal())
            .map(|c| c.column_name.clone());

        let concatenated_cast_expression = ordered
            .iter()
            .map(|c| c.cast_expression.as_str())
            .collect::<Vec<_>>()
            .join(", ");

        Self {
            table_join_key: table_join_key.into(),
            columns: ordered
                .into_iter()
                .map(|c| ProfileColumn {
                    name: c.column_name.clone(),
                    cast_expression: c.cast_expression.clone(),
                })
                .collect(),
            concatenated_cast_expression,
            date_column,
        }
    }

    /// Cast expression of a column by name
    pub fn cast_of(&self, column: &str) -> Option<&str> {
        self.columns
            .iter()
            .find(|c| c.name == column)
            .map(|c| c.cast_expression.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn column(name: &str, family: TypeFamily, ordinal: u32) -> ColumnDescriptor {
        ColumnDescriptor {
            table_join_key: "orders".to_string(),
            column_name: name.to_string(),
            data_type: family.to_string(),
            family,
            cast_expression: format!("cast({})", name),
            ordinal,
        }
    }

    #[test]
    fn fold_orders_by_ordinal() {
        let columns = vec![
            column("updated_at", TypeFamily::Timestamp, 4),
            column("id", TypeFamily::Integer, 1),
            column("created_on", TypeFamily::Date, 3),
            column("amount", TypeFamily::Numeric, 2),
        ];

        let profile = TableProfile::fold("orders", &columns);

        assert_eq!(
            profile.concatenated_cast_expression,
            "cast(id), cast(amount), cast(created_on), cast(updated_at)"
        );
        assert_eq!(profile.date_column.as_deref(), Some("created_on"));
        assert_eq!(profile.cast_of("amount"), Some("cast(amount)"));
    }

    #[test]
    fn fold_without_date_column() {
        let columns = vec![column("id", TypeFamily::Integer, 1)];
        let profile = TableProfile::fold("orders", &columns);
        assert_eq!(profile.date_column, None);
    }

    #[test]
    fn fold_empty_table() {
        let profile = TableProfile::fold("empty", std::iter::empty());
        assert!(profile.columns.is_empty());
        assert_eq!(profile.concatenated_cast_expression, "");
        assert_eq!(profile.date_column, None);
    }

    #[test]
    fn catalog_row_serde_without_column() {
        let row: CatalogRow = serde_json::from_str(r#"{"schema":"gold","table":"v"}"#).unwrap();
        assert_eq!(row, CatalogRow::table("gold", "v"));
    }
}
