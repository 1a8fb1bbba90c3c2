//! Join-Key Normalizer
//!
//! Derives the canonical identity a table carries across both sides. A
//! per-side regex rewrites the name (its first capture group becomes the
//! working name) and the schema is prefixed unless schema-insensitive
//! matching is requested. With [`RegexSubject::QualifiedName`] the regex sees
//! `schema.table` and its capture is the whole key, which lets `prod.orders`
//! on one side meet `orders` on the other.

use crate::error::ReconcileError;
use dwhcompare_core::{RegexSubject, Side, TableDescriptor};
use regex::Regex;
use std::collections::BTreeMap;

/// How one side derives join keys
#[derive(Debug, Clone)]
pub struct JoinKeyRule {
    /// `None` keeps the name as is
    pattern: Option<Regex>,
    subject: RegexSubject,
    ignore_schema: bool,
}

impl JoinKeyRule {
    /// Keep table names unchanged
    pub fn identity(ignore_schema: bool) -> Self {
        Self {
            pattern: None,
            subject: RegexSubject::TableName,
            ignore_schema,
        }
    }

    /// Compile a rule; the regex must have at least one capture group
    pub fn new(
        pattern: Option<&str>,
        subject: RegexSubject,
        ignore_schema: bool,
    ) -> Result<Self, ReconcileError> {
        let pattern = match pattern {
            Some(p) => {
                let re = Regex::new(p).map_err(|e| {
                    ReconcileError::Configuration(format!("Invalid table regex '{}': {}", p, e))
                })?;
                if re.captures_len() < 2 {
                    return Err(ReconcileError::Configuration(format!(
                        "Table regex '{}' has no capture group",
                        p
                    )));
                }
                Some(re)
            }
            None => None,
        };

        Ok(Self {
            pattern,
            subject,
            ignore_schema,
        })
    }

    pub fn ignore_schema(&self) -> bool {
        self.ignore_schema
    }

    /// Join key for one table
    pub fn normalize(&self, schema: &str, table: &str) -> Result<String, ReconcileError> {
        match self.subject {
            RegexSubject::TableName => normalize(table, self.pattern.as_ref(), schema, self.ignore_schema),
            RegexSubject::QualifiedName => {
                let qualified = format!("{}.{}", schema, table);
                match &self.pattern {
                    Some(re) => first_capture(re, &qualified),
                    None if self.ignore_schema => Ok(table.to_string()),
                    None => Ok(qualified),
                }
            }
        }
    }
}

/// Join key for a table name
///
/// Without a regex the whole name is used. With one, the first capture group
/// becomes the working name; a regex that does not match, or has no capture
/// group, is an error.
pub fn normalize(
    table_name: &str,
    side_regex: Option<&Regex>,
    schema_name: &str,
    ignore_schema: bool,
) -> Result<String, ReconcileError> {
    let name = match side_regex {
        Some(re) => first_capture(re, table_name)?,
        None => table_name.to_string(),
    };

    if ignore_schema {
        Ok(name)
    } else {
        Ok(format!("{}.{}", schema_name, name))
    }
}

fn first_capture(re: &Regex, subject: &str) -> Result<String, ReconcileError> {
    let captures = re.captures(subject).ok_or_else(|| ReconcileError::Normalization {
        subject: subject.to_string(),
        reason: format!("regex '{}' does not match", re.as_str()),
    })?;

    captures
        .get(1)
        .map(|m| m.as_str().to_string())
        .ok_or_else(|| ReconcileError::Normalization {
            subject: subject.to_string(),
            reason: format!("regex '{}' has no first capture group", re.as_str()),
        })
}

/// Assign join keys to one side's tables
///
/// Input order does not matter; duplicates collapse. Two distinct tables
/// mapping to one key fail with [`ReconcileError::AmbiguousJoinKey`].
pub fn assign_join_keys<I>(side: Side, tables: I, rule: &JoinKeyRule) -> Result<Vec<TableDescriptor>, ReconcileError>
where
    I: IntoIterator<Item = (String, String)>,
{
    let mut by_key: BTreeMap<String, TableDescriptor> = BTreeMap::new();

    for (schema, name) in tables {
        let join_key = rule.normalize(&schema, &name)?;

        if let Some(existing) = by_key.get(&join_key) {
            if existing.schema == schema && existing.name == name {
                continue;
            }

            let this = format!("{}.{}", schema, name);
            let other = existing.qualified_name();
            let (first, second) = if other <= this { (other, this) } else { (this, other) };

            return Err(ReconcileError::AmbiguousJoinKey {
                side,
                join_key,
                first,
                second,
            });
        }

        by_key.insert(
            join_key.clone(),
            TableDescriptor {
                schema,
                name,
                join_key,
            },
        );
    }

    Ok(by_key.into_values().collect())
}
