//! Type-to-Expression Catalog
//!
//! Per-engine SQL templates that turn a column into canonical text, hash and
//! sum it, and restrict a table to a time window. The canonical text of a
//! value is the same on every engine, so fingerprints computed on unrelated
//! dialects stay numerically comparable.
//!
//! Templates use `{name}` placeholders:
//! - casts: `{column}`
//! - `column_hash`: `{expr}`
//! - `row_concat`: `{expressions}`
//! - window predicates: `{column}`, `{this_month_start}`, `{last_month_start}`

use crate::dialect::EngineKind;
use crate::window::{Window, WindowBounds};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Text substituted for NULL before hashing
pub const NULL_SENTINEL: &str = "<null>";

/// Engine-neutral family of a SQL data type
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TypeFamily {
    Boolean,
    Integer,
    /// Fixed and floating point numbers
    Numeric,
    Text,
    Date,
    Timestamp,
}

impl TypeFamily {
    pub const ALL: [TypeFamily; 6] = [
        TypeFamily::Boolean,
        TypeFamily::Integer,
        TypeFamily::Numeric,
        TypeFamily::Text,
        TypeFamily::Date,
        TypeFamily::Timestamp,
    ];

    /// Date or timestamp
    pub fn is_temporal(&self) -> bool {
        matches!(self, Self::Date | Self::Timestamp)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Boolean => "boolean",
            Self::Integer => "integer",
            Self::Numeric => "numeric",
            Self::Text => "text",
            Self::Date => "date",
            Self::Timestamp => "timestamp",
        }
    }
}

impl fmt::Display for TypeFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for TypeFamily {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TypeFamily::ALL
            .into_iter()
            .find(|f| f.as_str() == s.trim())
            .ok_or_else(|| format!("Unknown type family '{}'", s))
    }
}

/// SQL fragment with `{placeholder}` slots
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExpressionTemplate(String);

impl ExpressionTemplate {
    pub fn new(template: impl Into<String>) -> Self {
        Self(template.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether `{name}` occurs in the template
    pub fn has_placeholder(&self, name: &str) -> bool {
        self.0.contains(&format!("{{{}}}", name))
    }

    /// Substitute placeholders in a single pass
    ///
    /// Substituted values are never rescanned, so identifiers containing
    /// braces cannot inject further substitutions. Unknown placeholders are
    /// left as written.
    pub fn render(&self, values: &[(&str, &str)]) -> String {
        let mut out = String::with_capacity(self.0.len() + 32);
        let mut rest = self.0.as_str();

        while let Some(open) = rest.find('{') {
            out.push_str(&rest[..open]);
            let after = &rest[open + 1..];

            let close = after.find('}').filter(|&close| {
                close > 0
                    && after[..close]
                        .chars()
                        .all(|c| c.is_ascii_alphanumeric() || c == '_')
            });

            match close {
                Some(close) => {
                    let name = &after[..close];
                    match values.iter().find(|(key, _)| *key == name) {
                        Some((_, value)) => out.push_str(value),
                        None => {
                            out.push('{');
                            out.push_str(name);
                            out.push('}');
                        }
                    }
                    rest = &after[close + 1..];
                }
                None => {
                    out.push('{');
                    rest = after;
                }
            }
        }

        out.push_str(rest);
        out
    }
}

impl From<&str> for ExpressionTemplate {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Templates for one engine
#[derive(Debug, Clone, PartialEq)]
pub struct EngineTemplates {
    /// Normalised data type name to family
    pub types: BTreeMap<String, TypeFamily>,

    /// Canonical text cast per family
    pub casts: BTreeMap<TypeFamily, ExpressionTemplate>,

    /// Row count rendered as text
    pub row_count: ExpressionTemplate,

    /// Hash-and-sum aggregate over a null-safe text expression
    pub column_hash: ExpressionTemplate,

    /// Concatenation of all cast expressions of a row
    pub row_concat: ExpressionTemplate,

    /// Separator placed between expressions inside `row_concat`
    pub concat_separator: String,

    /// Predicate per dated window
    pub windows: BTreeMap<Window, ExpressionTemplate>,
}

/// User-supplied changes to the built-in templates of one engine
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TemplateOverrides {
    /// Additional or replacement type mappings
    #[serde(default)]
    pub types: BTreeMap<String, TypeFamily>,

    /// Replacement casts keyed by family name
    #[serde(default)]
    pub casts: BTreeMap<String, ExpressionTemplate>,

    #[serde(default)]
    pub row_count: Option<ExpressionTemplate>,

    #[serde(default)]
    pub column_hash: Option<ExpressionTemplate>,

    #[serde(default)]
    pub row_concat: Option<ExpressionTemplate>,

    #[serde(default)]
    pub concat_separator: Option<String>,

    /// Replacement predicates keyed by window name
    #[serde(default)]
    pub windows: BTreeMap<String, ExpressionTemplate>,
}

impl EngineTemplates {
    fn apply(&mut self, engine: EngineKind, overrides: &TemplateOverrides) -> Result<(), TemplateError> {
        for (name, family) in &overrides.types {
            self.types.insert(type_key(name), *family);
        }

        for (key, cast) in &overrides.casts {
            let family = key.parse::<TypeFamily>().map_err(|_| TemplateError::UnknownOverrideKey {
                engine,
                section: "casts",
                key: key.clone(),
            })?;
            self.casts.insert(family, cast.clone());
        }

        for (key, predicate) in &overrides.windows {
            let window = key.parse::<Window>().map_err(|_| TemplateError::UnknownOverrideKey {
                engine,
                section: "windows",
                key: key.clone(),
            })?;
            self.windows.insert(window, predicate.clone());
        }

        if let Some(t) = &overrides.row_count {
            self.row_count = t.clone();
        }
        if let Some(t) = &overrides.column_hash {
            self.column_hash = t.clone();
        }
        if let Some(t) = &overrides.row_concat {
            self.row_concat = t.clone();
        }
        if let Some(sep) = &overrides.concat_separator {
            self.concat_separator = sep.clone();
        }

        Ok(())
    }

    /// Every problem with these templates, empty when usable
    pub fn problems(&self, engine: EngineKind) -> Vec<TemplateError> {
        let mut problems = Vec::new();

        let mut families: Vec<TypeFamily> = self.types.values().copied().collect();
        families.sort();
        families.dedup();
        for family in families {
            match self.casts.get(&family) {
                Some(cast) if !cast.has_placeholder("column") => {
                    problems.push(TemplateError::MissingPlaceholder {
                        engine,
                        template: format!("casts.{}", family),
                        placeholder: "column",
                    });
                }
                Some(_) => {}
                None => problems.push(TemplateError::MissingCast { engine, family }),
            }
        }

        if !self.column_hash.has_placeholder("expr") {
            problems.push(TemplateError::MissingPlaceholder {
                engine,
                template: "column_hash".to_string(),
                placeholder: "expr",
            });
        }

        if !self.row_concat.has_placeholder("expressions") {
            problems.push(TemplateError::MissingPlaceholder {
                engine,
                template: "row_concat".to_string(),
                placeholder: "expressions",
            });
        }

        for window in Window::ALL.into_iter().filter(Window::requires_date_column) {
            match self.windows.get(&window) {
                Some(predicate) if !predicate.has_placeholder("column") => {
                    problems.push(TemplateError::MissingPlaceholder {
                        engine,
                        template: format!("windows.{}", window),
                        placeholder: "column",
                    });
                }
                Some(_) => {}
                None => problems.push(TemplateError::MissingWindow { engine, window }),
            }
        }

        problems
    }
}

/// Errors raised while resolving or validating templates
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TemplateError {
    #[error("No templates configured for engine '{0}'")]
    UnknownEngine(EngineKind),

    #[error("Unsupported data type '{data_type}' for engine '{engine}'")]
    UnsupportedType { engine: EngineKind, data_type: String },

    #[error("Engine '{engine}' maps types to family '{family}' but has no cast template for it")]
    MissingCast { engine: EngineKind, family: TypeFamily },

    #[error("Engine '{engine}' has no predicate template for window '{window}'")]
    MissingWindow { engine: EngineKind, window: Window },

    #[error("Template '{template}' for engine '{engine}' is missing placeholder {{{placeholder}}}")]
    MissingPlaceholder {
        engine: EngineKind,
        template: String,
        placeholder: &'static str,
    },

    #[error("Unknown key '{key}' in [templates.{engine}.{section}]")]
    UnknownOverrideKey {
        engine: EngineKind,
        section: &'static str,
        key: String,
    },
}

/// Typed lookup `(EngineKind, data type | window) -> template`
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ExpressionCatalog {
    engines: BTreeMap<EngineKind, EngineTemplates>,
}

impl ExpressionCatalog {
    /// Catalog with templates for every supported engine
    pub fn builtin() -> Self {
        let mut engines = BTreeMap::new();
        engines.insert(EngineKind::Postgres, postgres_templates());
        engines.insert(EngineKind::Redshift, redshift_templates());
        engines.insert(EngineKind::MySql, mysql_templates());
        Self { engines }
    }

    /// Catalog without any engine
    pub fn empty() -> Self {
        Self::default()
    }

    /// Register or replace the templates of an engine
    pub fn insert(&mut self, engine: EngineKind, templates: EngineTemplates) {
        self.engines.insert(engine, templates);
    }

    /// Merge user overrides into the catalog
    ///
    /// Overrides for an engine without templates are ignored; validation
    /// reports that engine as unknown.
    pub fn with_overrides(
        mut self,
        overrides: &BTreeMap<EngineKind, TemplateOverrides>,
    ) -> Result<Self, TemplateError> {
        for (engine, engine_overrides) in overrides {
            if let Some(templates) = self.engines.get_mut(engine) {
                templates.apply(*engine, engine_overrides)?;
            }
        }
        Ok(self)
    }

    /// Templates for an engine
    pub fn engine(&self, engine: EngineKind) -> Result<&EngineTemplates, TemplateError> {
        self.engines
            .get(&engine)
            .ok_or(TemplateError::UnknownEngine(engine))
    }

    /// Every problem for the given engines
    pub fn problems_for(&self, engines: &[EngineKind]) -> Vec<TemplateError> {
        let mut problems = Vec::new();
        for engine in engines {
            match self.engines.get(engine) {
                Some(templates) => problems.extend(templates.problems(*engine)),
                None => problems.push(TemplateError::UnknownEngine(*engine)),
            }
        }
        problems
    }

    /// Validate the templates of the engines actually in use
    pub fn validate_for(&self, engines: &[EngineKind]) -> Result<(), TemplateError> {
        match self.problems_for(engines).into_iter().next() {
            Some(problem) => Err(problem),
            None => Ok(()),
        }
    }

    /// Family of a data type
    ///
    /// A mapping for the exact spelling, parameters included, wins over the
    /// one for the bare type name.
    pub fn family_of(&self, engine: EngineKind, data_type: &str) -> Result<TypeFamily, TemplateError> {
        let types = &self.engine(engine)?.types;
        types
            .get(&type_key(data_type))
            .or_else(|| types.get(&normalize_type_name(data_type)))
            .copied()
            .ok_or_else(|| TemplateError::UnsupportedType {
                engine,
                data_type: data_type.to_string(),
            })
    }

    /// Canonical text expression for a column
    pub fn cast_expression(
        &self,
        engine: EngineKind,
        data_type: &str,
        column: &str,
    ) -> Result<String, TemplateError> {
        let family = self.family_of(engine, data_type)?;
        let cast = self
            .engine(engine)?
            .casts
            .get(&family)
            .ok_or(TemplateError::MissingCast { engine, family })?;

        Ok(cast.render(&[("column", &engine.quote_ident(column))]))
    }

    /// Row count aggregate
    pub fn row_count_expression(&self, engine: EngineKind) -> Result<String, TemplateError> {
        Ok(self.engine(engine)?.row_count.render(&[]))
    }

    /// Hash-and-sum aggregate of a cast expression
    pub fn column_hash_expression(&self, engine: EngineKind, cast: &str) -> Result<String, TemplateError> {
        let safe = null_safe(cast);
        Ok(self.engine(engine)?.column_hash.render(&[("expr", &safe)]))
    }

    /// Hash-and-sum aggregate of the concatenation of all cast expressions
    pub fn row_hash_expression(&self, engine: EngineKind, casts: &[String]) -> Result<String, TemplateError> {
        let templates = self.engine(engine)?;
        let joined = casts
            .iter()
            .map(|c| null_safe(c))
            .collect::<Vec<_>>()
            .join(&templates.concat_separator);
        let row = templates.row_concat.render(&[("expressions", &joined)]);

        Ok(templates.column_hash.render(&[("expr", &row)]))
    }

    /// WHERE predicate for a window, `None` for [`Window::All`]
    pub fn window_predicate(
        &self,
        engine: EngineKind,
        window: Window,
        date_column: &str,
        bounds: &WindowBounds,
    ) -> Result<Option<String>, TemplateError> {
        if !window.requires_date_column() {
            return Ok(None);
        }

        let predicate = self
            .engine(engine)?
            .windows
            .get(&window)
            .ok_or(TemplateError::MissingWindow { engine, window })?;

        let column = engine.quote_ident(date_column);
        let [(this_key, this_value), (last_key, last_value)] = bounds.placeholders();

        Ok(Some(predicate.render(&[
            ("column", &column),
            (this_key, &this_value),
            (last_key, &last_value),
        ])))
    }
}

/// Wrap an expression so NULL hashes to a fixed sentinel
pub fn null_safe(expr: &str) -> String {
    format!("COALESCE({}, '{}')", expr, NULL_SENTINEL)
}

/// Lowercase, strip type parameters and sign modifiers
///
/// `character varying(255)` becomes `character varying`,
/// `timestamp(6) without time zone` becomes `timestamp without time zone`.
pub fn normalize_type_name(data_type: &str) -> String {
    let mut base = String::with_capacity(data_type.len());
    let mut depth = 0usize;
    for ch in data_type.chars() {
        match ch {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            _ if depth == 0 => base.push(ch),
            _ => {}
        }
    }

    base.to_lowercase()
        .split_whitespace()
        .filter(|word| *word != "unsigned" && *word != "zerofill")
        .collect::<Vec<_>>()
        .join(" ")
}

/// Lookup key for a configured type name: parameterised names keep their
/// parameters, everything else is normalized
fn type_key(data_type: &str) -> String {
    if data_type.contains('(') {
        data_type
            .to_lowercase()
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect()
    } else {
        normalize_type_name(data_type)
    }
}

fn type_map(entries: &[(&[&str], TypeFamily)]) -> BTreeMap<String, TypeFamily> {
    entries
        .iter()
        .flat_map(|(names, family)| names.iter().map(move |n| (n.to_string(), *family)))
        .collect()
}

fn postgres_types() -> BTreeMap<String, TypeFamily> {
    type_map(&[
        (&["boolean", "bool"], TypeFamily::Boolean),
        (
            &[
                "smallint", "integer", "bigint", "int", "int2", "int4", "int8",
                "smallserial", "serial", "bigserial", "oid",
            ],
            TypeFamily::Integer,
        ),
        (
            &["numeric", "decimal", "real", "double precision", "float4", "float8", "money"],
            TypeFamily::Numeric,
        ),
        (
            &[
                "character varying", "varchar", "character", "char", "bpchar", "text",
                "name", "citext", "uuid", "json", "jsonb", "xml", "inet", "cidr",
                "macaddr", "bytea", "interval", "time", "time without time zone",
                "time with time zone", "timetz",
            ],
            TypeFamily::Text,
        ),
        (&["date"], TypeFamily::Date),
        (
            &[
                "timestamp", "timestamp without time zone", "timestamp with time zone",
                "timestamptz",
            ],
            TypeFamily::Timestamp,
        ),
    ])
}

fn dated_windows(date_literal: &str) -> BTreeMap<Window, ExpressionTemplate> {
    let lit = |placeholder: &str| date_literal.replace("{value}", placeholder);
    let mut windows = BTreeMap::new();
    windows.insert(
        Window::ThisMonth,
        ExpressionTemplate::new(format!("{{column}} >= {}", lit("{this_month_start}"))),
    );
    windows.insert(
        Window::LastMonth,
        ExpressionTemplate::new(format!(
            "{{column}} >= {} AND {{column}} < {}",
            lit("{last_month_start}"),
            lit("{this_month_start}")
        )),
    );
    windows.insert(
        Window::BeforeLastMonth,
        ExpressionTemplate::new(format!("{{column}} < {}", lit("{last_month_start}"))),
    );
    windows
}

fn postgres_templates() -> EngineTemplates {
    let mut casts = BTreeMap::new();
    casts.insert(
        TypeFamily::Boolean,
        "CASE WHEN {column} THEN '1' WHEN NOT {column} THEN '0' END".into(),
    );
    casts.insert(TypeFamily::Integer, "CAST({column} AS TEXT)".into());
    casts.insert(
        TypeFamily::Numeric,
        "CAST(CAST({column} AS NUMERIC(38, 6)) AS TEXT)".into(),
    );
    casts.insert(TypeFamily::Text, "CAST({column} AS TEXT)".into());
    casts.insert(TypeFamily::Date, "TO_CHAR({column}, 'YYYY-MM-DD')".into());
    casts.insert(
        TypeFamily::Timestamp,
        "TO_CHAR({column}, 'YYYY-MM-DD HH24:MI:SS')".into(),
    );

    EngineTemplates {
        types: postgres_types(),
        casts,
        row_count: "CAST(COUNT(*) AS TEXT)".into(),
        column_hash: "CAST(COALESCE(SUM(('x' || SUBSTR(MD5({expr}), 1, 8))::BIT(32)::BIGINT), 0) AS TEXT)"
            .into(),
        row_concat: "CONCAT_WS('|', {expressions})".into(),
        concat_separator: ", ".to_string(),
        windows: dated_windows("DATE '{value}'"),
    }
}

fn redshift_templates() -> EngineTemplates {
    let mut casts = BTreeMap::new();
    casts.insert(
        TypeFamily::Boolean,
        "CASE WHEN {column} THEN '1' WHEN NOT {column} THEN '0' END".into(),
    );
    casts.insert(TypeFamily::Integer, "CAST({column} AS VARCHAR(64))".into());
    casts.insert(
        TypeFamily::Numeric,
        "CAST(CAST({column} AS DECIMAL(38, 6)) AS VARCHAR(64))".into(),
    );
    casts.insert(TypeFamily::Text, "CAST({column} AS VARCHAR(65535))".into());
    casts.insert(TypeFamily::Date, "TO_CHAR({column}, 'YYYY-MM-DD')".into());
    casts.insert(
        TypeFamily::Timestamp,
        "TO_CHAR({column}, 'YYYY-MM-DD HH24:MI:SS')".into(),
    );

    // Redshift has no CONCAT_WS; rows are joined with || instead.
    EngineTemplates {
        types: postgres_types(),
        casts,
        row_count: "CAST(COUNT(*) AS VARCHAR(32))".into(),
        column_hash: "CAST(COALESCE(SUM(STRTOL(SUBSTRING(MD5({expr}), 1, 8), 16)), 0) AS VARCHAR(64))"
            .into(),
        row_concat: "({expressions})".into(),
        concat_separator: " || '|' || ".to_string(),
        windows: dated_windows("DATE '{value}'"),
    }
}

fn mysql_templates() -> EngineTemplates {
    // information_schema reports BOOLEAN columns as tinyint; only the
    // column type `tinyint(1)` tells them apart
    let types = type_map(&[
        (&["bool", "boolean", "tinyint(1)"], TypeFamily::Boolean),
        (
            &["tinyint", "smallint", "mediumint", "int", "integer", "bigint", "year"],
            TypeFamily::Integer,
        ),
        (
            &["decimal", "numeric", "float", "double", "double precision", "real"],
            TypeFamily::Numeric,
        ),
        (
            &[
                "char", "varchar", "tinytext", "text", "mediumtext", "longtext", "enum",
                "set", "json", "time", "binary", "varbinary", "blob",
            ],
            TypeFamily::Text,
        ),
        (&["date"], TypeFamily::Date),
        (&["datetime", "timestamp"], TypeFamily::Timestamp),
    ]);

    let mut casts = BTreeMap::new();
    casts.insert(
        TypeFamily::Boolean,
        "CASE WHEN {column} THEN '1' WHEN NOT {column} THEN '0' END".into(),
    );
    casts.insert(TypeFamily::Integer, "CAST({column} AS CHAR)".into());
    casts.insert(
        TypeFamily::Numeric,
        "CAST(CAST({column} AS DECIMAL(38, 6)) AS CHAR)".into(),
    );
    casts.insert(TypeFamily::Text, "CAST({column} AS CHAR)".into());
    casts.insert(TypeFamily::Date, "DATE_FORMAT({column}, '%Y-%m-%d')".into());
    casts.insert(
        TypeFamily::Timestamp,
        "DATE_FORMAT({column}, '%Y-%m-%d %H:%i:%s')".into(),
    );

    EngineTemplates {
        types,
        casts,
        row_count: "CAST(COUNT(*) AS CHAR)".into(),
        column_hash:
            "CAST(COALESCE(SUM(CAST(CONV(SUBSTRING(MD5({expr}), 1, 8), 16, 10) AS UNSIGNED)), 0) AS CHAR)"
                .into(),
        row_concat: "CONCAT_WS('|', {expressions})".into(),
        concat_separator: ", ".to_string(),
        windows: dated_windows("'{value}'"),
    }
}
