//! SQL engine kinds and data source identity

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// SQL engine family of a data source
///
/// Selects the cast, hash and window templates used when talking to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineKind {
    /// PostgreSQL
    Postgres,

    /// Amazon Redshift (PostgreSQL wire protocol, different function set)
    Redshift,

    /// MySQL / MariaDB
    #[serde(rename = "mysql")]
    MySql,
}

impl EngineKind {
    /// All engines with built-in templates
    pub const ALL: [EngineKind; 3] = [EngineKind::Postgres, EngineKind::Redshift, EngineKind::MySql];

    /// Stable lowercase name
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Postgres => "postgres",
            Self::Redshift => "redshift",
            Self::MySql => "mysql",
        }
    }

    /// Quote an identifier for this engine
    pub fn quote_ident(&self, ident: &str) -> String {
        match self {
            Self::Postgres | Self::Redshift => format!("\"{}\"", ident.replace('"', "\"\"")),
            Self::MySql => format!("`{}`", ident.replace('`', "``")),
        }
    }

    /// Quoted `schema.table` reference
    pub fn qualified_name(&self, schema: &str, table: &str) -> String {
        format!("{}.{}", self.quote_ident(schema), self.quote_ident(table))
    }
}

impl fmt::Display for EngineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for EngineKind {
    type Err = UnknownEngine;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "postgres" | "postgresql" => Ok(Self::Postgres),
            "redshift" => Ok(Self::Redshift),
            "mysql" | "mariadb" => Ok(Self::MySql),
            other => Err(UnknownEngine(other.to_string())),
        }
    }
}

/// Unknown engine name
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown engine kind '{0}'. Supported: postgres, redshift, mysql")]
pub struct UnknownEngine(pub String);

/// One side of a comparison
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Left,
    Right,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Left => write!(f, "left"),
            Self::Right => write!(f, "right"),
        }
    }
}

/// Named data source taking part in a comparison
///
/// The name is opaque to the engine; it is what the catalog and statement
/// collaborators use to route queries.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DataSourceAlias {
    /// Source name (e.g. `dwh_multi`)
    pub name: String,

    /// Engine family
    pub engine: EngineKind,
}

impl DataSourceAlias {
    /// Create a new alias
    pub fn new(name: impl Into<String>, engine: EngineKind) -> Self {
        Self {
            name: name.into(),
            engine,
        }
    }
}

impl fmt::Display for DataSourceAlias {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.engine)
    }
}
