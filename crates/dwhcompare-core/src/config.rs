//! Configuration schema (dwhcompare.toml)

use crate::dialect::{DataSourceAlias, EngineKind};
use crate::templates::TemplateOverrides;
use crate::window::Window;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Default config file name
pub const DEFAULT_CONFIG_FILE: &str = "dwhcompare.toml";

/// What a side's table regex is matched against
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum RegexSubject {
    /// Bare table name
    #[default]
    #[serde(rename = "table")]
    TableName,

    /// `schema.table`; the capture group becomes the whole join key
    #[serde(rename = "qualified")]
    QualifiedName,
}

/// One data source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceConfig {
    pub engine: EngineKind,

    /// Literal connection string
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connection: Option<String>,

    /// Environment variable holding the connection string
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connection_env: Option<String>,

    /// Require TLS
    #[serde(default)]
    pub tls: bool,

    /// Table name rewrite; the first capture group becomes the join key
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table_regex: Option<String>,

    #[serde(default)]
    pub regex_subject: RegexSubject,

    /// JSON fixture served by the in-memory source instead of a live connection
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fixture: Option<PathBuf>,
}

impl SourceConfig {
    /// Minimal source for an engine
    pub fn new(engine: EngineKind) -> Self {
        Self {
            engine,
            connection: None,
            connection_env: None,
            tls: false,
            table_regex: None,
            regex_subject: RegexSubject::default(),
            fixture: None,
        }
    }

    /// Resolve the connection string from config or environment
    pub fn connection_string(&self, name: &str) -> Result<String, ConfigError> {
        if let Some(connection) = &self.connection {
            return Ok(connection.clone());
        }

        match &self.connection_env {
            Some(var) => std::env::var(var).map_err(|_| ConfigError::MissingEnv {
                source_name: name.to_string(),
                var: var.clone(),
            }),
            None => Err(ConfigError::Invalid(format!(
                "Source '{}' has neither connection, connection_env nor fixture",
                name
            ))),
        }
    }
}

/// What to compare
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonConfig {
    /// Left source name
    #[serde(default)]
    pub left: Option<String>,

    /// Right source name
    #[serde(default)]
    pub right: Option<String>,

    /// Match tables by name only, ignoring the schema
    #[serde(default)]
    pub ignore_schema: bool,

    /// Schema filter (empty = all)
    #[serde(default)]
    pub schemas: Vec<String>,

    /// Table filter (empty = all)
    #[serde(default)]
    pub tables: Vec<String>,

    /// Table type filter such as `BASE TABLE` or `VIEW` (empty = all)
    #[serde(default)]
    pub table_types: Vec<String>,

    /// Windows to fingerprint
    #[serde(default = "default_windows")]
    pub windows: Vec<Window>,
}

fn default_windows() -> Vec<Window> {
    Window::ALL.to_vec()
}

impl Default for ComparisonConfig {
    fn default() -> Self {
        Self {
            left: None,
            right: None,
            ignore_schema: false,
            schemas: Vec::new(),
            tables: Vec::new(),
            table_types: Vec::new(),
            windows: default_windows(),
        }
    }
}

/// Main configuration structure
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Config {
    /// Named data sources
    #[serde(default)]
    pub sources: BTreeMap<String, SourceConfig>,

    #[serde(default)]
    pub comparison: ComparisonConfig,

    /// Template overrides keyed by engine name
    #[serde(default)]
    pub templates: BTreeMap<String, TemplateOverrides>,

    /// Directory relative paths are resolved against
    #[serde(skip)]
    pub project_root: PathBuf,
}

impl Config {
    /// Load config from TOML file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::IoError(format!("{}: {}", path.display(), e)))?;

        let mut config = Self::from_toml(&contents)?;

        if let Some(parent) = path.parent() {
            config.project_root = parent.to_path_buf();
        }

        Ok(config)
    }

    /// Load config from TOML string
    pub fn from_toml(toml: &str) -> Result<Self, ConfigError> {
        toml::from_str(toml).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Look up a source
    pub fn source(&self, name: &str) -> Result<&SourceConfig, ConfigError> {
        self.sources
            .get(name)
            .ok_or_else(|| ConfigError::UnknownSource(name.to_string()))
    }

    /// Alias for a configured source
    pub fn alias(&self, name: &str) -> Result<DataSourceAlias, ConfigError> {
        Ok(DataSourceAlias::new(name, self.source(name)?.engine))
    }

    /// Resolve a path relative to the config file
    pub fn resolve_path(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.project_root.join(path)
        }
    }

    /// Template overrides keyed by engine
    pub fn template_overrides(&self) -> Result<BTreeMap<EngineKind, TemplateOverrides>, ConfigError> {
        self.templates
            .iter()
            .map(|(name, overrides)| {
                let engine = name
                    .parse::<EngineKind>()
                    .map_err(|e| ConfigError::Invalid(e.to_string()))?;
                Ok((engine, overrides.clone()))
            })
            .collect()
    }

    /// Check everything that can be checked without connecting
    ///
    /// Returns all problems at once.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut problems = Vec::new();

        for (name, source) in &self.sources {
            if let Some(pattern) = &source.table_regex {
                match Regex::new(pattern) {
                    Ok(re) if re.captures_len() < 2 => problems.push(format!(
                        "sources.{}.table_regex '{}' has no capture group",
                        name, pattern
                    )),
                    Ok(_) => {}
                    Err(e) => problems.push(format!(
                        "sources.{}.table_regex '{}' does not compile: {}",
                        name, pattern, e
                    )),
                }
            }

            if source.connection.is_none() && source.connection_env.is_none() && source.fixture.is_none() {
                problems.push(format!(
                    "sources.{} needs one of connection, connection_env or fixture",
                    name
                ));
            }
        }

        let sides = [
            ("left", &self.comparison.left),
            ("right", &self.comparison.right),
        ];
        for (side, source) in sides {
            if let Some(source) = source {
                if !self.sources.contains_key(source) {
                    problems.push(format!("comparison.{} refers to unknown source '{}'", side, source));
                }
            }
        }

        if let (Some(left), Some(right)) = (&self.comparison.left, &self.comparison.right) {
            if left == right {
                problems.push(format!("comparison.left and comparison.right are both '{}'", left));
            }
        }

        if self.comparison.windows.is_empty() {
            problems.push("comparison.windows is empty".to_string());
        }

        if let Err(e) = self.template_overrides() {
            problems.push(e.to_string());
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(problems))
        }
    }

    /// SHA-256 of the canonical configuration, without connection secrets
    pub fn hash(&self) -> String {
        let mut redacted = self.clone();
        for source in redacted.sources.values_mut() {
            if source.connection.is_some() {
                source.connection = Some("<redacted>".to_string());
            }
        }

        let canonical = toml::to_string(&redacted).unwrap_or_else(|_| format!("{:?}", redacted));
        let mut hasher = Sha256::new();
        hasher.update(canonical.as_bytes());
        hex::encode(hasher.finalize())
    }
}

/// Config error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Unknown data source '{0}'")]
    UnknownSource(String),

    #[error("Environment variable '{var}' for source '{source_name}' is not set")]
    MissingEnv { source_name: String, var: String },

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Invalid configuration:\n  - {}", .0.join("\n  - "))]
    Validation(Vec<String>),
}
