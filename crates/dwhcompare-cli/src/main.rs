mod output;

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::{Path, PathBuf};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use dwhcompare_catalog::{CatalogFilter, MockSource, PostgresSource, WarehouseAdapter};
use dwhcompare_core::config::DEFAULT_CONFIG_FILE;
use dwhcompare_core::{Config, EngineKind, Side, Window};
use dwhcompare_engine::{assign_join_keys, JoinKeyRule, ReconcileOptions, Reconciler};

/// dwhcompare - reconcile tables, columns and content across two warehouses
#[derive(Parser)]
#[command(name = "dwhcompare")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to config file (default: dwhcompare.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compare two data sources
    Compare {
        /// Left source name (overrides comparison.left)
        #[arg(long)]
        left: Option<String>,

        /// Right source name (overrides comparison.right)
        #[arg(long)]
        right: Option<String>,

        /// Restrict to a schema (repeatable)
        #[arg(long = "schema")]
        schemas: Vec<String>,

        /// Restrict to a table (repeatable)
        #[arg(long = "table")]
        tables: Vec<String>,

        /// Restrict to a table type such as VIEW (repeatable)
        #[arg(long = "table-type")]
        table_types: Vec<String>,

        /// Match tables by name only
        #[arg(long)]
        ignore_schema: bool,

        /// Table regex for the left source
        #[arg(long)]
        left_regex: Option<String>,

        /// Table regex for the right source
        #[arg(long)]
        right_regex: Option<String>,

        /// Window to fingerprint (repeatable; default: all four)
        #[arg(long = "window")]
        windows: Vec<Window>,

        /// Reference instant for windows (RFC 3339 or YYYY-MM-DD; default: now)
        #[arg(long)]
        as_of: Option<String>,

        /// Output file for report.json
        #[arg(short, long, default_value = "dwhcompare-report.json")]
        output: PathBuf,

        /// Also output a CSV report
        #[arg(long)]
        csv: Option<PathBuf>,

        /// Also output markdown report
        #[arg(short, long)]
        markdown: Option<PathBuf>,

        /// Exit with status 2 when any discrepancy is found
        #[arg(long)]
        fail_on_drift: bool,
    },

    /// Show the join keys a source produces
    Keys {
        /// Source name
        source: String,

        /// Table regex (overrides the source's table_regex)
        #[arg(long)]
        regex: Option<String>,
    },

    /// Validate config and templates without connecting
    CheckConfig,
}

/// Command-line overrides for `compare`
#[derive(Debug, Default, Clone)]
struct CompareOverrides {
    left: Option<String>,
    right: Option<String>,
    schemas: Vec<String>,
    tables: Vec<String>,
    table_types: Vec<String>,
    ignore_schema: bool,
    left_regex: Option<String>,
    right_regex: Option<String>,
    windows: Vec<Window>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    dotenvy::dotenv().ok();

    let default_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .init();

    let config = load_config(cli.config.as_deref(), cli.verbose)?;

    match cli.command {
        Commands::Compare {
            left,
            right,
            schemas,
            tables,
            table_types,
            ignore_schema,
            left_regex,
            right_regex,
            windows,
            as_of,
            output,
            csv,
            markdown,
            fail_on_drift,
        } => {
            let overrides = CompareOverrides {
                left,
                right,
                schemas,
                tables,
                table_types,
                ignore_schema,
                left_regex,
                right_regex,
                windows,
            };
            let as_of = match as_of {
                Some(value) => parse_as_of(&value)?,
                None => Utc::now(),
            };

            let drift = compare_command(
                config,
                &overrides,
                as_of,
                &output,
                csv.as_deref(),
                markdown.as_deref(),
                cli.verbose,
            )
            .await?;

            if drift && fail_on_drift {
                std::process::exit(2);
            }
            Ok(())
        }
        Commands::Keys { source, regex } => keys_command(&config, &source, regex.as_deref()).await,
        Commands::CheckConfig => check_config_command(&config),
    }
}

/// Load the config file, falling back to defaults
fn load_config(path: Option<&Path>, verbose: bool) -> Result<Config> {
    if let Some(path) = path {
        return Config::from_file(path).with_context(|| format!("Failed to load {}", path.display()));
    }

    let default = Path::new(DEFAULT_CONFIG_FILE);
    if default.exists() {
        return Config::from_file(default).with_context(|| format!("Failed to load {}", default.display()));
    }

    if verbose {
        eprintln!("{}", "No config file found, using defaults".yellow());
    }
    Ok(Config::default())
}

/// Parse `--as-of`: RFC 3339, or a date meaning midnight UTC
fn parse_as_of(value: &str) -> Result<DateTime<Utc>> {
    if let Ok(instant) = DateTime::parse_from_rfc3339(value) {
        return Ok(instant.with_timezone(&Utc));
    }

    let date = NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .with_context(|| format!("Invalid --as-of '{}': expected RFC 3339 or YYYY-MM-DD", value))?;
    Ok(date.and_time(chrono::NaiveTime::MIN).and_utc())
}

/// Apply command-line overrides on top of the config file
fn apply_overrides(mut config: Config, overrides: &CompareOverrides) -> Result<(Config, String, String)> {
    let comparison = &mut config.comparison;
    if overrides.left.is_some() {
        comparison.left = overrides.left.clone();
    }
    if overrides.right.is_some() {
        comparison.right = overrides.right.clone();
    }
    if !overrides.schemas.is_empty() {
        comparison.schemas = overrides.schemas.clone();
    }
    if !overrides.tables.is_empty() {
        comparison.tables = overrides.tables.clone();
    }
    if !overrides.table_types.is_empty() {
        comparison.table_types = overrides.table_types.clone();
    }
    if overrides.ignore_schema {
        comparison.ignore_schema = true;
    }
    if !overrides.windows.is_empty() {
        comparison.windows = overrides.windows.clone();
    }

    let left = comparison
        .left
        .clone()
        .context("No left source. Pass --left or set comparison.left in dwhcompare.toml")?;
    let right = comparison
        .right
        .clone()
        .context("No right source. Pass --right or set comparison.right in dwhcompare.toml")?;

    for (name, regex) in [(&left, &overrides.left_regex), (&right, &overrides.right_regex)] {
        if let Some(regex) = regex {
            let source = config
                .sources
                .get_mut(name)
                .with_context(|| format!("Unknown data source '{}'", name))?;
            source.table_regex = Some(regex.clone());
        }
    }

    config.validate()?;
    Ok((config, left, right))
}

/// Open a configured source: fixture file or live connection
async fn open_source(config: &Config, name: &str) -> Result<Box<dyn WarehouseAdapter>> {
    let source = config.source(name)?;

    if let Some(fixture) = &source.fixture {
        let path = config.resolve_path(fixture);
        tracing::debug!(source = name, fixture = %path.display(), "Serving source from fixture");
        let mock = MockSource::from_fixture_file(&path)
            .with_context(|| format!("Failed to load fixture {} for source '{}'", path.display(), name))?;
        return Ok(Box::new(mock));
    }

    match source.engine {
        EngineKind::Postgres | EngineKind::Redshift => {
            let connection = source.connection_string(name)?;
            tracing::debug!(source = name, engine = %source.engine, tls = source.tls, "Connecting");
            let adapter = PostgresSource::from_connection_string(&connection, source.tls)
                .await
                .with_context(|| format!("Failed to connect to source '{}'", name))?;
            Ok(Box::new(adapter))
        }
        EngineKind::MySql => anyhow::bail!(
            "Source '{}' uses engine mysql, which has no live driver. Set sources.{}.fixture instead.",
            name,
            name
        ),
    }
}

/// Compare command - full reconciliation; returns whether anything differs
async fn compare_command(
    config: Config,
    overrides: &CompareOverrides,
    as_of: DateTime<Utc>,
    output: &Path,
    csv: Option<&Path>,
    markdown: Option<&Path>,
    verbose: bool,
) -> Result<bool> {
    let (config, left_name, right_name) = apply_overrides(config, overrides)?;

    let reconciler = Reconciler::from_config(&config)?;
    let options = ReconcileOptions::from_config(&config, &left_name, &right_name, as_of)?.with_metadata(
        serde_json::json!({
            "config_hash": config.hash(),
            "tool_version": env!("CARGO_PKG_VERSION"),
        }),
    );

    if verbose {
        eprintln!(
            "{} {} vs {} (as of {})",
            "Comparing".cyan(),
            options.left.source,
            options.right.source,
            as_of.to_rfc3339()
        );
    }

    let left = open_source(&config, &left_name).await?;
    let right = open_source(&config, &right_name).await?;

    for (side, adapter, alias) in [
        (Side::Left, &left, &options.left.source),
        (Side::Right, &right, &options.right.source),
    ] {
        adapter
            .test_connection(alias)
            .await
            .with_context(|| format!("The {} source {} is unavailable", side, alias))?;
        if verbose {
            eprintln!("{} {} ({})", "✓ Connected to".green(), alias, adapter.name());
        }
    }

    let report = reconciler
        .run(&options, left.as_ref(), right.as_ref())
        .await
        .context("Reconciliation failed")?;

    report
        .save_to_file(output)
        .with_context(|| format!("Failed to write {}", output.display()))?;
    if verbose {
        eprintln!("{} {}", "Report saved to:".green(), output.display());
    }

    if let Some(path) = csv {
        let file = std::fs::File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
        output::write_csv(&report, file).with_context(|| format!("Failed to write {}", path.display()))?;
        if verbose {
            eprintln!("{} {}", "CSV report saved to:".green(), path.display());
        }
    }

    if let Some(path) = markdown {
        std::fs::write(path, output::generate_markdown_report(&report))
            .with_context(|| format!("Failed to write {}", path.display()))?;
        if verbose {
            eprintln!("{} {}", "Markdown report saved to:".green(), path.display());
        }
    }

    output::print_report_summary(&report);

    Ok(report.has_discrepancies())
}

/// Keys command - preview join keys for one source
async fn keys_command(config: &Config, name: &str, regex: Option<&str>) -> Result<()> {
    let source_config = config.source(name)?;
    let alias = config.alias(name)?;
    let rule = JoinKeyRule::new(
        regex.or(source_config.table_regex.as_deref()),
        source_config.regex_subject,
        config.comparison.ignore_schema,
    )?;

    let adapter = open_source(config, name).await?;
    let filter = CatalogFilter::new()
        .with_schemas(config.comparison.schemas.iter().cloned())
        .with_tables(config.comparison.tables.iter().cloned())
        .with_table_types(config.comparison.table_types.iter().cloned());

    let rows = adapter
        .list_columns(&alias, &filter)
        .await
        .with_context(|| format!("Failed to read the catalog of {}", alias))?;

    let mut tables: Vec<(String, String)> = rows.into_iter().map(|r| (r.schema, r.table)).collect();
    tables.sort();
    tables.dedup();

    let side = comparison_side(config, name);
    let descriptors = assign_join_keys(side, tables, &rule)?;

    println!(
        "{} {} as the {} side ({} tables)",
        "Join keys for".bold(),
        alias,
        side,
        descriptors.len()
    );
    for table in &descriptors {
        println!("  {} {} {}", table.qualified_name(), "→".bright_blue(), table.join_key.green());
    }

    Ok(())
}

/// Side a source plays in `[comparison]`; sources outside it count as left
fn comparison_side(config: &Config, name: &str) -> Side {
    let comparison = &config.comparison;
    if comparison.right.as_deref() == Some(name) && comparison.left.as_deref() != Some(name) {
        Side::Right
    } else {
        Side::Left
    }
}

/// Check-config command - validate everything that needs no connection
fn check_config_command(config: &Config) -> Result<()> {
    let mut problems: Vec<String> = match config.validate() {
        Ok(()) => Vec::new(),
        Err(dwhcompare_core::ConfigError::Validation(problems)) => problems,
        Err(e) => vec![e.to_string()],
    };

    match Reconciler::from_config(config) {
        Ok(reconciler) => {
            let mut engines: Vec<EngineKind> = config.sources.values().map(|s| s.engine).collect();
            engines.sort();
            engines.dedup();
            problems.extend(
                reconciler
                    .catalog()
                    .problems_for(&engines)
                    .into_iter()
                    .map(|p| p.to_string()),
            );
        }
        Err(e) => problems.push(e.to_string()),
    }

    if problems.is_empty() {
        println!(
            "{} {} sources, config hash {}",
            "✓ Configuration is valid:".green().bold(),
            config.sources.len(),
            config.hash()
        );
        return Ok(());
    }

    println!("{}", "Configuration problems:".red().bold());
    for problem in &problems {
        println!("  {} {}", "✗".red(), problem);
    }
    anyhow::bail!("{} configuration problem(s)", problems.len())
}
