use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::Serialize;
use tracing::info;

use crate::config::DispatcherConfig;
use crate::spec::{build_operations, merge_all, merge_all_in_directory, MergedSpec, RoleRequirement};

/// Command-line interface for the dispatcher's contract tooling
#[derive(Parser, Debug)]
#[command(name = "dispatch-cli")]
#[command(about = "Inspect and merge OpenAPI contracts for the dispatcher", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Configuration file (YAML or JSON)
    #[arg(long, global = true, env = "DISPATCH_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Where the contract documents come from.
#[derive(Args, Debug, Clone, Default)]
pub struct SpecSource {
    /// Specification document; repeat to merge several in the given order
    #[arg(long = "spec", value_name = "FILE")]
    pub specs: Vec<PathBuf>,

    /// Directory whose documents are merged in lexicographic order
    #[arg(long, value_name = "DIR")]
    pub spec_dir: Option<PathBuf>,
}

#[derive(ValueEnum, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Print the operation table of the merged contract
    Routes {
        #[command(flatten)]
        source: SpecSource,

        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },
    /// Write the merged contract to a file
    Merge {
        #[command(flatten)]
        source: SpecSource,

        /// Output file; `.json` writes JSON, anything else YAML
        #[arg(short, long)]
        out: PathBuf,
    },
}

/// One line of the `routes` listing.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RouteRow {
    pub method: String,
    pub path: String,
    pub operation_id: String,
    pub controller: String,
    pub handler_method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub roles: Option<RoleRequirement>,
}

/// Parse the process arguments and run the selected command against stdout.
pub fn run_cli() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    run(cli, &mut out)
}

/// Run a parsed command, writing user-facing output to `out`.
pub fn run(cli: Cli, out: &mut impl Write) -> anyhow::Result<()> {
    let config = DispatcherConfig::load(cli.config.as_deref())?;
    match cli.command {
        Commands::Routes { source, format } => {
            let merged = load_source(&source, &config)?;
            let rows = route_rows(&merged, &config.mount_prefix)?;
            match format {
                OutputFormat::Json => {
                    serde_json::to_writer_pretty(&mut *out, &rows)?;
                    writeln!(out)?;
                }
                OutputFormat::Text => write_table(out, &rows)?,
            }
        }
        Commands::Merge { source, out: target } => {
            let merged = load_source(&source, &config)?;
            let rendered = if is_json(&target) {
                serde_json::to_string_pretty(merged.document())?
            } else {
                merged.to_yaml()?
            };
            std::fs::write(&target, rendered)
                .with_context(|| format!("failed to write '{}'", target.display()))?;
            info!(
                sources = merged.sources().len(),
                out = %target.display(),
                "Merged contract written"
            );
            writeln!(
                out,
                "Merged {} document(s) into {}",
                merged.sources().len(),
                target.display()
            )?;
        }
    }
    Ok(())
}

fn load_source(source: &SpecSource, config: &DispatcherConfig) -> anyhow::Result<MergedSpec> {
    if !source.specs.is_empty() {
        return Ok(merge_all(&source.specs)?);
    }
    match source.spec_dir.as_ref().or(config.spec_dir.as_ref()) {
        Some(dir) => Ok(merge_all_in_directory(dir)?),
        None => bail!("no specification given: pass --spec <FILE> or --spec-dir <DIR>"),
    }
}

/// Operation rows in declaration order, paths as the route table serves them.
pub(crate) fn route_rows(merged: &MergedSpec, mount_prefix: &str) -> anyhow::Result<Vec<RouteRow>> {
    let prefix = mount_prefix.trim_end_matches('/');
    Ok(build_operations(merged)?
        .into_iter()
        .map(|op| RouteRow {
            method: op.method.to_string(),
            path: format!("{prefix}{}", op.path_template),
            operation_id: op.operation_id,
            controller: op.controller_name,
            handler_method: op.method_name,
            roles: op.required_roles,
        })
        .collect())
}

fn write_table(out: &mut impl Write, rows: &[RouteRow]) -> anyhow::Result<()> {
    let path_width = rows.iter().map(|r| r.path.len()).max().unwrap_or(4).max(4);
    let id_width = rows
        .iter()
        .map(|r| r.operation_id.len())
        .max()
        .unwrap_or(11)
        .max(11);
    writeln!(
        out,
        "{:<7} {:<path_width$} {:<id_width$} ROLES",
        "METHOD", "PATH", "OPERATIONID"
    )?;
    for row in rows {
        let roles = match &row.roles {
            Some(r) => serde_json::to_string(r)?,
            None => "-".to_string(),
        };
        writeln!(
            out,
            "{:<7} {:<path_width$} {:<id_width$} {}",
            row.method, row.path, row.operation_id, roles
        )?;
    }
    writeln!(out, "{} operation(s)", rows.len())?;
    Ok(())
}

fn is_json(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("json"))
}
