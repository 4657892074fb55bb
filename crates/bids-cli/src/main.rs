mod config;
mod convert;
mod logging;
mod sidecar;

use anyhow::{bail, Context, Result};
use bids_core::ColumnSchema;
use bids_registry::{ParticipantRegistry, ParticipantTable};
use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use std::fs;
use std::path::PathBuf;
use tracing::info;

#[derive(Parser)]
#[command(name = "bids")]
#[command(about = "Participant registry for BIDS conversions", long_about = None)]
struct Cli {
    /// Run configuration (TOML)
    #[arg(long, global = true, env = "BIDS_CONFIG")]
    config: Option<PathBuf>,
    #[arg(long, global = true)]
    debug: bool,
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
#[command(rename_all = "kebab-case")]
enum Commands {
    /// Register session sidecars and export participants.tsv
    Convert(ConvertArgs),
    /// Check an existing participants table against a schema
    Check(CheckArgs),
    /// Print or write the normalized participant schema
    Schema(SchemaArgs),
}

#[derive(Args, Debug)]
struct ConvertArgs {
    /// Sidecar file or directory of sidecars
    #[arg(long)]
    input: PathBuf,
    #[arg(long)]
    schema: Option<PathBuf>,
    #[arg(long)]
    output: Option<PathBuf>,
    #[arg(long)]
    allow_conflicts: bool,
    /// Accept units without a session identifier
    #[arg(long)]
    no_session: bool,
    /// Treat empty strings as missing when merging
    #[arg(long)]
    empty_as_missing: bool,
    #[arg(long)]
    jobs: Option<usize>,
    #[arg(long)]
    json: bool,
}

#[derive(Args, Debug)]
struct CheckArgs {
    #[arg(long)]
    schema: Option<PathBuf>,
    #[arg(long)]
    table: PathBuf,
}

#[derive(Args, Debug)]
struct SchemaArgs {
    #[arg(long)]
    schema: Option<PathBuf>,
    #[arg(long)]
    out: Option<PathBuf>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = config::load_config(cli.config.as_deref())?;
    if cli.log_dir.is_some() {
        config.log_dir = cli.log_dir.clone();
    }

    let level = logging::resolve_level(cli.debug, &config.log_level);
    let run_id = Utc::now().format("%Y%m%dT%H%M%S").to_string();
    let guard = logging::init_logging(&level, config.log_dir.as_deref(), &run_id)?;
    if let Some(log_file) = &guard.log_file {
        info!(log = %log_file.display(), "logging to file");
    }

    match cli.command {
        Commands::Convert(args) => {
            apply_convert_args(&mut config, &args)?;
            let report = convert::run_convert(&config, &args.input)?;
            if args.json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                for unit in &report.units {
                    println!("{}\t{}", unit.prefix, unit.path.display());
                }
                println!(
                    "{} units, {} subjects, {} rows {} {}",
                    report.units.len(),
                    report.subjects,
                    report.rows_written,
                    if report.appended { "appended to" } else { "written to" },
                    report.participants_tsv.display()
                );
            }
        }
        Commands::Check(args) => {
            if args.schema.is_some() {
                config.schema = args.schema;
            }
            let schema = load_schema(&config)?;
            let table = ParticipantTable::read_tsv(&args.table)?;
            let ordered = schema.matches_schema(table.columns());
            let registry = ParticipantRegistry::new(schema);
            if !registry.schema_compatible(Some(&table)) {
                bail!(
                    "{}: columns {:?} do not match schema columns {:?}",
                    args.table.display(),
                    table.columns(),
                    registry.schema().active_columns()
                );
            }
            if ordered {
                println!("{}: compatible ({} rows)", args.table.display(), table.len());
            } else {
                println!(
                    "{}: compatible, column order differs ({} rows)",
                    args.table.display(),
                    table.len()
                );
            }
        }
        Commands::Schema(args) => {
            if args.schema.is_some() {
                config.schema = args.schema;
            }
            let schema = load_schema(&config)?;
            match args.out {
                Some(path) => {
                    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                        fs::create_dir_all(parent)?;
                    }
                    schema.dump_definitions(&path)?;
                    println!("Schema written to {}", path.display());
                }
                None => println!("{}", schema.to_json_string()?),
            }
        }
    }

    let warnings = guard.counts.warnings();
    let errors = guard.counts.errors();
    if warnings > 0 || errors > 0 {
        info!(warnings, errors, "run finished with diagnostics");
    }
    if errors > 0 {
        bail!("{errors} error(s) logged during the run");
    }
    Ok(())
}

fn apply_convert_args(config: &mut config::RunConfig, args: &ConvertArgs) -> Result<()> {
    if let Some(schema) = &args.schema {
        config.schema = Some(schema.clone());
    }
    if let Some(output) = &args.output {
        config.output = Some(output.clone());
    }
    if args.allow_conflicts {
        config.allow_conflicts = true;
    }
    if args.no_session {
        config.session_required = false;
    }
    if args.empty_as_missing {
        config.empty_text_is_absent = true;
    }
    if let Some(jobs) = args.jobs {
        if jobs == 0 {
            bail!("--jobs must be at least 1");
        }
        config.jobs = jobs;
    }
    Ok(())
}

fn load_schema(config: &config::RunConfig) -> Result<ColumnSchema> {
    let path = config.schema_path()?;
    ColumnSchema::from_path(path)
        .with_context(|| format!("Failed to load schema {}", path.display()))
}
