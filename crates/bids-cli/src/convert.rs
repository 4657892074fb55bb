use crate::config::RunConfig;
use crate::sidecar::{build_unit, discover_sidecars, read_sidecar};
use anyhow::{anyhow, bail, Context, Result};
use bids_core::{ColumnSchema, SessionPolicy};
use bids_registry::{
    ParticipantRegistry, ParticipantTable, RegisterOutcome, SessionUnit, SharedRegistry,
    PARTICIPANTS_JSON, PARTICIPANTS_TSV,
};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::thread;
use tracing::{info, warn};

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum UnitOutcome {
    Created,
    Merged,
    Conflicted,
}

impl From<&RegisterOutcome> for UnitOutcome {
    fn from(outcome: &RegisterOutcome) -> Self {
        match outcome {
            RegisterOutcome::Created => Self::Created,
            RegisterOutcome::Merged => Self::Merged,
            RegisterOutcome::Appended { .. } => Self::Conflicted,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct UnitSummary {
    pub source: PathBuf,
    pub prefix: String,
    pub path: PathBuf,
    pub outcome: UnitOutcome,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConvertReport {
    pub units: Vec<UnitSummary>,
    pub subjects: usize,
    pub rows_written: usize,
    pub appended: bool,
    pub participants_tsv: PathBuf,
}

struct UnitContext<'a> {
    schema: &'a ColumnSchema,
    registry: &'a SharedRegistry,
    policy: SessionPolicy,
    allow_conflicts: bool,
}

struct BuiltUnit {
    source: PathBuf,
    unit: SessionUnit,
}

impl BuiltUnit {
    fn subject(&self) -> &str {
        self.unit.identity.subject().unwrap_or_default()
    }
}

pub fn run_convert(config: &RunConfig, input: &Path) -> Result<ConvertReport> {
    let schema_path = config.schema_path()?;
    let output = config.output_dir()?;
    let schema = ColumnSchema::from_path(schema_path)
        .with_context(|| format!("Failed to load schema {}", schema_path.display()))?;
    info!(
        schema = %schema_path.display(),
        columns = schema.active_columns().len(),
        "participant schema loaded"
    );

    let sources = discover_sidecars(input)?;
    info!(input = %input.display(), sidecars = sources.len(), "sidecars discovered");

    let registry = SharedRegistry::new(ParticipantRegistry::with_policy(
        schema.clone(),
        config.merge_policy(),
    ));
    let context = UnitContext {
        schema: &schema,
        registry: &registry,
        policy: config.session_policy(),
        allow_conflicts: config.allow_conflicts,
    };

    let built: Vec<BuiltUnit> = fan_out(&sources, config.jobs, |chunk| {
        chunk
            .iter()
            .map(|source| build_from(&context, source))
            .collect()
    })?;
    let groups = group_by_subject(built);
    let mut units: Vec<UnitSummary> = fan_out(&groups, config.jobs, |chunk| {
        let mut summaries = Vec::new();
        for group in chunk {
            for built in group {
                summaries.push(register_built(&context, built)?);
            }
        }
        Ok(summaries)
    })?;
    units.sort_by(|a, b| a.source.cmp(&b.source));

    fs::create_dir_all(output)
        .with_context(|| format!("Failed to create output dir {}", output.display()))?;
    let participants_tsv = output.join(PARTICIPANTS_TSV);
    let has_rows = fs::metadata(&participants_tsv)
        .map(|metadata| metadata.is_file() && metadata.len() > 0)
        .unwrap_or(false);
    if has_rows {
        let existing = ParticipantTable::read_tsv(&participants_tsv)?;
        if !registry.schema_compatible(Some(&existing))? {
            bail!(
                "{} columns {:?} do not match schema columns {:?}",
                participants_tsv.display(),
                existing.columns(),
                schema.active_columns()
            );
        }
    }

    let export = registry.export_rows(&participants_tsv)?;
    let participants_json = output.join(PARTICIPANTS_JSON);
    if !participants_json.exists() {
        schema.dump_definitions(&participants_json)?;
    }

    let subjects = registry.with(|registry| registry.len())?;
    info!(
        units = units.len(),
        subjects,
        rows = export.rows_written,
        "participants exported"
    );
    Ok(ConvertReport {
        units,
        subjects,
        rows_written: export.rows_written,
        appended: export.appended,
        participants_tsv,
    })
}

/// Runs `work` over contiguous chunks of `items` on up to `jobs` scoped
/// threads. Results keep the order of `items`.
fn fan_out<T, R, F>(items: &[T], jobs: usize, work: F) -> Result<Vec<R>>
where
    T: Sync,
    R: Send,
    F: Fn(&[T]) -> Result<Vec<R>> + Sync,
{
    if jobs <= 1 || items.len() <= 1 {
        return work(items);
    }

    let chunk_size = items.len().div_ceil(jobs);
    let work = &work;
    thread::scope(|scope| {
        let workers: Vec<_> = items
            .chunks(chunk_size)
            .map(|chunk| scope.spawn(move || work(chunk)))
            .collect();

        let mut results = Vec::with_capacity(items.len());
        for worker in workers {
            let batch = worker
                .join()
                .map_err(|_| anyhow!("conversion worker panicked"))??;
            results.extend(batch);
        }
        Ok(results)
    })
}

/// Groups units by subject label. Each group keeps path order, so a subject's
/// history is built by one worker in the same order as a serial run.
fn group_by_subject(units: Vec<BuiltUnit>) -> Vec<Vec<BuiltUnit>> {
    let mut groups: BTreeMap<String, Vec<BuiltUnit>> = BTreeMap::new();
    for built in units {
        groups
            .entry(built.subject().to_string())
            .or_default()
            .push(built);
    }
    groups.into_values().collect()
}

fn build_from(context: &UnitContext<'_>, source: &Path) -> Result<BuiltUnit> {
    let record = read_sidecar(source)?;
    let unit = build_unit(context.schema, &record, context.policy, source)?;
    Ok(BuiltUnit {
        source: source.to_path_buf(),
        unit,
    })
}

fn register_built(context: &UnitContext<'_>, built: &BuiltUnit) -> Result<UnitSummary> {
    let BuiltUnit { source, unit } = built;
    let outcome = context
        .registry
        .register_unit(unit, context.allow_conflicts)
        .with_context(|| format!("Failed to register {}", source.display()))?;

    let summary = UnitSummary {
        source: source.clone(),
        prefix: unit.prefix(),
        path: unit.relative_path(context.policy == SessionPolicy::Required),
        outcome: UnitOutcome::from(&outcome),
    };
    if summary.outcome == UnitOutcome::Conflicted {
        warn!(
            source = %source.display(),
            prefix = %summary.prefix,
            "unit recorded with conflicting values"
        );
    }
    info!(prefix = %summary.prefix, path = %summary.path.display(), "unit registered");
    Ok(summary)
}
