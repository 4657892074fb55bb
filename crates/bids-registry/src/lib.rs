pub mod session;
pub mod shared;
pub mod table;

pub use session::SessionUnit;
pub use shared::SharedRegistry;
pub use table::{ParticipantTable, TableError};

use bids_core::{
    merge_snapshot, ColumnSchema, FieldConflict, FieldValue, MergePolicy, MetadataSnapshot,
    SchemaError,
};
use fs2::FileExt;
use std::collections::{BTreeMap, BTreeSet};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, error, warn};

pub const PARTICIPANTS_TSV: &str = "participants.tsv";
pub const PARTICIPANTS_JSON: &str = "participants.json";

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error(
        "{subject}/{}: conflicting participant values for {columns:?}: [{previous}] conflicts with [{current}]",
        .session.as_deref().unwrap_or("-")
    )]
    Conflict {
        subject: String,
        session: Option<String>,
        columns: Vec<String>,
        previous: String,
        current: String,
    },
    #[error("session unit has no valid subject identifier: {0}")]
    InvalidIdentity(String),
    #[error("schema error: {0}")]
    Schema(#[from] SchemaError),
    #[error("failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("registry lock poisoned")]
    Poisoned,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RegisterOutcome {
    /// First snapshot for the subject.
    Created,
    /// Last snapshot enriched in place.
    Merged,
    /// Conflicting snapshot kept as an additional history entry.
    Appended { conflicts: Vec<FieldConflict> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ExportReport {
    pub rows_written: usize,
    pub appended: bool,
}

/// Accumulates participant snapshots for a run. Each subject keeps an
/// append-only history; only its most recent entry may be completed in place.
#[derive(Debug, Clone)]
pub struct ParticipantRegistry {
    schema: ColumnSchema,
    policy: MergePolicy,
    subjects: BTreeMap<String, Vec<MetadataSnapshot>>,
}

impl ParticipantRegistry {
    pub fn new(schema: ColumnSchema) -> Self {
        Self::with_policy(schema, MergePolicy::default())
    }

    pub fn with_policy(schema: ColumnSchema, policy: MergePolicy) -> Self {
        Self {
            schema,
            policy,
            subjects: BTreeMap::new(),
        }
    }

    pub fn schema(&self) -> &ColumnSchema {
        &self.schema
    }

    pub fn policy(&self) -> MergePolicy {
        self.policy
    }

    /// Replaces the schema. Accumulated history is dropped with it.
    pub fn load_schema(&mut self, schema: ColumnSchema) {
        self.schema = schema;
        self.reset();
    }

    pub fn reset(&mut self) {
        self.subjects.clear();
    }

    /// Ends the run, handing back everything registered.
    pub fn close(self) -> ParticipantTable {
        self.export_table()
    }

    pub fn history(&self, subject: &str) -> Option<&[MetadataSnapshot]> {
        self.subjects.get(subject).map(Vec::as_slice)
    }

    pub fn subjects(&self) -> impl Iterator<Item = &str> {
        self.subjects.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.subjects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subjects.is_empty()
    }

    pub fn snapshot_count(&self) -> usize {
        self.subjects.values().map(Vec::len).sum()
    }

    pub fn register(
        &mut self,
        subject: &str,
        session: Option<&str>,
        mut snapshot: MetadataSnapshot,
        allow_conflict: bool,
    ) -> Result<RegisterOutcome, RegistryError> {
        snapshot.set(self.schema.id_column(), subject)?;

        let Some(history) = self.subjects.get_mut(subject) else {
            debug!(subject, "registering new participant");
            self.subjects.insert(subject.to_string(), vec![snapshot]);
            return Ok(RegisterOutcome::Created);
        };

        let Some(last) = history.last_mut() else {
            history.push(snapshot);
            return Ok(RegisterOutcome::Created);
        };

        let result = merge_snapshot(
            last,
            &snapshot,
            self.schema.active_columns(),
            self.policy,
        );
        if !result.has_conflicts() {
            debug!(subject, "participant values merged");
            *last = result.merged;
            return Ok(RegisterOutcome::Merged);
        }

        let columns: Vec<String> = result
            .conflicts
            .iter()
            .map(|conflict| conflict.column.clone())
            .collect();
        if !allow_conflict {
            let previous = self.schema.row(last);
            let current = self.schema.row(&result.merged);
            error!(
                subject,
                session = session.unwrap_or("-"),
                ?columns,
                %previous,
                %current,
                "participant values conflict"
            );
            return Err(RegistryError::Conflict {
                subject: subject.to_string(),
                session: session.map(str::to_string),
                columns,
                previous,
                current,
            });
        }

        warn!(
            subject,
            session = session.unwrap_or("-"),
            ?columns,
            "participants contain conflicting values, keeping both entries"
        );
        history.push(result.merged);
        Ok(RegisterOutcome::Appended {
            conflicts: result.conflicts,
        })
    }

    /// Registers a unit under its locked subject label.
    pub fn register_unit(
        &mut self,
        unit: &SessionUnit,
        allow_conflict: bool,
    ) -> Result<RegisterOutcome, RegistryError> {
        let identity = &unit.identity;
        let subject = match identity.subject() {
            Some(subject) if identity.is_subject_valid() => subject,
            _ => {
                return Err(RegistryError::InvalidIdentity(format!(
                    "subject {:?} (locked: {})",
                    identity.subject(),
                    identity.subject_slot().is_locked()
                )))
            }
        };
        self.register(
            subject,
            identity.session(),
            unit.values.clone(),
            allow_conflict,
        )
    }

    /// Writes every retained snapshot to `path`, subjects in label order.
    /// A new file gets a header; an existing one is appended to as is.
    pub fn export_rows(&self, path: impl AsRef<Path>) -> Result<ExportReport, RegistryError> {
        let path = path.as_ref();
        let io_error = |source: std::io::Error| RegistryError::Io {
            path: path.to_path_buf(),
            source,
        };

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(io_error)?;
        file.lock_exclusive().map_err(io_error)?;

        let result = file
            .metadata()
            .and_then(|metadata| {
                let appended = metadata.len() > 0;
                let (body, rows_written) = self.render_rows(!appended);
                file.write_all(body.as_bytes())?;
                file.flush()?;
                Ok(ExportReport {
                    rows_written,
                    appended,
                })
            })
            .map_err(io_error);
        let _ = file.unlock();

        let report = result?;
        if report.appended {
            warn!(
                path = %path.display(),
                "participants table already exists, some subjects may be duplicated"
            );
        }
        debug!(path = %path.display(), rows = report.rows_written, "participants exported");
        Ok(report)
    }

    fn render_rows(&self, with_header: bool) -> (String, usize) {
        let mut body = String::new();
        if with_header {
            body.push_str(&self.schema.header());
            body.push('\n');
        }
        let mut rows = 0;
        for snapshot in self.subjects.values().flatten() {
            body.push_str(&self.schema.row(snapshot));
            body.push('\n');
            rows += 1;
        }
        (body, rows)
    }

    pub fn export_table(&self) -> ParticipantTable {
        let columns = self.schema.active_columns().to_vec();
        let rows = self
            .subjects
            .values()
            .flatten()
            .map(|snapshot| {
                columns
                    .iter()
                    .map(|column| snapshot.get(column).cloned().unwrap_or(FieldValue::Absent))
                    .collect()
            })
            .collect();
        ParticipantTable::from_parts_unchecked(columns, rows)
    }

    /// Whether `table` could be appended to under the current schema.
    pub fn schema_compatible(&self, table: Option<&ParticipantTable>) -> bool {
        let Some(table) = table else {
            return true;
        };
        let active = self.schema.active_columns();
        if table.columns().len() != active.len() {
            return false;
        }
        let expected: BTreeSet<&str> = active.iter().map(String::as_str).collect();
        table
            .columns()
            .iter()
            .all(|column| expected.contains(column.as_str()))
    }
}
