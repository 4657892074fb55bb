use bids_core::{FieldValue, FIELD_SEPARATOR};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TableError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("table has no header line")]
    Empty,
    #[error("malformed table at line {line}: {reason}")]
    Malformed { line: usize, reason: String },
}

/// Column-labelled rows, as exported from a registry or read back from a
/// persisted participants file.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ParticipantTable {
    columns: Vec<String>,
    rows: Vec<Vec<FieldValue>>,
}

impl ParticipantTable {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<FieldValue>>) -> Result<Self, TableError> {
        let mut seen = BTreeSet::new();
        for column in &columns {
            if !seen.insert(column.as_str()) {
                return Err(TableError::Malformed {
                    line: 1,
                    reason: format!("duplicate column {column}"),
                });
            }
        }
        for (index, row) in rows.iter().enumerate() {
            if row.len() != columns.len() {
                return Err(TableError::Malformed {
                    line: index + 2,
                    reason: format!("expected {} fields, found {}", columns.len(), row.len()),
                });
            }
        }
        Ok(Self { columns, rows })
    }

    pub(crate) fn from_parts_unchecked(columns: Vec<String>, rows: Vec<Vec<FieldValue>>) -> Self {
        Self { columns, rows }
    }

    pub fn parse_tsv(text: &str) -> Result<Self, TableError> {
        let mut lines = text.lines().enumerate();
        let header = match lines.next() {
            Some((_, line)) if !line.trim().is_empty() => line,
            _ => return Err(TableError::Empty),
        };
        let columns: Vec<String> = header
            .split(FIELD_SEPARATOR)
            .map(|column| column.trim().to_string())
            .collect();

        let mut rows = Vec::new();
        for (index, line) in lines {
            if line.trim().is_empty() {
                continue;
            }
            let cells: Vec<FieldValue> = line
                .split(FIELD_SEPARATOR)
                .map(FieldValue::parse_cell)
                .collect();
            if cells.len() != columns.len() {
                return Err(TableError::Malformed {
                    line: index + 1,
                    reason: format!("expected {} fields, found {}", columns.len(), cells.len()),
                });
            }
            rows.push(cells);
        }

        Self::new(columns, rows)
    }

    pub fn read_tsv(path: impl AsRef<Path>) -> Result<Self, TableError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| TableError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse_tsv(&text)
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<FieldValue>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, column: &str) -> Option<usize> {
        self.columns.iter().position(|name| name == column)
    }

    pub fn get(&self, row: usize, column: &str) -> Option<&FieldValue> {
        let index = self.column_index(column)?;
        self.rows.get(row).and_then(|cells| cells.get(index))
    }

    /// All values of one column, in row order.
    pub fn column_values(&self, column: &str) -> Option<Vec<&FieldValue>> {
        let index = self.column_index(column)?;
        Some(self.rows.iter().map(|cells| &cells[index]).collect())
    }

    pub fn to_tsv(&self) -> String {
        let separator = FIELD_SEPARATOR.to_string();
        let mut out = self.columns.join(&separator);
        out.push('\n');
        for row in &self.rows {
            let cells: Vec<String> = row.iter().map(FieldValue::render_cell).collect();
            out.push_str(&cells.join(&separator));
            out.push('\n');
        }
        out
    }
}
