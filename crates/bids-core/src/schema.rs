use crate::snapshot::MetadataSnapshot;
use crate::value::FieldValue;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const DEFAULT_ID_COLUMN: &str = "participant_id";
pub const FIELD_SEPARATOR: char = '\t';

#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("malformed schema definition: {0}")]
    Format(String),
    #[error("unknown column: {0}")]
    UnknownColumn(String),
    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("serialization error: {0}")]
    Serialization(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnDescriptor {
    pub name: String,
    #[serde(default)]
    pub default: FieldValue,
    #[serde(default = "default_active")]
    pub active: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub long_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub units: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub levels: Option<BTreeMap<String, String>>,
}

impl ColumnDescriptor {
    pub fn new(name: impl Into<String>, default: impl Into<FieldValue>, active: bool) -> Self {
        Self {
            name: name.into(),
            default: default.into(),
            active,
            long_name: None,
            description: None,
            units: None,
            levels: None,
        }
    }
}

fn default_active() -> bool {
    true
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SchemaDefinition {
    Columns(Vec<ColumnDescriptor>),
    Document {
        #[serde(default)]
        id_column: Option<String>,
        columns: Vec<ColumnDescriptor>,
    },
}

#[derive(Debug, Serialize)]
struct SchemaDocument<'a> {
    id_column: &'a str,
    columns: &'a [ColumnDescriptor],
}

/// Ordered participant-table columns. Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnSchema {
    id_column: String,
    columns: Vec<ColumnDescriptor>,
    active: Vec<String>,
}

impl ColumnSchema {
    pub fn new(
        id_column: impl Into<String>,
        columns: Vec<ColumnDescriptor>,
    ) -> Result<Self, SchemaError> {
        let id_column = id_column.into();
        if columns.is_empty() {
            return Err(SchemaError::Format("no columns defined".to_string()));
        }

        let mut seen = BTreeSet::new();
        for column in &columns {
            if column.name.trim().is_empty() {
                return Err(SchemaError::Format("column with empty name".to_string()));
            }
            if !seen.insert(column.name.as_str()) {
                return Err(SchemaError::Format(format!(
                    "duplicate column: {}",
                    column.name
                )));
            }
        }

        match columns.iter().find(|column| column.name == id_column) {
            None => {
                return Err(SchemaError::Format(format!(
                    "identity column {id_column} is not defined"
                )))
            }
            Some(column) if !column.active => {
                return Err(SchemaError::Format(format!(
                    "identity column {id_column} must be active"
                )))
            }
            Some(_) => {}
        }

        let active = columns
            .iter()
            .filter(|column| column.active)
            .map(|column| column.name.clone())
            .collect();

        Ok(Self {
            id_column,
            columns,
            active,
        })
    }

    pub fn from_json_str(raw: &str) -> Result<Self, SchemaError> {
        let definition: SchemaDefinition =
            serde_json::from_str(raw).map_err(|err| SchemaError::Format(err.to_string()))?;
        match definition {
            SchemaDefinition::Columns(columns) => Self::new(DEFAULT_ID_COLUMN, columns),
            SchemaDefinition::Document { id_column, columns } => Self::new(
                id_column.unwrap_or_else(|| DEFAULT_ID_COLUMN.to_string()),
                columns,
            ),
        }
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, SchemaError> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|source| SchemaError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&raw)
    }

    pub fn id_column(&self) -> &str {
        &self.id_column
    }

    pub fn columns(&self) -> &[ColumnDescriptor] {
        &self.columns
    }

    pub fn column(&self, name: &str) -> Option<&ColumnDescriptor> {
        self.columns.iter().find(|column| column.name == name)
    }

    pub fn active_columns(&self) -> &[String] {
        &self.active
    }

    pub fn is_active(&self, name: &str) -> bool {
        self.active.iter().any(|column| column == name)
    }

    /// A fresh snapshot with every column at its default.
    pub fn template(&self) -> MetadataSnapshot {
        MetadataSnapshot::from_template(
            self.columns
                .iter()
                .map(|column| (column.name.clone(), column.default.clone()))
                .collect(),
        )
    }

    pub fn header(&self) -> String {
        self.active.join(&FIELD_SEPARATOR.to_string())
    }

    /// Renders the active columns of `snapshot`; columns the snapshot lacks
    /// render as missing.
    pub fn row(&self, snapshot: &MetadataSnapshot) -> String {
        self.active
            .iter()
            .map(|column| {
                snapshot
                    .get(column)
                    .map(FieldValue::render_cell)
                    .unwrap_or_else(|| FieldValue::Absent.render_cell())
            })
            .collect::<Vec<_>>()
            .join(&FIELD_SEPARATOR.to_string())
    }

    /// Ordered comparison against the active columns.
    pub fn matches_schema<S: AsRef<str>>(&self, columns: &[S]) -> bool {
        columns.len() == self.active.len()
            && columns
                .iter()
                .zip(&self.active)
                .all(|(candidate, active)| candidate.as_ref() == active)
    }

    pub fn to_json_string(&self) -> Result<String, SchemaError> {
        let document = SchemaDocument {
            id_column: &self.id_column,
            columns: &self.columns,
        };
        serde_json::to_string_pretty(&document)
            .map_err(|err| SchemaError::Serialization(err.to_string()))
    }

    pub fn dump_definitions(&self, path: impl AsRef<Path>) -> Result<(), SchemaError> {
        let path = path.as_ref();
        let mut contents = self.to_json_string()?;
        contents.push('\n');
        fs::write(path, contents).map_err(|source| SchemaError::Io {
            path: path.to_path_buf(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DEFINITION: &str = r#"{
        "id_column": "subject_id",
        "columns": [
            {"name": "subject_id", "default": ""},
            {"name": "age", "default": null, "units": "year"},
            {"name": "sex", "default": ""},
            {"name": "handedness", "active": false}
        ]
    }"#;

    #[test]
    fn load_keeps_definition_order_and_active_subset() {
        let schema = ColumnSchema::from_json_str(DEFINITION).expect("schema");
        assert_eq!(schema.id_column(), "subject_id");
        assert_eq!(schema.columns().len(), 4);
        assert_eq!(schema.active_columns(), ["subject_id", "age", "sex"]);
        assert_eq!(schema.header(), "subject_id\tage\tsex");
        assert!(!schema.is_active("handedness"));
    }

    #[test]
    fn bare_array_uses_default_identity_column() {
        let schema = ColumnSchema::from_json_str(
            r#"[{"name": "participant_id"}, {"name": "group", "default": "control"}]"#,
        )
        .expect("schema");
        assert_eq!(schema.id_column(), DEFAULT_ID_COLUMN);
        let template = schema.template();
        assert_eq!(template.get("group"), Some(&FieldValue::text("control")));
        assert_eq!(template.get("participant_id"), Some(&FieldValue::Absent));
    }

    #[test]
    fn malformed_definitions_are_format_errors() {
        for raw in [
            "not json",
            "[]",
            r#"[{"name": "participant_id"}, {"name": "participant_id"}]"#,
            r#"[{"name": "age"}]"#,
            r#"[{"name": ""}, {"name": "participant_id"}]"#,
            r#"[{"name": "participant_id", "active": false}]"#,
            r#"[{"name": "participant_id", "default": [1, 2]}]"#,
        ] {
            let err = ColumnSchema::from_json_str(raw).expect_err(raw);
            assert!(matches!(err, SchemaError::Format(_)), "{raw}: {err}");
        }
    }

    #[test]
    fn template_is_fresh_each_time() {
        let schema = ColumnSchema::from_json_str(DEFINITION).expect("schema");
        let mut first = schema.template();
        first.set("age", 30.0).expect("set age");
        let second = schema.template();
        assert_eq!(second.get("age"), Some(&FieldValue::Absent));
        assert!(first.set("weight", 70.0).is_err());
    }

    #[test]
    fn row_follows_active_order_and_renders_missing() {
        let schema = ColumnSchema::from_json_str(DEFINITION).expect("schema");
        let mut snapshot = schema.template();
        snapshot.set("subject_id", "sub-001").expect("set id");
        snapshot.set("handedness", "R").expect("set handedness");
        assert_eq!(schema.row(&snapshot), "sub-001\tn/a\t");
        snapshot.set("age", 30.0).expect("set age");
        snapshot.set("sex", "M").expect("set sex");
        assert_eq!(schema.row(&snapshot), "sub-001\t30\tM");
    }

    #[test]
    fn matches_schema_is_order_sensitive() {
        let schema = ColumnSchema::from_json_str(DEFINITION).expect("schema");
        assert!(schema.matches_schema(&["subject_id", "age", "sex"]));
        assert!(!schema.matches_schema(&["age", "subject_id", "sex"]));
        assert!(!schema.matches_schema(&["subject_id", "age"]));
    }

    #[test]
    fn dumped_definitions_load_back() {
        let schema = ColumnSchema::from_json_str(DEFINITION).expect("schema");
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("participants.json");
        schema.dump_definitions(&path).expect("dump");
        let reloaded = ColumnSchema::from_path(&path).expect("reload");
        assert_eq!(reloaded, schema);
        assert_eq!(
            reloaded.column("age").and_then(|c| c.units.as_deref()),
            Some("year")
        );
    }
}
