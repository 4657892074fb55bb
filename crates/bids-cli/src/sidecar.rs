use anyhow::{Context, Result};
use bids_core::{ColumnSchema, FieldSource, FieldValue, SessionPolicy};
use bids_registry::{SessionUnit, PARTICIPANTS_JSON};
use ignore::WalkBuilder;
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// One dumped session header: identifiers plus participant-level fields.
#[derive(Debug, Clone, Deserialize)]
pub struct SidecarRecord {
    #[serde(default)]
    pub subject: Value,
    #[serde(default)]
    pub session: Value,
    #[serde(default)]
    pub fields: BTreeMap<String, FieldValue>,
}

impl FieldSource for SidecarRecord {
    fn field(&self, name: &str) -> Option<FieldValue> {
        self.fields.get(name).cloned()
    }
}

pub fn read_sidecar(path: &Path) -> Result<SidecarRecord> {
    let contents =
        fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&contents)
        .with_context(|| format!("Failed to parse {}", path.display()))
}

/// JSON sidecars under `input`, sorted by path. A file argument is returned
/// as is; participant definitions are never treated as sidecars.
pub fn discover_sidecars(input: &Path) -> Result<Vec<PathBuf>> {
    if input.is_file() {
        return Ok(vec![input.to_path_buf()]);
    }
    if !input.is_dir() {
        anyhow::bail!("input {} does not exist", input.display());
    }

    let mut paths = Vec::new();
    for entry in WalkBuilder::new(input).standard_filters(true).build() {
        let entry = entry.with_context(|| format!("Failed to walk {}", input.display()))?;
        if !entry.file_type().map(|ft| ft.is_file()).unwrap_or(false) {
            continue;
        }
        let path = entry.path();
        let is_json = path.extension().and_then(|ext| ext.to_str()) == Some("json");
        let is_definition =
            path.file_name().and_then(|name| name.to_str()) == Some(PARTICIPANTS_JSON);
        if is_json && !is_definition {
            paths.push(path.to_path_buf());
        }
    }
    paths.sort();
    Ok(paths)
}

/// Builds a locked session unit from a sidecar. A null session under an
/// optional-session policy leaves the session unset.
pub fn build_unit(
    schema: &ColumnSchema,
    record: &SidecarRecord,
    policy: SessionPolicy,
    path: &Path,
) -> Result<SessionUnit> {
    let mut unit = SessionUnit::new(schema, policy).with_in_path(path);
    let identity = &mut unit.identity;

    identity
        .set_subject_value(&record.subject)
        .with_context(|| format!("{}: invalid subject", path.display()))?;
    identity.lock_subject();

    if !(record.session.is_null() && policy == SessionPolicy::Optional) {
        identity
            .set_session_value(&record.session)
            .with_context(|| format!("{}: invalid session", path.display()))?;
        identity.lock_session();
    }

    if !identity.is_valid() {
        anyhow::bail!(
            "{}: incomplete identity (subject {:?}, session {:?})",
            path.display(),
            identity.subject(),
            identity.session()
        );
    }

    unit.populate(schema, record)
        .with_context(|| format!("{}: invalid participant fields", path.display()))?;
    Ok(unit)
}
