use bids_core::{
    ColumnSchema, FieldSource, Identity, MetadataSnapshot, PathBuilder, SchemaError,
    SessionPolicy,
};
use std::path::{Path, PathBuf};

/// One subject/session being converted: its identity, the participant values
/// gathered for it, and the recording it was read from.
#[derive(Debug, Clone)]
pub struct SessionUnit {
    pub identity: Identity,
    pub values: MetadataSnapshot,
    pub in_path: Option<PathBuf>,
}

impl SessionUnit {
    pub fn new(schema: &ColumnSchema, policy: SessionPolicy) -> Self {
        Self {
            identity: Identity::new(policy),
            values: schema.template(),
            in_path: None,
        }
    }

    pub fn with_in_path(mut self, path: impl AsRef<Path>) -> Self {
        self.in_path = Some(path.as_ref().to_path_buf());
        self
    }

    /// Copies every non-identity column `source` knows about into the
    /// snapshot. Returns how many columns were filled.
    pub fn populate(
        &mut self,
        schema: &ColumnSchema,
        source: &dyn FieldSource,
    ) -> Result<usize, SchemaError> {
        let mut filled = 0;
        for column in schema.columns() {
            if column.name == schema.id_column() {
                continue;
            }
            if let Some(value) = source.field(&column.name) {
                self.values.set(&column.name, value)?;
                filled += 1;
            }
        }
        Ok(filled)
    }

    pub fn prefix(&self) -> String {
        PathBuilder::prefix(&self.identity)
    }

    pub fn relative_path(&self, include_empty_session: bool) -> PathBuf {
        PathBuilder::relative_path(&self.identity, include_empty_session)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bids_core::{ColumnDescriptor, FieldValue};
    use std::collections::BTreeMap;

    #[test]
    fn populate_skips_identity_and_unknown_fields() {
        let schema = ColumnSchema::new(
            "participant_id",
            vec![
                ColumnDescriptor::new("participant_id", FieldValue::Absent, true),
                ColumnDescriptor::new("age", FieldValue::Absent, true),
                ColumnDescriptor::new("sex", FieldValue::Absent, true),
            ],
        )
        .expect("schema");
        let mut unit = SessionUnit::new(&schema, SessionPolicy::Optional).with_in_path("/raw/001");

        let mut source = BTreeMap::new();
        source.insert("participant_id".to_string(), FieldValue::text("spoofed"));
        source.insert("age".to_string(), FieldValue::Number(42.0));
        source.insert("weight".to_string(), FieldValue::Number(70.0));

        let filled = unit.populate(&schema, &source).expect("populate");
        assert_eq!(filled, 1);
        assert_eq!(unit.values.get("age"), Some(&FieldValue::Number(42.0)));
        assert_eq!(unit.values.get("participant_id"), Some(&FieldValue::Absent));
        assert_eq!(unit.in_path.as_deref(), Some(Path::new("/raw/001")));
    }
}
