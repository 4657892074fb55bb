use crate::schema::SchemaError;
use crate::value::FieldValue;
use serde::Serialize;
use std::collections::BTreeMap;

/// Field values captured for one registration. Keys are fixed by the schema
/// template the snapshot was created from.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(transparent)]
pub struct MetadataSnapshot {
    values: BTreeMap<String, FieldValue>,
}

impl MetadataSnapshot {
    pub(crate) fn from_template(values: BTreeMap<String, FieldValue>) -> Self {
        Self { values }
    }

    pub fn get(&self, column: &str) -> Option<&FieldValue> {
        self.values.get(column)
    }

    pub fn get_mut(&mut self, column: &str) -> Option<&mut FieldValue> {
        self.values.get_mut(column)
    }

    /// Replaces a column value, returning the previous one.
    pub fn set(
        &mut self,
        column: &str,
        value: impl Into<FieldValue>,
    ) -> Result<FieldValue, SchemaError> {
        let slot = self
            .get_mut(column)
            .ok_or_else(|| SchemaError::UnknownColumn(column.to_string()))?;
        Ok(std::mem::replace(slot, value.into()))
    }

    pub fn contains(&self, column: &str) -> bool {
        self.values.contains_key(column)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.values.iter().map(|(key, value)| (key.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn present_count(&self) -> usize {
        self.values.values().filter(|value| !value.is_absent()).count()
    }
}
