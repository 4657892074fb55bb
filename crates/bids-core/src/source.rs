use crate::value::FieldValue;
use std::collections::{BTreeMap, HashMap};

/// Supplies metadata values for a recording by field name. `None` means the
/// source does not know the field; `Some(FieldValue::Absent)` means it knows
/// the field is empty.
pub trait FieldSource {
    fn field(&self, name: &str) -> Option<FieldValue>;
}

impl FieldSource for BTreeMap<String, FieldValue> {
    fn field(&self, name: &str) -> Option<FieldValue> {
        self.get(name).cloned()
    }
}

impl FieldSource for HashMap<String, FieldValue> {
    fn field(&self, name: &str) -> Option<FieldValue> {
        self.get(name).cloned()
    }
}
