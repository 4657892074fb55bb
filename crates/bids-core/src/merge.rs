use crate::snapshot::MetadataSnapshot;
use crate::value::{FieldValue, MergePolicy};

#[derive(Debug, Clone, PartialEq)]
pub struct FieldConflict {
    pub column: String,
    pub previous: FieldValue,
    pub current: FieldValue,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MergeResult {
    pub merged: MetadataSnapshot,
    pub conflicts: Vec<FieldConflict>,
}

impl MergeResult {
    pub fn has_conflicts(&self) -> bool {
        !self.conflicts.is_empty()
    }
}

/// Completes `incoming` from `previous` over the `active` columns and
/// collects every column where both sides hold different present values.
/// Columns outside `active` are carried from `incoming` untouched.
pub fn merge_snapshot<S: AsRef<str>>(
    previous: &MetadataSnapshot,
    incoming: &MetadataSnapshot,
    active: &[S],
    policy: MergePolicy,
) -> MergeResult {
    let mut merged = incoming.clone();
    let mut conflicts = Vec::new();

    for column in active {
        let column = column.as_ref();
        let Some(new_value) = incoming.get(column) else {
            continue;
        };
        let old_value = previous.get(column).unwrap_or(&FieldValue::Absent);

        if policy.is_missing(new_value) {
            if !policy.is_missing(old_value) {
                if let Some(slot) = merged.get_mut(column) {
                    *slot = old_value.clone();
                }
            }
        } else if !policy.is_missing(old_value) && old_value != new_value {
            conflicts.push(FieldConflict {
                column: column.to_string(),
                previous: old_value.clone(),
                current: new_value.clone(),
            });
        }
    }

    MergeResult { merged, conflicts }
}
