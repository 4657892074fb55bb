pub mod identity;
pub mod merge;
pub mod path;
pub mod schema;
pub mod snapshot;
pub mod source;
pub mod value;

pub use identity::{
    sanitize, IdRole, IdentifierSlot, Identity, IdentityError, SessionPolicy, SlotState,
};
pub use merge::{merge_snapshot, FieldConflict, MergeResult};
pub use path::{PathBuilder, UNKNOWN_LABEL};
pub use schema::{
    ColumnDescriptor, ColumnSchema, SchemaError, DEFAULT_ID_COLUMN, FIELD_SEPARATOR,
};
pub use snapshot::MetadataSnapshot;
pub use source::FieldSource;
pub use value::{FieldValue, MergePolicy, MISSING_TOKEN};
