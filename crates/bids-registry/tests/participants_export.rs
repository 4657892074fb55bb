use bids_core::{ColumnSchema, FieldValue, Identity, SessionPolicy};
use bids_registry::{
    ParticipantRegistry, ParticipantTable, RegisterOutcome, RegistryError, SessionUnit,
    PARTICIPANTS_TSV,
};
use std::collections::BTreeMap;
use std::fs;

const SCHEMA: &str = r#"{
    "id_column": "subject_id",
    "columns": [
        {"name": "subject_id", "default": ""},
        {"name": "age", "default": null},
        {"name": "sex", "default": ""}
    ]
}"#;

fn unit(schema: &ColumnSchema, subject: &str, session: &str, age: Option<f64>) -> SessionUnit {
    let mut unit = SessionUnit::new(schema, SessionPolicy::Required);
    unit.identity = Identity::with_ids(Some(subject), Some(session), SessionPolicy::Required);
    let mut source = BTreeMap::new();
    source.insert("age".to_string(), FieldValue::from(age));
    source.insert("sex".to_string(), FieldValue::text("M"));
    unit.populate(schema, &source).expect("populate");
    unit
}

#[test]
fn repeated_sessions_follow_the_participant_scenario() {
    let schema = ColumnSchema::from_json_str(SCHEMA).expect("schema");
    let mut strict = ParticipantRegistry::new(schema.clone());

    let first = unit(&schema, "001", "01", Some(30.0));
    assert_eq!(first.prefix(), "sub-001_ses-01");
    assert_eq!(
        strict.register_unit(&first, false).expect("first"),
        RegisterOutcome::Created
    );
    assert_eq!(
        strict
            .register_unit(&unit(&schema, "001", "02", None), false)
            .expect("second"),
        RegisterOutcome::Merged
    );
    let history = strict.history("sub-001").expect("history");
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].get("subject_id"), Some(&FieldValue::text("sub-001")));
    assert_eq!(history[0].get("age"), Some(&FieldValue::Number(30.0)));

    let conflicting = unit(&schema, "001", "03", Some(31.0));
    let mut permissive = strict.clone();

    let err = strict
        .register_unit(&conflicting, false)
        .expect_err("strict conflict");
    assert!(matches!(err, RegistryError::Conflict { .. }));
    assert!(err.to_string().contains("sub-001/ses-03"));
    assert_eq!(strict.history("sub-001").map(<[_]>::len), Some(1));

    permissive
        .register_unit(&conflicting, true)
        .expect("permissive conflict");
    assert_eq!(permissive.history("sub-001").map(<[_]>::len), Some(2));
}

#[test]
fn export_writes_header_once_and_sorts_subjects() {
    let schema = ColumnSchema::from_json_str(SCHEMA).expect("schema");
    let mut registry = ParticipantRegistry::new(schema.clone());
    for subject in ["010", "002"] {
        registry
            .register_unit(&unit(&schema, subject, "01", Some(40.0)), false)
            .expect("register");
    }

    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join(PARTICIPANTS_TSV);

    let report = registry.export_rows(&path).expect("export");
    assert_eq!(report.rows_written, 2);
    assert!(!report.appended);
    assert_eq!(
        fs::read_to_string(&path).expect("read"),
        "subject_id\tage\tsex\nsub-002\t40\tM\nsub-010\t40\tM\n"
    );

    let again = registry.export_rows(&path).expect("append");
    assert!(again.appended);
    let table = ParticipantTable::read_tsv(&path).expect("read table");
    assert_eq!(table.len(), 4);
    assert!(registry.schema_compatible(Some(&table)));
    assert_eq!(registry.history("sub-002").map(<[_]>::len), Some(1));
}

#[test]
fn export_into_missing_directory_reports_path() {
    let schema = ColumnSchema::from_json_str(SCHEMA).expect("schema");
    let registry = ParticipantRegistry::new(schema);
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("missing").join(PARTICIPANTS_TSV);

    match registry.export_rows(&path) {
        Err(RegistryError::Io { path: failed, .. }) => assert_eq!(failed, path),
        other => panic!("unexpected result: {other:?}"),
    }
}

#[test]
fn empty_registry_exports_header_only() {
    let schema = ColumnSchema::from_json_str(SCHEMA).expect("schema");
    let registry = ParticipantRegistry::new(schema);
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join(PARTICIPANTS_TSV);

    let report = registry.export_rows(&path).expect("export");
    assert_eq!(report.rows_written, 0);
    let table = ParticipantTable::read_tsv(&path).expect("read table");
    assert!(table.is_empty());
    assert_eq!(table, registry.export_table());
}

#[test]
fn persisted_table_matches_registry_for_empty_text() {
    let schema = ColumnSchema::from_json_str(SCHEMA).expect("schema");
    let mut registry = ParticipantRegistry::new(schema.clone());
    let mut snapshot = schema.template();
    snapshot.set("age", 30.0).expect("age");
    registry
        .register("sub-001", Some("ses-01"), snapshot, false)
        .expect("register");
    registry
        .register("sub-002", Some("ses-01"), schema.template(), false)
        .expect("register");

    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join(PARTICIPANTS_TSV);
    registry.export_rows(&path).expect("export");
    assert_eq!(
        fs::read_to_string(&path).expect("read"),
        "subject_id\tage\tsex\nsub-001\t30\t\nsub-002\tn/a\t\n"
    );

    let table = ParticipantTable::read_tsv(&path).expect("read table");
    assert_eq!(table.get(0, "sex"), Some(&FieldValue::text("")));
    assert_eq!(table.get(1, "age"), Some(&FieldValue::Absent));
    assert_eq!(table, registry.export_table());
}
