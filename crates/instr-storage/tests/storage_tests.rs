use instr_core::{EngineConfig, ProjectDataStore};
use instr_storage::{FileStorage, ProjectStorage, SessionSnapshot, Storage, StorageError, StorageExt};
use instr_test_utils::{
    create_dimension_instruction, create_text_instruction, setup_session, FakeHost, HostOp,
};
use pretty_assertions::assert_eq;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, PartialEq, Serialize, Deserialize)]
struct Settings {
    name: String,
    count: u32,
}

fn settings() -> Settings {
    Settings {
        name: "beam-annotations".to_string(),
        count: 3,
    }
}

fn project_storage(host: &Arc<FakeHost>, key: &str) -> ProjectStorage {
    let store: Arc<dyn ProjectDataStore> = host.clone();
    ProjectStorage::new(store, key)
}

#[test]
fn test_project_storage_round_trip() {
    let host = Arc::new(FakeHost::new());
    let storage = project_storage(&host, "instructions");

    storage.save(&settings()).unwrap();
    assert_eq!(storage.load::<Settings>().unwrap(), settings());
    assert_eq!(
        host.project_value("instructions").as_deref(),
        Some(r#"{"name":"beam-annotations","count":3}"#)
    );
}

#[test]
fn test_project_storage_missing_key_is_not_found() {
    let host = Arc::new(FakeHost::new());
    let err = project_storage(&host, "absent").load_str().unwrap_err();
    assert!(err.is_not_found());
    assert_eq!(err.to_string(), "no data found for key: absent");
}

#[test]
fn test_project_storage_empty_value_is_not_found() {
    let host = Arc::new(FakeHost::new());
    let storage = project_storage(&host, "blank");
    storage.save_str("").unwrap();
    assert!(storage.load_str().unwrap_err().is_not_found());
}

#[test]
fn test_project_storage_host_failure() {
    let host = Arc::new(FakeHost::new());
    host.fail_next(HostOp::SetProjectData);
    let err = project_storage(&host, "k").save(&settings()).unwrap_err();
    assert!(matches!(err, StorageError::Host(_)));
}

#[test]
fn test_file_storage_writes_pretty_json() {
    let dir = tempfile::tempdir().unwrap();
    let storage = FileStorage::new(dir.path().join("settings.json"));

    storage.save(&settings()).unwrap();
    let raw = std::fs::read_to_string(storage.path()).unwrap();
    assert!(raw.contains("\n  \"name\": \"beam-annotations\""));
    assert_eq!(storage.load::<Settings>().unwrap(), settings());
}

#[test]
fn test_file_storage_missing_file_is_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let storage = FileStorage::new(dir.path().join("nope.json"));
    assert!(storage.load_str().unwrap_err().is_not_found());
}

#[test]
fn test_file_storage_unwritable_path_is_io() {
    let dir = tempfile::tempdir().unwrap();
    let storage = FileStorage::new(dir.path().join("missing-dir").join("x.json"));
    let err = storage.save_str("{}").unwrap_err();
    assert!(matches!(err, StorageError::Io { .. }));
}

#[test]
fn test_malformed_data_is_serde_error() {
    let dir = tempfile::tempdir().unwrap();
    let storage = FileStorage::new(dir.path().join("bad.json"));
    storage.save_str("{ not json").unwrap();
    assert!(matches!(
        storage.load::<Settings>().unwrap_err(),
        StorageError::Serde(_)
    ));
}

#[test]
fn test_snapshot_lets_next_session_clear_leftovers() {
    let dir = tempfile::tempdir().unwrap();
    let storage = FileStorage::new(dir.path().join("session.json"));

    let first = setup_session(EngineConfig::new());
    let instructions = vec![
        create_text_instruction("left behind"),
        create_dimension_instruction(250.0),
    ];
    let report = first.renderer.render_batch(&instructions);
    assert!(report.is_complete());
    storage
        .save(&SessionSnapshot::capture(&first.registry, instructions.clone()))
        .unwrap();

    // same host document, fresh process state
    let second = instr_test_utils::setup_session_on(first.host.clone(), EngineConfig::new());
    let snapshot: SessionSnapshot = storage.load().unwrap();
    assert_eq!(snapshot.handles, report.handles());
    assert_eq!(snapshot.instructions.len(), 2);
    assert_eq!(snapshot.instructions[0].id(), instructions[0].id());

    assert_eq!(snapshot.restore_into(&second.registry), 2);
    assert_eq!(snapshot.restore_into(&second.registry), 0);
    assert_eq!(second.registry.clear().unwrap(), 2);
    assert_eq!(first.host.element_count(), 0);
}

#[test]
fn test_empty_snapshot() {
    let snapshot: SessionSnapshot = serde_json::from_str(r#"{"handles":[]}"#).unwrap();
    assert!(snapshot.is_empty());
}
