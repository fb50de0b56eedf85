//! Integration tests for the run stores

use corefchain_domain::traits::RunStore;
use corefchain_domain::{
    ArtifactKind, EntityCategory, RunId, RunKey, RunState, RunStatus, Stage, StageRecord,
};
use corefchain_store::{FsStore, SqliteStore};
use tempfile::TempDir;

fn committed_state(key: &RunKey, stage: Stage) -> RunState {
    let mut state = RunState::new(key.clone(), 100);
    for s in Stage::ALL.iter().filter(|s| **s <= stage) {
        state.commit(
            *s,
            StageRecord {
                run_id: RunId::new(),
                artifacts: vec![],
                committed_at: 100,
                elapsed_ms: 5,
            },
            100,
        );
    }
    state
}

fn exercise_state_round_trip<S: RunStore>(store: &mut S)
where
    S::Error: std::fmt::Debug,
{
    let key = RunKey::new("case-1", EntityCategory::Person);
    assert!(store.load_state(&key).unwrap().is_none());

    let state = committed_state(&key, Stage::Ner);
    store.save_state(&state).unwrap();

    let loaded = store.load_state(&key).unwrap().unwrap();
    assert_eq!(loaded, state);
    assert_eq!(loaded.status, RunStatus::Extracted);
}

fn exercise_artifacts<S: RunStore>(store: &mut S)
where
    S::Error: std::fmt::Debug,
{
    let key = RunKey::new("case-1", EntityCategory::Location);
    assert!(store
        .get_artifact(&key, ArtifactKind::Segments)
        .unwrap()
        .is_none());

    let handle = store
        .put_artifact(&key, ArtifactKind::Segments, "[]")
        .unwrap();
    assert_eq!(handle.kind, ArtifactKind::Segments);
    assert!(handle.location.ends_with("segments.json"));

    // Overwrite replaces the previous body entirely
    store
        .put_artifact(&key, ArtifactKind::Segments, "[{\"index\":0}]")
        .unwrap();
    assert_eq!(
        store.get_artifact(&key, ArtifactKind::Segments).unwrap(),
        Some("[{\"index\":0}]".to_string())
    );

    // Artifacts are namespaced by category
    let other = RunKey::new("case-1", EntityCategory::Route);
    assert!(store
        .get_artifact(&other, ArtifactKind::Segments)
        .unwrap()
        .is_none());
}

fn exercise_list_runs<S: RunStore>(store: &mut S)
where
    S::Error: std::fmt::Debug,
{
    for category in [EntityCategory::Route, EntityCategory::Person] {
        let key = RunKey::new("case-2", category);
        store.save_state(&committed_state(&key, Stage::Chunk)).unwrap();
    }
    store
        .save_state(&committed_state(
            &RunKey::new("case-3", EntityCategory::Location),
            Stage::Chunk,
        ))
        .unwrap();

    let runs = store.list_runs("case-2").unwrap();
    assert_eq!(
        runs,
        vec![
            RunKey::new("case-2", EntityCategory::Person),
            RunKey::new("case-2", EntityCategory::Route),
        ]
    );
    assert!(store.list_runs("unknown").unwrap().is_empty());
}

#[test]
fn test_sqlite_state_round_trip() {
    let mut store = SqliteStore::new(":memory:").unwrap();
    exercise_state_round_trip(&mut store);
}

#[test]
fn test_sqlite_artifacts() {
    let mut store = SqliteStore::new(":memory:").unwrap();
    exercise_artifacts(&mut store);
}

#[test]
fn test_sqlite_list_runs() {
    let mut store = SqliteStore::new(":memory:").unwrap();
    exercise_list_runs(&mut store);
}

#[test]
fn test_sqlite_persists_across_connections() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("runs.db");
    let key = RunKey::new("case-9", EntityCategory::Organization);

    {
        let mut store = SqliteStore::new(&path).unwrap();
        store
            .put_artifact(&key, ArtifactKind::Source, "Text body")
            .unwrap();
        store
            .save_state(&committed_state(&key, Stage::Chunk))
            .unwrap();
    }

    let store = SqliteStore::new(&path).unwrap();
    assert_eq!(
        store.get_artifact(&key, ArtifactKind::Source).unwrap(),
        Some("Text body".to_string())
    );
    assert_eq!(
        store.load_state(&key).unwrap().unwrap().status,
        RunStatus::Chunked
    );
}

#[test]
fn test_fs_state_round_trip() {
    let dir = TempDir::new().unwrap();
    let mut store = FsStore::new(dir.path()).unwrap();
    exercise_state_round_trip(&mut store);
}

#[test]
fn test_fs_artifacts() {
    let dir = TempDir::new().unwrap();
    let mut store = FsStore::new(dir.path()).unwrap();
    exercise_artifacts(&mut store);
}

#[test]
fn test_fs_list_runs() {
    let dir = TempDir::new().unwrap();
    let mut store = FsStore::new(dir.path()).unwrap();
    exercise_list_runs(&mut store);
}

#[test]
fn test_fs_layout_and_no_temp_leftovers() {
    let dir = TempDir::new().unwrap();
    let mut store = FsStore::new(dir.path()).unwrap();
    let key = RunKey::new("case-4", EntityCategory::MeansOfTransport);

    store
        .put_artifact(&key, ArtifactKind::Rewritten, "done")
        .unwrap();
    store
        .save_state(&committed_state(&key, Stage::Resolve))
        .unwrap();

    let run_dir = dir.path().join("case-4").join("means-of-transport");
    assert!(run_dir.join("rewritten.txt").is_file());
    assert!(run_dir.join("state.json").is_file());

    let leftovers: Vec<_> = std::fs::read_dir(&run_dir)
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
        .collect();
    assert!(leftovers.is_empty());
}

#[test]
fn test_fs_document_id_cannot_escape_root() {
    let dir = TempDir::new().unwrap();
    let mut store = FsStore::new(dir.path().join("store")).unwrap();
    let key = RunKey::new("../outside", EntityCategory::Person);

    store.put_artifact(&key, ArtifactKind::Source, "x").unwrap();
    assert!(store.run_dir(&key).starts_with(store.root()));
    assert!(!dir.path().join("outside").exists());
}
