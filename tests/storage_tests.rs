use std::fs;
use tempfile::TempDir;
use voicememo::StorageError;
use voicememo::storage::{StorageGateway, is_generated_name};

fn gateway() -> (TempDir, StorageGateway) {
    let temp_dir = TempDir::new().unwrap();
    let storage = StorageGateway::new(temp_dir.path().join("audio"));
    storage.ensure_directory().unwrap();
    (temp_dir, storage)
}

fn write_capture(dir: &TempDir, name: &str) -> std::path::PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, b"RIFF0000WAVE").unwrap();
    path
}

fn ids(storage: &StorageGateway) -> Vec<String> {
    let mut ids: Vec<_> = storage.list_recordings().unwrap().map(|r| r.id).collect();
    ids.sort();
    ids
}

#[test]
fn ensure_directory_is_idempotent() {
    let (_temp_dir, storage) = gateway();
    storage.ensure_directory().unwrap();
    storage.ensure_directory().unwrap();
    assert!(storage.dir().is_dir());
    assert!(ids(&storage).is_empty());
}

#[test]
fn saved_capture_is_listed_exactly_once() {
    let (temp_dir, storage) = gateway();
    let capture = write_capture(&temp_dir, "take.wav");

    let recording = storage.save_recording(&capture).unwrap();

    assert!(!capture.exists());
    assert!(is_generated_name(&recording.id));
    assert_eq!(recording.uri, storage.dir().join(&recording.id));
    assert_eq!(fs::read(&recording.uri).unwrap(), b"RIFF0000WAVE");
    assert_eq!(ids(&storage), vec![recording.id]);
}

#[test]
fn back_to_back_saves_get_distinct_names() {
    let (temp_dir, storage) = gateway();
    let first = storage
        .save_recording(&write_capture(&temp_dir, "one.wav"))
        .unwrap();
    let second = storage
        .save_recording(&write_capture(&temp_dir, "two.wav"))
        .unwrap();

    assert_ne!(first.id, second.id);
    assert_eq!(ids(&storage).len(), 2);
}

#[test]
fn deleted_recording_is_no_longer_listed() {
    let (temp_dir, storage) = gateway();
    let recording = storage
        .save_recording(&write_capture(&temp_dir, "take.wav"))
        .unwrap();

    storage.delete_recording(&recording.id).unwrap();

    assert!(ids(&storage).is_empty());
    assert!(matches!(
        storage.delete_recording(&recording.id),
        Err(StorageError::NotFound(id)) if id == recording.id
    ));
}

#[test]
fn unknown_and_path_like_ids_are_not_found() {
    let (_temp_dir, storage) = gateway();
    for id in ["missing.wav", "../audio", "nested/a.wav", ""] {
        assert!(
            matches!(storage.delete_recording(id), Err(StorageError::NotFound(_))),
            "{:?} should be NotFound",
            id
        );
    }
}

#[test]
fn listing_skips_subdirectories() {
    let (_temp_dir, storage) = gateway();
    fs::create_dir(storage.dir().join("nested")).unwrap();
    fs::write(storage.dir().join("clip.wav"), b"x").unwrap();

    assert_eq!(ids(&storage), vec!["clip.wav".to_string()]);
}

#[test]
fn saving_a_missing_capture_fails_with_io() {
    let (temp_dir, storage) = gateway();
    let result = storage.save_recording(&temp_dir.path().join("gone.wav"));

    assert!(matches!(result, Err(StorageError::Io { .. })));
    assert!(ids(&storage).is_empty());
}

#[test]
fn discarding_a_missing_capture_is_fine() {
    let (temp_dir, storage) = gateway();
    let capture = write_capture(&temp_dir, "take.wav");

    storage.discard_capture(&capture).unwrap();
    storage.discard_capture(&capture).unwrap();
    assert!(!capture.exists());
}
