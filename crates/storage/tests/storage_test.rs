use std::io::{Read, Write};

use storage::{Storage, StorageError};

fn storage() -> (tempfile::TempDir, Storage) {
    let dir = tempfile::tempdir().unwrap();
    let storage = Storage::open(dir.path().join("cells")).unwrap();
    (dir, storage)
}

#[test]
fn test_create_exists_delete() {
    let (_dir, storage) = storage();
    assert!(!storage.exists(b"alpha"));
    assert!(storage.create(b"alpha").unwrap());
    assert!(!storage.create(b"alpha").unwrap());
    assert!(storage.exists(b"alpha"));
    assert!(storage.root().join(hex::encode(b"alpha")).is_file());

    assert!(storage.delete(b"alpha").unwrap());
    assert!(!storage.exists(b"alpha"));
    assert!(!storage.delete(b"alpha").unwrap());
    assert!(!storage.root().join(hex::encode(b"alpha")).exists());
}

#[test]
fn test_write_then_read() {
    let (_dir, storage) = storage();
    storage.create(b"k").unwrap();
    storage.write_all(b"k", b"payload").unwrap();
    assert_eq!(storage.read_all(b"k").unwrap(), b"payload".to_vec());

    storage.write_all(b"k", b"x").unwrap();
    assert_eq!(storage.read_all(b"k").unwrap(), b"x".to_vec());
}

#[test]
fn test_one_stream_per_cell() {
    let (_dir, storage) = storage();
    storage.create(b"k").unwrap();

    let writer = storage.open_write(b"k").unwrap();
    assert!(!storage.reachable(b"k"));
    assert!(matches!(storage.open_read(b"k"), Err(StorageError::Busy(_))));
    assert!(matches!(storage.open_write(b"k"), Err(StorageError::Busy(_))));

    drop(writer);
    assert!(storage.reachable(b"k"));
    let reader = storage.open_read(b"k").unwrap();
    reader.close();
    assert!(storage.reachable(b"k"));
}

#[test]
fn test_delete_force_closes_stream() {
    let (_dir, storage) = storage();
    storage.create(b"k").unwrap();
    let mut writer = storage.open_write(b"k").unwrap();
    writer.write_all(b"abc").unwrap();

    assert!(storage.delete(b"k").unwrap());
    assert!(!writer.is_open());
    let err = writer.write(b"more").unwrap_err();
    assert_eq!(err.kind(), std::io::ErrorKind::BrokenPipe);
}

#[test]
fn test_force_closed_reader_fails() {
    let (_dir, storage) = storage();
    storage.create(b"k").unwrap();
    storage.write_all(b"k", b"abc").unwrap();

    let mut reader = storage.open_read(b"k").unwrap();
    storage.delete(b"k").unwrap();
    let mut buf = [0u8; 3];
    assert!(reader.read(&mut buf).is_err());
}

#[test]
fn test_unknown_keys() {
    let (_dir, storage) = storage();
    assert!(storage.reachable(b"ghost"));
    assert!(matches!(storage.open_read(b"ghost"), Err(StorageError::UnknownCell(key)) if key == hex::encode(b"ghost")));
}

#[test]
fn test_reopen_picks_up_existing_cells() {
    let dir = tempfile::tempdir().unwrap();
    {
        let storage = Storage::open(dir.path()).unwrap();
        storage.create(b"persist").unwrap();
        storage.write_all(b"persist", b"v1").unwrap();
    }
    std::fs::write(dir.path().join("not-hex"), b"ignored").unwrap();

    let storage = Storage::open(dir.path()).unwrap();
    assert!(storage.exists(b"persist"));
    assert_eq!(storage.read_all(b"persist").unwrap(), b"v1".to_vec());
}
