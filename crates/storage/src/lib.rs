//! Keyed blob storage.
//!
//! Each cell is a file under the storage root named by the hex encoding of
//! its key. A cell admits at most one open stream at a time; deleting a
//! cell force-closes whatever stream is still open on it.

mod error;
mod stream;

pub use error::StorageError;
pub use stream::{CellReader, CellWriter};

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use tracing::{debug, warn};

use stream::StreamFlag;

#[derive(Debug)]
struct Cell {
    path: PathBuf,
    stream: Option<StreamFlag>,
}

impl Cell {
    fn busy(&self) -> bool {
        self.stream.as_ref().is_some_and(StreamFlag::is_open)
    }
}

#[derive(Debug)]
pub struct Storage {
    root: PathBuf,
    cells: Mutex<HashMap<Vec<u8>, Cell>>,
}

impl Storage {
    /// Open storage rooted at `root`, creating the directory if needed.
    /// Files already present are picked up as existing cells.
    pub fn open(root: impl AsRef<Path>) -> Result<Self, StorageError> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;

        let mut cells = HashMap::new();
        for entry in fs::read_dir(&root)? {
            let entry = entry?;
            let name = entry.file_name();
            let Some(key) = name.to_str().and_then(|n| hex::decode(n).ok()) else {
                continue;
            };
            if entry.file_type()?.is_file() {
                cells.insert(
                    key,
                    Cell {
                        path: entry.path(),
                        stream: None,
                    },
                );
            }
        }
        debug!(root = %root.display(), cells = cells.len(), "storage opened");

        Ok(Self {
            root,
            cells: Mutex::new(cells),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create an empty cell. Returns `false` when the key already exists.
    pub fn create(&self, key: &[u8]) -> Result<bool, StorageError> {
        let mut cells = self.cells.lock();
        if cells.contains_key(key) {
            return Ok(false);
        }
        let path = self.root.join(hex::encode(key));
        File::create(&path)?;
        cells.insert(key.to_vec(), Cell { path, stream: None });
        debug!(key = %hex::encode(key), "cell created");
        Ok(true)
    }

    pub fn exists(&self, key: &[u8]) -> bool {
        self.cells.lock().contains_key(key)
    }

    /// Remove a cell and its file, force-closing any open stream first.
    /// Returns `false` when the key does not exist.
    pub fn delete(&self, key: &[u8]) -> Result<bool, StorageError> {
        let Some(cell) = self.cells.lock().remove(key) else {
            return Ok(false);
        };
        if let Some(stream) = cell.stream.as_ref().filter(|s| s.is_open()) {
            warn!(key = %hex::encode(key), "force-closing open stream on delete");
            stream.close();
        }
        if cell.path.exists() {
            fs::remove_file(&cell.path)?;
        }
        debug!(key = %hex::encode(key), "cell deleted");
        Ok(true)
    }

    /// Whether a stream could be opened right now. Unknown keys are
    /// reachable since nothing holds them.
    pub fn reachable(&self, key: &[u8]) -> bool {
        self.cells.lock().get(key).is_none_or(|cell| !cell.busy())
    }

    pub fn open_read(&self, key: &[u8]) -> Result<CellReader, StorageError> {
        let (file, flag) = self.open_stream(key, |path| File::open(path))?;
        Ok(CellReader::new(file, flag))
    }

    /// Open the cell for writing. The previous contents are replaced.
    pub fn open_write(&self, key: &[u8]) -> Result<CellWriter, StorageError> {
        let (file, flag) = self.open_stream(key, |path| {
            OpenOptions::new().write(true).truncate(true).create(true).open(path)
        })?;
        Ok(CellWriter::new(file, flag))
    }

    fn open_stream(
        &self,
        key: &[u8],
        open: impl FnOnce(&Path) -> std::io::Result<File>,
    ) -> Result<(File, StreamFlag), StorageError> {
        let mut cells = self.cells.lock();
        let cell = cells
            .get_mut(key)
            .ok_or_else(|| StorageError::UnknownCell(hex::encode(key)))?;
        if cell.busy() {
            return Err(StorageError::Busy(hex::encode(key)));
        }
        let file = open(&cell.path)?;
        let flag = StreamFlag::open();
        cell.stream = Some(flag.clone());
        Ok((file, flag))
    }

    pub fn read_all(&self, key: &[u8]) -> Result<Vec<u8>, StorageError> {
        use std::io::Read;
        let mut reader = self.open_read(key)?;
        let mut out = Vec::new();
        reader.read_to_end(&mut out)?;
        Ok(out)
    }

    pub fn write_all(&self, key: &[u8], data: &[u8]) -> Result<(), StorageError> {
        use std::io::Write;
        let mut writer = self.open_write(key)?;
        writer.write_all(data)?;
        writer.close()?;
        Ok(())
    }
}
