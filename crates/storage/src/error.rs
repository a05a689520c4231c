use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage i/o failed: {0}")]
    Io(#[from] std::io::Error),

    /// No cell was created under this key. Keys are reported hex encoded.
    #[error("no cell {0}")]
    UnknownCell(String),

    /// Another stream over the cell is still open.
    #[error("cell {0} already has an open stream")]
    Busy(String),
}
