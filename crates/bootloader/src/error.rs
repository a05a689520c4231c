use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum BootError {
    #[error("program image `{name}` not found under {}", root.display())]
    ImageNotFound { name: String, root: PathBuf },

    /// Names are plain file names; anything that could escape the root is refused.
    #[error("invalid image name `{0}`")]
    InvalidName(String),

    #[error("program image `{0}` is empty")]
    EmptyImage(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
