use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AssembleError {
    #[error("line {line}: unknown mnemonic `{text}`")]
    UnknownMnemonic { line: usize, text: String },

    #[error("line {line}: {mnemonic} expects an operand")]
    MissingOperand { line: usize, mnemonic: &'static str },

    #[error("line {line}: invalid operand `{text}`")]
    InvalidOperand { line: usize, text: String },

    #[error("label `{0}` is never defined")]
    UnknownLabel(String),

    #[error("label `{0}` is defined twice")]
    DuplicateLabel(String),

    #[error("inline literal of {len} bytes exceeds 65535")]
    LiteralTooLong { len: usize },

    #[error("image of {len} bytes does not fit a 32-bit offset")]
    ImageTooLarge { len: usize },
}
