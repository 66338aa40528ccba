use std::path::PathBuf;

use thiserror::Error;

/// Error taxonomy for planning, container I/O, and the block pipeline.
#[derive(Debug, Error)]
pub enum ParzError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("input file {0:?} does not exist")]
    InputNotFound(PathBuf),
    #[error("output file {0:?} already exists")]
    OutputExists(PathBuf),
    #[error("truncated container: wanted {wanted} bytes at offset {offset}, got {got}")]
    TruncatedContainer { offset: u64, wanted: u64, got: u64 },
    #[error("corrupt index: {0}")]
    CorruptIndex(String),
    #[error("index of {needed} bytes does not fit the {reserved}-byte header reservation")]
    IndexOverflow { needed: u64, reserved: u64 },
    #[error("codec error: {0}")]
    Codec(String),
    #[error("block {name} checksum mismatch: expected {expected:016x}, got {actual:016x}")]
    ChecksumMismatch {
        name: String,
        expected: u64,
        actual: u64,
    },
    #[error("block {name} decompressed to {actual} bytes but index says {expected}")]
    BlockSizeMismatch {
        name: String,
        expected: u64,
        actual: u64,
    },
    #[error("run cancelled: block {name} failed: {cause}")]
    Cancelled { name: String, cause: String },
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ParzError>;
