use std::io;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum XmpError {
    #[error("No XMP handler for {}", path.display())]
    UnsupportedFormat { path: PathBuf },
    #[error("Not a JPEG file")]
    NotAJpegFile,
    #[error("Not a PNG file")]
    NotAPngFile,
    /// Stored CRC-32 of a PNG chunk disagrees with the recomputed value.
    #[error("Checksum error in PNG chunk {chunk_type} at offset {offset}")]
    ChecksumError { chunk_type: String, offset: u64 },
    #[error("Couldn't find a position to insert the XMP packet")]
    NoInsertionPoint,
    #[error("XMP packet of {len} bytes exceeds limit of {limit} bytes")]
    PacketTooLarge { len: usize, limit: usize },
    /// An in-place rewrite would not land exactly on the old record boundary.
    #[error("Rewritten record is {actual} bytes, slot holds {expected}")]
    SlotSizeMismatch { expected: u64, actual: u64 },
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, XmpError>;
