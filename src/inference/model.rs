//! Model file checks
//!
//! A cheap header check run before handing a path to the backend, so a wrong
//! file fails fast with a precise reason instead of an opaque load error.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;
use thiserror::Error;

/// GGUF magic bytes (little-endian: "GGUF")
pub const GGUF_MAGIC: u32 = 0x46554747;

/// magic(4) + version(4) + tensor_count(8) + metadata_kv_count(8)
const GGUF_HEADER_LEN: u64 = 24;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("Failed to open file: {0}")]
    FileOpen(#[from] std::io::Error),

    #[error("Invalid GGUF file: magic bytes mismatch (expected 0x{:08X}, got 0x{:08X})", GGUF_MAGIC, .0)]
    InvalidMagic(u32),

    #[error("Unsupported GGUF version: {0}")]
    UnsupportedVersion(u32),

    #[error("File too small to be valid GGUF")]
    FileTooSmall,
}

/// Fixed-size GGUF header fields
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GgufHeader {
    pub version: u32,
    pub tensor_count: u64,
    pub metadata_kv_count: u64,
}

/// Checks that `path` carries a GGUF v2/v3 header and returns it.
pub fn validate_gguf<P: AsRef<Path>>(path: P) -> Result<GgufHeader, ModelError> {
    let mut file = File::open(path)?;
    read_gguf_header(&mut file)
}

/// Parses the header from any seekable reader positioned anywhere.
pub fn read_gguf_header<R: Read + Seek>(reader: &mut R) -> Result<GgufHeader, ModelError> {
    let len = reader.seek(SeekFrom::End(0))?;
    if len < GGUF_HEADER_LEN {
        return Err(ModelError::FileTooSmall);
    }
    reader.seek(SeekFrom::Start(0))?;

    let mut header = [0u8; GGUF_HEADER_LEN as usize];
    reader.read_exact(&mut header)?;

    let magic = u32::from_le_bytes([header[0], header[1], header[2], header[3]]);
    if magic != GGUF_MAGIC {
        return Err(ModelError::InvalidMagic(magic));
    }

    let version = u32::from_le_bytes([header[4], header[5], header[6], header[7]]);
    if !(2..=3).contains(&version) {
        return Err(ModelError::UnsupportedVersion(version));
    }

    let mut word = [0u8; 8];
    word.copy_from_slice(&header[8..16]);
    let tensor_count = u64::from_le_bytes(word);
    word.copy_from_slice(&header[16..24]);
    let metadata_kv_count = u64::from_le_bytes(word);

    Ok(GgufHeader {
        version,
        tensor_count,
        metadata_kv_count,
    })
}

#[cfg(test)]
pub(crate) fn gguf_header_bytes(version: u32) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(GGUF_HEADER_LEN as usize);
    bytes.extend_from_slice(&GGUF_MAGIC.to_le_bytes());
    bytes.extend_from_slice(&version.to_le_bytes());
    bytes.extend_from_slice(&22u64.to_le_bytes());
    bytes.extend_from_slice(&19u64.to_le_bytes());
    bytes
}

#[cfg(test)]
pub(crate) fn write_test_gguf() -> tempfile::NamedTempFile {
    use std::io::Write;

    let mut file = tempfile::Builder::new().suffix(".gguf").tempfile().unwrap();
    file.write_all(&gguf_header_bytes(3)).unwrap();
    file.flush().unwrap();
    file
}
