//! Save state for the peripheral model.
//!
//! Captures the full model state using bincode serialization with deflate
//! compression, so a run can be stopped and resumed on the exact cycle.
//!
//! ## File format
//!
//! ```text
//! +------------------+
//! | Magic "SPWM"     |  4 bytes
//! +------------------+
//! | Format version   |  u32 little-endian (currently 2)
//! +------------------+
//! | Compressed data  |  deflate-compressed bincode payload
//! +------------------+
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

use crate::peripherals::{PwmGenerator, RegisterBank, SpiDecoder};
use crate::pins::{InputPins, OutputPins};
use crate::Stats;

/// Magic bytes identifying a save state file.
const MAGIC: &[u8; 4] = b"SPWM";
/// Current save state format version.
const FORMAT_VERSION: u32 = 2;
/// Magic + version
const HEADER_LEN: usize = 8;

#[derive(Debug, Error)]
pub enum SaveStateError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialize error: {0}")]
    Encode(#[from] bincode::Error),
    #[error("decompress error: {0}")]
    Decompress(String),
    #[error("file too small")]
    TooSmall,
    #[error("invalid save state file (bad magic)")]
    BadMagic,
    #[error("unsupported save state version {found} (expected {expected})")]
    Version { found: u32, expected: u32 },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaveState {
    pub cycle: u64,
    pub pins: InputPins,
    pub outputs: OutputPins,
    pub regs: RegisterBank,
    pub spi: SpiDecoder,
    pub pwm: PwmGenerator,
    pub stats: Stats,
    /// `rst_n` was already low on the last tick
    pub in_reset: bool,
}

/// Encode with header and deflate compression.
pub fn to_bytes(state: &SaveState) -> Result<Vec<u8>, SaveStateError> {
    let payload = bincode::serialize(state)?;
    let compressed = miniz_oxide::deflate::compress_to_vec(&payload, 6);

    let mut out = Vec::with_capacity(HEADER_LEN + compressed.len());
    out.extend_from_slice(MAGIC);
    out.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
    out.extend_from_slice(&compressed);
    Ok(out)
}

/// Decode, verifying magic and version.
pub fn from_bytes(data: &[u8]) -> Result<SaveState, SaveStateError> {
    if data.len() < HEADER_LEN {
        return Err(SaveStateError::TooSmall);
    }
    if &data[0..4] != MAGIC {
        return Err(SaveStateError::BadMagic);
    }
    let version = u32::from_le_bytes([data[4], data[5], data[6], data[7]]);
    if version != FORMAT_VERSION {
        return Err(SaveStateError::Version { found: version, expected: FORMAT_VERSION });
    }

    let decompressed = miniz_oxide::inflate::decompress_to_vec(&data[HEADER_LEN..])
        .map_err(|e| SaveStateError::Decompress(format!("{:?}", e)))?;

    Ok(bincode::deserialize(&decompressed)?)
}

pub fn save_to_file(state: &SaveState, path: &Path) -> Result<(), SaveStateError> {
    std::fs::write(path, to_bytes(state)?)?;
    Ok(())
}

pub fn load_from_file(path: &Path) -> Result<SaveState, SaveStateError> {
    let data = std::fs::read(path)?;
    from_bytes(&data)
}
