//! Grid snapshots and parameter files
//!
//! Two formats:
//! - `.lpv`: binary snapshot of every cascade (placement states + SH
//!   cells) with a CRC32 integrity check. Header: magic "ALPV",
//!   version, flags, CRC32, then a bincode body.
//! - `.json`: human-readable parameter files for [`LpvParams`].
//!
//! Reads validate the CRC before deserializing, so corrupted data
//! fails fast instead of feeding garbage into bincode.
//!
//! Author: Moroya Sakamoto

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::cascade::{CascadeDesc, GridPlacement};
use crate::grid::LightGrid;
use crate::volume::{Lpv, LpvError, LpvParams};

/// Magic bytes of the snapshot format
pub const LPV_MAGIC: [u8; 4] = *b"ALPV";

/// Current snapshot format version
pub const LPV_VERSION: u16 = 1;

/// File I/O errors
#[derive(Error, Debug)]
pub enum IoError {
    /// I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid file format
    #[error("Invalid file format: {0}")]
    InvalidFormat(String),

    /// CRC checksum mismatch
    #[error("CRC mismatch: expected {expected}, got {actual}")]
    CrcMismatch {
        /// Expected CRC value
        expected: u32,
        /// Actual CRC value
        actual: u32,
    },

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Unsupported file version
    #[error("Unsupported version: {0}")]
    UnsupportedVersion(u16),
}

/// Stored state of one cascade
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CascadeRecord {
    /// Static description
    pub desc: CascadeDesc,
    /// Injection placement at capture time
    pub inject_state: GridPlacement,
    /// Apply placement at capture time
    pub apply_state: GridPlacement,
    /// SH cell contents
    pub grid: LightGrid,
}

/// A restorable snapshot of a volume's grids
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GridSnapshot {
    /// Cells per grid axis
    pub resolution: usize,
    /// One record per cascade, finest first
    pub cascades: Vec<CascadeRecord>,
}

impl GridSnapshot {
    /// Capture the current state of a volume
    pub fn capture(lpv: &Lpv) -> Self {
        GridSnapshot {
            resolution: lpv.resolution(),
            cascades: lpv
                .cascades()
                .iter()
                .map(|cascade| CascadeRecord {
                    desc: cascade.desc,
                    inject_state: cascade.inject_state,
                    apply_state: cascade.apply_state,
                    grid: cascade.grid.clone(),
                })
                .collect(),
        }
    }

    /// Restore this snapshot into a matching volume
    ///
    /// The volume must have the same resolution and cascade count.
    pub fn restore(&self, lpv: &mut Lpv) -> Result<(), LpvError> {
        if self.resolution != lpv.resolution() {
            return Err(LpvError::SnapshotShape(format!(
                "resolution {} vs volume {}",
                self.resolution,
                lpv.resolution()
            )));
        }
        if self.cascades.len() != lpv.cascade_count() {
            return Err(LpvError::SnapshotShape(format!(
                "{} cascades vs volume {}",
                self.cascades.len(),
                lpv.cascade_count()
            )));
        }
        for (cascade, record) in lpv.cascades_mut().iter_mut().zip(self.cascades.iter()) {
            cascade.desc = record.desc;
            cascade.inject_state = record.inject_state;
            cascade.apply_state = record.apply_state;
            cascade.grid.copy_from(&record.grid);
        }
        Ok(())
    }
}

/// Save a snapshot as a `.lpv` binary file
pub fn save_snapshot(snapshot: &GridSnapshot, path: impl AsRef<Path>) -> Result<(), IoError> {
    let body =
        bincode::serialize(snapshot).map_err(|e| IoError::Serialization(e.to_string()))?;
    let crc = crc32fast::hash(&body);

    let mut writer = BufWriter::new(File::create(path)?);
    writer.write_all(&LPV_MAGIC)?;
    writer.write_all(&LPV_VERSION.to_le_bytes())?;
    writer.write_all(&0u16.to_le_bytes())?; // flags, reserved
    writer.write_all(&crc.to_le_bytes())?;
    writer.write_all(&body)?;
    writer.flush()?;
    Ok(())
}

/// Load a `.lpv` binary snapshot
///
/// The CRC is validated before deserialization.
pub fn load_snapshot(path: impl AsRef<Path>) -> Result<GridSnapshot, IoError> {
    let mut reader = BufReader::new(File::open(path)?);

    let mut magic = [0u8; 4];
    reader.read_exact(&mut magic)?;
    if magic != LPV_MAGIC {
        return Err(IoError::InvalidFormat("bad magic bytes".to_string()));
    }

    let mut word = [0u8; 2];
    reader.read_exact(&mut word)?;
    let version = u16::from_le_bytes(word);
    if version != LPV_VERSION {
        return Err(IoError::UnsupportedVersion(version));
    }
    reader.read_exact(&mut word)?; // flags, reserved

    let mut crc_bytes = [0u8; 4];
    reader.read_exact(&mut crc_bytes)?;
    let expected = u32::from_le_bytes(crc_bytes);

    let mut body = Vec::new();
    reader.read_to_end(&mut body)?;
    let actual = crc32fast::hash(&body);
    if actual != expected {
        return Err(IoError::CrcMismatch { expected, actual });
    }

    bincode::deserialize(&body).map_err(|e| IoError::Serialization(e.to_string()))
}

/// Save parameters as JSON
pub fn save_params(params: &LpvParams, path: impl AsRef<Path>) -> Result<(), IoError> {
    let writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(writer, params)
        .map_err(|e| IoError::Serialization(e.to_string()))
}

/// Load parameters from JSON
pub fn load_params(path: impl AsRef<Path>) -> Result<LpvParams, IoError> {
    let reader = BufReader::new(File::open(path)?);
    serde_json::from_reader(reader).map_err(|e| IoError::Serialization(e.to_string()))
}
