//! Error types for map construction, delta algebra and session control.

use protocol::DeltaType;
use thiserror::Error;

/// Failures while building spatial indices or the map model. Fatal for the
/// map being loaded.
#[derive(Debug, Error)]
pub enum MapError {
    #[error("Invalid cell size: {0}x{1}")]
    InvalidCellSize(f64, f64),

    #[error("Invalid bounds: ({min_x}, {min_y}) - ({max_x}, {max_y})")]
    InvalidBounds {
        min_x: f64,
        min_y: f64,
        max_x: f64,
        max_y: f64,
    },

    #[error("Grid dimensions {0}x{1} are out of range")]
    GridDimensions(u64, u64),

    #[error("Unknown sector: {0}")]
    UnknownSector(u32),

    #[error("Unknown leaf: {0}")]
    UnknownLeaf(u32),

    #[error("Unknown line: {0}")]
    UnknownLine(u32),
}

/// Logic errors in the delta algebra.
#[derive(Debug, Error, PartialEq)]
pub enum DeltaError {
    #[error("Delta mismatch: expected {expected_type:?} #{expected_id}, got {found_type:?} #{found_id}")]
    Mismatch {
        expected_type: DeltaType,
        expected_id: u32,
        found_type: DeltaType,
        found_id: u32,
    },

    #[error("Merge destination {0:?} #{1} is not NEW")]
    NotNew(DeltaType, u32),
}

/// Misuse of the replication session API.
#[derive(Debug, Error, PartialEq)]
pub enum SessionError {
    #[error("Client slot {0} is out of range")]
    ClientOutOfRange(usize),

    #[error("Client {0} is not connected")]
    NotConnected(usize),
}
