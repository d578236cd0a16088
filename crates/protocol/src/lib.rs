//! Shared protocol crate for doomsday-sv.
//!
//! This crate contains:
//! - Change-flag sets for every delta kind
//! - The replicated entity records and the `Delta` envelope
//! - Little-endian binary reading/writing
//! - Frame packing for transmitted delta sets

mod binary;
mod error;
pub mod delta;
pub mod flags;
pub mod packets;

pub use binary::{BinaryReader, BinaryWriter};
pub use delta::{
    Delta, DeltaPayload, DeltaState, DeltaType, MaterialId, MobjState, PlayerState, PolyState,
    SectorState, SideState, SoundSource, SoundState, StateId, ThingId, MAX_PLAYERS,
};
pub use error::ProtocolError;
pub use flags::{
    MobjDdFlags, MobjFlags, PlayerFlags, PolyFlags, PspriteFlags, SectorFlags, SideFlags,
    SoundFlags,
};
