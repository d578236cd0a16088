//! Packet definitions for frame transmission.
//!
//! The server sends frames of deltas; the client answers with acks of the
//! frame's set (or resend) id.

mod frame;

pub use frame::*;

/// Opcodes for server -> client packets.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerOpcode {
    /// A set of deltas.
    Frame = 0x01,
    /// First frame after the client entered the game.
    FirstFrame = 0x02,
}

/// Opcodes for client -> server packets.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientOpcode {
    /// Acknowledges every delta of a frame set.
    AckSet = 0x10,
    /// Acknowledges a resend id.
    AckResend = 0x11,
}
