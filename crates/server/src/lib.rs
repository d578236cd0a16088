//! Server-side delta replication for a Doom-family engine.
//!
//! The world is diffed against a register of what clients were last told.
//! The resulting deltas are merged into one pool per client, scored, and
//! handed to the frame assembler in priority order. The spatial indices
//! serve the world model and the contact spreading in [`objlink`].

pub mod clock;
pub mod config;
pub mod delta;
pub mod error;
pub mod objlink;
pub mod server;
pub mod spatial;
pub mod world;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::Config;
pub use delta::{ClientPool, ReplicationSession, SoundOrigin};
pub use error::{DeltaError, MapError, SessionError};
pub use server::{run, ServerState};
pub use world::World;
