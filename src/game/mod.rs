//! Game simulation modules

pub mod combat;
pub mod physics;
pub mod ragdoll;
pub mod room;
pub mod tuning;

pub use room::{JoinAck, Room, RoomCommand, RoomError, RoomHandle, RoomPhase, ROOM_CAPACITY};
pub use tuning::Tuning;
