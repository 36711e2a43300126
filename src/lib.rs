//! Stickmen Server - authoritative two-player physics-fighting game server
//!
//! Each connection is matched into a room of at most two players. A room
//! owns one physics world and runs a fixed-rate simulation loop on its
//! own task: player pointers steer ragdoll heads, limb-to-head contacts
//! deal damage, and the authoritative state is broadcast to both
//! clients. A room closes on knockout, explicit exit, or when everyone
//! disconnects, and is then removed from the registry.

pub mod app;
pub mod config;
pub mod game;
pub mod http;
pub mod session;
pub mod util;
pub mod ws;
