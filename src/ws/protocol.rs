//! WebSocket protocol message definitions
//! These are the wire types for client-server communication

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Team color, assigned by join order (first joiner is black)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Color {
    Black,
    Red,
}

/// Named body parts of a stickman ragdoll.
///
/// Serialized names match the wire format the client renders from
/// (`armL`, `handR`, ...), so no mapping layer is needed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PartName {
    #[serde(rename = "head")]
    Head,
    #[serde(rename = "chest")]
    Chest,
    #[serde(rename = "pelvis")]
    Pelvis,
    #[serde(rename = "armL")]
    ArmL,
    #[serde(rename = "armR")]
    ArmR,
    #[serde(rename = "handL")]
    HandL,
    #[serde(rename = "handR")]
    HandR,
    #[serde(rename = "legL")]
    LegL,
    #[serde(rename = "legR")]
    LegR,
    #[serde(rename = "footL")]
    FootL,
    #[serde(rename = "footR")]
    FootR,
}

/// 2D point in screen coordinates
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// Messages sent from client to server
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ClientMsg {
    /// Update the steering target for this player's ragdoll head
    PointerMove { pointer: Point },

    /// Voluntarily end the match for both players
    ExitGame,
}

/// Messages sent from server to client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ServerMsg {
    /// Sent once, immediately after a successful join
    Init { id: Uuid, color: Color },

    /// Authoritative state of every player in the room
    State {
        players: HashMap<Uuid, PlayerSnapshot>,
    },

    /// Match ended (KO or explicit exit); client must leave the match view
    GoToMenu,

    /// The referenced room no longer exists
    RoomClosed,

    /// A specific opponent disconnected mid-match
    PlayerLeft { id: Uuid },
}

/// Per-player state inside a `state` broadcast
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerSnapshot {
    pub color: Color,
    pub hp: i32,
    pub parts: HashMap<PartName, Point>,
}
