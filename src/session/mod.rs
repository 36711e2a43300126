//! Session manager - connection routing and room lifecycle ownership

pub mod matchmaker;
pub mod registry;

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{broadcast, oneshot};
use tracing::info;
use uuid::Uuid;

use crate::game::{JoinAck, RoomCommand, RoomHandle, Tuning};
use crate::ws::protocol::ServerMsg;

use matchmaker::Matchmaker;
use registry::RoomRegistry;

/// How often a join is retried when a capacity race loses
const MAX_ASSIGN_ATTEMPTS: usize = 4;

/// Everything a connection needs after a successful join
pub struct PlayerSession {
    pub room: RoomHandle,
    pub ack: JoinAck,
    /// Subscribed before the join command is sent, so no broadcast
    /// between join and subscription can be missed
    pub broadcast_rx: broadcast::Receiver<ServerMsg>,
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("no open room available")]
    Unavailable,
}

/// Process-wide session state: the room registry, the matchmaker, and
/// the connection-to-room map used for routing inbound messages.
pub struct SessionManager {
    registry: Arc<RoomRegistry>,
    matchmaker: Matchmaker,
    connections: DashMap<Uuid, Uuid>,
}

impl SessionManager {
    pub fn new(tuning: Arc<Tuning>) -> Self {
        let registry = Arc::new(RoomRegistry::new());
        let matchmaker = Matchmaker::new(registry.clone(), tuning);
        Self {
            registry,
            matchmaker,
            connections: DashMap::new(),
        }
    }

    /// Assign the connection to a room and join it.
    ///
    /// Retries with a fresh assignment when the room turned out full or
    /// closed in the window between assignment and join.
    pub async fn join(&self, player_id: Uuid) -> Result<PlayerSession, SessionError> {
        for _ in 0..MAX_ASSIGN_ATTEMPTS {
            let handle = self.matchmaker.assign_room();
            let broadcast_rx = handle.broadcast_tx.subscribe();

            let (reply_tx, reply_rx) = oneshot::channel();
            let cmd = RoomCommand::Join {
                player_id,
                reply: reply_tx,
            };
            if handle.cmd_tx.send(cmd).await.is_err() {
                // Room task already gone; registry cleanup is in flight
                continue;
            }

            match reply_rx.await {
                Ok(Ok(ack)) => {
                    self.connections.insert(player_id, handle.id);
                    return Ok(PlayerSession {
                        room: handle,
                        ack,
                        broadcast_rx,
                    });
                }
                Ok(Err(_)) | Err(_) => continue,
            }
        }
        Err(SessionError::Unavailable)
    }

    /// Room currently owning this connection, if it still exists.
    ///
    /// Consults the registry on every call: once a room is deleted, a
    /// leftover connection mapping can never resurrect it.
    pub fn room_for(&self, player_id: Uuid) -> Option<RoomHandle> {
        let room_id = *self.connections.get(&player_id)?;
        self.registry.get(&room_id)
    }

    /// Route a command to the sending connection's room.
    /// Returns false when the room no longer exists.
    pub async fn route(&self, player_id: Uuid, cmd: RoomCommand) -> bool {
        let Some(handle) = self.room_for(player_id) else {
            return false;
        };
        handle.cmd_tx.send(cmd).await.is_ok()
    }

    /// Tear down a connection: tell its room (if any) and drop the
    /// routing entry.
    pub async fn disconnect(&self, player_id: Uuid) {
        let _ = self
            .route(player_id, RoomCommand::Disconnect { player_id })
            .await;
        self.connections.remove(&player_id);
        info!(player_id = %player_id, "Connection unregistered");
    }

    pub fn active_rooms(&self) -> usize {
        self.registry.active_rooms()
    }

    pub fn total_players(&self) -> usize {
        self.registry.total_players()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ws::protocol::Point;
    use std::time::Duration;

    fn sessions() -> SessionManager {
        SessionManager::new(Arc::new(Tuning::default()))
    }

    #[tokio::test]
    async fn two_joins_share_one_room() {
        let sessions = sessions();
        let a = sessions.join(Uuid::new_v4()).await.unwrap();
        let b = sessions.join(Uuid::new_v4()).await.unwrap();

        assert_eq!(a.room.id, b.room.id);
        assert_eq!(sessions.active_rooms(), 1);
        assert_eq!(a.room.player_count(), 2);
    }

    #[tokio::test]
    async fn third_join_gets_a_new_room() {
        let sessions = sessions();
        let a = sessions.join(Uuid::new_v4()).await.unwrap();
        let _b = sessions.join(Uuid::new_v4()).await.unwrap();
        let c = sessions.join(Uuid::new_v4()).await.unwrap();

        assert_ne!(a.room.id, c.room.id);
        assert_eq!(sessions.active_rooms(), 2);
    }

    #[tokio::test]
    async fn closed_room_is_never_assigned_again() {
        let sessions = sessions();
        let a_id = Uuid::new_v4();
        let a = sessions.join(a_id).await.unwrap();
        let closed_id = a.room.id;

        assert!(
            sessions
                .route(a_id, RoomCommand::ExitGame { player_id: a_id })
                .await
        );

        // Wait for the room task to notice and deregister
        for _ in 0..50 {
            if sessions.active_rooms() == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert_eq!(sessions.active_rooms(), 0);

        let b = sessions.join(Uuid::new_v4()).await.unwrap();
        assert_ne!(b.room.id, closed_id);
    }

    #[tokio::test]
    async fn routing_to_a_deleted_room_fails_cleanly() {
        let sessions = sessions();
        let a_id = Uuid::new_v4();
        let a = sessions.join(a_id).await.unwrap();

        sessions
            .route(a_id, RoomCommand::ExitGame { player_id: a_id })
            .await;
        for _ in 0..50 {
            if sessions.active_rooms() == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        let delivered = sessions
            .route(
                a_id,
                RoomCommand::PointerMove {
                    player_id: a_id,
                    pointer: Point::new(1.0, 2.0),
                },
            )
            .await;
        assert!(!delivered, "deleted room must be unreachable");
        drop(a);
    }
}
