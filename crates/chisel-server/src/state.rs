use std::sync::Arc;

use chisel_protocol_core::InternalPacket;
use chisel_world::World;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::config::ServerConfig;
use crate::player::Player;
use crate::visibility::VisibilityManager;

/// Handle to a connection in PLAY: identity plus the outbound packet queue
/// drained by that connection's writer task.
#[derive(Clone)]
pub struct ConnectionHandle {
    pub entity_id: i32,
    pub uuid: Uuid,
    pub name: String,
    pub sender: mpsc::UnboundedSender<InternalPacket>,
    pub player: Arc<Player>,
}

impl ConnectionHandle {
    pub fn send(&self, packet: InternalPacket) {
        // A closed channel means the writer task is gone; the reader side
        // notices on its own and runs the epilogue.
        let _ = self.sender.send(packet);
    }
}

/// Process-wide server state shared by every task.
pub struct ServerState {
    pub config: ServerConfig,
    pub world: Arc<World>,
    pub visibility: VisibilityManager,
    connections: Mutex<Vec<ConnectionHandle>>,
}

impl ServerState {
    pub fn new(config: ServerConfig, world: Arc<World>) -> Self {
        Self {
            config,
            world,
            visibility: VisibilityManager::new(),
            connections: Mutex::new(Vec::new()),
        }
    }

    /// Register a connection once it is fully in PLAY (spawn batch shipped).
    pub fn register_connection(&self, handle: ConnectionHandle) {
        self.connections.lock().push(handle);
    }

    pub fn unregister_connection(&self, entity_id: i32) {
        self.connections.lock().retain(|c| c.entity_id != entity_id);
    }

    /// Snapshot of the current connections; iteration never holds the lock.
    pub fn connections_snapshot(&self) -> Vec<ConnectionHandle> {
        self.connections.lock().clone()
    }

    pub fn player_count(&self) -> usize {
        self.connections.lock().len()
    }

    pub fn broadcast(&self, packet: &InternalPacket) {
        for handle in self.connections_snapshot() {
            handle.send(packet.clone());
        }
    }

    pub fn broadcast_except(&self, entity_id: i32, packet: &InternalPacket) {
        for handle in self.connections_snapshot() {
            if handle.entity_id != entity_id {
                handle.send(packet.clone());
            }
        }
    }
}
