use std::collections::HashMap;

use chisel_data::entity_types;
use chisel_protocol_core::{
    angle_from_degrees, player_info_actions, InternalPacket, PlayerInfoEntry,
};
use chisel_types::Vec3d;
use parking_lot::Mutex;
use uuid::Uuid;

use crate::state::ConnectionHandle;

/// Entity view radius in blocks (Euclidean).
const VIEW_RADIUS: f64 = 48.0;
/// Per-axis delta at which relative moves give way to an absolute teleport.
const TELEPORT_THRESHOLD: f64 = 8.0;
/// Head rotation is only re-sent past this many degrees of change.
const HEAD_YAW_EPSILON: f32 = 0.01;

/// Tracks, for every visible (viewer, target) pair, the last pose the viewer
/// was sent. The three caches have independent locks, always acquired in the
/// order position -> rotation -> head-yaw.
pub struct VisibilityManager {
    last_positions: Mutex<HashMap<(Uuid, i32), Vec3d>>,
    last_rotations: Mutex<HashMap<(Uuid, i32), (f32, f32)>>,
    last_head_yaws: Mutex<HashMap<(Uuid, i32), f32>>,
}

impl VisibilityManager {
    pub fn new() -> Self {
        Self {
            last_positions: Mutex::new(HashMap::new()),
            last_rotations: Mutex::new(HashMap::new()),
            last_head_yaws: Mutex::new(HashMap::new()),
        }
    }

    /// Announce a player that just entered PLAY: tab-list entries both ways
    /// (each connection also sees its own entry) and Spawn Entity for every
    /// ordered pair already in range.
    pub fn player_joined(&self, connections: &[ConnectionHandle], joiner: &ConnectionHandle) {
        let actions = player_info_actions::ADD_PLAYER | player_info_actions::UPDATE_LISTED;

        let mut entries: Vec<PlayerInfoEntry> = connections
            .iter()
            .filter(|c| c.entity_id != joiner.entity_id)
            .map(|c| info_entry(c))
            .collect();
        let joiner_entry = info_entry(joiner);

        // Existing players learn about the joiner...
        for existing in connections {
            if existing.entity_id == joiner.entity_id {
                continue;
            }
            existing.send(InternalPacket::PlayerInfoUpdate {
                actions,
                players: vec![joiner_entry.clone()],
            });
        }

        // ...and the joiner gets everyone, itself included.
        entries.push(joiner_entry);
        joiner.send(InternalPacket::PlayerInfoUpdate {
            actions,
            players: entries,
        });

        let joiner_pos = joiner.player.pose.read().position;
        for existing in connections {
            if existing.entity_id == joiner.entity_id {
                continue;
            }
            let existing_pos = existing.player.pose.read().position;
            if joiner_pos.distance_to(&existing_pos) <= VIEW_RADIUS {
                self.reveal(existing, joiner);
                self.reveal(joiner, existing);
            }
        }
    }

    /// Broadcast a mover's position change: range transitions, then delta or
    /// teleport packets, then the head-yaw follow-up.
    pub fn player_moved(&self, connections: &[ConnectionHandle], mover: &ConnectionHandle) {
        let mover_pose = *mover.player.pose.read();
        for viewer in connections {
            if viewer.entity_id == mover.entity_id {
                continue;
            }
            let viewer_pos = viewer.player.pose.read().position;
            let in_range = viewer_pos.distance_to(&mover_pose.position) <= VIEW_RADIUS;
            let visible = viewer
                .player
                .visible_entities
                .lock()
                .contains(&mover.entity_id);

            match (in_range, visible) {
                (true, false) => self.reveal(viewer, mover),
                (false, true) => self.conceal(viewer, mover),
                (true, true) => self.send_move(viewer, mover, &mover_pose),
                (false, false) => {}
            }
        }
    }

    /// Broadcast a rotation-only change.
    pub fn player_rotated(&self, connections: &[ConnectionHandle], mover: &ConnectionHandle) {
        let mover_pose = *mover.player.pose.read();
        for viewer in connections {
            if viewer.entity_id == mover.entity_id {
                continue;
            }
            if !viewer
                .player
                .visible_entities
                .lock()
                .contains(&mover.entity_id)
            {
                continue;
            }
            viewer.send(InternalPacket::UpdateEntityRotation {
                entity_id: mover.entity_id,
                yaw: angle_from_degrees(mover_pose.yaw),
                pitch: angle_from_degrees(mover_pose.pitch),
                on_ground: mover_pose.on_ground,
            });
            self.last_rotations
                .lock()
                .insert((viewer.uuid, mover.entity_id), (mover_pose.yaw, mover_pose.pitch));
            self.send_head_yaw(viewer, mover.entity_id, mover_pose.head_yaw);
        }
    }

    /// Tear down a departing player: one Player Info Remove and one Remove
    /// Entities to every remaining viewer, then sweep every cache entry the
    /// departure invalidates.
    pub fn player_disconnected(&self, connections: &[ConnectionHandle], departed: &ConnectionHandle) {
        for viewer in connections {
            if viewer.entity_id == departed.entity_id {
                continue;
            }
            viewer.send(InternalPacket::PlayerInfoRemove {
                uuids: vec![departed.uuid],
            });
            viewer.send(InternalPacket::RemoveEntities {
                entity_ids: vec![departed.entity_id],
            });
            viewer
                .player
                .visible_entities
                .lock()
                .remove(&departed.entity_id);
        }

        let dead_pair = |key: &(Uuid, i32)| key.0 == departed.uuid || key.1 == departed.entity_id;
        self.last_positions.lock().retain(|k, _| !dead_pair(k));
        self.last_rotations.lock().retain(|k, _| !dead_pair(k));
        self.last_head_yaws.lock().retain(|k, _| !dead_pair(k));
    }

    /// Send a packet to every connection that currently sees the target.
    pub fn broadcast_to_viewers_of(
        &self,
        connections: &[ConnectionHandle],
        target_entity_id: i32,
        packet: &InternalPacket,
    ) {
        for viewer in connections {
            if viewer.entity_id == target_entity_id {
                continue;
            }
            if viewer
                .player
                .visible_entities
                .lock()
                .contains(&target_entity_id)
            {
                viewer.send(packet.clone());
            }
        }
    }

    fn reveal(&self, viewer: &ConnectionHandle, target: &ConnectionHandle) {
        let pose = *target.player.pose.read();
        viewer.send(spawn_packet(target, &pose));
        viewer
            .player
            .visible_entities
            .lock()
            .insert(target.entity_id);
        self.seed(viewer.uuid, target.entity_id, &pose);
    }

    fn conceal(&self, viewer: &ConnectionHandle, target: &ConnectionHandle) {
        viewer.send(InternalPacket::RemoveEntities {
            entity_ids: vec![target.entity_id],
        });
        viewer
            .player
            .visible_entities
            .lock()
            .remove(&target.entity_id);
        let key = (viewer.uuid, target.entity_id);
        self.last_positions.lock().remove(&key);
        self.last_rotations.lock().remove(&key);
        self.last_head_yaws.lock().remove(&key);
    }

    fn seed(&self, viewer: Uuid, target: i32, pose: &crate::player::PlayerPose) {
        let key = (viewer, target);
        self.last_positions.lock().insert(key, pose.position);
        self.last_rotations.lock().insert(key, (pose.yaw, pose.pitch));
        self.last_head_yaws.lock().insert(key, pose.head_yaw);
    }

    fn send_move(
        &self,
        viewer: &ConnectionHandle,
        mover: &ConnectionHandle,
        pose: &crate::player::PlayerPose,
    ) {
        let key = (viewer.uuid, mover.entity_id);
        let last = self.last_positions.lock().get(&key).copied();
        let Some(last) = last else {
            // Cache miss: re-announce as a first spawn for this pair.
            self.reveal(viewer, mover);
            return;
        };

        let dx = pose.position.x - last.x;
        let dy = pose.position.y - last.y;
        let dz = pose.position.z - last.z;

        if dx.abs() >= TELEPORT_THRESHOLD
            || dy.abs() >= TELEPORT_THRESHOLD
            || dz.abs() >= TELEPORT_THRESHOLD
        {
            viewer.send(InternalPacket::TeleportEntity {
                entity_id: mover.entity_id,
                position: pose.position,
                velocity: Vec3d::ZERO,
                yaw: pose.yaw,
                pitch: pose.pitch,
                on_ground: pose.on_ground,
            });
        } else {
            // Movement always carries rotation, even when unchanged; the
            // separate head-yaw packet follows on its own threshold.
            viewer.send(InternalPacket::UpdateEntityPositionAndRotation {
                entity_id: mover.entity_id,
                delta_x: (dx * 4096.0).round() as i16,
                delta_y: (dy * 4096.0).round() as i16,
                delta_z: (dz * 4096.0).round() as i16,
                yaw: angle_from_degrees(pose.yaw),
                pitch: angle_from_degrees(pose.pitch),
                on_ground: pose.on_ground,
            });
        }
        self.last_positions.lock().insert(key, pose.position);
        self.last_rotations.lock().insert(key, (pose.yaw, pose.pitch));
        self.send_head_yaw(viewer, mover.entity_id, pose.head_yaw);
    }

    fn send_head_yaw(&self, viewer: &ConnectionHandle, target: i32, head_yaw: f32) {
        let key = (viewer.uuid, target);
        let mut cache = self.last_head_yaws.lock();
        let Some(cached) = cache.get(&key).copied() else {
            // Cache miss: seed from the current pose and announce it.
            cache.insert(key, head_yaw);
            viewer.send(InternalPacket::SetHeadRotation {
                entity_id: target,
                head_yaw: angle_from_degrees(head_yaw),
            });
            return;
        };
        if (head_yaw - cached).abs() > HEAD_YAW_EPSILON {
            viewer.send(InternalPacket::SetHeadRotation {
                entity_id: target,
                head_yaw: angle_from_degrees(head_yaw),
            });
            cache.insert(key, head_yaw);
        }
    }
}

impl Default for VisibilityManager {
    fn default() -> Self {
        Self::new()
    }
}

fn info_entry(handle: &ConnectionHandle) -> PlayerInfoEntry {
    PlayerInfoEntry {
        uuid: handle.uuid,
        name: Some(handle.name.clone()),
        properties: handle
            .player
            .profile
            .properties
            .iter()
            .map(|p| (p.name.clone(), p.value.clone(), p.signature.clone()))
            .collect(),
        game_mode: None,
        listed: Some(true),
        ping: None,
        display_name: None,
    }
}

fn spawn_packet(target: &ConnectionHandle, pose: &crate::player::PlayerPose) -> InternalPacket {
    InternalPacket::SpawnEntity {
        entity_id: target.entity_id,
        entity_uuid: target.uuid,
        entity_type: entity_types::PLAYER,
        x: pose.position.x,
        y: pose.position.y,
        z: pose.position.z,
        pitch: angle_from_degrees(pose.pitch),
        yaw: angle_from_degrees(pose.yaw),
        head_yaw: angle_from_degrees(pose.head_yaw),
        data: 0,
        velocity: Vec3d::ZERO,
    }
}
