use std::collections::HashSet;

use chisel_types::{ChunkPos, GameProfile, ItemStack, Vec3d};
use parking_lot::{Mutex, RwLock};

/// Position and look direction, updated by the connection's handler task and
/// read by the visibility broadcaster.
#[derive(Debug, Clone, Copy)]
pub struct PlayerPose {
    pub position: Vec3d,
    pub yaw: f32,
    pub pitch: f32,
    pub head_yaw: f32,
    pub on_ground: bool,
}

/// Client Information fields retained from the configuration phase (or a
/// play-phase re-send).
#[derive(Debug, Clone)]
pub struct ClientInfo {
    pub locale: String,
    pub view_distance: i8,
    pub chat_mode: i32,
    pub chat_colors: bool,
    pub skin_parts: u8,
    pub main_hand: i32,
    pub text_filtering: bool,
    pub allow_listing: bool,
}

/// Per-connection player record. The connection exclusively owns mutation;
/// producers (visibility, streamer) read committed values through the locks.
pub struct Player {
    pub entity_id: i32,
    pub profile: GameProfile,
    pub pose: RwLock<PlayerPose>,
    pub held_slot: Mutex<u8>,
    pub inventory: Mutex<Inventory>,
    /// Columns this player's client currently holds.
    pub loaded_chunks: Mutex<HashSet<ChunkPos>>,
    /// Entity ids this player currently sees.
    pub visible_entities: Mutex<HashSet<i32>>,
    pub client_info: Mutex<Option<ClientInfo>>,
}

impl Player {
    pub fn new(entity_id: i32, profile: GameProfile, spawn: Vec3d) -> Self {
        Self {
            entity_id,
            profile,
            pose: RwLock::new(PlayerPose {
                position: spawn,
                yaw: 0.0,
                pitch: 0.0,
                head_yaw: 0.0,
                on_ground: false,
            }),
            held_slot: Mutex::new(0),
            inventory: Mutex::new(Inventory::new()),
            loaded_chunks: Mutex::new(HashSet::new()),
            visible_entities: Mutex::new(HashSet::new()),
            client_info: Mutex::new(None),
        }
    }

    pub fn chunk_pos(&self) -> ChunkPos {
        self.pose.read().position.chunk_pos()
    }

    /// The item currently in the selected hotbar slot.
    pub fn held_item(&self) -> Option<ItemStack> {
        let slot = *self.held_slot.lock();
        self.inventory.lock().held_item(slot).clone()
    }
}

/// Player inventory: 46 slots.
/// Slot 0: crafting output, 1-4: crafting input, 5-8: armor,
/// 9-35: main inventory, 36-44: hotbar, 45: offhand.
pub struct Inventory {
    pub slots: [Option<ItemStack>; 46],
    pub state_id: i32,
}

impl Inventory {
    pub fn new() -> Self {
        Self {
            slots: std::array::from_fn(|_| None),
            state_id: 1,
        }
    }

    /// Get the item in the given hotbar slot (0-8).
    pub fn held_item(&self, hotbar_slot: u8) -> &Option<ItemStack> {
        &self.slots[36 + (hotbar_slot as usize).min(8)]
    }

    /// Set a slot and bump state_id. Out-of-range indices are discarded.
    pub fn set_slot(&mut self, index: usize, item: Option<ItemStack>) {
        if index < self.slots.len() {
            self.slots[index] = item;
            self.state_id = self.state_id.wrapping_add(1);
        }
    }

    pub fn to_slot_vec(&self) -> Vec<Option<ItemStack>> {
        self.slots.to_vec()
    }
}

impl Default for Inventory {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn player() -> Player {
        Player::new(
            1,
            GameProfile {
                uuid: Uuid::new_v4(),
                name: "tester".into(),
                properties: Vec::new(),
            },
            Vec3d::new(0.0, 65.0, 0.0),
        )
    }

    #[test]
    fn test_chunk_pos_follows_pose() {
        let player = player();
        assert_eq!(player.chunk_pos(), ChunkPos::new(0, 0));
        player.pose.write().position = Vec3d::new(85.0, 65.0, -3.0);
        assert_eq!(player.chunk_pos(), ChunkPos::new(5, -1));
    }

    #[test]
    fn test_held_item_tracks_slot() {
        let player = player();
        player.inventory.lock().set_slot(36, Some(ItemStack::new(5, 1)));
        player.inventory.lock().set_slot(37, Some(ItemStack::new(9, 1)));
        assert_eq!(player.held_item(), Some(ItemStack::new(5, 1)));
        *player.held_slot.lock() = 1;
        assert_eq!(player.held_item(), Some(ItemStack::new(9, 1)));
    }

    #[test]
    fn test_inventory_out_of_range_discarded() {
        let mut inventory = Inventory::new();
        let state = inventory.state_id;
        inventory.set_slot(46, Some(ItemStack::new(1, 1)));
        assert_eq!(inventory.state_id, state);
    }
}
