/// Block state IDs consumed by the core (1.21.9 block report).
pub mod blocks {
    pub const AIR: i32 = 0;
    pub const STONE: i32 = 1;
    pub const GRASS_BLOCK: i32 = 9; // grass_block[snowy=false]
    pub const DIRT: i32 = 10;
    pub const BEDROCK: i32 = 79;
}

/// Entity type protocol IDs from the entity_type registry.
pub mod entity_types {
    pub const PLAYER: i32 = 149;
}

/// Item protocol IDs the placement path maps onto block states.
pub mod items {
    pub const STONE: i32 = 1;
    pub const GRASS_BLOCK: i32 = 8;
    pub const DIRT: i32 = 9;
}

/// Heightmap type ids for the chunk packet heightmap array.
pub mod heightmaps {
    pub const MOTION_BLOCKING: i32 = 4;
}

/// Map a held item onto the block state it places. Items without a block form
/// place nothing.
pub fn block_for_item(item_id: i32) -> Option<i32> {
    match item_id {
        i if i == items::STONE => Some(blocks::STONE),
        i if i == items::GRASS_BLOCK => Some(blocks::GRASS_BLOCK),
        i if i == items::DIRT => Some(blocks::DIRT),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_for_item() {
        assert_eq!(block_for_item(items::DIRT), Some(blocks::DIRT));
        assert_eq!(block_for_item(9999), None);
    }
}
