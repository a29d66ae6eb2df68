use chisel_data::blocks;

/// Number of vertical sections in a column (y from -64 to 320, 384 blocks).
pub const SECTION_COUNT: usize = 24;
/// Lowest world Y coordinate (inclusive).
pub const MIN_Y: i32 = -64;
/// Highest world Y coordinate (exclusive).
pub const MAX_Y: i32 = 320;

/// Block storage of a 16x16x16 section. Sections start uniform and densify
/// on the first differing write.
#[derive(Debug, Clone)]
enum SectionBlocks {
    Uniform(i32),
    Dense(Box<[i32; 4096]>),
}

/// A 16x16x16 chunk section.
#[derive(Debug, Clone)]
pub struct ChunkSection {
    blocks: SectionBlocks,
    non_air: u16,
}

fn section_index(x: usize, y: usize, z: usize) -> usize {
    y * 256 + z * 16 + x
}

impl ChunkSection {
    /// Create an all-air section.
    pub fn empty() -> Self {
        Self {
            blocks: SectionBlocks::Uniform(blocks::AIR),
            non_air: 0,
        }
    }

    /// Create a section where every block has the same state id.
    pub fn uniform(state_id: i32) -> Self {
        Self {
            blocks: SectionBlocks::Uniform(state_id),
            non_air: if state_id == blocks::AIR { 0 } else { 4096 },
        }
    }

    /// Number of non-air blocks in the section.
    pub fn non_air_count(&self) -> u16 {
        self.non_air
    }

    pub fn get(&self, x: usize, y: usize, z: usize) -> i32 {
        match &self.blocks {
            SectionBlocks::Uniform(id) => *id,
            SectionBlocks::Dense(data) => data[section_index(x, y, z)],
        }
    }

    pub fn set(&mut self, x: usize, y: usize, z: usize, state_id: i32) {
        let idx = section_index(x, y, z);
        let old = match &mut self.blocks {
            SectionBlocks::Uniform(id) => {
                if *id == state_id {
                    return;
                }
                let uniform = *id;
                let mut data = Box::new([uniform; 4096]);
                data[idx] = state_id;
                self.blocks = SectionBlocks::Dense(data);
                uniform
            }
            SectionBlocks::Dense(data) => {
                let old = data[idx];
                data[idx] = state_id;
                old
            }
        };
        if old == blocks::AIR && state_id != blocks::AIR {
            self.non_air += 1;
        } else if old != blocks::AIR && state_id == blocks::AIR {
            self.non_air -= 1;
        }
    }

    /// Block state ids in section order (y, then z, then x).
    pub fn values(&self) -> Vec<i32> {
        match &self.blocks {
            SectionBlocks::Uniform(id) => vec![*id; 4096],
            SectionBlocks::Dense(data) => data.to_vec(),
        }
    }

    /// The single id of a still-uniform section.
    pub fn uniform_id(&self) -> Option<i32> {
        match &self.blocks {
            SectionBlocks::Uniform(id) => Some(*id),
            SectionBlocks::Dense(_) => None,
        }
    }
}

/// A full chunk column: 24 stacked sections plus the derived MOTION_BLOCKING
/// heightmap (world y of the first non-solid block above terrain per cell).
///
/// All addressing through the column is bounds-disciplined: reads outside
/// 0..16 / [MIN_Y, MAX_Y) return air, writes outside are discarded.
#[derive(Debug, Clone)]
pub struct ChunkColumn {
    sections: Vec<ChunkSection>,
    heightmap: [i32; 256],
}

impl ChunkColumn {
    pub fn new() -> Self {
        Self {
            sections: (0..SECTION_COUNT).map(|_| ChunkSection::empty()).collect(),
            heightmap: [MIN_Y; 256],
        }
    }

    pub fn sections(&self) -> &[ChunkSection] {
        &self.sections
    }

    fn in_range(local_x: i32, y: i32, local_z: i32) -> bool {
        (0..16).contains(&local_x) && (0..16).contains(&local_z) && (MIN_Y..MAX_Y).contains(&y)
    }

    pub fn get_block(&self, local_x: i32, y: i32, local_z: i32) -> i32 {
        if !Self::in_range(local_x, y, local_z) {
            return blocks::AIR;
        }
        let section = &self.sections[((y - MIN_Y) >> 4) as usize];
        section.get(local_x as usize, ((y - MIN_Y) & 15) as usize, local_z as usize)
    }

    pub fn set_block(&mut self, local_x: i32, y: i32, local_z: i32, state_id: i32) {
        if !Self::in_range(local_x, y, local_z) {
            return;
        }
        let section = &mut self.sections[((y - MIN_Y) >> 4) as usize];
        section.set(
            local_x as usize,
            ((y - MIN_Y) & 15) as usize,
            local_z as usize,
            state_id,
        );
        self.update_height(local_x, local_z);
    }

    /// Fill an entire horizontal layer with one state id. The heightmap is
    /// not touched; generators publish theirs when the column is complete.
    pub fn fill_layer(&mut self, y: i32, state_id: i32) {
        if !(MIN_Y..MAX_Y).contains(&y) {
            return;
        }
        for x in 0..16 {
            for z in 0..16 {
                let section = &mut self.sections[((y - MIN_Y) >> 4) as usize];
                section.set(x as usize, ((y - MIN_Y) & 15) as usize, z as usize, state_id);
            }
        }
    }

    pub fn heightmap(&self) -> &[i32; 256] {
        &self.heightmap
    }

    /// Publish an externally computed heightmap (generator interface).
    pub fn set_heightmap(&mut self, heightmap: [i32; 256]) {
        self.heightmap = heightmap;
    }

    /// Recompute all 256 heightmap cells by scanning top-down.
    pub fn recompute_heightmap(&mut self) {
        for x in 0..16 {
            for z in 0..16 {
                self.update_height(x, z);
            }
        }
    }

    fn update_height(&mut self, local_x: i32, local_z: i32) {
        let cell = (local_z * 16 + local_x) as usize;
        let mut height = MIN_Y;
        for y in (MIN_Y..MAX_Y).rev() {
            if self.get_block(local_x, y, local_z) != blocks::AIR {
                height = y + 1;
                break;
            }
        }
        self.heightmap[cell] = height;
    }

    /// Minimum heightmap value across the column.
    pub fn min_height(&self) -> i32 {
        self.heightmap.iter().copied().min().unwrap_or(MIN_Y)
    }

    /// The flat-world convention: a heightmap uniform at y = 65.
    pub fn is_flat(&self) -> bool {
        self.heightmap.iter().all(|&h| h == 65)
    }
}

impl Default for ChunkColumn {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chisel_data::blocks::{DIRT, GRASS_BLOCK, STONE};

    #[test]
    fn test_empty_column_reads_air() {
        let column = ChunkColumn::new();
        assert_eq!(column.get_block(0, 0, 0), blocks::AIR);
        assert_eq!(column.get_block(15, 319, 15), blocks::AIR);
    }

    #[test]
    fn test_out_of_range_reads_air() {
        let mut column = ChunkColumn::new();
        column.set_block(0, 64, 0, STONE);
        assert_eq!(column.get_block(-1, 64, 0), blocks::AIR);
        assert_eq!(column.get_block(16, 64, 0), blocks::AIR);
        assert_eq!(column.get_block(0, -65, 0), blocks::AIR);
        assert_eq!(column.get_block(0, 320, 0), blocks::AIR);
    }

    #[test]
    fn test_out_of_range_writes_discarded() {
        let mut column = ChunkColumn::new();
        column.set_block(16, 64, 0, STONE);
        column.set_block(0, 320, 0, STONE);
        column.set_block(0, -65, 0, STONE);
        for section in column.sections() {
            assert_eq!(section.non_air_count(), 0);
        }
    }

    #[test]
    fn test_set_get_roundtrip() {
        let mut column = ChunkColumn::new();
        column.set_block(3, -64, 7, STONE);
        column.set_block(3, 0, 7, DIRT);
        column.set_block(3, 319, 7, GRASS_BLOCK);
        assert_eq!(column.get_block(3, -64, 7), STONE);
        assert_eq!(column.get_block(3, 0, 7), DIRT);
        assert_eq!(column.get_block(3, 319, 7), GRASS_BLOCK);
    }

    #[test]
    fn test_section_non_air_count() {
        let mut section = ChunkSection::empty();
        section.set(0, 0, 0, STONE);
        section.set(1, 0, 0, STONE);
        assert_eq!(section.non_air_count(), 2);
        section.set(0, 0, 0, blocks::AIR);
        assert_eq!(section.non_air_count(), 1);
        // Overwriting non-air with non-air keeps the count.
        section.set(1, 0, 0, DIRT);
        assert_eq!(section.non_air_count(), 1);
    }

    #[test]
    fn test_uniform_section_densifies_on_write() {
        let mut section = ChunkSection::uniform(STONE);
        assert_eq!(section.uniform_id(), Some(STONE));
        section.set(5, 5, 5, DIRT);
        assert_eq!(section.uniform_id(), None);
        assert_eq!(section.get(5, 5, 5), DIRT);
        assert_eq!(section.get(5, 5, 6), STONE);
        assert_eq!(section.non_air_count(), 4096);
    }

    #[test]
    fn test_heightmap_tracks_writes() {
        let mut column = ChunkColumn::new();
        column.set_block(0, 64, 0, GRASS_BLOCK);
        assert_eq!(column.heightmap()[0], 65);
        column.set_block(0, 100, 0, STONE);
        assert_eq!(column.heightmap()[0], 101);
        column.set_block(0, 100, 0, blocks::AIR);
        assert_eq!(column.heightmap()[0], 65);
    }

    #[test]
    fn test_flat_flag() {
        let mut column = ChunkColumn::new();
        for y in MIN_Y..=63 {
            column.fill_layer(y, DIRT);
        }
        column.fill_layer(64, GRASS_BLOCK);
        column.recompute_heightmap();
        assert!(column.is_flat());
        column.set_block(8, 70, 8, STONE);
        assert!(!column.is_flat());
    }
}
