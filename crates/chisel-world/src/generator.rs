use chisel_data::blocks::{DIRT, GRASS_BLOCK};
use chisel_types::ChunkPos;
use thiserror::Error;

use crate::chunk::{ChunkColumn, MIN_Y};

#[derive(Debug, Error)]
#[error("chunk generation failed at ({cx}, {cz}): {reason}")]
pub struct GeneratorError {
    pub cx: i32,
    pub cz: i32,
    pub reason: String,
}

/// A pluggable terrain source. Implementations are deterministic for a fixed
/// (seed, config): the same position always yields the same column.
pub trait ChunkGenerator: Send + Sync {
    /// Identifier used in logs.
    fn name(&self) -> &str;

    /// Fill a column's blocks and publish its heightmap.
    fn generate_column(&self, pos: ChunkPos, column: &mut ChunkColumn)
        -> Result<(), GeneratorError>;

    /// The MOTION_BLOCKING heightmap for a column, without materialising it.
    fn generate_heightmap(&self, pos: ChunkPos) -> [i32; 256];
}

/// Superflat terrain: dirt up to y=63, grass at y=64, air above. The uniform
/// heightmap at 65 puts every column on the flat-world light path.
pub struct FlatGenerator {
    surface_y: i32,
}

impl FlatGenerator {
    pub fn new() -> Self {
        Self { surface_y: 64 }
    }
}

impl Default for FlatGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl ChunkGenerator for FlatGenerator {
    fn name(&self) -> &str {
        "flat"
    }

    fn generate_column(
        &self,
        pos: ChunkPos,
        column: &mut ChunkColumn,
    ) -> Result<(), GeneratorError> {
        for y in MIN_Y..self.surface_y {
            column.fill_layer(y, DIRT);
        }
        column.fill_layer(self.surface_y, GRASS_BLOCK);
        column.set_heightmap(self.generate_heightmap(pos));
        Ok(())
    }

    fn generate_heightmap(&self, _pos: ChunkPos) -> [i32; 256] {
        [self.surface_y + 1; 256]
    }
}
