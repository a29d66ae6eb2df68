use bytes::{BufMut, BytesMut};
use chisel_data::heightmaps::MOTION_BLOCKING;
use chisel_protocol_core::{
    bitset_words, CodecError, ChunkLightData, InternalPacket, PalettedContainer,
};
use thiserror::Error;

use crate::chunk::{ChunkColumn, MAX_Y, MIN_Y, SECTION_COUNT};

/// Light masks address the 24 sections plus a sentinel edge below and above.
const LIGHT_SECTION_COUNT: usize = SECTION_COUNT + 2;
/// Ground section index pinned by the flat-world light branch.
const FLAT_GROUND_SECTION: usize = 8;

#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("palette index out of range: {0}")]
    InvalidPaletteIndex(CodecError),
    #[error("heightmap value {0} outside [{MIN_Y}, {MAX_Y}]")]
    InvalidHeightRange(i32),
    #[error("column holds {0} sections, expected {SECTION_COUNT}")]
    OutOfBoundsBlock(usize),
}

/// The on-wire pieces of one Chunk Data and Update Light packet.
#[derive(Debug, Clone)]
pub struct ChunkPayload {
    pub data: Vec<u8>,
    pub heightmaps: Vec<(i32, Vec<i64>)>,
    pub light: ChunkLightData,
}

impl ChunkPayload {
    pub fn into_packet(self, chunk_x: i32, chunk_z: i32) -> InternalPacket {
        InternalPacket::ChunkDataAndUpdateLight {
            chunk_x,
            chunk_z,
            heightmaps: self.heightmaps,
            data: self.data,
            light_data: self.light,
        }
    }
}

/// Encode a column into its wire payload: 24 section payloads bottom-up, the
/// packed MOTION_BLOCKING heightmap, and the light masks/arrays.
pub fn encode_column(column: &ChunkColumn) -> Result<ChunkPayload, EncodeError> {
    if column.sections().len() != SECTION_COUNT {
        return Err(EncodeError::OutOfBoundsBlock(column.sections().len()));
    }
    let mut buf = BytesMut::new();
    for section in column.sections() {
        buf.put_i16(section.non_air_count() as i16);
        let container = match section.uniform_id() {
            Some(id) => PalettedContainer::Single(id),
            None => PalettedContainer::from_values(&section.values(), 4, 8)
                .map_err(EncodeError::InvalidPaletteIndex)?,
        };
        container.write(&mut buf);
        // Biomes: the core publishes a single-value container (id 0).
        PalettedContainer::Single(0).write(&mut buf);
    }

    Ok(ChunkPayload {
        data: buf.to_vec(),
        heightmaps: vec![(MOTION_BLOCKING, pack_heightmap(column.heightmap())?)],
        light: encode_light(column),
    })
}

/// Pack 256 height cells at 9 bits each, 7 entries per long, 37 longs.
fn pack_heightmap(heightmap: &[i32; 256]) -> Result<Vec<i64>, EncodeError> {
    const BITS: usize = 9;
    const PER_LONG: usize = 64 / BITS;
    let mut packed = vec![0i64; (256 + PER_LONG - 1) / PER_LONG];
    for (i, &height) in heightmap.iter().enumerate() {
        if !(MIN_Y..=MAX_Y).contains(&height) {
            return Err(EncodeError::InvalidHeightRange(height));
        }
        let value = ((height - MIN_Y) as u64) & 0x1FF;
        let shift = (i % PER_LONG) * BITS;
        packed[i / PER_LONG] |= (value << shift) as i64;
    }
    Ok(packed)
}

/// Build the light payload for a column.
///
/// Two deliberately separate branches: the flat branch fires only on the
/// uniform-heightmap-at-65 convention and pins the ground section index at 8;
/// the terrain branch derives the lit range from the minimum heightmap value.
/// They are kept apart rather than unified because the flat path is a wire
/// convention of its own, not an optimisation of the terrain path.
fn encode_light(column: &ChunkColumn) -> ChunkLightData {
    if column.is_flat() {
        encode_light_flat(column)
    } else {
        encode_light_terrain(column)
    }
}

fn encode_light_flat(column: &ChunkColumn) -> ChunkLightData {
    // Everything from the ground section upward is skylit.
    let first_lit = FLAT_GROUND_SECTION + 1;
    build_light(column, first_lit)
}

fn encode_light_terrain(column: &ChunkColumn) -> ChunkLightData {
    let min_height = column.min_height().clamp(MIN_Y, MAX_Y - 1);
    let ground_section = ((min_height - MIN_Y) >> 4) as usize;
    build_light(column, ground_section + 1)
}

fn build_light(column: &ChunkColumn, first_lit: usize) -> ChunkLightData {
    let mut sky_bits = vec![false; LIGHT_SECTION_COUNT];
    let mut empty_sky_bits = vec![false; LIGHT_SECTION_COUNT];
    for (i, bit) in sky_bits.iter_mut().enumerate() {
        *bit = i >= first_lit;
    }
    for (i, bit) in empty_sky_bits.iter_mut().enumerate() {
        *bit = i < first_lit;
    }

    let heightmap = column.heightmap();
    let mut sky_light_arrays = Vec::new();
    for light_section in first_lit..LIGHT_SECTION_COUNT {
        sky_light_arrays.push(sky_nibbles(heightmap, light_section));
    }

    ChunkLightData {
        sky_light_mask: bitset_words(&sky_bits),
        block_light_mask: Vec::new(),
        empty_sky_light_mask: bitset_words(&empty_sky_bits),
        // Block light is uniformly empty in this core.
        empty_block_light_mask: bitset_words(&vec![true; LIGHT_SECTION_COUNT]),
        sky_light_arrays,
        block_light_arrays: Vec::new(),
    }
}

/// 2048 bytes of 4-bit cells for one light section. Cells at or above the
/// column heightmap hold 15; below, the value drops one per block, floored
/// at 0. Byte i packs cell 2i in the high nibble and cell 2i+1 in the low.
fn sky_nibbles(heightmap: &[i32; 256], light_section: usize) -> Vec<u8> {
    let section_base_y = MIN_Y - 16 + (light_section as i32) * 16;
    let mut bytes = vec![0u8; 2048];
    for local_y in 0..16 {
        let world_y = section_base_y + local_y;
        for z in 0..16 {
            for x in 0..16 {
                let height = heightmap[(z * 16 + x) as usize];
                let level: u8 = if world_y >= height {
                    15
                } else {
                    15u8.saturating_sub((height - world_y) as u8)
                };
                let cell = (local_y * 256 + z * 16 + x) as usize;
                if cell % 2 == 0 {
                    bytes[cell / 2] |= level << 4;
                } else {
                    bytes[cell / 2] |= level;
                }
            }
        }
    }
    bytes
}
