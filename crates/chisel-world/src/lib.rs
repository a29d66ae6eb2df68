pub mod chunk;
pub mod encoder;
pub mod generator;
pub mod store;
pub mod world;

pub use chunk::{ChunkColumn, ChunkSection, MAX_Y, MIN_Y, SECTION_COUNT};
pub use encoder::{encode_column, ChunkPayload, EncodeError};
pub use generator::{ChunkGenerator, FlatGenerator, GeneratorError};
pub use store::ChunkStore;
pub use world::{Entity, World};
