use std::collections::HashMap;
use std::sync::Arc;

use chisel_types::{BlockPos, ChunkPos};
use parking_lot::{Mutex, RwLock};
use tracing::warn;

use crate::chunk::ChunkColumn;
use crate::generator::{ChunkGenerator, GeneratorError};

/// Concurrent (cx,cz) -> column map. A per-key init lock guarantees at most
/// one generation per key; a generation failure leaves the key absent so a
/// later request re-attempts.
pub struct ChunkStore {
    columns: RwLock<HashMap<ChunkPos, Arc<RwLock<ChunkColumn>>>>,
    init_locks: Mutex<HashMap<ChunkPos, Arc<Mutex<()>>>>,
    generator: Arc<dyn ChunkGenerator>,
}

impl ChunkStore {
    pub fn new(generator: Arc<dyn ChunkGenerator>) -> Self {
        Self {
            columns: RwLock::new(HashMap::new()),
            init_locks: Mutex::new(HashMap::new()),
            generator,
        }
    }

    pub fn generator(&self) -> &Arc<dyn ChunkGenerator> {
        &self.generator
    }

    /// Number of resident columns.
    pub fn len(&self) -> usize {
        self.columns.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.read().is_empty()
    }

    pub fn get(&self, pos: ChunkPos) -> Option<Arc<RwLock<ChunkColumn>>> {
        self.columns.read().get(&pos).cloned()
    }

    /// Fetch the column, generating it on first access. Concurrent callers
    /// for the same key serialise on the key's init lock; only one of them
    /// runs the generator.
    pub fn get_or_create(&self, pos: ChunkPos) -> Result<Arc<RwLock<ChunkColumn>>, GeneratorError> {
        if let Some(column) = self.get(pos) {
            return Ok(column);
        }

        let init_lock = {
            let mut locks = self.init_locks.lock();
            locks.entry(pos).or_insert_with(|| Arc::new(Mutex::new(()))).clone()
        };
        let _guard = init_lock.lock();

        // Another task may have generated while we waited on the init lock.
        if let Some(column) = self.get(pos) {
            return Ok(column);
        }

        let mut column = ChunkColumn::new();
        match self.generator.generate_column(pos, &mut column) {
            Ok(()) => {
                let column = Arc::new(RwLock::new(column));
                self.columns.write().insert(pos, column.clone());
                Ok(column)
            }
            Err(e) => {
                warn!("Generator '{}' failed for {:?}: {}", self.generator.name(), pos, e);
                Err(e)
            }
        }
    }

    /// Read a block by world coordinates; ungenerated columns materialise.
    pub fn get_block(&self, pos: &BlockPos) -> i32 {
        let chunk_pos = pos.chunk_pos();
        match self.get_or_create(chunk_pos) {
            Ok(column) => column
                .read()
                .get_block(pos.x & 15, pos.y, pos.z & 15),
            Err(_) => chisel_data::blocks::AIR,
        }
    }

    /// Write a block by world coordinates, returning the previous state id.
    /// Out-of-range writes are discarded by the column.
    pub fn set_block(&self, pos: &BlockPos, state_id: i32) -> i32 {
        let chunk_pos = pos.chunk_pos();
        match self.get_or_create(chunk_pos) {
            Ok(column) => {
                let mut column = column.write();
                let old = column.get_block(pos.x & 15, pos.y, pos.z & 15);
                column.set_block(pos.x & 15, pos.y, pos.z & 15, state_id);
                old
            }
            Err(_) => chisel_data::blocks::AIR,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generator::FlatGenerator;
    use chisel_data::blocks::{AIR, DIRT, GRASS_BLOCK, STONE};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingGenerator {
        calls: AtomicUsize,
    }

    impl ChunkGenerator for CountingGenerator {
        fn name(&self) -> &str {
            "counting"
        }

        fn generate_column(
            &self,
            pos: ChunkPos,
            column: &mut ChunkColumn,
        ) -> Result<(), GeneratorError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            FlatGenerator::new().generate_column(pos, column)
        }

        fn generate_heightmap(&self, pos: ChunkPos) -> [i32; 256] {
            FlatGenerator::new().generate_heightmap(pos)
        }
    }

    struct FailingGenerator;

    impl ChunkGenerator for FailingGenerator {
        fn name(&self) -> &str {
            "failing"
        }

        fn generate_column(
            &self,
            pos: ChunkPos,
            _column: &mut ChunkColumn,
        ) -> Result<(), GeneratorError> {
            Err(GeneratorError {
                cx: pos.x,
                cz: pos.z,
                reason: "intentional".into(),
            })
        }

        fn generate_heightmap(&self, _pos: ChunkPos) -> [i32; 256] {
            [MIN_Y; 256]
        }
    }

    use crate::chunk::MIN_Y;

    #[test]
    fn test_at_most_one_generation_per_key() {
        let generator = Arc::new(CountingGenerator {
            calls: AtomicUsize::new(0),
        });
        let store = Arc::new(ChunkStore::new(generator.clone()));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = store.clone();
            handles.push(std::thread::spawn(move || {
                store.get_or_create(ChunkPos::new(0, 0)).unwrap();
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(generator.calls.load(Ordering::SeqCst), 1);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_failed_generation_leaves_key_absent() {
        let store = ChunkStore::new(Arc::new(FailingGenerator));
        assert!(store.get_or_create(ChunkPos::new(0, 0)).is_err());
        assert!(store.get(ChunkPos::new(0, 0)).is_none());
        assert!(store.is_empty());
        // A later attempt retries rather than observing a poisoned entry.
        assert!(store.get_or_create(ChunkPos::new(0, 0)).is_err());
    }

    #[test]
    fn test_block_addressing_demultiplexes() {
        let store = ChunkStore::new(Arc::new(FlatGenerator::new()));
        assert_eq!(store.get_block(&BlockPos::new(0, 64, 0)), GRASS_BLOCK);
        assert_eq!(store.get_block(&BlockPos::new(-1, 63, -1)), DIRT);
        assert_eq!(store.get_block(&BlockPos::new(100, 65, -200)), AIR);

        let old = store.set_block(&BlockPos::new(-1, 64, -1), STONE);
        assert_eq!(old, GRASS_BLOCK);
        assert_eq!(store.get_block(&BlockPos::new(-1, 64, -1)), STONE);
        // The neighbouring column is untouched.
        assert_eq!(store.get_block(&BlockPos::new(0, 64, 0)), GRASS_BLOCK);
    }
}
