//! Where encoded blocks come from.

use std::sync::Arc;

use geohist_entity::{EncodedBlock, EntityRef};
use hashbrown::HashMap;
use parking_lot::RwLock;

use crate::{StorageError, StorageResult};

/// Synchronous block lookup by entity.
pub trait BlockSource: Send + Sync {
    /// Fails with [`StorageError::NotFound`] when nothing is stored.
    fn get_block(&self, entity: EntityRef) -> StorageResult<EncodedBlock>;
}

impl<T: BlockSource + ?Sized> BlockSource for Arc<T> {
    fn get_block(&self, entity: EntityRef) -> StorageResult<EncodedBlock> {
        (**self).get_block(entity)
    }
}

/// Blocks held in memory.
#[derive(Default)]
pub struct MemoryBlockSource {
    blocks: RwLock<HashMap<EntityRef, EncodedBlock>>,
}

impl MemoryBlockSource {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `block` under the entity its header names. Returns the block it
    /// replaced.
    pub fn insert(&self, block: EncodedBlock) -> Option<EncodedBlock> {
        self.blocks.write().insert(block.entity(), block)
    }

    pub fn remove(&self, entity: EntityRef) -> Option<EncodedBlock> {
        self.blocks.write().remove(&entity)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.blocks.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.blocks.read().is_empty()
    }

    /// Total encoded size of all stored blocks.
    #[must_use]
    pub fn byte_len(&self) -> usize {
        self.blocks.read().values().map(EncodedBlock::len).sum()
    }
}

impl BlockSource for MemoryBlockSource {
    fn get_block(&self, entity: EntityRef) -> StorageResult<EncodedBlock> {
        self.blocks
            .read()
            .get(&entity)
            .cloned()
            .ok_or(StorageError::NotFound(entity))
    }
}
