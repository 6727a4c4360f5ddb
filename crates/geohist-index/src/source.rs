//! Where page bytes come from.

use std::sync::Arc;

use bytes::Bytes;
use hashbrown::HashMap;
use parking_lot::RwLock;

use crate::{BuiltIndex, PageKey, PageSourceError};

/// Synchronous page storage backend.
pub trait PageSource: Send + Sync {
    fn get_page(&self, key: PageKey) -> Result<Bytes, PageSourceError>;
}

impl<T: PageSource + ?Sized> PageSource for Arc<T> {
    fn get_page(&self, key: PageKey) -> Result<Bytes, PageSourceError> {
        (**self).get_page(key)
    }
}

/// Pages held in memory, shared by reference count.
#[derive(Debug, Default)]
pub struct MemoryPageSource {
    pages: RwLock<HashMap<PageKey, Bytes>>,
}

impl MemoryPageSource {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, key: PageKey, bytes: Bytes) {
        self.pages.write().insert(key, bytes);
    }

    /// Add every page of a freshly built index.
    pub fn store(&self, built: &BuiltIndex) {
        let mut pages = self.pages.write();
        for (key, bytes) in &built.pages {
            pages.insert(*key, bytes.clone());
        }
    }

    pub fn remove(&self, key: PageKey) -> Option<Bytes> {
        self.pages.write().remove(&key)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.pages.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pages.read().is_empty()
    }
}

impl PageSource for MemoryPageSource {
    fn get_page(&self, key: PageKey) -> Result<Bytes, PageSourceError> {
        self.pages
            .read()
            .get(&key)
            .cloned()
            .ok_or(PageSourceError::NotFound(key))
    }
}
