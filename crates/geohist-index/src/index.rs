//! Lazy, caching index reader.

use std::sync::Arc;

use hashbrown::HashMap;
use parking_lot::RwLock;
use tracing::{debug, trace};

use crate::{ABSENT, IndexConfig, IndexError, IndexMeta, IndexPage, IndexResult, PageSource};

/// Reads an index page by page from a [`PageSource`].
///
/// Decoded pages are shared as `Arc<IndexPage>` and kept in a bounded
/// cache. Lookups for pages the metadata does not list never reach the
/// source.
pub struct PagedLongIndex<S> {
    meta: IndexMeta,
    source: S,
    cache: RwLock<HashMap<u64, Arc<IndexPage>>>,
    cache_pages: usize,
}

impl<S: PageSource> PagedLongIndex<S> {
    /// `cache_pages == 0` keeps every loaded page.
    pub fn open(meta: IndexMeta, source: S, cache_pages: usize) -> IndexResult<Self> {
        if meta.page_size == 0 || meta.page_size > IndexConfig::MAX_PAGE_SIZE {
            return Err(IndexError::Config("page_size must be in 1..=2^24"));
        }
        Ok(Self {
            meta,
            source,
            cache: RwLock::new(HashMap::new()),
            cache_pages,
        })
    }

    pub const fn meta(&self) -> &IndexMeta {
        &self.meta
    }

    pub fn cached_pages(&self) -> usize {
        self.cache.read().len()
    }

    /// Value stored for `key`, or [`ABSENT`].
    pub fn get(&self, key: u64) -> IndexResult<i64> {
        let (page, slot) = self.meta.locate(key);
        match self.page(page)? {
            Some(decoded) => decoded
                .get(slot)
                .map_err(|source| IndexError::PageDecode { page, source }),
            None => Ok(ABSENT),
        }
    }

    /// Decoded page `page`, `None` if the index has no entries there.
    pub fn page(&self, page: u64) -> IndexResult<Option<Arc<IndexPage>>> {
        if !self.meta.has_page(page) {
            return Ok(None);
        }
        if let Some(cached) = self.cache.read().get(&page) {
            return Ok(Some(Arc::clone(cached)));
        }

        let key = self.meta.page_key(page);
        let bytes = self.source.get_page(key)?;
        let decoded = Arc::new(IndexPage::from_bytes(page, self.meta.page_size, &bytes)?);
        debug!(%key, encoding = %decoded.encoding(), len = bytes.len(), "loaded index page");

        let mut cache = self.cache.write();
        if self.cache_pages > 0 && cache.len() >= self.cache_pages && !cache.contains_key(&page) {
            if let Some(evicted) = cache.keys().next().copied() {
                trace!(page = evicted, "evicting index page");
                cache.remove(&evicted);
            }
        }
        Ok(Some(Arc::clone(cache.entry(page).or_insert(decoded))))
    }

    /// Every `(key, value)` entry in ascending key order. A page that fails
    /// to load yields one error and the walk moves on to the next page.
    pub fn iter(&self) -> impl Iterator<Item = IndexResult<(u64, i64)>> + '_ {
        let page_size = u64::from(self.meta.page_size);
        self.meta.pages.iter().flat_map(move |&page| {
            let items: Vec<IndexResult<(u64, i64)>> = match self.page(page) {
                Ok(Some(decoded)) => match decoded.entries() {
                    Ok(entries) => entries
                        .into_iter()
                        .map(|(slot, value)| Ok((page * page_size + u64::from(slot), value)))
                        .collect(),
                    Err(source) => vec![Err(IndexError::PageDecode { page, source })],
                },
                Ok(None) => Vec::new(),
                Err(err) => vec![Err(err)],
            };
            items
        })
    }
}
