//! Bulk index construction.

use bytes::Bytes;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{ABSENT, IndexConfig, IndexError, IndexPage, IndexResult, PageEncoding, PageKey};

/// Everything a reader needs besides the pages themselves.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexMeta {
    pub index_id: u32,
    pub page_size: u32,
    /// Numbers of the pages that hold at least one entry, ascending.
    pub pages: Vec<u64>,
    pub entries: u64,
}

impl IndexMeta {
    /// Page number and slot of `key`.
    #[inline]
    #[must_use]
    pub const fn locate(&self, key: u64) -> (u64, u32) {
        let page_size = self.page_size as u64;
        (key / page_size, (key % page_size) as u32)
    }

    #[must_use]
    pub fn has_page(&self, page: u64) -> bool {
        self.pages.binary_search(&page).is_ok()
    }

    #[must_use]
    pub const fn page_key(&self, page: u64) -> PageKey {
        PageKey::new(self.index_id, page)
    }
}

/// Output of [`IndexBuilder::build`]: the metadata and every encoded page.
#[derive(Clone, Debug)]
pub struct BuiltIndex {
    pub meta: IndexMeta,
    pub pages: Vec<(PageKey, Bytes)>,
}

/// Collects ascending `(key, value)` pairs and encodes them into pages.
///
/// Each page is built by exactly one task; pages are independent, so the
/// build fans out across the rayon pool.
pub struct IndexBuilder {
    index_id: u32,
    config: IndexConfig,
    entries: Vec<(u64, i64)>,
}

impl IndexBuilder {
    #[must_use]
    pub fn new(index_id: u32, config: IndexConfig) -> Self {
        Self {
            index_id,
            config,
            entries: Vec::new(),
        }
    }

    /// Append one entry. Keys must strictly increase.
    pub fn push(&mut self, key: u64, value: i64) -> IndexResult<()> {
        if let Some(&(previous, _)) = self.entries.last() {
            if key <= previous {
                return Err(IndexError::UnsortedKey { previous, key });
            }
        }
        if value == ABSENT {
            return Err(IndexError::ReservedValue { key });
        }
        self.entries.push((key, value));
        Ok(())
    }

    pub fn extend(&mut self, entries: impl IntoIterator<Item = (u64, i64)>) -> IndexResult<()> {
        entries
            .into_iter()
            .try_for_each(|(key, value)| self.push(key, value))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn build(self) -> IndexResult<BuiltIndex> {
        self.config.validate()?;
        let page_size = u64::from(self.config.page_size);
        let policy = self.config.encoding;

        let groups: Vec<&[(u64, i64)]> = self
            .entries
            .chunk_by(|a, b| a.0 / page_size == b.0 / page_size)
            .collect();

        let pages = groups
            .par_iter()
            .map(|group| {
                let page = group[0].0 / page_size;
                let slots: Vec<(u32, i64)> = group
                    .iter()
                    .map(|&(key, value)| ((key % page_size) as u32, value))
                    .collect();
                let built = IndexPage::build(self.config.page_size, &slots, policy)?;
                Ok((page, built.encoding(), built.to_bytes()))
            })
            .collect::<IndexResult<Vec<_>>>()?;

        let dense = pages
            .iter()
            .filter(|(_, encoding, _)| *encoding == PageEncoding::Dense)
            .count();
        let bytes: usize = pages.iter().map(|(_, _, bytes)| bytes.len()).sum();
        info!(
            index = self.index_id,
            entries = self.entries.len(),
            pages = pages.len(),
            dense,
            sparse = pages.len() - dense,
            bytes,
            "built paged index"
        );

        let meta = IndexMeta {
            index_id: self.index_id,
            page_size: self.config.page_size,
            pages: pages.iter().map(|(page, _, _)| *page).collect(),
            entries: self.entries.len() as u64,
        };
        let pages = pages
            .into_iter()
            .map(|(page, encoding, bytes)| {
                debug!(page, %encoding, len = bytes.len(), "encoded index page");
                (meta.page_key(page), bytes)
            })
            .collect();
        Ok(BuiltIndex { meta, pages })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(page_size: u32) -> IndexConfig {
        IndexConfig {
            page_size,
            ..IndexConfig::default()
        }
    }

    #[test]
    fn test_push_order_and_reserved_value() {
        let mut builder = IndexBuilder::new(1, config(8));
        builder.push(5, 1).unwrap();
        assert_eq!(
            builder.push(5, 2),
            Err(IndexError::UnsortedKey {
                previous: 5,
                key: 5
            })
        );
        assert_eq!(builder.push(9, ABSENT), Err(IndexError::ReservedValue { key: 9 }));
        assert_eq!(builder.len(), 1);
    }

    #[test]
    fn test_pages_are_grouped_by_key() {
        let mut builder = IndexBuilder::new(3, config(8));
        builder
            .extend([(1, 10), (2, 20), (17, 170), (1_000, 7)])
            .unwrap();
        let built = builder.build().unwrap();
        assert_eq!(built.meta.pages, vec![0, 2, 125]);
        assert_eq!(built.meta.entries, 4);
        let keys: Vec<_> = built.pages.iter().map(|(key, _)| *key).collect();
        assert_eq!(
            keys,
            vec![PageKey::new(3, 0), PageKey::new(3, 2), PageKey::new(3, 125)]
        );
        assert_eq!(built.meta.locate(1_000), (125, 0));
    }

    #[test]
    fn test_empty_build() {
        let built = IndexBuilder::new(0, IndexConfig::default()).build().unwrap();
        assert!(built.pages.is_empty());
        assert!(built.meta.pages.is_empty());
    }

    #[test]
    fn test_invalid_config_fails_build() {
        assert!(matches!(
            IndexBuilder::new(0, config(0)).build(),
            Err(IndexError::Config(_))
        ));
    }

    #[test]
    fn test_meta_serializes() {
        let mut builder = IndexBuilder::new(2, config(16));
        builder.push(40, 4).unwrap();
        let meta = builder.build().unwrap().meta;
        let json = serde_json::to_string(&meta).unwrap();
        assert_eq!(serde_json::from_str::<IndexMeta>(&json).unwrap(), meta);
    }
}
