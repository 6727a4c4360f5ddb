//! Index and grid configuration.

use serde::{Deserialize, Serialize};

use crate::{IndexError, IndexResult};

/// How a page chooses between its dense and sparse layout.
///
/// Sparse is only ever chosen when its bytes are strictly fewer than the
/// dense layout's, so a page's layout can be told from its length alone.
#[derive(Clone, Copy, Debug, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PageEncodingPolicy {
    /// Whichever layout is smaller.
    #[default]
    Smallest,
    /// Dense once more than this fraction of slots is occupied.
    DenseAbove(f64),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    /// Slots per page.
    pub page_size: u32,
    pub encoding: PageEncodingPolicy,
    /// Decoded pages a reader keeps in memory. `0` disables eviction.
    pub cache_pages: usize,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            page_size: 4096,
            encoding: PageEncodingPolicy::Smallest,
            cache_pages: 1024,
        }
    }
}

impl IndexConfig {
    pub const MAX_PAGE_SIZE: u32 = 1 << 24;

    pub fn validate(&self) -> IndexResult<()> {
        if self.page_size == 0 || self.page_size > Self::MAX_PAGE_SIZE {
            return Err(IndexError::Config("page_size must be in 1..=2^24"));
        }
        if let PageEncodingPolicy::DenseAbove(fraction) = self.encoding {
            if !(0.0..=1.0).contains(&fraction) {
                return Err(IndexError::Config("dense occupancy must be within 0..=1"));
            }
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridConfig {
    /// Deepest zoom level entities are assigned to.
    pub max_zoom: u8,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self { max_zoom: 14 }
    }
}
