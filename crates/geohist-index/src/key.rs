//! Storage key for index pages.
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │  PageKey (12 bytes)                          │
//! ├──────────────────────────────────────────────┤
//! │  index_id: u32   (4 bytes)  which index      │
//! │  page:     u64   (8 bytes)  key / page_size  │
//! └──────────────────────────────────────────────┘
//! ```

use std::fmt;

use bytemuck::{Pod, Zeroable};

// Keys are written as raw memory, which is only portable on little-endian.
const _: () = {
    #[cfg(not(target_endian = "little"))]
    compile_error!("geohist-index only supports little-endian architectures");
};

/// `Ord` compares `(index_id, page)` numerically. The little-endian byte
/// form does not sort the same way; it only guarantees that every page of
/// an index starts with [`PageKey::index_prefix`].
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Pod, Zeroable)]
#[repr(C, packed)]
pub struct PageKey {
    index_id: u32,
    page: u64,
}

impl PageKey {
    #[inline]
    #[must_use]
    pub const fn new(index_id: u32, page: u64) -> Self {
        Self { index_id, page }
    }

    #[inline]
    #[must_use]
    pub const fn index_id(&self) -> u32 {
        self.index_id
    }

    #[inline]
    #[must_use]
    pub const fn page(&self) -> u64 {
        self.page
    }

    #[inline]
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::bytes_of(self)
    }

    #[inline]
    #[must_use]
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() != std::mem::size_of::<Self>() {
            return None;
        }
        Some(*bytemuck::from_bytes(bytes))
    }

    /// Prefix shared by every page of one index.
    #[inline]
    #[must_use]
    pub fn index_prefix(index_id: u32) -> [u8; 4] {
        index_id.to_le_bytes()
    }
}

impl fmt::Debug for PageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.index_id(), self.page())
    }
}

impl fmt::Display for PageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}
