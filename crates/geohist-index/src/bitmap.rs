//! Page occupancy bitmap with constant-time rank.

/// One bit per slot, least significant bit first within each byte.
///
/// A cumulative popcount per 64-bit word makes `rank` a table lookup plus
/// one masked popcount.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Bitmap {
    bytes: Box<[u8]>,
    ranks: Box<[u32]>,
    len: u32,
}

impl Bitmap {
    /// Bytes needed for `len` bits.
    #[must_use]
    pub const fn byte_len(len: u32) -> usize {
        (len as usize).div_ceil(8)
    }

    /// An all-clear bitmap of `len` bits.
    #[must_use]
    pub fn new(len: u32) -> Self {
        Self::from_bytes_unchecked(vec![0; Self::byte_len(len)].into_boxed_slice(), len)
    }

    /// Set bits at the given positions. Positions must be `< len`.
    #[must_use]
    pub fn from_positions(len: u32, positions: impl IntoIterator<Item = u32>) -> Self {
        let mut bytes = vec![0u8; Self::byte_len(len)];
        for pos in positions {
            bytes[(pos / 8) as usize] |= 1 << (pos % 8);
        }
        Self::from_bytes_unchecked(bytes.into_boxed_slice(), len)
    }

    /// `None` if the byte count is wrong or padding bits are set.
    #[must_use]
    pub fn from_bytes(bytes: &[u8], len: u32) -> Option<Self> {
        if bytes.len() != Self::byte_len(len) {
            return None;
        }
        let tail = len % 8;
        if tail != 0 && bytes[bytes.len() - 1] >> tail != 0 {
            return None;
        }
        Some(Self::from_bytes_unchecked(bytes.into(), len))
    }

    fn from_bytes_unchecked(bytes: Box<[u8]>, len: u32) -> Self {
        let mut ranks = Vec::with_capacity(bytes.len().div_ceil(8));
        let mut total = 0u32;
        for chunk in bytes.chunks(8) {
            ranks.push(total);
            total += word(chunk).count_ones();
        }
        Self {
            bytes,
            ranks: ranks.into_boxed_slice(),
            len,
        }
    }

    #[must_use]
    pub const fn len(&self) -> u32 {
        self.len
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    #[must_use]
    pub fn get(&self, pos: u32) -> bool {
        pos < self.len && self.bytes[(pos / 8) as usize] & (1 << (pos % 8)) != 0
    }

    /// Number of set bits strictly before `pos`.
    #[must_use]
    pub fn rank(&self, pos: u32) -> u32 {
        let pos = pos.min(self.len) as usize;
        let word_index = pos / 64;
        let Some(&before) = self.ranks.get(word_index) else {
            return self.count_ones();
        };
        let start = word_index * 8;
        let end = (start + 8).min(self.bytes.len());
        let mask = (1u64 << (pos % 64)) - 1;
        before + (word(&self.bytes[start..end]) & mask).count_ones()
    }

    #[must_use]
    pub fn count_ones(&self) -> u32 {
        self.bytes.iter().map(|b| b.count_ones()).sum()
    }

    /// Positions of set bits in ascending order.
    pub fn ones(&self) -> impl Iterator<Item = u32> + '_ {
        self.bytes.iter().enumerate().flat_map(|(i, &byte)| {
            (0..8u32)
                .filter(move |bit| byte & (1 << bit) != 0)
                .map(move |bit| i as u32 * 8 + bit)
        })
    }
}

/// Load up to eight bytes as a little-endian word, zero padded.
fn word(chunk: &[u8]) -> u64 {
    let mut buf = [0u8; 8];
    buf[..chunk.len()].copy_from_slice(chunk);
    u64::from_le_bytes(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rank_matches_naive_count() {
        let positions = [0, 3, 7, 63, 64, 65, 127, 128, 199];
        let bitmap = Bitmap::from_positions(200, positions);
        for pos in 0..=200 {
            let naive = positions.iter().filter(|&&p| p < pos).count() as u32;
            assert_eq!(bitmap.rank(pos), naive, "rank({pos})");
        }
        assert_eq!(bitmap.count_ones(), positions.len() as u32);
        assert_eq!(bitmap.ones().collect::<Vec<_>>(), positions);
    }

    #[test]
    fn test_lsb_first_layout() {
        let bitmap = Bitmap::from_positions(10, [0, 9]);
        assert_eq!(bitmap.as_bytes(), &[0b0000_0001, 0b0000_0010]);
        assert!(bitmap.get(9));
        assert!(!bitmap.get(10));
    }

    #[test]
    fn test_padding_bits_are_rejected() {
        assert!(Bitmap::from_bytes(&[0xff, 0b0000_0011], 10).is_some());
        assert!(Bitmap::from_bytes(&[0xff, 0b0000_0100], 10).is_none());
        assert!(Bitmap::from_bytes(&[0xff], 10).is_none());
    }
}
