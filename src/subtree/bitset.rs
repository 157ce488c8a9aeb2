//! Fixed-length bitset backed by 64-bit words.

/// Bitset of `len` bits stored in `u64` words.
///
/// Bits past `len` in the last word are always zero, so word-wise
/// comparisons and popcounts never see stray bits.
#[derive(Clone, PartialEq, Eq, Hash, Default)]
pub struct Bitset {
    words: Vec<u64>,
    len: usize,
}

impl Bitset {
    /// All-zero bitset of `len` bits.
    pub fn new(len: usize) -> Self {
        Self {
            words: vec![0; len.div_ceil(64)],
            len,
        }
    }

    /// All-one bitset of `len` bits.
    pub fn full(len: usize) -> Self {
        let mut bits = Self {
            words: vec![u64::MAX; len.div_ceil(64)],
            len,
        };
        bits.clear_tail();
        bits
    }

    /// Bitset with the given indices set.
    ///
    /// # Panics
    ///
    /// Panics if an index is not below `len`.
    pub fn from_indices(len: usize, indices: impl IntoIterator<Item = usize>) -> Self {
        let mut bits = Self::new(len);
        for i in indices {
            bits.set(i, true);
        }
        bits
    }

    /// Unpack `len` bits from bytes packed low-to-high within each byte.
    ///
    /// Returns `None` if `bytes` is too short to hold `len` bits. Bits past
    /// `len` in the final byte are ignored.
    pub fn from_bytes(bytes: &[u8], len: usize) -> Option<Self> {
        if bytes.len() < len.div_ceil(8) {
            return None;
        }
        let mut bits = Self::new(len);
        for (word_idx, word) in bits.words.iter_mut().enumerate() {
            let start = word_idx * 8;
            let end = (start + 8).min(len.div_ceil(8));
            let mut buf = [0u8; 8];
            buf[..end - start].copy_from_slice(&bytes[start..end]);
            *word = u64::from_le_bytes(buf);
        }
        bits.clear_tail();
        Some(bits)
    }

    /// Pack into `ceil(len / 8)` bytes: bit i lands in byte i/8 at position i%8.
    pub fn to_bytes(&self) -> Vec<u8> {
        let byte_len = self.len.div_ceil(8);
        let mut bytes: Vec<u8> = self.words.iter().flat_map(|w| w.to_le_bytes()).collect();
        bytes.truncate(byte_len);
        bytes
    }

    /// Number of bits.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn get(&self, index: usize) -> bool {
        debug_assert!(index < self.len, "bit {} out of range {}", index, self.len);
        (self.words[index / 64] >> (index % 64)) & 1 == 1
    }

    /// # Panics
    ///
    /// Panics if `index` is not below `len()`.
    pub fn set(&mut self, index: usize, value: bool) {
        assert!(index < self.len, "bit {} out of range {}", index, self.len);
        let mask = 1u64 << (index % 64);
        if value {
            self.words[index / 64] |= mask;
        } else {
            self.words[index / 64] &= !mask;
        }
    }

    /// Number of set bits.
    pub fn count_ones(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    /// True if no bit is set.
    pub fn is_clear(&self) -> bool {
        self.words.iter().all(|&w| w == 0)
    }

    /// True if every bit is set.
    pub fn is_full(&self) -> bool {
        self.count_ones() == self.len
    }

    /// Copy of bits `start..end` as a new bitset.
    pub fn slice(&self, start: usize, end: usize) -> Self {
        debug_assert!(start <= end && end <= self.len);
        let mut out = Self::new(end - start);
        for i in self.iter_ones().filter(|&i| i >= start && i < end) {
            out.set(i - start, true);
        }
        out
    }

    /// Copy the set bits of `other` into this bitset at `offset`.
    pub fn copy_from(&mut self, other: &Bitset, offset: usize) {
        debug_assert!(offset + other.len <= self.len);
        for i in other.iter_ones() {
            self.set(offset + i, true);
        }
    }

    /// Indices of set bits in ascending order.
    pub fn iter_ones(&self) -> impl Iterator<Item = usize> + '_ {
        self.words.iter().enumerate().flat_map(|(word_idx, &word)| {
            let mut w = word;
            std::iter::from_fn(move || {
                if w == 0 {
                    return None;
                }
                let bit = w.trailing_zeros() as usize;
                w &= w - 1;
                Some(word_idx * 64 + bit)
            })
        })
    }

    fn clear_tail(&mut self) {
        let rem = self.len % 64;
        if rem != 0 {
            if let Some(last) = self.words.last_mut() {
                *last &= (1u64 << rem) - 1;
            }
        }
    }
}

impl std::fmt::Debug for Bitset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Bitset({}) ", self.len)?;
        f.debug_set().entries(self.iter_ones()).finish()
    }
}
