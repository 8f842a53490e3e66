//! Bit set over the solids of a model.

/// Marks which solids have been intersected with the current ray.
///
/// Owned by the per-ray state and cleared at the start of every ray.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SolidBits {
    words: Vec<u64>,
    len: usize,
}

impl SolidBits {
    /// All-clear set able to hold `len` solids.
    pub fn new(len: usize) -> Self {
        Self {
            words: vec![0; len.div_ceil(64)],
            len,
        }
    }

    /// Number of solids covered.
    pub fn len(&self) -> usize {
        self.len
    }

    /// True when the set covers no solids.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Mark solid `bit` as shot. Out-of-range bits are ignored.
    #[inline]
    pub fn set(&mut self, bit: usize) {
        if bit < self.len {
            self.words[bit / 64] |= 1 << (bit % 64);
        }
    }

    /// Has solid `bit` been shot?
    #[inline]
    pub fn test(&self, bit: usize) -> bool {
        bit < self.len && self.words[bit / 64] & (1 << (bit % 64)) != 0
    }

    /// Mark every solid as shot.
    pub fn set_all(&mut self) {
        for w in &mut self.words {
            *w = u64::MAX;
        }
    }

    /// Clear all bits and resize to `len` solids.
    pub fn reset(&mut self, len: usize) {
        self.words.clear();
        self.words.resize(len.div_ceil(64), 0);
        self.len = len;
    }

    /// Number of solids marked.
    pub fn count(&self) -> usize {
        let full: usize = self.words.iter().map(|w| w.count_ones() as usize).sum();
        // set_all may have lit bits past `len` in the last word
        let extra = self.words.len() * 64 - self.len;
        match self.words.last() {
            Some(last) if extra > 0 => {
                full - (last >> (64 - extra)).count_ones() as usize
            }
            _ => full,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_and_test() {
        let mut bits = SolidBits::new(130);
        assert!(!bits.test(0));
        bits.set(0);
        bits.set(64);
        bits.set(129);
        assert!(bits.test(0));
        assert!(bits.test(64));
        assert!(bits.test(129));
        assert!(!bits.test(1));
        assert_eq!(bits.count(), 3);
    }

    #[test]
    fn test_out_of_range() {
        let mut bits = SolidBits::new(3);
        bits.set(10);
        assert!(!bits.test(10));
        assert_eq!(bits.count(), 0);
    }

    #[test]
    fn test_set_all_and_reset() {
        let mut bits = SolidBits::new(70);
        bits.set_all();
        assert_eq!(bits.count(), 70);
        assert!(bits.test(69));
        assert!(!bits.test(70));
        bits.reset(5);
        assert_eq!(bits.len(), 5);
        assert_eq!(bits.count(), 0);
    }
}
