//! Dense set of fragment indices with an O(1) cardinality counter.
//!
//! Bit `i` lives at byte `i / 8`, bit position `i % 8`, LSB-first
//! within a byte. The set serializes as `len(u32 BE) ‖ count(u32 BE) ‖
//! raw bytes` so the receiver can persist reassembly progress as a
//! compact blob.

use crate::error::DiodeError;

/// Fixed-length bit array tracking which fragment indices have been
/// durably written.
#[derive(Clone, PartialEq, Eq)]
pub struct Bitset {
    /// Number of addressable bits.
    len: u32,
    /// Number of bits currently set.
    count: u32,
    /// Backing storage, `ceil(len / 8)` bytes.
    bits: Vec<u8>,
}

impl Bitset {
    /// Create an empty bitset addressing `len` bits.
    pub fn new(len: u32) -> Self {
        Self {
            len,
            count: 0,
            bits: vec![0u8; len.div_ceil(8) as usize],
        }
    }

    /// Number of addressable bits.
    pub fn len(&self) -> u32 {
        self.len
    }

    /// True when the set addresses zero bits.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of bits currently set. O(1).
    pub fn cardinality(&self) -> u32 {
        self.count
    }

    /// True when every addressable bit is set.
    pub fn is_full(&self) -> bool {
        self.count == self.len
    }

    /// Read bit `index`.
    pub fn get(&self, index: u32) -> Result<bool, DiodeError> {
        self.check_range(index)?;
        Ok(self.bits[(index / 8) as usize] & (1 << (index % 8)) != 0)
    }

    /// Write bit `index`. Setting a bit to its current value leaves
    /// the cardinality untouched.
    pub fn set(&mut self, index: u32, value: bool) -> Result<(), DiodeError> {
        let current = self.get(index)?;
        if value {
            self.bits[(index / 8) as usize] |= 1 << (index % 8);
        } else {
            self.bits[(index / 8) as usize] &= !(1 << (index % 8));
        }
        match (current, value) {
            (false, true) => self.count += 1,
            (true, false) => self.count -= 1,
            _ => {}
        }
        Ok(())
    }

    fn check_range(&self, index: u32) -> Result<(), DiodeError> {
        if index >= self.len {
            return Err(DiodeError::IndexOutOfRange {
                index,
                len: self.len,
            });
        }
        Ok(())
    }

    // ── Serialization ────────────────────────────────────────────

    /// Serialize as `len ‖ count ‖ raw bytes`.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(8 + self.bits.len());
        buf.extend_from_slice(&self.len.to_be_bytes());
        buf.extend_from_slice(&self.count.to_be_bytes());
        buf.extend_from_slice(&self.bits);
        buf
    }

    /// Deserialize a blob produced by [`Bitset::to_bytes`].
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, DiodeError> {
        if bytes.len() < 8 {
            return Err(DiodeError::CorruptState("bitset blob shorter than its prefix"));
        }
        let len = u32::from_be_bytes(
            bytes[0..4]
                .try_into()
                .map_err(|_| DiodeError::CorruptState("bitset length prefix"))?,
        );
        let count = u32::from_be_bytes(
            bytes[4..8]
                .try_into()
                .map_err(|_| DiodeError::CorruptState("bitset count prefix"))?,
        );
        let bits = &bytes[8..];
        if bits.len() != len.div_ceil(8) as usize {
            return Err(DiodeError::CorruptState(
                "bitset byte count disagrees with its declared length",
            ));
        }
        if count > len {
            return Err(DiodeError::CorruptState(
                "bitset cardinality exceeds its declared length",
            ));
        }
        Ok(Self {
            len,
            count,
            bits: bits.to_vec(),
        })
    }
}

impl std::fmt::Debug for Bitset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bitset")
            .field("len", &self.len)
            .field("count", &self.count)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_is_empty() {
        let bits = Bitset::new(100);
        assert_eq!(bits.len(), 100);
        assert_eq!(bits.cardinality(), 0);
        assert!(!bits.get(0).unwrap());
        assert!(!bits.get(99).unwrap());
    }

    #[test]
    fn set_and_get() {
        let mut bits = Bitset::new(16);
        bits.set(3, true).unwrap();
        bits.set(8, true).unwrap();
        assert!(bits.get(3).unwrap());
        assert!(bits.get(8).unwrap());
        assert!(!bits.get(4).unwrap());
        assert_eq!(bits.cardinality(), 2);
    }

    #[test]
    fn redundant_set_keeps_cardinality() {
        let mut bits = Bitset::new(8);
        bits.set(1, true).unwrap();
        bits.set(1, true).unwrap();
        assert_eq!(bits.cardinality(), 1);
        bits.set(1, false).unwrap();
        bits.set(1, false).unwrap();
        assert_eq!(bits.cardinality(), 0);
    }

    #[test]
    fn interleaved_sets_track_cardinality() {
        let mut bits = Bitset::new(64);
        for i in 0..64 {
            bits.set(i, true).unwrap();
        }
        assert!(bits.is_full());
        for i in (0..64).step_by(2) {
            bits.set(i, false).unwrap();
        }
        assert_eq!(bits.cardinality(), 32);
    }

    #[test]
    fn out_of_range_rejected() {
        let mut bits = Bitset::new(10);
        assert!(matches!(
            bits.get(10),
            Err(DiodeError::IndexOutOfRange { index: 10, len: 10 })
        ));
        assert!(bits.set(200, true).is_err());
    }

    #[test]
    fn serialization_roundtrip() {
        let mut bits = Bitset::new(21);
        bits.set(0, true).unwrap();
        bits.set(7, true).unwrap();
        bits.set(20, true).unwrap();
        let blob = bits.to_bytes();
        assert_eq!(blob.len(), 8 + 3);
        let restored = Bitset::from_bytes(&blob).unwrap();
        assert_eq!(restored, bits);
        assert_eq!(restored.cardinality(), 3);
    }

    #[test]
    fn corrupt_blob_rejected() {
        assert!(Bitset::from_bytes(&[0u8; 5]).is_err());
        // Declares 32 bits but carries only 1 byte of storage.
        let mut blob = Vec::new();
        blob.extend_from_slice(&32u32.to_be_bytes());
        blob.extend_from_slice(&0u32.to_be_bytes());
        blob.push(0);
        assert!(Bitset::from_bytes(&blob).is_err());
    }
}
