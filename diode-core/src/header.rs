//! Fragment header: 48 bytes, big-endian, fixed layout.
//!
//! ```text
//! Offset  Size   Field
//! ──────  ─────  ──────────────
//!   0      20    hash      SHA-1 of the complete archive
//!  20       8    offset    byte offset of the payload within the archive
//!  28       4    index     zero-based fragment ordinal
//!  32       4    total     fragment count for the archive
//!  36      12    reserved  zero on encode, ignored on decode
//! ──────  ─────  ──────────────
//! Total:  48 bytes
//! ```
//!
//! The format carries no magic and no version field; it is frozen.

use crate::error::DiodeError;
use crate::hash::ArchiveHash;

/// Fixed size of the on-wire fragment header.
pub const HEADER_SIZE: usize = 48;

/// Type alias for the exact byte array that can hold one header.
pub type HeaderBytes = [u8; HEADER_SIZE];

/// Per-fragment header advertising which archive the payload belongs
/// to and where it lands inside it.
///
/// All multi-byte fields are stored **big-endian** on the wire.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct FragmentHeader {
    /// SHA-1 digest of the complete archive. Identifies the archive
    /// on the wire; stable across every fragment and every copy.
    hash: ArchiveHash,
    /// Byte offset of this fragment's payload within the archive.
    offset: u64,
    /// Zero-based fragment ordinal; equals `offset / payload_capacity`.
    index: u32,
    /// Total fragment count for the archive.
    total: u32,
}

impl FragmentHeader {
    /// Create a new header with the given fields.
    pub fn new(hash: ArchiveHash, offset: u64, index: u32, total: u32) -> Self {
        Self {
            hash,
            offset,
            index,
            total,
        }
    }

    // ── Accessors ────────────────────────────────────────────────

    /// The 20-byte archive hash this fragment belongs to.
    pub fn hash(&self) -> ArchiveHash {
        self.hash
    }

    /// Byte offset of the payload within the archive.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Zero-based fragment ordinal.
    pub fn index(&self) -> u32 {
        self.index
    }

    /// Total fragment count for the archive.
    pub fn total(&self) -> u32 {
        self.total
    }

    // ── Serialization ────────────────────────────────────────────

    /// Serialize the header to exactly [`HEADER_SIZE`] bytes (big-endian).
    pub fn to_bytes(&self) -> HeaderBytes {
        let mut buf = [0u8; HEADER_SIZE];
        buf[0..20].copy_from_slice(&self.hash);
        buf[20..28].copy_from_slice(&self.offset.to_be_bytes());
        buf[28..32].copy_from_slice(&self.index.to_be_bytes());
        buf[32..36].copy_from_slice(&self.total.to_be_bytes());
        buf
    }

    /// Deserialize a header from exactly [`HEADER_SIZE`] bytes.
    ///
    /// Fails with [`DiodeError::MalformedHeader`] on any other length.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, DiodeError> {
        if bytes.len() != HEADER_SIZE {
            return Err(DiodeError::MalformedHeader {
                expected: HEADER_SIZE,
                actual: bytes.len(),
            });
        }

        let mut hash = [0u8; 20];
        hash.copy_from_slice(&bytes[0..20]);

        let offset = u64::from_be_bytes(
            bytes[20..28]
                .try_into()
                .map_err(|_| DiodeError::MalformedHeader {
                    expected: HEADER_SIZE,
                    actual: bytes.len(),
                })?,
        );

        let index = u32::from_be_bytes(
            bytes[28..32]
                .try_into()
                .map_err(|_| DiodeError::MalformedHeader {
                    expected: HEADER_SIZE,
                    actual: bytes.len(),
                })?,
        );

        let total = u32::from_be_bytes(
            bytes[32..36]
                .try_into()
                .map_err(|_| DiodeError::MalformedHeader {
                    expected: HEADER_SIZE,
                    actual: bytes.len(),
                })?,
        );

        Ok(Self {
            hash,
            offset,
            index,
            total,
        })
    }
}

impl std::fmt::Debug for FragmentHeader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FragmentHeader")
            .field("hash", &hex::encode(self.hash))
            .field("offset", &self.offset)
            .field("index", &self.index)
            .field("total", &self.total)
            .finish()
    }
}
