//! Domain-specific error types for the diode sync protocol.
//!
//! All fallible operations return `Result<T, DiodeError>`.
//! No panics on invalid input; every error is typed and recoverable.

use std::path::PathBuf;

use thiserror::Error;

/// The canonical error type for the diode sync protocol.
#[derive(Debug, Error)]
pub enum DiodeError {
    // ── Wire errors ──────────────────────────────────────────────
    /// A header blob was not exactly the fixed header length.
    #[error("malformed header: expected {expected} bytes, got {actual}")]
    MalformedHeader { expected: usize, actual: usize },

    /// A datagram was too short to even hold a header.
    #[error("fragment of {0} bytes cannot hold a fragment header")]
    UndersizedFragment(usize),

    // ── Bitset errors ────────────────────────────────────────────
    /// A fragment index fell outside the bitset.
    #[error("bit index {index} out of range for length {len}")]
    IndexOutOfRange { index: u32, len: u32 },

    /// A persisted bitset or archive-state blob failed to decode.
    #[error("corrupt persisted state: {0}")]
    CorruptState(&'static str),

    // ── Configuration errors ─────────────────────────────────────
    /// The configured chunk size leaves no room for a payload.
    #[error("chunk size {0} does not leave room for the fragment header")]
    ChunkSizeTooSmall(usize),

    /// The sync root does not exist or is not a directory.
    #[error("sync folder {0:?} does not exist or is not a directory")]
    InvalidSyncRoot(PathBuf),

    /// `transmit_repeats` was configured as zero.
    #[error("transmit repeats must be at least 1")]
    ZeroTransmitRepeats,

    /// The destination host:port did not resolve to an address.
    #[error("destination did not resolve to a socket address")]
    UnresolvedDestination,

    // ── I/O and persistence ──────────────────────────────────────
    /// The filesystem or socket layer reported an error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Encoding or decoding of a persistent-store value failed.
    #[error("store encoding error: {0}")]
    Store(String),

    /// The `.diodeinclude` allow-list could not be parsed.
    #[error("include list error: {0}")]
    IncludeList(#[from] ignore::Error),
}

impl From<Box<bincode::ErrorKind>> for DiodeError {
    fn from(e: Box<bincode::ErrorKind>) -> Self {
        DiodeError::Store(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_messages() {
        let e = DiodeError::MalformedHeader {
            expected: 48,
            actual: 12,
        };
        assert!(e.to_string().contains("48"));
        assert!(e.to_string().contains("12"));

        let e = DiodeError::IndexOutOfRange { index: 9, len: 4 };
        assert!(e.to_string().contains("9"));
        assert!(e.to_string().contains("4"));
    }

    #[test]
    fn from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe broke");
        let e: DiodeError = io_err.into();
        assert!(matches!(e, DiodeError::Io(_)));
    }
}
