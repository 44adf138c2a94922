//! Fragment producer for a single file.
//!
//! A [`FileChunker`] hashes its file eagerly at construction: the
//! digest appears in every fragment's header and must stay stable
//! across all replication copies. Fragments themselves are produced
//! lazily by [`FileChunker::fragments`], which opens the file fresh
//! each time so one chunker can feed several transmit copies.

use std::fs::{self, File};
use std::io::{BufReader, Read};
use std::path::PathBuf;

use crate::error::DiodeError;
use crate::hash::{ArchiveHash, hash_file};
use crate::header::{FragmentHeader, HEADER_SIZE};

/// Splits one file into wire-ready fragments of at most `chunk_size`
/// bytes (header included).
pub struct FileChunker {
    path: PathBuf,
    payload_capacity: usize,
    total: u32,
    hash: ArchiveHash,
}

impl FileChunker {
    /// Create a chunker over `path`.
    ///
    /// `chunk_size` is the full datagram budget including the header;
    /// it must exceed [`HEADER_SIZE`]. Hashing the file happens here,
    /// before any fragment is produced.
    pub fn new(path: impl Into<PathBuf>, chunk_size: usize) -> Result<Self, DiodeError> {
        if chunk_size <= HEADER_SIZE {
            return Err(DiodeError::ChunkSizeTooSmall(chunk_size));
        }
        let path = path.into();
        let payload_capacity = chunk_size - HEADER_SIZE;
        let size = fs::metadata(&path)?.len();
        let total = size.div_ceil(payload_capacity as u64) as u32;
        let hash = hash_file(&path)?;
        Ok(Self {
            path,
            payload_capacity,
            total,
            hash,
        })
    }

    /// The archive hash advertised by every fragment.
    pub fn hash(&self) -> ArchiveHash {
        self.hash
    }

    /// Total number of fragments this file splits into.
    pub fn total(&self) -> u32 {
        self.total
    }

    /// Archive bytes carried per fragment.
    pub fn payload_capacity(&self) -> usize {
        self.payload_capacity
    }

    /// Open the file and return a fresh fragment sequence.
    ///
    /// The sequence is restartable: call once per transmit copy. The
    /// read handle is held by the iterator and released when it drops.
    pub fn fragments(&self) -> Result<Fragments<'_>, DiodeError> {
        let file = File::open(&self.path)?;
        Ok(Fragments {
            chunker: self,
            file: BufReader::with_capacity(self.payload_capacity, file),
            offset: 0,
        })
    }
}

/// One enumeration of a file's fragments, front to back.
pub struct Fragments<'a> {
    chunker: &'a FileChunker,
    file: BufReader<File>,
    offset: u64,
}

impl Fragments<'_> {
    /// Read up to one payload worth of bytes, tolerating short reads.
    fn fill_payload(&mut self, payload: &mut Vec<u8>) -> Result<usize, DiodeError> {
        let mut filled = 0;
        while filled < payload.len() {
            let n = self.file.read(&mut payload[filled..])?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        Ok(filled)
    }
}

impl Iterator for Fragments<'_> {
    type Item = Result<Vec<u8>, DiodeError>;

    fn next(&mut self) -> Option<Self::Item> {
        let mut payload = vec![0u8; self.chunker.payload_capacity];
        let filled = match self.fill_payload(&mut payload) {
            Ok(0) => return None,
            Ok(n) => n,
            Err(e) => return Some(Err(e)),
        };
        payload.truncate(filled);

        let header = FragmentHeader::new(
            self.chunker.hash,
            self.offset,
            (self.offset / self.chunker.payload_capacity as u64) as u32,
            self.chunker.total,
        );

        let mut frame = Vec::with_capacity(HEADER_SIZE + filled);
        frame.extend_from_slice(&header.to_bytes());
        frame.extend_from_slice(&payload);
        self.offset += filled as u64;
        Some(Ok(frame))
    }
}
