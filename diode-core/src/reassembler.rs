//! Minimal fragment-to-file writer.
//!
//! [`FileReassembler`] is deliberately naive: it writes whatever
//! payload it is handed at the offset the header declares, with no
//! dedup and no progress tracking. The folder receiver layers a
//! durable bitset on top; this primitive exists so a small in-memory
//! reassembly works without the persistence machinery.

use std::fs::OpenOptions;
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::error::DiodeError;
use crate::hash::{ArchiveHash, hash_file};
use crate::header::{FragmentHeader, HEADER_SIZE};

/// Reassembles chunked files, resolving destinations through a
/// caller-supplied hash-to-path mapping.
pub struct FileReassembler<F>
where
    F: Fn(&ArchiveHash) -> PathBuf,
{
    resolve: F,
}

impl<F> FileReassembler<F>
where
    F: Fn(&ArchiveHash) -> PathBuf,
{
    /// Create a reassembler. `resolve` maps an archive hash to the
    /// file that fragment payloads for it should land in; parent
    /// directories must already exist.
    pub fn new(resolve: F) -> Self {
        Self { resolve }
    }

    /// Write one fragment's payload at its declared offset.
    ///
    /// With `check_complete`, the destination is rehashed afterwards
    /// and the result says whether it now matches the header's
    /// archive hash. Without it the call always returns `false`.
    pub fn accept_fragment(
        &self,
        fragment: &[u8],
        check_complete: bool,
    ) -> Result<bool, DiodeError> {
        if fragment.len() < HEADER_SIZE {
            return Err(DiodeError::UndersizedFragment(fragment.len()));
        }
        let header = FragmentHeader::from_bytes(&fragment[..HEADER_SIZE])?;
        let payload = &fragment[HEADER_SIZE..];

        let path = (self.resolve)(&header.hash());
        write_at(&path, header.offset(), payload)?;

        if check_complete {
            Ok(hash_file(&path)? == header.hash())
        } else {
            Ok(false)
        }
    }
}

/// Positioned write: open (creating if needed), seek, write, close.
///
/// The handle lives only for this one write so a crash between
/// fragments never loses bytes already on disk.
pub fn write_at(path: &Path, offset: u64, payload: &[u8]) -> Result<(), DiodeError> {
    let mut file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .open(path)?;
    file.seek(SeekFrom::Start(offset))?;
    file.write_all(payload)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunker::FileChunker;

    #[test]
    fn undersized_fragment_rejected() {
        let reassembler = FileReassembler::new(|_| PathBuf::from("unused"));
        let err = reassembler
            .accept_fragment(&[0u8; HEADER_SIZE - 1], false)
            .unwrap_err();
        assert!(matches!(err, DiodeError::UndersizedFragment(_)));
    }

    #[test]
    fn out_of_order_fragments_rebuild_the_file() {
        let mut source = tempfile::NamedTempFile::new().unwrap();
        let data: Vec<u8> = (0..20_000u32).map(|i| (i % 253) as u8).collect();
        source.write_all(&data).unwrap();

        let chunker = FileChunker::new(source.path(), 1400).unwrap();
        let mut frames: Vec<Vec<u8>> = chunker
            .fragments()
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        frames.reverse();

        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("rebuilt");
        let reassembler = FileReassembler::new(|_| dest.clone());

        let mut completions = 0;
        for frame in &frames {
            if reassembler.accept_fragment(frame, true).unwrap() {
                completions += 1;
            }
        }
        // Only the fragment that finished the file reports completion:
        // with reversed order that is the one carrying offset 0.
        assert_eq!(completions, 1);
        assert_eq!(std::fs::read(&dest).unwrap(), data);
    }

    #[test]
    fn check_complete_false_never_reports() {
        let mut source = tempfile::NamedTempFile::new().unwrap();
        source.write_all(b"tiny").unwrap();
        let chunker = FileChunker::new(source.path(), 1400).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("rebuilt");
        let reassembler = FileReassembler::new(|_| dest.clone());

        for frame in chunker.fragments().unwrap() {
            assert!(!reassembler.accept_fragment(&frame.unwrap(), false).unwrap());
        }
        assert_eq!(std::fs::read(&dest).unwrap(), b"tiny");
    }
}
