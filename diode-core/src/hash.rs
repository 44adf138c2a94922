//! Streaming SHA-1 of a file on disk.
//!
//! The archive hash doubles as the on-wire archive identifier, so
//! both sides must agree on it byte for byte.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use sha1::{Digest, Sha1};

use crate::error::DiodeError;

/// Length of a SHA-1 digest in bytes.
pub const HASH_SIZE: usize = 20;

/// A 20-byte archive digest.
pub type ArchiveHash = [u8; HASH_SIZE];

const READ_BUF_SIZE: usize = 8 * 1024;

/// Hash a file of arbitrary size without loading it fully.
pub fn hash_file(path: &Path) -> Result<ArchiveHash, DiodeError> {
    let mut file = File::open(path)?;
    let mut hasher = Sha1::new();
    let mut buf = [0u8; READ_BUF_SIZE];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hasher.finalize().into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn empty_file_digest() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let digest = hash_file(file.path()).unwrap();
        // SHA-1 of zero bytes.
        assert_eq!(
            hex::encode(digest),
            "da39a3ee5e6b4b0d3255bfef95601890afd80709"
        );
    }

    #[test]
    fn matches_one_shot_digest() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        let data: Vec<u8> = (0..100_000u32).map(|i| (i % 251) as u8).collect();
        file.write_all(&data).unwrap();

        let expected: ArchiveHash = Sha1::digest(&data).into();
        assert_eq!(hash_file(file.path()).unwrap(), expected);
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = hash_file(Path::new("/no/such/file")).unwrap_err();
        assert!(matches!(err, DiodeError::Io(_)));
    }
}
