//! Change detection over source-tree metadata.
//!
//! Each regular file reduces to a (relative path, size, mtime)
//! triple. The sender diffs the current scan against the persisted
//! "already sent" set; any rename, resize, or touch produces a new
//! triple and therefore a retransmission. There is no rename
//! detection, so a renamed file costs one full resend.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use ignore::gitignore::{Gitignore, GitignoreBuilder};
use walkdir::{DirEntry, WalkDir};

use crate::error::DiodeError;

/// Allow-list file name at the sync root. Gitignore syntax, inverted
/// meaning: files it matches are the only ones sent.
pub const INCLUDE_FILE: &str = ".diodeinclude";

/// Identity of one source file as far as change detection cares.
/// Equality is componentwise.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FileMetadata {
    /// Path relative to the sync root.
    pub path: PathBuf,
    /// Size in bytes.
    pub len: u64,
    /// Modification time.
    pub modified: SystemTime,
}

/// Collect the metadata set for every file under `root`.
///
/// Hidden entries (any dot-prefixed name component) are pruned,
/// directories and all. When `.diodeinclude` exists at the root it is
/// applied as a positive matcher: only files it matches survive.
pub fn scan_folder(root: &Path) -> Result<HashSet<FileMetadata>, DiodeError> {
    let include = include_matcher(root)?;
    let mut set = HashSet::new();

    let walker = WalkDir::new(root).min_depth(1).into_iter();
    for entry in walker.filter_entry(|e| !is_hidden(e)) {
        let entry = entry.map_err(std::io::Error::from)?;
        if !entry.file_type().is_file() {
            continue;
        }
        let rel = match entry.path().strip_prefix(root) {
            Ok(rel) => rel,
            Err(_) => continue,
        };
        if let Some(matcher) = &include {
            if !matcher.matched(rel, false).is_ignore() {
                continue;
            }
        }
        let meta = entry.metadata().map_err(std::io::Error::from)?;
        set.insert(FileMetadata {
            path: rel.to_path_buf(),
            len: meta.len(),
            modified: meta.modified()?,
        });
    }
    Ok(set)
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry
        .file_name()
        .to_str()
        .map(|name| name.starts_with('.'))
        .unwrap_or(false)
}

/// Build the `.diodeinclude` matcher if the file is present.
fn include_matcher(root: &Path) -> Result<Option<Gitignore>, DiodeError> {
    let include_path = root.join(INCLUDE_FILE);
    if !include_path.exists() {
        return Ok(None);
    }
    let mut builder = GitignoreBuilder::new(root);
    if let Some(err) = builder.add(&include_path) {
        return Err(err.into());
    }
    Ok(Some(builder.build()?))
}

// ── Store serialization ──────────────────────────────────────────
//
// Explicit length-prefixed layout, big-endian prefixes:
//
//   count(u32) ‖ entries
//
// each entry:
//
//   path_len(u32) ‖ path bytes (UTF-8) ‖ len(u64)
//     ‖ mtime_secs(u64) ‖ mtime_nanos(u32)

/// Encode a metadata set for the persistent store.
pub fn encode_metadata_set(set: &HashSet<FileMetadata>) -> Result<Vec<u8>, DiodeError> {
    let count = u32::try_from(set.len())
        .map_err(|_| DiodeError::Store("metadata set too large to encode".into()))?;

    let mut buf = Vec::new();
    buf.extend_from_slice(&count.to_be_bytes());
    for meta in set {
        let path = meta.path.to_string_lossy();
        let path_len = u32::try_from(path.len())
            .map_err(|_| DiodeError::Store("metadata path too long to encode".into()))?;
        // Pre-epoch mtimes clamp to the epoch.
        let mtime = meta.modified.duration_since(UNIX_EPOCH).unwrap_or_default();

        buf.extend_from_slice(&path_len.to_be_bytes());
        buf.extend_from_slice(path.as_bytes());
        buf.extend_from_slice(&meta.len.to_be_bytes());
        buf.extend_from_slice(&mtime.as_secs().to_be_bytes());
        buf.extend_from_slice(&mtime.subsec_nanos().to_be_bytes());
    }
    Ok(buf)
}

/// Decode a metadata set previously written with
/// [`encode_metadata_set`].
pub fn decode_metadata_set(bytes: &[u8]) -> Result<HashSet<FileMetadata>, DiodeError> {
    let mut cursor = bytes;
    let count = read_u32(&mut cursor)?;

    let mut set = HashSet::with_capacity(count as usize);
    for _ in 0..count {
        let path_len = read_u32(&mut cursor)? as usize;
        let path = std::str::from_utf8(read_slice(&mut cursor, path_len)?)
            .map_err(|_| DiodeError::CorruptState("metadata path is not valid utf-8"))?;
        let len = read_u64(&mut cursor)?;
        let secs = read_u64(&mut cursor)?;
        let nanos = read_u32(&mut cursor)?;
        if nanos >= 1_000_000_000 {
            return Err(DiodeError::CorruptState("metadata mtime nanos out of range"));
        }
        let modified = UNIX_EPOCH
            .checked_add(Duration::new(secs, nanos))
            .ok_or(DiodeError::CorruptState("metadata mtime out of range"))?;
        set.insert(FileMetadata {
            path: PathBuf::from(path),
            len,
            modified,
        });
    }
    if !cursor.is_empty() {
        return Err(DiodeError::CorruptState("trailing bytes after metadata set"));
    }
    Ok(set)
}

fn read_slice<'a>(cursor: &mut &'a [u8], len: usize) -> Result<&'a [u8], DiodeError> {
    if cursor.len() < len {
        return Err(DiodeError::CorruptState("metadata set blob truncated"));
    }
    let (head, tail) = cursor.split_at(len);
    *cursor = tail;
    Ok(head)
}

fn read_u32(cursor: &mut &[u8]) -> Result<u32, DiodeError> {
    let bytes = read_slice(cursor, 4)?;
    Ok(u32::from_be_bytes(bytes.try_into().map_err(|_| {
        DiodeError::CorruptState("metadata set blob truncated")
    })?))
}

fn read_u64(cursor: &mut &[u8]) -> Result<u64, DiodeError> {
    let bytes = read_slice(cursor, 8)?;
    Ok(u64::from_be_bytes(bytes.try_into().map_err(|_| {
        DiodeError::CorruptState("metadata set blob truncated")
    })?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn scan_collects_relative_paths() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.txt"), b"one").unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();
        fs::write(dir.path().join("sub/b.txt"), b"two").unwrap();

        let set = scan_folder(dir.path()).unwrap();
        let paths: HashSet<_> = set.iter().map(|m| m.path.clone()).collect();
        assert_eq!(paths.len(), 2);
        assert!(paths.contains(&PathBuf::from("a.txt")));
        assert!(paths.contains(&PathBuf::from("sub/b.txt")));
    }

    #[test]
    fn hidden_entries_are_pruned() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("visible"), b"x").unwrap();
        fs::write(dir.path().join(".hidden"), b"x").unwrap();
        fs::create_dir(dir.path().join(".git")).unwrap();
        fs::write(dir.path().join(".git/config"), b"x").unwrap();

        let set = scan_folder(dir.path()).unwrap();
        assert_eq!(set.len(), 1);
        assert_eq!(set.iter().next().unwrap().path, PathBuf::from("visible"));
    }

    #[test]
    fn include_list_keeps_only_matches() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("payload.txt"), b"text").unwrap();
        fs::write(dir.path().join("payload.md"), b"markdown").unwrap();
        fs::write(dir.path().join(INCLUDE_FILE), b"*.md\n").unwrap();

        let set = scan_folder(dir.path()).unwrap();
        assert_eq!(set.len(), 1);
        assert_eq!(set.iter().next().unwrap().path, PathBuf::from("payload.md"));
    }

    #[test]
    fn any_component_change_yields_a_new_tuple() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("data");
        fs::write(&file, b"before").unwrap();

        let before = scan_folder(dir.path()).unwrap();
        fs::write(&file, b"after, and longer").unwrap();
        let after = scan_folder(dir.path()).unwrap();

        let changed: HashSet<_> = after.difference(&before).collect();
        assert_eq!(changed.len(), 1);

        // An untouched tree diffs to nothing.
        let again = scan_folder(dir.path()).unwrap();
        assert!(again.difference(&after).next().is_none());
    }

    #[test]
    fn metadata_set_roundtrips_through_store_encoding() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("f1"), b"aaa").unwrap();
        fs::write(dir.path().join("f2"), b"bbbb").unwrap();

        let set = scan_folder(dir.path()).unwrap();
        let blob = encode_metadata_set(&set).unwrap();
        assert_eq!(decode_metadata_set(&blob).unwrap(), set);
    }

    #[test]
    fn corrupt_metadata_blob_rejected() {
        // Too short for the count prefix.
        assert!(decode_metadata_set(&[0, 0]).is_err());

        // Declares one entry but carries none.
        assert!(decode_metadata_set(&1u32.to_be_bytes()).is_err());

        // Trailing bytes after a well-formed set.
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("f"), b"x").unwrap();
        let mut blob = encode_metadata_set(&scan_folder(dir.path()).unwrap()).unwrap();
        blob.push(0);
        assert!(decode_metadata_set(&blob).is_err());
    }
}
