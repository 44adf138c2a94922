//! Reception side of the sync protocol.
//!
//! Two cooperating halves, joined by an unbounded channel:
//!
//! ```text
//! UDP socket ──► ingress task (async, never touches disk)
//!                   │ length-checked datagrams
//!                   ▼
//!                worker thread (blocking, owns all file + store I/O)
//! ```
//!
//! The worker serializes every archive write and store mutation, so
//! the persistent bitset and the bytes on disk can never disagree by
//! more than the single fragment currently in flight. Fragments may
//! arrive in any order, duplicated, or not at all; the worker is a
//! pure function of (persistent state, next datagram).

use std::collections::HashSet;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::thread;

use bytes::Bytes;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::bitset::Bitset;
use crate::error::DiodeError;
use crate::hash::{ArchiveHash, hash_file};
use crate::header::{FragmentHeader, HEADER_SIZE};
use crate::reassembler::write_at;
use crate::store::SyncStore;

/// Store file maintained at the receiver's sync root.
pub const RECEIVER_STORE_FILE: &str = ".receiver_sync_data";

/// Soft cap on the in-memory completed-archive cache.
const KNOWN_COMPLETE_CAP: usize = 10;

// ── Per-archive persistent state ─────────────────────────────────

const IN_PROGRESS_TAG: u8 = 0;
const COMPLETE_TAG: u8 = 1;

/// Durable reassembly state for one archive, keyed in the store by
/// the hex-encoded archive hash.
///
/// Absent → `InProgress` on the first novel fragment, `InProgress` →
/// `Complete` when the bitset fills. `Complete` is terminal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArchiveState {
    /// Reassembly underway; the bitset records which fragment
    /// indices are durably on disk.
    InProgress(Bitset),
    /// Archive finished and extracted.
    Complete,
}

impl ArchiveState {
    /// Serialize as a tag byte plus, for in-progress archives, the
    /// bitset blob.
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            ArchiveState::Complete => vec![COMPLETE_TAG],
            ArchiveState::InProgress(bits) => {
                let mut buf = Vec::with_capacity(1 + 8 + (bits.len() as usize).div_ceil(8));
                buf.push(IN_PROGRESS_TAG);
                buf.extend_from_slice(&bits.to_bytes());
                buf
            }
        }
    }

    /// Deserialize a blob produced by [`ArchiveState::to_bytes`].
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, DiodeError> {
        match bytes.split_first() {
            Some((&COMPLETE_TAG, _)) => Ok(ArchiveState::Complete),
            Some((&IN_PROGRESS_TAG, rest)) => Ok(ArchiveState::InProgress(Bitset::from_bytes(rest)?)),
            Some(_) => Err(DiodeError::CorruptState("unknown archive state tag")),
            None => Err(DiodeError::CorruptState("empty archive state blob")),
        }
    }
}

// ── Worker ───────────────────────────────────────────────────────

/// The single consumer of the fragment queue. Owns every filesystem
/// and store operation on the receive side.
pub struct ReceiverWorker {
    root: PathBuf,
    delete_archives: bool,
    store: SyncStore,
    /// Hashes known finished, so repeat fragments for a done archive
    /// cost zero filesystem access.
    known_complete: HashSet<ArchiveHash>,
}

impl ReceiverWorker {
    /// Create a worker writing into `folder`.
    pub fn new(folder: impl Into<PathBuf>, delete_archives: bool) -> Result<Self, DiodeError> {
        let root = folder.into();
        if !root.is_dir() {
            return Err(DiodeError::InvalidSyncRoot(root));
        }
        let store = SyncStore::new(root.join(RECEIVER_STORE_FILE));
        Ok(Self {
            root,
            delete_archives,
            store,
            known_complete: HashSet::new(),
        })
    }

    /// Where an in-flight archive lands on disk.
    pub fn archive_path(&self, hash: &ArchiveHash) -> PathBuf {
        self.root.join(format!("{}.tar", hex::encode(hash)))
    }

    /// Drain the queue until every sender handle is gone.
    fn run(mut self, mut queue: mpsc::UnboundedReceiver<Bytes>) {
        while let Some(frame) = queue.blocking_recv() {
            if let Err(e) = self.process(&frame) {
                warn!(error = %e, "failed to process fragment");
            }
        }
    }

    /// Apply one datagram to persistent state.
    ///
    /// Every early return leaves the store untouched; the store is
    /// only committed after the payload write succeeded.
    pub fn process(&mut self, frame: &[u8]) -> Result<(), DiodeError> {
        if frame.len() < HEADER_SIZE {
            return Err(DiodeError::UndersizedFragment(frame.len()));
        }
        let header = FragmentHeader::from_bytes(&frame[..HEADER_SIZE])?;
        let payload = &frame[HEADER_SIZE..];
        let hash = header.hash();

        if self.known_complete.contains(&hash) {
            return Ok(());
        }

        let key = hex::encode(hash);
        let mut guard = self.store.open()?;
        let state = match guard.get(&key) {
            Some(bytes) => ArchiveState::from_bytes(bytes)?,
            None => ArchiveState::InProgress(Bitset::new(header.total())),
        };

        let mut bits = match state {
            ArchiveState::Complete => {
                self.remember_complete(hash);
                debug!(hash = %key, "fragment for an archive already completed");
                return Ok(());
            }
            ArchiveState::InProgress(bits) => bits,
        };

        if bits.get(header.index())? {
            debug!(hash = %key, index = header.index(), "duplicate fragment");
            return Ok(());
        }

        let archive = self.archive_path(&hash);
        write_at(&archive, header.offset(), payload)?;
        bits.set(header.index(), true)?;

        let received = bits.cardinality();
        let total = header.total();
        let complete = received == total;
        if complete {
            guard.put(key.clone(), ArchiveState::Complete.to_bytes());
        } else {
            guard.put(key.clone(), ArchiveState::InProgress(bits).to_bytes());
        }
        guard.commit()?;

        if !complete {
            log_progress(&key, received, total);
            return Ok(());
        }

        info!(hash = %key, "archive complete");
        self.remember_complete(hash);
        self.finish_archive(&archive, &hash);
        Ok(())
    }

    /// Cache a finished hash, resetting the cache to a singleton once
    /// it outgrows the soft cap.
    fn remember_complete(&mut self, hash: ArchiveHash) {
        if self.known_complete.len() > KNOWN_COMPLETE_CAP {
            self.known_complete.clear();
        }
        self.known_complete.insert(hash);
    }

    /// Verify, extract, and dispose of a completed archive.
    ///
    /// A hash mismatch is loudly logged but extraction still runs:
    /// there is no reverse channel to ask for a resend, so surfacing
    /// whatever arrived beats silently dropping it. The archive file
    /// survives any extraction failure for operator inspection.
    fn finish_archive(&self, archive: &Path, expected: &ArchiveHash) {
        match hash_file(archive) {
            Ok(actual) if actual == *expected => {}
            Ok(actual) => warn!(
                expected = %hex::encode(expected),
                actual = %hex::encode(actual),
                "ARCHIVE HAS EVERY FRAGMENT BUT THE HASH DOES NOT MATCH"
            ),
            Err(e) => warn!(archive = %archive.display(), error = %e, "could not rehash archive"),
        }

        if let Err(e) = self.extract(archive) {
            error!(
                archive = %archive.display(),
                error = %e,
                "extraction failed; archive retained"
            );
            return;
        }
        info!(archive = %archive.display(), "archive extracted");

        if self.delete_archives {
            if let Err(e) = std::fs::remove_file(archive) {
                warn!(archive = %archive.display(), error = %e, "could not delete archive");
            }
        }
    }

    fn extract(&self, archive: &Path) -> Result<(), DiodeError> {
        let mut tar = tar::Archive::new(File::open(archive)?);
        tar.unpack(&self.root)?;
        Ok(())
    }
}

/// Info line each time the received fraction crosses a 10% boundary,
/// debug otherwise.
fn log_progress(key: &str, received: u32, total: u32) {
    let prev_decile = (100 * received.saturating_sub(1) / total) / 10;
    let percent = 100 * received / total;
    if prev_decile != percent / 10 {
        info!(hash = %key, percent, "receive progress");
    }
    debug!(hash = %key, received, total, "fragment stored");
}

// ── Receiver front ───────────────────────────────────────────────

/// Synchronizes one folder inward across the diode.
///
/// Construction spawns the worker thread; [`FolderReceiver::run`]
/// drives the socket. [`FolderReceiver::ingest`] is the transportless
/// entry point for callers that already hold a datagram.
pub struct FolderReceiver {
    ingress: mpsc::UnboundedSender<Bytes>,
    _worker: thread::JoinHandle<()>,
}

impl FolderReceiver {
    /// Create a receiver writing into `folder` and start its worker.
    pub fn new(folder: impl Into<PathBuf>, delete_archives: bool) -> Result<Self, DiodeError> {
        let worker = ReceiverWorker::new(folder, delete_archives)?;
        let (ingress, queue) = mpsc::unbounded_channel();
        let handle = thread::Builder::new()
            .name("diode-worker".into())
            .spawn(move || worker.run(queue))?;
        Ok(Self {
            ingress,
            _worker: handle,
        })
    }

    /// Enqueue one datagram for the worker. Undersized datagrams are
    /// dropped here with a warning; the queue never blocks.
    pub fn ingest(&self, datagram: Bytes) {
        if datagram.len() < HEADER_SIZE {
            warn!(len = datagram.len(), "dropping undersized datagram");
            return;
        }
        // Send only fails when the worker is gone, and the worker
        // lives as long as this receiver.
        let _ = self.ingress.send(datagram);
    }

    /// Drain `socket` into the worker queue until the socket errors.
    pub async fn run(&self, socket: &UdpSocket) -> Result<(), DiodeError> {
        let mut buf = vec![0u8; 65536];
        loop {
            let (len, peer) = socket.recv_from(&mut buf).await?;
            if len < HEADER_SIZE {
                warn!(%peer, len, "dropping undersized datagram");
                continue;
            }
            self.ingest(Bytes::copy_from_slice(&buf[..len]));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn archive_state_roundtrip() {
        let mut bits = Bitset::new(12);
        bits.set(3, true).unwrap();
        let state = ArchiveState::InProgress(bits);
        let restored = ArchiveState::from_bytes(&state.to_bytes()).unwrap();
        assert_eq!(restored, state);

        let complete = ArchiveState::from_bytes(&ArchiveState::Complete.to_bytes()).unwrap();
        assert_eq!(complete, ArchiveState::Complete);
    }

    #[test]
    fn archive_state_rejects_garbage() {
        assert!(ArchiveState::from_bytes(&[]).is_err());
        assert!(ArchiveState::from_bytes(&[7]).is_err());
        assert!(ArchiveState::from_bytes(&[IN_PROGRESS_TAG, 1, 2]).is_err());
    }

    #[test]
    fn known_complete_cache_resets_past_cap() {
        let dir = tempfile::tempdir().unwrap();
        let mut worker = ReceiverWorker::new(dir.path(), true).unwrap();
        for i in 0..=KNOWN_COMPLETE_CAP {
            worker.remember_complete([i as u8; 20]);
        }
        assert_eq!(worker.known_complete.len(), KNOWN_COMPLETE_CAP + 1);
        worker.remember_complete([0xFF; 20]);
        assert_eq!(worker.known_complete.len(), 1);
        assert!(worker.known_complete.contains(&[0xFF; 20]));
    }

    #[test]
    fn missing_root_rejected() {
        assert!(matches!(
            ReceiverWorker::new("/no/such/root", true),
            Err(DiodeError::InvalidSyncRoot(_))
        ));
    }
}
