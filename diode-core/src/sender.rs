//! Transmission side of the sync protocol.
//!
//! One sync cycle:
//!
//! ```text
//! scan tree ──► diff against persisted `sent` set ──► tar the
//! changed files ──► hash + fragment the archive ──► emit every
//! fragment N times over UDP, paced ──► merge into `sent`
//! ```
//!
//! There are no acknowledgements anywhere: reliability comes from the
//! replication count and from the next cycle re-detecting files that
//! never made it across.

use std::collections::HashSet;
use std::fs::File;
use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};
use std::path::PathBuf;
use std::time::Instant;

use tempfile::TempPath;
use tracing::{debug, info, warn};

use crate::chunker::FileChunker;
use crate::error::DiodeError;
use crate::header::HEADER_SIZE;
use crate::pacing::Pacer;
use crate::snapshot::{self, FileMetadata};
use crate::store::SyncStore;

/// Default datagram budget: typical Ethernet MTU minus IPv4 + UDP
/// overhead.
pub const DEFAULT_CHUNK_SIZE: usize = 1400;

/// Store file maintained at the sender's sync root.
pub const SENDER_STORE_FILE: &str = ".sender_sync_data";

/// Store key holding the set of already-delivered metadata tuples.
const SENT_KEY: &str = "sent";

/// Tunables for a [`FolderSender`].
#[derive(Debug, Clone, Copy)]
pub struct SenderConfig {
    /// Maximum datagram size, header included.
    pub chunk_size: usize,
    /// Transmit rate cap in bytes per second (0 = unlimited).
    pub max_bytes_per_second: u64,
    /// How many times each fragment is emitted per cycle.
    pub transmit_repeats: u32,
}

impl Default for SenderConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            max_bytes_per_second: 20_000,
            transmit_repeats: 2,
        }
    }
}

/// Synchronizes one folder outward across the diode.
#[derive(Debug)]
pub struct FolderSender {
    root: PathBuf,
    dest: SocketAddr,
    socket: UdpSocket,
    config: SenderConfig,
    pacer: Pacer,
    store: SyncStore,
}

impl FolderSender {
    /// Create a sender with its own ephemeral UDP socket.
    pub fn new(
        folder: impl Into<PathBuf>,
        dest: impl ToSocketAddrs,
        config: SenderConfig,
    ) -> Result<Self, DiodeError> {
        let socket = UdpSocket::bind(("0.0.0.0", 0))?;
        Self::with_socket(folder, dest, socket, config)
    }

    /// Create a sender transmitting over an injected socket.
    pub fn with_socket(
        folder: impl Into<PathBuf>,
        dest: impl ToSocketAddrs,
        socket: UdpSocket,
        config: SenderConfig,
    ) -> Result<Self, DiodeError> {
        let root = folder.into();
        if !root.is_dir() {
            return Err(DiodeError::InvalidSyncRoot(root));
        }
        if config.chunk_size <= HEADER_SIZE {
            return Err(DiodeError::ChunkSizeTooSmall(config.chunk_size));
        }
        if config.transmit_repeats == 0 {
            return Err(DiodeError::ZeroTransmitRepeats);
        }
        let dest = dest
            .to_socket_addrs()?
            .next()
            .ok_or(DiodeError::UnresolvedDestination)?;

        let store = SyncStore::new(root.join(SENDER_STORE_FILE));
        if root.join(snapshot::INCLUDE_FILE).exists() {
            warn!(
                root = %root.display(),
                "found {}; only files it matches will be sent",
                snapshot::INCLUDE_FILE
            );
        }
        info!(
            root = %root.display(),
            %dest,
            chunk_size = config.chunk_size,
            limit = config.max_bytes_per_second,
            repeats = config.transmit_repeats,
            "sender ready"
        );
        Ok(Self {
            root,
            dest,
            socket,
            config,
            pacer: Pacer::new(config.max_bytes_per_second),
            store,
        })
    }

    /// The sync root this sender watches.
    pub fn root(&self) -> &std::path::Path {
        &self.root
    }

    /// Run one change-detect / archive / transmit cycle.
    ///
    /// A cycle with nothing changed is a cheap scan plus one store
    /// read. A cycle that transmits blocks until every copy is out.
    pub fn perform_sync(&self) -> Result<(), DiodeError> {
        let current = snapshot::scan_folder(&self.root)?;
        let sent = self.load_sent()?;
        let changed: HashSet<FileMetadata> = current.difference(&sent).cloned().collect();
        if changed.is_empty() {
            debug!("no changed files");
            return Ok(());
        }
        info!(count = changed.len(), "found changed files");
        debug!(?changed, "changed files");

        let (archive, included) = self.build_archive(&changed)?;
        let chunker = FileChunker::new(&*archive, self.config.chunk_size)?;
        debug!(
            archive = %archive.display(),
            hash = %hex::encode(chunker.hash()),
            fragments = chunker.total(),
            "built archive"
        );

        self.transmit(&chunker)?;
        info!(hash = %hex::encode(chunker.hash()), "transmitted archive");

        let mut guard = self.store.open()?;
        let merged: HashSet<FileMetadata> = sent.union(&included).cloned().collect();
        guard.put(SENT_KEY, snapshot::encode_metadata_set(&merged)?);
        guard.commit()?;

        // `archive` is a TempPath; dropping it unlinks the tar.
        Ok(())
    }

    /// Read the persisted `sent` set, defaulting to empty.
    fn load_sent(&self) -> Result<HashSet<FileMetadata>, DiodeError> {
        let guard = self.store.open()?;
        match guard.get(SENT_KEY) {
            Some(bytes) => snapshot::decode_metadata_set(bytes),
            None => Ok(HashSet::new()),
        }
    }

    /// Tar up the changed files at a fresh temp path.
    ///
    /// Entries that fail to open (vanished between scan and archive)
    /// are skipped and excluded from the returned set, so the next
    /// cycle picks them up again.
    fn build_archive(
        &self,
        changed: &HashSet<FileMetadata>,
    ) -> Result<(TempPath, HashSet<FileMetadata>), DiodeError> {
        let tmp = tempfile::Builder::new().suffix(".tar").tempfile()?;
        let mut builder = tar::Builder::new(tmp.as_file());
        let mut included = HashSet::new();

        for meta in changed {
            let absolute = self.root.join(&meta.path);
            match File::open(&absolute) {
                Ok(mut file) => {
                    builder.append_file(&meta.path, &mut file)?;
                    included.insert(meta.clone());
                }
                Err(e) => {
                    debug!(path = %meta.path.display(), error = %e, "skipping unreadable file");
                }
            }
        }
        builder.finish()?;
        drop(builder);
        Ok((tmp.into_temp_path(), included))
    }

    /// Emit every fragment `transmit_repeats` times, index-ascending
    /// within a copy, copies back to back.
    fn transmit(&self, chunker: &FileChunker) -> Result<(), DiodeError> {
        let mut total_bytes = 0u64;
        let start = Instant::now();

        for copy in 1..=self.config.transmit_repeats {
            info!(copy, of = self.config.transmit_repeats, "sending copy");
            for (index, frame) in chunker.fragments()?.enumerate() {
                let frame = frame?;
                self.socket.send_to(&frame, self.dest)?;
                total_bytes += frame.len() as u64;
                self.pacer.pace(frame.len());
                debug!(copy, index, "sent fragment");
            }
        }

        let elapsed = start.elapsed().as_secs_f64();
        let rate = total_bytes as f64 / elapsed.max(1e-4);
        info!(
            bytes = total_bytes,
            elapsed_s = elapsed,
            bytes_per_s = rate,
            "transmission finished"
        );
        Ok(())
    }
}
