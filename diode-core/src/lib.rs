//! # diode-core
//!
//! One-way folder synchronization across a data diode: a link where
//! bytes flow from sender to receiver and nothing ever flows back.
//!
//! This crate contains:
//! - **Wire types**: [`FragmentHeader`], the frozen 48-byte datagram
//!   header carrying archive hash, offset, index, and total
//! - **Primitives**: [`Bitset`] progress tracking, streaming SHA-1
//!   [`hash_file`], the [`FileChunker`] fragment producer and the
//!   [`FileReassembler`] fragment writer
//! - **Endpoints**: [`FolderSender`] (change detection, archiving,
//!   paced replicated emission) and [`FolderReceiver`] (async
//!   ingress, durable reassembly, verification, extraction)
//! - **Persistence**: [`SyncStore`], the transactional key-value
//!   file both endpoints keep at their sync root
//! - **Error**: [`DiodeError`], the `thiserror`-based error hierarchy
//!
//! The protocol sends no acknowledgements. Loss is handled by
//! emitting every fragment several times and by the next sync cycle
//! re-detecting files that never completed; duplication and
//! reordering are handled by idempotent, offset-addressed writes.

pub mod bitset;
pub mod chunker;
pub mod error;
pub mod hash;
pub mod header;
pub mod pacing;
pub mod reassembler;
pub mod receiver;
pub mod sender;
pub mod snapshot;
pub mod store;

// ── Re-exports for ergonomic usage ───────────────────────────────

pub use bitset::Bitset;
pub use chunker::{FileChunker, Fragments};
pub use error::DiodeError;
pub use hash::{ArchiveHash, HASH_SIZE, hash_file};
pub use header::{FragmentHeader, HEADER_SIZE, HeaderBytes};
pub use pacing::Pacer;
pub use reassembler::FileReassembler;
pub use receiver::{ArchiveState, FolderReceiver, RECEIVER_STORE_FILE, ReceiverWorker};
pub use sender::{DEFAULT_CHUNK_SIZE, FolderSender, SENDER_STORE_FILE, SenderConfig};
pub use snapshot::{FileMetadata, INCLUDE_FILE, scan_folder};
pub use store::{StoreGuard, SyncStore};
