//! Pluggable storage for content-addressed blobs.
//!
//! Every backend implements the [`BlobStore`] capability contract: reserve a
//! digest and stream bytes into it, read bytes back (or hand out a public
//! URL), and delete. Records are keyed by the SHA-256 [`Digest`] of their
//! bytes, but backends never hash anything themselves; verifying a claim is
//! the ingest pipeline's job.
//!
//! # Storage Backends
//!
//! - [`MemoryBlobStore`] -- transactional in-memory store for tests and embedding
//! - [`FsBlobStore`] -- one file per digest under a root directory
//!
//! # Design Rules
//!
//! 1. A record is either absent, reserved by exactly one open upload, or
//!    committed. Readers only ever see committed records.
//! 2. `begin_upload` checks and reserves atomically; a concurrent loser gets
//!    [`UploadSlot::AlreadyExists`], never an error.
//! 3. Deleting an absent record succeeds.
//! 4. A sink dropped without `finish` releases its reservation.
//! 5. All I/O errors are propagated, never silently ignored.
//!
//! [`Digest`]: blobs_types::Digest

pub mod config;
pub mod error;
pub mod filesystem;
pub mod memory;
pub mod traits;

pub use config::StoreConfig;
pub use error::{StoreError, StoreResult};
pub use filesystem::FsBlobStore;
pub use memory::MemoryBlobStore;
pub use traits::{BlobLocation, BlobReader, BlobSink, BlobStore, UploadSlot};
