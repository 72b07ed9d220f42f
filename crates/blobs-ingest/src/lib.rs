//! Single-pass blob ingestion with digest verification.
//!
//! [`ingest`] streams an [`IncomingBlob`] into a [`BlobStore`] exactly once,
//! sniffing its content type and computing its SHA-256 on the way through.
//! The claimed digest is only trusted after the bytes agree with it; a
//! mismatch deletes what was written.
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use blobs_ingest::{ingest, Dependencies, IncomingBlob};
//! use blobs_store::MemoryBlobStore;
//! use blobs_types::{Checksum, Context, Digest};
//!
//! let deps = Dependencies::new(Arc::new(MemoryBlobStore::new()));
//! let data = b"GIF89a...".to_vec();
//! let blob = IncomingBlob::new(Digest::of(&data), Checksum::of(&data), std::io::Cursor::new(data));
//! let outcome = ingest(&Context::background(), &deps, blob).unwrap();
//! println!("{:?}", outcome.descriptor());
//! ```
//!
//! [`BlobStore`]: blobs_store::BlobStore

pub mod config;
pub mod deps;
pub mod error;
pub mod pipeline;
pub mod sniff;
pub mod tee;

pub use config::{ConfigError, IngestConfig};
pub use deps::Dependencies;
pub use error::{IngestError, IngestResult, TransferSide};
pub use pipeline::{ingest, ingest_with_config, IncomingBlob, IngestOutcome};
pub use sniff::MagicSniffer;
pub use tee::FanOut;
