//! Foundation types for content-addressed blob storage.
//!
//! Every other `blobs-*` crate depends on `blobs-types`.
//!
//! # Key Types
//!
//! - [`Digest`]: SHA-256 of a blob's exact bytes; the blob's identifier
//! - [`Checksum`]: Lightweight 32-bit integrity value supplied by clients
//! - [`BlobDescriptor`]: Digest, size and sniffed content type of a stored blob
//! - [`ContentType`]: The fixed set of recognized content types
//! - [`Context`]: Cooperative cancellation and deadline for one call

pub mod blob;
pub mod context;
pub mod digest;
pub mod error;

pub use blob::{BlobDescriptor, ContentType};
pub use context::{Context, ContextError};
pub use digest::{Checksum, Digest, DIGEST_LEN};
pub use error::TypeError;
