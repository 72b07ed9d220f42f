use std::fmt;
use std::io::{Read, Write};

use blobs_types::{Checksum, Context, Digest};

use crate::error::{StoreError, StoreResult};

/// A readable stream over a committed blob. Dropping it closes it.
pub type BlobReader = Box<dyn Read + Send>;

/// Write destination for one upload.
///
/// Bytes written are not visible to readers until [`BlobSink::finish`]
/// succeeds. Dropping a sink without finishing it releases the reservation
/// its upload holds, leaving the digest absent.
pub trait BlobSink: Write + Send {
    /// Flush, make the bytes durable, and commit the record.
    fn finish(self: Box<Self>, ctx: &Context) -> StoreResult<()>;
}

/// Outcome of reserving a digest for upload.
pub enum UploadSlot {
    /// The digest was absent and is now reserved for this sink.
    Created(Box<dyn BlobSink>),
    /// A record under this digest already exists (or is being written).
    /// Nothing to do; this is not a failure.
    AlreadyExists,
}

impl fmt::Debug for UploadSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UploadSlot::Created(_) => f.write_str("UploadSlot::Created(..)"),
            UploadSlot::AlreadyExists => f.write_str("UploadSlot::AlreadyExists"),
        }
    }
}

/// Where a caller can fetch a blob from.
pub enum BlobLocation {
    /// An externally resolvable URL; serve this instead of proxying bytes.
    Url(String),
    /// A stream over the stored bytes.
    Stream(BlobReader),
}

impl fmt::Debug for BlobLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlobLocation::Url(url) => f.debug_tuple("BlobLocation::Url").field(url).finish(),
            BlobLocation::Stream(_) => f.write_str("BlobLocation::Stream(..)"),
        }
    }
}

/// Blob storage capability.
///
/// Implementations are encouraged not to buffer whole blobs in memory and
/// must offer [`open_download`](BlobStore::open_download),
/// [`build_public_url`](BlobStore::build_public_url), or both.
///
/// All implementations must satisfy these invariants:
/// - `begin_upload` and `delete` are safe to call concurrently for different
///   digests.
/// - Concurrent `begin_upload` calls for the same digest reserve it at most
///   once; every other caller observes [`UploadSlot::AlreadyExists`].
/// - A partially written record is never visible to readers.
/// - Every operation honours the [`Context`] it is given.
pub trait BlobStore: Send + Sync {
    /// Short backend name for log fields.
    fn backend_name(&self) -> &'static str;

    /// Reserve `digest` and return a sink for its bytes.
    ///
    /// `checksum` is the client's integrity value, passed through for the
    /// backend's own use. Built-in backends do not verify it.
    fn begin_upload(
        &self,
        ctx: &Context,
        digest: &Digest,
        checksum: Checksum,
    ) -> StoreResult<UploadSlot>;

    /// Open a stream over a committed blob.
    ///
    /// Returns [`StoreError::NotFound`] if no committed record exists.
    fn open_download(&self, ctx: &Context, digest: &Digest) -> StoreResult<BlobReader> {
        let _ = (ctx, digest);
        Err(StoreError::Unsupported("download"))
    }

    /// Remove the record for `digest`. Removing an absent record succeeds.
    fn delete(&self, ctx: &Context, digest: &Digest) -> StoreResult<()>;

    /// An externally resolvable URL for the blob, or `None` if the backend
    /// cannot front its blobs.
    fn build_public_url(&self, ctx: &Context, digest: &Digest) -> StoreResult<Option<String>> {
        let _ = (ctx, digest);
        Ok(None)
    }

    /// Prefer a public URL, falling back to a download stream.
    fn locate(&self, ctx: &Context, digest: &Digest) -> StoreResult<BlobLocation> {
        if let Some(url) = self.build_public_url(ctx, digest)? {
            return Ok(BlobLocation::Url(url));
        }
        self.open_download(ctx, digest).map(BlobLocation::Stream)
    }
}
