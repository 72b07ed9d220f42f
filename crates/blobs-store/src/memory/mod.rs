//! Transactional in-memory blob store.
//!
//! Each digest moves through `Absent -> Open -> Committed -> Absent`. The
//! existence check and the reservation in [`begin_upload`] happen inside one
//! write transaction, so two concurrent uploads of the same digest can never
//! both see it absent. Open records are invisible to readers.
//!
//! [`begin_upload`]: crate::BlobStore::begin_upload

mod memdb;

use std::io::{self, Cursor, Write};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use blobs_types::{Checksum, Context, Digest};
use bytes::Bytes;
use tracing::{debug, warn};

use crate::error::{StoreError, StoreResult};
use crate::traits::{BlobReader, BlobSink, BlobStore, UploadSlot};

pub use memdb::{ReadTxn, Table, WriteTxn};

/// Lifecycle state of one record.
#[derive(Clone, Debug)]
enum RecordState {
    /// Reserved by the upload with this id; not readable yet.
    Open { upload: u64 },
    /// Complete and readable.
    Committed { contents: Bytes, checksum: Checksum },
}

#[derive(Clone, Debug)]
struct BlobRecord {
    state: RecordState,
}

impl BlobRecord {
    fn committed_contents(&self) -> Option<&Bytes> {
        match &self.state {
            RecordState::Committed { contents, .. } => Some(contents),
            RecordState::Open { .. } => None,
        }
    }
}

type BlobTable = Table<Digest, BlobRecord>;

/// In-memory implementation of [`BlobStore`].
///
/// Intended for tests and embedding. Records live in a [`Table`] and are
/// lost when the store is dropped. Cloning the store shares the table.
#[derive(Clone)]
pub struct MemoryBlobStore {
    table: Arc<BlobTable>,
    next_upload: Arc<AtomicU64>,
    max_blob_size: Option<u64>,
}

impl MemoryBlobStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self {
            table: Arc::new(Table::new("blob")),
            next_upload: Arc::new(AtomicU64::new(1)),
            max_blob_size: None,
        }
    }

    /// Reject uploads larger than `max` bytes. The write that crosses the
    /// limit fails and the upload's reservation is released when its sink is
    /// dropped.
    pub fn with_max_blob_size(mut self, max: u64) -> Self {
        self.max_blob_size = Some(max);
        self
    }

    /// Number of committed blobs.
    pub fn len(&self) -> StoreResult<usize> {
        let txn = self.table.read()?;
        Ok(txn
            .iter()
            .filter(|(_, r)| r.committed_contents().is_some())
            .count())
    }

    /// Returns `true` if no committed blobs exist.
    pub fn is_empty(&self) -> StoreResult<bool> {
        Ok(self.len()? == 0)
    }

    /// Total bytes across all committed blobs.
    pub fn total_bytes(&self) -> StoreResult<u64> {
        let txn = self.table.read()?;
        Ok(txn
            .iter()
            .filter_map(|(_, r)| r.committed_contents())
            .map(|c| c.len() as u64)
            .sum())
    }

    /// Sorted digests of all committed blobs.
    pub fn digests(&self) -> StoreResult<Vec<Digest>> {
        let txn = self.table.read()?;
        Ok(txn
            .iter()
            .filter(|(_, r)| r.committed_contents().is_some())
            .map(|(d, _)| *d)
            .collect())
    }

    /// Checksum recorded with a committed blob.
    pub fn checksum(&self, digest: &Digest) -> StoreResult<Checksum> {
        let txn = self.table.read()?;
        match txn.first(digest).map(|r| &r.state) {
            Some(RecordState::Committed { checksum, .. }) => Ok(*checksum),
            _ => Err(StoreError::NotFound(*digest)),
        }
    }

    /// Remove every record, including open reservations.
    pub fn clear(&self) -> StoreResult<()> {
        let mut txn = self.table.write()?;
        txn.truncate();
        txn.commit()
    }
}

impl Default for MemoryBlobStore {
    fn default() -> Self {
        Self::new()
    }
}

impl BlobStore for MemoryBlobStore {
    fn backend_name(&self) -> &'static str {
        "memory"
    }

    fn begin_upload(
        &self,
        ctx: &Context,
        digest: &Digest,
        checksum: Checksum,
    ) -> StoreResult<UploadSlot> {
        ctx.check()?;
        let mut txn = self.table.write()?;
        if txn.first(digest).is_some() {
            debug!(%digest, "blob already present");
            txn.abort();
            return Ok(UploadSlot::AlreadyExists);
        }
        let upload = self.next_upload.fetch_add(1, Ordering::Relaxed);
        txn.insert(
            *digest,
            BlobRecord {
                state: RecordState::Open { upload },
            },
        );
        txn.commit()?;
        debug!(%digest, upload, "reserved blob");

        Ok(UploadSlot::Created(Box::new(MemorySink {
            table: Arc::clone(&self.table),
            ctx: ctx.clone(),
            digest: *digest,
            upload,
            checksum,
            buf: Vec::new(),
            max_blob_size: self.max_blob_size,
            finished: false,
        })))
    }

    fn open_download(&self, ctx: &Context, digest: &Digest) -> StoreResult<BlobReader> {
        ctx.check()?;
        let txn = self.table.read()?;
        let contents = txn
            .first(digest)
            .and_then(BlobRecord::committed_contents)
            .ok_or(StoreError::NotFound(*digest))?;
        Ok(Box::new(Cursor::new(contents.clone())))
    }

    fn delete(&self, ctx: &Context, digest: &Digest) -> StoreResult<()> {
        ctx.check()?;
        let mut txn = self.table.write()?;
        if txn.delete(digest).is_some() {
            debug!(%digest, "deleted blob");
        }
        txn.commit()
    }
}

impl std::fmt::Debug for MemoryBlobStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let count = self.table.read().map(|t| t.len()).unwrap_or_default();
        f.debug_struct("MemoryBlobStore")
            .field("record_count", &count)
            .field("max_blob_size", &self.max_blob_size)
            .finish()
    }
}

/// Sink bound to one open reservation.
struct MemorySink {
    table: Arc<BlobTable>,
    ctx: Context,
    digest: Digest,
    upload: u64,
    checksum: Checksum,
    buf: Vec<u8>,
    max_blob_size: Option<u64>,
    finished: bool,
}

impl MemorySink {
    fn owns(&self, record: Option<&BlobRecord>) -> bool {
        matches!(
            record.map(|r| &r.state),
            Some(RecordState::Open { upload }) if *upload == self.upload
        )
    }
}

impl Write for MemorySink {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.ctx.check().map_err(io::Error::other)?;
        if let Some(max) = self.max_blob_size {
            if (self.buf.len() + data.len()) as u64 > max {
                return Err(io::Error::other(format!(
                    "blob {} exceeds the {max} byte limit",
                    self.digest
                )));
            }
        }
        self.buf.extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl BlobSink for MemorySink {
    fn finish(mut self: Box<Self>, ctx: &Context) -> StoreResult<()> {
        ctx.check()?;
        let mut txn = self.table.write()?;
        if !self.owns(txn.first(&self.digest)) {
            return Err(StoreError::Txn(format!(
                "reservation for {} was released before commit",
                self.digest
            )));
        }
        let contents = Bytes::from(std::mem::take(&mut self.buf));
        let size = contents.len();
        txn.insert(
            self.digest,
            BlobRecord {
                state: RecordState::Committed {
                    contents,
                    checksum: self.checksum,
                },
            },
        );
        txn.commit()?;
        self.finished = true;
        debug!(digest = %self.digest, size, "committed blob");
        Ok(())
    }
}

impl Drop for MemorySink {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        let released = self.table.write().and_then(|mut txn| {
            if !self.owns(txn.first(&self.digest)) {
                return Ok(false);
            }
            txn.delete(&self.digest);
            txn.commit().map(|_| true)
        });
        match released {
            Ok(true) => debug!(digest = %self.digest, "released unfinished upload"),
            Ok(false) => {}
            Err(e) => warn!(digest = %self.digest, error = %e, "failed to release upload"),
        }
    }
}
