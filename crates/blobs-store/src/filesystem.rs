//! Filesystem-backed blob store.
//!
//! One file per digest under a root directory:
//!
//! ```text
//! <root>/
//!   <64 hex chars>           committed blob
//!   <64 hex chars>.partial   upload in progress
//! ```
//!
//! An upload reserves its digest by creating the `.partial` file exclusively,
//! and commits by renaming it over the final name. Readers never open
//! `.partial` files.
//!
//! A root belongs to one open store at a time. [`FsBlobStore::open`] removes
//! any `.partial` files an earlier owner left behind, since no live sink can
//! own them.

use std::ffi::OsStr;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use blobs_types::{Checksum, Context, Digest};
use tracing::{debug, warn};

use crate::error::{StoreError, StoreResult};
use crate::traits::{BlobReader, BlobSink, BlobStore, UploadSlot};

const PARTIAL_SUFFIX: &str = "partial";

/// Filesystem implementation of [`BlobStore`].
#[derive(Clone, Debug)]
pub struct FsBlobStore {
    root: PathBuf,
    public_base_url: Option<String>,
}

impl FsBlobStore {
    /// Open a store rooted at `root`, creating the directory if needed.
    ///
    /// Unfinished uploads from a previous owner of `root` are discarded.
    pub fn open(root: impl Into<PathBuf>) -> StoreResult<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        let reclaimed = reclaim_partials(&root)?;
        if reclaimed > 0 {
            warn!(root = %root.display(), reclaimed, "removed abandoned partial uploads");
        }
        Ok(Self {
            root,
            public_base_url: None,
        })
    }

    /// Serve blobs from `base_url` (e.g. a CDN fronting the root directory)
    /// instead of streaming them through the process.
    pub fn with_public_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.public_base_url = Some(base_url.into());
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn blob_path(&self, digest: &Digest) -> PathBuf {
        self.root.join(digest.to_hex())
    }

    fn partial_path(&self, digest: &Digest) -> PathBuf {
        self.blob_path(digest).with_extension(PARTIAL_SUFFIX)
    }
}

impl BlobStore for FsBlobStore {
    fn backend_name(&self) -> &'static str {
        "filesystem"
    }

    fn begin_upload(
        &self,
        ctx: &Context,
        digest: &Digest,
        _checksum: Checksum,
    ) -> StoreResult<UploadSlot> {
        ctx.check()?;
        let final_path = self.blob_path(digest);
        if final_path.try_exists()? {
            debug!(%digest, "blob already present");
            return Ok(UploadSlot::AlreadyExists);
        }

        let partial_path = self.partial_path(digest);
        let file = match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&partial_path)
        {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                debug!(%digest, "upload already in progress");
                return Ok(UploadSlot::AlreadyExists);
            }
            Err(e) => return Err(e.into()),
        };

        // A concurrent upload may have committed between the first check and
        // our reservation.
        let committed = match final_path.try_exists() {
            Ok(committed) => committed,
            Err(e) => {
                drop(file);
                let _ = fs::remove_file(&partial_path);
                return Err(e.into());
            }
        };
        if committed {
            drop(file);
            fs::remove_file(&partial_path)?;
            return Ok(UploadSlot::AlreadyExists);
        }

        debug!(%digest, path = %partial_path.display(), "reserved blob");
        Ok(UploadSlot::Created(Box::new(FsSink {
            writer: Some(BufWriter::new(file)),
            ctx: ctx.clone(),
            partial_path,
            final_path,
        })))
    }

    fn open_download(&self, ctx: &Context, digest: &Digest) -> StoreResult<BlobReader> {
        ctx.check()?;
        match File::open(self.blob_path(digest)) {
            Ok(file) => Ok(Box::new(BufReader::new(file))),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Err(StoreError::NotFound(*digest)),
            Err(e) => Err(e.into()),
        }
    }

    fn delete(&self, ctx: &Context, digest: &Digest) -> StoreResult<()> {
        ctx.check()?;
        match fs::remove_file(self.blob_path(digest)) {
            Ok(()) => {
                debug!(%digest, "deleted blob");
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn build_public_url(&self, ctx: &Context, digest: &Digest) -> StoreResult<Option<String>> {
        ctx.check()?;
        Ok(self
            .public_base_url
            .as_deref()
            .map(|base| format!("{}/{}", base.trim_end_matches('/'), digest)))
    }
}

/// Delete every `*.partial` file directly under `root`. Returns how many were
/// removed.
fn reclaim_partials(root: &Path) -> StoreResult<usize> {
    let mut reclaimed = 0;
    for entry in fs::read_dir(root)? {
        let entry = entry?;
        let path = entry.path();
        if path.extension() != Some(OsStr::new(PARTIAL_SUFFIX)) || !entry.file_type()?.is_file() {
            continue;
        }
        match fs::remove_file(&path) {
            Ok(()) => {
                debug!(path = %path.display(), "removed abandoned partial upload");
                reclaimed += 1;
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
    }
    Ok(reclaimed)
}

/// Sink writing into a reserved `.partial` file.
struct FsSink {
    /// `None` once finished.
    writer: Option<BufWriter<File>>,
    ctx: Context,
    partial_path: PathBuf,
    final_path: PathBuf,
}

impl FsSink {
    fn writer(&mut self) -> io::Result<&mut BufWriter<File>> {
        self.writer
            .as_mut()
            .ok_or_else(|| io::Error::other("sink already finished"))
    }

    fn commit(&mut self) -> StoreResult<()> {
        let writer = self
            .writer
            .take()
            .ok_or_else(|| StoreError::Txn("sink already finished".into()))?;
        let file = writer.into_inner().map_err(|e| e.into_error())?;
        file.sync_all()?;
        drop(file);
        fs::rename(&self.partial_path, &self.final_path)?;
        Ok(())
    }
}

impl Write for FsSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.ctx.check().map_err(io::Error::other)?;
        self.writer()?.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.writer()?.flush()
    }
}

impl BlobSink for FsSink {
    fn finish(mut self: Box<Self>, ctx: &Context) -> StoreResult<()> {
        ctx.check()?;
        if let Err(e) = self.commit() {
            // Leave nothing behind that could block a retry.
            let _ = fs::remove_file(&self.partial_path);
            return Err(e);
        }
        debug!(path = %self.final_path.display(), "committed blob");
        Ok(())
    }
}

impl Drop for FsSink {
    fn drop(&mut self) {
        if self.writer.take().is_none() {
            return;
        }
        match fs::remove_file(&self.partial_path) {
            Ok(()) => debug!(path = %self.partial_path.display(), "released unfinished upload"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!(
                path = %self.partial_path.display(),
                error = %e,
                "failed to remove unfinished upload"
            ),
        }
    }
}
