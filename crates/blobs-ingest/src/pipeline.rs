//! Streaming upload with digest verification.

use std::fmt;
use std::io::{self, Read, Write};

use blobs_crypto::DigestWriter;
use blobs_store::UploadSlot;
use blobs_types::{BlobDescriptor, Checksum, Context, ContextError, Digest, TypeError};
use tracing::{debug, error, info, info_span};

use crate::config::IngestConfig;
use crate::deps::Dependencies;
use crate::error::{IngestError, IngestResult, TransferSide};
use crate::sniff::MagicSniffer;
use crate::tee::FanOut;

/// A blob on its way in: the caller's claims plus a single-use byte stream.
///
/// The stream is read at most once and is dropped (closed) before
/// [`ingest`] returns.
pub struct IncomingBlob {
    pub claimed: Digest,
    pub checksum: Checksum,
    pub data: Box<dyn Read + Send>,
}

impl IncomingBlob {
    pub fn new(claimed: Digest, checksum: Checksum, data: impl Read + Send + 'static) -> Self {
        Self {
            claimed,
            checksum,
            data: Box::new(data),
        }
    }

    /// Build from a hex-encoded claim as received from a client.
    pub fn from_hex_claim(
        claimed: &str,
        checksum: Checksum,
        data: impl Read + Send + 'static,
    ) -> Result<Self, TypeError> {
        Ok(Self::new(Digest::from_hex(claimed)?, checksum, data))
    }
}

impl fmt::Debug for IncomingBlob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IncomingBlob")
            .field("claimed", &self.claimed)
            .field("checksum", &self.checksum)
            .finish_non_exhaustive()
    }
}

/// What an ingest call did.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum IngestOutcome {
    /// The payload was verified and stored.
    Stored(BlobDescriptor),
    /// A record under the claimed digest already existed; nothing was
    /// written and the payload was discarded unread by the backend.
    AlreadyPresent(Digest),
}

impl IngestOutcome {
    pub fn descriptor(&self) -> Option<&BlobDescriptor> {
        match self {
            IngestOutcome::Stored(desc) => Some(desc),
            IngestOutcome::AlreadyPresent(_) => None,
        }
    }

    pub fn into_descriptor(self) -> Option<BlobDescriptor> {
        match self {
            IngestOutcome::Stored(desc) => Some(desc),
            IngestOutcome::AlreadyPresent(_) => None,
        }
    }

    pub fn digest(&self) -> &Digest {
        match self {
            IngestOutcome::Stored(desc) => &desc.digest,
            IngestOutcome::AlreadyPresent(digest) => digest,
        }
    }
}

/// Ingest with the default [`IngestConfig`].
pub fn ingest(
    ctx: &Context,
    deps: &Dependencies,
    incoming: IncomingBlob,
) -> IngestResult<IngestOutcome> {
    ingest_with_config(ctx, deps, &IngestConfig::default(), incoming)
}

/// Stream `incoming` into the configured backend, verifying its digest.
///
/// The payload is read once, tee'd through a content sniffer, a SHA-256
/// accumulator and the backend sink. If the computed digest differs from
/// the claim, the record just written is deleted and
/// [`IngestError::IntegrityMismatch`] is returned.
///
/// The caller is responsible for checking that the claimed digest is not
/// already known before calling; if the backend already holds it, this
/// returns [`IngestOutcome::AlreadyPresent`] without writing anything.
pub fn ingest_with_config(
    ctx: &Context,
    deps: &Dependencies,
    config: &IngestConfig,
    incoming: IncomingBlob,
) -> IngestResult<IngestOutcome> {
    let IncomingBlob {
        claimed,
        checksum,
        mut data,
    } = incoming;
    let span = info_span!(
        "ingest",
        backend = deps.storage.backend_name(),
        claimed = %claimed,
        checksum = %checksum
    );
    let _enter = span.enter();

    info!("uploading");

    if let Err(e) = config.validate() {
        error!(error = %e, "invalid ingest configuration");
        drain(&mut data);
        return Err(IngestError::Config { claimed, source: e });
    }

    if let Err(e) = ctx.check() {
        error!(error = %e, "context done before upload started");
        drain(&mut data);
        return Err(IngestError::Interrupted {
            claimed,
            copied: 0,
            source: e,
        });
    }

    let mut sink = match deps.storage.begin_upload(ctx, &claimed, checksum) {
        Ok(UploadSlot::Created(sink)) => sink,
        Ok(UploadSlot::AlreadyExists) => {
            debug!("blob already stored, skipping");
            drain(&mut data);
            return Ok(IngestOutcome::AlreadyPresent(claimed));
        }
        Err(e) => {
            error!(error = %e, "error starting upload to storage");
            drain(&mut data);
            return Err(IngestError::Setup { claimed, source: e });
        }
    };

    let mut sniffer = MagicSniffer::new(config.sniff_window, &config.recognized);
    let mut hasher = DigestWriter::new();

    debug!("starting upload");
    let copied = {
        let mut fan_out = FanOut::new(vec![
            &mut sniffer as &mut dyn Write,
            &mut hasher as &mut dyn Write,
            &mut sink as &mut dyn Write,
        ]);
        pump(ctx, &mut data, &mut fan_out, config.copy_buffer_size)
    };
    let size = match copied {
        Ok(size) => size,
        Err((copied, failure)) => {
            // Release the reservation first; draining may take a while.
            drop(sink);
            drain(&mut data);
            return Err(match failure {
                CopyFailure::Interrupted(e) => {
                    error!(copied, error = %e, "upload interrupted");
                    IngestError::Interrupted {
                        claimed,
                        copied,
                        source: e,
                    }
                }
                CopyFailure::Io(side, e) => {
                    error!(copied, %side, error = %e, "error during upload");
                    IngestError::Transfer {
                        claimed,
                        side,
                        copied,
                        source: e,
                    }
                }
            });
        }
    };
    drop(data);

    let content_type = sniffer.finish();
    if let Err(e) = sink.finish(ctx) {
        error!(error = %e, "error finalizing blob storage");
        return Err(IngestError::Finalize { claimed, source: e });
    }
    debug!(size, "upload written");

    let computed = hasher.finalize();
    if computed != claimed {
        debug!(computed = %computed, "payload did not match claimed digest, deleting");
        if let Err(e) = deps.storage.delete(ctx, &claimed) {
            error!(computed = %computed, error = %e, "error deleting payload that did not match digest");
            return Err(IngestError::Cleanup {
                claimed,
                computed,
                source: e,
            });
        }
        debug!("deleted payload that did not match digest");
        return Err(IngestError::IntegrityMismatch { claimed, computed });
    }

    info!(size, content_type = ?content_type, "completed upload");
    Ok(IngestOutcome::Stored(BlobDescriptor {
        digest: computed,
        size,
        content_type,
    }))
}

enum CopyFailure {
    Io(TransferSide, io::Error),
    Interrupted(ContextError),
}

/// Copy `src` into `dst` in `buf_size` steps, checking `ctx` before each
/// write. On failure, returns the bytes copied so far with the cause.
fn pump(
    ctx: &Context,
    src: &mut dyn Read,
    dst: &mut FanOut<'_>,
    buf_size: usize,
) -> Result<u64, (u64, CopyFailure)> {
    let mut buf = vec![0u8; buf_size.max(1)];
    let mut copied = 0u64;
    loop {
        let n = match src.read(&mut buf) {
            Ok(0) => return Ok(copied),
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err((copied, CopyFailure::Io(TransferSide::Source, e))),
        };
        if let Err(e) = ctx.check() {
            return Err((copied, CopyFailure::Interrupted(e)));
        }
        if let Err(e) = dst.write_all(&buf[..n]) {
            return Err((copied, CopyFailure::Io(TransferSide::Sink, e)));
        }
        copied += n as u64;
    }
}

/// Read whatever is left so the producer is never left blocked. Errors are
/// ignored: the stream is being abandoned either way.
fn drain(data: &mut dyn Read) {
    let _ = io::copy(data, &mut io::sink());
}
