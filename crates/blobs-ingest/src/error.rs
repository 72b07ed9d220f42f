use std::fmt;

use blobs_store::StoreError;
use blobs_types::{ContextError, Digest};
use thiserror::Error;

use crate::config::ConfigError;

/// Which end of the copy failed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransferSide {
    /// Reading the incoming byte stream.
    Source,
    /// Writing into the backend sink.
    Sink,
}

impl fmt::Display for TransferSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransferSide::Source => f.write_str("reading source"),
            TransferSide::Sink => f.write_str("writing sink"),
        }
    }
}

/// Errors from the ingest pipeline. Every variant names the claimed digest.
#[derive(Debug, Error)]
pub enum IngestError {
    /// The pipeline settings were rejected before the backend was touched.
    #[error("refusing upload of {claimed}: {source}")]
    Config {
        claimed: Digest,
        #[source]
        source: ConfigError,
    },

    /// The backend could not hand out a sink.
    #[error("could not start upload of {claimed}: {source}")]
    Setup {
        claimed: Digest,
        #[source]
        source: StoreError,
    },

    /// I/O failed while streaming the payload.
    #[error("transfer of {claimed} failed {side} after {copied} bytes: {source}")]
    Transfer {
        claimed: Digest,
        side: TransferSide,
        copied: u64,
        #[source]
        source: std::io::Error,
    },

    /// The sink could not be finalized.
    #[error("could not finalize upload of {claimed}: {source}")]
    Finalize {
        claimed: Digest,
        #[source]
        source: StoreError,
    },

    /// The payload's digest differs from the claim. The written record has
    /// been deleted.
    #[error("supplied digest {claimed} did not match payload digest {computed}")]
    IntegrityMismatch { claimed: Digest, computed: Digest },

    /// Deleting the record after a mismatch failed; the record may remain.
    #[error(
        "supplied digest {claimed} did not match payload digest {computed}, \
         and deleting the written record failed: {source}"
    )]
    Cleanup {
        claimed: Digest,
        computed: Digest,
        #[source]
        source: StoreError,
    },

    /// The caller's context stopped the copy.
    #[error("upload of {claimed} interrupted after {copied} bytes: {source}")]
    Interrupted {
        claimed: Digest,
        copied: u64,
        #[source]
        source: ContextError,
    },
}

impl IngestError {
    /// The digest the caller claimed.
    pub fn claimed(&self) -> &Digest {
        match self {
            IngestError::Config { claimed, .. }
            | IngestError::Setup { claimed, .. }
            | IngestError::Transfer { claimed, .. }
            | IngestError::Finalize { claimed, .. }
            | IngestError::IntegrityMismatch { claimed, .. }
            | IngestError::Cleanup { claimed, .. }
            | IngestError::Interrupted { claimed, .. } => claimed,
        }
    }

    /// The digest of the payload, when the whole payload was seen.
    pub fn computed(&self) -> Option<&Digest> {
        match self {
            IngestError::IntegrityMismatch { computed, .. }
            | IngestError::Cleanup { computed, .. } => Some(computed),
            _ => None,
        }
    }

    /// True when the payload itself was wrong, whether or not cleanup worked.
    pub fn is_integrity_mismatch(&self) -> bool {
        matches!(
            self,
            IngestError::IntegrityMismatch { .. } | IngestError::Cleanup { .. }
        )
    }

    /// True when repeating the same upload may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, IngestError::Transfer { .. })
    }
}

/// Result alias for ingest operations.
pub type IngestResult<T> = Result<T, IngestError>;
