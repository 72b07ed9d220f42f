use std::fmt;
use std::sync::Arc;

use blobs_store::{BlobStore, StoreConfig, StoreResult};

/// Long-lived collaborators every ingest call needs.
///
/// Built once per process (or per test) and passed explicitly to each call.
#[derive(Clone)]
pub struct Dependencies {
    pub storage: Arc<dyn BlobStore>,
}

impl Dependencies {
    pub fn new(storage: Arc<dyn BlobStore>) -> Self {
        Self { storage }
    }

    /// Open the configured backend.
    pub fn from_config(config: &StoreConfig) -> StoreResult<Self> {
        Ok(Self::new(config.open()?))
    }
}

impl fmt::Debug for Dependencies {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dependencies")
            .field("storage", &self.storage.backend_name())
            .finish()
    }
}
