use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{StoreError, StoreResult};
use crate::filesystem::FsBlobStore;
use crate::memory::MemoryBlobStore;
use crate::traits::BlobStore;

/// Which backend to run and how to set it up.
///
/// ```toml
/// backend = "filesystem"
/// root = "/var/lib/blobs"
/// public_base_url = "https://cdn.example.com/blobs"
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "snake_case")]
pub enum StoreConfig {
    /// Transactional in-memory store; contents die with the process.
    Memory {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max_blob_size: Option<u64>,
    },
    /// One file per digest under `root`.
    Filesystem {
        root: PathBuf,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        public_base_url: Option<String>,
    },
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self::Memory {
            max_blob_size: None,
        }
    }
}

impl StoreConfig {
    /// Check the configuration without touching storage.
    pub fn validate(&self) -> StoreResult<()> {
        match self {
            StoreConfig::Memory { max_blob_size } => {
                if *max_blob_size == Some(0) {
                    return Err(StoreError::InvalidConfig(
                        "max_blob_size must be positive".into(),
                    ));
                }
            }
            StoreConfig::Filesystem {
                root,
                public_base_url,
            } => {
                if root.as_os_str().is_empty() {
                    return Err(StoreError::InvalidConfig("root must not be empty".into()));
                }
                if let Some(url) = public_base_url {
                    if !(url.starts_with("http://") || url.starts_with("https://")) {
                        return Err(StoreError::InvalidConfig(format!(
                            "public_base_url must be an http(s) URL, got {url:?}"
                        )));
                    }
                }
            }
        }
        Ok(())
    }

    /// Validate and construct the configured backend.
    pub fn open(&self) -> StoreResult<Arc<dyn BlobStore>> {
        self.validate()?;
        let store: Arc<dyn BlobStore> = match self {
            StoreConfig::Memory { max_blob_size } => {
                let store = MemoryBlobStore::new();
                Arc::new(match max_blob_size {
                    Some(max) => store.with_max_blob_size(*max),
                    None => store,
                })
            }
            StoreConfig::Filesystem {
                root,
                public_base_url,
            } => {
                let store = FsBlobStore::open(root)?;
                Arc::new(match public_base_url {
                    Some(url) => store.with_public_base_url(url.clone()),
                    None => store,
                })
            }
        };
        Ok(store)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_memory() {
        let config = StoreConfig::default();
        assert_eq!(config, StoreConfig::Memory { max_blob_size: None });
        assert_eq!(config.open().unwrap().backend_name(), "memory");
    }

    #[test]
    fn parse_filesystem_toml() {
        let config: StoreConfig = toml::from_str(
            r#"
            backend = "filesystem"
            root = "/var/lib/blobs"
            public_base_url = "https://cdn.example.com"
            "#,
        )
        .unwrap();
        assert_eq!(
            config,
            StoreConfig::Filesystem {
                root: "/var/lib/blobs".into(),
                public_base_url: Some("https://cdn.example.com".into()),
            }
        );
    }

    #[test]
    fn parse_memory_toml() {
        let config: StoreConfig = toml::from_str("backend = \"memory\"\nmax_blob_size = 1024\n").unwrap();
        assert_eq!(
            config,
            StoreConfig::Memory {
                max_blob_size: Some(1024)
            }
        );
    }

    #[test]
    fn open_filesystem() {
        let dir = tempfile::tempdir().unwrap();
        let config = StoreConfig::Filesystem {
            root: dir.path().join("store"),
            public_base_url: None,
        };
        let store = config.open().unwrap();
        assert_eq!(store.backend_name(), "filesystem");
        assert!(dir.path().join("store").is_dir());
    }

    #[test]
    fn rejects_bad_public_url() {
        let config = StoreConfig::Filesystem {
            root: "/tmp/blobs".into(),
            public_base_url: Some("ftp://example.com".into()),
        };
        assert!(matches!(
            config.validate(),
            Err(StoreError::InvalidConfig(_))
        ));
    }

    #[test]
    fn rejects_zero_size_limit() {
        let config = StoreConfig::Memory {
            max_blob_size: Some(0),
        };
        assert!(config.open().is_err());
    }
}
