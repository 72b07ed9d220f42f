use std::path::{Path, PathBuf};

use anyhow::Context as _;
use blobs_ingest::IngestConfig;
use blobs_store::StoreConfig;
use serde::{Deserialize, Serialize};

/// Everything the `blobs` binary can be configured with.
///
/// ```toml
/// [store]
/// backend = "filesystem"
/// root = "/srv/blobs"
///
/// [ingest]
/// copy_buffer_size = 131072
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    pub store: StoreConfig,
    pub ingest: IngestConfig,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            store: StoreConfig::Filesystem {
                root: PathBuf::from("blobs"),
                public_base_url: None,
            },
            ingest: IngestConfig::default(),
        }
    }
}

impl CliConfig {
    /// Read `path` if given, then apply command-line overrides.
    pub fn load(path: Option<&Path>, root: Option<&Path>) -> anyhow::Result<Self> {
        let mut config: Self = match path {
            Some(path) => {
                let text = std::fs::read_to_string(path)
                    .with_context(|| format!("reading config {}", path.display()))?;
                toml::from_str(&text)
                    .with_context(|| format!("parsing config {}", path.display()))?
            }
            None => Self::default(),
        };
        if let Some(root) = root {
            let public_base_url = match config.store {
                StoreConfig::Filesystem { public_base_url, .. } => public_base_url,
                StoreConfig::Memory { .. } => None,
            };
            config.store = StoreConfig::Filesystem {
                root: root.to_path_buf(),
                public_base_url,
            };
        }
        config.store.validate()?;
        config.ingest.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_local_filesystem() {
        let config = CliConfig::load(None, None).unwrap();
        assert_eq!(
            config.store,
            StoreConfig::Filesystem {
                root: "blobs".into(),
                public_base_url: None
            }
        );
    }

    #[test]
    fn root_override_keeps_public_url() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blobs.toml");
        std::fs::write(
            &path,
            "[store]\nbackend = \"filesystem\"\nroot = \"/srv/blobs\"\npublic_base_url = \"https://cdn.example.com\"\n",
        )
        .unwrap();
        let config = CliConfig::load(Some(&path), Some(Path::new("/tmp/other"))).unwrap();
        assert_eq!(
            config.store,
            StoreConfig::Filesystem {
                root: "/tmp/other".into(),
                public_base_url: Some("https://cdn.example.com".into()),
            }
        );
    }

    #[test]
    fn ingest_table_is_optional() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blobs.toml");
        std::fs::write(&path, "[store]\nbackend = \"memory\"\n").unwrap();
        let config = CliConfig::load(Some(&path), None).unwrap();
        assert_eq!(config.ingest, IngestConfig::default());
    }

    #[test]
    fn invalid_ingest_settings_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blobs.toml");
        std::fs::write(&path, "[ingest]\ncopy_buffer_size = 0\n").unwrap();
        assert!(CliConfig::load(Some(&path), None).is_err());

        std::fs::write(&path, "[ingest]\nsniff_window = 9223372036854775807\n").unwrap();
        let err = CliConfig::load(Some(&path), None).unwrap_err();
        assert!(err.downcast_ref::<blobs_ingest::ConfigError>().is_some());
    }

    #[test]
    fn missing_file_is_an_error() {
        assert!(CliConfig::load(Some(Path::new("/nonexistent/blobs.toml")), None).is_err());
    }

    #[test]
    fn round_trips_through_toml() {
        let config = CliConfig::default();
        let text = toml::to_string(&config).unwrap();
        let back: CliConfig = toml::from_str(&text).unwrap();
        assert_eq!(back, config);
    }
}
