use blobs_types::ContentType;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::sniff::{MAX_SNIFF_WINDOW, MIN_SNIFF_WINDOW};

/// Largest accepted copy buffer.
pub const MAX_COPY_BUFFER_SIZE: usize = 16 * 1024 * 1024; // 16 MiB

/// Rejected [`IngestConfig`] settings.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("copy_buffer_size must be between 1 and {max} bytes, got {actual}")]
    CopyBufferSize { max: usize, actual: usize },

    #[error("sniff_window must be between {min} and {max} bytes, got {actual}")]
    SniffWindow {
        min: usize,
        max: usize,
        actual: usize,
    },
}

/// Tuning for the ingest pipeline.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// Bytes read from the incoming stream per copy step. The context is
    /// checked between steps.
    pub copy_buffer_size: usize,
    /// Leading bytes kept for content type sniffing.
    pub sniff_window: usize,
    /// Content types the sniffer may report.
    pub recognized: Vec<ContentType>,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            copy_buffer_size: 64 * 1024, // 64 KiB
            sniff_window: 512,
            recognized: ContentType::ALL.to_vec(),
        }
    }
}

impl IngestConfig {
    /// Check every setting is within its allowed range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=MAX_COPY_BUFFER_SIZE).contains(&self.copy_buffer_size) {
            return Err(ConfigError::CopyBufferSize {
                max: MAX_COPY_BUFFER_SIZE,
                actual: self.copy_buffer_size,
            });
        }
        if !(MIN_SNIFF_WINDOW..=MAX_SNIFF_WINDOW).contains(&self.sniff_window) {
            return Err(ConfigError::SniffWindow {
                min: MIN_SNIFF_WINDOW,
                max: MAX_SNIFF_WINDOW,
                actual: self.sniff_window,
            });
        }
        Ok(())
    }
}
