//! Magic-number content type detection.

use std::io::{self, Write};

use blobs_types::ContentType;

/// Smallest window that can hold every signature in [`signature_matches`].
pub const MIN_SNIFF_WINDOW: usize = 12;

/// Largest window the sniffer will buffer.
pub const MAX_SNIFF_WINDOW: usize = 64 * 1024;

/// Sniffs the content type of a stream from its leading bytes.
///
/// Accepts every byte written to it but only keeps the first `window` bytes.
/// The decision is made in [`finish`](MagicSniffer::finish) and only types
/// in the recognized set can be reported.
#[derive(Clone, Debug)]
pub struct MagicSniffer {
    window: usize,
    recognized: Vec<ContentType>,
    head: Vec<u8>,
}

impl MagicSniffer {
    pub fn new(window: usize, recognized: &[ContentType]) -> Self {
        let window = window.clamp(MIN_SNIFF_WINDOW, MAX_SNIFF_WINDOW);
        Self {
            window,
            recognized: recognized.to_vec(),
            head: Vec::with_capacity(window),
        }
    }

    /// The leading bytes captured so far.
    pub fn head(&self) -> &[u8] {
        &self.head
    }

    /// Best match among the recognized types, or `None` for unknown content.
    pub fn finish(self) -> Option<ContentType> {
        self.recognized
            .iter()
            .copied()
            .find(|ct| signature_matches(*ct, &self.head))
    }
}

impl Default for MagicSniffer {
    fn default() -> Self {
        Self::new(512, &ContentType::ALL)
    }
}

impl Write for MagicSniffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let room = self.window.saturating_sub(self.head.len());
        self.head.extend_from_slice(&buf[..room.min(buf.len())]);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

fn signature_matches(ct: ContentType, head: &[u8]) -> bool {
    match ct {
        ContentType::Gif => head.starts_with(b"GIF87a") || head.starts_with(b"GIF89a"),
        ContentType::Jpeg => head.starts_with(&[0xFF, 0xD8, 0xFF]),
        ContentType::Png => head.starts_with(&[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A]),
        ContentType::Webp => head.len() >= 12 && &head[..4] == b"RIFF" && &head[8..12] == b"WEBP",
    }
}
