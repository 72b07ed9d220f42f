use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::digest::Digest;
use crate::error::TypeError;

/// Content types the sniffer can recognize.
///
/// Anything outside this set is "unknown" and carried as `None` on a
/// [`BlobDescriptor`]; it is never an error.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum ContentType {
    Gif,
    Jpeg,
    Png,
    Webp,
}

impl ContentType {
    /// Every recognized type, in sniffing priority order.
    pub const ALL: [ContentType; 4] = [
        ContentType::Gif,
        ContentType::Jpeg,
        ContentType::Png,
        ContentType::Webp,
    ];

    /// The MIME string for this type.
    pub fn mime(&self) -> &'static str {
        match self {
            ContentType::Gif => "image/gif",
            ContentType::Jpeg => "image/jpeg",
            ContentType::Png => "image/png",
            ContentType::Webp => "image/webp",
        }
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mime())
    }
}

impl FromStr for ContentType {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "image/gif" => Ok(ContentType::Gif),
            "image/jpeg" | "image/jpg" => Ok(ContentType::Jpeg),
            "image/png" => Ok(ContentType::Png),
            "image/webp" => Ok(ContentType::Webp),
            _ => Err(TypeError::UnknownContentType(s.to_string())),
        }
    }
}

impl From<ContentType> for String {
    fn from(ct: ContentType) -> Self {
        ct.mime().to_string()
    }
}

impl TryFrom<String> for ContentType {
    type Error = TypeError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

/// Metadata describing a stored blob. It does not hold the bytes.
///
/// Only a successful ingest produces one. The digest is the one computed from
/// the bytes that were actually stored, never a caller's claim.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlobDescriptor {
    pub digest: Digest,
    pub size: u64,
    pub content_type: Option<ContentType>,
}

impl BlobDescriptor {
    /// MIME string of the content type, if one was recognized.
    pub fn mime(&self) -> Option<&'static str> {
        self.content_type.map(|ct| ct.mime())
    }
}
