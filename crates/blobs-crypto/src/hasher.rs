use std::io::{self, Write};

use blobs_types::Digest;
use sha2::{Digest as _, Sha256};

/// Incremental SHA-256 accumulator.
///
/// Implements [`Write`] so it can sit in a fan-out next to a storage sink.
/// Writes never fail and always consume the whole buffer.
#[derive(Clone, Default)]
pub struct DigestWriter {
    hasher: Sha256,
    written: u64,
}

impl DigestWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed bytes into the digest.
    pub fn update(&mut self, data: &[u8]) {
        self.hasher.update(data);
        self.written += data.len() as u64;
    }

    /// Bytes consumed so far.
    pub fn bytes_written(&self) -> u64 {
        self.written
    }

    /// Consume the accumulator and produce the digest.
    pub fn finalize(self) -> Digest {
        Digest::from_hash(self.hasher.finalize().into())
    }

    /// Check a complete in-memory payload against an expected digest.
    pub fn verify(data: &[u8], expected: &Digest) -> bool {
        Digest::of(data) == *expected
    }
}

impl Write for DigestWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.update(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl std::fmt::Debug for DigestWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DigestWriter")
            .field("written", &self.written)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn empty_stream_digest() {
        let w = DigestWriter::new();
        assert_eq!(w.bytes_written(), 0);
        assert_eq!(w.finalize(), Digest::of(b""));
    }

    #[test]
    fn io_copy_into_writer() {
        let data = vec![7u8; 200_000];
        let mut w = DigestWriter::new();
        let n = io::copy(&mut data.as_slice(), &mut w).unwrap();
        assert_eq!(n, 200_000);
        assert_eq!(w.bytes_written(), 200_000);
        assert_eq!(w.finalize(), Digest::of(&data));
    }

    #[test]
    fn verify_detects_tampering() {
        let id = Digest::of(b"original");
        assert!(DigestWriter::verify(b"original", &id));
        assert!(!DigestWriter::verify(b"tampered", &id));
    }

    proptest! {
        #[test]
        fn chunking_does_not_change_digest(
            data in proptest::collection::vec(any::<u8>(), 0..4096),
            split in 0usize..4096,
        ) {
            let split = split.min(data.len());
            let mut w = DigestWriter::new();
            w.write_all(&data[..split]).unwrap();
            w.write_all(&data[split..]).unwrap();
            prop_assert_eq!(w.finalize(), Digest::of(&data));
        }
    }
}
