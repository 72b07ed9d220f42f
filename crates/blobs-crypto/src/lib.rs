//! Cryptographic primitives for blob storage.
//!
//! Wraps `sha2` so the rest of the workspace accumulates digests through
//! `std::io::Write` without ever holding a whole blob in memory. No custom
//! cryptography.

pub mod hasher;

pub use hasher::DigestWriter;
