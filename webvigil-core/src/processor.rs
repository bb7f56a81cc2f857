//! Fingerprinting of fetched content.

use chrono::Utc;
use sha2::{Digest, Sha256};
use tracing::debug;
use webvigil_model::MonitoredUpdate;

/// Lowercase-hex SHA-256 of `bytes`.
pub fn hash_bytes(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Packages fetched bytes into a hashed [`MonitoredUpdate`]. Infallible.
#[derive(Clone, Copy, Debug, Default)]
pub struct ContentProcessor;

impl ContentProcessor {
    pub fn new() -> Self {
        Self
    }

    /// Hash `bytes` and stamp the fetch time. Empty bodies hash to the
    /// digest of zero-length input.
    pub fn process(&self, url: &str, bytes: &[u8], content_type: &str) -> MonitoredUpdate {
        if bytes.is_empty() {
            debug!(url, "hashing empty response body");
        }
        MonitoredUpdate {
            url: url.to_string(),
            hash: hash_bytes(bytes),
            content_type: content_type.to_string(),
            fetched_at: Utc::now(),
            content: bytes.to_vec(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EMPTY_SHA256: &str = "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";
    const ABC_SHA256: &str = "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad";

    #[test]
    fn hashes_are_lowercase_hex() {
        assert_eq!(hash_bytes(b"abc"), ABC_SHA256);
    }

    #[test]
    fn empty_bytes_hash_to_empty_digest() {
        let update = ContentProcessor::new().process("https://a.example/x", b"", "text/html");
        assert_eq!(update.hash, EMPTY_SHA256);
        assert!(update.content.is_empty());
    }

    #[test]
    fn update_captures_inputs() {
        let update = ContentProcessor::new().process(
            "https://a.example/app.js",
            b"console.log(1)",
            "application/javascript",
        );
        assert_eq!(update.url, "https://a.example/app.js");
        assert_eq!(update.content_type, "application/javascript");
        assert_eq!(update.content, b"console.log(1)");
        assert_eq!(update.hash.len(), 64);
    }
}
