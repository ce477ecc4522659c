//! Synthetic upload payloads
//!
//! Produces a fixed-size blob of pseudo-random bytes tagged as a file part for
//! multipart submission. A payload is created fresh for every attempt and
//! dropped when the attempt ends.

use bytes::Bytes;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Default payload size (5 MiB)
pub const DEFAULT_PAYLOAD_SIZE_MB: f64 = 5.0;

/// File name attached to the multipart part
pub const PAYLOAD_FILE_NAME: &str = "test-file.bin";

/// Content type attached to the multipart part
pub const PAYLOAD_CONTENT_TYPE: &str = "application/octet-stream";

/// Multipart field name carrying the payload
pub const PAYLOAD_FIELD_NAME: &str = "file";

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Immutable binary payload for a single upload attempt
#[derive(Debug, Clone)]
pub struct Payload {
    data: Bytes,
}

impl Payload {
    /// Wrap existing bytes as a payload
    pub fn from_bytes(data: impl Into<Bytes>) -> Self {
        Self { data: data.into() }
    }

    /// Payload contents
    pub fn bytes(&self) -> &Bytes {
        &self.data
    }

    /// Size in bytes
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn file_name(&self) -> &'static str {
        PAYLOAD_FILE_NAME
    }

    pub fn content_type(&self) -> &'static str {
        PAYLOAD_CONTENT_TYPE
    }

    /// Consume the payload, yielding its buffer
    pub fn into_bytes(self) -> Bytes {
        self.data
    }
}

/// Number of bytes a payload of `size_mb` MiB occupies.
///
/// Fractional sizes truncate to whole bytes. Non-positive or non-finite sizes
/// yield zero.
pub fn payload_len(size_mb: f64) -> usize {
    (size_mb * BYTES_PER_MB) as usize
}

/// Generates payloads of a fixed size
///
/// No bound checking is done on the size: very large values will try to
/// allocate the whole buffer up front.
#[derive(Debug, Clone)]
pub struct PayloadGenerator {
    size_mb: f64,
    seed: Option<u64>,
}

impl Default for PayloadGenerator {
    fn default() -> Self {
        Self::new(DEFAULT_PAYLOAD_SIZE_MB)
    }
}

impl PayloadGenerator {
    /// Create a generator for payloads of `size_mb` MiB
    pub fn new(size_mb: f64) -> Self {
        Self {
            size_mb,
            seed: None,
        }
    }

    /// Draw bytes from a seeded generator so payload contents are reproducible
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn size_mb(&self) -> f64 {
        self.size_mb
    }

    pub fn seed(&self) -> Option<u64> {
        self.seed
    }

    /// Produce a fresh payload
    pub fn generate(&self) -> Payload {
        let mut data = vec![0u8; payload_len(self.size_mb)];

        match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed).fill(&mut data[..]),
            None => rand::thread_rng().fill(&mut data[..]),
        }

        tracing::debug!(
            "Generated {} byte payload (seeded: {})",
            data.len(),
            self.seed.is_some()
        );

        Payload::from_bytes(data)
    }
}

/// Produce an unseeded payload of `size_mb` MiB
pub fn generate(size_mb: f64) -> Payload {
    PayloadGenerator::new(size_mb).generate()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_exact_size() {
        for size_mb in [0.25, 1.0, 2.0] {
            let payload = generate(size_mb);
            assert_eq!(payload.len(), (size_mb * 1024.0 * 1024.0) as usize);
        }
    }

    #[test]
    fn test_default_size_is_five_mib() {
        let payload = PayloadGenerator::default().generate();
        assert_eq!(payload.len(), 5 * 1024 * 1024);
    }

    #[test]
    fn test_fractional_size_truncates() {
        // 0.1 MiB = 104857.6 bytes
        assert_eq!(payload_len(0.1), 104_857);
        assert_eq!(generate(0.1).len(), 104_857);
    }

    #[test]
    fn test_non_positive_size_is_empty() {
        assert_eq!(payload_len(0.0), 0);
        assert_eq!(payload_len(-3.0), 0);
        assert!(generate(0.0).is_empty());
    }

    #[test]
    fn test_seeded_payloads_are_reproducible() {
        let a = PayloadGenerator::new(0.5).with_seed(42).generate();
        let b = PayloadGenerator::new(0.5).with_seed(42).generate();
        let c = PayloadGenerator::new(0.5).with_seed(43).generate();

        assert_eq!(a.bytes(), b.bytes());
        assert_ne!(a.bytes(), c.bytes());
    }

    #[test]
    fn test_bytes_are_spread_across_range() {
        let payload = PayloadGenerator::new(1.0).with_seed(7).generate();
        let mut seen = [false; 256];
        for byte in payload.bytes().iter() {
            seen[*byte as usize] = true;
        }
        assert!(seen.iter().all(|s| *s));
    }

    #[test]
    fn test_part_metadata() {
        let payload = generate(0.01);
        assert_eq!(payload.file_name(), "test-file.bin");
        assert_eq!(payload.content_type(), "application/octet-stream");
    }
}
