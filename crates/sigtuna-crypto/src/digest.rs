#![forbid(unsafe_code)]

//! The streaming digest contract and its RustCrypto-backed implementations.

use digest::Digest;
use sigtuna_core::algorithm;

/// A streaming hash primitive, keyed by an algorithm URI.
pub trait DigestAlgorithm {
    /// Discard any buffered input and start over.
    fn reset(&mut self);
    /// Feed data into the hash.
    fn update(&mut self, data: &[u8]);
    /// Finalize and return the hash value, resetting the hasher.
    fn finish(&mut self) -> Vec<u8>;
    /// Algorithm URI.
    fn uri(&self) -> &'static str;
}

/// An `io::Write` adapter feeding a running hash, so transform pipelines
/// can stream digest input without materializing it.
pub struct DigestWriter<'a> {
    inner: &'a mut dyn DigestAlgorithm,
}

impl<'a> DigestWriter<'a> {
    pub fn new(inner: &'a mut dyn DigestAlgorithm) -> Self {
        Self { inner }
    }
}

impl std::io::Write for DigestWriter<'_> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.inner.update(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

// ── Concrete implementations ─────────────────────────────────────────

macro_rules! impl_digest {
    ($name:ident, $hasher:ty, $uri:expr) => {
        pub(crate) struct $name {
            inner: $hasher,
        }

        impl $name {
            pub(crate) fn new() -> Self {
                Self {
                    inner: <$hasher>::new(),
                }
            }
        }

        impl DigestAlgorithm for $name {
            fn reset(&mut self) {
                Digest::reset(&mut self.inner);
            }

            fn update(&mut self, data: &[u8]) {
                Digest::update(&mut self.inner, data);
            }

            fn finish(&mut self) -> Vec<u8> {
                Digest::finalize_reset(&mut self.inner).to_vec()
            }

            fn uri(&self) -> &'static str {
                $uri
            }
        }
    };
}

impl_digest!(Sha1Digest, sha1::Sha1, algorithm::SHA1);
impl_digest!(Sha224Digest, sha2::Sha224, algorithm::SHA224);
impl_digest!(Sha256Digest, sha2::Sha256, algorithm::SHA256);
impl_digest!(Sha384Digest, sha2::Sha384, algorithm::SHA384);
impl_digest!(Sha512Digest, sha2::Sha512, algorithm::SHA512);
impl_digest!(Sha3_224Digest, sha3::Sha3_224, algorithm::SHA3_224);
impl_digest!(Sha3_256Digest, sha3::Sha3_256, algorithm::SHA3_256);
impl_digest!(Sha3_384Digest, sha3::Sha3_384, algorithm::SHA3_384);
impl_digest!(Sha3_512Digest, sha3::Sha3_512, algorithm::SHA3_512);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sha256_known_answer() {
        let mut h = Sha256Digest::new();
        h.update(b"hello");
        let result = h.finish();
        assert_eq!(
            hex::encode(result),
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
    }

    #[test]
    fn finish_resets_for_reuse() {
        let mut h = Sha256Digest::new();
        h.update(b"first");
        let a = h.finish();
        h.update(b"first");
        let b = h.finish();
        assert_eq!(a, b);
    }

    #[test]
    fn streaming_matches_one_shot() {
        let mut a = Sha512Digest::new();
        a.update(b"hello ");
        a.update(b"world");
        let mut b = Sha512Digest::new();
        b.update(b"hello world");
        assert_eq!(a.finish(), b.finish());
    }

    #[test]
    fn digest_writer_feeds_hash() {
        use std::io::Write;
        let mut h = Sha1Digest::new();
        {
            let mut w = DigestWriter::new(&mut h);
            w.write_all(b"hello").unwrap();
        }
        assert_eq!(h.finish().len(), 20);
    }
}
