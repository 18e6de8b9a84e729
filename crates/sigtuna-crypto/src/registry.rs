#![forbid(unsafe_code)]

//! The algorithm-URI → digest implementation registry.
//!
//! An explicit registry object rather than process-wide state: callers
//! construct one (usually via `Default`), optionally register extra
//! algorithms, and pass it into verification contexts.

use crate::digest::{self, DigestAlgorithm};
use sigtuna_core::{algorithm, SignatureError};
use std::collections::HashMap;

type Factory = fn() -> Box<dyn DigestAlgorithm>;

/// Maps digest algorithm URIs to constructors.
pub struct DigestRegistry {
    factories: HashMap<String, Factory>,
}

impl DigestRegistry {
    /// An empty registry with no algorithms.
    pub fn empty() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// A registry populated with the standard SHA-1/SHA-2/SHA-3 set.
    pub fn with_defaults() -> Self {
        let mut r = Self::empty();
        r.register(algorithm::SHA1, || Box::new(digest::Sha1Digest::new()));
        r.register(algorithm::SHA224, || Box::new(digest::Sha224Digest::new()));
        r.register(algorithm::SHA256, || Box::new(digest::Sha256Digest::new()));
        r.register(algorithm::SHA384, || Box::new(digest::Sha384Digest::new()));
        r.register(algorithm::SHA512, || Box::new(digest::Sha512Digest::new()));
        r.register(algorithm::SHA3_224, || {
            Box::new(digest::Sha3_224Digest::new())
        });
        r.register(algorithm::SHA3_256, || {
            Box::new(digest::Sha3_256Digest::new())
        });
        r.register(algorithm::SHA3_384, || {
            Box::new(digest::Sha3_384Digest::new())
        });
        r.register(algorithm::SHA3_512, || {
            Box::new(digest::Sha3_512Digest::new())
        });
        r
    }

    /// Register (or replace) a constructor for an algorithm URI.
    pub fn register(&mut self, uri: &str, factory: Factory) {
        self.factories.insert(uri.to_owned(), factory);
    }

    /// Create a fresh hasher for the given algorithm URI.
    pub fn create(&self, uri: &str) -> Result<Box<dyn DigestAlgorithm>, SignatureError> {
        self.factories
            .get(uri)
            .map(|f| f())
            .ok_or_else(|| SignatureError::UnknownDigestAlgorithm(uri.to_owned()))
    }

    /// Check whether an algorithm URI is registered.
    pub fn supports(&self, uri: &str) -> bool {
        self.factories.contains_key(uri)
    }

    /// Compute a digest in one shot.
    pub fn digest(&self, uri: &str, data: &[u8]) -> Result<Vec<u8>, SignatureError> {
        let mut hasher = self.create(uri)?;
        hasher.update(data);
        Ok(hasher.finish())
    }
}

impl Default for DigestRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_cover_sha2() {
        let r = DigestRegistry::with_defaults();
        assert!(r.supports(algorithm::SHA256));
        assert_eq!(r.digest(algorithm::SHA256, b"hello").unwrap().len(), 32);
    }

    #[test]
    fn unknown_uri_is_an_error() {
        let r = DigestRegistry::with_defaults();
        let err = r.create("urn:example:not-a-hash").unwrap_err();
        assert!(matches!(err, SignatureError::UnknownDigestAlgorithm(_)));
    }

    #[test]
    fn empty_registry_supports_nothing() {
        assert!(!DigestRegistry::empty().supports(algorithm::SHA1));
    }
}
