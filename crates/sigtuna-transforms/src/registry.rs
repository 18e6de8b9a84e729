#![forbid(unsafe_code)]

//! The algorithm-URI → opaque transform registry.
//!
//! Populated by explicit registration at construction time; there is no
//! process-wide registry.

use crate::base64_transform::Base64DecodeTransform;
use crate::pipeline::OpaqueTransform;
use std::collections::HashMap;
use std::rc::Rc;

/// Maps transform algorithm URIs to implementations.
pub struct TransformRegistry {
    transforms: HashMap<String, Rc<dyn OpaqueTransform>>,
}

impl TransformRegistry {
    /// An empty registry.
    pub fn empty() -> Self {
        Self {
            transforms: HashMap::new(),
        }
    }

    /// A registry with the standard opaque transforms (base64 decode).
    pub fn with_defaults() -> Self {
        let mut r = Self::empty();
        r.register(Rc::new(Base64DecodeTransform));
        r
    }

    /// Register (or replace) a transform under its own URI.
    pub fn register(&mut self, transform: Rc<dyn OpaqueTransform>) {
        self.transforms
            .insert(transform.uri().to_owned(), transform);
    }

    /// Look up a transform by algorithm URI.
    pub fn get(&self, uri: &str) -> Option<Rc<dyn OpaqueTransform>> {
        self.transforms.get(uri).cloned()
    }
}

impl Default for TransformRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sigtuna_core::algorithm;

    #[test]
    fn defaults_include_base64() {
        let r = TransformRegistry::with_defaults();
        assert!(r.get(algorithm::BASE64).is_some());
        assert!(r.get(algorithm::XSLT).is_none());
    }
}
