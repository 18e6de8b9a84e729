#![forbid(unsafe_code)]

//! Digest (hash) primitives for the Sigtuna library.
//!
//! Reference digesting consumes these through the streaming
//! [`DigestAlgorithm`] contract; implementations are looked up in an
//! explicit [`DigestRegistry`] keyed by algorithm URI.

pub mod digest;
pub mod registry;

pub use crate::digest::{DigestAlgorithm, DigestWriter};
pub use crate::registry::DigestRegistry;
