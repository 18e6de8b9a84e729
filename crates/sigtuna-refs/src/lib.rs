#![forbid(unsafe_code)]

//! Reference resolution and verification for XML-Signature structures.
//!
//! A [`Manifest`] is an ordered collection of [`Reference`]s. Each
//! reference binds a URI, an optional transform chain and a digest
//! algorithm/value. Verification dereferences the URI through the
//! resolver chain, runs the transforms, digests the result and compares
//! it to the stored value, recursively for references that point at
//! nested Manifest structures.
//!
//! A digest mismatch is a `false` verification result. Failure to even
//! attempt the check (no resolver, I/O error, malformed structure)
//! surfaces as an error carrying the offending reference's index and URI.

pub mod context;
pub mod manifest;
pub mod reference;
pub mod resolver;
pub mod source;

pub use crate::context::{Env, VerifyContext};
pub use crate::manifest::Manifest;
pub use crate::reference::{RefState, Reference};
pub use crate::resolver::{
    FileResolver, FragmentResolver, Properties, Resolver, ResolverChain, UrlMapResolver,
    WholeDocumentResolver,
};
pub use crate::source::DocumentSource;
