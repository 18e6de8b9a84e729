#![forbid(unsafe_code)]

//! Shared foundation for the Sigtuna XML-DSig reference-processing library:
//! error taxonomy, algorithm URI constants, and namespace constants.

pub mod algorithm;
pub mod error;
pub mod ns;

pub use error::{
    ContentError, ManifestVerifyError, ResolverError, SignatureError, TransformError,
};
