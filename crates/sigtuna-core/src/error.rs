#![forbid(unsafe_code)]

//! Error taxonomy for reference resolution and verification.
//!
//! Each failure family gets its own enum so that "could not check"
//! (a hard error) and "checked and it does not match" (a plain `false`
//! verification result) can never be confused by a caller. Digest
//! mismatches are NOT represented here at all.

/// Failures converting a content handle between representations.
#[derive(Debug, thiserror::Error)]
pub enum ContentError {
    #[error("content handle has no input")]
    NoInput,

    #[error("content handle holds no node-set and expansion was not requested")]
    NoNodeSet,

    #[error("XML parsing error: {0}")]
    XmlParse(String),

    #[error("canonicalization error: {0}")]
    Canonicalization(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failures resolving a reference URI to content.
#[derive(Debug, thiserror::Error)]
pub enum ResolverError {
    /// No registered resolver claimed the URI. The single most common
    /// verification failure; callers must be able to tell it apart from a
    /// digest mismatch.
    #[error("no resolver found for URI {uri:?}")]
    NoResolverFound { uri: Option<String> },

    #[error("I/O failure resolving {uri:?}: {source}")]
    IoFailure {
        uri: Option<String>,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed resolution target {uri:?}: {reason}")]
    MalformedTarget { uri: Option<String>, reason: String },
}

/// Failures applying a transform chain.
#[derive(Debug, thiserror::Error)]
pub enum TransformError {
    #[error("unknown transform algorithm: {0}")]
    UnknownAlgorithm(String),

    #[error("malformed parameters for transform {uri}: {reason}")]
    MalformedParameters { uri: String, reason: String },

    #[error(transparent)]
    Content(#[from] ContentError),
}

/// Failures computing or retrieving a reference digest.
#[derive(Debug, thiserror::Error)]
pub enum SignatureError {
    /// The reference URI could not be dereferenced to content.
    #[error("reference could not be dereferenced: {0}")]
    ReferenceNotInitialized(#[from] ResolverError),

    #[error(transparent)]
    Transform(#[from] TransformError),

    #[error(transparent)]
    Content(#[from] ContentError),

    /// A parsed Reference lacks a DigestValue child. Structural; always
    /// fatal for that reference.
    #[error("reference has no DigestValue")]
    MissingDigestElement,

    #[error("unknown digest algorithm: {0}")]
    UnknownDigestAlgorithm(String),

    #[error("invalid XML structure: {0}")]
    Structure(String),

    #[error("base64 decode error: {0}")]
    Base64(String),

    /// Mutation or digest generation attempted on a reference that is no
    /// longer in build mode.
    #[error("reference is frozen; operation requires build mode")]
    NotBuilding,
}

/// Failures of a whole-manifest verify call.
///
/// A digest mismatch is never one of these: it is recorded as `false` in
/// the per-reference results and verification continues.
#[derive(Debug, thiserror::Error)]
pub enum ManifestVerifyError {
    /// Raised before any reference processing.
    #[error("manifest contains no references")]
    EmptyManifest,

    /// Verification of one reference could not be *attempted*, a harder
    /// failure than a digest mismatch. Aborts the whole verify call.
    #[error("reference {index} ({uri:?}) could not be checked: {source}")]
    MissingResourceFailure {
        index: usize,
        uri: Option<String>,
        #[source]
        source: SignatureError,
    },

    #[error("reference index {index} out of range ({len} references)")]
    IndexOutOfRange { index: usize, len: usize },

    #[error(transparent)]
    Signature(#[from] SignatureError),
}
