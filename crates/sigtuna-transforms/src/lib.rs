#![forbid(unsafe_code)]

//! Content representation and the transform pipeline for the Sigtuna
//! library.
//!
//! A [`ContentHandle`] carries referenced content through the transform
//! chain in whichever representation the producing step left it in; the
//! [`TransformPipeline`] applies the ordered transform steps of one
//! `Reference` and hands the terminal form to the digest layer.

pub mod base64_transform;
pub mod content;
pub mod pipeline;
pub mod registry;

pub use crate::content::{ContentHandle, DomNodes, Subtree};
pub use crate::pipeline::{
    CanonicalizeStep, NodeFilterStep, OpaqueTransform, TransformPipeline, TransformStep,
};
pub use crate::registry::TransformRegistry;
pub use sigtuna_c14n::C14nMode;
