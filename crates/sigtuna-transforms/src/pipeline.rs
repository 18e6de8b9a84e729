#![forbid(unsafe_code)]

//! The ordered transform chain of one Reference.
//!
//! Steps are a closed kind set: canonicalization, node filtering, and
//! opaque algorithms delegated through the [`crate::TransformRegistry`].
//! Unknown transform URIs fail at parse time rather than being skipped.

use crate::content::ContentHandle;
use crate::registry::TransformRegistry;
use sigtuna_c14n::C14nMode;
use sigtuna_core::{algorithm, ns, TransformError};
use std::io::Write;
use std::rc::Rc;

/// A canonicalization step.
#[derive(Clone)]
pub struct CanonicalizeStep {
    pub mode: C14nMode,
    /// `InclusiveNamespaces PrefixList` for exclusive C14N.
    pub inclusive_prefixes: Vec<String>,
}

/// A node-filtering step.
#[derive(Clone)]
pub enum NodeFilterStep {
    /// Remove a subtree from the node set (the enveloped-signature
    /// transform, excluding the enclosing `Signature` element).
    ExcludeSubtree { node: usize },
}

/// A transform applied by URI with no structural parameters the pipeline
/// understands.
pub trait OpaqueTransform {
    /// The algorithm URI this transform is registered under.
    fn uri(&self) -> &'static str;
    /// Execute the transform.
    fn apply(&self, input: ContentHandle) -> Result<ContentHandle, TransformError>;
}

/// One step of a transform pipeline.
#[derive(Clone)]
pub enum TransformStep {
    Canonicalize(CanonicalizeStep),
    NodeFilter(NodeFilterStep),
    Opaque(Rc<dyn OpaqueTransform>),
}

impl TransformStep {
    /// The algorithm URI of this step.
    pub fn uri(&self) -> &str {
        match self {
            Self::Canonicalize(c) => c.mode.uri(),
            Self::NodeFilter(NodeFilterStep::ExcludeSubtree { .. }) => {
                algorithm::ENVELOPED_SIGNATURE
            }
            Self::Opaque(t) => t.uri(),
        }
    }

    pub fn is_canonicalization(&self) -> bool {
        matches!(self, Self::Canonicalize(_))
    }

    /// The inclusive-namespace prefix list, for canonicalization steps
    /// that carry one.
    pub fn inclusive_prefixes(&self) -> Option<&[String]> {
        match self {
            Self::Canonicalize(c) if !c.inclusive_prefixes.is_empty() => {
                Some(&c.inclusive_prefixes)
            }
            _ => None,
        }
    }

    fn apply(&self, mut input: ContentHandle) -> Result<ContentHandle, TransformError> {
        match self {
            Self::Canonicalize(c) => {
                let dom = input.as_node_set(true)?;
                let bytes = sigtuna_c14n::canonicalize(
                    &dom.xml,
                    c.mode,
                    Some(&dom.nodes),
                    &c.inclusive_prefixes,
                )
                .map_err(TransformError::Content)?;
                Ok(ContentHandle::from_bytes(bytes))
            }
            Self::NodeFilter(NodeFilterStep::ExcludeSubtree { node }) => {
                let mut dom = input.as_node_set(true)?;
                let doc = sigtuna_xml::parse(&dom.xml)?;
                match doc.get_node(roxmltree::NodeId::from(*node)) {
                    Some(excluded) => dom.nodes.remove_subtree(excluded),
                    None => {
                        tracing::debug!(
                            node,
                            "excluded subtree not present in transformed document"
                        );
                    }
                }
                drop(doc);
                Ok(ContentHandle::from_node_set(dom.xml, dom.nodes))
            }
            Self::Opaque(t) => t.apply(input),
        }
    }
}

/// An ordered list of transform steps.
#[derive(Clone, Default)]
pub struct TransformPipeline {
    steps: Vec<TransformStep>,
}

impl TransformPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, step: TransformStep) {
        self.steps.push(step);
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn steps(&self) -> &[TransformStep] {
        &self.steps
    }

    /// Apply each step in document order; the final step's output is the
    /// pipeline's result. When `sink` is provided, the terminal canonical
    /// bytes are additionally streamed into it, which is the path digest
    /// computation uses.
    pub fn perform(
        &self,
        input: ContentHandle,
        sink: Option<&mut dyn Write>,
    ) -> Result<ContentHandle, TransformError> {
        let mut data = input;
        for step in &self.steps {
            data = step.apply(data)?;
        }
        if let Some(sink) = sink {
            data.write_to(sink).map_err(TransformError::Content)?;
        }
        Ok(data)
    }

    /// Apply only the steps before the first canonicalization step; the
    /// whole pipeline if none exists. Used for diagnostics and for
    /// parameters that only make sense prior to canonicalization.
    pub fn first_canonicalization_output(
        &self,
        input: ContentHandle,
    ) -> Result<ContentHandle, TransformError> {
        let mut data = input;
        for step in &self.steps {
            if step.is_canonicalization() {
                return Ok(data);
            }
            data = step.apply(data)?;
        }
        Ok(data)
    }

    /// Parse a `Transforms` element into a pipeline.
    ///
    /// `registry` supplies opaque transforms; a URI matched by neither the
    /// built-in kinds nor the registry is [`TransformError::UnknownAlgorithm`].
    pub fn from_element(
        transforms: roxmltree::Node<'_, '_>,
        registry: &TransformRegistry,
    ) -> Result<Self, TransformError> {
        let mut pipeline = Self::new();
        for child in transforms.children() {
            if !child.is_element()
                || child.tag_name().name() != ns::node::TRANSFORM
                || child.tag_name().namespace().unwrap_or("") != ns::DSIG
            {
                continue;
            }
            let uri = child.attribute(ns::attr::ALGORITHM).ok_or_else(|| {
                TransformError::MalformedParameters {
                    uri: String::new(),
                    reason: "Transform element has no Algorithm attribute".into(),
                }
            })?;

            if let Some(mode) = C14nMode::from_uri(uri) {
                pipeline.push(TransformStep::Canonicalize(CanonicalizeStep {
                    mode,
                    inclusive_prefixes: read_inclusive_prefixes(child),
                }));
            } else if uri == algorithm::ENVELOPED_SIGNATURE {
                let signature = enclosing_signature(child).ok_or_else(|| {
                    TransformError::MalformedParameters {
                        uri: uri.to_owned(),
                        reason: "enveloped-signature transform outside a Signature".into(),
                    }
                })?;
                pipeline.push(TransformStep::NodeFilter(NodeFilterStep::ExcludeSubtree {
                    node: signature,
                }));
            } else if let Some(transform) = registry.get(uri) {
                pipeline.push(TransformStep::Opaque(transform));
            } else {
                return Err(TransformError::UnknownAlgorithm(uri.to_owned()));
            }
        }
        Ok(pipeline)
    }
}

/// Read the `InclusiveNamespaces PrefixList` of a canonicalization-kind
/// `Transform` element.
fn read_inclusive_prefixes(node: roxmltree::Node<'_, '_>) -> Vec<String> {
    for child in node.children() {
        if child.is_element() && child.tag_name().name() == ns::node::INCLUSIVE_NAMESPACES {
            if let Some(prefix_list) = child.attribute(ns::attr::PREFIX_LIST) {
                return prefix_list
                    .split_whitespace()
                    .map(|s| s.to_owned())
                    .collect();
            }
        }
    }
    Vec::new()
}

/// The node index of the nearest ancestor `Signature` element.
fn enclosing_signature(node: roxmltree::Node<'_, '_>) -> Option<usize> {
    let mut current = node.parent();
    while let Some(n) = current {
        if n.is_element()
            && n.tag_name().name() == ns::node::SIGNATURE
            && n.tag_name().namespace().unwrap_or("") == ns::DSIG
        {
            return Some(n.id().get_usize());
        }
        current = n.parent();
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::rc::Rc;

    #[test]
    fn empty_pipeline_passes_content_through() {
        let p = TransformPipeline::new();
        let mut out = p
            .perform(ContentHandle::from_bytes(b"abc".to_vec()), None)
            .unwrap();
        assert_eq!(out.as_bytes().unwrap(), b"abc");
    }

    #[test]
    fn sink_receives_terminal_bytes() {
        let p = TransformPipeline::new();
        let mut sink = Vec::new();
        p.perform(
            ContentHandle::from_bytes(b"abc".to_vec()),
            Some(&mut sink),
        )
        .unwrap();
        assert_eq!(sink, b"abc");
    }

    #[test]
    fn canonicalize_step_normalizes_bytes() {
        let mut p = TransformPipeline::new();
        p.push(TransformStep::Canonicalize(CanonicalizeStep {
            mode: C14nMode::Inclusive,
            inclusive_prefixes: Vec::new(),
        }));
        let input = ContentHandle::from_bytes(br#"<r  b="1"   a="2"/>"#.to_vec());
        let mut out = p.perform(input, None).unwrap();
        assert_eq!(out.as_bytes().unwrap(), br#"<r a="2" b="1"></r>"#.to_vec());
    }

    #[test]
    fn first_canonicalization_output_stops_before_c14n() {
        let xml: Rc<str> = Rc::from("<r><a/></r>");
        let mut p = TransformPipeline::new();
        p.push(TransformStep::Canonicalize(CanonicalizeStep {
            mode: C14nMode::Inclusive,
            inclusive_prefixes: Vec::new(),
        }));
        let input = ContentHandle::from_subtree(xml, None, true);
        let out = p.first_canonicalization_output(input).unwrap();
        // The pre-C14N handle is still DOM-based.
        assert!(out.is_dom());
    }

    #[test]
    fn unknown_transform_uri_rejected_at_parse() {
        let xml = format!(
            r#"<ds:Transforms xmlns:ds="{}"><ds:Transform Algorithm="urn:example:bogus"/></ds:Transforms>"#,
            sigtuna_core::ns::DSIG
        );
        let doc = sigtuna_xml::parse(&xml).unwrap();
        let err =
            TransformPipeline::from_element(doc.root_element(), &TransformRegistry::with_defaults())
                .unwrap_err();
        assert!(matches!(err, TransformError::UnknownAlgorithm(_)));
    }

    #[test]
    fn parses_c14n_transform_with_prefix_list() {
        let xml = format!(
            concat!(
                r#"<ds:Transforms xmlns:ds="{dsig}">"#,
                r#"<ds:Transform Algorithm="{exc}">"#,
                r#"<ec:InclusiveNamespaces xmlns:ec="{exc}" PrefixList="a b"/>"#,
                r#"</ds:Transform></ds:Transforms>"#
            ),
            dsig = sigtuna_core::ns::DSIG,
            exc = sigtuna_core::algorithm::EXC_C14N,
        );
        let doc = sigtuna_xml::parse(&xml).unwrap();
        let p =
            TransformPipeline::from_element(doc.root_element(), &TransformRegistry::with_defaults())
                .unwrap();
        assert_eq!(p.len(), 1);
        assert_eq!(
            p.steps()[0].inclusive_prefixes(),
            Some(&["a".to_owned(), "b".to_owned()][..])
        );
    }
}
