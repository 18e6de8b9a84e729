#![forbid(unsafe_code)]

//! XML Canonicalization (C14N) for the Sigtuna library.
//!
//! Implements the four canonicalization variants this subsystem selects:
//! - Canonical XML 1.0 (with and without comments)
//! - Exclusive Canonical XML 1.0 (with and without comments)
//!
//! Output is byte-exact per the W3C rules: digests are compared
//! byte-for-byte, so any deviation here breaks verification.

pub mod emit;
mod serialize;

use sigtuna_core::{algorithm, ContentError};
use sigtuna_xml::NodeSet;

/// The canonicalization mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum C14nMode {
    /// Canonical XML 1.0
    Inclusive,
    /// Canonical XML 1.0 with comments
    InclusiveWithComments,
    /// Exclusive Canonical XML 1.0
    Exclusive,
    /// Exclusive Canonical XML 1.0 with comments
    ExclusiveWithComments,
}

impl C14nMode {
    /// Get the algorithm URI for this mode.
    pub fn uri(&self) -> &'static str {
        match self {
            Self::Inclusive => algorithm::C14N,
            Self::InclusiveWithComments => algorithm::C14N_WITH_COMMENTS,
            Self::Exclusive => algorithm::EXC_C14N,
            Self::ExclusiveWithComments => algorithm::EXC_C14N_WITH_COMMENTS,
        }
    }

    /// Parse a C14N mode from an algorithm URI.
    pub fn from_uri(uri: &str) -> Option<Self> {
        match uri {
            algorithm::C14N => Some(Self::Inclusive),
            algorithm::C14N_WITH_COMMENTS => Some(Self::InclusiveWithComments),
            algorithm::EXC_C14N => Some(Self::Exclusive),
            algorithm::EXC_C14N_WITH_COMMENTS => Some(Self::ExclusiveWithComments),
            _ => None,
        }
    }

    pub fn with_comments(&self) -> bool {
        matches!(self, Self::InclusiveWithComments | Self::ExclusiveWithComments)
    }

    pub fn is_exclusive(&self) -> bool {
        matches!(self, Self::Exclusive | Self::ExclusiveWithComments)
    }
}

/// Canonicalize XML text.
///
/// - `xml`: the raw XML text
/// - `mode`: which C14N variant to use
/// - `node_set`: optional visibility filter for document-subset
///   canonicalization
/// - `inclusive_prefixes`: for exclusive C14N, the `InclusiveNamespaces`
///   `PrefixList` (`#default` selects the default namespace)
pub fn canonicalize(
    xml: &str,
    mode: C14nMode,
    node_set: Option<&NodeSet>,
    inclusive_prefixes: &[String],
) -> Result<Vec<u8>, ContentError> {
    let doc = sigtuna_xml::parse(xml)?;
    canonicalize_doc(&doc, mode, node_set, inclusive_prefixes)
}

/// Canonicalize a pre-parsed document.
pub fn canonicalize_doc(
    doc: &roxmltree::Document<'_>,
    mode: C14nMode,
    node_set: Option<&NodeSet>,
    inclusive_prefixes: &[String],
) -> Result<Vec<u8>, ContentError> {
    serialize::Serializer::new(mode, node_set, inclusive_prefixes).run(doc)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn c14n(xml: &str) -> String {
        String::from_utf8(canonicalize(xml, C14nMode::Inclusive, None, &[])).unwrap()
    }

    fn canonicalize(
        xml: &str,
        mode: C14nMode,
        node_set: Option<&NodeSet>,
        prefixes: &[String],
    ) -> Vec<u8> {
        super::canonicalize(xml, mode, node_set, prefixes).unwrap()
    }

    #[test]
    fn attributes_sorted_and_self_closing_expanded() {
        assert_eq!(c14n(r#"<r><a b="1" a="2"/></r>"#), r#"<r><a a="2" b="1"></a></r>"#);
    }

    #[test]
    fn comments_stripped_without_comments_mode() {
        assert_eq!(c14n("<r><!--x--><a/></r>"), "<r><a></a></r>");
        let with = String::from_utf8(canonicalize(
            "<r><!--x--><a/></r>",
            C14nMode::InclusiveWithComments,
            None,
            &[],
        ))
        .unwrap();
        assert_eq!(with, "<r><!--x--><a></a></r>");
    }

    #[test]
    fn text_escaping() {
        assert_eq!(c14n("<r>a &amp; b &lt; c</r>"), "<r>a &amp; b &lt; c</r>");
    }

    #[test]
    fn namespace_declarations_sorted_default_first() {
        let out = c14n(r#"<r xmlns:b="http://b" xmlns:a="http://a" xmlns="http://d"/>"#);
        assert_eq!(
            out,
            r#"<r xmlns="http://d" xmlns:a="http://a" xmlns:b="http://b"></r>"#
        );
    }

    #[test]
    fn inherited_namespace_not_redeclared() {
        let out = c14n(r#"<r xmlns:a="http://a"><a:x><a:y/></a:x></r>"#);
        assert_eq!(out, r#"<r xmlns:a="http://a"><a:x><a:y></a:y></a:x></r>"#);
    }

    #[test]
    fn exclusive_omits_unused_namespaces() {
        let xml = r#"<r xmlns:used="http://u" xmlns:unused="http://x"><used:a/></r>"#;
        let doc = roxmltree::Document::parse(xml).unwrap();
        let a = doc.descendants().find(|n| n.tag_name().name() == "a").unwrap();
        let set = NodeSet::subtree(a, false);
        let out = String::from_utf8(canonicalize(xml, C14nMode::Exclusive, Some(&set), &[]))
            .unwrap();
        assert_eq!(out, r#"<used:a xmlns:used="http://u"></used:a>"#);
    }

    #[test]
    fn exclusive_inclusive_prefix_list_forces_rendering() {
        let xml = r#"<r xmlns:keep="http://k"><a/></r>"#;
        let doc = roxmltree::Document::parse(xml).unwrap();
        let a = doc.descendants().find(|n| n.tag_name().name() == "a").unwrap();
        let set = NodeSet::subtree(a, false);
        let out = String::from_utf8(canonicalize(
            xml,
            C14nMode::Exclusive,
            Some(&set),
            &["keep".to_owned()],
        ))
        .unwrap();
        assert_eq!(out, r#"<a xmlns:keep="http://k"></a>"#);
    }

    #[test]
    fn subset_canonicalization_skips_invisible_nodes() {
        let xml = "<r><a>one</a><b>two</b></r>";
        let doc = roxmltree::Document::parse(xml).unwrap();
        let b = doc.descendants().find(|n| n.tag_name().name() == "b").unwrap();
        let set = NodeSet::subtree(b, false);
        let out =
            String::from_utf8(canonicalize(xml, C14nMode::Inclusive, Some(&set), &[])).unwrap();
        assert_eq!(out, "<b>two</b>");
    }

    #[test]
    fn carriage_return_escaped_in_text() {
        let out = c14n("<r>line&#xD;end</r>");
        assert_eq!(out, "<r>line&#xD;end</r>");
    }
}
