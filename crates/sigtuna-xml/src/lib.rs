#![forbid(unsafe_code)]

//! XML document abstraction for the Sigtuna library.
//!
//! Provides an owned-text wrapper over `roxmltree`, node-set operations
//! needed by canonicalization and transforms, and a small escaping writer
//! used to serialize Manifest structures.

pub mod document;
pub mod nodeset;
pub mod writer;

pub use document::XmlDocument;
pub use nodeset::NodeSet;
pub use writer::XmlWriter;

/// Return roxmltree parsing options that allow DTD.
///
/// roxmltree does not expand external entities or perform entity
/// substitution beyond the five predefined XML entities, so allowing the
/// DTD is safe. Many xmlsec test vectors use DTDs for entity definitions.
pub fn parsing_options() -> roxmltree::ParsingOptions {
    roxmltree::ParsingOptions {
        allow_dtd: true,
        ..roxmltree::ParsingOptions::default()
    }
}

/// Parse XML text with the library's standard parsing options.
pub fn parse(text: &str) -> Result<roxmltree::Document<'_>, sigtuna_core::ContentError> {
    roxmltree::Document::parse_with_options(text, parsing_options())
        .map_err(|e| sigtuna_core::ContentError::XmlParse(e.to_string()))
}

/// Find the first descendant element with the given namespace and local name.
pub fn find_element<'a>(
    doc: &'a roxmltree::Document<'a>,
    ns_uri: &str,
    local_name: &str,
) -> Option<roxmltree::Node<'a, 'a>> {
    doc.descendants().find(|n| {
        n.is_element()
            && n.tag_name().name() == local_name
            && n.tag_name().namespace().unwrap_or("") == ns_uri
    })
}

/// Find all descendant elements with the given namespace and local name,
/// in document order.
pub fn find_elements<'a>(
    doc: &'a roxmltree::Document<'a>,
    ns_uri: &str,
    local_name: &str,
) -> Vec<roxmltree::Node<'a, 'a>> {
    doc.descendants()
        .filter(|n| {
            n.is_element()
                && n.tag_name().name() == local_name
                && n.tag_name().namespace().unwrap_or("") == ns_uri
        })
        .collect()
}

/// Find the first child element with the given namespace and local name.
pub fn find_child_element<'a>(
    parent: roxmltree::Node<'a, 'a>,
    ns_uri: &str,
    local_name: &str,
) -> Option<roxmltree::Node<'a, 'a>> {
    parent.children().find(|n| {
        n.is_element()
            && n.tag_name().name() == local_name
            && n.tag_name().namespace().unwrap_or("") == ns_uri
    })
}

/// Find all child elements with the given namespace and local name, in
/// document order.
pub fn find_child_elements<'a>(
    parent: roxmltree::Node<'a, 'a>,
    ns_uri: &str,
    local_name: &str,
) -> Vec<roxmltree::Node<'a, 'a>> {
    parent
        .children()
        .filter(|n| {
            n.is_element()
                && n.tag_name().name() == local_name
                && n.tag_name().namespace().unwrap_or("") == ns_uri
        })
        .collect()
}
