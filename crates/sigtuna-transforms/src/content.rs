#![forbid(unsafe_code)]

//! The content handle: referenced content in any of its intermediate
//! forms.
//!
//! Exactly one representation is active at a time. Conversions are lazy
//! and one-directional: a byte stream is buffered on first use and the
//! buffer kept for re-reading; DOM content is canonicalized into a cached
//! byte form when octets are needed. Markup is never reinterpreted as
//! opaque bytes without a canonicalization pass.

use sigtuna_c14n::C14nMode;
use sigtuna_core::ContentError;
use sigtuna_xml::NodeSet;
use std::io::{Read, Write};
use std::rc::Rc;

/// A DOM subtree: owned XML text plus the subtree root.
#[derive(Clone)]
pub struct Subtree {
    /// The document text the node indices refer to.
    pub xml: Rc<str>,
    /// Element index of the subtree root; `None` selects the whole
    /// document.
    pub root: Option<usize>,
    /// A subtree to exclude (enveloped-signature semantics).
    pub exclude_node: Option<usize>,
    /// Whether comment nodes are excluded from the content.
    pub exclude_comments: bool,
}

/// An explicit node set over an owned document, as produced by filtering
/// transforms.
#[derive(Clone)]
pub struct DomNodes {
    pub xml: Rc<str>,
    pub nodes: NodeSet,
}

enum Repr {
    Empty,
    Bytes(Vec<u8>),
    Stream(Box<dyn Read>),
    Subtree(Subtree),
    Nodes(DomNodes),
}

/// Referenced content in one of four representations, with a cached
/// materialized byte form.
pub struct ContentHandle {
    repr: Repr,
    /// Canonical bytes computed from a DOM representation, kept so the
    /// conversion happens at most once.
    cached_bytes: Option<Vec<u8>>,
}

impl ContentHandle {
    /// A handle with no input. All conversions fail with
    /// [`ContentError::NoInput`].
    pub fn empty() -> Self {
        Self {
            repr: Repr::Empty,
            cached_bytes: None,
        }
    }

    /// Raw octets.
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self {
            repr: Repr::Bytes(bytes),
            cached_bytes: None,
        }
    }

    /// A single-pass byte stream. The first random-access use buffers the
    /// stream and replaces it with a re-readable byte form.
    pub fn from_stream(stream: Box<dyn Read>) -> Self {
        Self {
            repr: Repr::Stream(stream),
            cached_bytes: None,
        }
    }

    /// A DOM subtree over the given document text.
    pub fn from_subtree(xml: Rc<str>, root: Option<usize>, exclude_comments: bool) -> Self {
        Self {
            repr: Repr::Subtree(Subtree {
                xml,
                root,
                exclude_node: None,
                exclude_comments,
            }),
            cached_bytes: None,
        }
    }

    /// A DOM subtree with a subtree excluded from it.
    pub fn from_subtree_excluding(
        xml: Rc<str>,
        root: Option<usize>,
        exclude_node: usize,
        exclude_comments: bool,
    ) -> Self {
        Self {
            repr: Repr::Subtree(Subtree {
                xml,
                root,
                exclude_node: Some(exclude_node),
                exclude_comments,
            }),
            cached_bytes: None,
        }
    }

    /// An explicit node set over the given document text.
    pub fn from_node_set(xml: Rc<str>, nodes: NodeSet) -> Self {
        Self {
            repr: Repr::Nodes(DomNodes { xml, nodes }),
            cached_bytes: None,
        }
    }

    /// Whether the active representation is DOM-based.
    pub fn is_dom(&self) -> bool {
        matches!(self.repr, Repr::Subtree(_) | Repr::Nodes(_))
    }

    /// Whether the active representation is byte-based (raw bytes or an
    /// unconsumed stream).
    pub fn is_octets(&self) -> bool {
        matches!(self.repr, Repr::Bytes(_) | Repr::Stream(_))
    }

    /// Materialized bytes of this content.
    ///
    /// Byte-based handles return their octets (buffering a stream on
    /// first call); DOM-based handles are canonicalized with inclusive
    /// C14N and the result cached, so repeated calls are stable and the
    /// conversion is performed at most once.
    pub fn as_bytes(&mut self) -> Result<Vec<u8>, ContentError> {
        if let Some(cached) = &self.cached_bytes {
            return Ok(cached.clone());
        }
        self.buffer_stream()?;
        if self.is_dom() {
            let bytes = self.canonicalize_dom()?;
            self.cached_bytes = Some(bytes.clone());
            return Ok(bytes);
        }
        match &self.repr {
            Repr::Bytes(b) => Ok(b.clone()),
            _ => Err(ContentError::NoInput),
        }
    }

    /// The content as a document-plus-node-set.
    ///
    /// DOM-based handles derive their set directly (honoring the excluded
    /// subtree and comment exclusion). Byte-based handles are parsed into
    /// a DOM first when `expand_to_nodes` is set; fragments that are not
    /// well-formed on their own are wrapped in a synthetic container
    /// element so partial node-sets remain processable. Without
    /// `expand_to_nodes`, byte-based handles fail with
    /// [`ContentError::NoNodeSet`].
    pub fn as_node_set(&mut self, expand_to_nodes: bool) -> Result<DomNodes, ContentError> {
        if self.is_octets() {
            if !expand_to_nodes {
                return Err(ContentError::NoNodeSet);
            }
            let bytes = self.as_bytes()?;
            let text = String::from_utf8(bytes)
                .map_err(|e| ContentError::XmlParse(format!("invalid UTF-8: {e}")))?;
            let text = match sigtuna_xml::parse(&text) {
                Ok(_) => text,
                // Wrap non-well-formed fragments so they stay processable
                // as a node-set.
                Err(_) => format!("<container>{text}</container>"),
            };
            let doc = sigtuna_xml::parse(&text)?;
            let nodes = NodeSet::document(&doc);
            drop(doc);
            return Ok(DomNodes {
                xml: Rc::from(text.as_str()),
                nodes,
            });
        }
        match &self.repr {
            Repr::Nodes(dom) => Ok(dom.clone()),
            Repr::Subtree(sub) => derive_subtree_set(sub),
            _ => Err(ContentError::NoInput),
        }
    }

    /// Stream the canonical bytes of this content to a sink.
    ///
    /// Byte-based handles write without building a second copy; an
    /// unconsumed stream is copied through in chunks while being buffered
    /// for later re-reading. DOM-based handles fall back to full
    /// canonicalization.
    pub fn write_to(&mut self, sink: &mut dyn Write) -> Result<(), ContentError> {
        if let Some(cached) = &self.cached_bytes {
            sink.write_all(cached)?;
            return Ok(());
        }
        if self.is_dom() {
            let bytes = self.as_bytes()?;
            sink.write_all(&bytes)?;
            return Ok(());
        }
        match &mut self.repr {
            Repr::Bytes(b) => {
                sink.write_all(b)?;
                Ok(())
            }
            Repr::Stream(stream) => {
                let mut buffer = Vec::new();
                let mut chunk = [0u8; 8192];
                loop {
                    let n = stream.read(&mut chunk)?;
                    if n == 0 {
                        break;
                    }
                    sink.write_all(&chunk[..n])?;
                    buffer.extend_from_slice(&chunk[..n]);
                }
                self.repr = Repr::Bytes(buffer);
                Ok(())
            }
            _ => Err(ContentError::NoInput),
        }
    }

    /// A cloneable copy of this handle for diagnostics.
    ///
    /// Buffers an unconsumed stream first; every other representation is
    /// cheap to duplicate (byte vectors are shared via the cache, DOM
    /// text via `Rc`).
    pub fn snapshot(&mut self) -> Result<ContentHandle, ContentError> {
        self.buffer_stream()?;
        let repr = match &self.repr {
            // A stream cannot appear after buffering.
            Repr::Empty | Repr::Stream(_) => Repr::Empty,
            Repr::Bytes(b) => Repr::Bytes(b.clone()),
            Repr::Subtree(s) => Repr::Subtree(s.clone()),
            Repr::Nodes(n) => Repr::Nodes(n.clone()),
        };
        Ok(ContentHandle {
            repr,
            cached_bytes: self.cached_bytes.clone(),
        })
    }

    /// Consume the stream representation, if active, replacing it with
    /// its bytes. A no-op for every other representation.
    fn buffer_stream(&mut self) -> Result<(), ContentError> {
        if let Repr::Stream(stream) = &mut self.repr {
            let mut buffer = Vec::new();
            stream.read_to_end(&mut buffer)?;
            self.repr = Repr::Bytes(buffer);
        }
        Ok(())
    }

    /// Canonicalize the active DOM representation.
    fn canonicalize_dom(&mut self) -> Result<Vec<u8>, ContentError> {
        let dom = self.as_node_set(false)?;
        tracing::debug!(
            nodes = dom.nodes.len(),
            "implicit canonicalization of DOM content for byte access"
        );
        // WithComments mode plus the visibility set: comment exclusion is
        // already encoded in the node set.
        sigtuna_c14n::canonicalize(
            &dom.xml,
            C14nMode::InclusiveWithComments,
            Some(&dom.nodes),
            &[],
        )
    }
}

/// Build the node set a subtree representation denotes.
fn derive_subtree_set(sub: &Subtree) -> Result<DomNodes, ContentError> {
    let doc = sigtuna_xml::parse(&sub.xml)?;
    let mut nodes = match sub.root {
        Some(index) => {
            let root = doc
                .get_node(roxmltree::NodeId::from(index))
                .ok_or_else(|| {
                    ContentError::XmlParse(format!("subtree root {index} not in document"))
                })?;
            NodeSet::subtree(root, !sub.exclude_comments)
        }
        None => {
            if sub.exclude_comments {
                NodeSet::document_without_comments(&doc)
            } else {
                NodeSet::document(&doc)
            }
        }
    };
    if let Some(excluded) = sub.exclude_node {
        if let Some(node) = doc.get_node(roxmltree::NodeId::from(excluded)) {
            nodes.remove_subtree(node);
        }
    }
    Ok(DomNodes {
        xml: sub.xml.clone(),
        nodes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_handle_has_no_input() {
        assert!(matches!(
            ContentHandle::empty().as_bytes(),
            Err(ContentError::NoInput)
        ));
    }

    #[test]
    fn stream_is_buffered_once_and_rereadable() {
        let mut h = ContentHandle::from_stream(Box::new(std::io::Cursor::new(b"abc".to_vec())));
        assert_eq!(h.as_bytes().unwrap(), b"abc");
        // The stream is consumed; the buffer answers again.
        assert_eq!(h.as_bytes().unwrap(), b"abc");
    }

    #[test]
    fn subtree_bytes_are_canonical_and_cached() {
        let xml = r#"<r><a b="2" a="1"/></r>"#;
        let doc = sigtuna_xml::parse(xml).unwrap();
        let a = doc
            .descendants()
            .find(|n| n.tag_name().name() == "a")
            .unwrap();
        let index = a.id().get_usize();
        drop(doc);
        let mut h = ContentHandle::from_subtree(Rc::from(xml), Some(index), true);
        let first = h.as_bytes().unwrap();
        assert_eq!(first, br#"<a a="1" b="2"></a>"#.to_vec());
        assert_eq!(h.as_bytes().unwrap(), first);
    }

    #[test]
    fn subtree_excludes_comments_when_asked() {
        let xml = "<r><!--gone-->kept</r>";
        let mut with = ContentHandle::from_subtree(Rc::from(xml), None, false);
        let mut without = ContentHandle::from_subtree(Rc::from(xml), None, true);
        assert_eq!(with.as_bytes().unwrap(), b"<r><!--gone-->kept</r>");
        assert_eq!(without.as_bytes().unwrap(), b"<r>kept</r>");
    }

    #[test]
    fn exclude_node_removes_subtree() {
        let xml = "<r><keep/><drop><x/></drop></r>";
        let doc = sigtuna_xml::parse(xml).unwrap();
        let drop_el = doc
            .descendants()
            .find(|n| n.tag_name().name() == "drop")
            .unwrap();
        let index = drop_el.id().get_usize();
        drop(doc);
        let mut h = ContentHandle::from_subtree_excluding(Rc::from(xml), None, index, true);
        assert_eq!(h.as_bytes().unwrap(), b"<r><keep></keep></r>");
    }

    #[test]
    fn bytes_expand_to_node_set_on_request() {
        let mut h = ContentHandle::from_bytes(b"<r><a/></r>".to_vec());
        assert!(matches!(
            h.as_node_set(false),
            Err(ContentError::NoNodeSet)
        ));
        let dom = h.as_node_set(true).unwrap();
        assert!(!dom.nodes.is_empty());
    }

    #[test]
    fn malformed_fragment_is_wrapped() {
        let mut h = ContentHandle::from_bytes(b"<a/><b/>".to_vec());
        let dom = h.as_node_set(true).unwrap();
        assert!(dom.xml.starts_with("<container>"));
    }

    #[test]
    fn write_to_streams_and_preserves_rereadability() {
        let mut h = ContentHandle::from_stream(Box::new(std::io::Cursor::new(b"data".to_vec())));
        let mut sink = Vec::new();
        h.write_to(&mut sink).unwrap();
        assert_eq!(sink, b"data");
        assert_eq!(h.as_bytes().unwrap(), b"data");
    }
}
