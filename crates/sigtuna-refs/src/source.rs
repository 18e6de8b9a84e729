#![forbid(unsafe_code)]

//! The document a manifest's same-document references resolve against.

use sigtuna_core::ContentError;
use sigtuna_xml::XmlDocument;
use std::collections::HashMap;
use std::rc::Rc;

/// An owned source document with a pre-built ID map.
///
/// Shared (`Rc`) between a Manifest, its fragment resolvers, and the
/// content handles produced from it, so node indices always refer to the
/// same text.
pub struct DocumentSource {
    xml: Rc<str>,
    id_map: HashMap<String, usize>,
}

impl DocumentSource {
    /// Parse a source document, registering extra ID attribute names in
    /// addition to the default `Id`/`ID`/`id`.
    pub fn from_text(text: &str, extra_id_attrs: &[String]) -> Result<Rc<Self>, ContentError> {
        let mut xdoc = XmlDocument::parse(text.to_owned())?;
        for attr in extra_id_attrs {
            xdoc.add_id_attr(attr);
        }
        let doc = xdoc.parse_doc()?;
        let id_map = xdoc.build_id_map(&doc);
        drop(doc);
        Ok(Rc::new(Self {
            xml: Rc::from(xdoc.text()),
            id_map,
        }))
    }

    /// The document text, shareable with content handles.
    pub fn xml(&self) -> Rc<str> {
        self.xml.clone()
    }

    pub fn text(&self) -> &str {
        &self.xml
    }

    /// Look up an element index by registered ID value.
    pub fn find_id(&self, id: &str) -> Option<usize> {
        self.id_map.get(id).copied()
    }

    /// Re-parse the document text.
    pub fn parse(&self) -> Result<roxmltree::Document<'_>, ContentError> {
        sigtuna_xml::parse(&self.xml)
    }
}
