#![forbid(unsafe_code)]

//! Owned XML document with ID attribute registration.

use sigtuna_core::ContentError;
use std::collections::HashMap;

/// An owned XML document. Stores the text and the registered ID attribute
/// names.
///
/// To work with the parsed tree, call [`XmlDocument::parse_doc`], which
/// returns a temporary `roxmltree::Document` borrowing from the text.
/// Node IDs are stable across re-parses of the same text, so they can be
/// stored as plain indices alongside the document.
pub struct XmlDocument {
    text: String,
    /// Additional ID attribute names (beyond the default `Id`, `ID`, `id`).
    extra_id_attrs: Vec<String>,
}

impl XmlDocument {
    /// Parse and validate XML from a string, taking ownership.
    pub fn parse(text: String) -> Result<Self, ContentError> {
        let _doc = crate::parse(&text)?;
        Ok(Self {
            text,
            extra_id_attrs: Vec::new(),
        })
    }

    /// Parse and validate XML from bytes.
    pub fn parse_bytes(data: &[u8]) -> Result<Self, ContentError> {
        let text = std::str::from_utf8(data)
            .map_err(|e| ContentError::XmlParse(format!("invalid UTF-8: {e}")))?
            .to_owned();
        Self::parse(text)
    }

    /// Get the raw XML text.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Register an additional ID attribute name (e.g., `"wsu:Id"`).
    pub fn add_id_attr(&mut self, name: &str) {
        self.extra_id_attrs.push(name.to_owned());
    }

    /// Parse the document and return a temporary `roxmltree::Document`.
    pub fn parse_doc(&self) -> Result<roxmltree::Document<'_>, ContentError> {
        crate::parse(&self.text)
    }

    /// Build the ID value → node index mapping for a parsed document.
    ///
    /// Registered names are the defaults (`Id`, `ID`, `id`) plus anything
    /// added via [`XmlDocument::add_id_attr`].
    pub fn build_id_map(&self, doc: &roxmltree::Document<'_>) -> HashMap<String, usize> {
        let mut attr_names: Vec<&str> = vec!["Id", "ID", "id"];
        attr_names.extend(self.extra_id_attrs.iter().map(|s| s.as_str()));

        let mut map = HashMap::new();
        for node in doc.descendants() {
            if node.is_element() {
                for attr_name in &attr_names {
                    if let Some(val) = node.attribute(*attr_name) {
                        map.insert(val.to_owned(), node.id().get_usize());
                    }
                }
            }
        }
        map
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_map_includes_registered_attrs() {
        let mut doc =
            XmlDocument::parse(r#"<r><a Id="one"/><b Name="two"/></r>"#.to_owned()).unwrap();
        doc.add_id_attr("Name");
        let parsed = doc.parse_doc().unwrap();
        let map = doc.build_id_map(&parsed);
        assert!(map.contains_key("one"));
        assert!(map.contains_key("two"));
    }

    #[test]
    fn rejects_malformed_xml() {
        assert!(XmlDocument::parse("<unclosed".to_owned()).is_err());
    }
}
