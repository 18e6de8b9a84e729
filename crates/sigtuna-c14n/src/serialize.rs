#![forbid(unsafe_code)]

//! The canonical serialization walk, shared by the inclusive and
//! exclusive variants.
//!
//! The walk tracks which namespace declarations the nearest rendered
//! ancestor has already emitted. Inclusive mode renders every in-scope
//! binding not already rendered; exclusive mode renders only visibly
//! utilized prefixes (plus the `InclusiveNamespaces` prefix list).

use crate::emit;
use crate::C14nMode;
use sigtuna_core::ContentError;
use sigtuna_xml::NodeSet;
use std::collections::BTreeMap;

const XML_NS: &str = "http://www.w3.org/XML/1998/namespace";

pub(crate) struct Serializer<'a> {
    mode: C14nMode,
    node_set: Option<&'a NodeSet>,
    inclusive_prefixes: &'a [String],
}

impl<'a> Serializer<'a> {
    pub(crate) fn new(
        mode: C14nMode,
        node_set: Option<&'a NodeSet>,
        inclusive_prefixes: &'a [String],
    ) -> Self {
        Self {
            mode,
            node_set,
            inclusive_prefixes,
        }
    }

    pub(crate) fn run(&self, doc: &roxmltree::Document<'_>) -> Result<Vec<u8>, ContentError> {
        let mut out = Vec::new();
        for child in doc.root().children() {
            self.node(child, &BTreeMap::new(), &mut out)?;
        }
        Ok(out)
    }

    fn visible(&self, node: &roxmltree::Node<'_, '_>) -> bool {
        self.node_set.map_or(true, |set| set.contains(node))
    }

    fn node(
        &self,
        node: roxmltree::Node<'_, '_>,
        rendered_ns: &BTreeMap<String, String>,
        out: &mut Vec<u8>,
    ) -> Result<(), ContentError> {
        match node.node_type() {
            roxmltree::NodeType::Element => self.element(node, rendered_ns, out),
            roxmltree::NodeType::Text => {
                if self.visible(&node) {
                    emit::escape_text(node.text().unwrap_or(""), out);
                }
                Ok(())
            }
            roxmltree::NodeType::Comment => {
                if self.mode.with_comments() && self.visible(&node) {
                    self.doc_level_break_before(&node, out);
                    out.extend_from_slice(b"<!--");
                    out.extend_from_slice(node.text().unwrap_or("").as_bytes());
                    out.extend_from_slice(b"-->");
                    self.doc_level_break_after(&node, out);
                }
                Ok(())
            }
            roxmltree::NodeType::PI => {
                if self.visible(&node) {
                    self.doc_level_break_before(&node, out);
                    out.extend_from_slice(b"<?");
                    out.extend_from_slice(node.tag_name().name().as_bytes());
                    if let Some(value) = node.text() {
                        if !value.is_empty() {
                            out.push(b' ');
                            emit::escape_pi(value, out);
                        }
                    }
                    out.extend_from_slice(b"?>");
                    self.doc_level_break_after(&node, out);
                }
                Ok(())
            }
            roxmltree::NodeType::Root => {
                for child in node.children() {
                    self.node(child, rendered_ns, out)?;
                }
                Ok(())
            }
        }
    }

    /// Comments and PIs outside the document element get surrounding
    /// newlines relative to it.
    fn doc_level_break_before(&self, node: &roxmltree::Node<'_, '_>, out: &mut Vec<u8>) {
        let at_doc_level = node
            .parent()
            .is_some_and(|p| p.node_type() == roxmltree::NodeType::Root);
        if at_doc_level && node.prev_siblings().any(|s| s.is_element()) {
            out.push(b'\n');
        }
    }

    fn doc_level_break_after(&self, node: &roxmltree::Node<'_, '_>, out: &mut Vec<u8>) {
        let at_doc_level = node
            .parent()
            .is_some_and(|p| p.node_type() == roxmltree::NodeType::Root);
        if at_doc_level && node.next_siblings().any(|s| s.is_element()) {
            out.push(b'\n');
        }
    }

    fn element(
        &self,
        node: roxmltree::Node<'_, '_>,
        rendered_ns: &BTreeMap<String, String>,
        out: &mut Vec<u8>,
    ) -> Result<(), ContentError> {
        if !self.visible(&node) {
            // Invisible elements contribute nothing; their visible
            // descendants render against the same ancestor declarations.
            for child in node.children() {
                self.node(child, rendered_ns, out)?;
            }
            return Ok(());
        }

        let in_scope = in_scope_namespaces(&node);
        let decls = if self.mode.is_exclusive() {
            self.exclusive_decls(&node, &in_scope, rendered_ns)
        } else {
            inclusive_decls(&in_scope, rendered_ns)
        };

        let mut attrs = collect_attrs(&node);
        if !self.mode.is_exclusive() && self.node_set.is_some() {
            // Document-subset C14N 1.0: when the immediate parent is not
            // rendered, xml:* attributes are inherited from ancestors.
            let parent_invisible = node
                .parent()
                .map_or(true, |p| !p.is_element() || !self.visible(&p));
            if parent_invisible {
                inherit_xml_attrs(&node, &mut attrs);
            }
        }
        attrs.sort_by(|a, b| {
            // No-namespace attributes first by local name, then by
            // (namespace URI, local name).
            match (a.ns_uri.is_empty(), b.ns_uri.is_empty()) {
                (true, true) => a.local.cmp(&b.local),
                (true, false) => std::cmp::Ordering::Less,
                (false, true) => std::cmp::Ordering::Greater,
                (false, false) => a.ns_uri.cmp(&b.ns_uri).then(a.local.cmp(&b.local)),
            }
        });

        let name = qualified_name(&node);
        out.push(b'<');
        out.extend_from_slice(name.as_bytes());
        for (prefix, uri) in &decls {
            if prefix.is_empty() {
                out.extend_from_slice(b" xmlns=\"");
            } else {
                out.extend_from_slice(b" xmlns:");
                out.extend_from_slice(prefix.as_bytes());
                out.extend_from_slice(b"=\"");
            }
            emit::escape_attr(uri, out);
            out.push(b'"');
        }
        for attr in &attrs {
            out.push(b' ');
            out.extend_from_slice(attr.qname.as_bytes());
            out.extend_from_slice(b"=\"");
            emit::escape_attr(&attr.value, out);
            out.push(b'"');
        }
        out.push(b'>');

        let child_rendered = if self.mode.is_exclusive() {
            // Children compare against exactly what has been emitted.
            let mut m = rendered_ns.clone();
            for (prefix, uri) in &decls {
                m.insert(prefix.clone(), uri.clone());
            }
            m
        } else {
            // Inclusive: everything in scope here was either emitted now
            // or already rendered identically by an ancestor.
            let mut m = rendered_ns.clone();
            for (prefix, uri) in &in_scope {
                if prefix != "xml" {
                    m.insert(prefix.clone(), uri.clone());
                }
            }
            for (prefix, uri) in &decls {
                m.insert(prefix.clone(), uri.clone());
            }
            m
        };

        for child in node.children() {
            self.node(child, &child_rendered, out)?;
        }

        out.extend_from_slice(b"</");
        out.extend_from_slice(name.as_bytes());
        out.push(b'>');
        Ok(())
    }

    /// Exclusive C14N: declarations for visibly utilized prefixes plus the
    /// inclusive prefix list, each rendered only when it differs from what
    /// the nearest rendered ancestor emitted.
    fn exclusive_decls(
        &self,
        node: &roxmltree::Node<'_, '_>,
        in_scope: &BTreeMap<String, String>,
        rendered_ns: &BTreeMap<String, String>,
    ) -> Vec<(String, String)> {
        let mut utilized: Vec<String> = Vec::new();
        utilized.push(node.tag_name_prefix().unwrap_or("").to_owned());
        for attr in node.attributes() {
            if attr.namespace().is_some() {
                if let Some(p) = attr.prefix() {
                    if p != "xml" {
                        utilized.push(p.to_owned());
                    }
                }
            }
        }
        for p in self.inclusive_prefixes {
            if p == "#default" {
                utilized.push(String::new());
            } else {
                utilized.push(p.clone());
            }
        }
        utilized.sort();
        utilized.dedup();

        let mut decls = Vec::new();
        for prefix in utilized {
            if prefix == "xml" {
                continue;
            }
            match in_scope.get(&prefix) {
                Some(uri) => {
                    if rendered_ns.get(&prefix) != Some(uri) {
                        decls.push((prefix, uri.clone()));
                    }
                }
                None => {
                    // Utilized default prefix with no binding: undeclare if
                    // an ancestor rendered a non-empty default namespace.
                    if prefix.is_empty()
                        && rendered_ns.get("").is_some_and(|u| !u.is_empty())
                    {
                        decls.push((String::new(), String::new()));
                    }
                }
            }
        }
        sort_decls(&mut decls);
        decls
    }
}

/// Inclusive C14N: every in-scope binding not already rendered, plus a
/// default-namespace undeclaration when an ancestor's default is gone.
fn inclusive_decls(
    in_scope: &BTreeMap<String, String>,
    rendered_ns: &BTreeMap<String, String>,
) -> Vec<(String, String)> {
    let mut decls = Vec::new();
    for (prefix, uri) in in_scope {
        if prefix == "xml" {
            continue;
        }
        if rendered_ns.get(prefix) != Some(uri) {
            decls.push((prefix.clone(), uri.clone()));
        }
    }
    if rendered_ns.get("").is_some_and(|u| !u.is_empty()) && !in_scope.contains_key("") {
        decls.push((String::new(), String::new()));
    }
    sort_decls(&mut decls);
    decls
}

fn sort_decls(decls: &mut [(String, String)]) {
    // Default namespace first, then by prefix.
    decls.sort_by(|a, b| match (a.0.is_empty(), b.0.is_empty()) {
        (true, false) => std::cmp::Ordering::Less,
        (false, true) => std::cmp::Ordering::Greater,
        _ => a.0.cmp(&b.0),
    });
}

/// All namespace bindings in scope at an element, nearest declaration
/// winning; an empty-URI default declaration removes the binding.
fn in_scope_namespaces(node: &roxmltree::Node<'_, '_>) -> BTreeMap<String, String> {
    let mut levels: Vec<BTreeMap<String, String>> = Vec::new();
    let mut current = Some(*node);
    while let Some(n) = current {
        if n.is_element() {
            let mut level = BTreeMap::new();
            for ns in n.namespaces() {
                level.insert(ns.name().unwrap_or("").to_owned(), ns.uri().to_owned());
            }
            levels.push(level);
        }
        current = n.parent();
    }

    let mut result = BTreeMap::new();
    for level in levels.into_iter().rev() {
        for (prefix, uri) in level {
            if uri.is_empty() {
                result.remove(&prefix);
            } else {
                result.insert(prefix, uri);
            }
        }
    }
    result
}

struct RenderedAttr {
    ns_uri: String,
    local: String,
    qname: String,
    value: String,
}

fn collect_attrs(node: &roxmltree::Node<'_, '_>) -> Vec<RenderedAttr> {
    node.attributes()
        .map(|attr| {
            let ns_uri = attr.namespace().unwrap_or("").to_owned();
            let qname = match attr_prefix(&attr) {
                Some(p) => format!("{}:{}", p, attr.name()),
                None => attr.name().to_owned(),
            };
            RenderedAttr {
                ns_uri,
                local: attr.name().to_owned(),
                qname,
                value: attr.value().to_owned(),
            }
        })
        .collect()
}

fn attr_prefix(attr: &roxmltree::Attribute<'_, '_>) -> Option<String> {
    match attr.namespace() {
        Some(XML_NS) => Some("xml".to_owned()),
        Some(_) => attr.prefix().map(|p| p.to_owned()),
        None => None,
    }
}

fn qualified_name(node: &roxmltree::Node<'_, '_>) -> String {
    match node.tag_name_prefix() {
        Some(prefix) => format!("{}:{}", prefix, node.tag_name().name()),
        None => node.tag_name().name().to_owned(),
    }
}

/// Collect xml:* attributes from ancestors (nearest wins) that are not
/// already present on the element itself.
fn inherit_xml_attrs(node: &roxmltree::Node<'_, '_>, attrs: &mut Vec<RenderedAttr>) {
    let mut inherited: BTreeMap<String, String> = BTreeMap::new();
    let mut current = node.parent();
    while let Some(ancestor) = current {
        if ancestor.is_element() {
            for attr in ancestor.attributes() {
                if attr.namespace() == Some(XML_NS) && !inherited.contains_key(attr.name()) {
                    inherited.insert(attr.name().to_owned(), attr.value().to_owned());
                }
            }
        }
        current = ancestor.parent();
    }

    for (name, value) in inherited {
        let present = attrs
            .iter()
            .any(|a| a.ns_uri == XML_NS && a.local == name);
        if !present {
            attrs.push(RenderedAttr {
                ns_uri: XML_NS.to_owned(),
                local: name.clone(),
                qname: format!("xml:{name}"),
                value,
            });
        }
    }
}
