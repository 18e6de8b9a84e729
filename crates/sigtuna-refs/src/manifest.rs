#![forbid(unsafe_code)]

//! An ordered, independently verifiable collection of References.

use crate::context::{Env, VerifyContext};
use crate::reference::Reference;
use crate::resolver::{Properties, Resolver};
use crate::source::DocumentSource;
use once_cell::unsync::OnceCell;
use sigtuna_core::{ns, ManifestVerifyError, SignatureError};
use sigtuna_transforms::TransformPipeline;
use sigtuna_xml::XmlWriter;
use std::rc::Rc;

/// One reference position. Parsed manifests defer constructing the
/// `Reference` until the slot is first touched; built manifests populate
/// the cell up front.
struct ReferenceSlot {
    /// Element index in the source document (parsed manifests only).
    node: Option<usize>,
    cell: OnceCell<Reference>,
}

impl ReferenceSlot {
    fn built(reference: Reference) -> Self {
        let cell = OnceCell::new();
        let _ = cell.set(reference);
        Self { node: None, cell }
    }

    fn parsed(node: usize) -> Self {
        Self {
            node: Some(node),
            cell: OnceCell::new(),
        }
    }
}

/// An ordered collection of [`Reference`]s with per-manifest resolvers
/// and properties.
///
/// Reference order mirrors document order and is semantically
/// significant: `verification_result(i)` always refers to the i-th
/// reference as added or encountered.
pub struct Manifest {
    id: Option<String>,
    base_uri: String,
    slots: Vec<ReferenceSlot>,
    resolvers: Vec<Rc<dyn Resolver>>,
    properties: Properties,
    source: Option<Rc<DocumentSource>>,
    results: Option<Vec<bool>>,
}

impl Manifest {
    /// An empty manifest in build mode.
    pub fn new() -> Self {
        Self {
            id: None,
            base_uri: String::new(),
            slots: Vec::new(),
            resolvers: Vec::new(),
            properties: Properties::new(),
            source: None,
            results: None,
        }
    }

    /// Parse the first `Manifest` element found in an XML document.
    pub fn from_document(xml: &str, ctx: &VerifyContext) -> Result<Self, ManifestVerifyError> {
        let source = DocumentSource::from_text(xml, ctx.id_attrs())
            .map_err(|e| ManifestVerifyError::Signature(SignatureError::Content(e)))?;
        let node_index = {
            let doc = source
                .parse()
                .map_err(|e| ManifestVerifyError::Signature(SignatureError::Content(e)))?;
            sigtuna_xml::find_element(&doc, ns::DSIG, ns::node::MANIFEST)
                .map(|n| n.id().get_usize())
                .ok_or_else(|| {
                    ManifestVerifyError::Signature(SignatureError::Structure(
                        "document contains no Manifest element".into(),
                    ))
                })?
        };
        Self::from_source(source, node_index)
    }

    /// Parse a `Manifest` element at a known position in a source
    /// document. An empty manifest is a hard error.
    pub fn from_source(
        source: Rc<DocumentSource>,
        node_index: usize,
    ) -> Result<Self, ManifestVerifyError> {
        let (id, reference_nodes) = {
            let doc = source
                .parse()
                .map_err(|e| ManifestVerifyError::Signature(SignatureError::Content(e)))?;
            let node = doc
                .get_node(roxmltree::NodeId::from(node_index))
                .ok_or_else(|| {
                    ManifestVerifyError::Signature(SignatureError::Structure(format!(
                        "node {node_index} not in document"
                    )))
                })?;
            if node.tag_name().name() != ns::node::MANIFEST
                || node.tag_name().namespace().unwrap_or("") != ns::DSIG
            {
                return Err(ManifestVerifyError::Signature(SignatureError::Structure(
                    "expected a Manifest element".into(),
                )));
            }
            let id = node.attribute(ns::attr::ID).map(str::to_owned);
            let reference_nodes: Vec<usize> =
                sigtuna_xml::find_child_elements(node, ns::DSIG, ns::node::REFERENCE)
                    .iter()
                    .map(|n| n.id().get_usize())
                    .collect();
            (id, reference_nodes)
        };
        if reference_nodes.is_empty() {
            return Err(ManifestVerifyError::EmptyManifest);
        }
        Ok(Self {
            id,
            base_uri: String::new(),
            slots: reference_nodes
                .into_iter()
                .map(ReferenceSlot::parsed)
                .collect(),
            resolvers: Vec::new(),
            properties: Properties::new(),
            source: Some(source),
            results: None,
        })
    }

    // ── Build-mode configuration ─────────────────────────────────────

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn set_id(&mut self, id: Option<&str>) {
        self.id = id.map(str::to_owned);
    }

    /// Attach the document that empty-URI and fragment references of a
    /// built manifest resolve against.
    pub fn set_source_text(&mut self, xml: &str) -> Result<(), SignatureError> {
        self.source = Some(DocumentSource::from_text(xml, &[]).map_err(SignatureError::Content)?);
        Ok(())
    }

    /// Register a per-manifest resolver. Consulted after per-context
    /// resolvers, before the system defaults.
    pub fn add_resolver(&mut self, resolver: Rc<dyn Resolver>) {
        self.resolvers.push(resolver);
    }

    /// Set a property passed to resolvers (e.g. proxy configuration).
    pub fn set_property(&mut self, key: &str, value: &str) {
        self.properties.insert(key.to_owned(), value.to_owned());
    }

    pub fn properties(&self) -> &Properties {
        &self.properties
    }

    /// Append a reference in build mode.
    ///
    /// `base_uri`, when given, becomes the manifest's base for relative
    /// resolution.
    pub fn add_reference(
        &mut self,
        base_uri: Option<&str>,
        uri: Option<&str>,
        transforms: Option<TransformPipeline>,
        digest_algorithm: &str,
        id: Option<&str>,
        type_hint: Option<&str>,
    ) {
        if let Some(base) = base_uri {
            self.base_uri = base.to_owned();
        }
        self.slots.push(ReferenceSlot::built(Reference::new(
            uri,
            id,
            type_hint,
            transforms,
            digest_algorithm,
        )));
    }

    pub fn reference_count(&self) -> usize {
        self.slots.len()
    }

    /// The i-th reference, if it has been materialized (always true for
    /// built manifests; true after verification for parsed ones).
    pub fn reference(&self, index: usize) -> Option<&Reference> {
        self.slots.get(index).and_then(|s| s.cell.get())
    }

    // ── Digest generation (sign path) ────────────────────────────────

    /// Compute and store the digest value of every reference, in order.
    /// The first failure aborts and carries the offending reference's
    /// index and URI.
    pub fn generate_digest_values(
        &mut self,
        ctx: &VerifyContext,
    ) -> Result<(), ManifestVerifyError> {
        let env = self.freeze(ctx);
        for index in 0..self.slots.len() {
            let reference = materialize(&mut self.slots[index], self.source.as_ref(), &env)
                .map_err(|e| missing(index, &None, e))?;
            let uri = reference.uri().map(str::to_owned);
            reference
                .generate_digest_value(&env)
                .map_err(|e| missing(index, &uri, e))?;
        }
        Ok(())
    }

    /// Compute (without storing) the digest of every reference, in
    /// order. Works on frozen references too; used to fill manifest
    /// templates.
    pub fn compute_digests(
        &mut self,
        ctx: &VerifyContext,
    ) -> Result<Vec<Vec<u8>>, ManifestVerifyError> {
        let env = self.freeze(ctx);
        let mut digests = Vec::with_capacity(self.slots.len());
        for index in 0..self.slots.len() {
            let reference = materialize(&mut self.slots[index], self.source.as_ref(), &env)
                .map_err(|e| missing(index, &None, e))?;
            let uri = reference.uri().map(str::to_owned);
            let digest = reference
                .calculate_digest(&env)
                .map_err(|e| missing(index, &uri, e))?;
            digests.push(digest);
        }
        Ok(digests)
    }

    // ── Verification ─────────────────────────────────────────────────

    /// Verify every reference in document order.
    ///
    /// Digest mismatches are recorded per reference and do not stop
    /// processing; the overall result is the AND across all references.
    /// Hard failures (resolution, transform, structure) abort immediately
    /// as [`ManifestVerifyError::MissingResourceFailure`].
    ///
    /// With `follow_nested_manifests`, a passing reference whose `Type`
    /// marks a Manifest has its target searched for a nested `Manifest`
    /// element, which is verified recursively under this manifest's
    /// frozen resolver environment; its result is AND-ed in. A promised
    /// Manifest that cannot be found is a hard failure, not a silent
    /// pass.
    pub fn verify(
        &mut self,
        ctx: &VerifyContext,
        follow_nested_manifests: bool,
    ) -> Result<bool, ManifestVerifyError> {
        let env = self.freeze(ctx);
        self.verify_in_env(&env, follow_nested_manifests)
    }

    fn verify_in_env(
        &mut self,
        env: &Rc<Env>,
        follow_nested_manifests: bool,
    ) -> Result<bool, ManifestVerifyError> {
        if self.slots.is_empty() {
            return Err(ManifestVerifyError::EmptyManifest);
        }

        let mut results = Vec::with_capacity(self.slots.len());
        let mut all_valid = true;

        for index in 0..self.slots.len() {
            let reference = materialize(&mut self.slots[index], self.source.as_ref(), env)
                .map_err(|e| missing(index, &None, e))?;
            let uri = reference.uri().map(str::to_owned);

            let passed = reference
                .verify(env)
                .map_err(|e| missing(index, &uri, e))?;
            tracing::debug!(index, uri = ?uri, passed, "reference checked");
            results.push(passed);

            // Nested descent happens only while everything so far holds,
            // so a failing tree is not walked further than needed.
            let mut nested_bytes = None;
            if passed && all_valid && follow_nested_manifests && reference.points_to_manifest() {
                let content = reference.post_transform_mut().ok_or_else(|| {
                    missing(
                        index,
                        &uri,
                        SignatureError::Structure("no dereferenced content cached".into()),
                    )
                })?;
                let bytes = content
                    .as_bytes()
                    .map_err(|e| missing(index, &uri, SignatureError::Content(e)))?;
                nested_bytes = Some(bytes);
            }

            if !passed {
                all_valid = false;
            }
            if let Some(bytes) = nested_bytes {
                let child_valid =
                    descend_into_manifest(&bytes, env, follow_nested_manifests, index, uri)?;
                all_valid = all_valid && child_valid;
            }
        }

        self.results = Some(results);
        Ok(all_valid)
    }

    /// The recorded result of the i-th reference. Runs a non-recursive
    /// verify first if none has happened yet.
    pub fn verification_result(
        &mut self,
        ctx: &VerifyContext,
        index: usize,
    ) -> Result<bool, ManifestVerifyError> {
        if self.results.is_none() {
            self.verify(ctx, false)?;
        }
        let results = self.results.as_deref().unwrap_or(&[]);
        results
            .get(index)
            .copied()
            .ok_or(ManifestVerifyError::IndexOutOfRange {
                index,
                len: results.len(),
            })
    }

    /// Per-reference results of the last verify call.
    pub fn results(&self) -> Option<&[bool]> {
        self.results.as_deref()
    }

    // ── Serialization ────────────────────────────────────────────────

    /// Serialize to the wire format. Every reference must be
    /// materialized, which holds for built manifests.
    pub fn to_xml(&self) -> Result<String, SignatureError> {
        let mut w = XmlWriter::new();
        let name = format!("{}:{}", ns::DSIG_PREFIX, ns::node::MANIFEST);
        let mut attrs: Vec<(&str, &str)> = vec![("xmlns:ds", ns::DSIG)];
        if let Some(id) = &self.id {
            attrs.push((ns::attr::ID, id));
        }
        w.start_element(&name, &attrs);
        for (index, slot) in self.slots.iter().enumerate() {
            let reference = slot.cell.get().ok_or_else(|| {
                SignatureError::Structure(format!("reference {index} has not been materialized"))
            })?;
            reference.write_xml(&mut w);
        }
        w.end_element(&name);
        Ok(w.into_string())
    }

    fn freeze(&self, ctx: &VerifyContext) -> Rc<Env> {
        Env::freeze(
            ctx,
            self.resolvers.clone(),
            self.properties.clone(),
            self.base_uri.clone(),
            self.source.clone(),
        )
    }
}

impl Default for Manifest {
    fn default() -> Self {
        Self::new()
    }
}

/// Construct the slot's reference on first touch.
fn materialize<'a>(
    slot: &'a mut ReferenceSlot,
    source: Option<&Rc<DocumentSource>>,
    env: &Env,
) -> Result<&'a mut Reference, SignatureError> {
    if slot.cell.get().is_none() {
        let node = slot.node.ok_or_else(|| {
            SignatureError::Structure("reference slot has no backing element".into())
        })?;
        let source = source.ok_or_else(|| {
            SignatureError::Structure("manifest has no source document".into())
        })?;
        let reference = Reference::from_node(source, node, env.transforms())?;
        let _ = slot.cell.set(reference);
    }
    slot.cell.get_mut().ok_or_else(|| {
        SignatureError::Structure("reference slot unavailable".into())
    })
}

fn missing(index: usize, uri: &Option<String>, source: SignatureError) -> ManifestVerifyError {
    ManifestVerifyError::MissingResourceFailure {
        index,
        uri: uri.clone(),
        source,
    }
}

/// Search dereferenced content for a nested `Manifest` element and verify
/// it under the inherited environment. The first structurally valid
/// candidate in document order wins; later candidates are tried only if
/// an earlier one fails to construct.
fn descend_into_manifest(
    bytes: &[u8],
    env: &Rc<Env>,
    follow_nested_manifests: bool,
    index: usize,
    uri: Option<String>,
) -> Result<bool, ManifestVerifyError> {
    let text = std::str::from_utf8(bytes).map_err(|e| {
        missing(
            index,
            &uri,
            SignatureError::Structure(format!("dereferenced content is not UTF-8: {e}")),
        )
    })?;
    let child_source = DocumentSource::from_text(text, env.id_attrs())
        .map_err(|e| missing(index, &uri, SignatureError::Content(e)))?;

    let candidates: Vec<usize> = {
        let doc = child_source
            .parse()
            .map_err(|e| missing(index, &uri, SignatureError::Content(e)))?;
        sigtuna_xml::find_elements(&doc, ns::DSIG, ns::node::MANIFEST)
            .iter()
            .map(|n| n.id().get_usize())
            .collect()
    };

    for candidate in candidates {
        match Manifest::from_source(child_source.clone(), candidate) {
            Ok(mut child) => {
                tracing::debug!(index, candidate, "descending into nested manifest");
                let child_env = env.for_child(child_source.clone());
                return child.verify_in_env(&child_env, follow_nested_manifests);
            }
            Err(e) => {
                tracing::debug!(index, candidate, error = %e, "manifest candidate rejected");
            }
        }
    }

    Err(missing(
        index,
        &uri,
        SignatureError::Structure(
            "reference promises a Manifest but none was found in the dereferenced content".into(),
        ),
    ))
}
