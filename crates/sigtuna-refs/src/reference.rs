#![forbid(unsafe_code)]

//! A single signed resource: URI, transform chain, digest algorithm and
//! digest value.

use crate::context::Env;
use sigtuna_core::{algorithm, ns, SignatureError};
use sigtuna_crypto::DigestWriter;
use sigtuna_transforms::{ContentHandle, TransformPipeline, TransformRegistry};
use sigtuna_xml::XmlWriter;
use std::io::Write;

/// Reference lifecycle state.
///
/// A reference is mutable while being built programmatically and frozen
/// once parsed from a signed document (or explicitly sealed).
/// Verification is permitted in either state; mutation and digest
/// generation only while building.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefState {
    Building,
    Frozen,
}

/// One `Reference`: a record binding a URI, transform chain and digest
/// algorithm/value.
pub struct Reference {
    uri: Option<String>,
    id: Option<String>,
    type_hint: Option<String>,
    transforms: Option<TransformPipeline>,
    digest_algorithm: String,
    digest_value: Option<Vec<u8>>,
    state: RefState,
    /// Resolved content before transforms, kept for diagnostics.
    pre_transform: Option<ContentHandle>,
    /// Content after the last transform, kept for diagnostics and for
    /// nested-manifest discovery.
    post_transform: Option<ContentHandle>,
}

impl Reference {
    /// Create a reference programmatically, in build mode.
    pub fn new(
        uri: Option<&str>,
        id: Option<&str>,
        type_hint: Option<&str>,
        transforms: Option<TransformPipeline>,
        digest_algorithm: &str,
    ) -> Self {
        Self {
            uri: uri.map(str::to_owned),
            id: id.map(str::to_owned),
            type_hint: type_hint.map(str::to_owned),
            transforms,
            digest_algorithm: digest_algorithm.to_owned(),
            digest_value: None,
            state: RefState::Building,
            pre_transform: None,
            post_transform: None,
        }
    }

    /// Parse a `Reference` element out of a source document. The result
    /// is frozen.
    pub fn from_node(
        source: &crate::source::DocumentSource,
        node_index: usize,
        registry: &TransformRegistry,
    ) -> Result<Self, SignatureError> {
        let doc = source
            .parse()
            .map_err(|e| SignatureError::Structure(e.to_string()))?;
        let node = doc
            .get_node(roxmltree::NodeId::from(node_index))
            .ok_or_else(|| {
                SignatureError::Structure(format!("node {node_index} not in document"))
            })?;
        if node.tag_name().name() != ns::node::REFERENCE
            || node.tag_name().namespace().unwrap_or("") != ns::DSIG
        {
            return Err(SignatureError::Structure(
                "expected a Reference element".into(),
            ));
        }

        let uri = node.attribute(ns::attr::URI).map(str::to_owned);
        let id = node.attribute(ns::attr::ID).map(str::to_owned);
        let type_hint = node.attribute(ns::attr::TYPE).map(str::to_owned);

        let transforms = sigtuna_xml::find_child_element(node, ns::DSIG, ns::node::TRANSFORMS)
            .map(|t| TransformPipeline::from_element(t, registry))
            .transpose()?;

        let digest_method =
            sigtuna_xml::find_child_element(node, ns::DSIG, ns::node::DIGEST_METHOD)
                .ok_or_else(|| SignatureError::Structure("Reference has no DigestMethod".into()))?;
        let digest_algorithm = digest_method
            .attribute(ns::attr::ALGORITHM)
            .ok_or_else(|| {
                SignatureError::Structure("DigestMethod has no Algorithm attribute".into())
            })?
            .to_owned();

        let digest_value = sigtuna_xml::find_child_element(node, ns::DSIG, ns::node::DIGEST_VALUE)
            .map(|dv| decode_digest_text(dv.text().unwrap_or("")))
            .transpose()?;

        Ok(Self {
            uri,
            id,
            type_hint,
            transforms,
            digest_algorithm,
            digest_value,
            state: RefState::Frozen,
            pre_transform: None,
            post_transform: None,
        })
    }

    // ── Accessors and build-mode mutation ────────────────────────────

    pub fn uri(&self) -> Option<&str> {
        self.uri.as_deref()
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn type_hint(&self) -> Option<&str> {
        self.type_hint.as_deref()
    }

    pub fn digest_algorithm(&self) -> &str {
        &self.digest_algorithm
    }

    pub fn state(&self) -> RefState {
        self.state
    }

    pub fn set_uri(&mut self, uri: Option<&str>) -> Result<(), SignatureError> {
        self.require_building()?;
        self.uri = uri.map(str::to_owned);
        Ok(())
    }

    pub fn set_id(&mut self, id: Option<&str>) -> Result<(), SignatureError> {
        self.require_building()?;
        self.id = id.map(str::to_owned);
        Ok(())
    }

    pub fn set_type_hint(&mut self, type_hint: Option<&str>) -> Result<(), SignatureError> {
        self.require_building()?;
        self.type_hint = type_hint.map(str::to_owned);
        Ok(())
    }

    /// Freeze this reference; further mutation fails.
    pub fn seal(&mut self) {
        self.state = RefState::Frozen;
    }

    fn require_building(&self) -> Result<(), SignatureError> {
        match self.state {
            RefState::Building => Ok(()),
            RefState::Frozen => Err(SignatureError::NotBuilding),
        }
    }

    /// Whether the `Type` attribute marks this reference as pointing to a
    /// nested Manifest.
    pub fn points_to_manifest(&self) -> bool {
        self.type_hint.as_deref() == Some(algorithm::TYPE_MANIFEST)
    }

    /// Whether the `Type` attribute marks this reference as pointing to
    /// an Object element.
    pub fn points_to_object(&self) -> bool {
        self.type_hint.as_deref() == Some(algorithm::TYPE_OBJECT)
    }

    // ── Dereferencing and digests ────────────────────────────────────

    /// Resolve the URI through the environment's resolver chain and run
    /// the transform pipeline.
    ///
    /// Always records the resolved content and the post-transform output
    /// for later introspection, whatever the outcome of the digest step.
    /// When `sink` is given, the terminal canonical bytes are streamed
    /// into it as well.
    pub fn dereference_and_transform(
        &mut self,
        env: &Env,
        sink: Option<&mut dyn Write>,
    ) -> Result<ContentHandle, SignatureError> {
        let mut resolved = env.resolve(self.uri.as_deref())?;
        self.pre_transform = Some(resolved.snapshot()?);

        let mut output = match &self.transforms {
            Some(pipeline) => pipeline.perform(resolved, sink)?,
            None => {
                if let Some(sink) = sink {
                    resolved.write_to(sink)?;
                }
                resolved
            }
        };
        self.post_transform = Some(output.snapshot()?);
        Ok(output)
    }

    /// Dereference, transform and digest, streaming the transformed
    /// content into the hash.
    pub fn calculate_digest(&mut self, env: &Env) -> Result<Vec<u8>, SignatureError> {
        let mut hasher = env.digests().create(&self.digest_algorithm)?;
        {
            let mut sink = DigestWriter::new(hasher.as_mut());
            self.dereference_and_transform(env, Some(&mut sink))?;
        }
        Ok(hasher.finish())
    }

    /// Compute and store the digest value. Build mode only; a frozen
    /// reference's digest is part of the signed document and is never
    /// regenerated.
    pub fn generate_digest_value(&mut self, env: &Env) -> Result<(), SignatureError> {
        self.require_building()?;
        let digest = self.calculate_digest(env)?;
        self.digest_value = Some(digest);
        Ok(())
    }

    /// The stored digest value.
    pub fn digest_value(&self) -> Result<&[u8], SignatureError> {
        self.digest_value
            .as_deref()
            .ok_or(SignatureError::MissingDigestElement)
    }

    /// Compute the digest of the referenced content and compare it with
    /// the stored value.
    ///
    /// A mismatch is a logged `false`, not an error; errors mean the
    /// digest could not be computed at all.
    pub fn verify(&mut self, env: &Env) -> Result<bool, SignatureError> {
        let computed = self.calculate_digest(env)?;
        let stored = self.digest_value()?;
        let matches = computed == stored;
        if !matches {
            use base64::Engine;
            let engine = base64::engine::general_purpose::STANDARD;
            tracing::warn!(
                uri = ?self.uri,
                expected = %engine.encode(stored),
                actual = %engine.encode(&computed),
                "reference digest mismatch"
            );
        }
        Ok(matches)
    }

    // ── Introspection ────────────────────────────────────────────────

    /// The resolved content before any transform ran, if this reference
    /// has been dereferenced.
    pub fn referenced_content_before_transforms(&self) -> Option<&ContentHandle> {
        self.pre_transform.as_ref()
    }

    /// The content after the last transform, if this reference has been
    /// dereferenced.
    pub fn referenced_content_after_transforms(&self) -> Option<&ContentHandle> {
        self.post_transform.as_ref()
    }

    pub(crate) fn post_transform_mut(&mut self) -> Option<&mut ContentHandle> {
        self.post_transform.as_mut()
    }

    // ── Serialization ────────────────────────────────────────────────

    /// Write this reference in the wire format: `Transforms`, then
    /// `DigestMethod`, then `DigestValue`.
    pub fn write_xml(&self, w: &mut XmlWriter) {
        let prefix = ns::DSIG_PREFIX;
        let mut attrs: Vec<(&str, &str)> = Vec::new();
        if let Some(id) = &self.id {
            attrs.push((ns::attr::ID, id));
        }
        if let Some(uri) = &self.uri {
            attrs.push((ns::attr::URI, uri));
        }
        if let Some(type_hint) = &self.type_hint {
            attrs.push((ns::attr::TYPE, type_hint));
        }
        w.start_element(&format!("{prefix}:{}", ns::node::REFERENCE), &attrs);

        if let Some(pipeline) = &self.transforms {
            if !pipeline.is_empty() {
                w.start_element(&format!("{prefix}:{}", ns::node::TRANSFORMS), &[]);
                for step in pipeline.steps() {
                    let name = format!("{prefix}:{}", ns::node::TRANSFORM);
                    match step.inclusive_prefixes() {
                        Some(prefixes) => {
                            w.start_element(&name, &[(ns::attr::ALGORITHM, step.uri())]);
                            let list = prefixes.join(" ");
                            w.empty_element(
                                &format!("ec:{}", ns::node::INCLUSIVE_NAMESPACES),
                                &[("xmlns:ec", ns::EXC_C14N), (ns::attr::PREFIX_LIST, &list)],
                            );
                            w.end_element(&name);
                        }
                        None => {
                            w.empty_element(&name, &[(ns::attr::ALGORITHM, step.uri())]);
                        }
                    }
                }
                w.end_element(&format!("{prefix}:{}", ns::node::TRANSFORMS));
            }
        }

        w.empty_element(
            &format!("{prefix}:{}", ns::node::DIGEST_METHOD),
            &[(ns::attr::ALGORITHM, &self.digest_algorithm)],
        );

        let name = format!("{prefix}:{}", ns::node::DIGEST_VALUE);
        w.start_element(&name, &[]);
        if let Some(value) = &self.digest_value {
            use base64::Engine;
            w.text(&base64::engine::general_purpose::STANDARD.encode(value));
        }
        w.end_element(&name);

        w.end_element(&format!("{prefix}:{}", ns::node::REFERENCE));
    }
}

/// Decode a `DigestValue` text node, tolerating embedded whitespace.
fn decode_digest_text(text: &str) -> Result<Vec<u8>, SignatureError> {
    use base64::Engine;
    let cleaned: String = text.chars().filter(|c| !c.is_whitespace()).collect();
    base64::engine::general_purpose::STANDARD
        .decode(&cleaned)
        .map_err(|e| SignatureError::Base64(format!("DigestValue: {e}")))
}
