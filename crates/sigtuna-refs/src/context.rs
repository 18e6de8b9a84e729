#![forbid(unsafe_code)]

//! Verification context and the frozen per-verification environment.

use crate::resolver::{Properties, Resolver, ResolverChain, UrlMapResolver};
use crate::source::DocumentSource;
use sigtuna_core::ResolverError;
use sigtuna_crypto::DigestRegistry;
use sigtuna_transforms::{ContentHandle, TransformRegistry};
use std::rc::Rc;

/// Caller-supplied configuration for one verification or digest
/// generation run: per-context resolvers, extra ID attribute names,
/// URL-to-file mappings, the base directory for relative references, and
/// the algorithm registries.
pub struct VerifyContext {
    resolvers: Vec<Rc<dyn Resolver>>,
    id_attrs: Vec<String>,
    url_maps: Vec<(String, String)>,
    base_uri: String,
    digests: Rc<DigestRegistry>,
    transforms: Rc<TransformRegistry>,
}

impl VerifyContext {
    pub fn new() -> Self {
        Self {
            resolvers: Vec::new(),
            id_attrs: Vec::new(),
            url_maps: Vec::new(),
            base_uri: String::new(),
            digests: Rc::new(DigestRegistry::with_defaults()),
            transforms: Rc::new(TransformRegistry::with_defaults()),
        }
    }

    /// Register a per-context resolver. These take precedence over
    /// per-manifest resolvers and the system defaults, in registration
    /// order.
    pub fn add_resolver(&mut self, resolver: Rc<dyn Resolver>) {
        self.resolvers.push(resolver);
    }

    /// Register an additional ID attribute name (e.g. `"wsu:Id"`).
    pub fn add_id_attr(&mut self, name: &str) {
        self.id_attrs.push(name.to_owned());
    }

    /// Map an external URL to a local file path.
    pub fn add_url_map(&mut self, url: &str, file_path: &str) {
        self.url_maps.push((url.to_owned(), file_path.to_owned()));
    }

    /// Set the base directory relative file references resolve against.
    pub fn set_base_uri(&mut self, base_uri: &str) {
        self.base_uri = base_uri.to_owned();
    }

    /// Replace the digest algorithm registry.
    pub fn set_digests(&mut self, digests: Rc<DigestRegistry>) {
        self.digests = digests;
    }

    /// Replace the transform algorithm registry.
    pub fn set_transforms(&mut self, transforms: Rc<TransformRegistry>) {
        self.transforms = transforms;
    }

    pub fn resolvers(&self) -> &[Rc<dyn Resolver>] {
        &self.resolvers
    }

    pub fn id_attrs(&self) -> &[String] {
        &self.id_attrs
    }

    pub fn url_maps(&self) -> &[(String, String)] {
        &self.url_maps
    }

    pub fn base_uri(&self) -> &str {
        &self.base_uri
    }

    pub fn digests(&self) -> &Rc<DigestRegistry> {
        &self.digests
    }

    pub fn transforms(&self) -> &Rc<TransformRegistry> {
        &self.transforms
    }
}

impl Default for VerifyContext {
    fn default() -> Self {
        Self::new()
    }
}

/// The frozen resolution environment of one verification run.
///
/// Snapshotted from the Manifest and the [`VerifyContext`] when `verify`
/// starts, and shared by reference with recursively discovered child
/// Manifests. Nothing in it can be mutated afterwards.
pub struct Env {
    context_resolvers: Rc<Vec<Rc<dyn Resolver>>>,
    manifest_resolvers: Rc<Vec<Rc<dyn Resolver>>>,
    properties: Rc<Properties>,
    id_attrs: Rc<Vec<String>>,
    base_uri: String,
    source: Option<Rc<DocumentSource>>,
    chain: ResolverChain,
    digests: Rc<DigestRegistry>,
    transforms: Rc<TransformRegistry>,
}

impl Env {
    pub(crate) fn freeze(
        ctx: &VerifyContext,
        manifest_resolvers: Vec<Rc<dyn Resolver>>,
        properties: Properties,
        base_uri: String,
        source: Option<Rc<DocumentSource>>,
    ) -> Rc<Self> {
        let mut context_resolvers = ctx.resolvers().to_vec();
        if !ctx.url_maps().is_empty() {
            context_resolvers.push(Rc::new(UrlMapResolver::new(ctx.url_maps().to_vec())));
        }
        let base_uri = if base_uri.is_empty() {
            ctx.base_uri().to_owned()
        } else {
            base_uri
        };
        Rc::new(Self {
            context_resolvers: Rc::new(context_resolvers),
            manifest_resolvers: Rc::new(manifest_resolvers),
            properties: Rc::new(properties),
            id_attrs: Rc::new(ctx.id_attrs().to_vec()),
            base_uri,
            chain: ResolverChain::standard(source.clone()),
            source,
            digests: ctx.digests().clone(),
            transforms: ctx.transforms().clone(),
        })
    }

    /// The environment a nested Manifest inherits: identical resolvers,
    /// properties and registries, rebased onto the dereferenced child
    /// document.
    pub(crate) fn for_child(&self, source: Rc<DocumentSource>) -> Rc<Self> {
        Rc::new(Self {
            context_resolvers: self.context_resolvers.clone(),
            manifest_resolvers: self.manifest_resolvers.clone(),
            properties: self.properties.clone(),
            id_attrs: self.id_attrs.clone(),
            base_uri: self.base_uri.clone(),
            chain: ResolverChain::standard(Some(source.clone())),
            source: Some(source),
            digests: self.digests.clone(),
            transforms: self.transforms.clone(),
        })
    }

    /// Resolve a reference URI through the full precedence chain.
    pub fn resolve(&self, uri: Option<&str>) -> Result<ContentHandle, ResolverError> {
        self.chain.resolve(
            uri,
            &self.base_uri,
            &self.context_resolvers,
            &self.manifest_resolvers,
            &self.properties,
        )
    }

    pub fn digests(&self) -> &DigestRegistry {
        &self.digests
    }

    pub fn transforms(&self) -> &TransformRegistry {
        &self.transforms
    }

    pub(crate) fn id_attrs(&self) -> &[String] {
        &self.id_attrs
    }

    pub(crate) fn source(&self) -> Option<&Rc<DocumentSource>> {
        self.source.as_ref()
    }
}
