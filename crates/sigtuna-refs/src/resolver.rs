#![forbid(unsafe_code)]

//! URI resolution: the resolver SPI, the built-in resolvers, and the
//! chain that selects between them.
//!
//! Resolution order is fixed: per-context resolvers supplied at
//! verification time (in registration order), then per-manifest
//! resolvers, then the system defaults (same-document fragment, empty-URI
//! whole document, file URIs against the base). The first resolver whose
//! `accepts` returns true wins; its failure is reported, never swallowed.

use crate::source::DocumentSource;
use sigtuna_core::ResolverError;
use sigtuna_transforms::ContentHandle;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::rc::Rc;

/// The per-manifest property bag injected into resolvers (proxy
/// configuration and the like).
pub type Properties = HashMap<String, String>;

/// A strategy that turns a URI into content.
pub trait Resolver {
    /// Whether this resolver claims the URI.
    fn accepts(&self, uri: Option<&str>, base_uri: &str) -> bool;

    /// Produce the content. Only called after `accepts` returned true.
    fn resolve(
        &self,
        uri: Option<&str>,
        base_uri: &str,
        properties: &Properties,
    ) -> Result<ContentHandle, ResolverError>;
}

/// The system-default resolvers for one document context.
pub struct ResolverChain {
    defaults: Vec<Rc<dyn Resolver>>,
}

impl ResolverChain {
    /// The standard default set: same-document fragment and whole-document
    /// resolution when a source document is present, plus file URIs.
    pub fn standard(source: Option<Rc<DocumentSource>>) -> Self {
        let mut defaults: Vec<Rc<dyn Resolver>> = Vec::new();
        if let Some(source) = source {
            defaults.push(Rc::new(FragmentResolver::new(source.clone())));
            defaults.push(Rc::new(WholeDocumentResolver::new(source)));
        }
        defaults.push(Rc::new(FileResolver));
        Self { defaults }
    }

    /// Resolve a URI, trying per-context resolvers, then per-manifest
    /// resolvers, then the defaults.
    pub fn resolve(
        &self,
        uri: Option<&str>,
        base_uri: &str,
        context_resolvers: &[Rc<dyn Resolver>],
        manifest_resolvers: &[Rc<dyn Resolver>],
        properties: &Properties,
    ) -> Result<ContentHandle, ResolverError> {
        for resolver in context_resolvers
            .iter()
            .chain(manifest_resolvers)
            .chain(&self.defaults)
        {
            if resolver.accepts(uri, base_uri) {
                return resolver.resolve(uri, base_uri, properties);
            }
        }
        Err(ResolverError::NoResolverFound {
            uri: uri.map(str::to_owned),
        })
    }
}

// ── Built-in resolvers ───────────────────────────────────────────────

/// Same-document references: `#id` and `#xpointer(id('id'))`.
pub struct FragmentResolver {
    source: Rc<DocumentSource>,
}

impl FragmentResolver {
    pub fn new(source: Rc<DocumentSource>) -> Self {
        Self { source }
    }
}

impl Resolver for FragmentResolver {
    fn accepts(&self, uri: Option<&str>, _base_uri: &str) -> bool {
        uri.is_some_and(|u| u.starts_with('#'))
    }

    fn resolve(
        &self,
        uri: Option<&str>,
        _base_uri: &str,
        _properties: &Properties,
    ) -> Result<ContentHandle, ResolverError> {
        let raw = uri.unwrap_or("");
        let id = fragment_id(raw).ok_or_else(|| ResolverError::MalformedTarget {
            uri: Some(raw.to_owned()),
            reason: "unsupported fragment form".into(),
        })?;
        let node = self
            .source
            .find_id(id)
            .ok_or_else(|| ResolverError::MalformedTarget {
                uri: Some(raw.to_owned()),
                reason: format!("no element with ID {id}"),
            })?;
        // Same-document references select the subtree without comments.
        Ok(ContentHandle::from_subtree(self.source.xml(), Some(node), true))
    }
}

/// The empty URI: the whole document, minus comments.
pub struct WholeDocumentResolver {
    source: Rc<DocumentSource>,
}

impl WholeDocumentResolver {
    pub fn new(source: Rc<DocumentSource>) -> Self {
        Self { source }
    }
}

impl Resolver for WholeDocumentResolver {
    fn accepts(&self, uri: Option<&str>, _base_uri: &str) -> bool {
        uri == Some("")
    }

    fn resolve(
        &self,
        _uri: Option<&str>,
        _base_uri: &str,
        _properties: &Properties,
    ) -> Result<ContentHandle, ResolverError> {
        Ok(ContentHandle::from_subtree(self.source.xml(), None, true))
    }
}

/// File content: `file://` URIs and relative paths against the base
/// directory. Network schemes are not claimed.
pub struct FileResolver;

impl Resolver for FileResolver {
    fn accepts(&self, uri: Option<&str>, _base_uri: &str) -> bool {
        match uri {
            Some(u) if !u.is_empty() && !u.starts_with('#') => {
                u.starts_with("file://") || !u.contains("://")
            }
            _ => false,
        }
    }

    fn resolve(
        &self,
        uri: Option<&str>,
        base_uri: &str,
        _properties: &Properties,
    ) -> Result<ContentHandle, ResolverError> {
        let raw = uri.unwrap_or("");
        let path = match raw.strip_prefix("file://") {
            Some(absolute) => PathBuf::from(absolute),
            None if base_uri.is_empty() => PathBuf::from(raw),
            None => Path::new(base_uri).join(raw),
        };
        let file = std::fs::File::open(&path).map_err(|e| ResolverError::IoFailure {
            uri: Some(raw.to_owned()),
            source: e,
        })?;
        Ok(ContentHandle::from_stream(Box::new(file)))
    }
}

/// Maps external URLs to local files: content fetched out of band and
/// supplied alongside the document, so verification performs no network
/// I/O.
pub struct UrlMapResolver {
    maps: Vec<(String, String)>,
}

impl UrlMapResolver {
    pub fn new(maps: Vec<(String, String)>) -> Self {
        Self { maps }
    }

    fn lookup(&self, uri: &str) -> Option<&str> {
        self.maps
            .iter()
            .find(|(url, _)| uri == url || uri.starts_with(url.as_str()))
            .map(|(_, file)| file.as_str())
    }
}

impl Resolver for UrlMapResolver {
    fn accepts(&self, uri: Option<&str>, _base_uri: &str) -> bool {
        uri.is_some_and(|u| self.lookup(u).is_some())
    }

    fn resolve(
        &self,
        uri: Option<&str>,
        _base_uri: &str,
        _properties: &Properties,
    ) -> Result<ContentHandle, ResolverError> {
        let raw = uri.unwrap_or("");
        let file_path = self
            .lookup(raw)
            .ok_or_else(|| ResolverError::NoResolverFound {
                uri: Some(raw.to_owned()),
            })?;
        let file = std::fs::File::open(file_path).map_err(|e| ResolverError::IoFailure {
            uri: Some(raw.to_owned()),
            source: e,
        })?;
        Ok(ContentHandle::from_stream(Box::new(file)))
    }
}

/// Parse a same-document fragment: `#foo` → `foo`,
/// `#xpointer(id('foo'))` → `foo`.
fn fragment_id(uri: &str) -> Option<&str> {
    let frag = uri.strip_prefix('#')?;
    if let Some(inner) = frag
        .strip_prefix("xpointer(id('")
        .and_then(|s| s.strip_suffix("'))"))
    {
        return Some(inner);
    }
    if frag.starts_with("xpointer(") {
        // Other xpointer forms are not supported.
        return None;
    }
    Some(frag)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source() -> Rc<DocumentSource> {
        DocumentSource::from_text(r#"<r><a Id="x">hi</a></r>"#, &[]).unwrap()
    }

    #[test]
    fn fragment_forms() {
        assert_eq!(fragment_id("#foo"), Some("foo"));
        assert_eq!(fragment_id("#xpointer(id('foo'))"), Some("foo"));
        assert_eq!(fragment_id("#xpointer(/)"), None);
        assert_eq!(fragment_id("foo"), None);
    }

    #[test]
    fn fragment_resolver_finds_subtree() {
        let r = FragmentResolver::new(source());
        assert!(r.accepts(Some("#x"), ""));
        assert!(!r.accepts(Some(""), ""));
        let mut content = r.resolve(Some("#x"), "", &Properties::new()).unwrap();
        assert_eq!(content.as_bytes().unwrap(), br#"<a Id="x">hi</a>"#.to_vec());
    }

    #[test]
    fn fragment_resolver_reports_missing_id() {
        let r = FragmentResolver::new(source());
        let err = r.resolve(Some("#nope"), "", &Properties::new()).unwrap_err();
        assert!(matches!(err, ResolverError::MalformedTarget { .. }));
    }

    #[test]
    fn whole_document_resolver_claims_only_empty_uri() {
        let r = WholeDocumentResolver::new(source());
        assert!(r.accepts(Some(""), ""));
        assert!(!r.accepts(Some("#x"), ""));
        assert!(!r.accepts(None, ""));
    }

    #[test]
    fn file_resolver_rejects_network_schemes() {
        assert!(!FileResolver.accepts(Some("http://example.com/x"), ""));
        assert!(FileResolver.accepts(Some("file:///tmp/x"), ""));
        assert!(FileResolver.accepts(Some("data.xml"), ""));
    }

    #[test]
    fn chain_reports_no_resolver_found() {
        let chain = ResolverChain::standard(None);
        let err = chain
            .resolve(Some("http://example.com/x"), "", &[], &[], &Properties::new())
            .unwrap_err();
        assert!(matches!(err, ResolverError::NoResolverFound { .. }));
    }

    #[test]
    fn chain_precedence_context_before_manifest() {
        struct Tagged(&'static [u8]);
        impl Resolver for Tagged {
            fn accepts(&self, uri: Option<&str>, _b: &str) -> bool {
                uri == Some("claimed")
            }
            fn resolve(
                &self,
                _u: Option<&str>,
                _b: &str,
                _p: &Properties,
            ) -> Result<ContentHandle, ResolverError> {
                Ok(ContentHandle::from_bytes(self.0.to_vec()))
            }
        }
        let chain = ResolverChain::standard(None);
        let ctx: Vec<Rc<dyn Resolver>> = vec![Rc::new(Tagged(b"context"))];
        let man: Vec<Rc<dyn Resolver>> = vec![Rc::new(Tagged(b"manifest"))];
        let mut out = chain
            .resolve(Some("claimed"), "", &ctx, &man, &Properties::new())
            .unwrap();
        assert_eq!(out.as_bytes().unwrap(), b"context");
        let mut out = chain
            .resolve(Some("claimed"), "", &[], &man, &Properties::new())
            .unwrap();
        assert_eq!(out.as_bytes().unwrap(), b"manifest");
    }
}
