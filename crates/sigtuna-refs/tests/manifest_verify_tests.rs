//! End-to-end Manifest verification scenarios: build, serialize, re-parse
//! and verify, across resolver precedence, transform chains and nested
//! manifests.

use sigtuna_core::{algorithm, ManifestVerifyError, ResolverError};
use sigtuna_refs::{Manifest, Properties, Resolver, VerifyContext};
use sigtuna_transforms::{
    C14nMode, CanonicalizeStep, ContentHandle, TransformPipeline, TransformStep,
};
use std::cell::RefCell;
use std::rc::Rc;

/// A resolver serving fixed bytes for one exact URI.
struct StaticResolver {
    uri: &'static str,
    bytes: Rc<RefCell<Vec<u8>>>,
}

impl StaticResolver {
    fn new(uri: &'static str, bytes: &[u8]) -> (Rc<Self>, Rc<RefCell<Vec<u8>>>) {
        let shared = Rc::new(RefCell::new(bytes.to_vec()));
        (
            Rc::new(Self {
                uri,
                bytes: shared.clone(),
            }),
            shared,
        )
    }
}

impl Resolver for StaticResolver {
    fn accepts(&self, uri: Option<&str>, _base_uri: &str) -> bool {
        uri == Some(self.uri)
    }

    fn resolve(
        &self,
        _uri: Option<&str>,
        _base_uri: &str,
        _properties: &Properties,
    ) -> Result<ContentHandle, ResolverError> {
        Ok(ContentHandle::from_bytes(self.bytes.borrow().clone()))
    }
}

/// Insert serialized manifest XML just before the closing tag.
fn splice(doc: &str, manifest_xml: &str, close_tag: &str) -> String {
    doc.replacen(close_tag, &format!("{manifest_xml}{close_tag}"), 1)
}

#[test]
fn sha256_hello_exact_digest_and_bit_flip() {
    let (resolver, content) = StaticResolver::new("", b"hello");
    let mut ctx = VerifyContext::new();
    ctx.add_resolver(resolver);

    let mut manifest = Manifest::new();
    manifest.add_reference(None, Some(""), None, algorithm::SHA256, None, None);
    manifest.generate_digest_values(&ctx).unwrap();

    let stored = manifest.reference(0).unwrap().digest_value().unwrap();
    assert_eq!(
        hex::encode(stored),
        "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
    );
    assert!(manifest.verify(&ctx, false).unwrap());

    // One flipped bit in the resolved content: a clean false, no error.
    content.borrow_mut()[0] ^= 0x01;
    assert!(!manifest.verify(&ctx, false).unwrap());
}

#[test]
fn verify_is_idempotent() {
    let (resolver, _) = StaticResolver::new("", b"hello");
    let mut ctx = VerifyContext::new();
    ctx.add_resolver(resolver);

    let mut manifest = Manifest::new();
    manifest.add_reference(None, Some(""), None, algorithm::SHA256, None, None);
    manifest.generate_digest_values(&ctx).unwrap();

    let first = manifest.verify(&ctx, false).unwrap();
    let second = manifest.verify(&ctx, false).unwrap();
    assert_eq!(first, second);
}

#[test]
fn digest_round_trip_through_serialization() {
    let doc = r#"<doc><data Id="d1">hello world</data></doc>"#;
    let ctx = VerifyContext::new();

    let mut built = Manifest::new();
    built.set_source_text(doc).unwrap();
    built.add_reference(None, Some("#d1"), None, algorithm::SHA256, None, None);
    built.generate_digest_values(&ctx).unwrap();

    let combined = splice(doc, &built.to_xml().unwrap(), "</doc>");
    let mut parsed = Manifest::from_document(&combined, &ctx).unwrap();
    assert!(parsed.verify(&ctx, false).unwrap());
    assert!(parsed.verification_result(&ctx, 0).unwrap());
}

#[test]
fn single_byte_mutation_detected_without_error() {
    let doc = r#"<doc><data Id="d1">hello world</data></doc>"#;
    let ctx = VerifyContext::new();

    let mut built = Manifest::new();
    built.set_source_text(doc).unwrap();
    built.add_reference(None, Some("#d1"), None, algorithm::SHA256, None, None);
    built.generate_digest_values(&ctx).unwrap();

    let combined = splice(doc, &built.to_xml().unwrap(), "</doc>").replace("world", "worlD");
    let mut parsed = Manifest::from_document(&combined, &ctx).unwrap();
    assert!(!parsed.verify(&ctx, false).unwrap());
}

#[test]
fn mutation_detected_with_canonicalization_transform() {
    let doc = r#"<doc><data Id="d1">payload</data></doc>"#;
    let ctx = VerifyContext::new();

    let mut pipeline = TransformPipeline::new();
    pipeline.push(TransformStep::Canonicalize(CanonicalizeStep {
        mode: C14nMode::Inclusive,
        inclusive_prefixes: Vec::new(),
    }));

    let mut built = Manifest::new();
    built.set_source_text(doc).unwrap();
    built.add_reference(
        None,
        Some("#d1"),
        Some(pipeline),
        algorithm::SHA256,
        None,
        None,
    );
    built.generate_digest_values(&ctx).unwrap();
    let manifest_xml = built.to_xml().unwrap();
    assert!(manifest_xml.contains(algorithm::C14N));

    let intact = splice(doc, &manifest_xml, "</doc>");
    let mut parsed = Manifest::from_document(&intact, &ctx).unwrap();
    assert!(parsed.verify(&ctx, false).unwrap());

    let tampered = intact.replace("payload", "Payload");
    let mut parsed = Manifest::from_document(&tampered, &ctx).unwrap();
    assert!(!parsed.verify(&ctx, false).unwrap());
}

#[test]
fn results_preserve_reference_order() {
    let doc = concat!(
        r#"<doc><a Id="ida">alpha</a>"#,
        r#"<b Id="idb">bee</b>"#,
        r#"<c Id="idc">sea</c></doc>"#
    );
    let ctx = VerifyContext::new();

    let mut built = Manifest::new();
    built.set_source_text(doc).unwrap();
    for uri in ["#ida", "#idb", "#idc"] {
        built.add_reference(None, Some(uri), None, algorithm::SHA256, None, None);
    }
    built.generate_digest_values(&ctx).unwrap();

    let combined = splice(doc, &built.to_xml().unwrap(), "</doc>").replace("bee", "BEE");
    let mut parsed = Manifest::from_document(&combined, &ctx).unwrap();

    // One failing reference fails the whole manifest but processing
    // continues: every slot gets its own result.
    assert!(!parsed.verify(&ctx, false).unwrap());
    assert_eq!(parsed.results().unwrap(), &[true, false, true]);
    assert!(parsed.verification_result(&ctx, 0).unwrap());
    assert!(!parsed.verification_result(&ctx, 1).unwrap());
    assert!(parsed.verification_result(&ctx, 2).unwrap());
}

#[test]
fn context_resolver_outranks_manifest_resolver() {
    let (manifest_resolver, _) = StaticResolver::new("res:x", b"manifest-content");
    let mut manifest = Manifest::new();
    manifest.add_resolver(manifest_resolver);
    manifest.add_reference(None, Some("res:x"), None, algorithm::SHA256, None, None);

    // Sign with only the per-manifest resolver in play.
    let ctx = VerifyContext::new();
    manifest.generate_digest_values(&ctx).unwrap();
    assert!(manifest.verify(&ctx, false).unwrap());

    // A per-context resolver claiming the same URI wins, and serves
    // different bytes: the digest no longer matches.
    let (context_resolver, _) = StaticResolver::new("res:x", b"context-content");
    let mut shadowing_ctx = VerifyContext::new();
    shadowing_ctx.add_resolver(context_resolver);
    assert!(!manifest.verify(&shadowing_ctx, false).unwrap());
}

#[test]
fn manifest_resolver_outranks_default_file_resolver() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("data.bin"), b"file-content").unwrap();

    let (manifest_resolver, _) = StaticResolver::new("data.bin", b"resolver-content");
    let mut manifest = Manifest::new();
    manifest.add_resolver(manifest_resolver);
    manifest.add_reference(
        Some(&dir.path().display().to_string()),
        Some("data.bin"),
        None,
        algorithm::SHA256,
        None,
        None,
    );

    let ctx = VerifyContext::new();
    manifest.generate_digest_values(&ctx).unwrap();
    let stored = manifest.reference(0).unwrap().digest_value().unwrap();
    let registry = sigtuna_crypto::DigestRegistry::with_defaults();
    assert_eq!(
        stored,
        registry
            .digest(algorithm::SHA256, b"resolver-content")
            .unwrap()
    );
}

#[test]
fn file_reference_round_trip_and_mutation() {
    let dir = tempfile::tempdir().unwrap();
    let base = dir.path().display().to_string();
    std::fs::write(dir.path().join("data.bin"), b"file-content").unwrap();

    let mut ctx = VerifyContext::new();
    ctx.set_base_uri(&base);

    let mut built = Manifest::new();
    built.add_reference(None, Some("data.bin"), None, algorithm::SHA256, None, None);
    built.generate_digest_values(&ctx).unwrap();

    let doc = format!("<doc>{}</doc>", built.to_xml().unwrap());
    let mut parsed = Manifest::from_document(&doc, &ctx).unwrap();
    assert!(parsed.verify(&ctx, false).unwrap());

    std::fs::write(dir.path().join("data.bin"), b"file-Content").unwrap();
    let mut parsed = Manifest::from_document(&doc, &ctx).unwrap();
    assert!(!parsed.verify(&ctx, false).unwrap());
}

#[test]
fn unresolvable_reference_is_a_hard_error_not_false() {
    let ctx = VerifyContext::new();
    let mut manifest = Manifest::new();
    manifest.add_reference(
        None,
        Some("http://example.com/nothing-claims-this"),
        None,
        algorithm::SHA256,
        None,
        None,
    );
    let err = manifest.verify(&ctx, false).unwrap_err();
    match err {
        ManifestVerifyError::MissingResourceFailure { index, uri, .. } => {
            assert_eq!(index, 0);
            assert_eq!(uri.as_deref(), Some("http://example.com/nothing-claims-this"));
        }
        other => panic!("expected MissingResourceFailure, got {other}"),
    }
}

#[test]
fn unknown_transform_is_a_hard_error() {
    let doc = format!(
        concat!(
            r#"<doc><data Id="d">x</data>"#,
            r##"<ds:Manifest xmlns:ds="{dsig}"><ds:Reference URI="#d">"##,
            r#"<ds:Transforms><ds:Transform Algorithm="urn:example:bogus"/></ds:Transforms>"#,
            r#"<ds:DigestMethod Algorithm="{alg}"/>"#,
            r#"<ds:DigestValue>AA==</ds:DigestValue>"#,
            r#"</ds:Reference></ds:Manifest></doc>"#
        ),
        dsig = sigtuna_core::ns::DSIG,
        alg = algorithm::SHA256,
    );
    let ctx = VerifyContext::new();
    let mut manifest = Manifest::from_document(&doc, &ctx).unwrap();
    let err = manifest.verify(&ctx, false).unwrap_err();
    assert!(matches!(
        err,
        ManifestVerifyError::MissingResourceFailure { index: 0, .. }
    ));
}

// ── Nested manifests ─────────────────────────────────────────────────

/// Build `inner.xml` on disk: a document holding signed content and its
/// own Manifest. When `consistent` is false, the content is changed after
/// the inner digests were computed, so the inner Manifest no longer
/// matches while the file bytes (and thus the outer digest) are whatever
/// the outer signer saw.
fn write_inner(dir: &std::path::Path, consistent: bool) {
    let inner_base = r#"<inner><item Id="i1">payload</item></inner>"#;
    let ctx = VerifyContext::new();
    let mut inner_manifest = Manifest::new();
    inner_manifest.set_source_text(inner_base).unwrap();
    inner_manifest.add_reference(None, Some("#i1"), None, algorithm::SHA256, None, None);
    inner_manifest.generate_digest_values(&ctx).unwrap();

    let mut inner_full = splice(inner_base, &inner_manifest.to_xml().unwrap(), "</inner>");
    if !consistent {
        inner_full = inner_full.replace("payload", "tampered");
    }
    std::fs::write(dir.join("inner.xml"), inner_full).unwrap();
}

/// Build the outer document: local data plus a Manifest whose second
/// reference points at `inner.xml` with the Manifest type.
fn build_outer(dir: &std::path::Path, ctx: &VerifyContext) -> String {
    let outer_base = r#"<outer><data Id="o1">stuff</data></outer>"#;
    let mut outer_manifest = Manifest::new();
    outer_manifest.set_source_text(outer_base).unwrap();
    outer_manifest.add_reference(None, Some("#o1"), None, algorithm::SHA256, None, None);
    outer_manifest.add_reference(
        Some(&dir.display().to_string()),
        Some("inner.xml"),
        None,
        algorithm::SHA256,
        None,
        Some(algorithm::TYPE_MANIFEST),
    );
    outer_manifest.generate_digest_values(ctx).unwrap();
    splice(outer_base, &outer_manifest.to_xml().unwrap(), "</outer>")
}

#[test]
fn nested_manifest_verified_recursively() {
    let dir = tempfile::tempdir().unwrap();
    write_inner(dir.path(), true);

    let mut ctx = VerifyContext::new();
    ctx.set_base_uri(&dir.path().display().to_string());
    let outer_doc = build_outer(dir.path(), &ctx);

    let mut manifest = Manifest::from_document(&outer_doc, &ctx).unwrap();
    assert!(manifest.verify(&ctx, true).unwrap());
    assert_eq!(manifest.results().unwrap(), &[true, true]);
}

#[test]
fn broken_nested_manifest_fails_only_with_follow() {
    let dir = tempfile::tempdir().unwrap();
    // The inner Manifest disagrees with the inner content; the outer
    // digest still matches the file bytes as signed.
    write_inner(dir.path(), false);

    let mut ctx = VerifyContext::new();
    ctx.set_base_uri(&dir.path().display().to_string());
    let outer_doc = build_outer(dir.path(), &ctx);

    let mut manifest = Manifest::from_document(&outer_doc, &ctx).unwrap();
    // Without descent the outer manifest is fine.
    assert!(manifest.verify(&ctx, false).unwrap());
    // With descent the nested mismatch propagates into the AND.
    assert!(!manifest.verify(&ctx, true).unwrap());
    // The outer per-reference results are still all true.
    assert_eq!(manifest.results().unwrap(), &[true, true]);
}

#[test]
fn promised_manifest_missing_from_target_is_a_hard_error() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("inner.xml"), "<inner>no manifest here</inner>").unwrap();

    let mut ctx = VerifyContext::new();
    ctx.set_base_uri(&dir.path().display().to_string());
    let outer_doc = build_outer(dir.path(), &ctx);

    let mut manifest = Manifest::from_document(&outer_doc, &ctx).unwrap();
    // The reference digest itself is fine, so a plain verify passes.
    assert!(manifest.verify(&ctx, false).unwrap());
    // Following the Manifest type must fail hard, not silently pass.
    let err = manifest.verify(&ctx, true).unwrap_err();
    assert!(matches!(
        err,
        ManifestVerifyError::MissingResourceFailure { index: 1, .. }
    ));
}
