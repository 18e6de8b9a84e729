//! Print the pre-digest canonical bytes and digest comparison for every
//! reference of the Manifest in a document. Useful when chasing a digest
//! mismatch down to the exact canonical form.

use sigtuna::refs::{Manifest, VerifyContext};

fn main() {
    let path = std::env::args()
        .nth(1)
        .expect("usage: debug_digest <xml_file> [base_dir]");
    let base_dir = std::env::args().nth(2);

    let xml = std::fs::read_to_string(&path).unwrap();
    let mut ctx = VerifyContext::new();
    if let Some(dir) = &base_dir {
        ctx.set_base_uri(dir);
    }

    let mut manifest = Manifest::from_document(&xml, &ctx).unwrap();
    let computed = manifest.compute_digests(&ctx).unwrap();

    for (i, digest) in computed.iter().enumerate() {
        let reference = manifest.reference(i).unwrap();
        eprintln!("=== Reference {i} URI: {:?}", reference.uri());

        if let Some(content) = reference.referenced_content_after_transforms() {
            eprintln!("(post-transform content cached: dom={})", content.is_dom());
        }

        use base64::Engine;
        let engine = base64::engine::general_purpose::STANDARD;
        let actual = engine.encode(digest);
        eprintln!("Computed digest: {actual}");
        match reference.digest_value() {
            Ok(stored) => {
                let expected = engine.encode(stored);
                eprintln!("Stored digest:   {expected}");
                eprintln!("Match: {}", actual == expected);
            }
            Err(_) => eprintln!("Stored digest:   <none>"),
        }
    }
}
