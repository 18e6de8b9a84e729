#![forbid(unsafe_code)]

//! Sigtuna CLI — Manifest digest generation and verification.

use clap::{Parser, Subcommand};
use sigtuna_core::ManifestVerifyError;
use sigtuna_refs::{Manifest, VerifyContext};
use std::error::Error;
use std::path::{Path, PathBuf};
use std::process;

#[derive(Parser)]
#[command(
    name = "sigtuna",
    about = "Sigtuna — XML-DSig Manifest and Reference verification",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Verify the Manifest in an XML document
    Verify {
        /// Input XML file
        file: PathBuf,

        /// Recurse into nested Manifests referenced with a Manifest Type
        #[arg(long = "follow-manifests")]
        follow_manifests: bool,

        /// Register additional ID attribute names
        #[arg(long = "id-attr")]
        id_attr: Vec<String>,

        /// Map an external URL to a local file (URL:FILE)
        #[arg(long = "url-map")]
        url_map: Vec<String>,

        /// Base directory for relative reference URIs
        #[arg(long = "base-dir")]
        base_dir: Option<PathBuf>,

        /// Verbose output
        #[arg(short, long)]
        verbose: bool,
    },

    /// Fill the empty DigestValue elements of a Manifest template
    Digest {
        /// Template XML file (with empty DigestValue elements)
        template: PathBuf,

        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Register additional ID attribute names
        #[arg(long = "id-attr")]
        id_attr: Vec<String>,

        /// Map an external URL to a local file (URL:FILE)
        #[arg(long = "url-map")]
        url_map: Vec<String>,

        /// Base directory for relative reference URIs
        #[arg(long = "base-dir")]
        base_dir: Option<PathBuf>,

        /// Verbose output
        #[arg(short, long)]
        verbose: bool,
    },

    /// List supported algorithms
    Info,
}

fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let result = match cli.command {
        Commands::Verify {
            file,
            follow_manifests,
            id_attr,
            url_map,
            base_dir,
            verbose,
        } => cmd_verify(file, follow_manifests, id_attr, url_map, base_dir, verbose),

        Commands::Digest {
            template,
            output,
            id_attr,
            url_map,
            base_dir,
            verbose,
        } => cmd_digest(template, output, id_attr, url_map, base_dir, verbose),

        Commands::Info => cmd_info(),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn build_context(
    id_attr: &[String],
    url_map: &[String],
    base_dir: Option<&Path>,
) -> Result<VerifyContext, Box<dyn Error>> {
    let mut ctx = VerifyContext::new();
    for attr in id_attr {
        ctx.add_id_attr(attr);
    }
    for spec in url_map {
        // Split on the last colon: the URL part may itself contain colons.
        match spec.rsplit_once(':') {
            Some((url, file)) if !url.is_empty() && !file.is_empty() => {
                ctx.add_url_map(url, file)
            }
            _ => return Err(format!("invalid url-map format: {spec} (expected URL:FILE)").into()),
        }
    }
    if let Some(dir) = base_dir {
        ctx.set_base_uri(&dir.display().to_string());
    }
    Ok(ctx)
}

fn cmd_verify(
    file: PathBuf,
    follow_manifests: bool,
    id_attr: Vec<String>,
    url_map: Vec<String>,
    base_dir: Option<PathBuf>,
    verbose: bool,
) -> Result<(), Box<dyn Error>> {
    let xml = read_file(&file)?;
    let ctx = build_context(&id_attr, &url_map, base_dir.as_deref())?;

    if verbose {
        eprintln!("Verifying: {}", file.display());
    }

    let mut manifest = Manifest::from_document(&xml, &ctx)?;
    match manifest.verify(&ctx, follow_manifests) {
        Ok(valid) => {
            if verbose {
                if let Some(results) = manifest.results() {
                    for (i, passed) in results.iter().enumerate() {
                        let uri = manifest
                            .reference(i)
                            .and_then(|r| r.uri())
                            .unwrap_or("<none>");
                        eprintln!(
                            "  reference {i} (URI={uri}): {}",
                            if *passed { "ok" } else { "MISMATCH" }
                        );
                    }
                }
            }
            if valid {
                println!("OK");
                Ok(())
            } else {
                eprintln!("INVALID: one or more reference digests do not match");
                process::exit(1);
            }
        }
        Err(ManifestVerifyError::MissingResourceFailure { index, uri, source }) => {
            eprintln!("ERROR: reference {index} ({uri:?}) could not be checked: {source}");
            process::exit(1);
        }
        Err(e) => Err(e.into()),
    }
}

fn cmd_digest(
    template: PathBuf,
    output: Option<PathBuf>,
    id_attr: Vec<String>,
    url_map: Vec<String>,
    base_dir: Option<PathBuf>,
    verbose: bool,
) -> Result<(), Box<dyn Error>> {
    let xml = read_file(&template)?;
    let ctx = build_context(&id_attr, &url_map, base_dir.as_deref())?;

    if verbose {
        eprintln!("Computing digests: {}", template.display());
    }

    let mut manifest = Manifest::from_document(&xml, &ctx)?;
    let digests = manifest.compute_digests(&ctx)?;

    let mut result = xml;
    for digest in &digests {
        use base64::Engine;
        let b64 = base64::engine::general_purpose::STANDARD.encode(digest);
        result = fill_next_digest_value(&result, &b64);
    }

    write_output(output, result.as_bytes())
}

/// Replace the first empty DigestValue element with the encoded digest.
/// Works on templates where DigestValue elements start out empty.
fn fill_next_digest_value(xml: &str, b64: &str) -> String {
    for (empty, filled) in [
        (
            "<ds:DigestValue></ds:DigestValue>".to_owned(),
            format!("<ds:DigestValue>{b64}</ds:DigestValue>"),
        ),
        (
            "<ds:DigestValue/>".to_owned(),
            format!("<ds:DigestValue>{b64}</ds:DigestValue>"),
        ),
        (
            "<DigestValue></DigestValue>".to_owned(),
            format!("<DigestValue>{b64}</DigestValue>"),
        ),
        (
            "<DigestValue/>".to_owned(),
            format!("<DigestValue>{b64}</DigestValue>"),
        ),
    ] {
        if xml.contains(&empty) {
            return xml.replacen(&empty, &filled, 1);
        }
    }
    xml.to_owned()
}

fn cmd_info() -> Result<(), Box<dyn Error>> {
    println!("Sigtuna — XML-DSig Manifest and Reference verification");
    println!();
    println!("Supported digest algorithms:");
    println!("  SHA-1, SHA-224, SHA-256, SHA-384, SHA-512");
    println!("  SHA3-224, SHA3-256, SHA3-384, SHA3-512");
    println!();
    println!("Supported canonicalization:");
    println!("  C14N 1.0 (±comments)");
    println!("  Exclusive C14N 1.0 (±comments, InclusiveNamespaces PrefixList)");
    println!();
    println!("Supported transforms:");
    println!("  canonicalization, enveloped-signature, base64 decode");
    println!();
    println!("Reference resolution:");
    println!("  same-document fragments, whole document, file URIs, URL maps");
    Ok(())
}

// ── Utility functions ────────────────────────────────────────────────

fn read_file(path: &Path) -> Result<String, Box<dyn Error>> {
    std::fs::read_to_string(path).map_err(|e| format!("{}: {e}", path.display()).into())
}

fn write_output(path: Option<PathBuf>, data: &[u8]) -> Result<(), Box<dyn Error>> {
    match path {
        Some(p) => {
            std::fs::write(&p, data).map_err(|e| format!("{}: {e}", p.display()).into())
        }
        None => {
            use std::io::Write;
            std::io::stdout()
                .write_all(data)
                .map_err(|e| format!("stdout: {e}").into())
        }
    }
}
