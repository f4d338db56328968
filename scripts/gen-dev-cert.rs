//! Localhost certificate for running lobby-sync against a browser or the
//! native client link.
//!
//! ```text
//! cargo run --manifest-path scripts/Cargo.toml -- [--out DIR] [--days N] [--force]
//! ```
//!
//! Writes `cert.pem` / `key.pem` into `DIR` (default `certs`, the path the
//! server falls back to) and prints the values the server and clients need.

use anyhow::{bail, Context, Result};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use rcgen::{CertificateParams, DistinguishedName, DnType, KeyPair};
use ring::digest::{digest, SHA256};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

/// Browsers refuse pinned `serverCertificateHashes` certs valid for longer
const MAX_DAYS: u64 = 14;

struct Options {
    out: PathBuf,
    days: u64,
    force: bool,
}

impl Options {
    fn parse(mut args: impl Iterator<Item = String>) -> Result<Self> {
        let mut options = Self {
            out: PathBuf::from("certs"),
            days: MAX_DAYS,
            force: false,
        };
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--out" => {
                    options.out = args.next().context("--out needs a directory")?.into();
                }
                "--days" => {
                    let days = args.next().context("--days needs a number")?;
                    options.days = days
                        .parse()
                        .with_context(|| format!("invalid --days value: {}", days))?;
                }
                "--force" => options.force = true,
                other => bail!("unknown argument: {}", other),
            }
        }
        if options.days == 0 || options.days > MAX_DAYS {
            bail!("--days must be between 1 and {}", MAX_DAYS);
        }
        Ok(options)
    }
}

/// Hashes a client pins the server by
struct Fingerprints {
    /// SHA-256 of the certificate DER, as `LinkConfig::cert_hash` expects
    cert: String,
    /// SHA-256 of the SubjectPublicKeyInfo, for Chrome's SPKI allow-list
    spki: String,
}

impl Fingerprints {
    fn of(cert_der: &[u8], key: &KeyPair) -> Self {
        Self {
            cert: sha256_b64(cert_der),
            spki: sha256_b64(&key.public_key_der()),
        }
    }
}

fn sha256_b64(data: &[u8]) -> String {
    STANDARD.encode(digest(&SHA256, data).as_ref())
}

fn generate(options: &Options, cert_file: &Path, key_file: &Path) -> Result<Fingerprints> {
    fs::create_dir_all(&options.out)
        .with_context(|| format!("creating {}", options.out.display()))?;

    let mut params = CertificateParams::new(vec!["localhost".to_string(), "127.0.0.1".to_string()])?;
    let mut name = DistinguishedName::new();
    name.push(DnType::CommonName, "lobby-sync dev");
    params.distinguished_name = name;

    let now = SystemTime::now();
    params.not_before = now.into();
    params.not_after = (now + Duration::from_secs(options.days * 24 * 60 * 60)).into();

    let key = KeyPair::generate()?;
    let cert = params.self_signed(&key)?;

    fs::write(cert_file, cert.pem()).with_context(|| format!("writing {}", cert_file.display()))?;
    fs::write(key_file, key.serialize_pem())
        .with_context(|| format!("writing {}", key_file.display()))?;
    println!("Wrote {} and {} ({} days)", cert_file.display(), key_file.display(), options.days);

    Ok(Fingerprints::of(cert.der(), &key))
}

fn read_existing(cert_file: &Path, key_file: &Path) -> Result<Fingerprints> {
    let cert_pem = fs::read_to_string(cert_file)
        .with_context(|| format!("reading {}", cert_file.display()))?;
    let key_pem =
        fs::read_to_string(key_file).with_context(|| format!("reading {}", key_file.display()))?;

    let cert = pem::parse(&cert_pem).context("certificate is not PEM")?;
    let key = KeyPair::from_pem(&key_pem).context("key is not a PEM key pair")?;
    println!("Keeping existing {} (pass --force to replace)", cert_file.display());

    Ok(Fingerprints::of(cert.contents(), &key))
}

fn main() -> Result<()> {
    let options = Options::parse(std::env::args().skip(1))?;
    let cert_file = options.out.join("cert.pem");
    let key_file = options.out.join("key.pem");

    let fingerprints = if !options.force && cert_file.exists() && key_file.exists() {
        read_existing(&cert_file, &key_file)?
    } else {
        generate(&options, &cert_file, &key_file)?
    };

    println!();
    println!("# server environment");
    println!("TLS_CERT_PATH={}", cert_file.display());
    println!("TLS_KEY_PATH={}", key_file.display());
    println!();
    println!("# client link");
    println!("LinkConfig {{ cert_hash: Some(\"{}\".into()), .. }}", fingerprints.cert);
    println!();
    println!("# Chrome, when not pinning by hash");
    println!("--ignore-certificate-errors-spki-list={}", fingerprints.spki);

    Ok(())
}
