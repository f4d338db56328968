use anyhow::{anyhow, Context, Result};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use ring::digest::{digest, SHA256};
use std::path::Path;
use tracing::info;
use wtransport::Identity;

// Dev certificate paths (generated via `cargo run --manifest-path scripts/Cargo.toml`)
const DEV_CERT_FILE: &str = "certs/cert.pem";
const DEV_KEY_FILE: &str = "certs/key.pem";

/// TLS configuration for the WebTransport server
pub struct TlsConfig {
    pub identity: Identity,
    /// Base64-encoded SHA-256 hash of the certificate, pinned by clients
    pub cert_hash: String,
}

impl TlsConfig {
    /// Load the TLS identity
    ///
    /// Production: explicit cert/key paths (TLS_CERT_PATH / TLS_KEY_PATH)
    /// Development: certs/ generated by scripts/gen-dev-cert
    pub async fn load(cert_path: Option<&str>, key_path: Option<&str>) -> Result<Self> {
        if let (Some(cert_path), Some(key_path)) = (cert_path, key_path) {
            info!("Loading TLS certificate from configured paths");
            return Self::load_from_paths(cert_path, key_path).await;
        }

        if Path::new(DEV_CERT_FILE).exists() && Path::new(DEV_KEY_FILE).exists() {
            info!("Loading dev certificate from certs/");
            Self::load_from_paths(DEV_CERT_FILE, DEV_KEY_FILE).await
        } else {
            Err(anyhow!(
                "TLS certificate not found.\n\n\
                For development: run scripts/gen-dev-cert to generate certs/.\n\
                For production: set TLS_CERT_PATH and TLS_KEY_PATH environment variables."
            ))
        }
    }

    async fn load_from_paths(cert_path: &str, key_path: &str) -> Result<Self> {
        let identity = Identity::load_pemfiles(cert_path, key_path)
            .await
            .context("Failed to load certificate from PEM files")?;
        Ok(Self::from_identity(identity))
    }

    /// Wrap an already loaded identity
    pub fn from_identity(identity: Identity) -> Self {
        let cert_hash = identity
            .certificate_chain()
            .as_slice()
            .first()
            .map(|cert| cert_hash_of_der(cert.der()))
            .unwrap_or_default();
        info!("Certificate hash: {}", cert_hash);

        Self {
            identity,
            cert_hash,
        }
    }

    pub fn cert_hash(&self) -> &str {
        &self.cert_hash
    }
}

/// Base64 SHA-256 of a DER certificate, the form clients pin
pub fn cert_hash_of_der(der: &[u8]) -> String {
    STANDARD.encode(digest(&SHA256, der).as_ref())
}

/// Decode a pinned hash back to the raw 32-byte digest
pub fn decode_cert_hash(hash: &str) -> Result<[u8; 32]> {
    let bytes = STANDARD
        .decode(hash.trim())
        .context("Certificate hash is not valid base64")?;
    bytes
        .try_into()
        .map_err(|b: Vec<u8>| anyhow!("Certificate hash must be 32 bytes, got {}", b.len()))
}
