use crate::cert::PeerCertificate;
use crate::error::{Error, Result};
use crate::types::TrustSource;
use std::path::PathBuf;
use tracing::{debug, warn};
use x509_parser::pem::Pem;

/// Read-only source of trust anchors used to complete truncated chains.
pub trait TrustAnchorProvider {
    fn list_trust_anchors(&self) -> Result<Vec<PeerCertificate>>;
}

/// The operating system's certificate store.
#[derive(Debug, Default, Clone, Copy)]
pub struct NativeTrustStore;

impl TrustAnchorProvider for NativeTrustStore {
    fn list_trust_anchors(&self) -> Result<Vec<PeerCertificate>> {
        let loaded = rustls_native_certs::load_native_certs();
        for err in &loaded.errors {
            warn!("Skipping part of the native trust store: {}", err);
        }

        let anchors = parse_anchors(loaded.certs.iter().map(|c| c.as_ref()));
        debug!("Loaded {} native trust anchors", anchors.len());
        Ok(anchors)
    }
}

/// A PEM bundle of CA certificates on disk.
#[derive(Debug, Clone)]
pub struct PemBundleTrustStore {
    path: PathBuf,
}

impl PemBundleTrustStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl TrustAnchorProvider for PemBundleTrustStore {
    fn list_trust_anchors(&self) -> Result<Vec<PeerCertificate>> {
        let data = std::fs::read(&self.path).map_err(|e| {
            Error::TrustStore(format!("Failed to read {}: {}", self.path.display(), e))
        })?;

        let mut ders = Vec::new();
        for pem in Pem::iter_from_buffer(&data) {
            let pem = pem.map_err(|e| {
                Error::TrustStore(format!("Invalid PEM in {}: {}", self.path.display(), e))
            })?;
            if pem.label == "CERTIFICATE" || pem.label == "TRUSTED CERTIFICATE" {
                ders.push(pem.contents);
            }
        }

        let anchors = parse_anchors(ders.iter().map(|d| d.as_slice()));
        debug!(
            "Loaded {} trust anchors from {}",
            anchors.len(),
            self.path.display()
        );
        Ok(anchors)
    }
}

/// A fixed, in-memory set of anchors.
#[derive(Debug, Clone, Default)]
pub struct StaticTrustStore {
    anchors: Vec<PeerCertificate>,
}

impl StaticTrustStore {
    pub fn new(anchors: Vec<PeerCertificate>) -> Self {
        Self { anchors }
    }

    pub fn empty() -> Self {
        Self::default()
    }
}

impl TrustAnchorProvider for StaticTrustStore {
    fn list_trust_anchors(&self) -> Result<Vec<PeerCertificate>> {
        Ok(self.anchors.clone())
    }
}

/// Loads the anchors for a configured source.
pub fn load_trust_anchors(source: &TrustSource) -> Result<Vec<PeerCertificate>> {
    match source {
        TrustSource::Native => NativeTrustStore.list_trust_anchors(),
        TrustSource::PemFile(path) => PemBundleTrustStore::new(path).list_trust_anchors(),
        TrustSource::Disabled => StaticTrustStore::empty().list_trust_anchors(),
    }
}

fn parse_anchors<'a>(ders: impl Iterator<Item = &'a [u8]>) -> Vec<PeerCertificate> {
    ders.filter_map(|der| match PeerCertificate::from_der(der) {
        Ok(cert) => Some(cert),
        Err(e) => {
            warn!("Ignoring unparseable trust anchor: {}", e);
            None
        }
    })
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cert::test_support::leaf_and_root;
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;

    fn to_pem(der: &[u8]) -> String {
        let body = STANDARD.encode(der);
        let mut pem = String::from("-----BEGIN CERTIFICATE-----\n");
        for chunk in body.as_bytes().chunks(64) {
            pem.push_str(std::str::from_utf8(chunk).unwrap());
            pem.push('\n');
        }
        pem.push_str("-----END CERTIFICATE-----\n");
        pem
    }

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("sslpin-{}-{}.pem", name, std::process::id()))
    }

    #[test]
    fn test_pem_bundle() {
        let (leaf, root) = leaf_and_root("leaf.example", "Bundle Root");
        let path = temp_path("bundle");
        std::fs::write(&path, format!("{}{}", to_pem(&root), to_pem(&leaf))).unwrap();

        let anchors = PemBundleTrustStore::new(&path).list_trust_anchors().unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(anchors.len(), 2);
        assert_eq!(anchors[0].subject, "CN=Bundle Root,O=Pin Test Org");
        assert_eq!(anchors[1].subject, "CN=leaf.example");
    }

    #[test]
    fn test_missing_bundle() {
        let store = PemBundleTrustStore::new(temp_path("does-not-exist"));
        assert!(matches!(
            store.list_trust_anchors(),
            Err(Error::TrustStore(_))
        ));
    }

    #[test]
    fn test_disabled_source_is_empty() {
        assert!(load_trust_anchors(&TrustSource::Disabled).unwrap().is_empty());
    }

    #[test]
    fn test_unparseable_anchor_is_skipped() {
        let (_, root) = leaf_and_root("leaf.example", "Skip Root");
        let ders: Vec<&[u8]> = vec![&b"junk"[..], root.as_slice()];
        let anchors = parse_anchors(ders.into_iter());
        assert_eq!(anchors.len(), 1);
    }
}
