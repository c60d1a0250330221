//! Public-key pins.
//!
//! A pin is the base64 digest of a certificate's SubjectPublicKeyInfo. Only
//! the key is hashed, so a renewed certificate that keeps its key pair keeps
//! its pin.

use crate::cert::PeerCertificate;
use crate::types::HashAlgorithm;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use std::fmt;

/// Pin label for an algorithm name: hyphens removed, ASCII-lowercased.
///
/// `"SHA-256"`, `"Sha-256"` and `"sha256"` all become `"sha256"`.
pub fn normalize_algorithm_name(name: &str) -> String {
    name.replace('-', "").to_ascii_lowercase()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pin {
    pub label: String,
    pub digest: Vec<u8>,
}

impl Pin {
    pub fn encoded_digest(&self) -> String {
        STANDARD.encode(&self.digest)
    }
}

impl fmt::Display for Pin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.label, self.encoded_digest())
    }
}

pub fn compute_pin(cert: &PeerCertificate, algorithm: HashAlgorithm, algorithm_name: &str) -> Pin {
    Pin {
        label: normalize_algorithm_name(algorithm_name),
        digest: algorithm.digest(&cert.subject_public_key_info),
    }
}
