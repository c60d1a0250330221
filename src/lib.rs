//! sslpin - public-key pin generation for TLS hosts
//!
//! Connects to a host, watches the certificate chain it presents during the
//! handshake and prints a pin for every certificate in it:
//!
//! - one `<algorithm>/<base64 digest of the SubjectPublicKeyInfo>` line per
//!   certificate, leaf first, in the format pinning libraries expect
//! - a root the server left out is recovered from the local trust store when
//!   its subject matches the issuer of the last certificate sent
//!
//! The tool never validates the chain. Run it on a network you trust.
//!
//! # Examples
//!
//! ## Pinning a remote host
//!
//! ```no_run
//! use std::sync::Arc;
//! use sslpin::connector::Connector;
//! use sslpin::extractor::PinExtractor;
//! use sslpin::trust::{NativeTrustStore, TrustAnchorProvider};
//! use sslpin::types::{PinOptions, Target};
//!
//! let target: Target = "example.com:443".parse().unwrap();
//! let options = PinOptions::new(target, "SHA-256").unwrap();
//!
//! let anchors = NativeTrustStore.list_trust_anchors().unwrap();
//! let extractor = Arc::new(PinExtractor::from_options(&options, anchors));
//!
//! Connector::new(options.target.clone(), options.timeout)
//!     .run(extractor.clone())
//!     .unwrap();
//!
//! for pinned in extractor.emitted() {
//!     println!("{} {}", pinned.subject, pinned.pin);
//! }
//! ```
//!
//! ## Pinning a certificate you already have
//!
//! ```no_run
//! use sslpin::cert::PeerCertificate;
//! use sslpin::pin::compute_pin;
//! use sslpin::types::HashAlgorithm;
//!
//! let der = std::fs::read("server.der").unwrap();
//! let cert = PeerCertificate::from_der(&der).unwrap();
//! println!("{}", compute_pin(&cert, HashAlgorithm::Sha256, "SHA-256"));
//! ```

pub mod cert;
pub mod connector;
pub mod error;
pub mod extractor;
pub mod pin;
pub mod trust;
pub mod types;

#[cfg(feature = "cli")]
pub mod cli;

pub use error::{Error, Result};

pub use cert::PeerCertificate;
pub use connector::Connector;
pub use extractor::{ChainObserver, PinExtractor, PinnedCertificate};
pub use pin::{compute_pin, normalize_algorithm_name, Pin};
pub use trust::{NativeTrustStore, PemBundleTrustStore, StaticTrustStore, TrustAnchorProvider};
pub use types::{HashAlgorithm, OutputFormat, PinOptions, Target, TrustSource};
