use crate::cert::PeerCertificate;
use crate::error::Result;
use crate::pin::{compute_pin, Pin};
use crate::types::{HashAlgorithm, PinOptions};
use chrono::{DateTime, Utc};
use std::io::{self, Write};
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, warn};

/// Receives the certificate chain a peer sent during the handshake.
///
/// Observers see the chain leaf first, in the order it arrived. They have no
/// say in whether the handshake proceeds.
pub trait ChainObserver: Send + Sync {
    fn on_peer_chain(&self, chain: &[PeerCertificate]);
}

/// One emitted pin with the certificate details that go with it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PinnedCertificate {
    pub position: usize,
    pub subject: String,
    pub issuer: String,
    pub not_after: DateTime<Utc>,
    /// Came from the local trust store rather than the peer.
    pub from_trust_store: bool,
    pub pin: Pin,
}

/// Walks a presented chain, completes it from the trust anchors and writes
/// one pin line per certificate.
pub struct PinExtractor {
    algorithm: HashAlgorithm,
    algorithm_name: String,
    debug: bool,
    anchors: Vec<PeerCertificate>,
    sink: Mutex<Box<dyn Write + Send>>,
    emitted: Mutex<Vec<PinnedCertificate>>,
}

impl PinExtractor {
    /// Fails on an unsupported algorithm name.
    pub fn new(algorithm_name: impl Into<String>, anchors: Vec<PeerCertificate>) -> Result<Self> {
        let algorithm_name = algorithm_name.into();
        let algorithm = algorithm_name.parse::<HashAlgorithm>()?;

        Ok(Self {
            algorithm,
            algorithm_name,
            debug: false,
            anchors,
            sink: Mutex::new(Box::new(io::stdout())),
            emitted: Mutex::new(Vec::new()),
        })
    }

    pub fn from_options(options: &PinOptions, anchors: Vec<PeerCertificate>) -> Self {
        Self {
            algorithm: options.algorithm,
            algorithm_name: options.algorithm_name.clone(),
            debug: options.debug,
            anchors,
            sink: Mutex::new(Box::new(io::stdout())),
            emitted: Mutex::new(Vec::new()),
        }
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn with_sink(mut self, sink: impl Write + Send + 'static) -> Self {
        self.sink = Mutex::new(Box::new(sink));
        self
    }

    /// Computes the pins for `chain` without writing anything.
    ///
    /// The presented certificates come first, in order. If the last one is
    /// not self-issued, every trust anchor whose subject equals its issuer
    /// follows, in trust-store order and without deduplication.
    pub fn pins_for_chain(&self, chain: &[PeerCertificate]) -> Vec<PinnedCertificate> {
        let mut pinned: Vec<PinnedCertificate> = chain
            .iter()
            .map(|cert| self.pin_certificate(cert, false))
            .collect();

        // A chain ending in a self-issued certificate already carries its
        // root; looking it up again would print that root a second time.
        let last_issuer = match chain.last() {
            Some(last) if !last.is_self_issued() => &last.issuer,
            _ => return self.numbered(pinned),
        };

        let completions = self
            .anchors
            .iter()
            .filter(|anchor| anchor.subject == *last_issuer)
            .map(|anchor| self.pin_certificate(anchor, true));
        pinned.extend(completions);

        self.numbered(pinned)
    }

    /// Everything emitted so far.
    pub fn emitted(&self) -> Vec<PinnedCertificate> {
        lock(&self.emitted).clone()
    }

    fn pin_certificate(&self, cert: &PeerCertificate, from_trust_store: bool) -> PinnedCertificate {
        PinnedCertificate {
            position: 0,
            subject: cert.subject.clone(),
            issuer: cert.issuer.clone(),
            not_after: cert.not_after,
            from_trust_store,
            pin: compute_pin(cert, self.algorithm, &self.algorithm_name),
        }
    }

    fn numbered(&self, mut pinned: Vec<PinnedCertificate>) -> Vec<PinnedCertificate> {
        for (position, entry) in pinned.iter_mut().enumerate() {
            entry.position = position;
        }
        pinned
    }

    fn render(&self, entry: &PinnedCertificate) -> String {
        let mut out = String::new();
        if self.debug {
            out.push_str(&format!("{}. Subject :  {}\n", entry.position, entry.subject));
            out.push_str(&format!(
                "Expiry date :  {}\n",
                entry.not_after.to_rfc2822()
            ));
        }
        out.push_str(&format!("{}\n", entry.pin));
        out
    }
}

impl ChainObserver for PinExtractor {
    fn on_peer_chain(&self, chain: &[PeerCertificate]) {
        let pinned = self.pins_for_chain(chain);
        debug!(
            "Peer sent {} certificates, emitting {} pins",
            chain.len(),
            pinned.len()
        );

        {
            let mut sink = lock(&self.sink);
            for entry in &pinned {
                if let Err(e) = sink.write_all(self.render(entry).as_bytes()) {
                    warn!("Failed to write pin: {}", e);
                }
            }
            if let Err(e) = sink.flush() {
                warn!("Failed to flush pins: {}", e);
            }
        }

        lock(&self.emitted).extend(pinned);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(feature = "json")]
pub fn display_json(target: &crate::types::Target, pins: &[PinnedCertificate]) -> Result<String> {
    use serde::Serialize;

    #[derive(Serialize)]
    struct JsonPin {
        position: usize,
        subject: String,
        issuer: String,
        not_after: String,
        from_trust_store: bool,
        pin: String,
    }

    #[derive(Serialize)]
    struct JsonReport {
        host: String,
        port: u16,
        total_pins: usize,
        pins: Vec<JsonPin>,
    }

    let report = JsonReport {
        host: target.host.clone(),
        port: target.port,
        total_pins: pins.len(),
        pins: pins
            .iter()
            .map(|entry| JsonPin {
                position: entry.position,
                subject: entry.subject.clone(),
                issuer: entry.issuer.clone(),
                not_after: entry.not_after.to_rfc3339(),
                from_trust_store: entry.from_trust_store,
                pin: entry.pin.to_string(),
            })
            .collect(),
    };

    Ok(serde_json::to_string_pretty(&report)?)
}


#[cfg(test)]
mod tests {
    use super::test_support::SharedBuffer;
    use super::*;
    use crate::cert::test_support::{leaf_and_root, self_signed};
    use rcgen::KeyPair;

    fn parse(der: &[u8]) -> PeerCertificate {
        PeerCertificate::from_der(der).unwrap()
    }

    #[test]
    fn test_unsupported_algorithm_fails_fast() {
        assert!(matches!(
            PinExtractor::new("ROT-13", vec![]),
            Err(crate::Error::UnsupportedAlgorithm(_))
        ));
    }

    #[test]
    fn test_empty_chain_emits_nothing() {
        let (_, root) = leaf_and_root("leaf.example", "Empty Root");
        let out = SharedBuffer::default();
        let extractor = PinExtractor::new("SHA-256", vec![parse(&root)])
            .unwrap()
            .with_sink(out.clone());

        extractor.on_peer_chain(&[]);

        assert!(extractor.emitted().is_empty());
        assert_eq!(out.contents(), "");
    }

    #[test]
    fn test_truncated_chain_is_completed_from_anchors() {
        let (leaf, root) = leaf_and_root("leaf.example", "Completion Root");
        let unrelated = self_signed("unrelated.example", &KeyPair::generate().unwrap());
        let anchors = vec![parse(&unrelated), parse(&root)];

        let out = SharedBuffer::default();
        let extractor = PinExtractor::new("SHA-256", anchors)
            .unwrap()
            .with_sink(out.clone());

        extractor.on_peer_chain(&[parse(&leaf)]);

        let emitted = extractor.emitted();
        assert_eq!(emitted.len(), 2);
        assert!(!emitted[0].from_trust_store);
        assert!(emitted[1].from_trust_store);
        assert_eq!(emitted[1].position, 1);
        assert_eq!(emitted[1].subject, "CN=Completion Root,O=Pin Test Org");

        let contents = out.contents();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines.iter().all(|l| l.starts_with("sha256/")));
        assert_eq!(lines[1], emitted[1].pin.to_string());
    }

    #[test]
    fn test_no_matching_anchor() {
        let (leaf, _) = leaf_and_root("leaf.example", "Missing Root");
        let (intermediate, _) = leaf_and_root("intermediate.example", "Other Root");
        let out = SharedBuffer::default();
        let extractor = PinExtractor::new("SHA-256", vec![])
            .unwrap()
            .with_sink(out.clone());

        extractor.on_peer_chain(&[parse(&leaf), parse(&intermediate)]);

        let contents = out.contents();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        for line in lines {
            let (label, digest) = line.split_once('/').unwrap();
            assert_eq!(label, "sha256");
            assert_eq!(digest.len(), 44);
        }
    }

    #[test]
    fn test_duplicate_subjects_are_not_deduplicated() {
        let (leaf, root) = leaf_and_root("leaf.example", "Twin Root");
        let anchors = vec![parse(&root), parse(&root)];
        let extractor = PinExtractor::new("sha1", anchors)
            .unwrap()
            .with_sink(io::sink());

        let pins = extractor.pins_for_chain(&[parse(&leaf)]);
        assert_eq!(pins.len(), 3);
        assert_eq!(pins[1].pin, pins[2].pin);
        assert_eq!(pins[2].position, 2);
    }

    #[test]
    fn test_self_issued_chain_end_skips_lookup() {
        let (_, root) = leaf_and_root("leaf.example", "Complete Root");
        let extractor = PinExtractor::new("SHA-256", vec![parse(&root)])
            .unwrap()
            .with_sink(io::sink());

        let pins = extractor.pins_for_chain(&[parse(&root)]);
        assert_eq!(pins.len(), 1);
        assert!(!pins[0].from_trust_store);
    }

    #[test]
    fn test_debug_output() {
        let (leaf, _) = leaf_and_root("leaf.example", "Debug Root");
        let out = SharedBuffer::default();
        let extractor = PinExtractor::new("SHA-512", vec![])
            .unwrap()
            .with_debug(true)
            .with_sink(out.clone());

        extractor.on_peer_chain(&[parse(&leaf)]);

        let contents = out.contents();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "0. Subject :  CN=leaf.example");
        assert!(lines[1].starts_with("Expiry date :  "));
        assert!(lines[1].contains("2034"));
        assert!(lines[2].starts_with("sha512/"));
    }

    #[cfg(feature = "json")]
    #[test]
    fn test_display_json() {
        let (leaf, _) = leaf_and_root("leaf.example", "Json Root");
        let extractor = PinExtractor::new("SHA-256", vec![])
            .unwrap()
            .with_sink(io::sink());
        let pins = extractor.pins_for_chain(&[parse(&leaf)]);
        let target = crate::types::Target::new("example.com", 443).unwrap();

        let json = display_json(&target, &pins).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["total_pins"], 1);
        assert_eq!(value["pins"][0]["pin"], pins[0].pin.to_string());
        assert_eq!(value["pins"][0]["subject"], "CN=leaf.example");
    }
}
