use crate::cert::PeerCertificate;
use crate::error::{Error, Result};
use crate::extractor::ChainObserver;
use crate::types::Target;
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::{verify_tls12_signature, verify_tls13_signature, CryptoProvider};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{ClientConfig, ClientConnection, DigitallySignedStruct, SignatureScheme};
use std::io;
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Certificate verifier that hands the peer's chain to a [`ChainObserver`]
/// and accepts it unconditionally. Handshake signatures are still checked
/// against the certificate the peer actually sent.
struct ObservingVerifier {
    observer: Arc<dyn ChainObserver>,
    provider: Arc<CryptoProvider>,
    delivered: Arc<AtomicUsize>,
}

impl std::fmt::Debug for ObservingVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObservingVerifier")
            .field("delivered", &self.delivered.load(Ordering::SeqCst))
            .finish()
    }
}

impl ServerCertVerifier for ObservingVerifier {
    fn verify_server_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> std::result::Result<ServerCertVerified, rustls::Error> {
        let chain: Vec<PeerCertificate> = std::iter::once(end_entity)
            .chain(intermediates.iter())
            .enumerate()
            .filter_map(|(idx, der)| match PeerCertificate::from_der(der.as_ref()) {
                Ok(cert) => Some(cert),
                Err(e) => {
                    warn!("Cannot pin certificate {} of the peer chain: {}", idx, e);
                    None
                }
            })
            .collect();

        self.delivered
            .fetch_add(1 + intermediates.len(), Ordering::SeqCst);
        self.observer.on_peer_chain(&chain);

        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls12_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls13_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.provider
            .signature_verification_algorithms
            .supported_schemes()
    }
}

/// Owns the single TCP + TLS connection of one pin-generation run.
#[derive(Debug, Clone)]
pub struct Connector {
    target: Target,
    timeout: Duration,
}

impl Connector {
    pub fn new(target: Target, timeout: Duration) -> Self {
        Self { target, timeout }
    }

    /// Connects, drives the TLS handshake to completion and closes again.
    ///
    /// `observer` is called from inside the handshake with the chain the peer
    /// sent. Whatever it emitted stays emitted if the handshake fails later.
    pub fn run(&self, observer: Arc<dyn ChainObserver>) -> Result<()> {
        let server_name = ServerName::try_from(self.target.host.clone())
            .map_err(|e| Error::DnsName(format!("Invalid DNS name '{}': {}", self.target.host, e)))?;

        let delivered = Arc::new(AtomicUsize::new(0));
        let config = self.client_config(observer, delivered.clone())?;

        let mut conn = ClientConnection::new(config, server_name)
            .map_err(|e| Error::Tls(format!("Failed to create TLS connection: {}", e)))?;

        let mut sock = self.connect()?;
        sock.set_write_timeout(Some(self.timeout))?;

        let result = self.handshake(&mut conn, &mut sock, &delivered);
        self.close(&mut conn, &mut sock);

        result
    }

    /// Sends close_notify along with anything still buffered, without reading
    /// from the peer again.
    fn close(&self, conn: &mut ClientConnection, sock: &mut TcpStream) {
        conn.send_close_notify();
        while conn.wants_write() {
            if let Err(e) = conn.write_tls(sock) {
                debug!("close_notify not delivered: {}", e);
                break;
            }
        }
        let _ = sock.shutdown(Shutdown::Both);
    }

    fn client_config(
        &self,
        observer: Arc<dyn ChainObserver>,
        delivered: Arc<AtomicUsize>,
    ) -> Result<Arc<ClientConfig>> {
        let provider = Arc::new(rustls::crypto::ring::default_provider());
        let verifier = ObservingVerifier {
            observer,
            provider: provider.clone(),
            delivered,
        };

        let config = ClientConfig::builder_with_provider(provider)
            .with_protocol_versions(rustls::ALL_VERSIONS)?
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(verifier))
            .with_no_client_auth();

        Ok(Arc::new(config))
    }

    fn connect(&self) -> Result<TcpStream> {
        let addr = self.target.socket_addr_string();
        let addrs: Vec<SocketAddr> = addr
            .to_socket_addrs()
            .map_err(|e| Error::Connection(format!("Failed to resolve {}: {}", addr, e)))?
            .collect();

        let mut last_err: Option<io::Error> = None;
        for sock_addr in &addrs {
            debug!("Connecting to {} ({})", addr, sock_addr);
            match TcpStream::connect_timeout(sock_addr, self.timeout) {
                Ok(sock) => return Ok(sock),
                Err(e) => {
                    debug!("Connection to {} failed: {}", sock_addr, e);
                    last_err = Some(e);
                }
            }
        }

        match last_err {
            Some(e) if is_timeout(&e) => Err(Error::Timeout(format!(
                "Connecting to {} took longer than {} ms",
                addr,
                self.timeout.as_millis()
            ))),
            Some(e) => Err(Error::Connection(format!(
                "Failed to connect to {}: {}",
                addr, e
            ))),
            None => Err(Error::Connection(format!(
                "No addresses found for {}",
                addr
            ))),
        }
    }

    fn handshake(
        &self,
        conn: &mut ClientConnection,
        sock: &mut TcpStream,
        delivered: &AtomicUsize,
    ) -> Result<()> {
        let deadline = Instant::now() + self.timeout;

        while conn.is_handshaking() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(self.timeout_error());
            }
            sock.set_read_timeout(Some(remaining))?;

            if let Err(e) = conn.complete_io(sock) {
                if is_timeout(&e) {
                    return Err(self.timeout_error());
                }
                return Err(match delivered.load(Ordering::SeqCst) {
                    0 => Error::Handshake(format!("no certificates received: {}", e)),
                    _ => Error::Handshake(e.to_string()),
                });
            }
        }

        debug!(
            "Handshake with {} complete ({:?})",
            self.target,
            conn.protocol_version()
        );
        Ok(())
    }

    fn timeout_error(&self) -> Error {
        Error::Timeout(format!(
            "TLS handshake with {} took longer than {} ms",
            self.target,
            self.timeout.as_millis()
        ))
    }
}

fn is_timeout(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock
    )
}
