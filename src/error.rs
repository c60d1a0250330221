use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Unsupported hash algorithm: {0}")]
    UnsupportedAlgorithm(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Handshake error: {0}")]
    Handshake(String),

    #[error("DNS name error: {0}")]
    DnsName(String),

    #[error("Certificate parsing error: {0}")]
    CertParse(String),

    #[error("Trust store error: {0}")]
    TrustStore(String),

    #[error("TLS error: {0}")]
    Tls(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl Error {
    /// Argument and configuration errors are detected before any socket is
    /// opened; the CLI prints usage for these.
    pub fn is_usage_error(&self) -> bool {
        matches!(
            self,
            Error::InvalidArgument(_) | Error::UnsupportedAlgorithm(_)
        )
    }
}

impl From<rustls::Error> for Error {
    fn from(err: rustls::Error) -> Self {
        Error::Tls(err.to_string())
    }
}

impl From<x509_parser::error::X509Error> for Error {
    fn from(err: x509_parser::error::X509Error) -> Self {
        Error::CertParse(err.to_string())
    }
}

impl From<x509_parser::nom::Err<x509_parser::error::X509Error>> for Error {
    fn from(err: x509_parser::nom::Err<x509_parser::error::X509Error>) -> Self {
        Error::CertParse(err.to_string())
    }
}

#[cfg(feature = "json")]
impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
