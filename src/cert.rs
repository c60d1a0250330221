use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use x509_parser::der_parser::oid::Oid;
use x509_parser::prelude::*;

/// Owned view of one certificate, detached from the TLS layer's buffers.
#[derive(Debug, Clone)]
pub struct PeerCertificate {
    pub der: Vec<u8>,
    /// DER-encoded SubjectPublicKeyInfo, tag and length included.
    pub subject_public_key_info: Vec<u8>,
    pub subject: String,
    pub issuer: String,
    pub not_after: DateTime<Utc>,
}

impl PeerCertificate {
    pub fn from_der(der: &[u8]) -> Result<Self> {
        let (_, x509) = X509Certificate::from_der(der)?;

        let not_after_ts = x509.validity().not_after.timestamp();
        let not_after = DateTime::<Utc>::from_timestamp(not_after_ts, 0).ok_or_else(|| {
            Error::CertParse(format!("notAfter out of range: {}", not_after_ts))
        })?;

        Ok(Self {
            der: der.to_vec(),
            subject_public_key_info: x509.public_key().raw.to_vec(),
            subject: canonical_name(x509.subject()),
            issuer: canonical_name(x509.issuer()),
            not_after,
        })
    }

    /// Subject and issuer are the same name, i.e. the certificate is a root
    /// (or otherwise terminates the chain).
    pub fn is_self_issued(&self) -> bool {
        self.subject == self.issuer
    }
}

/// Renders a distinguished name in RFC 2253 form: last RDN first, RDNs joined
/// by `,`, multi-valued RDNs joined by `+`. Non-string values become `#hex`.
pub fn canonical_name(name: &X509Name) -> String {
    let rdns: Vec<String> = name
        .iter()
        .map(|rdn| {
            rdn.iter()
                .map(|attr| {
                    let value = match attr.as_str() {
                        Ok(s) => escape_value(s),
                        Err(_) => format!("#{}", hex(attr.attr_value().data)),
                    };
                    format!("{}={}", attribute_keyword(attr.attr_type()), value)
                })
                .collect::<Vec<_>>()
                .join("+")
        })
        .collect();

    rdns.into_iter().rev().collect::<Vec<_>>().join(",")
}

fn attribute_keyword(oid: &Oid) -> String {
    let dotted = oid.to_id_string();
    let keyword = match dotted.as_str() {
        "2.5.4.3" => "CN",
        "2.5.4.6" => "C",
        "2.5.4.7" => "L",
        "2.5.4.8" => "ST",
        "2.5.4.9" => "STREET",
        "2.5.4.10" => "O",
        "2.5.4.11" => "OU",
        "0.9.2342.19200300.100.1.1" => "UID",
        "0.9.2342.19200300.100.1.25" => "DC",
        _ => return dotted,
    };
    keyword.to_string()
}

fn escape_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let last = value.chars().count().saturating_sub(1);

    for (idx, c) in value.chars().enumerate() {
        let needs_escape = matches!(c, ',' | '+' | '"' | '\\' | '<' | '>' | ';')
            || (idx == 0 && (c == '#' || c == ' '))
            || (idx == last && c == ' ');
        if needs_escape {
            out.push('\\');
        }
        out.push(c);
    }

    out
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}
