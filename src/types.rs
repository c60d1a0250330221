use digest::Digest;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_PORT: u16 = 443;
pub const DEFAULT_HASH_ALGORITHM: &str = "SHA-256";
pub const DEFAULT_TIMEOUT_MS: u64 = 10_000;

/// Digest functions a pin can be computed with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashAlgorithm {
    Sha1,
    Sha224,
    Sha256,
    Sha384,
    Sha512,
    Sha512_224,
    Sha512_256,
    Sha3_224,
    Sha3_256,
    Sha3_384,
    Sha3_512,
}

impl HashAlgorithm {
    pub fn name(&self) -> &'static str {
        match self {
            HashAlgorithm::Sha1 => "SHA-1",
            HashAlgorithm::Sha224 => "SHA-224",
            HashAlgorithm::Sha256 => "SHA-256",
            HashAlgorithm::Sha384 => "SHA-384",
            HashAlgorithm::Sha512 => "SHA-512",
            HashAlgorithm::Sha512_224 => "SHA-512/224",
            HashAlgorithm::Sha512_256 => "SHA-512/256",
            HashAlgorithm::Sha3_224 => "SHA3-224",
            HashAlgorithm::Sha3_256 => "SHA3-256",
            HashAlgorithm::Sha3_384 => "SHA3-384",
            HashAlgorithm::Sha3_512 => "SHA3-512",
        }
    }

    /// Length of the digest in bytes.
    pub fn output_len(&self) -> usize {
        match self {
            HashAlgorithm::Sha1 => 20,
            HashAlgorithm::Sha224 | HashAlgorithm::Sha512_224 | HashAlgorithm::Sha3_224 => 28,
            HashAlgorithm::Sha256 | HashAlgorithm::Sha512_256 | HashAlgorithm::Sha3_256 => 32,
            HashAlgorithm::Sha384 | HashAlgorithm::Sha3_384 => 48,
            HashAlgorithm::Sha512 | HashAlgorithm::Sha3_512 => 64,
        }
    }

    pub fn digest(&self, data: &[u8]) -> Vec<u8> {
        match self {
            HashAlgorithm::Sha1 => sha1::Sha1::digest(data).to_vec(),
            HashAlgorithm::Sha224 => sha2::Sha224::digest(data).to_vec(),
            HashAlgorithm::Sha256 => sha2::Sha256::digest(data).to_vec(),
            HashAlgorithm::Sha384 => sha2::Sha384::digest(data).to_vec(),
            HashAlgorithm::Sha512 => sha2::Sha512::digest(data).to_vec(),
            HashAlgorithm::Sha512_224 => sha2::Sha512_224::digest(data).to_vec(),
            HashAlgorithm::Sha512_256 => sha2::Sha512_256::digest(data).to_vec(),
            HashAlgorithm::Sha3_224 => sha3::Sha3_224::digest(data).to_vec(),
            HashAlgorithm::Sha3_256 => sha3::Sha3_256::digest(data).to_vec(),
            HashAlgorithm::Sha3_384 => sha3::Sha3_384::digest(data).to_vec(),
            HashAlgorithm::Sha3_512 => sha3::Sha3_512::digest(data).to_vec(),
        }
    }
}

impl std::str::FromStr for HashAlgorithm {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key: String = s
            .trim()
            .chars()
            .filter(|c| *c != '-' && *c != '_')
            .collect::<String>()
            .to_ascii_lowercase();

        match key.as_str() {
            "sha" | "sha1" => Ok(HashAlgorithm::Sha1),
            "sha224" => Ok(HashAlgorithm::Sha224),
            "sha256" => Ok(HashAlgorithm::Sha256),
            "sha384" => Ok(HashAlgorithm::Sha384),
            "sha512" => Ok(HashAlgorithm::Sha512),
            "sha512/224" => Ok(HashAlgorithm::Sha512_224),
            "sha512/256" => Ok(HashAlgorithm::Sha512_256),
            "sha3224" => Ok(HashAlgorithm::Sha3_224),
            "sha3256" => Ok(HashAlgorithm::Sha3_256),
            "sha3384" => Ok(HashAlgorithm::Sha3_384),
            "sha3512" => Ok(HashAlgorithm::Sha3_512),
            _ => Err(crate::Error::UnsupportedAlgorithm(s.to_string())),
        }
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Host and port of the TLS endpoint to pin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub host: String,
    pub port: u16,
}

impl Target {
    pub fn new(host: impl Into<String>, port: u16) -> crate::Result<Self> {
        let host = host.into();
        if host.is_empty() {
            return Err(crate::Error::InvalidArgument(
                "Host must not be empty".to_string(),
            ));
        }
        if port == 0 {
            return Err(crate::Error::InvalidArgument(
                "Port must be between 1 and 65535".to_string(),
            ));
        }
        Ok(Self { host, port })
    }

    /// `host:port` string suitable for `ToSocketAddrs`.
    pub fn socket_addr_string(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

fn parse_port(port: &str) -> crate::Result<u16> {
    port.parse::<u16>()
        .map_err(|_| crate::Error::InvalidArgument(format!("Invalid port number '{}'", port)))
}

impl std::str::FromStr for Target {
    type Err = crate::Error;

    /// Accepts `host`, `host:port`, `[v6]`, `[v6]:port` and a bare IPv6
    /// address (more than one colon, no brackets) which gets the default port.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();

        if let Some(rest) = s.strip_prefix('[') {
            let (host, after) = rest.split_once(']').ok_or_else(|| {
                crate::Error::InvalidArgument(format!("Unterminated '[' in target '{}'", s))
            })?;
            let port = match after {
                "" => DEFAULT_PORT,
                _ => {
                    let port = after.strip_prefix(':').ok_or_else(|| {
                        crate::Error::InvalidArgument(format!(
                            "Target must be in format host[:port], got '{}'",
                            s
                        ))
                    })?;
                    parse_port(port)?
                }
            };
            return Target::new(host, port);
        }

        if s.matches(':').count() > 1 {
            return Target::new(s, DEFAULT_PORT);
        }

        match s.split_once(':') {
            None => Target::new(s, DEFAULT_PORT),
            Some((host, port)) => Target::new(host, parse_port(port)?),
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.socket_addr_string())
    }
}

/// Where root-completion certificates come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrustSource {
    /// The operating system's certificate store.
    Native,
    /// A PEM bundle of CA certificates.
    PemFile(PathBuf),
    /// No root completion.
    Disabled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Lines,
    #[cfg(feature = "json")]
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "lines" | "text" => Ok(OutputFormat::Lines),
            #[cfg(feature = "json")]
            "json" => Ok(OutputFormat::Json),
            _ => Err(crate::Error::InvalidArgument(format!(
                "Invalid format: {}",
                s
            ))),
        }
    }
}

/// Everything one pin-generation run needs.
#[derive(Debug, Clone)]
pub struct PinOptions {
    pub target: Target,
    pub algorithm: HashAlgorithm,
    /// The algorithm name as the operator wrote it; the pin label derives from it.
    pub algorithm_name: String,
    pub debug: bool,
    pub timeout: Duration,
    pub trust_source: TrustSource,
    pub format: OutputFormat,
}

impl PinOptions {
    /// Fails with `UnsupportedAlgorithm` before anything touches the network.
    pub fn new(target: Target, algorithm_name: impl Into<String>) -> crate::Result<Self> {
        let algorithm_name = algorithm_name.into();
        let algorithm = algorithm_name.parse::<HashAlgorithm>()?;

        Ok(Self {
            target,
            algorithm,
            algorithm_name,
            debug: false,
            timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
            trust_source: TrustSource::Native,
            format: OutputFormat::Lines,
        })
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> crate::Result<Self> {
        if timeout_ms == 0 {
            return Err(crate::Error::InvalidArgument(
                "Timeout must be greater than zero".to_string(),
            ));
        }
        self.timeout = Duration::from_millis(timeout_ms);
        Ok(self)
    }

    pub fn with_trust_source(mut self, source: TrustSource) -> Self {
        self.trust_source = source;
        self
    }

    pub fn with_format(mut self, format: OutputFormat) -> Self {
        self.format = format;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_algorithm_parsing() {
        assert_eq!("SHA-256".parse::<HashAlgorithm>().unwrap(), HashAlgorithm::Sha256);
        assert_eq!("sha256".parse::<HashAlgorithm>().unwrap(), HashAlgorithm::Sha256);
        assert_eq!("Sha-1".parse::<HashAlgorithm>().unwrap(), HashAlgorithm::Sha1);
        assert_eq!(
            "SHA-512/256".parse::<HashAlgorithm>().unwrap(),
            HashAlgorithm::Sha512_256
        );
        assert_eq!("sha3-384".parse::<HashAlgorithm>().unwrap(), HashAlgorithm::Sha3_384);
        assert!(matches!(
            "md4".parse::<HashAlgorithm>(),
            Err(crate::Error::UnsupportedAlgorithm(_))
        ));
    }

    #[test]
    fn test_digest_lengths() {
        for algo in [
            HashAlgorithm::Sha1,
            HashAlgorithm::Sha224,
            HashAlgorithm::Sha256,
            HashAlgorithm::Sha384,
            HashAlgorithm::Sha512,
            HashAlgorithm::Sha512_224,
            HashAlgorithm::Sha512_256,
            HashAlgorithm::Sha3_224,
            HashAlgorithm::Sha3_256,
            HashAlgorithm::Sha3_384,
            HashAlgorithm::Sha3_512,
        ] {
            assert_eq!(algo.digest(b"spki").len(), algo.output_len(), "{}", algo);
        }
    }

    #[test]
    fn test_target_parsing() {
        assert_eq!(
            "example.com".parse::<Target>().unwrap(),
            Target::new("example.com", 443).unwrap()
        );
        assert_eq!(
            "example.com:8443".parse::<Target>().unwrap(),
            Target::new("example.com", 8443).unwrap()
        );
        assert_eq!("[::1]:8443".parse::<Target>().unwrap().host, "::1");
        assert_eq!("[::1]".parse::<Target>().unwrap().port, 443);
        assert_eq!("2001:db8::1".parse::<Target>().unwrap().port, 443);
    }

    #[test]
    fn test_target_rejects_malformed() {
        assert!(matches!(
            "notahost:notaport".parse::<Target>(),
            Err(crate::Error::InvalidArgument(_))
        ));
        assert!("example.com:0".parse::<Target>().is_err());
        assert!("example.com:70000".parse::<Target>().is_err());
        assert!(":443".parse::<Target>().is_err());
        assert!("".parse::<Target>().is_err());
        assert!("[::1:443".parse::<Target>().is_err());
    }

    #[test]
    fn test_target_display_brackets_ipv6() {
        let target = Target::new("::1", 8443).unwrap();
        assert_eq!(target.to_string(), "[::1]:8443");
        assert_eq!(Target::new("a.example", 443).unwrap().to_string(), "a.example:443");
    }

    #[test]
    fn test_pin_options_validation() {
        let target = Target::new("example.com", 443).unwrap();
        let options = PinOptions::new(target.clone(), "SHA-256").unwrap();
        assert_eq!(options.timeout, Duration::from_millis(DEFAULT_TIMEOUT_MS));
        assert!(!options.debug);
        assert_eq!(options.trust_source, TrustSource::Native);

        assert!(PinOptions::new(target.clone(), "whirlpool").is_err());
        assert!(PinOptions::new(target, "SHA-1")
            .unwrap()
            .with_timeout_ms(0)
            .is_err());
    }
}
