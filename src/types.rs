use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use crate::error::{ConnectionFailure, PinningError};

pub const DEFAULT_DIGEST_ALGORITHM: &str = "SHA-256";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HttpMethod {
    #[default]
    Get,
    Head,
}

impl HttpMethod {
    /// Channel spelling: only "Head" selects HEAD, anything else is GET.
    pub fn from_channel_name(name: &str) -> Self {
        if name == "Head" {
            HttpMethod::Head
        } else {
            HttpMethod::Get
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Head => "HEAD",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Hash algorithms a fingerprint can be computed with, named the way
/// `java.security.MessageDigest` names them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DigestAlgorithm {
    Md5,
    Sha1,
    Sha224,
    Sha256,
    Sha384,
    Sha512,
    Sha512_224,
    Sha512_256,
}

impl DigestAlgorithm {
    pub const ALL: [DigestAlgorithm; 8] = [
        DigestAlgorithm::Md5,
        DigestAlgorithm::Sha1,
        DigestAlgorithm::Sha224,
        DigestAlgorithm::Sha256,
        DigestAlgorithm::Sha384,
        DigestAlgorithm::Sha512,
        DigestAlgorithm::Sha512_224,
        DigestAlgorithm::Sha512_256,
    ];

    /// Case-insensitive lookup. "SHA256" and "SHA-256" are both accepted.
    pub fn from_name(name: &str) -> Option<Self> {
        let upper = name.trim().to_ascii_uppercase();
        let algorithm = match upper.as_str() {
            "MD5" => DigestAlgorithm::Md5,
            "SHA" | "SHA1" | "SHA-1" => DigestAlgorithm::Sha1,
            "SHA224" | "SHA-224" => DigestAlgorithm::Sha224,
            "SHA256" | "SHA-256" => DigestAlgorithm::Sha256,
            "SHA384" | "SHA-384" => DigestAlgorithm::Sha384,
            "SHA512" | "SHA-512" => DigestAlgorithm::Sha512,
            "SHA512/224" | "SHA-512/224" => DigestAlgorithm::Sha512_224,
            "SHA512/256" | "SHA-512/256" => DigestAlgorithm::Sha512_256,
            _ => return None,
        };
        Some(algorithm)
    }

    pub fn name(&self) -> &'static str {
        match self {
            DigestAlgorithm::Md5 => "MD5",
            DigestAlgorithm::Sha1 => "SHA-1",
            DigestAlgorithm::Sha224 => "SHA-224",
            DigestAlgorithm::Sha256 => "SHA-256",
            DigestAlgorithm::Sha384 => "SHA-384",
            DigestAlgorithm::Sha512 => "SHA-512",
            DigestAlgorithm::Sha512_224 => "SHA-512/224",
            DigestAlgorithm::Sha512_256 => "SHA-512/256",
        }
    }

    /// Digest length in bytes.
    pub fn output_len(&self) -> usize {
        match self {
            DigestAlgorithm::Md5 => 16,
            DigestAlgorithm::Sha1 => 20,
            DigestAlgorithm::Sha224 | DigestAlgorithm::Sha512_224 => 28,
            DigestAlgorithm::Sha256 | DigestAlgorithm::Sha512_256 => 32,
            DigestAlgorithm::Sha384 => 48,
            DigestAlgorithm::Sha512 => 64,
        }
    }
}

impl FromStr for DigestAlgorithm {
    type Err = PinningError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DigestAlgorithm::from_name(s).ok_or_else(|| PinningError::UnsupportedAlgorithm(s.to_string()))
    }
}

impl fmt::Display for DigestAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One pinning check: where to connect, how, and which fingerprints are acceptable.
#[derive(Debug, Clone)]
pub struct PinningRequest {
    pub url: String,
    pub allowed_fingerprints: Vec<String>,
    pub http_method: HttpMethod,
    pub headers: HashMap<String, String>,
    /// Connect/read timeout; 0 means unset.
    pub timeout_millis: u64,
    pub digest_algorithm: String,
    /// `false` switches to the accept-any-certificate trust context.
    pub strict_tls_validation: bool,
}

impl PinningRequest {
    pub fn new(url: impl Into<String>, allowed_fingerprints: Vec<String>) -> Self {
        Self {
            url: url.into(),
            allowed_fingerprints,
            http_method: HttpMethod::Get,
            headers: HashMap::new(),
            timeout_millis: 0,
            digest_algorithm: DEFAULT_DIGEST_ALGORITHM.to_string(),
            strict_tls_validation: true,
        }
    }

    pub fn with_method(mut self, method: HttpMethod) -> Self {
        self.http_method = method;
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn with_timeout_millis(mut self, millis: u64) -> Self {
        self.timeout_millis = millis;
        self
    }

    pub fn with_digest_algorithm(mut self, algorithm: impl Into<String>) -> Self {
        self.digest_algorithm = algorithm.into();
        self
    }

    /// Diagnostic mode: self-signed and hostname-mismatched servers are accepted.
    pub fn permissive(mut self) -> Self {
        self.strict_tls_validation = false;
        self
    }
}

/// DER bytes of the first certificate the peer presented.
#[derive(Clone, PartialEq, Eq)]
pub struct LeafCertificate(Vec<u8>);

impl LeafCertificate {
    pub fn from_der(der: Vec<u8>) -> Self {
        Self(der)
    }

    pub fn as_der(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for LeafCertificate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LeafCertificate({} bytes)", self.0.len())
    }
}

/// Uppercase hex digest without separators. Only `verifier::digest` builds one.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FingerprintDigest(String);

impl FingerprintDigest {
    pub(crate) fn from_normalized(hex: String) -> Self {
        Self(hex)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// OpenSSL display form, e.g. `AB:CD:EF`.
    pub fn colon_separated(&self) -> String {
        self.0
            .as_bytes()
            .chunks(2)
            .filter_map(|c| std::str::from_utf8(c).ok())
            .collect::<Vec<_>>()
            .join(":")
    }
}

impl fmt::Display for FingerprintDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for FingerprintDigest {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Terminal result of one check. `NotSecure` is a verdict, not a failure.
#[derive(Debug)]
pub enum VerificationOutcome {
    Secure,
    NotSecure,
    ConnectionError(ConnectionFailure),
    UnsupportedAlgorithm(String),
    InvalidRequest(String),
    UnexpectedFailure(String),
}

impl VerificationOutcome {
    pub fn is_secure(&self) -> bool {
        matches!(self, VerificationOutcome::Secure)
    }

    /// Both `Secure` and `NotSecure` mean the peer was actually reached.
    pub fn is_verdict(&self) -> bool {
        matches!(self, VerificationOutcome::Secure | VerificationOutcome::NotSecure)
    }

    pub fn kind(&self) -> &'static str {
        match self {
            VerificationOutcome::Secure => "Secure",
            VerificationOutcome::NotSecure => "FingerprintMismatch",
            VerificationOutcome::ConnectionError(_) => "ConnectionFailure",
            VerificationOutcome::UnsupportedAlgorithm(_) => "UnsupportedAlgorithm",
            VerificationOutcome::InvalidRequest(_) => "InvalidRequest",
            VerificationOutcome::UnexpectedFailure(_) => "UnexpectedFailure",
        }
    }
}

impl From<bool> for VerificationOutcome {
    fn from(matched: bool) -> Self {
        if matched {
            VerificationOutcome::Secure
        } else {
            VerificationOutcome::NotSecure
        }
    }
}

impl From<PinningError> for VerificationOutcome {
    fn from(err: PinningError) -> Self {
        match err {
            PinningError::InvalidRequest(reason) => VerificationOutcome::InvalidRequest(reason),
            PinningError::Connection(failure) => VerificationOutcome::ConnectionError(failure),
            PinningError::UnsupportedAlgorithm(name) => VerificationOutcome::UnsupportedAlgorithm(name),
            PinningError::Unexpected(reason) => VerificationOutcome::UnexpectedFailure(reason),
        }
    }
}

impl fmt::Display for VerificationOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VerificationOutcome::Secure => f.write_str("connection is secure"),
            VerificationOutcome::NotSecure => f.write_str("fingerprint doesn't match"),
            VerificationOutcome::ConnectionError(failure) => write!(f, "{}", failure),
            VerificationOutcome::UnsupportedAlgorithm(name) => {
                write!(f, "{}", PinningError::UnsupportedAlgorithm(name.clone()))
            }
            VerificationOutcome::InvalidRequest(reason) => write!(f, "invalid request: {}", reason),
            VerificationOutcome::UnexpectedFailure(reason) => write!(f, "unexpected failure: {}", reason),
        }
    }
}
