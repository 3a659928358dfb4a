use thiserror::Error;

/// Everything that can stop a check from reaching a Secure/NotSecure verdict.
#[derive(Error, Debug)]
pub enum PinningError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error(transparent)]
    Connection(#[from] ConnectionFailure),

    #[error("{0} MessageDigest not available")]
    UnsupportedAlgorithm(String),

    #[error("unexpected failure: {0}")]
    Unexpected(String),
}

#[derive(Error, Debug)]
pub enum ConnectionFailure {
    #[error("malformed url '{url}': {reason}")]
    MalformedUrl { url: String, reason: String },

    #[error("unsupported url scheme '{0}'")]
    UnsupportedScheme(String),

    #[error("connect to {addr} failed: {source}")]
    Connect {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("tls handshake with {host} failed: {source}")]
    Handshake {
        host: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{stage} timed out after {millis} ms")]
    Timeout { stage: &'static str, millis: u64 },

    #[error("i/o error while {stage}: {source}")]
    Io {
        stage: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("peer presented no certificate")]
    EmptyCertificateChain,

    #[error("tls configuration error: {0}")]
    TlsConfig(String),

    #[error("check cancelled")]
    Cancelled,
}

impl ConnectionFailure {
    pub fn is_timeout(&self) -> bool {
        matches!(self, ConnectionFailure::Timeout { .. })
    }
}

pub type Result<T> = std::result::Result<T, PinningError>;
