pub mod types;
pub mod error;
pub mod log;
pub mod config;
pub mod ssl_verifiers;
pub mod connector;
pub mod verifier;
pub mod check;
pub mod channel;

pub use check::{check, check_with_cancellation, check_with_config};
pub use error::{ConnectionFailure, PinningError};
pub use types::{
    DigestAlgorithm, FingerprintDigest, HttpMethod, LeafCertificate, PinningRequest,
    VerificationOutcome,
};

use std::sync::atomic::AtomicBool;
pub static LOG_ENABLED: AtomicBool = AtomicBool::new(true);
