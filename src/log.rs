use chrono::Local;
use std::sync::atomic::Ordering;
use uuid::Uuid;

use crate::types::{FingerprintDigest, PinningRequest, VerificationOutcome};
use crate::LOG_ENABLED;

pub fn log_line(msg: &str) {
    if !LOG_ENABLED.load(Ordering::Relaxed) {
        return;
    }
    let now = Local::now().format("%H:%M:%S");
    println!("{} {}", now, msg);
}

pub fn log_error(msg: &str) {
    if !LOG_ENABLED.load(Ordering::Relaxed) {
        return;
    }
    let now = Local::now().format("%H:%M:%S");
    eprintln!("{} {}", now, msg);
}

pub fn log_check_start(id: &Uuid, request: &PinningRequest) {
    log_line(&format!(
        "[{}] 🔎 check {} {} alg={} strict={} pins={}",
        id,
        request.http_method,
        request.url,
        request.digest_algorithm,
        request.strict_tls_validation,
        request.allowed_fingerprints.len()
    ));
    if !request.strict_tls_validation {
        log_line(&format!("[{}] ⚠️ certificate and hostname validation disabled", id));
    }
}

pub fn log_leaf(id: &Uuid, der_len: usize, fingerprint: &FingerprintDigest) {
    log_line(&format!(
        "[{}] 📜 leaf certificate ({} bytes) fingerprint={}",
        id,
        der_len,
        fingerprint.colon_separated()
    ));
}

pub fn log_status_line(id: &Uuid, status: Option<&str>) {
    match status {
        Some(line) => log_line(&format!("[{}] 📥 {}", id, line)),
        None => log_line(&format!("[{}] 📥 no response head before close", id)),
    }
}

pub fn log_outcome(id: &Uuid, outcome: &VerificationOutcome) {
    match outcome {
        VerificationOutcome::Secure => log_line(&format!("[{}] ✅ fingerprint matches", id)),
        VerificationOutcome::NotSecure => log_line(&format!("[{}] ❌ fingerprint doesn't match", id)),
        other => log_error(&format!("[{}] ❌ {}: {}", id, other.kind(), other)),
    }
}
