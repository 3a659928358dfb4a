use dotenvy::dotenv;
use std::env;
use std::sync::atomic::Ordering;
use std::time::Duration;

use crate::error::{PinningError, Result};
use crate::types::{HttpMethod, PinningRequest, DEFAULT_DIGEST_ALGORITHM};
use crate::LOG_ENABLED;

pub const DEFAULT_FALLBACK_READ_TIMEOUT_MS: u64 = 5000;
pub const DEFAULT_MAX_RESPONSE_HEAD: usize = 8 * 1024;

/// Engine-wide knobs. Nothing here is per-request.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Read timeout used in non-strict mode when the request leaves it unset.
    pub fallback_read_timeout: Duration,
    /// Upper bound on bytes read while waiting for the response status line.
    pub max_response_head: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            fallback_read_timeout: Duration::from_millis(DEFAULT_FALLBACK_READ_TIMEOUT_MS),
            max_response_head: DEFAULT_MAX_RESPONSE_HEAD,
        }
    }
}

impl EngineConfig {
    /// Reads `.env` (if any) then `PINNING_FALLBACK_READ_TIMEOUT_MS` and `PINNING_LOG`.
    pub fn from_env() -> Result<Self> {
        let _ = dotenv();
        let mut config = EngineConfig::default();

        if let Some(ms) = env_var("PINNING_FALLBACK_READ_TIMEOUT_MS") {
            let ms = parse_u64("PINNING_FALLBACK_READ_TIMEOUT_MS", &ms)?;
            config.fallback_read_timeout = Duration::from_millis(ms);
        }
        if let Some(flag) = env_var("PINNING_LOG") {
            LOG_ENABLED.store(parse_bool("PINNING_LOG", &flag)?, Ordering::Relaxed);
        }
        Ok(config)
    }
}

/// Builds a request from the command line.
///
/// `useEnv` reads `PINNING_*` variables (after loading `.env`);
/// `useInline <url> <fp[,fp...]> [algorithm] [--insecure]` takes them inline.
pub fn request_from_args(args: &[String]) -> Result<PinningRequest> {
    match args {
        [_, mode] if mode == "useEnv" => {
            let _ = dotenv();
            request_from_env()
        }

        [_, mode, url, fingerprints, rest @ ..] if mode == "useInline" => {
            let mut request = PinningRequest::new(url.clone(), split_fingerprints(fingerprints));
            for arg in rest {
                match arg.as_str() {
                    "--insecure" => request = request.permissive(),
                    "--head" => request = request.with_method(HttpMethod::Head),
                    algorithm if !algorithm.starts_with("--") => {
                        request = request.with_digest_algorithm(algorithm)
                    }
                    other => {
                        return Err(PinningError::InvalidRequest(format!("unknown flag {}", other)))
                    }
                }
            }
            Ok(request)
        }

        _ => Err(PinningError::InvalidRequest(
            "use either 'useEnv' with PINNING_* variables or 'useInline <url> <fingerprints> [algorithm] [--insecure] [--head]'"
                .into(),
        )),
    }
}

fn request_from_env() -> Result<PinningRequest> {
    let url = env_var("PINNING_URL")
        .ok_or_else(|| PinningError::InvalidRequest("PINNING_URL is not set".into()))?;
    let fingerprints = env_var("PINNING_FINGERPRINTS")
        .ok_or_else(|| PinningError::InvalidRequest("PINNING_FINGERPRINTS is not set".into()))?;

    let mut request = PinningRequest::new(url, split_fingerprints(&fingerprints))
        .with_digest_algorithm(env_var("PINNING_ALGORITHM").unwrap_or_else(|| DEFAULT_DIGEST_ALGORITHM.into()));

    if let Some(ms) = env_var("PINNING_TIMEOUT_MS") {
        request = request.with_timeout_millis(parse_u64("PINNING_TIMEOUT_MS", &ms)?);
    }
    if let Some(method) = env_var("PINNING_HTTP_METHOD") {
        request = request.with_method(HttpMethod::from_channel_name(&method));
    }
    if let Some(is_prod) = env_var("PINNING_IS_PROD") {
        request.strict_tls_validation = parse_bool("PINNING_IS_PROD", &is_prod)?;
    }
    Ok(request)
}

pub fn split_fingerprints(list: &str) -> Vec<String> {
    list.split(',')
        .map(str::trim)
        .filter(|fp| !fp.is_empty())
        .map(str::to_string)
        .collect()
}

fn env_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn parse_u64(name: &str, value: &str) -> Result<u64> {
    value
        .trim()
        .parse()
        .map_err(|_| PinningError::InvalidRequest(format!("{} must be a non-negative integer, got '{}'", name, value)))
}

fn parse_bool(name: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(PinningError::InvalidRequest(format!("{} must be a boolean, got '{}'", name, value))),
    }
}
