use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::connector::Connector;
use crate::error::{ConnectionFailure, PinningError, Result};
use crate::log::{log_check_start, log_leaf, log_outcome};
use crate::types::{DigestAlgorithm, PinningRequest, VerificationOutcome};
use crate::verifier::{digest_with, matches};

/// Fresh connection, fresh digest, one verdict. Nothing is cached or retried.
pub async fn check(request: &PinningRequest) -> VerificationOutcome {
    check_with_config(request, &EngineConfig::default()).await
}

pub async fn check_with_config(request: &PinningRequest, config: &EngineConfig) -> VerificationOutcome {
    let id = Uuid::new_v4();
    log_check_start(&id, request);

    let outcome = match run(request, config, &id).await {
        Ok(matched) => VerificationOutcome::from(matched),
        Err(err) => VerificationOutcome::from(err),
    };

    log_outcome(&id, &outcome);
    outcome
}

/// Like [`check_with_config`], but gives up as soon as `token` is cancelled.
/// Dropping the in-flight future closes the socket.
pub async fn check_with_cancellation(
    request: &PinningRequest,
    config: &EngineConfig,
    token: &CancellationToken,
) -> VerificationOutcome {
    tokio::select! {
        biased;
        _ = token.cancelled() => {
            VerificationOutcome::ConnectionError(ConnectionFailure::Cancelled)
        }
        outcome = check_with_config(request, config) => outcome,
    }
}

async fn run(request: &PinningRequest, config: &EngineConfig, id: &Uuid) -> Result<bool> {
    // Resolve the algorithm before touching the network.
    let algorithm = DigestAlgorithm::from_name(&request.digest_algorithm)
        .ok_or_else(|| PinningError::UnsupportedAlgorithm(request.digest_algorithm.clone()))?;

    let connector = Connector::new(config.clone());
    let leaf = connector.fetch_leaf_certificate(request, id).await?;

    let fingerprint = digest_with(leaf.as_der(), algorithm);
    log_leaf(id, leaf.len(), &fingerprint);

    Ok(matches(&fingerprint, &request.allowed_fingerprints))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unsupported_algorithm_checked_before_connecting() {
        // Port 9 on TEST-NET-1 would hang or fail; it must never be dialed.
        let request = PinningRequest::new("https://192.0.2.1:9/", vec!["00".into()])
            .with_digest_algorithm("NOT-A-HASH");
        let outcome = check(&request).await;
        assert!(matches!(outcome, VerificationOutcome::UnsupportedAlgorithm(ref n) if n == "NOT-A-HASH"));
    }

    #[tokio::test]
    async fn test_malformed_url_is_connection_error() {
        let request = PinningRequest::new("::not-a-url::", vec!["00".into()]);
        let outcome = check(&request).await;
        assert!(matches!(
            outcome,
            VerificationOutcome::ConnectionError(ConnectionFailure::MalformedUrl { .. })
        ));
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let token = CancellationToken::new();
        token.cancel();
        let request = PinningRequest::new("https://192.0.2.1:9/", vec!["00".into()]);
        let outcome = check_with_cancellation(&request, &EngineConfig::default(), &token).await;
        assert!(matches!(
            outcome,
            VerificationOutcome::ConnectionError(ConnectionFailure::Cancelled)
        ));
    }
}
