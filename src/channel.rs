//! Method-channel boundary: argument maps in, single replies out.
//!
//! The host side hands over a [`MethodCall`] whose arguments are a JSON-like
//! map. Every call resolves its reply channel exactly once, including when the
//! check task panics.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::runtime::Handle;
use tokio::sync::oneshot;

use crate::check::check_with_config;
use crate::config::EngineConfig;
use crate::error::PinningError;
use crate::log::log_error;
use crate::types::{HttpMethod, PinningRequest, VerificationOutcome};

pub const CHANNEL_NAME: &str = "ssl_pinning_plugin";
pub const METHOD_CHECK: &str = "check";

pub const CONNECTION_SECURE: &str = "CONNECTION_SECURE";
pub const CONNECTION_NOT_SECURE: &str = "CONNECTION_NOT_SECURE";
pub const NOT_SECURE_MESSAGE: &str = "Connection is not secure";
pub const NOT_SECURE_DETAILS: &str = "Fingerprint doesn't match";

#[derive(Debug, Clone)]
pub struct MethodCall {
    pub method: String,
    pub arguments: Value,
}

impl MethodCall {
    pub fn new(method: impl Into<String>, arguments: Value) -> Self {
        Self { method: method.into(), arguments }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ChannelReply {
    Success { value: String },
    Error { code: String, message: String, details: Option<String> },
    NotImplemented,
}

impl ChannelReply {
    pub fn error(code: impl Into<String>, message: impl Into<String>, details: Option<String>) -> Self {
        ChannelReply::Error { code: code.into(), message: message.into(), details }
    }
}

/// Arguments of the `check` call as the host sends them.
///
/// `httpMethod` and `headers` may be omitted: a missing method means GET and
/// missing headers mean none. Every other key is required.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckArguments {
    pub url: String,
    pub fingerprints: Vec<String>,
    #[serde(default)]
    pub http_method: String,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    pub timeout: u64,
    #[serde(rename = "type")]
    pub digest_type: String,
    pub is_prod: bool,
}

impl CheckArguments {
    pub fn from_value(arguments: Value) -> Result<Self, PinningError> {
        serde_json::from_value(arguments).map_err(|e| PinningError::InvalidRequest(e.to_string()))
    }
}

impl From<CheckArguments> for PinningRequest {
    fn from(args: CheckArguments) -> Self {
        PinningRequest {
            url: args.url,
            allowed_fingerprints: args.fingerprints,
            http_method: HttpMethod::from_channel_name(&args.http_method),
            headers: args.headers,
            timeout_millis: args.timeout,
            digest_algorithm: args.digest_type,
            strict_tls_validation: args.is_prod,
        }
    }
}

/// Maps an outcome onto the reply the host expects.
pub fn reply_for(outcome: &VerificationOutcome) -> ChannelReply {
    match outcome {
        VerificationOutcome::Secure => ChannelReply::Success { value: CONNECTION_SECURE.to_string() },
        VerificationOutcome::NotSecure => ChannelReply::error(
            CONNECTION_NOT_SECURE,
            NOT_SECURE_MESSAGE,
            Some(NOT_SECURE_DETAILS.to_string()),
        ),
        failure => ChannelReply::error(failure.to_string(), failure.kind(), None),
    }
}

/// Dispatches method calls onto a tokio runtime.
#[derive(Debug, Clone)]
pub struct MethodCallHandler {
    runtime: Handle,
    config: EngineConfig,
}

impl MethodCallHandler {
    pub fn new(runtime: Handle, config: EngineConfig) -> Self {
        Self { runtime, config }
    }

    /// Returns immediately; the reply arrives on the receiver.
    pub fn on_method_call(&self, call: MethodCall) -> oneshot::Receiver<ChannelReply> {
        let (tx, rx) = oneshot::channel();

        if call.method != METHOD_CHECK {
            let _ = tx.send(ChannelReply::NotImplemented);
            return rx;
        }

        let request = match CheckArguments::from_value(call.arguments) {
            Ok(args) => PinningRequest::from(args),
            Err(err) => {
                log_error(&format!("❌ rejected {} call: {}", METHOD_CHECK, err));
                let _ = tx.send(reply_for(&VerificationOutcome::from(err)));
                return rx;
            }
        };

        let config = self.config.clone();
        let worker = self
            .runtime
            .spawn(async move { check_with_config(&request, &config).await });

        self.runtime.spawn(async move {
            let outcome = match worker.await {
                Ok(outcome) => outcome,
                Err(join_err) => VerificationOutcome::UnexpectedFailure(join_err.to_string()),
            };
            let _ = tx.send(reply_for(&outcome));
        });

        rx
    }

    pub async fn handle(&self, call: MethodCall) -> ChannelReply {
        match self.on_method_call(call).await {
            Ok(reply) => reply,
            Err(_) => reply_for(&VerificationOutcome::UnexpectedFailure(
                "reply channel closed".into(),
            )),
        }
    }
}
