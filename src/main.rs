use std::env;
use std::process::ExitCode;

use ssl_pinning::check::check_with_config;
use ssl_pinning::config::{request_from_args, EngineConfig};
use ssl_pinning::log::log_line;
use ssl_pinning::types::VerificationOutcome;

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let config = EngineConfig::from_env()?;
    let args: Vec<String> = env::args().collect();
    let request = request_from_args(&args)?;

    if !request.strict_tls_validation {
        log_line("⚠️ --insecure: certificate chain and hostname are NOT validated");
    }

    let outcome = check_with_config(&request, &config).await;
    println!("{}: {}", outcome.kind(), outcome);

    Ok(match outcome {
        VerificationOutcome::Secure => ExitCode::SUCCESS,
        VerificationOutcome::NotSecure => ExitCode::from(1),
        _ => ExitCode::from(2),
    })
}
