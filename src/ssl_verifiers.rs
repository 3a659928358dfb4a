use std::sync::Arc;

use tokio_rustls::rustls::{ClientConfig, OwnedTrustAnchor, RootCertStore};

#[cfg(feature = "permissive-tls")]
use tokio_rustls::rustls::{
    Certificate, Error as TLSError, ServerName,
    client::ServerCertVerifier,
    client::ServerCertVerified,
};

/// Production trust context: bundled Mozilla roots, chain and hostname checks on.
pub fn strict_client_config() -> Arc<ClientConfig> {
    let mut roots = RootCertStore::empty();
    roots.add_trust_anchors(webpki_roots::TLS_SERVER_ROOTS.iter().map(|ta| {
        OwnedTrustAnchor::from_subject_spki_name_constraints(
            ta.subject,
            ta.spki,
            ta.name_constraints,
        )
    }));

    let config = ClientConfig::builder()
        .with_safe_defaults()
        .with_root_certificates(roots)
        .with_no_client_auth();
    Arc::new(config)
}

/// Accepts any server certificate for any name. Handshake signatures are
/// still checked against the presented key, nothing else is.
#[cfg(feature = "permissive-tls")]
pub struct DisabledVerifier;

#[cfg(feature = "permissive-tls")]
impl ServerCertVerifier for DisabledVerifier {
    fn verify_server_cert(
        &self,
        _end_entity: &Certificate,
        _intermediates: &[Certificate],
        _server_name: &ServerName,
        _scts: &mut dyn Iterator<Item = &[u8]>,
        _ocsp_response: &[u8],
        _now: std::time::SystemTime,
    ) -> Result<ServerCertVerified, TLSError> {
        Ok(ServerCertVerified::assertion())
    }
}

/// Diagnostic trust context for self-signed or misnamed servers.
/// Never reachable from a request with `strict_tls_validation = true`.
#[cfg(feature = "permissive-tls")]
pub fn permissive_client_config() -> Arc<ClientConfig> {
    let config = ClientConfig::builder()
        .with_safe_defaults()
        .with_custom_certificate_verifier(Arc::new(DisabledVerifier))
        .with_no_client_auth();
    Arc::new(config)
}
