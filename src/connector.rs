use std::future::Future;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::{timeout_at, Instant};
use tokio_rustls::rustls::{ClientConfig, ServerName};
use tokio_rustls::TlsConnector;
use url::{Host, Url};
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::error::{ConnectionFailure, PinningError, Result};
use crate::log::{log_error, log_line, log_status_line};
use crate::ssl_verifiers::strict_client_config;
use crate::types::{LeafCertificate, PinningRequest};

/// Where a request goes, resolved from its URL.
#[derive(Debug, Clone)]
pub struct Target {
    pub url: Url,
    pub host: Host<String>,
    pub port: u16,
    pub tls: bool,
}

impl Target {
    pub fn parse(raw: &str) -> std::result::Result<Self, ConnectionFailure> {
        let url = Url::parse(raw).map_err(|e| ConnectionFailure::MalformedUrl {
            url: raw.to_string(),
            reason: e.to_string(),
        })?;

        let tls = match url.scheme() {
            "https" => true,
            "http" => false,
            other => return Err(ConnectionFailure::UnsupportedScheme(other.to_string())),
        };

        let host = url
            .host()
            .map(|h| h.to_owned())
            .ok_or_else(|| ConnectionFailure::MalformedUrl {
                url: raw.to_string(),
                reason: "missing host".into(),
            })?;

        // http/https always have a known default
        let port = url.port_or_known_default().unwrap_or(if tls { 443 } else { 80 });

        Ok(Self { url, host, port, tls })
    }

    /// `host:port` for diagnostics, IPv6 bracketed.
    pub fn authority(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Value of the `Host` header: the port only appears when it isn't the scheme default.
    pub fn host_header(&self) -> String {
        match self.url.port() {
            Some(port) => format!("{}:{}", self.host, port),
            None => self.host.to_string(),
        }
    }

    pub fn request_target(&self) -> String {
        let mut target = self.url.path().to_string();
        if let Some(query) = self.url.query() {
            target.push('?');
            target.push_str(query);
        }
        target
    }

    fn server_name(&self) -> std::result::Result<ServerName, ConnectionFailure> {
        match &self.host {
            Host::Domain(domain) => {
                ServerName::try_from(domain.as_str()).map_err(|e| ConnectionFailure::MalformedUrl {
                    url: self.url.to_string(),
                    reason: e.to_string(),
                })
            }
            Host::Ipv4(ip) => Ok(ServerName::IpAddress(IpAddr::V4(*ip))),
            Host::Ipv6(ip) => Ok(ServerName::IpAddress(IpAddr::V6(*ip))),
        }
    }

    async fn connect_tcp(&self) -> std::io::Result<TcpStream> {
        match &self.host {
            Host::Domain(domain) => TcpStream::connect((domain.as_str(), self.port)).await,
            Host::Ipv4(ip) => TcpStream::connect((IpAddr::V4(*ip), self.port)).await,
            Host::Ipv6(ip) => TcpStream::connect((IpAddr::V6(*ip), self.port)).await,
        }
    }
}

/// Opens one connection per call and hands back the peer's leaf certificate.
#[derive(Debug, Clone, Default)]
pub struct Connector {
    config: EngineConfig,
}

impl Connector {
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Budget for connect + handshake (+ plain exchange) as a whole.
    /// Non-strict checks fall back to the configured read timeout; strict ones
    /// with no timeout have no deadline.
    pub fn time_limit(&self, request: &PinningRequest) -> Option<Duration> {
        if request.timeout_millis > 0 {
            Some(Duration::from_millis(request.timeout_millis))
        } else if !request.strict_tls_validation {
            Some(self.config.fallback_read_timeout)
        } else {
            None
        }
    }

    /// Deadline for work done after the leaf is captured. Always bounded.
    pub fn post_handshake_deadline(&self, deadline: Option<Deadline>) -> Deadline {
        deadline.unwrap_or_else(|| Deadline::after(self.config.fallback_read_timeout))
    }

    pub async fn fetch_leaf_certificate(
        &self,
        request: &PinningRequest,
        id: &Uuid,
    ) -> Result<LeafCertificate> {
        let target = Target::parse(&request.url)?;
        let http_request = build_http_request(request, &target)?;
        let tls_config = trust_context(request)?;

        let deadline = self.time_limit(request).map(Deadline::after);

        let tcp = within(deadline, "connect", async {
            target.connect_tcp().await.map_err(|source| ConnectionFailure::Connect {
                addr: target.authority(),
                source,
            })
        })
        .await?;
        log_line(&format!("[{}] 🔌 connected to {}", id, target.authority()));

        if !target.tls {
            // A plain socket never carries a certificate; the exchange still runs.
            let mut tcp = tcp;
            let bound = self.post_handshake_deadline(deadline);
            let status = self.exchange(&mut tcp, &http_request, bound).await?;
            log_status_line(id, status.as_deref());
            let _ = within(Some(bound), "close", async {
                tcp.shutdown()
                    .await
                    .map_err(|source| ConnectionFailure::Io { stage: "closing", source })
            })
            .await;
            return Err(ConnectionFailure::EmptyCertificateChain.into());
        }

        let server_name = target.server_name()?;
        let connector = TlsConnector::from(tls_config);
        let mut stream = within(deadline, "tls handshake", async {
            connector
                .connect(server_name, tcp)
                .await
                .map_err(|source| ConnectionFailure::Handshake {
                    host: target.host.to_string(),
                    source,
                })
        })
        .await?;
        log_line(&format!("[{}] 🔐 TLS handshake complete", id));

        let leaf = {
            let (_, session) = stream.get_ref();
            session
                .peer_certificates()
                .and_then(|chain| chain.first())
                .map(|cert| LeafCertificate::from_der(cert.0.clone()))
                .ok_or(ConnectionFailure::EmptyCertificateChain)?
        };

        // The verdict only needs the leaf; whatever the peer does with the
        // request from here on is logged, not fatal.
        let bound = self.post_handshake_deadline(deadline);
        match self.exchange(&mut stream, &http_request, bound).await {
            Ok(status) => log_status_line(id, status.as_deref()),
            Err(err) => log_error(&format!("[{}] ⚠️ request after handshake failed: {}", id, err)),
        }
        let _ = within(Some(bound), "close", async {
            stream
                .shutdown()
                .await
                .map_err(|source| ConnectionFailure::Io { stage: "closing", source })
        })
        .await;

        Ok(leaf)
    }

    /// Sends the request head and waits for the status line (or EOF).
    async fn exchange<S>(
        &self,
        stream: &mut S,
        http_request: &str,
        deadline: Deadline,
    ) -> std::result::Result<Option<String>, ConnectionFailure>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let max_head = self.config.max_response_head;
        within(Some(deadline), "read", async {
            stream
                .write_all(http_request.as_bytes())
                .await
                .map_err(|source| ConnectionFailure::Io { stage: "sending request", source })?;
            stream
                .flush()
                .await
                .map_err(|source| ConnectionFailure::Io { stage: "sending request", source })?;
            read_status_line(&mut *stream, max_head).await
        })
        .await
    }
}

/// One point in time shared by every stage of a fetch.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    at: Instant,
    limit: Duration,
}

impl Deadline {
    pub fn after(limit: Duration) -> Self {
        Self { at: Instant::now() + limit, limit }
    }

    pub fn limit(&self) -> Duration {
        self.limit
    }
}

/// Picks the trust context. The permissive one is its own code path.
fn trust_context(request: &PinningRequest) -> Result<Arc<ClientConfig>> {
    if request.strict_tls_validation {
        return Ok(strict_client_config());
    }
    permissive_trust_context()
}

#[cfg(feature = "permissive-tls")]
fn permissive_trust_context() -> Result<Arc<ClientConfig>> {
    Ok(crate::ssl_verifiers::permissive_client_config())
}

#[cfg(not(feature = "permissive-tls"))]
fn permissive_trust_context() -> Result<Arc<ClientConfig>> {
    Err(PinningError::InvalidRequest(
        "non-strict TLS validation requires the permissive-tls feature".into(),
    ))
}

/// RFC 7230 `token`.
fn is_header_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "!#$%&'*+-.^_`|~".contains(c))
}

pub fn build_http_request(request: &PinningRequest, target: &Target) -> Result<String> {
    let mut headers: Vec<(&String, &String)> = request.headers.iter().collect();
    headers.sort();

    for (name, value) in &headers {
        if !is_header_name(name) {
            return Err(PinningError::InvalidRequest(format!("bad header name '{}'", name)));
        }
        if value.contains(|c: char| c == '\r' || c == '\n' || c == '\0') {
            return Err(PinningError::InvalidRequest(format!("bad value for header '{}'", name)));
        }
    }
    let caller_sets = |header: &str| headers.iter().any(|(name, _)| name.eq_ignore_ascii_case(header));

    let mut head = format!(
        "{} {} HTTP/1.1\r\n",
        request.http_method.as_str(),
        target.request_target()
    );
    if !caller_sets("host") {
        head.push_str(&format!("Host: {}\r\n", target.host_header()));
    }
    let default_connection = !caller_sets("connection");
    for (name, value) in &headers {
        head.push_str(&format!("{}: {}\r\n", name, value));
    }
    if default_connection {
        head.push_str("Connection: close\r\n");
    }
    head.push_str("\r\n");
    Ok(head)
}

async fn read_status_line<S>(
    stream: &mut S,
    max_head: usize,
) -> std::result::Result<Option<String>, ConnectionFailure>
where
    S: AsyncRead + Unpin,
{
    let mut head = Vec::new();
    let mut buf = [0u8; 1024];
    loop {
        if let Some(end) = head.windows(2).position(|w| w == b"\r\n") {
            return Ok(Some(String::from_utf8_lossy(&head[..end]).into_owned()));
        }
        if head.len() >= max_head {
            return Ok(Some(String::from_utf8_lossy(&head).into_owned()));
        }
        let n = stream
            .read(&mut buf)
            .await
            .map_err(|source| ConnectionFailure::Io { stage: "reading response", source })?;
        if n == 0 {
            if head.is_empty() {
                return Ok(None);
            }
            return Ok(Some(String::from_utf8_lossy(&head).into_owned()));
        }
        head.extend_from_slice(&buf[..n]);
    }
}

async fn within<T, F>(
    deadline: Option<Deadline>,
    stage: &'static str,
    fut: F,
) -> std::result::Result<T, ConnectionFailure>
where
    F: Future<Output = std::result::Result<T, ConnectionFailure>>,
{
    match deadline {
        Some(deadline) => timeout_at(deadline.at, fut).await.map_err(|_| ConnectionFailure::Timeout {
            stage,
            millis: deadline.limit.as_millis() as u64,
        })?,
        None => fut.await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::HttpMethod;

    #[test]
    fn test_target_parse() {
        let t = Target::parse("https://example.com/path?q=1").unwrap();
        assert!(t.tls);
        assert_eq!(t.port, 443);
        assert_eq!(t.host_header(), "example.com");
        assert_eq!(t.request_target(), "/path?q=1");

        let t = Target::parse("http://127.0.0.1:8080").unwrap();
        assert!(!t.tls);
        assert_eq!(t.port, 8080);
        assert_eq!(t.host_header(), "127.0.0.1:8080");
        assert_eq!(t.request_target(), "/");

        let t = Target::parse("https://[::1]:8443/").unwrap();
        assert_eq!(t.authority(), "[::1]:8443");
    }

    #[test]
    fn test_target_rejects_bad_urls() {
        assert!(matches!(
            Target::parse("not a url"),
            Err(ConnectionFailure::MalformedUrl { .. })
        ));
        assert!(matches!(
            Target::parse("ftp://example.com"),
            Err(ConnectionFailure::UnsupportedScheme(ref s)) if s == "ftp"
        ));
    }

    #[test]
    fn test_build_http_request() {
        let request = PinningRequest::new("https://example.com:8443/health", vec![])
            .with_method(HttpMethod::Head)
            .with_header("X-Trace", "1")
            .with_header("Accept", "*/*");
        let target = Target::parse(&request.url).unwrap();
        let head = build_http_request(&request, &target).unwrap();
        assert_eq!(
            head,
            "HEAD /health HTTP/1.1\r\nHost: example.com:8443\r\nAccept: */*\r\nX-Trace: 1\r\nConnection: close\r\n\r\n"
        );
    }

    #[test]
    fn test_caller_host_header_wins() {
        let request = PinningRequest::new("https://10.0.0.1/", vec![]).with_header("host", "api.internal");
        let target = Target::parse(&request.url).unwrap();
        let head = build_http_request(&request, &target).unwrap();
        assert!(head.starts_with("GET / HTTP/1.1\r\nhost: api.internal\r\n"));
        assert!(!head.contains("Host: 10.0.0.1"));
    }

    #[test]
    fn test_header_injection_rejected() {
        let request = PinningRequest::new("https://example.com", vec![])
            .with_header("X-Evil", "a\r\nInjected: yes");
        let target = Target::parse(&request.url).unwrap();
        assert!(matches!(
            build_http_request(&request, &target),
            Err(PinningError::InvalidRequest(_))
        ));
    }

    #[test]
    fn test_time_limit() {
        let connector = Connector::default();
        let strict = PinningRequest::new("https://example.com", vec![]);
        assert_eq!(connector.time_limit(&strict), None);

        let permissive = strict.clone().permissive();
        assert_eq!(connector.time_limit(&permissive), Some(Duration::from_millis(5000)));

        let bounded = permissive.with_timeout_millis(250);
        assert_eq!(connector.time_limit(&bounded), Some(Duration::from_millis(250)));
        assert_eq!(
            connector.time_limit(&strict.with_timeout_millis(250)),
            Some(Duration::from_millis(250))
        );
    }

    #[test]
    fn test_post_handshake_work_is_always_bounded() {
        let connector = Connector::default();
        assert_eq!(connector.post_handshake_deadline(None).limit(), Duration::from_millis(5000));

        let own = Deadline::after(Duration::from_millis(40));
        assert_eq!(connector.post_handshake_deadline(Some(own)).limit(), Duration::from_millis(40));
    }

    #[tokio::test]
    async fn test_stages_share_one_deadline() {
        let deadline = Some(Deadline::after(Duration::from_millis(200)));
        let nap = || async {
            tokio::time::sleep(Duration::from_millis(150)).await;
            Ok::<_, ConnectionFailure>(())
        };

        assert!(within(deadline, "connect", nap()).await.is_ok());
        let second = within(deadline, "tls handshake", nap()).await;
        assert!(matches!(
            second,
            Err(ConnectionFailure::Timeout { stage: "tls handshake", millis: 200 })
        ));
    }

    #[test]
    fn test_caller_connection_header_replaces_default() {
        let request = PinningRequest::new("https://example.com/", vec![]).with_header("Connection", "keep-alive");
        let target = Target::parse(&request.url).unwrap();
        let head = build_http_request(&request, &target).unwrap();
        assert_eq!(
            head,
            "GET / HTTP/1.1\r\nHost: example.com\r\nConnection: keep-alive\r\n\r\n"
        );
    }

    #[test]
    fn test_header_names_must_be_tokens() {
        let target = Target::parse("https://example.com/").unwrap();
        for name in ["X Trace", "X:Trace", "", "X-Tr\u{e9}ce", "(comment)"] {
            let request = PinningRequest::new("https://example.com/", vec![]).with_header(name, "1");
            assert!(
                matches!(build_http_request(&request, &target), Err(PinningError::InvalidRequest(_))),
                "{:?} accepted",
                name
            );
        }
        let request = PinningRequest::new("https://example.com/", vec![]).with_header("X-Api_Key.v2", "1");
        assert!(build_http_request(&request, &target).is_ok());
    }

    #[tokio::test]
    async fn test_read_status_line() {
        let mut data: &[u8] = b"HTTP/1.1 204 No Content\r\nServer: x\r\n\r\n";
        let status = read_status_line(&mut data, 8192).await.unwrap();
        assert_eq!(status.as_deref(), Some("HTTP/1.1 204 No Content"));

        let mut empty: &[u8] = b"";
        assert_eq!(read_status_line(&mut empty, 8192).await.unwrap(), None);

        let mut endless: &[u8] = &[b'x'; 64];
        let status = read_status_line(&mut endless, 16).await.unwrap().unwrap();
        assert!(status.len() >= 16);
    }
}
