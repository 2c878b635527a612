// =============================================================================
// http.rs — GETTING BYTES OUT OF SERVERS THAT DON'T WANT TO GIVE THEM
// =============================================================================
//
// The BMLT roots have a history of expired and self-signed certificates. The
// landing page has a history of being down. This module turns all of that
// into one small error taxonomy so the sources can decide what to do next:
//
//   Tls        certificate/handshake rejected. The directory source retries
//              exactly once with verification off, and says so in the log.
//   Transport  timeout, refused connection, DNS, anything else on the wire.
//   Status     the server answered, but not with a 2xx.
//   Body       the response started but the body couldn't be read.
//
// Two reqwest clients are built up front, one verifying and one not, so the
// insecure retry never needs to rebuild anything mid-run.
// =============================================================================

use std::error::Error as StdError;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tracing::debug;

/// Whether the server certificate must validate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TlsMode {
    Verify,
    /// Accept self-signed and otherwise invalid certificates. Only ever used
    /// for the one logged retry after a [`FetchError::Tls`].
    AcceptInvalid,
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("TLS verification failed: {0}")]
    Tls(String),

    #[error("request failed: {0}")]
    Transport(String),

    #[error("server answered HTTP {status}")]
    Status { status: u16 },

    #[error("could not read response body: {0}")]
    Body(String),
}

impl FetchError {
    pub fn is_tls(&self) -> bool {
        matches!(self, FetchError::Tls(_))
    }
}

/// One GET, body as text. The sources only ever need this.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn get_text(&self, url: &str, tls: TlsMode) -> Result<String, FetchError>;
}

/// reqwest-backed fetcher shared by every source in a run.
pub struct HttpFetcher {
    client: reqwest::Client,
    /// Same settings, certificate checks off.
    insecure_client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(timeout: Duration, user_agent: &str) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()?;

        let insecure_client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .danger_accept_invalid_certs(true)
            .build()?;

        Ok(Self {
            client,
            insecure_client,
        })
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn get_text(&self, url: &str, tls: TlsMode) -> Result<String, FetchError> {
        let client = match tls {
            TlsMode::Verify => &self.client,
            TlsMode::AcceptInvalid => &self.insecure_client,
        };

        debug!(url = url, tls = ?tls, "GET");

        let response = client.get(url).send().await.map_err(classify)?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
            });
        }

        response
            .text()
            .await
            .map_err(|e| FetchError::Body(e.to_string()))
    }
}

fn classify(err: reqwest::Error) -> FetchError {
    if !err.is_timeout() && is_tls_failure(&err) {
        FetchError::Tls(error_chain(&err))
    } else {
        FetchError::Transport(error_chain(&err))
    }
}

/// Substrings that only show up when the TLS layer rejected the peer.
const TLS_MARKERS: &[&str] = &[
    "certificate",
    "handshake",
    "unknownissuer",
    "self signed",
    "self-signed",
    "invalid peer",
];

/// Walk the source chain looking for a certificate or handshake failure.
///
/// reqwest doesn't expose a TLS error kind, and rustls reports through an
/// `io::Error` nested a few levels down, so the messages are the only
/// stable signal across backends.
pub fn is_tls_failure(err: &(dyn StdError + 'static)) -> bool {
    let mut current: Option<&(dyn StdError + 'static)> = Some(err);
    while let Some(e) = current {
        let message = e.to_string().to_ascii_lowercase();
        if TLS_MARKERS.iter().any(|marker| message.contains(marker)) {
            return true;
        }
        // io::Error::source() skips the wrapped error, so look inside too.
        if let Some(inner) = e
            .downcast_ref::<std::io::Error>()
            .and_then(|io| io.get_ref())
        {
            let inner = inner.to_string().to_ascii_lowercase();
            if TLS_MARKERS.iter().any(|marker| inner.contains(marker)) {
                return true;
            }
        }
        current = e.source();
    }
    false
}

/// `outer: middle: root`, so the log line says what actually went wrong.
fn error_chain(err: &(dyn StdError + 'static)) -> String {
    let mut parts = vec![err.to_string()];
    let mut current = err.source();
    while let Some(e) = current {
        let text = e.to_string();
        if parts.last() != Some(&text) {
            parts.push(text);
        }
        current = e.source();
    }
    parts.join(": ")
}

/// In-memory fetcher for source tests. Responses are queued per URL and
/// every call is recorded.
#[cfg(test)]
pub mod scripted {
    use std::collections::{HashMap, VecDeque};
    use std::sync::Mutex;

    use super::*;

    #[derive(Default)]
    pub struct ScriptedFetcher {
        responses: Mutex<HashMap<String, VecDeque<Result<String, FetchError>>>>,
        calls: Mutex<Vec<(String, TlsMode)>>,
    }

    impl ScriptedFetcher {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn respond(self, url: &str, response: Result<String, FetchError>) -> Self {
            self.responses
                .lock()
                .unwrap()
                .entry(url.to_string())
                .or_default()
                .push_back(response);
            self
        }

        pub fn calls(&self) -> Vec<(String, TlsMode)> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl PageFetcher for ScriptedFetcher {
        async fn get_text(&self, url: &str, tls: TlsMode) -> Result<String, FetchError> {
            self.calls.lock().unwrap().push((url.to_string(), tls));
            self.responses
                .lock()
                .unwrap()
                .get_mut(url)
                .and_then(VecDeque::pop_front)
                .unwrap_or_else(|| Err(FetchError::Transport(format!("connection refused: {url}"))))
        }
    }
}

#[cfg(test)]
mod tests {
    use std::fmt;
    use std::io;

    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    #[derive(Debug)]
    struct Wrapper {
        message: &'static str,
        inner: io::Error,
    }

    impl fmt::Display for Wrapper {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "{}", self.message)
        }
    }

    impl StdError for Wrapper {
        fn source(&self) -> Option<&(dyn StdError + 'static)> {
            Some(&self.inner)
        }
    }

    #[test]
    fn test_tls_failure_found_inside_io_error() {
        let err = Wrapper {
            message: "error sending request for url (https://bmlt.example/)",
            inner: io::Error::new(
                io::ErrorKind::InvalidData,
                "invalid peer certificate: UnknownIssuer",
            ),
        };
        assert!(is_tls_failure(&err));
    }

    #[test]
    fn test_connection_refused_is_not_tls() {
        let err = Wrapper {
            message: "error sending request for url (https://bmlt.example/)",
            inner: io::Error::new(io::ErrorKind::ConnectionRefused, "Connection refused (os error 111)"),
        };
        assert!(!is_tls_failure(&err));
    }

    #[test]
    fn test_error_chain_joins_sources() {
        let err = Wrapper {
            message: "outer",
            inner: io::Error::new(io::ErrorKind::Other, "root cause"),
        };
        assert_eq!(error_chain(&err), "outer: root cause");
    }

    #[tokio::test]
    async fn test_get_text_returns_body_and_sends_user_agent() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/virtual/"))
            .and(header("user-agent", "NA-Meetings-Test/1.0"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<table></table>"))
            .expect(1)
            .mount(&server)
            .await;

        let fetcher = HttpFetcher::new(Duration::from_secs(5), "NA-Meetings-Test/1.0").unwrap();
        let body = fetcher
            .get_text(&format!("{}/virtual/", server.uri()), TlsMode::Verify)
            .await
            .unwrap();
        assert_eq!(body, "<table></table>");
    }

    #[tokio::test]
    async fn test_non_success_status_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let fetcher = HttpFetcher::new(Duration::from_secs(5), "NA-Meetings-Test/1.0").unwrap();
        let err = fetcher
            .get_text(&server.uri(), TlsMode::Verify)
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Status { status: 503 }));
        assert!(!err.is_tls());
    }

    #[tokio::test]
    async fn test_slow_server_times_out_as_transport() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(3)))
            .mount(&server)
            .await;

        let fetcher = HttpFetcher::new(Duration::from_millis(200), "NA-Meetings-Test/1.0").unwrap();
        let err = fetcher
            .get_text(&server.uri(), TlsMode::Verify)
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Transport(_)));
    }
}
