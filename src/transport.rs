use std::{error::Error as StdError, time::Duration};

use bytes::Bytes;
use futures_util::{future::BoxFuture, FutureExt as _};
use reqwest::{header::HeaderMap, StatusCode};
use tokio_util::sync::CancellationToken;

use crate::consts::{MAX_REQUEST_TIMEOUT_SECS, MIN_REQUEST_TIMEOUT_SECS, USER_AGENT};

/// Why a GET did not produce a body. The display text is what the user sees in a
/// connection error alert.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("SSL certificate error - check if your Gotify URL uses HTTPS")]
    Tls,
    #[error("Cannot resolve server address - check your Gotify URL")]
    DnsResolution,
    #[error("Cannot connect to server - check your Gotify URL and network connection")]
    ConnectionRefused,
    #[error("Authentication failed - check your client token")]
    AuthenticationFailed,
    #[error("HTTP error {status_code}")]
    GenericHttp { status_code: u16 },
    #[error("Request timed out after {0} seconds")]
    Timeout(u64),
    #[error("Could not create request: {0}")]
    RequestConstructionFailed(String),
    #[error("Request failed: {0}")]
    Request(String),
    #[error("Transport session closed")]
    SessionClosed,
}

/// One long-lived HTTP session shared by every poll.
///
/// `close` aborts whatever is in flight and releases the connection pool; a
/// closed session answers every later fetch with [`TransportError::SessionClosed`].
pub struct TransportClient {
    client: Option<reqwest::Client>,
    cancel: CancellationToken,
    timeout_secs: u64,
}

impl TransportClient {
    pub fn new(timeout_secs: u64) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .map_err(|error| {
                TransportError::RequestConstructionFailed(format!(
                    "Failed to build HTTP client: {error}"
                ))
            })?;
        Ok(Self {
            client: Some(client),
            cancel: CancellationToken::new(),
            timeout_secs: clamp_timeout(timeout_secs),
        })
    }

    pub fn timeout_secs(&self) -> u64 {
        self.timeout_secs
    }

    /// Applies to requests started after the call.
    pub fn set_timeout(&mut self, timeout_secs: u64) {
        self.timeout_secs = clamp_timeout(timeout_secs);
    }

    pub fn is_closed(&self) -> bool {
        self.client.is_none()
    }

    /// Starts a GET. The returned future owns everything it needs, so it can be
    /// spawned and outlive this borrow; it resolves to the body only for a 2xx status.
    pub fn fetch(
        &self,
        url: &str,
        headers: HeaderMap,
        timeout_secs: u64,
    ) -> BoxFuture<'static, Result<Bytes, TransportError>> {
        let Some(client) = self.client.clone() else {
            return async { Err(TransportError::SessionClosed) }.boxed();
        };
        let timeout_secs = clamp_timeout(timeout_secs);
        let request = client
            .get(url)
            .headers(headers)
            .timeout(Duration::from_secs(timeout_secs))
            .build();
        let cancel = self.cancel.clone();

        async move {
            let request = request.map_err(|error| {
                TransportError::RequestConstructionFailed(error.without_url().to_string())
            })?;

            let exchange = async {
                let response = client
                    .execute(request)
                    .await
                    .map_err(|error| classify_error(&error, timeout_secs))?;
                let status = response.status();
                if status == StatusCode::UNAUTHORIZED {
                    return Err(TransportError::AuthenticationFailed);
                }
                if !status.is_success() {
                    return Err(TransportError::GenericHttp {
                        status_code: status.as_u16(),
                    });
                }
                response
                    .bytes()
                    .await
                    .map_err(|error| classify_error(&error, timeout_secs))
            };

            tokio::select! {
                _ = cancel.cancelled() => Err(TransportError::SessionClosed),
                result = exchange => result,
            }
        }
        .boxed()
    }

    /// Aborts in-flight requests and releases the session. Idempotent.
    pub fn close(&mut self) {
        self.cancel.cancel();
        self.client = None;
    }
}

impl Drop for TransportClient {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

fn clamp_timeout(timeout_secs: u64) -> u64 {
    timeout_secs.clamp(MIN_REQUEST_TIMEOUT_SECS, MAX_REQUEST_TIMEOUT_SECS)
}

/// Maps a reqwest failure onto the named causes by walking its source chain.
///
/// The TLS layer reports handshake failures, including plain HTTP answering an
/// `https://` URL, as `InvalidData` io errors during connect.
fn classify_error(error: &reqwest::Error, timeout_secs: u64) -> TransportError {
    if error.is_timeout() {
        return TransportError::Timeout(timeout_secs);
    }
    if error.is_builder() {
        return TransportError::RequestConstructionFailed(
            error_chain_text(error).unwrap_or_else(|| "invalid request".to_string()),
        );
    }

    let mut source: Option<&(dyn StdError + 'static)> = error.source();
    while let Some(cause) = source {
        if let Some(io_error) = cause.downcast_ref::<std::io::Error>() {
            match io_error.kind() {
                std::io::ErrorKind::ConnectionRefused => {
                    return TransportError::ConnectionRefused;
                }
                std::io::ErrorKind::InvalidData if error.is_connect() => {
                    return TransportError::Tls;
                }
                _ => {}
            }
        }
        let text = cause.to_string().to_ascii_lowercase();
        if text.contains("dns error") || text.contains("failed to lookup address") {
            return TransportError::DnsResolution;
        }
        if text.contains("certificate")
            || text.contains("tls")
            || text.contains("ssl")
            || text.contains("handshake")
        {
            return TransportError::Tls;
        }
        source = cause.source();
    }

    if error.is_connect() {
        return TransportError::ConnectionRefused;
    }
    TransportError::Request(error_chain_text(error).unwrap_or_else(|| error.to_string()))
}

fn error_chain_text(error: &reqwest::Error) -> Option<String> {
    let mut parts = Vec::new();
    let mut source: Option<&(dyn StdError + 'static)> = error.source();
    while let Some(cause) = source {
        parts.push(cause.to_string());
        source = cause.source();
    }
    if parts.is_empty() {
        None
    } else {
        Some(parts.join(": "))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };

    use tracing_subscriber::layer::{Context, SubscriberExt as _};

    use super::*;

    /// Counts events emitted from this crate.
    #[derive(Clone, Default)]
    struct CrateEvents(Arc<AtomicUsize>);

    impl<S: tracing::Subscriber> tracing_subscriber::Layer<S> for CrateEvents {
        fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
            if event.metadata().target().starts_with("gotify_poller") {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }
    }

    #[test]
    fn timeout_is_clamped_to_supported_range() {
        let mut client = TransportClient::new(2).unwrap();
        assert_eq!(client.timeout_secs(), 5);
        client.set_timeout(90);
        assert_eq!(client.timeout_secs(), 30);
        client.set_timeout(12);
        assert_eq!(client.timeout_secs(), 12);
    }

    #[test]
    fn error_text_matches_user_facing_wording() {
        assert_eq!(
            TransportError::AuthenticationFailed.to_string(),
            "Authentication failed - check your client token"
        );
        assert_eq!(
            TransportError::GenericHttp { status_code: 502 }.to_string(),
            "HTTP error 502"
        );
    }

    #[tokio::test]
    async fn closed_session_refuses_new_requests() {
        let mut client = TransportClient::new(10).unwrap();
        client.close();
        client.close();
        assert!(client.is_closed());
        let result = client
            .fetch("http://127.0.0.1:9/message", HeaderMap::new(), 10)
            .await;
        assert_eq!(result, Err(TransportError::SessionClosed));
    }

    #[tokio::test]
    async fn malformed_url_is_a_construction_failure() {
        let client = TransportClient::new(10).unwrap();
        let result = client.fetch("not a url", HeaderMap::new(), 10).await;
        assert!(matches!(
            result,
            Err(TransportError::RequestConstructionFailed(_))
        ));
    }

    #[tokio::test]
    async fn transport_stays_silent() {
        let events = CrateEvents::default();
        let _guard =
            tracing::subscriber::set_default(tracing_subscriber::registry().with(events.clone()));
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };

        let mut client = TransportClient::new(10).unwrap();
        client.set_timeout(12);
        let result = client
            .fetch(&format!("http://127.0.0.1:{port}/message"), HeaderMap::new(), 5)
            .await;
        assert_eq!(result, Err(TransportError::ConnectionRefused));
        client.close();

        assert_eq!(events.0.load(Ordering::SeqCst), 0);
    }
}
