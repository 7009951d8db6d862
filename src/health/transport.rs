//! Probe transport.
//!
//! # Responsibilities
//! - Issue one health probe request and classify its outcome
//! - Honour the per-request timeout and the caller's cancellation
//!
//! # Design Decisions
//! - Transport is a trait so tests can script outcomes without sockets
//! - Any 2xx is success; everything else observed from the backend is an
//!   HTTP failure, redirects included
//! - `http` and `https` destinations share one TLS-capable client

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{redirect, Client};
use serde::Serialize;
use tokio::time;
use tokio_util::sync::CancellationToken;

use crate::model::HealthStatus;

/// One probe to send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeRequest {
    pub destination_id: String,
    /// Destination base address, e.g. `http://10.0.0.1:8080`.
    pub address: String,
    /// Path appended to the address, starting with `/`.
    pub path: String,
    pub timeout: Duration,
}

impl ProbeRequest {
    /// `{address}{path}` without a doubled slash.
    pub fn uri(&self) -> String {
        format!("{}{}", self.address.trim_end_matches('/'), self.path)
    }
}

/// Classified result of a probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ProbeOutcome {
    Success,
    TransportFailure,
    HttpFailure { status: u16 },
    Timeout,
    Canceled,
}

impl ProbeOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProbeOutcome::Success => "success",
            ProbeOutcome::TransportFailure => "transport_failure",
            ProbeOutcome::HttpFailure { .. } => "http_failure",
            ProbeOutcome::Timeout => "timeout",
            ProbeOutcome::Canceled => "canceled",
        }
    }

    /// Active health verdict for this outcome. `None` for cancellation.
    pub fn health(&self) -> Option<HealthStatus> {
        match self {
            ProbeOutcome::Success => Some(HealthStatus::Healthy),
            ProbeOutcome::Canceled => None,
            _ => Some(HealthStatus::Unhealthy),
        }
    }
}

impl fmt::Display for ProbeOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProbeOutcome::HttpFailure { status } => write!(f, "http_failure({})", status),
            other => f.write_str(other.as_str()),
        }
    }
}

/// Anything that can carry a probe to a destination.
#[async_trait]
pub trait ProbeTransport: Send + Sync + fmt::Debug {
    /// Send the probe. Must return `Canceled` promptly once `cancel` fires.
    async fn send(&self, request: &ProbeRequest, cancel: &CancellationToken) -> ProbeOutcome;
}

/// HTTP(S) probe transport.
#[derive(Clone)]
pub struct HttpProbeTransport {
    client: Client,
}

impl HttpProbeTransport {
    pub fn new() -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .user_agent("proxy-runtime-health-probe")
            .redirect(redirect::Policy::none())
            .build()?;
        Ok(Self { client })
    }
}

impl fmt::Debug for HttpProbeTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpProbeTransport").finish_non_exhaustive()
    }
}

#[async_trait]
impl ProbeTransport for HttpProbeTransport {
    async fn send(&self, request: &ProbeRequest, cancel: &CancellationToken) -> ProbeOutcome {
        let uri = request.uri();
        let response_future = self.client.get(&uri).send();
        tokio::select! {
            biased;
            _ = cancel.cancelled() => ProbeOutcome::Canceled,
            result = time::timeout(request.timeout, response_future) => match result {
                Ok(Ok(response)) if response.status().is_success() => ProbeOutcome::Success,
                Ok(Ok(response)) => ProbeOutcome::HttpFailure {
                    status: response.status().as_u16(),
                },
                Ok(Err(e)) => {
                    tracing::debug!(uri = %uri, error = %e, "Health probe connection error");
                    ProbeOutcome::TransportFailure
                }
                Err(_) => ProbeOutcome::Timeout,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(address: &str) -> ProbeRequest {
        ProbeRequest {
            destination_id: "d1".into(),
            address: address.into(),
            path: "/health".into(),
            timeout: Duration::from_millis(500),
        }
    }

    #[test]
    fn test_uri_joins_cleanly() {
        assert_eq!(request("http://10.0.0.1:80/").uri(), "http://10.0.0.1:80/health");
        assert_eq!(request("http://10.0.0.1:80").uri(), "http://10.0.0.1:80/health");
    }

    #[test]
    fn test_outcome_verdicts() {
        assert_eq!(ProbeOutcome::Success.health(), Some(HealthStatus::Healthy));
        assert_eq!(
            ProbeOutcome::HttpFailure { status: 503 }.health(),
            Some(HealthStatus::Unhealthy)
        );
        assert_eq!(ProbeOutcome::Timeout.health(), Some(HealthStatus::Unhealthy));
        assert_eq!(ProbeOutcome::Canceled.health(), None);
    }

    #[tokio::test]
    async fn test_connection_refused_is_transport_failure() {
        // Grab a free port, then close it so nothing is listening.
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let transport = HttpProbeTransport::new().unwrap();
        let outcome = transport
            .send(&request(&format!("http://{}", addr)), &CancellationToken::new())
            .await;
        assert_eq!(outcome, ProbeOutcome::TransportFailure);
    }

    #[tokio::test]
    async fn test_cancelled_probe() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let outcome = HttpProbeTransport::new()
            .unwrap()
            .send(&request("http://127.0.0.1:9"), &cancel)
            .await;
        assert_eq!(outcome, ProbeOutcome::Canceled);
    }

    #[tokio::test]
    async fn test_https_destination_is_dialed() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        // Accept and hang up: the TLS handshake fails, but only after the
        // connection was made.
        let accepted = tokio::spawn(async move { listener.accept().await.is_ok() });

        let outcome = HttpProbeTransport::new()
            .unwrap()
            .send(&request(&format!("https://{}", addr)), &CancellationToken::new())
            .await;

        assert!(accepted.await.unwrap());
        assert_eq!(outcome, ProbeOutcome::TransportFailure);
    }

    #[tokio::test]
    async fn test_silent_backend_times_out() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        // Hold the connection open without ever answering.
        let _server = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(30)).await;
            drop(socket);
        });

        let mut probe = request(&format!("http://{}", addr));
        probe.timeout = Duration::from_millis(100);
        let outcome = HttpProbeTransport::new()
            .unwrap()
            .send(&probe, &CancellationToken::new())
            .await;
        assert_eq!(outcome, ProbeOutcome::Timeout);
    }

    #[tokio::test]
    async fn test_redirect_is_http_failure() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            use tokio::io::{AsyncReadExt, AsyncWriteExt};
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 1024];
            let _ = socket.read(&mut buf).await;
            let _ = socket
                .write_all(b"HTTP/1.1 302 Found\r\nLocation: /elsewhere\r\nContent-Length: 0\r\nConnection: close\r\n\r\n")
                .await;
        });

        let outcome = HttpProbeTransport::new()
            .unwrap()
            .send(&request(&format!("http://{}", addr)), &CancellationToken::new())
            .await;
        assert_eq!(outcome, ProbeOutcome::HttpFailure { status: 302 });
    }
}
