//! HTTP push transport.
//!
//! Delivers batches with `PUT {endpoint}/metrics/job/{job}` — the
//! push-gateway convention, where PUT replaces the job's previously
//! pushed group so the gateway always exposes the latest snapshot.
//!
//! Failure classification:
//!
//! ```text
//! 2xx                          → Success
//! 408 / 429 / 5xx              → Retryable
//! connect / io error / timeout → Retryable
//! any other status             → Fatal (the sink rejected the batch)
//! ```

use std::time::Duration;

use async_trait::async_trait;
use http::StatusCode;
use thiserror::Error;
use tracing::debug;

use pulsegate_core::SinkConfig;
use pulsegate_core::types::{DeliveryOutcome, EncodedBatch};

use crate::SinkTransport;

/// Errors raised while constructing a transport. Delivery failures
/// are not errors; they surface as [`DeliveryOutcome`] values.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("invalid sink endpoint '{endpoint}': {reason}")]
    InvalidEndpoint { endpoint: String, reason: String },
}

/// Pushes batches to a push-gateway style HTTP sink.
pub struct HttpPushTransport {
    /// host:port to connect to.
    authority: String,
    /// Full request path, e.g. `/metrics/job/billing`.
    path: String,
    timeout: Duration,
}

impl HttpPushTransport {
    pub fn new(config: &SinkConfig) -> Result<Self, TransportError> {
        let invalid = |reason: &str| TransportError::InvalidEndpoint {
            endpoint: config.endpoint.clone(),
            reason: reason.to_string(),
        };

        let uri: http::Uri = config
            .endpoint
            .parse()
            .map_err(|_| invalid("not a valid URI"))?;
        match uri.scheme_str() {
            Some("http") => {}
            Some(other) => return Err(invalid(&format!("unsupported scheme '{other}'"))),
            None => return Err(invalid("missing scheme")),
        }
        let authority = uri
            .authority()
            .ok_or_else(|| invalid("missing host"))?
            .to_string();

        let base = uri.path().trim_end_matches('/');
        let path = format!("{base}/metrics/job/{}", encode_path_segment(&config.job));

        Ok(Self {
            authority,
            path,
            timeout: config.timeout,
        })
    }

    /// Connect, send the PUT, and classify the response.
    async fn push(&self, batch: &EncodedBatch) -> DeliveryOutcome {
        let stream = match tokio::net::TcpStream::connect(&self.authority).await {
            Ok(s) => s,
            Err(e) => {
                return DeliveryOutcome::Retryable(format!("connect failed: {e}"));
            }
        };

        let io = hyper_util::rt::TokioIo::new(stream);
        let (mut sender, conn) = match hyper::client::conn::http1::handshake(io).await {
            Ok(pair) => pair,
            Err(e) => {
                return DeliveryOutcome::Retryable(format!("handshake failed: {e}"));
            }
        };

        // Drive the connection in the background.
        tokio::spawn(async move {
            let _ = conn.await;
        });

        let req = http::Request::builder()
            .method("PUT")
            .uri(self.path.as_str())
            .header("host", &self.authority)
            .header("user-agent", "pulsegate/0.1")
            .header("content-type", "text/plain; version=0.0.4")
            .body(http_body_util::Full::new(batch.payload.clone()));
        let req = match req {
            Ok(r) => r,
            Err(e) => {
                // A malformed request can never succeed on retry.
                return DeliveryOutcome::Fatal(format!("request build failed: {e}"));
            }
        };

        match sender.send_request(req).await {
            Ok(resp) => {
                debug!(status = %resp.status(), sequence = batch.sequence, "sink responded");
                classify_status(resp.status())
            }
            Err(e) => DeliveryOutcome::Retryable(format!("request failed: {e}")),
        }
    }
}

#[async_trait]
impl SinkTransport for HttpPushTransport {
    async fn deliver(&self, batch: &EncodedBatch) -> DeliveryOutcome {
        match tokio::time::timeout(self.timeout, self.push(batch)).await {
            Ok(outcome) => outcome,
            Err(_) => DeliveryOutcome::Retryable(format!(
                "timed out after {:?}",
                self.timeout
            )),
        }
    }
}

/// Map an HTTP status onto a delivery outcome.
pub fn classify_status(status: StatusCode) -> DeliveryOutcome {
    if status.is_success() {
        DeliveryOutcome::Success
    } else if status == StatusCode::REQUEST_TIMEOUT
        || status == StatusCode::TOO_MANY_REQUESTS
        || status.is_server_error()
    {
        DeliveryOutcome::Retryable(format!("sink returned {status}"))
    } else {
        DeliveryOutcome::Fatal(format!("sink returned {status}"))
    }
}

/// Percent-encode a URL path segment, keeping unreserved characters.
fn encode_path_segment(segment: &str) -> String {
    let mut encoded = String::with_capacity(segment.len());
    for byte in segment.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                encoded.push(byte as char);
            }
            _ => {
                let _ = std::fmt::Write::write_fmt(&mut encoded, format_args!("%{byte:02X}"));
            }
        }
    }
    encoded
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use std::collections::BTreeMap;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    fn sink_config(endpoint: &str) -> SinkConfig {
        SinkConfig {
            endpoint: endpoint.to_string(),
            timeout: Duration::from_millis(500),
            job: "pulsegate".to_string(),
            grouping: BTreeMap::new(),
        }
    }

    fn batch() -> EncodedBatch {
        EncodedBatch::new(1, Bytes::from_static(b"metric 1\n"))
    }

    /// Accept one connection, read the request, answer with the given
    /// head, and return what was read.
    async fn one_shot_server(
        response: &'static str,
    ) -> (std::net::SocketAddr, tokio::sync::oneshot::Receiver<String>) {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = tokio::sync::oneshot::channel();
        tokio::spawn(async move {
            if let Ok((mut sock, _)) = listener.accept().await {
                let mut buf = vec![0u8; 8192];
                let n = sock.read(&mut buf).await.unwrap_or(0);
                let _ = sock.write_all(response.as_bytes()).await;
                let _ = sock.shutdown().await;
                let _ = tx.send(String::from_utf8_lossy(&buf[..n]).to_string());
            }
        });
        (addr, rx)
    }

    #[test]
    fn classify_2xx_success() {
        assert_eq!(classify_status(StatusCode::OK), DeliveryOutcome::Success);
        assert_eq!(classify_status(StatusCode::ACCEPTED), DeliveryOutcome::Success);
    }

    #[test]
    fn classify_transient_retryable() {
        for status in [
            StatusCode::REQUEST_TIMEOUT,
            StatusCode::TOO_MANY_REQUESTS,
            StatusCode::INTERNAL_SERVER_ERROR,
            StatusCode::BAD_GATEWAY,
            StatusCode::SERVICE_UNAVAILABLE,
        ] {
            assert!(
                matches!(classify_status(status), DeliveryOutcome::Retryable(_)),
                "{status} should be retryable"
            );
        }
    }

    #[test]
    fn classify_client_errors_fatal() {
        for status in [
            StatusCode::BAD_REQUEST,
            StatusCode::UNAUTHORIZED,
            StatusCode::FORBIDDEN,
            StatusCode::NOT_FOUND,
        ] {
            assert!(
                matches!(classify_status(status), DeliveryOutcome::Fatal(_)),
                "{status} should be fatal"
            );
        }
    }

    #[test]
    fn constructor_builds_push_path() {
        let transport = HttpPushTransport::new(&sink_config("http://gateway:9091")).unwrap();
        assert_eq!(transport.authority, "gateway:9091");
        assert_eq!(transport.path, "/metrics/job/pulsegate");
    }

    #[test]
    fn constructor_encodes_job_segment() {
        let mut config = sink_config("http://gateway:9091");
        config.job = "billing service".to_string();
        let transport = HttpPushTransport::new(&config).unwrap();
        assert_eq!(transport.path, "/metrics/job/billing%20service");
    }

    #[test]
    fn constructor_rejects_bad_endpoints() {
        assert!(HttpPushTransport::new(&sink_config("not a url")).is_err());
        assert!(HttpPushTransport::new(&sink_config("https://gateway:9091")).is_err());
        assert!(HttpPushTransport::new(&sink_config("/just/a/path")).is_err());
    }

    #[test]
    fn path_segment_encoding() {
        assert_eq!(encode_path_segment("plain-job_1.x~y"), "plain-job_1.x~y");
        assert_eq!(encode_path_segment("a/b"), "a%2Fb");
        assert_eq!(encode_path_segment("a b"), "a%20b");
    }

    #[tokio::test]
    async fn deliver_to_closed_port_is_retryable() {
        // Port 1 won't be listening.
        let transport = HttpPushTransport::new(&sink_config("http://127.0.0.1:1")).unwrap();
        assert!(matches!(
            transport.deliver(&batch()).await,
            DeliveryOutcome::Retryable(_)
        ));
    }

    #[tokio::test]
    async fn deliver_success_on_200() {
        let (addr, request_rx) =
            one_shot_server("HTTP/1.1 200 OK\r\ncontent-length: 0\r\n\r\n").await;
        let transport =
            HttpPushTransport::new(&sink_config(&format!("http://{addr}"))).unwrap();

        assert_eq!(transport.deliver(&batch()).await, DeliveryOutcome::Success);

        let request = request_rx.await.unwrap();
        assert!(request.starts_with("PUT /metrics/job/pulsegate HTTP/1.1"));
        assert!(request.contains("content-type: text/plain; version=0.0.4"));
    }

    #[tokio::test]
    async fn deliver_503_is_retryable() {
        let (addr, _rx) = one_shot_server(
            "HTTP/1.1 503 Service Unavailable\r\ncontent-length: 0\r\n\r\n",
        )
        .await;
        let transport =
            HttpPushTransport::new(&sink_config(&format!("http://{addr}"))).unwrap();
        assert!(matches!(
            transport.deliver(&batch()).await,
            DeliveryOutcome::Retryable(_)
        ));
    }

    #[tokio::test]
    async fn deliver_400_is_fatal() {
        let (addr, _rx) =
            one_shot_server("HTTP/1.1 400 Bad Request\r\ncontent-length: 0\r\n\r\n").await;
        let transport =
            HttpPushTransport::new(&sink_config(&format!("http://{addr}"))).unwrap();
        assert!(matches!(
            transport.deliver(&batch()).await,
            DeliveryOutcome::Fatal(_)
        ));
    }

    #[tokio::test]
    async fn deliver_times_out_on_silent_server() {
        // Server accepts but never responds.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let _held = listener.accept().await;
            tokio::time::sleep(Duration::from_secs(10)).await;
        });

        let mut config = sink_config(&format!("http://{addr}"));
        config.timeout = Duration::from_millis(100);
        let transport = HttpPushTransport::new(&config).unwrap();

        let start = std::time::Instant::now();
        let outcome = transport.deliver(&batch()).await;
        assert!(matches!(outcome, DeliveryOutcome::Retryable(_)));
        assert!(start.elapsed() < Duration::from_secs(2));
    }
}
