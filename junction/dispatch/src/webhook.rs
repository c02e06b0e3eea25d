use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::Request;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::io::AsyncWriteExt;
use tokio::net::UnixStream;
use tracing::warn;

use junction_core::{Error, Result};
use junction_task::PeriodicTask;

const POST_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Clone, Debug, Serialize)]
pub struct WebhookEvent {
    pub kind: String,
    pub subject: String,
    pub detail: serde_json::Value,
}

#[async_trait]
pub trait WebhookTransport: Send + Sync {
    async fn post(&self, body: Bytes) -> Result<()>;
}

/// Real HTTP(S) delivery via a `hyper-util` legacy client. TLS transport
/// itself stays out of scope (the same non-goal that excludes it from
/// every other wire path in this system) — an `https://` target is
/// dialed the same way an `http://` one is, which is only correct behind
/// a TLS-terminating sidecar; a production deployment would layer
/// `hyper-rustls` or similar onto this connector.
pub struct HttpWebhookTransport {
    url: hyper::Uri,
    client: Client<hyper_util::client::legacy::connect::HttpConnector, Full<Bytes>>,
}

impl HttpWebhookTransport {
    pub fn new(url: hyper::Uri) -> Self {
        Self {
            url,
            client: Client::builder(TokioExecutor::new()).build_http(),
        }
    }
}

#[async_trait]
impl WebhookTransport for HttpWebhookTransport {
    async fn post(&self, body: Bytes) -> Result<()> {
        let request = Request::post(self.url.clone())
            .header("content-type", "application/json")
            .body(Full::new(body))
            .map_err(|e| Error::Other(e.to_string()))?;

        let response = tokio::time::timeout(POST_TIMEOUT, self.client.request(request))
            .await
            .map_err(|_| Error::WriteFailed("webhook POST timed out".into()))?
            .map_err(|e| Error::WriteFailed(e.to_string()))?;

        let _ = response.into_body().collect().await;
        Ok(())
    }
}

/// Delivery over a Unix domain socket (`unix:///path/to.sock`), for
/// webhook consumers colocated on the same host — a raw, hand-written
/// HTTP/1.1 POST rather than a full client, since `hyper-util`'s legacy
/// connector is TCP-only.
pub struct UnixWebhookTransport {
    path: std::path::PathBuf,
}

impl UnixWebhookTransport {
    pub fn new(path: std::path::PathBuf) -> Self {
        Self { path }
    }
}

#[async_trait]
impl WebhookTransport for UnixWebhookTransport {
    async fn post(&self, body: Bytes) -> Result<()> {
        let connect = UnixStream::connect(&self.path);
        let mut stream = tokio::time::timeout(POST_TIMEOUT, connect)
            .await
            .map_err(|_| Error::WriteFailed("unix webhook connect timed out".into()))??;

        let request = format!(
            "POST / HTTP/1.1\r\nHost: localhost\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
            body.len()
        );
        let write = async {
            stream.write_all(request.as_bytes()).await?;
            stream.write_all(&body).await?;
            stream.flush().await
        };
        tokio::time::timeout(POST_TIMEOUT, write)
            .await
            .map_err(|_| Error::WriteFailed("unix webhook write timed out".into()))??;
        Ok(())
    }
}

pub fn resolve_transport(target: &str) -> Result<Arc<dyn WebhookTransport>> {
    if let Some(path) = target.strip_prefix("unix://") {
        return Ok(Arc::new(UnixWebhookTransport::new(std::path::PathBuf::from(path))));
    }
    let uri: hyper::Uri = target
        .parse()
        .map_err(|e: http::uri::InvalidUri| Error::Other(e.to_string()))?;
    Ok(Arc::new(HttpWebhookTransport::new(uri)))
}

/// Fires webhook events, deduplicating identical `(kind, subject)` pairs
/// within a TTL window so a flapping condition doesn't produce a POST
/// storm. A background sweep drops dedup entries once their TTL has
/// elapsed so the table doesn't grow without bound.
pub struct WebhookNotifier {
    transport: Arc<dyn WebhookTransport>,
    dedup: Arc<Mutex<HashMap<String, Instant>>>,
    dedup_ttl: Duration,
    _cleanup: PeriodicTask,
}

impl WebhookNotifier {
    pub fn new(transport: Arc<dyn WebhookTransport>, dedup_ttl: Duration) -> Self {
        let dedup = Arc::new(Mutex::new(HashMap::new()));
        let sweep_dedup = dedup.clone();
        let cleanup = PeriodicTask::spawn("webhook.dedup_cleanup", dedup_ttl.max(Duration::from_secs(1)), move || {
            let dedup = sweep_dedup.clone();
            async move {
                let now = Instant::now();
                dedup.lock().retain(|_, fired_at| now.duration_since(*fired_at) < dedup_ttl);
            }
        });
        Self {
            transport,
            dedup,
            dedup_ttl,
            _cleanup: cleanup,
        }
    }

    fn dedup_key(event: &WebhookEvent) -> String {
        format!("{}:{}", event.kind, event.subject)
    }

    /// Fires `event` unless an identical `(kind, subject)` pair already
    /// fired within the dedup TTL. Returns whether a POST was actually
    /// sent.
    pub async fn fire(&self, event: WebhookEvent) -> Result<bool> {
        let key = Self::dedup_key(&event);
        let now = Instant::now();
        {
            let mut dedup = self.dedup.lock();
            if let Some(fired_at) = dedup.get(&key) {
                if now.duration_since(*fired_at) < self.dedup_ttl {
                    return Ok(false);
                }
            }
            dedup.insert(key, now);
        }

        let body = serde_json::to_vec(&event).map_err(|e| Error::Other(e.to_string()))?;
        if let Err(e) = self.transport.post(Bytes::from(body)).await {
            warn!(kind = %event.kind, subject = %event.subject, error = %e, "webhook delivery failed");
            return Err(e);
        }
        Ok(true)
    }

    pub async fn close(&self) {
        self._cleanup.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingTransport {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl WebhookTransport for CountingTransport {
        async fn post(&self, _body: Bytes) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn event() -> WebhookEvent {
        WebhookEvent {
            kind: "auth_failure".into(),
            subject: "alice@example.com".into(),
            detail: serde_json::json!({ "inbound": "in1" }),
        }
    }

    #[tokio::test]
    async fn duplicate_events_within_ttl_fire_once() {
        let transport = Arc::new(CountingTransport { calls: AtomicUsize::new(0) });
        let notifier = WebhookNotifier::new(transport.clone(), Duration::from_secs(60));
        assert!(notifier.fire(event()).await.unwrap());
        assert!(!notifier.fire(event()).await.unwrap());
        assert_eq!(transport.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn event_fires_again_after_ttl_elapses() {
        let transport = Arc::new(CountingTransport { calls: AtomicUsize::new(0) });
        let notifier = WebhookNotifier::new(transport.clone(), Duration::from_millis(20));
        assert!(notifier.fire(event()).await.unwrap());
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(notifier.fire(event()).await.unwrap());
        assert_eq!(transport.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn resolve_transport_picks_unix_for_unix_scheme() {
        let transport = resolve_transport("unix:///tmp/webhook.sock").unwrap();
        let _ = transport; // type-checks as Arc<dyn WebhookTransport>
    }
}
