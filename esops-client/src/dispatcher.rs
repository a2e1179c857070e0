//! Multi-host request dispatch with failover.

use bytes::Bytes;
use http::Method;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::config::ErrorPolicy;
use crate::error::{error_reason, EsClientError, Result};
use crate::selector::EndpointSelector;
use crate::transport::{Transport, TransportRequest, JSON, NDJSON};

/// One logical request, independent of the host it ends up on.
#[derive(Debug, Clone)]
pub struct DispatchRequest {
    /// HTTP method.
    pub method: Method,
    /// Path relative to the host base URL, query string included.
    pub path: String,
    /// Body, materialized once and reused by every attempt.
    pub body: Option<Bytes>,
    /// Content type of the body.
    pub content_type: &'static str,
}

impl DispatchRequest {
    /// Create a request without a body.
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            body: None,
            content_type: JSON,
        }
    }

    /// GET request.
    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    /// HEAD request.
    pub fn head(path: impl Into<String>) -> Self {
        Self::new(Method::HEAD, path)
    }

    /// POST request.
    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    /// PUT request.
    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    /// DELETE request.
    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    /// Attach a JSON body.
    pub fn json(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self.content_type = JSON;
        self
    }

    /// Attach a newline-delimited JSON body.
    pub fn ndjson(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self.content_type = NDJSON;
        self
    }
}

/// Runs logical requests against the host pool.
///
/// Transport failures demote the host and move on to the next candidate with
/// the same body. Error statuses are never retried; they are handled according
/// to the configured [`ErrorPolicy`]. Calls are independent and may be in
/// flight concurrently; they share only the selector's health table.
#[derive(Clone)]
pub struct Dispatcher {
    selector: Arc<EndpointSelector>,
    transport: Arc<dyn Transport>,
    policy: ErrorPolicy,
}

impl Dispatcher {
    /// Create a dispatcher.
    pub fn new(
        selector: Arc<EndpointSelector>,
        transport: Arc<dyn Transport>,
        policy: ErrorPolicy,
    ) -> Self {
        Self {
            selector,
            transport,
            policy,
        }
    }

    /// The shared host pool.
    pub fn selector(&self) -> &Arc<EndpointSelector> {
        &self.selector
    }

    /// The configured error status policy.
    pub fn policy(&self) -> ErrorPolicy {
        self.policy
    }

    /// Execute a request and decode a successful body with `decode`.
    ///
    /// Resolves to `Ok(None)` only when an error status is absorbed under
    /// [`ErrorPolicy::BestEffort`].
    pub async fn execute<R, D>(&self, request: DispatchRequest, decode: D) -> Result<Option<R>>
    where
        D: FnOnce(Bytes) -> Result<R>,
    {
        self.execute_with_policy(request, self.policy, decode).await
    }

    /// Execute a request with an explicit error status policy.
    pub async fn execute_with_policy<R, D>(
        &self,
        request: DispatchRequest,
        policy: ErrorPolicy,
        decode: D,
    ) -> Result<Option<R>>
    where
        D: FnOnce(Bytes) -> Result<R>,
    {
        let mut attempts = 0;
        let mut last_error = None;
        let mut candidates = self.selector.available();

        loop {
            let Some(endpoint) = candidates.next() else {
                warn!(
                    method = %request.method,
                    path = %request.path,
                    attempts,
                    "All hosts exhausted"
                );
                return Err(EsClientError::HostsExhausted {
                    attempts,
                    last_error,
                });
            };
            attempts += 1;

            let attempt = TransportRequest {
                method: request.method.clone(),
                url: endpoint.resolve(&request.path)?,
                body: request.body.clone(),
                content_type: request.content_type,
            };

            debug!(host = %endpoint, method = %request.method, path = %request.path, "Dispatching request");

            let response = match self.transport.send(attempt).await {
                Ok(response) => response,
                Err(e) if e.is_transport() => {
                    warn!(host = %endpoint, attempt = attempts, error = %e, "Transport failure, trying next host");
                    self.selector.on_failure(&endpoint);
                    last_error = Some(e.to_string());
                    continue;
                }
                Err(e) => return Err(e),
            };

            if response.is_error() {
                let status = response.status.as_u16();
                let reason = error_reason(&response.body);
                return match policy {
                    ErrorPolicy::Propagate => Err(EsClientError::Application { status, reason }),
                    ErrorPolicy::BestEffort => {
                        warn!(host = %endpoint, status, reason = %reason, "Ignoring error response");
                        Ok(None)
                    }
                };
            }

            return decode(response.body).map(Some);
        }
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("hosts", &self.selector.hosts())
            .field("policy", &self.policy)
            .finish()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::transport::RawResponse;
    use async_trait::async_trait;
    use http::StatusCode;
    use parking_lot::Mutex;
    use std::collections::{HashMap, VecDeque};
    use std::time::Duration;

    /// Scripted transport: outcomes are queued per host, a host with an
    /// empty queue fails at the transport level.
    #[derive(Default)]
    pub(crate) struct ScriptedTransport {
        responses: Mutex<HashMap<String, VecDeque<Result<RawResponse>>>>,
        pub(crate) requests: Mutex<Vec<TransportRequest>>,
    }

    impl ScriptedTransport {
        pub(crate) fn respond(&self, host: &str, status: u16, body: &str) {
            self.responses
                .lock()
                .entry(host.to_string())
                .or_default()
                .push_back(Ok(RawResponse::new(
                    StatusCode::from_u16(status).unwrap(),
                    body.to_string(),
                )));
        }

        pub(crate) fn fail(&self, host: &str, error: EsClientError) {
            self.responses
                .lock()
                .entry(host.to_string())
                .or_default()
                .push_back(Err(error));
        }

        pub(crate) fn attempts_on(&self, host: &str) -> usize {
            self.requests
                .lock()
                .iter()
                .filter(|r| r.url.host_str() == Some(host))
                .count()
        }

        pub(crate) fn bodies(&self) -> Vec<Bytes> {
            self.requests
                .lock()
                .iter()
                .filter_map(|r| r.body.clone())
                .collect()
        }

        pub(crate) fn paths(&self) -> Vec<String> {
            self.requests
                .lock()
                .iter()
                .map(|r| match r.url.query() {
                    Some(q) => format!("{}?{}", r.url.path(), q),
                    None => r.url.path().to_string(),
                })
                .collect()
        }
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn send(&self, request: TransportRequest) -> Result<RawResponse> {
            let host = request.url.host_str().unwrap_or_default().to_string();
            self.requests.lock().push(request);
            let next = self
                .responses
                .lock()
                .get_mut(&host)
                .and_then(VecDeque::pop_front);
            next.unwrap_or_else(|| {
                Err(EsClientError::Transport {
                    host,
                    message: "connection refused".to_string(),
                })
            })
        }
    }

    pub(crate) fn dispatcher(
        hosts: &[&str],
        policy: ErrorPolicy,
    ) -> (Dispatcher, Arc<ScriptedTransport>) {
        let urls: Vec<String> = hosts.iter().map(|h| format!("http://{}:9200", h)).collect();
        let selector = EndpointSelector::from_urls(&urls, Duration::from_secs(60)).unwrap();
        let transport = Arc::new(ScriptedTransport::default());
        let dispatcher = Dispatcher::new(Arc::new(selector), transport.clone(), policy);
        (dispatcher, transport)
    }

    fn as_json(body: Bytes) -> Result<serde_json::Value> {
        Ok(serde_json::from_slice(&body)?)
    }

    #[tokio::test]
    async fn test_fails_over_to_third_host() {
        let (dispatcher, transport) = dispatcher(&["a", "b", "c"], ErrorPolicy::Propagate);
        transport.respond("c", 200, r#"{"host":"c"}"#);

        let request = DispatchRequest::post("docs/_count").json(r#"{"query":{}}"#);
        let value = dispatcher.execute(request, as_json).await.unwrap().unwrap();

        assert_eq!(value["host"], "c");
        assert_eq!(dispatcher.selector().demotions(), 2);
        assert_eq!(dispatcher.selector().healthy_count(), 1);

        // Every attempt carried the same materialized body.
        let bodies = transport.bodies();
        assert_eq!(bodies.len(), 3);
        assert!(bodies.iter().all(|b| &b[..] == br#"{"query":{}}"#));
    }

    #[tokio::test]
    async fn test_exhaustion_is_surfaced() {
        let (dispatcher, transport) = dispatcher(&["a", "b"], ErrorPolicy::Propagate);

        let err = dispatcher
            .execute(DispatchRequest::get("docs"), as_json)
            .await
            .unwrap_err();

        match err {
            EsClientError::HostsExhausted {
                attempts,
                last_error,
            } => {
                assert_eq!(attempts, 2);
                assert!(last_error.unwrap().contains("connection refused"));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(transport.requests.lock().len(), 2);

        // With every host cooling down, nothing is attempted at all.
        let err = dispatcher
            .execute(DispatchRequest::get("docs"), as_json)
            .await
            .unwrap_err();
        assert!(matches!(err, EsClientError::HostsExhausted { attempts: 0, .. }));
        assert_eq!(transport.requests.lock().len(), 2);
    }

    #[tokio::test]
    async fn test_error_status_is_not_retried() {
        let (dispatcher, transport) = dispatcher(&["a", "b"], ErrorPolicy::Propagate);
        transport.respond("a", 400, r#"{"error":{"reason":"failed to parse"}}"#);
        transport.respond("b", 200, "{}");

        let err = dispatcher
            .execute(DispatchRequest::post("docs/_search"), as_json)
            .await
            .unwrap_err();

        assert_eq!(err.status_code(), Some(400));
        assert!(err.to_string().contains("failed to parse"));
        assert_eq!(transport.requests.lock().len(), 1);
        assert_eq!(dispatcher.selector().demotions(), 0);
    }

    #[tokio::test]
    async fn test_best_effort_absorbs_error_status() {
        let (dispatcher, transport) = dispatcher(&["a"], ErrorPolicy::BestEffort);
        transport.respond("a", 503, "Service Unavailable");

        let value = dispatcher
            .execute(DispatchRequest::get("docs"), as_json)
            .await
            .unwrap();

        assert!(value.is_none());
    }

    #[tokio::test]
    async fn test_decode_failure_is_serialization_error() {
        let (dispatcher, transport) = dispatcher(&["a"], ErrorPolicy::Propagate);
        transport.respond("a", 200, "not json");

        let err = dispatcher
            .execute(DispatchRequest::get("docs"), as_json)
            .await
            .unwrap_err();

        assert!(matches!(err, EsClientError::Serialization(_)));
    }

    #[tokio::test]
    async fn test_body_read_failure_is_not_failed_over() {
        let (dispatcher, transport) = dispatcher(&["a", "b"], ErrorPolicy::Propagate);
        transport.fail("a", EsClientError::Protocol("connection reset mid-body".into()));
        transport.respond("b", 200, r#"{"took":1,"errors":false}"#);

        let request = DispatchRequest::post("docs/_doc/_bulk").ndjson("{\"index\":{}}\n{}\n");
        let err = dispatcher.execute(request, as_json).await.unwrap_err();

        assert!(matches!(err, EsClientError::Protocol(_)));
        assert_eq!(transport.attempts_on("a"), 1);
        assert_eq!(transport.attempts_on("b"), 0);
        assert_eq!(dispatcher.selector().demotions(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_calls_share_host_health() {
        let (dispatcher, transport) = dispatcher(&["a", "b"], ErrorPolicy::Propagate);
        for _ in 0..10 {
            transport.respond("b", 200, "{}");
        }

        let calls: Vec<_> = (0..8)
            .map(|_| {
                let dispatcher = dispatcher.clone();
                tokio::spawn(async move {
                    dispatcher.execute(DispatchRequest::get("docs"), as_json).await
                })
            })
            .collect();
        for call in calls {
            assert!(call.await.unwrap().unwrap().is_some());
        }

        assert_eq!(dispatcher.selector().demotions(), 1);
        assert_eq!(dispatcher.selector().healthy_count(), 1);

        // Later calls from either rotation position skip the failed host.
        let failed_attempts = transport.attempts_on("a");
        for _ in 0..2 {
            dispatcher
                .execute(DispatchRequest::get("docs"), as_json)
                .await
                .unwrap();
        }
        assert_eq!(transport.attempts_on("a"), failed_attempts);
    }

    #[tokio::test]
    async fn test_ndjson_content_type() {
        let (dispatcher, transport) = dispatcher(&["a"], ErrorPolicy::Propagate);
        transport.respond("a", 200, "{}");

        dispatcher
            .execute(DispatchRequest::post("docs/_bulk").ndjson("{}\n"), |_| Ok(()))
            .await
            .unwrap();

        assert_eq!(transport.requests.lock()[0].content_type, NDJSON);
        assert_eq!(transport.paths(), vec!["/docs/_bulk".to_string()]);
    }
}
