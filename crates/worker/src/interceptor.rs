//! Request interception: cache-first, network fallback, offline synthesis.
//!
//! Policy, in order:
//! 1. Eligibility: GET over http(s) only; everything else passes through.
//! 2. Identity lookup across all partitions; a hit is served verbatim with
//!    no network call.
//! 3. Network retrieval. An eligible success (2xx, direct, same-origin) is
//!    duplicated: one copy goes back to the caller, one is stored into the
//!    dynamic partition as fire-and-forget work tracked by the event.
//! 4. On retrieval failure: document navigations get the pre-stored
//!    offline page; API paths get a synthesized 503 JSON payload; anything
//!    else propagates the failure.

use std::sync::Arc;

use bytes::Bytes;
use haven_core::cache::StoredResponse;
use haven_core::cache::identity::request_key;
use haven_core::config::AppConfig;
use haven_core::{CacheDb, Error};

use crate::events::{Destination, FetchEvent};
use crate::net::{Network, NetworkResponse};

const OFFLINE_API_ERROR: &str = "You are offline and this content is not cached";

/// Where an intercepted response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseSource {
    /// Exact identity match in a cache partition.
    Cache,
    /// Fresh network retrieval.
    Network,
    /// The pre-stored offline fallback document.
    OfflineFallback,
    /// Synthesized by the interceptor (offline API payload).
    Synthesized,
}

/// Response handed back to the platform for an intercepted request.
#[derive(Debug, Clone)]
pub struct InterceptedResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
    pub source: ResponseSource,
}

impl InterceptedResponse {
    fn from_stored(stored: StoredResponse, source: ResponseSource) -> Self {
        Self { status: stored.status, headers: stored.headers, body: Bytes::from(stored.body), source }
    }

    fn from_network(response: &NetworkResponse) -> Self {
        Self {
            status: response.status,
            headers: response.headers.clone(),
            body: response.body.clone(),
            source: ResponseSource::Network,
        }
    }

    fn offline_api() -> Self {
        let payload = serde_json::json!({ "error": OFFLINE_API_ERROR, "offline": true });
        Self {
            status: 503,
            headers: vec![("content-type".into(), "application/json".into())],
            body: Bytes::from(payload.to_string()),
            source: ResponseSource::Synthesized,
        }
    }
}

/// Serves retrieval requests with the cache-first policy.
pub struct RequestInterceptor {
    cache: CacheDb,
    network: Arc<dyn Network>,
    static_partition: String,
    dynamic_partition: String,
    offline_page: String,
    api_prefix: String,
    max_store_bytes: usize,
}

impl RequestInterceptor {
    pub fn new(cache: CacheDb, config: &AppConfig, network: Arc<dyn Network>) -> Self {
        Self {
            cache,
            network,
            static_partition: config.static_partition(),
            dynamic_partition: config.dynamic_partition(),
            offline_page: config.offline_page.clone(),
            api_prefix: config.api_prefix.clone(),
            max_store_bytes: config.max_bytes,
        }
    }

    /// Handle one fetch event.
    ///
    /// `Ok(None)` means the request is not eligible for interception and
    /// the platform should apply its default handling. An `Err` is a
    /// request that was intercepted but could not be answered.
    pub async fn handle(&self, event: &FetchEvent) -> Result<Option<InterceptedResponse>, Error> {
        let request = &event.request;

        if request.method != reqwest::Method::GET {
            return Ok(None);
        }
        if !matches!(request.url.scheme(), "http" | "https") {
            return Ok(None);
        }

        let key = request_key(request.method.as_str(), request.url.as_str());

        if let Some(stored) = self.cache.match_entry(&key).await? {
            tracing::debug!(url = %request.url, destination = ?request.destination, "cache hit");
            return Ok(Some(InterceptedResponse::from_stored(stored, ResponseSource::Cache)));
        }

        match self.network.retrieve(request).await {
            Ok(response) => {
                let out = InterceptedResponse::from_network(&response);

                if response.storable() && response.body.len() <= self.max_store_bytes {
                    self.store_in_background(event, &response).await;
                } else if response.is_success() {
                    tracing::debug!(url = %request.url, "response not eligible for storage");
                }

                Ok(Some(out))
            }
            Err(e) => self.offline_fallback(request, e).await,
        }
    }

    /// Duplicate the response into the dynamic partition without holding
    /// up response delivery. Failure is logged and ignored.
    async fn store_in_background(&self, event: &FetchEvent, response: &NetworkResponse) {
        let request = &event.request;
        let stored = StoredResponse::new(
            request.method.as_str(),
            request.url.as_str(),
            response.status,
            response.headers.clone(),
            response.body.to_vec(),
        );
        let cache = self.cache.clone();
        let partition = self.dynamic_partition.clone();
        let url = request.url.clone();

        event
            .wait_until(async move {
                if let Err(e) = cache.put_entry(&partition, &stored).await {
                    tracing::warn!(url = %url, error = %e, "failed to store dynamic cache entry");
                }
            })
            .await;
    }

    async fn offline_fallback(
        &self, request: &crate::events::InterceptedRequest, cause: Error,
    ) -> Result<Option<InterceptedResponse>, Error> {
        if request.destination == Destination::Document {
            let fallback_url = request
                .url
                .join(&self.offline_page)
                .map_err(|e| Error::InvalidUrl(e.to_string()))?;
            let key = request_key("GET", fallback_url.as_str());

            return match self.cache.match_in_partition(&self.static_partition, &key).await? {
                Some(stored) => {
                    tracing::info!(url = %request.url, "serving offline fallback page");
                    Ok(Some(InterceptedResponse::from_stored(stored, ResponseSource::OfflineFallback)))
                }
                None => Err(Error::FallbackMissing(self.offline_page.clone())),
            };
        }

        if request.url.path().contains(&self.api_prefix) {
            tracing::info!(url = %request.url, "serving offline API payload");
            return Ok(Some(InterceptedResponse::offline_api()));
        }

        // No fallback is defined for other destinations; the failure is
        // the caller's to surface.
        Err(cause)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::InterceptedRequest;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use url::Url;

    /// Counts calls; behavior decided by the variant.
    enum Behavior {
        Ok(NetworkResponse),
        Offline,
    }

    struct CountingNetwork {
        calls: AtomicUsize,
        behavior: Behavior,
    }

    impl CountingNetwork {
        fn ok(response: NetworkResponse) -> Self {
            Self { calls: AtomicUsize::new(0), behavior: Behavior::Ok(response) }
        }

        fn offline() -> Self {
            Self { calls: AtomicUsize::new(0), behavior: Behavior::Offline }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Network for CountingNetwork {
        async fn retrieve(&self, _request: &InterceptedRequest) -> Result<NetworkResponse, Error> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.behavior {
                Behavior::Ok(r) => Ok(r.clone()),
                Behavior::Offline => Err(Error::FetchFailed("network unreachable".into())),
            }
        }
    }

    fn network_response(status: u16, body: &[u8]) -> NetworkResponse {
        NetworkResponse {
            status,
            headers: vec![("content-type".into(), "text/html".into())],
            body: Bytes::copy_from_slice(body),
            redirected: false,
            same_origin: true,
            final_url: Url::parse("https://example.com/").unwrap(),
        }
    }

    fn site_url(path: &str) -> Url {
        Url::parse("https://example.com").unwrap().join(path).unwrap()
    }

    async fn setup(network: Arc<dyn Network>) -> (CacheDb, AppConfig, RequestInterceptor) {
        let cache = CacheDb::open_in_memory().await.unwrap();
        let config = AppConfig::default();
        cache.open_partition(&config.static_partition()).await.unwrap();
        cache.open_partition(&config.dynamic_partition()).await.unwrap();
        let interceptor = RequestInterceptor::new(cache.clone(), &config, network);
        (cache, config, interceptor)
    }

    #[tokio::test]
    async fn test_cache_hit_makes_no_network_call() {
        let network = Arc::new(CountingNetwork::offline());
        let (cache, config, interceptor) = setup(network.clone()).await;

        let url = site_url("/index.html");
        let stored = StoredResponse::new("GET", url.as_str(), 200, Vec::new(), b"cached bytes".to_vec());
        cache.put_entry(&config.static_partition(), &stored).await.unwrap();

        let event = FetchEvent::new(InterceptedRequest::get(url));
        let response = interceptor.handle(&event).await.unwrap().unwrap();
        event.settled().await;

        assert_eq!(response.source, ResponseSource::Cache);
        assert_eq!(response.body.as_ref(), b"cached bytes");
        assert_eq!(network.calls(), 0);
    }

    #[tokio::test]
    async fn test_miss_fetches_and_stores_dynamically() {
        let network = Arc::new(CountingNetwork::ok(network_response(200, b"fresh")));
        let (cache, config, interceptor) = setup(network.clone()).await;

        let url = site_url("/services");
        let event = FetchEvent::new(InterceptedRequest::get(url.clone()));
        let response = interceptor.handle(&event).await.unwrap().unwrap();
        event.settled().await;

        assert_eq!(response.source, ResponseSource::Network);
        assert_eq!(network.calls(), 1);

        let key = request_key("GET", url.as_str());
        let stored = cache
            .match_in_partition(&config.dynamic_partition(), &key)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.body, b"fresh");
    }

    #[tokio::test]
    async fn test_non_success_is_returned_but_never_stored() {
        let network = Arc::new(CountingNetwork::ok(network_response(404, b"not found")));
        let (cache, config, interceptor) = setup(network).await;

        let url = site_url("/missing");
        let event = FetchEvent::new(InterceptedRequest::get(url.clone()));
        let response = interceptor.handle(&event).await.unwrap().unwrap();
        event.settled().await;

        assert_eq!(response.status, 404);
        let key = request_key("GET", url.as_str());
        assert!(
            cache
                .match_in_partition(&config.dynamic_partition(), &key)
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_redirected_response_not_stored() {
        let mut response = network_response(200, b"moved");
        response.redirected = true;
        let network = Arc::new(CountingNetwork::ok(response));
        let (cache, config, interceptor) = setup(network).await;

        let event = FetchEvent::new(InterceptedRequest::get(site_url("/old")));
        interceptor.handle(&event).await.unwrap().unwrap();
        event.settled().await;

        assert_eq!(cache.entry_count(&config.dynamic_partition()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_cross_origin_response_not_stored() {
        let mut response = network_response(200, b"cdn");
        response.same_origin = false;
        let network = Arc::new(CountingNetwork::ok(response));
        let (cache, config, interceptor) = setup(network).await;

        let event = FetchEvent::new(InterceptedRequest::get(site_url("/asset")));
        interceptor.handle(&event).await.unwrap().unwrap();
        event.settled().await;

        assert_eq!(cache.entry_count(&config.dynamic_partition()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_oversized_response_returned_but_not_stored() {
        let big = vec![0u8; 64];
        let network = Arc::new(CountingNetwork::ok(network_response(200, &big)));
        let cache = CacheDb::open_in_memory().await.unwrap();
        let config = AppConfig { max_bytes: 16, ..Default::default() };
        cache.open_partition(&config.dynamic_partition()).await.unwrap();
        let interceptor = RequestInterceptor::new(cache.clone(), &config, network);

        let event = FetchEvent::new(InterceptedRequest::get(site_url("/large")));
        let response = interceptor.handle(&event).await.unwrap().unwrap();
        event.settled().await;

        assert_eq!(response.body.len(), 64);
        assert_eq!(cache.entry_count(&config.dynamic_partition()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_store_failure_does_not_affect_response() {
        let network = Arc::new(CountingNetwork::ok(network_response(200, b"fresh")));
        let cache = CacheDb::open_in_memory().await.unwrap();
        let config = AppConfig::default();
        // Dynamic partition deliberately missing: the background store hits
        // a foreign-key failure.
        let interceptor = RequestInterceptor::new(cache.clone(), &config, network);

        let event = FetchEvent::new(InterceptedRequest::get(site_url("/page")));
        let response = interceptor.handle(&event).await.unwrap().unwrap();
        event.settled().await;

        assert_eq!(response.status, 200);
        assert_eq!(response.body.as_ref(), b"fresh");
    }

    #[tokio::test]
    async fn test_offline_navigation_serves_fallback_page() {
        let network = Arc::new(CountingNetwork::offline());
        let (cache, config, interceptor) = setup(network).await;

        let fallback_url = site_url("/offline.html");
        let fallback = StoredResponse::new("GET", fallback_url.as_str(), 200, Vec::new(), b"<h1>offline</h1>".to_vec());
        cache.put_entry(&config.static_partition(), &fallback).await.unwrap();

        let request = InterceptedRequest::get(site_url("/services")).with_destination(Destination::Document);
        let event = FetchEvent::new(request);
        let response = interceptor.handle(&event).await.unwrap().unwrap();

        assert_eq!(response.source, ResponseSource::OfflineFallback);
        assert_eq!(response.body.as_ref(), b"<h1>offline</h1>");
    }

    #[tokio::test]
    async fn test_offline_navigation_without_fallback_errors() {
        let network = Arc::new(CountingNetwork::offline());
        let (_cache, _config, interceptor) = setup(network).await;

        let request = InterceptedRequest::get(site_url("/services")).with_destination(Destination::Document);
        let event = FetchEvent::new(request);
        let result = interceptor.handle(&event).await;

        assert!(matches!(result, Err(Error::FallbackMissing(_))));
    }

    #[tokio::test]
    async fn test_offline_api_synthesizes_json_payload() {
        let network = Arc::new(CountingNetwork::offline());
        let (_cache, _config, interceptor) = setup(network).await;

        let event = FetchEvent::new(InterceptedRequest::get(site_url("/api/care-plans")));
        let response = interceptor.handle(&event).await.unwrap().unwrap();

        assert_eq!(response.status, 503);
        assert_eq!(response.source, ResponseSource::Synthesized);
        let payload: serde_json::Value = serde_json::from_slice(&response.body).unwrap();
        assert_eq!(payload["offline"], true);
        assert!(payload["error"].is_string());
    }

    #[tokio::test]
    async fn test_offline_other_destination_propagates_failure() {
        let network = Arc::new(CountingNetwork::offline());
        let (_cache, _config, interceptor) = setup(network).await;

        let event = FetchEvent::new(InterceptedRequest::get(site_url("/styles/site.css")));
        let result = interceptor.handle(&event).await;

        assert!(matches!(result, Err(Error::FetchFailed(_))));
    }

    #[tokio::test]
    async fn test_non_get_passes_through() {
        let network = Arc::new(CountingNetwork::offline());
        let (_cache, _config, interceptor) = setup(network.clone()).await;

        let mut request = InterceptedRequest::get(site_url("/api/enroll"));
        request.method = reqwest::Method::POST;
        let event = FetchEvent::new(request);

        let response = interceptor.handle(&event).await.unwrap();
        assert!(response.is_none());
        assert_eq!(network.calls(), 0);
    }

    #[tokio::test]
    async fn test_extension_scheme_passes_through() {
        let network = Arc::new(CountingNetwork::offline());
        let (_cache, _config, interceptor) = setup(network.clone()).await;

        let url = Url::parse("chrome-extension://abcdef/widget.js").unwrap();
        let event = FetchEvent::new(InterceptedRequest::get(url));

        let response = interceptor.handle(&event).await.unwrap();
        assert!(response.is_none());
        assert_eq!(network.calls(), 0);
    }
}
