//! Network retrieval behind a trait seam.
//!
//! The interceptor and lifecycle controller never talk to reqwest
//! directly; they go through [`Network`] so tests can substitute a double
//! and prove properties like "no network call happens on a cache hit".

use async_trait::async_trait;
use bytes::Bytes;
use haven_core::Error;
use haven_core::config::AppConfig;
use reqwest::{Client, header};
use url::Url;

use crate::events::InterceptedRequest;

/// A completed network retrieval.
#[derive(Debug, Clone)]
pub struct NetworkResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
    /// The retrieval followed at least one redirect.
    pub redirected: bool,
    /// The final URL shares the request's origin (non-opaque).
    pub same_origin: bool,
    pub final_url: Url,
}

impl NetworkResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Whether this response is eligible for the dynamic partition:
    /// success status, direct (non-redirected), and origin-transparent.
    pub fn storable(&self) -> bool {
        self.is_success() && !self.redirected && self.same_origin
    }
}

/// Network retrieval seam.
#[async_trait]
pub trait Network: Send + Sync {
    /// Perform the retrieval for an intercepted request.
    ///
    /// Transport failures (offline, DNS, timeout) surface as
    /// `Error::FetchFailed`; HTTP error statuses are returned as responses.
    async fn retrieve(&self, request: &InterceptedRequest) -> Result<NetworkResponse, Error>;
}

/// reqwest-backed [`Network`] implementation.
pub struct HttpNetwork {
    http: Client,
}

impl HttpNetwork {
    /// Build the HTTP client from worker configuration.
    pub fn new(config: &AppConfig) -> Result<Self, Error> {
        let http = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(config.timeout())
            .use_rustls_tls()
            .gzip(true)
            .brotli(true)
            .deflate(true)
            .build()
            .map_err(|e| Error::FetchFailed(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { http })
    }
}

#[async_trait]
impl Network for HttpNetwork {
    async fn retrieve(&self, request: &InterceptedRequest) -> Result<NetworkResponse, Error> {
        let mut req = self.http.request(request.method.clone(), request.url.clone());
        if let Some(accept) = &request.accept {
            req = req.header(header::ACCEPT, accept);
        }

        let response = req
            .send()
            .await
            .map_err(|e| Error::FetchFailed(format!("network error: {e}")))?;

        let status = response.status().as_u16();
        let final_url = response.url().clone();
        let redirected = final_url != request.url;
        let same_origin = final_url.origin() == request.url.origin();

        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();

        let body = response
            .bytes()
            .await
            .map_err(|e| Error::FetchFailed(format!("failed to read response: {e}")))?;

        tracing::debug!(
            url = %request.url,
            final_url = %final_url,
            destination = ?request.destination,
            status,
            bytes = body.len(),
            "network retrieval"
        );

        Ok(NetworkResponse { status, headers, body, redirected, same_origin, final_url })
    }
}
