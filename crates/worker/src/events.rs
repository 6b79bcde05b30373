//! Event contexts dispatched to the worker's handlers.
//!
//! Each platform event (install, activate, fetch, sync, push) carries an
//! [`ExtendableEvent`]: background work registered through `wait_until`
//! keeps the event alive until it completes, without blocking the value
//! the handler returns. The platform awaits `settled()` before considering
//! the event finished, so a fire-and-forget cache store still runs to
//! completion before the worker can be torn down.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use url::Url;

/// Lifetime extension for a single event invocation.
#[derive(Clone, Default)]
pub struct ExtendableEvent {
    pending: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

impl ExtendableEvent {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register background work the event must outlive.
    ///
    /// The future is spawned immediately; it does not delay whatever the
    /// handler returns, only the settling of the event itself.
    pub async fn wait_until<F>(&self, fut: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.pending.lock().await.push(tokio::spawn(fut));
    }

    /// Wait for all registered background work to finish.
    ///
    /// Work registered while draining is picked up too.
    pub async fn settled(&self) {
        loop {
            let handle = self.pending.lock().await.pop();
            match handle {
                Some(handle) => {
                    // A panicked store task must not poison the event.
                    let _ = handle.await;
                }
                None => break,
            }
        }
    }
}

/// What the intercepted request is for, as reported by the platform.
///
/// Only `Document` changes interceptor behavior (offline navigation
/// fallback); the rest are kept for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Destination {
    Document,
    Script,
    Style,
    Image,
    Font,
    #[default]
    Other,
}

impl Destination {
    /// Map platform hints to a destination.
    ///
    /// Prefers the `Sec-Fetch-Dest` value; falls back to sniffing the
    /// Accept header for document navigations.
    pub fn from_hints(sec_fetch_dest: Option<&str>, accept: Option<&str>) -> Self {
        match sec_fetch_dest {
            Some("document") => return Self::Document,
            Some("script") => return Self::Script,
            Some("style") => return Self::Style,
            Some("image") => return Self::Image,
            Some("font") => return Self::Font,
            Some(_) => return Self::Other,
            None => {}
        }

        if accept.is_some_and(|a| a.contains("text/html")) {
            Self::Document
        } else {
            Self::Other
        }
    }
}

/// A request handed to the interceptor by the platform.
#[derive(Debug, Clone)]
pub struct InterceptedRequest {
    pub method: reqwest::Method,
    pub url: Url,
    pub destination: Destination,
    /// Accept header, forwarded to the origin on network retrieval.
    pub accept: Option<String>,
}

impl InterceptedRequest {
    /// A plain GET retrieval for the given URL.
    pub fn get(url: Url) -> Self {
        Self { method: reqwest::Method::GET, url, destination: Destination::Other, accept: None }
    }

    pub fn with_destination(mut self, destination: Destination) -> Self {
        self.destination = destination;
        self
    }
}

/// Fetch event: one intercepted request plus its lifetime extension.
#[derive(Clone)]
pub struct FetchEvent {
    pub request: InterceptedRequest,
    ext: ExtendableEvent,
}

impl FetchEvent {
    pub fn new(request: InterceptedRequest) -> Self {
        Self { request, ext: ExtendableEvent::new() }
    }

    pub async fn wait_until<F>(&self, fut: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.ext.wait_until(fut).await;
    }

    pub async fn settled(&self) {
        self.ext.settled().await;
    }
}

/// Connectivity-restored event.
#[derive(Clone)]
pub struct SyncEvent {
    pub tag: String,
    ext: ExtendableEvent,
}

impl SyncEvent {
    pub fn new(tag: impl Into<String>) -> Self {
        Self { tag: tag.into(), ext: ExtendableEvent::new() }
    }

    pub async fn settled(&self) {
        self.ext.settled().await;
    }
}

/// Push message event. `payload` is the raw message body, if any.
#[derive(Clone)]
pub struct PushEvent {
    pub payload: Option<Vec<u8>>,
    ext: ExtendableEvent,
}

impl PushEvent {
    pub fn new(payload: Option<Vec<u8>>) -> Self {
        Self { payload, ext: ExtendableEvent::new() }
    }

    pub async fn settled(&self) {
        self.ext.settled().await;
    }
}

/// Notification-click event: the activated action and the target URL the
/// notification's auxiliary data carried.
#[derive(Debug, Clone)]
pub struct NotificationClickEvent {
    pub action: Option<String>,
    pub url: String,
}
