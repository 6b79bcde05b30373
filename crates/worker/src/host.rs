//! The worker host: one version of the offline cache manager, wired up.
//!
//! Owns the lifecycle controller, request interceptor, and sync stub, and
//! is the single dispatch point the platform drives events through. The
//! configuration struct is taken once at construction; nothing here reads
//! ambient globals.

use std::sync::Arc;

use haven_core::config::AppConfig;
use haven_core::{CacheDb, Error};

use crate::clients::ClientRegistry;
use crate::events::{FetchEvent, InterceptedRequest, NotificationClickEvent, PushEvent, SyncEvent};
use crate::interceptor::{InterceptedResponse, RequestInterceptor};
use crate::lifecycle::{LifecycleController, WorkerState};
use crate::net::Network;
use crate::sync::{NotificationPresenter, SyncStub};

pub struct WorkerHost {
    lifecycle: LifecycleController,
    interceptor: RequestInterceptor,
    sync: SyncStub,
    clients: Arc<ClientRegistry>,
}

impl WorkerHost {
    pub fn new(
        cache: CacheDb, config: &AppConfig, network: Arc<dyn Network>, presenter: Arc<dyn NotificationPresenter>,
    ) -> Result<Self, Error> {
        let clients = Arc::new(ClientRegistry::new());
        let lifecycle = LifecycleController::new(cache.clone(), config, network.clone(), clients.clone())?;
        let interceptor = RequestInterceptor::new(cache, config, network);
        let sync = SyncStub::new(clients.clone(), presenter);

        Ok(Self { lifecycle, interceptor, sync, clients })
    }

    pub fn clients(&self) -> Arc<ClientRegistry> {
        self.clients.clone()
    }

    pub async fn state(&self) -> WorkerState {
        self.lifecycle.state().await
    }

    /// Dispatch the install event and await it fully.
    pub async fn install(&self) -> Result<(), Error> {
        self.lifecycle.install().await
    }

    /// Dispatch the activate event and await it fully.
    pub async fn activate(&self) -> Result<(), Error> {
        self.lifecycle.activate().await
    }

    /// Dispatch a fetch event.
    ///
    /// The response is returned as soon as the interceptor produces it;
    /// background work the event registered (the dynamic-partition store)
    /// keeps running and is drained off-path. A worker that is not active
    /// intercepts nothing.
    pub async fn fetch(&self, request: InterceptedRequest) -> Result<Option<InterceptedResponse>, Error> {
        if !self.lifecycle.state().await.can_intercept() {
            return Ok(None);
        }

        let event = FetchEvent::new(request);
        let result = self.interceptor.handle(&event).await;

        let pending = event.clone();
        tokio::spawn(async move { pending.settled().await });

        result
    }

    /// Dispatch a connectivity-restored event and await it fully.
    pub async fn sync(&self, tag: &str) {
        let event = SyncEvent::new(tag);
        self.sync.on_sync(&event).await;
        event.settled().await;
    }

    /// Dispatch a push event and await it fully.
    pub async fn push(&self, payload: Option<Vec<u8>>) -> Result<(), Error> {
        let event = PushEvent::new(payload);
        let result = self.sync.on_push(&event).await;
        event.settled().await;
        result
    }

    /// Dispatch a notification-click event.
    pub async fn notification_click(&self, action: Option<String>, url: String) {
        let event = NotificationClickEvent { action, url };
        self.sync.on_notification_click(&event).await;
    }
}
