//! Sync and push notification stub.
//!
//! Best-effort only: a connectivity-restored event broadcasts a completion
//! notice to controlled clients, and push messages surface as
//! notifications. There is no durable queue and nothing is retried or
//! replayed.

use std::sync::Arc;

use async_trait::async_trait;
use haven_core::Error;
use serde::Deserialize;

use crate::clients::{ClientMessage, ClientRegistry};
use crate::events::{NotificationClickEvent, PushEvent, SyncEvent};

const SYNC_MESSAGE: &str = "Content synced successfully";

const DEFAULT_TITLE: &str = "Haven Care";
const DEFAULT_BODY: &str = "You have a new update";
const DEFAULT_ICON: &str = "/icons/icon-192.png";
const DEFAULT_URL: &str = "/";

/// Structured push payload. Absent fields fall back to fixed defaults.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PushPayload {
    pub title: Option<String>,
    pub body: Option<String>,
    pub icon: Option<String>,
    pub url: Option<String>,
}

/// A notification ready for display. `url` is carried as auxiliary data
/// and becomes the click target.
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub title: String,
    pub body: String,
    pub icon: String,
    pub url: String,
}

impl From<PushPayload> for Notification {
    fn from(payload: PushPayload) -> Self {
        Self {
            title: payload.title.unwrap_or_else(|| DEFAULT_TITLE.into()),
            body: payload.body.unwrap_or_else(|| DEFAULT_BODY.into()),
            icon: payload.icon.unwrap_or_else(|| DEFAULT_ICON.into()),
            url: payload.url.unwrap_or_else(|| DEFAULT_URL.into()),
        }
    }
}

/// Display seam for notifications.
#[async_trait]
pub trait NotificationPresenter: Send + Sync {
    async fn display(&self, notification: &Notification) -> Result<(), Error>;

    /// Close the currently displayed notification, if any.
    async fn dismiss(&self);
}

/// Default presenter: notifications go to the log.
pub struct LogPresenter;

#[async_trait]
impl NotificationPresenter for LogPresenter {
    async fn display(&self, notification: &Notification) -> Result<(), Error> {
        tracing::info!(
            title = %notification.title,
            body = %notification.body,
            url = %notification.url,
            "notification"
        );
        Ok(())
    }

    async fn dismiss(&self) {}
}

/// Handles sync, push, and notification-click events.
pub struct SyncStub {
    clients: Arc<ClientRegistry>,
    presenter: Arc<dyn NotificationPresenter>,
}

impl SyncStub {
    pub fn new(clients: Arc<ClientRegistry>, presenter: Arc<dyn NotificationPresenter>) -> Self {
        Self { clients, presenter }
    }

    /// Connectivity restored: post a completion notice to every controlled
    /// client. This is a placeholder signal; no failed action is replayed.
    pub async fn on_sync(&self, event: &SyncEvent) {
        let message = ClientMessage::SyncCompleted { message: SYNC_MESSAGE.into() };
        let reached = self.clients.broadcast(&message).await;
        tracing::info!(tag = %event.tag, clients = reached, "sync broadcast");
    }

    /// Push message: parse the payload and display a notification.
    /// A push with no payload is ignored.
    pub async fn on_push(&self, event: &PushEvent) -> Result<(), Error> {
        let Some(payload) = &event.payload else {
            tracing::debug!("push without payload ignored");
            return Ok(());
        };

        let parsed: PushPayload =
            serde_json::from_slice(payload).map_err(|e| Error::InvalidPayload(e.to_string()))?;
        let notification = Notification::from(parsed);
        self.presenter.display(&notification).await
    }

    /// Notification click: close it; for the "open" action, focus a client
    /// already showing the target URL or open a new one.
    pub async fn on_notification_click(&self, event: &NotificationClickEvent) {
        self.presenter.dismiss().await;

        if event.action.as_deref() != Some("open") {
            return;
        }

        match self.clients.find_by_url(&event.url).await {
            Some(id) => {
                self.clients.focus(id).await;
            }
            None => {
                self.clients.open_window(&event.url).await;
            }
        }
    }
}
