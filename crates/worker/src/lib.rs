//! The haven offline cache worker.
//!
//! This crate implements the background script that fronts a site's
//! origin: a lifecycle controller that seeds and retires versioned cache
//! partitions, a request interceptor applying a cache-first policy with
//! offline fallbacks, and a best-effort sync/push notification stub.
//! The hosting platform (the gateway binary, or tests) dispatches events
//! through [`WorkerHost`] and awaits each event until it settles.

pub mod clients;
pub mod events;
pub mod host;
pub mod interceptor;
pub mod lifecycle;
pub mod net;
pub mod sync;

pub use clients::{ClientId, ClientMessage, ClientRegistry};
pub use events::{Destination, ExtendableEvent, FetchEvent, InterceptedRequest, NotificationClickEvent, PushEvent, SyncEvent};
pub use host::WorkerHost;
pub use interceptor::{InterceptedResponse, RequestInterceptor, ResponseSource};
pub use lifecycle::{LifecycleController, WorkerState};
pub use net::{HttpNetwork, Network, NetworkResponse};
pub use sync::{LogPresenter, Notification, NotificationPresenter, PushPayload, SyncStub};
