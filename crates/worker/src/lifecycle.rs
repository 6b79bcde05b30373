//! Worker lifecycle: install, activate, and the version state machine.
//!
//! A version moves `new -> installing -> installed -> activating -> active`.
//! There is no rollback transition: a failed install parks the version in
//! `redundant` and whatever version was active before stays in control.

use std::fmt;
use std::sync::Arc;

use haven_core::cache::StoredResponse;
use haven_core::config::AppConfig;
use haven_core::{CacheDb, Error};
use tokio::sync::Mutex;
use url::Url;

use crate::clients::ClientRegistry;
use crate::events::InterceptedRequest;
use crate::net::Network;

/// Lifecycle states for one worker version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    /// Constructed, nothing seeded yet.
    New,
    /// Install event in flight: seeding the static partition.
    Installing,
    /// Seeded and ready to supersede the active version immediately.
    Installed,
    /// Activate event in flight: evicting partitions from other versions.
    Activating,
    /// Controlling clients and intercepting requests.
    Active,
    /// Install failed or the version was superseded. Terminal.
    Redundant,
}

impl WorkerState {
    /// Only an active worker may intercept requests.
    pub fn can_intercept(&self) -> bool {
        matches!(self, WorkerState::Active)
    }
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            WorkerState::New => "new",
            WorkerState::Installing => "installing",
            WorkerState::Installed => "installed",
            WorkerState::Activating => "activating",
            WorkerState::Active => "active",
            WorkerState::Redundant => "redundant",
        };
        f.write_str(s)
    }
}

fn is_valid_transition(from: WorkerState, to: WorkerState) -> bool {
    use WorkerState::*;

    matches!(
        (from, to),
        (New, Installing)
            | (Installing, Installed)
            | (Installing, Redundant)
            | (Installed, Activating)
            | (Activating, Active)
            | (Activating, Redundant)
            | (Active, Redundant)
    )
}

/// Establishes and retires cache partitions as the deployed version changes.
pub struct LifecycleController {
    cache: CacheDb,
    network: Arc<dyn Network>,
    clients: Arc<ClientRegistry>,
    origin: Url,
    precache: Vec<String>,
    static_partition: String,
    dynamic_partition: String,
    state: Mutex<WorkerState>,
}

impl LifecycleController {
    pub fn new(
        cache: CacheDb, config: &AppConfig, network: Arc<dyn Network>, clients: Arc<ClientRegistry>,
    ) -> Result<Self, Error> {
        let origin = Url::parse(&config.origin).map_err(|e| Error::InvalidUrl(e.to_string()))?;

        Ok(Self {
            cache,
            network,
            clients,
            origin,
            precache: config.precache.clone(),
            static_partition: config.static_partition(),
            dynamic_partition: config.dynamic_partition(),
            state: Mutex::new(WorkerState::New),
        })
    }

    pub async fn state(&self) -> WorkerState {
        *self.state.lock().await
    }

    async fn transition(&self, to: WorkerState) -> Result<(), Error> {
        let mut state = self.state.lock().await;
        if !is_valid_transition(*state, to) {
            return Err(Error::InvalidTransition { from: state.to_string(), to: to.to_string() });
        }
        tracing::debug!(from = %state, to = %to, "lifecycle transition");
        *state = to;
        Ok(())
    }

    /// Seed the static partition from the precache manifest.
    ///
    /// All-or-nothing: every manifest entry is fetched before anything is
    /// written, so a failed install never leaves a partially seeded
    /// partition. On success the version is `installed` and ready to
    /// supersede the active one without waiting for clients to close.
    pub async fn install(&self) -> Result<(), Error> {
        self.transition(WorkerState::Installing).await?;

        match self.seed_static_partition().await {
            Ok(count) => {
                tracing::info!(partition = %self.static_partition, entries = count, "install complete");
                self.transition(WorkerState::Installed).await
            }
            Err(e) => {
                tracing::error!(error = %e, "install failed; previous version stays in control");
                self.transition(WorkerState::Redundant).await?;
                Err(e)
            }
        }
    }

    async fn seed_static_partition(&self) -> Result<usize, Error> {
        let mut staged = Vec::with_capacity(self.precache.len());

        for path in &self.precache {
            let url = self
                .origin
                .join(path)
                .map_err(|e| Error::InvalidUrl(format!("{path}: {e}")))?;
            let request = InterceptedRequest::get(url.clone());

            let response = self
                .network
                .retrieve(&request)
                .await
                .map_err(|e| Error::InstallFailed(format!("{path}: {e}")))?;

            if !response.is_success() {
                return Err(Error::InstallFailed(format!("{path}: status {}", response.status)));
            }

            staged.push(StoredResponse::new(
                "GET",
                url.as_str(),
                response.status,
                response.headers,
                response.body.to_vec(),
            ));
        }

        self.cache.open_partition(&self.static_partition).await?;
        for entry in &staged {
            self.cache.put_entry(&self.static_partition, entry).await?;
        }

        Ok(staged.len())
    }

    /// Evict partitions from other versions and take control of clients.
    pub async fn activate(&self) -> Result<(), Error> {
        self.transition(WorkerState::Activating).await?;

        match self.evict_stale_partitions().await {
            Ok(()) => {
                self.clients.claim_all().await;
                self.transition(WorkerState::Active).await?;
                tracing::info!(
                    static_partition = %self.static_partition,
                    dynamic_partition = %self.dynamic_partition,
                    "worker active"
                );
                Ok(())
            }
            Err(e) => {
                tracing::error!(error = %e, "activation failed");
                self.transition(WorkerState::Redundant).await?;
                Err(e)
            }
        }
    }

    async fn evict_stale_partitions(&self) -> Result<(), Error> {
        for name in self.cache.list_partitions().await? {
            if name != self.static_partition && name != self.dynamic_partition {
                self.cache.delete_partition(&name).await?;
                tracing::info!(partition = %name, "evicted stale partition");
            }
        }

        // The dynamic partition fills lazily, but its row must exist before
        // the first fire-and-forget store runs.
        self.cache.open_partition(&self.static_partition).await?;
        self.cache.open_partition(&self.dynamic_partition).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::NetworkResponse;
    use async_trait::async_trait;
    use bytes::Bytes;
    use std::collections::HashMap;

    /// Serves fixed bodies per path; 404 for anything else.
    struct FixtureNetwork {
        routes: HashMap<String, Vec<u8>>,
    }

    impl FixtureNetwork {
        fn with_paths(paths: &[&str]) -> Self {
            let routes = paths
                .iter()
                .map(|p| (p.to_string(), format!("body of {p}").into_bytes()))
                .collect();
            Self { routes }
        }
    }

    #[async_trait]
    impl Network for FixtureNetwork {
        async fn retrieve(&self, request: &InterceptedRequest) -> Result<NetworkResponse, Error> {
            let path = request.url.path().to_string();
            let (status, body) = match self.routes.get(&path) {
                Some(body) => (200, body.clone()),
                None => (404, Vec::new()),
            };
            Ok(NetworkResponse {
                status,
                headers: vec![("content-type".into(), "text/html".into())],
                body: Bytes::from(body),
                redirected: false,
                same_origin: true,
                final_url: request.url.clone(),
            })
        }
    }

    /// Always fails at the transport level.
    struct OfflineNetwork;

    #[async_trait]
    impl Network for OfflineNetwork {
        async fn retrieve(&self, _request: &InterceptedRequest) -> Result<NetworkResponse, Error> {
            Err(Error::FetchFailed("connection refused".into()))
        }
    }

    fn config_with_manifest(paths: &[&str]) -> AppConfig {
        AppConfig { precache: paths.iter().map(|p| p.to_string()).collect(), ..Default::default() }
    }

    async fn make_controller(cache: CacheDb, config: &AppConfig, network: Arc<dyn Network>) -> LifecycleController {
        LifecycleController::new(cache, config, network, Arc::new(ClientRegistry::new())).unwrap()
    }

    #[tokio::test]
    async fn test_install_seeds_every_manifest_entry() {
        let cache = CacheDb::open_in_memory().await.unwrap();
        let manifest = ["/", "/index.html", "/manifest.json"];
        let config = config_with_manifest(&manifest);
        let network = Arc::new(FixtureNetwork::with_paths(&manifest));
        let controller = make_controller(cache.clone(), &config, network).await;

        controller.install().await.unwrap();

        assert_eq!(controller.state().await, WorkerState::Installed);
        assert_eq!(cache.entry_count(&config.static_partition()).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_install_is_all_or_nothing() {
        let cache = CacheDb::open_in_memory().await.unwrap();
        let config = config_with_manifest(&["/", "/missing.html"]);
        // Only "/" resolves; "/missing.html" comes back 404.
        let network = Arc::new(FixtureNetwork::with_paths(&["/"]));
        let controller = make_controller(cache.clone(), &config, network).await;

        let result = controller.install().await;
        assert!(matches!(result, Err(Error::InstallFailed(_))));
        assert_eq!(controller.state().await, WorkerState::Redundant);
        assert_eq!(cache.entry_count(&config.static_partition()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_install_fails_offline() {
        let cache = CacheDb::open_in_memory().await.unwrap();
        let config = config_with_manifest(&["/"]);
        let controller = make_controller(cache, &config, Arc::new(OfflineNetwork)).await;

        assert!(controller.install().await.is_err());
        assert_eq!(controller.state().await, WorkerState::Redundant);
    }

    #[tokio::test]
    async fn test_install_idempotent_contents() {
        let cache = CacheDb::open_in_memory().await.unwrap();
        let manifest = ["/", "/index.html"];
        let config = config_with_manifest(&manifest);
        let network: Arc<dyn Network> = Arc::new(FixtureNetwork::with_paths(&manifest));

        let first = make_controller(cache.clone(), &config, network.clone()).await;
        first.install().await.unwrap();

        // A fresh controller for the same version re-runs install against
        // the already-seeded partition.
        let second = make_controller(cache.clone(), &config, network).await;
        second.install().await.unwrap();

        assert_eq!(cache.entry_count(&config.static_partition()).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_activate_evicts_old_versions() {
        let cache = CacheDb::open_in_memory().await.unwrap();
        cache.open_partition("haven-static-v1").await.unwrap();
        cache.open_partition("haven-dynamic-v1").await.unwrap();

        let manifest = ["/"];
        let config = AppConfig { version: "2".into(), ..config_with_manifest(&manifest) };
        let network = Arc::new(FixtureNetwork::with_paths(&manifest));
        let controller = make_controller(cache.clone(), &config, network).await;

        controller.install().await.unwrap();
        controller.activate().await.unwrap();

        assert_eq!(controller.state().await, WorkerState::Active);
        let names = cache.list_partitions().await.unwrap();
        assert_eq!(names, vec!["haven-dynamic-v2".to_string(), "haven-static-v2".to_string()]);
    }

    #[tokio::test]
    async fn test_activate_with_no_prior_versions_deletes_nothing() {
        let cache = CacheDb::open_in_memory().await.unwrap();
        let manifest = ["/", "/index.html", "/manifest.json"];
        let config = config_with_manifest(&manifest);
        let network = Arc::new(FixtureNetwork::with_paths(&manifest));
        let controller = make_controller(cache.clone(), &config, network).await;

        controller.install().await.unwrap();
        controller.activate().await.unwrap();

        assert_eq!(cache.entry_count(&config.static_partition()).await.unwrap(), 3);
        let names = cache.list_partitions().await.unwrap();
        assert!(names.contains(&config.static_partition()));
        assert!(names.contains(&config.dynamic_partition()));
    }

    #[tokio::test]
    async fn test_cannot_activate_without_install() {
        let cache = CacheDb::open_in_memory().await.unwrap();
        let config = config_with_manifest(&["/"]);
        let controller = make_controller(cache, &config, Arc::new(OfflineNetwork)).await;

        let result = controller.activate().await;
        assert!(matches!(result, Err(Error::InvalidTransition { .. })));
    }

    #[tokio::test]
    async fn test_redundant_is_terminal_for_install() {
        let cache = CacheDb::open_in_memory().await.unwrap();
        let config = config_with_manifest(&["/"]);
        let controller = make_controller(cache, &config, Arc::new(OfflineNetwork)).await;

        assert!(controller.install().await.is_err());
        let result = controller.install().await;
        assert!(matches!(result, Err(Error::InvalidTransition { .. })));
    }

    #[test]
    fn test_valid_transitions() {
        use WorkerState::*;
        assert!(is_valid_transition(New, Installing));
        assert!(is_valid_transition(Installing, Installed));
        assert!(is_valid_transition(Installing, Redundant));
        assert!(is_valid_transition(Installed, Activating));
        assert!(is_valid_transition(Activating, Active));
        assert!(is_valid_transition(Active, Redundant));
    }

    #[test]
    fn test_invalid_transitions() {
        use WorkerState::*;
        assert!(!is_valid_transition(New, Active));
        assert!(!is_valid_transition(Installing, Activating));
        assert!(!is_valid_transition(Redundant, Installing));
        assert!(!is_valid_transition(Active, Installing));
    }

    #[test]
    fn test_only_active_intercepts() {
        assert!(WorkerState::Active.can_intercept());
        assert!(!WorkerState::Installed.can_intercept());
        assert!(!WorkerState::Redundant.can_intercept());
    }
}
