//! Application state management

use std::sync::Arc;

use tracing::info;

use crate::deploy::docker::DockerCli;
use crate::deploy::git::GitCli;
use crate::deploy::queue::{self, DeployQueue, DeployWorker};
use crate::deploy::{ContainerRuntime, DeploymentManager, LogAggregator, SourceFetcher};
use crate::errors::ControlError;
use crate::guard::{Guard, LoginRateLimiter};
use crate::platform::Platform;
use crate::preview::PreviewManager;
use crate::proxy::{CaddyAdmin, NoopProxy, ProxyReconciler, Reconciler};
use crate::scm::{GitHubClient, SourceControl};
use crate::server::state::ServerState;
use crate::storage::settings::Settings;
use crate::store::{MemoryStore, Store};
use crate::webhook::WebhookRouter;

/// External systems the control plane drives
pub struct Collaborators {
    pub store: Arc<dyn Store>,
    pub runtime: Arc<dyn ContainerRuntime>,
    pub source: Arc<dyn SourceFetcher>,
    pub scm: Arc<dyn SourceControl>,
    pub proxy: Arc<dyn ProxyReconciler>,
}

impl Collaborators {
    /// Production collaborators described by `settings`
    pub fn from_settings(settings: &Settings) -> Result<Self, ControlError> {
        let proxy: Arc<dyn ProxyReconciler> = match &settings.proxy.admin_url {
            Some(url) => Arc::new(CaddyAdmin::new(url)?),
            None => {
                info!("No proxy admin URL configured, proxy reconciliation disabled");
                Arc::new(NoopProxy)
            }
        };

        Ok(Self {
            store: Arc::new(MemoryStore::new()),
            runtime: Arc::new(DockerCli::new(settings.docker.binary.clone())),
            source: Arc::new(GitCli::new()),
            scm: Arc::new(GitHubClient::new(&settings.github, settings.timeouts.scm())?),
            proxy,
        })
    }
}

/// Main application state
pub struct AppState {
    pub platform: Arc<Platform>,
    pub deployments: Arc<DeploymentManager>,
    pub server: Arc<ServerState>,
}

impl AppState {
    /// Wire the components; the returned worker must be driven by [`queue::run`]
    pub fn init(
        settings: &Settings,
        collaborators: Collaborators,
        queue_options: &queue::Options,
    ) -> (Self, DeployWorker) {
        info!("Initializing application state...");
        let Collaborators {
            store,
            runtime,
            source,
            scm,
            proxy,
        } = collaborators;

        let reconciler = Arc::new(Reconciler::new(
            store.clone(),
            proxy,
            settings.proxy.tls,
            settings.timeouts.proxy(),
        ));
        let guard = Arc::new(Guard::new(settings.demo.clone(), store.clone()));

        let deployments = Arc::new(DeploymentManager::new(
            store.clone(),
            runtime.clone(),
            source,
            reconciler.clone(),
            settings.storage_dir.clone(),
            settings.docker.image_prefix.clone(),
            settings.timeouts.clone(),
        ));
        let (queue, worker) = DeployQueue::new(queue_options);

        let platform = Arc::new(Platform::new(
            store.clone(),
            guard,
            deployments.clone(),
            queue,
            reconciler,
            settings.base_domain.clone(),
            settings.proxy.tls,
        ));

        let previews = Arc::new(PreviewManager::new(
            platform.clone(),
            scm.clone(),
            settings.timeouts.scm(),
        ));
        let webhooks = Arc::new(WebhookRouter::new(platform.clone(), previews, scm.clone()));
        let logs = Arc::new(LogAggregator::new(store, runtime, settings.timeouts.run()));
        let login_limiter = Arc::new(LoginRateLimiter::new(
            settings.demo.login_attempts,
            settings.demo.login_window(),
        ));

        let server = Arc::new(ServerState::new(
            platform.clone(),
            webhooks,
            logs,
            scm,
            login_limiter,
            settings.admin_password.clone(),
        ));

        (
            Self {
                platform,
                deployments,
                server,
            },
            worker,
        )
    }
}
