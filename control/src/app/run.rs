//! Main application run loop

use std::future::Future;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::app::options::{AppOptions, LifecycleOptions};
use crate::app::state::{AppState, Collaborators};
use crate::deploy::queue;
use crate::errors::ControlError;
use crate::server::serve::serve;

/// Run the control plane until `shutdown_signal` resolves
pub async fn run(
    options: AppOptions,
    shutdown_signal: impl Future<Output = ()> + Send + 'static,
) -> Result<(), ControlError> {
    info!("Initializing Shipyard control plane...");

    // Create shutdown channel
    let (shutdown_tx, _shutdown_rx): (broadcast::Sender<()>, _) = broadcast::channel(1);
    let mut shutdown_manager = ShutdownManager::new(shutdown_tx.clone(), options.lifecycle.clone());

    if let Err(e) = init(&options, &shutdown_tx, &mut shutdown_manager).await {
        error!("Failed to start control plane: {}", e);
        shutdown_manager.shutdown().await?;
        return Err(e);
    }

    shutdown_signal.await;
    info!("Shutdown signal received, shutting down...");

    drop(shutdown_tx);
    shutdown_manager.shutdown().await
}

// =============================== INITIALIZATION ================================== //

async fn init(
    options: &AppOptions,
    shutdown_tx: &broadcast::Sender<()>,
    shutdown_manager: &mut ShutdownManager,
) -> Result<(), ControlError> {
    options.layout.setup().await?;
    tokio::fs::create_dir_all(&options.settings.storage_dir).await?;

    let collaborators = Collaborators::from_settings(&options.settings)?;
    let (app_state, worker) = AppState::init(&options.settings, collaborators, &options.queue);

    if options.settings.demo.enabled {
        info!("Demo mode enabled: quotas and rate limits are enforced");
    }

    info!("Initializing deploy worker...");
    let mut worker_rx = shutdown_tx.subscribe();
    let deployments = app_state.deployments.clone();
    let worker_handle = tokio::spawn(async move {
        queue::run(
            worker,
            deployments,
            Box::pin(async move {
                let _ = worker_rx.recv().await;
            }),
        )
        .await;
    });
    shutdown_manager.with_deploy_worker_handle(worker_handle)?;

    info!("Initializing HTTP server...");
    let mut server_rx = shutdown_tx.subscribe();
    let server_handle = serve(&options.settings.server, app_state.server.clone(), async move {
        let _ = server_rx.recv().await;
    })
    .await?;
    shutdown_manager.with_server_handle(server_handle)?;

    // Routes for anything already live
    app_state.platform.reconciler.sync_quietly().await;
    Ok(())
}

// ================================= SHUTDOWN ===================================== //

struct ShutdownManager {
    shutdown_tx: broadcast::Sender<()>,
    lifecycle_options: LifecycleOptions,
    server_handle: Option<JoinHandle<Result<(), ControlError>>>,
    deploy_worker_handle: Option<JoinHandle<()>>,
}

impl ShutdownManager {
    pub fn new(shutdown_tx: broadcast::Sender<()>, lifecycle_options: LifecycleOptions) -> Self {
        Self {
            shutdown_tx,
            lifecycle_options,
            server_handle: None,
            deploy_worker_handle: None,
        }
    }

    pub fn with_deploy_worker_handle(&mut self, handle: JoinHandle<()>) -> Result<(), ControlError> {
        if self.deploy_worker_handle.is_some() {
            return Err(ControlError::ShutdownError("deploy_worker_handle already set".to_string()));
        }
        self.deploy_worker_handle = Some(handle);
        Ok(())
    }

    pub fn with_server_handle(
        &mut self,
        handle: JoinHandle<Result<(), ControlError>>,
    ) -> Result<(), ControlError> {
        if self.server_handle.is_some() {
            return Err(ControlError::ShutdownError("server_handle already set".to_string()));
        }
        self.server_handle = Some(handle);
        Ok(())
    }

    pub async fn shutdown(&mut self) -> Result<(), ControlError> {
        let _ = self.shutdown_tx.send(());

        match tokio::time::timeout(
            self.lifecycle_options.max_shutdown_delay,
            self.shutdown_impl(),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => {
                error!(
                    "Shutdown timed out after {:?}, forcing shutdown...",
                    self.lifecycle_options.max_shutdown_delay
                );
                std::process::exit(1);
            }
        }
    }

    async fn shutdown_impl(&mut self) -> Result<(), ControlError> {
        info!("Shutting down Shipyard control plane...");

        // 1. Stop accepting requests
        if let Some(handle) = self.server_handle.take() {
            handle.await.map_err(|e| ControlError::ShutdownError(e.to_string()))??;
        }

        // 2. Let in-flight deploys finish
        if let Some(handle) = self.deploy_worker_handle.take() {
            handle.await.map_err(|e| ControlError::ShutdownError(e.to_string()))?;
        }

        info!("Shutdown complete");
        Ok(())
    }
}
