//! HTTP server setup

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::errors::ControlError;
use crate::server::handlers::*;
use crate::server::state::ServerState;
use crate::storage::settings::ServerSettings;

/// Build the router with every route
pub fn router(state: Arc<ServerState>) -> Router {
    Router::new()
        // Health and version
        .route("/health", get(health_handler))
        .route("/version", get(version_handler))
        // Source control
        .route("/webhooks/source-control", post(webhook_handler))
        .route("/repositories", get(repositories_handler))
        .route("/repositories/{owner}/{name}/file", get(repository_file_handler))
        // Auth
        .route("/auth/login", post(login_handler))
        // Projects and environments
        .route("/projects", post(create_project_handler))
        .route("/projects/{id}", get(get_project_handler))
        .route("/projects/{id}/environments", post(create_environment_handler))
        .route("/environments/{id}", axum::routing::delete(delete_environment_handler))
        .route("/environments/{id}/deploy", post(deploy_environment_handler))
        .route("/environments/{id}/services", post(create_services_handler))
        // Services
        .route(
            "/services/{id}",
            axum::routing::patch(update_service_handler).delete(delete_service_handler),
        )
        .route("/services/{id}/deploy", post(deploy_service_handler))
        .route("/services/{id}/deployments", get(list_deployments_handler))
        .route("/services/{id}/logs", get(logs_handler))
        .route(
            "/services/{id}/domains",
            get(list_domains_handler).post(add_domain_handler),
        )
        // Domains
        .route("/domains/{id}", axum::routing::delete(delete_domain_handler))
        .route("/domains/{id}/verify", post(verify_domain_handler))
        // Deployments and jobs
        .route("/deployments/{id}", get(get_deployment_handler))
        .route("/deployments/{id}/stop", post(stop_deployment_handler))
        .route("/deployments/{id}/rollback", post(rollback_handler))
        .route("/jobs/{id}", get(job_handler))
        // State and middleware
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// Start the HTTP server
pub async fn serve(
    options: &ServerSettings,
    state: Arc<ServerState>,
    shutdown_signal: impl Future<Output = ()> + Send + 'static,
) -> Result<JoinHandle<Result<(), ControlError>>, ControlError> {
    let app = router(state);

    let addr = format!("{}:{}", options.host, options.port);
    info!("Starting HTTP server on {}", addr);

    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|e| ControlError::ServerError(e.to_string()))?;

    let handle = tokio::spawn(async move {
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown_signal)
        .await
        .map_err(|e| ControlError::ServerError(e.to_string()))
    });

    Ok(handle)
}
