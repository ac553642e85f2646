//! HTTP request handlers

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{ConnectInfo, Path, Query, State},
    http::{Extensions, HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use openapi_client::models::RepoSummary;
use openapi_server::models::{
    DeployEnvironmentResponse, HealthResponse, JobResponse, LoginRequest, LoginResponse,
    LogsResponse, VersionResponse, WebhookResponse,
};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{info, warn};
use uuid::Uuid;

use crate::errors::ControlError;
use crate::models::{Deployment, Domain, Environment, NewService, Service, ServiceUpdate};
use crate::platform::domains::NewDomain;
use crate::platform::projects::ProjectDetail;
use crate::platform::CreatedService;
use crate::server::state::ServerState;
use crate::store::StoreExt;
use crate::utils::{bounded, version_info};

type ApiResult<T> = Result<Json<T>, ControlError>;

/// Health check handler
pub async fn health_handler() -> impl IntoResponse {
    let version = version_info();
    Json(HealthResponse {
        status: "healthy".to_string(),
        service: "shipyard".to_string(),
        version: version.version,
    })
}

/// Version handler
pub async fn version_handler() -> impl IntoResponse {
    let version = version_info();
    Json(VersionResponse {
        version: version.version,
        git_hash: version.git_hash,
        build_time: version.build_time,
    })
}

/// Source-control webhook; the body is verified before it is parsed
pub async fn webhook_handler(
    State(state): State<Arc<ServerState>>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<WebhookResponse> {
    let response = state.webhooks.handle(&headers, &body).await?;
    info!("Webhook handled: {}", response.message);
    Ok(Json(response))
}

pub async fn repositories_handler(State(state): State<Arc<ServerState>>) -> ApiResult<Vec<RepoSummary>> {
    let timeout = state.platform.deployments.timeouts().scm();
    let repos = bounded("repository listing", timeout, state.scm.list_repositories()).await?;
    Ok(Json(repos))
}

#[derive(Debug, Deserialize)]
pub struct FileQuery {
    pub path: Option<String>,
    #[serde(rename = "ref")]
    pub git_ref: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct FileContents {
    pub path: String,
    pub content: String,
}

/// A file from a repository, the Dockerfile at `main` unless asked otherwise
pub async fn repository_file_handler(
    State(state): State<Arc<ServerState>>,
    Path((owner, name)): Path<(String, String)>,
    Query(query): Query<FileQuery>,
) -> ApiResult<FileContents> {
    let repo = format!("{}/{}", owner, name);
    let path = query.path.unwrap_or_else(|| "Dockerfile".to_string());
    let git_ref = query.git_ref.unwrap_or_else(|| "main".to_string());
    let timeout = state.platform.deployments.timeouts().scm();
    let content = bounded("repository file", timeout, state.scm.fetch_file(&repo, &path, &git_ref)).await?;
    Ok(Json(FileContents { path, content }))
}

// ================================== AUTH ====================================== //

fn client_ip(extensions: &Extensions) -> IpAddr {
    extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|info| info.0.ip())
        .unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST))
}

pub async fn login_handler(
    State(state): State<Arc<ServerState>>,
    extensions: Extensions,
    Json(request): Json<LoginRequest>,
) -> ApiResult<LoginResponse> {
    let ip = client_ip(&extensions);
    if state.platform.guard.is_demo() {
        state.login_limiter.check(ip)?;
    }

    let expected = state
        .admin_password
        .as_ref()
        .ok_or_else(|| ControlError::ServiceUnavailable("Login is not configured".to_string()))?;

    let matches = Sha256::digest(request.password.as_bytes())
        == Sha256::digest(expected.expose_secret().as_bytes());
    if !matches {
        warn!("Failed login attempt from {}", ip);
        return Err(ControlError::Unauthorized("Invalid password".to_string()));
    }
    Ok(Json(LoginResponse { success: true }))
}

// ================================ PROJECTS ==================================== //

#[derive(Debug, Deserialize)]
pub struct NameRequest {
    pub name: String,
}

pub async fn create_project_handler(
    State(state): State<Arc<ServerState>>,
    Json(request): Json<NameRequest>,
) -> Result<(StatusCode, Json<ProjectDetail>), ControlError> {
    let project = state.platform.create_project(&request.name).await?;
    Ok((StatusCode::CREATED, Json(project)))
}

pub async fn get_project_handler(
    State(state): State<Arc<ServerState>>,
    Path(id): Path<Uuid>,
) -> ApiResult<ProjectDetail> {
    Ok(Json(state.platform.get_project(id).await?))
}

// ============================== ENVIRONMENTS ================================== //

pub async fn create_environment_handler(
    State(state): State<Arc<ServerState>>,
    Path(project_id): Path<Uuid>,
    Json(request): Json<NameRequest>,
) -> Result<(StatusCode, Json<Environment>), ControlError> {
    let env = state.platform.create_environment(project_id, &request.name).await?;
    Ok((StatusCode::CREATED, Json(env)))
}

pub async fn delete_environment_handler(
    State(state): State<Arc<ServerState>>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ControlError> {
    state.platform.delete_environment(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn deploy_environment_handler(
    State(state): State<Arc<ServerState>>,
    Path(id): Path<Uuid>,
) -> Result<(StatusCode, Json<DeployEnvironmentResponse>), ControlError> {
    let response = state.platform.deploy_environment(id).await?;
    Ok((StatusCode::ACCEPTED, Json(response)))
}

// ================================ SERVICES ==================================== //

#[derive(Debug, Deserialize)]
pub struct CreateServicesRequest {
    pub services: Vec<NewService>,
}

pub async fn create_services_handler(
    State(state): State<Arc<ServerState>>,
    Path(environment_id): Path<Uuid>,
    Json(request): Json<CreateServicesRequest>,
) -> Result<(StatusCode, Json<Vec<CreatedService>>), ControlError> {
    let created = state
        .platform
        .create_services(environment_id, request.services)
        .await?;
    Ok((StatusCode::CREATED, Json(created)))
}

pub async fn update_service_handler(
    State(state): State<Arc<ServerState>>,
    Path(id): Path<Uuid>,
    Json(update): Json<ServiceUpdate>,
) -> ApiResult<Service> {
    Ok(Json(state.platform.update_service(id, update).await?))
}

pub async fn delete_service_handler(
    State(state): State<Arc<ServerState>>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ControlError> {
    state.platform.delete_service(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobAccepted {
    pub job_id: Uuid,
}

pub async fn deploy_service_handler(
    State(state): State<Arc<ServerState>>,
    Path(id): Path<Uuid>,
) -> Result<(StatusCode, Json<JobAccepted>), ControlError> {
    let job_id = state.platform.deploy_service(id).await?;
    Ok((StatusCode::ACCEPTED, Json(JobAccepted { job_id })))
}

pub async fn list_deployments_handler(
    State(state): State<Arc<ServerState>>,
    Path(id): Path<Uuid>,
) -> ApiResult<Vec<Deployment>> {
    Ok(Json(state.platform.list_deployments(id).await?))
}

#[derive(Debug, Deserialize)]
pub struct LogsQuery {
    pub tail: Option<usize>,
    pub replica: Option<u32>,
}

pub async fn logs_handler(
    State(state): State<Arc<ServerState>>,
    Path(id): Path<Uuid>,
    Query(query): Query<LogsQuery>,
) -> ApiResult<LogsResponse> {
    let logs = state.logs.service_logs(id, query.tail, query.replica).await?;
    Ok(Json(LogsResponse {
        service_id: id,
        deployment_id: logs.deployment_id,
        replicas: logs.replicas,
        logs: logs.output,
    }))
}

// ================================= DOMAINS ==================================== //

pub async fn list_domains_handler(
    State(state): State<Arc<ServerState>>,
    Path(id): Path<Uuid>,
) -> ApiResult<Vec<Domain>> {
    Ok(Json(state.platform.list_domains(id).await?))
}

pub async fn add_domain_handler(
    State(state): State<Arc<ServerState>>,
    Path(id): Path<Uuid>,
    Json(request): Json<NewDomain>,
) -> Result<(StatusCode, Json<Domain>), ControlError> {
    let domain = state.platform.add_domain(id, request).await?;
    Ok((StatusCode::CREATED, Json(domain)))
}

pub async fn verify_domain_handler(
    State(state): State<Arc<ServerState>>,
    Path(id): Path<Uuid>,
) -> ApiResult<Domain> {
    Ok(Json(state.platform.verify_domain(id).await?))
}

pub async fn delete_domain_handler(
    State(state): State<Arc<ServerState>>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ControlError> {
    state.platform.delete_domain(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// =============================== DEPLOYMENTS ================================== //

pub async fn get_deployment_handler(
    State(state): State<Arc<ServerState>>,
    Path(id): Path<Uuid>,
) -> ApiResult<Deployment> {
    Ok(Json(state.platform.store.deployment(id).await?))
}

pub async fn stop_deployment_handler(
    State(state): State<Arc<ServerState>>,
    Path(id): Path<Uuid>,
) -> ApiResult<Deployment> {
    Ok(Json(state.platform.deployments.stop(id).await?))
}

pub async fn rollback_handler(
    State(state): State<Arc<ServerState>>,
    Path(id): Path<Uuid>,
) -> Result<(StatusCode, Json<Deployment>), ControlError> {
    let deployment = state.platform.rollback(id).await?;
    Ok((StatusCode::CREATED, Json(deployment)))
}

pub async fn job_handler(
    State(state): State<Arc<ServerState>>,
    Path(id): Path<Uuid>,
) -> ApiResult<JobResponse> {
    Ok(Json(state.platform.queue.status(id).await?))
}
