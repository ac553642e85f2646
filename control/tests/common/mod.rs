//! Fakes and fixtures shared by the integration tests

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, Response};
use axum::Router;
use chrono::{DateTime, Utc};
use openapi_client::models::RepoSummary;
use secrecy::SecretString;
use serde_json::Value;
use tokio::sync::Notify;
use tower::ServiceExt;
use uuid::Uuid;

use shipyard::app::state::{AppState, Collaborators};
use shipyard::deploy::queue::{self, DeployWorker};
use shipyard::deploy::runtime::{BuildSpec, RunSpec, RunningContainer};
use shipyard::deploy::{ContainerRuntime, SourceFetcher};
use shipyard::errors::ControlError;
use shipyard::models::{
    Deployment, DeploymentUpdate, Domain, Environment, EnvironmentUpdate, NewService, Project,
    Replica, ReplicaStatus, Service, ServiceUpdate,
};
use shipyard::proxy::{ProxyConfig, ProxyReconciler};
use shipyard::scm::SourceControl;
use shipyard::server::serve::router;
use shipyard::storage::settings::Settings;
use shipyard::store::{MemoryStore, Store};
use shipyard::webhook::signature;

pub const WEBHOOK_SECRET: &str = "test-secret";
pub const ADMIN_PASSWORD: &str = "hunter2";
pub const REPO_URL: &str = "https://github.com/acme/shop.git";

// ================================ RUNTIME ===================================== //

#[derive(Default)]
struct RuntimeState {
    next: u16,
    images: HashSet<String>,
    running: HashMap<String, String>,
    logs: HashMap<String, String>,
    started: Vec<RunSpec>,
    stopped: Vec<String>,
    builds: usize,
    gate: Option<BuildGate>,
    fail_build: bool,
    fail_build_for: HashSet<Uuid>,
    fail_tag: bool,
    fail_logs: bool,
}

/// Parks the next build until released
#[derive(Clone, Default)]
pub struct BuildGate {
    pub entered: Arc<Notify>,
    pub release: Arc<Notify>,
}

/// In-memory container runtime
#[derive(Default)]
pub struct FakeRuntime {
    state: Mutex<RuntimeState>,
}

impl FakeRuntime {
    pub fn fail_builds(&self, fail: bool) {
        self.state.lock().unwrap().fail_build = fail;
    }

    /// Fail builds of one service only
    pub fn fail_builds_for(&self, service_id: Uuid) {
        self.state.lock().unwrap().fail_build_for.insert(service_id);
    }

    pub fn hold_next_build(&self) -> BuildGate {
        let gate = BuildGate::default();
        self.state.lock().unwrap().gate = Some(gate.clone());
        gate
    }

    pub fn fail_tags(&self, fail: bool) {
        self.state.lock().unwrap().fail_tag = fail;
    }

    pub fn fail_logs(&self, fail: bool) {
        self.state.lock().unwrap().fail_logs = fail;
    }

    pub fn set_logs(&self, container_id: &str, output: &str) {
        self.state
            .lock()
            .unwrap()
            .logs
            .insert(container_id.to_string(), output.to_string());
    }

    pub fn evict(&self, image: &str) {
        self.state.lock().unwrap().images.remove(image);
    }

    pub fn builds(&self) -> usize {
        self.state.lock().unwrap().builds
    }

    pub fn started(&self) -> Vec<RunSpec> {
        self.state.lock().unwrap().started.clone()
    }

    pub fn stopped(&self) -> Vec<String> {
        self.state.lock().unwrap().stopped.clone()
    }

    pub fn running(&self) -> usize {
        self.state.lock().unwrap().running.len()
    }
}

#[async_trait]
impl ContainerRuntime for FakeRuntime {
    async fn build(&self, spec: &BuildSpec) -> Result<String, ControlError> {
        let gate = {
            let mut state = self.state.lock().unwrap();
            state.builds += 1;
            state.gate.take()
        };
        if let Some(gate) = gate {
            gate.entered.notify_one();
            gate.release.notified().await;
        }

        let mut state = self.state.lock().unwrap();
        let targeted = state
            .fail_build_for
            .iter()
            .any(|id| spec.tag.contains(&id.to_string()));
        if state.fail_build || targeted {
            return Err(ControlError::DeployError("build exited with status 1".to_string()));
        }
        state.images.insert(spec.tag.clone());
        Ok(spec.tag.clone())
    }

    async fn pull(&self, image: &str) -> Result<String, ControlError> {
        self.state.lock().unwrap().images.insert(image.to_string());
        Ok(image.to_string())
    }

    async fn tag(&self, _source: &str, target: &str) -> Result<(), ControlError> {
        let mut state = self.state.lock().unwrap();
        if state.fail_tag {
            return Err(ControlError::DeployError("tag failed".to_string()));
        }
        state.images.insert(target.to_string());
        Ok(())
    }

    async fn run(&self, image: &str, spec: &RunSpec) -> Result<RunningContainer, ControlError> {
        let mut state = self.state.lock().unwrap();
        state.next += 1;
        let container_id = format!("ctr-{}", state.next);
        state.running.insert(container_id.clone(), image.to_string());
        state.started.push(spec.clone());
        Ok(RunningContainer {
            container_id,
            host_port: Some(40000 + state.next),
        })
    }

    async fn stop(&self, container_id: &str) -> Result<(), ControlError> {
        let mut state = self.state.lock().unwrap();
        state.running.remove(container_id);
        state.stopped.push(container_id.to_string());
        Ok(())
    }

    async fn logs(&self, container_id: &str, _tail: usize) -> Result<String, ControlError> {
        let state = self.state.lock().unwrap();
        if state.fail_logs {
            return Err(ControlError::Internal("daemon unreachable".to_string()));
        }
        Ok(state.logs.get(container_id).cloned().unwrap_or_default())
    }

    async fn image_exists(&self, image: &str) -> Result<bool, ControlError> {
        Ok(self.state.lock().unwrap().images.contains(image))
    }
}

/// Source fetcher that checks out whatever commit it is asked for
#[derive(Default)]
pub struct FakeSource {
    checkouts: Mutex<Vec<(String, String, Option<String>)>>,
}

impl FakeSource {
    pub fn checkouts(&self) -> Vec<(String, String, Option<String>)> {
        self.checkouts.lock().unwrap().clone()
    }
}

#[async_trait]
impl SourceFetcher for FakeSource {
    async fn checkout(
        &self,
        repo_url: &str,
        branch: &str,
        commit: Option<&str>,
        _target_dir: &Path,
    ) -> Result<String, ControlError> {
        self.checkouts.lock().unwrap().push((
            repo_url.to_string(),
            branch.to_string(),
            commit.map(str::to_string),
        ));
        Ok(commit.unwrap_or("0000000000000000000000000000000000000000").to_string())
    }
}

// ================================== SCM ======================================= //

/// Records comment traffic
#[derive(Default)]
pub struct FakeScm {
    secret: Option<String>,
    fail_comments: Mutex<bool>,
    next_id: Mutex<u64>,
    pub created: Mutex<Vec<(String, u64, String)>>,
    pub updated: Mutex<Vec<(u64, String)>>,
}

impl FakeScm {
    pub fn new(secret: Option<&str>) -> Self {
        Self {
            secret: secret.map(str::to_string),
            next_id: Mutex::new(1000),
            ..Default::default()
        }
    }

    pub fn fail_comments(&self, fail: bool) {
        *self.fail_comments.lock().unwrap() = fail;
    }

    pub fn created(&self) -> Vec<(String, u64, String)> {
        self.created.lock().unwrap().clone()
    }

    pub fn updated(&self) -> Vec<(u64, String)> {
        self.updated.lock().unwrap().clone()
    }
}

#[async_trait]
impl SourceControl for FakeScm {
    fn webhook_secret(&self) -> Option<SecretString> {
        self.secret.clone().map(SecretString::from)
    }

    async fn list_repositories(&self) -> Result<Vec<RepoSummary>, ControlError> {
        Ok(vec![RepoSummary {
            id: 1,
            full_name: "acme/shop".to_string(),
            clone_url: REPO_URL.to_string(),
            default_branch: "main".to_string(),
            private: false,
        }])
    }

    async fn fetch_file(&self, _repo: &str, _path: &str, _git_ref: &str) -> Result<String, ControlError> {
        Ok("FROM nginx\n".to_string())
    }

    async fn create_comment(&self, repo: &str, issue: u64, body: &str) -> Result<u64, ControlError> {
        if *self.fail_comments.lock().unwrap() {
            return Err(ControlError::Internal("GitHub comment create failed: 502".to_string()));
        }
        let mut next = self.next_id.lock().unwrap();
        *next += 1;
        self.created
            .lock()
            .unwrap()
            .push((repo.to_string(), issue, body.to_string()));
        Ok(*next)
    }

    async fn update_comment(&self, _repo: &str, comment_id: u64, body: &str) -> Result<(), ControlError> {
        if *self.fail_comments.lock().unwrap() {
            return Err(ControlError::Internal("GitHub comment update failed: 502".to_string()));
        }
        self.updated
            .lock()
            .unwrap()
            .push((comment_id, body.to_string()));
        Ok(())
    }
}

/// Keeps every config it was asked to load
#[derive(Default)]
pub struct RecordingProxy {
    configs: Mutex<Vec<ProxyConfig>>,
}

impl RecordingProxy {
    pub fn last(&self) -> Option<ProxyConfig> {
        self.configs.lock().unwrap().last().cloned()
    }

    pub fn count(&self) -> usize {
        self.configs.lock().unwrap().len()
    }
}

#[async_trait]
impl ProxyReconciler for RecordingProxy {
    async fn reconcile(&self, config: &ProxyConfig) -> Result<(), ControlError> {
        self.configs.lock().unwrap().push(config.clone());
        Ok(())
    }
}

// ================================= STORE ====================================== //

/// Memory store that can be told to fail deployment listings
#[derive(Default)]
pub struct FlakyStore {
    inner: MemoryStore,
    fail_list_deployments: Mutex<bool>,
}

impl FlakyStore {
    pub fn fail_list_deployments(&self, fail: bool) {
        *self.fail_list_deployments.lock().unwrap() = fail;
    }
}

#[async_trait]
impl Store for FlakyStore {
    async fn insert_project(&self, project: Project) -> Result<Project, ControlError> {
        self.inner.insert_project(project).await
    }

    async fn get_project(&self, id: Uuid) -> Result<Option<Project>, ControlError> {
        self.inner.get_project(id).await
    }

    async fn count_projects(&self) -> Result<usize, ControlError> {
        self.inner.count_projects().await
    }

    async fn insert_environment(&self, env: Environment) -> Result<Environment, ControlError> {
        self.inner.insert_environment(env).await
    }

    async fn get_environment(&self, id: Uuid) -> Result<Option<Environment>, ControlError> {
        self.inner.get_environment(id).await
    }

    async fn update_environment(&self, id: Uuid, update: EnvironmentUpdate) -> Result<Environment, ControlError> {
        self.inner.update_environment(id, update).await
    }

    async fn delete_environment(&self, id: Uuid) -> Result<(), ControlError> {
        self.inner.delete_environment(id).await
    }

    async fn list_environments(&self, project_id: Uuid) -> Result<Vec<Environment>, ControlError> {
        self.inner.list_environments(project_id).await
    }

    async fn count_environments(&self, project_id: Uuid) -> Result<usize, ControlError> {
        self.inner.count_environments(project_id).await
    }

    async fn find_preview(&self, project_id: Uuid, pr_number: u64) -> Result<Option<Environment>, ControlError> {
        self.inner.find_preview(project_id, pr_number).await
    }

    async fn insert_service(&self, service: Service) -> Result<Service, ControlError> {
        self.inner.insert_service(service).await
    }

    async fn get_service(&self, id: Uuid) -> Result<Option<Service>, ControlError> {
        self.inner.get_service(id).await
    }

    async fn update_service(&self, id: Uuid, update: ServiceUpdate) -> Result<Service, ControlError> {
        self.inner.update_service(id, update).await
    }

    async fn delete_service(&self, id: Uuid) -> Result<(), ControlError> {
        self.inner.delete_service(id).await
    }

    async fn list_services(&self, environment_id: Uuid) -> Result<Vec<Service>, ControlError> {
        self.inner.list_services(environment_id).await
    }

    async fn list_all_services(&self) -> Result<Vec<Service>, ControlError> {
        self.inner.list_all_services().await
    }

    async fn count_services(&self, environment_id: Uuid) -> Result<usize, ControlError> {
        self.inner.count_services(environment_id).await
    }

    async fn insert_deployment(&self, deployment: Deployment) -> Result<Deployment, ControlError> {
        self.inner.insert_deployment(deployment).await
    }

    async fn get_deployment(&self, id: Uuid) -> Result<Option<Deployment>, ControlError> {
        self.inner.get_deployment(id).await
    }

    async fn update_deployment(&self, id: Uuid, update: DeploymentUpdate) -> Result<Deployment, ControlError> {
        self.inner.update_deployment(id, update).await
    }

    async fn update_in_flight_deployment(
        &self,
        id: Uuid,
        update: DeploymentUpdate,
    ) -> Result<Option<Deployment>, ControlError> {
        self.inner.update_in_flight_deployment(id, update).await
    }

    async fn list_deployments(&self, service_id: Uuid) -> Result<Vec<Deployment>, ControlError> {
        if *self.fail_list_deployments.lock().unwrap() {
            return Err(ControlError::Internal("deployments table unavailable".to_string()));
        }
        self.inner.list_deployments(service_id).await
    }

    async fn find_deployment_by_commit(
        &self,
        service_id: Uuid,
        commit_sha: &str,
    ) -> Result<Option<Deployment>, ControlError> {
        self.inner.find_deployment_by_commit(service_id, commit_sha).await
    }

    async fn count_deployments_since(&self, service_id: Uuid, since: DateTime<Utc>) -> Result<usize, ControlError> {
        self.inner.count_deployments_since(service_id, since).await
    }

    async fn delete_deployments(&self, service_id: Uuid) -> Result<(), ControlError> {
        self.inner.delete_deployments(service_id).await
    }

    async fn insert_replica(&self, replica: Replica) -> Result<Replica, ControlError> {
        self.inner.insert_replica(replica).await
    }

    async fn list_replicas(&self, deployment_id: Uuid) -> Result<Vec<Replica>, ControlError> {
        self.inner.list_replicas(deployment_id).await
    }

    async fn set_replica_status(&self, id: Uuid, status: ReplicaStatus) -> Result<(), ControlError> {
        self.inner.set_replica_status(id, status).await
    }

    async fn insert_domain(&self, domain: Domain) -> Result<Domain, ControlError> {
        self.inner.insert_domain(domain).await
    }

    async fn get_domain(&self, id: Uuid) -> Result<Option<Domain>, ControlError> {
        self.inner.get_domain(id).await
    }

    async fn set_domain_verified(&self, id: Uuid, verified: bool) -> Result<Domain, ControlError> {
        self.inner.set_domain_verified(id, verified).await
    }

    async fn delete_domain(&self, id: Uuid) -> Result<(), ControlError> {
        self.inner.delete_domain(id).await
    }

    async fn list_domains(&self, service_id: Uuid) -> Result<Vec<Domain>, ControlError> {
        self.inner.list_domains(service_id).await
    }

    async fn list_all_domains(&self) -> Result<Vec<Domain>, ControlError> {
        self.inner.list_all_domains().await
    }
}

// ================================ HARNESS ===================================== //

pub fn test_settings() -> Settings {
    let mut settings = Settings::default();
    settings.base_domain = "apps.test".to_string();
    settings.storage_dir = std::env::temp_dir().join(format!("shipyard-test-{}", Uuid::new_v4()));
    settings.admin_password = Some(SecretString::from(ADMIN_PASSWORD.to_string()));
    settings
}

pub struct Harness {
    pub app: AppState,
    pub router: Router,
    pub store: Arc<FlakyStore>,
    pub runtime: Arc<FakeRuntime>,
    pub source: Arc<FakeSource>,
    pub scm: Arc<FakeScm>,
    pub proxy: Arc<RecordingProxy>,
    worker: Option<DeployWorker>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_settings(test_settings(), Some(WEBHOOK_SECRET))
    }

    pub fn with_settings(settings: Settings, secret: Option<&str>) -> Self {
        let store = Arc::new(FlakyStore::default());
        let runtime = Arc::new(FakeRuntime::default());
        let source = Arc::new(FakeSource::default());
        let scm = Arc::new(FakeScm::new(secret));
        let proxy = Arc::new(RecordingProxy::default());

        let collaborators = Collaborators {
            store: store.clone(),
            runtime: runtime.clone(),
            source: source.clone(),
            scm: scm.clone(),
            proxy: proxy.clone(),
        };
        let (app, worker) = AppState::init(&settings, collaborators, &queue::Options::default());
        let router = router(app.server.clone());

        Self {
            app,
            router,
            store,
            runtime,
            source,
            scm,
            proxy,
            worker: Some(worker),
        }
    }

    /// Drive queued jobs in the background for the rest of the test
    pub fn spawn_worker(&mut self) {
        if let Some(worker) = self.worker.take() {
            let deployments = self.app.deployments.clone();
            tokio::spawn(queue::run(worker, deployments, Box::pin(std::future::pending::<()>())));
        }
    }

    pub async fn send(&self, request: Request<Body>) -> Response<Body> {
        self.router.clone().oneshot(request).await.unwrap()
    }

    /// Deliver a signed webhook
    pub async fn webhook(&self, event: &str, payload: &Value) -> (u16, Value) {
        let body = serde_json::to_vec(payload).unwrap();
        let signature = format!("sha256={}", signature::sign(WEBHOOK_SECRET.as_bytes(), &body));
        let request = Request::post("/webhooks/source-control")
            .header("content-type", "application/json")
            .header("x-github-event", event)
            .header("x-hub-signature-256", signature)
            .body(Body::from(body))
            .unwrap();
        let response = self.send(request).await;
        let status = response.status().as_u16();
        (status, json_body(response).await)
    }

    /// Project with one auto-deploying repo service in production
    pub async fn seed_repo_project(&self, name: &str) -> (Project, Environment, Service) {
        let detail = self.app.platform.create_project(name).await.unwrap();
        let production = detail.environments[0].clone();
        let service = self
            .app
            .platform
            .create_services(production.id, vec![repo_service("api")])
            .await
            .unwrap()
            .remove(0)
            .service;
        (detail.project, production, service)
    }
}

pub fn repo_service(name: &str) -> NewService {
    serde_json::from_value(serde_json::json!({
        "name": name,
        "deployType": "repo",
        "repoUrl": REPO_URL,
        "containerPort": 8080,
    }))
    .unwrap()
}

pub fn image_service(name: &str) -> NewService {
    serde_json::from_value(serde_json::json!({
        "name": name,
        "deployType": "image",
        "imageUrl": "nginx:1.27",
        "containerPort": 80,
        "autoDeploy": false,
    }))
    .unwrap()
}

pub async fn json_body(response: Response<Body>) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    if bytes.is_empty() {
        return Value::Null;
    }
    serde_json::from_slice(&bytes).unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
}

pub fn push_payload(git_ref: &str, after: &str) -> Value {
    serde_json::json!({
        "ref": git_ref,
        "after": after,
        "head_commit": { "id": after, "message": "Ship it" },
        "repository": {
            "full_name": "acme/shop",
            "clone_url": REPO_URL,
            "default_branch": "main",
        },
    })
}

pub fn pr_payload(action: &str, number: u64, title: &str, head_sha: &str) -> Value {
    serde_json::json!({
        "action": action,
        "number": number,
        "pull_request": {
            "number": number,
            "title": title,
            "head": { "ref": "feature/login", "sha": head_sha },
            "base": { "ref": "main", "sha": "base000" },
        },
        "repository": {
            "full_name": "acme/shop",
            "clone_url": REPO_URL,
            "default_branch": "main",
        },
    })
}
