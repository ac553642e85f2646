//! Container runtime and source fetch collaborators

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::errors::ControlError;
use crate::models::{Service, VolumeMount};

/// Image build input
#[derive(Debug, Clone)]
pub struct BuildSpec {
    /// Build context directory
    pub context_dir: PathBuf,
    /// Dockerfile path relative to the context
    pub dockerfile: String,
    pub tag: String,
}

/// Container start input
#[derive(Debug, Clone, Default)]
pub struct RunSpec {
    pub name: String,
    pub env: BTreeMap<String, String>,
    pub cpu_limit: Option<f64>,
    pub memory_limit_mb: Option<u64>,
    pub volumes: Vec<VolumeMount>,
    /// Port the process listens on inside the container
    pub container_port: Option<u16>,
    pub labels: BTreeMap<String, String>,
}

impl RunSpec {
    /// Runtime config for one replica of `service`
    pub fn for_service(service: &Service, name: String) -> Self {
        let mut labels = BTreeMap::new();
        labels.insert("shipyard.service".to_string(), service.id.to_string());
        labels.insert(
            "shipyard.environment".to_string(),
            service.environment_id.to_string(),
        );
        Self {
            name,
            env: service.env_vars.clone(),
            cpu_limit: service.cpu_limit,
            memory_limit_mb: service.memory_limit_mb,
            volumes: service.volumes.clone(),
            container_port: service.container_port,
            labels,
        }
    }
}

/// A started container
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunningContainer {
    pub container_id: String,
    pub host_port: Option<u16>,
}

/// Imperative container runtime API
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Build an image and return the reference to run
    async fn build(&self, spec: &BuildSpec) -> Result<String, ControlError>;

    /// Pull an image and return the reference to run
    async fn pull(&self, image: &str) -> Result<String, ControlError>;

    async fn tag(&self, source: &str, target: &str) -> Result<(), ControlError>;

    async fn run(&self, image: &str, spec: &RunSpec) -> Result<RunningContainer, ControlError>;

    async fn stop(&self, container_id: &str) -> Result<(), ControlError>;

    async fn logs(&self, container_id: &str, tail: usize) -> Result<String, ControlError>;

    async fn image_exists(&self, image: &str) -> Result<bool, ControlError>;
}

/// Fetches repository source at a commit
#[async_trait]
pub trait SourceFetcher: Send + Sync {
    /// Check out `branch` (at `commit` when given) into `target_dir`,
    /// returning the commit actually checked out
    async fn checkout(
        &self,
        repo_url: &str,
        branch: &str,
        commit: Option<&str>,
        target_dir: &Path,
    ) -> Result<String, ControlError>;
}
