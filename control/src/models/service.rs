//! Service models

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::ControlError;

/// Where a service's artifact comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeployType {
    /// Built from a git repository
    Repo,

    /// Pulled from a registry
    Image,

    /// Pulled from a registry, typically stateful
    Database,
}

/// A named volume mounted into the container
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VolumeMount {
    pub name: String,
    pub mount_path: String,
}

/// One deployable unit within an environment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Service {
    pub id: Uuid,
    pub environment_id: Uuid,
    pub name: String,
    pub hostname: String,
    pub deploy_type: DeployType,

    pub repo_url: Option<String>,
    pub branch: Option<String>,
    pub dockerfile_path: Option<String>,
    pub build_context: Option<String>,
    pub image_url: Option<String>,
    pub registry_id: Option<Uuid>,

    pub env_vars: BTreeMap<String, String>,
    pub cpu_limit: Option<f64>,
    pub memory_limit_mb: Option<u64>,
    pub container_port: Option<u16>,
    pub replica_count: u32,
    pub volumes: Vec<VolumeMount>,

    pub auto_deploy: bool,
    pub current_deployment_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl Service {
    /// Whether a webhook for `clone_url` concerns this service
    pub fn matches_repo(&self, clone_url: &str) -> bool {
        self.deploy_type == DeployType::Repo && self.repo_url.as_deref() == Some(clone_url)
    }

    pub fn branch(&self) -> &str {
        self.branch.as_deref().unwrap_or("main")
    }

    /// Check source fields and the replicas/volumes exclusivity
    pub fn validate(&self) -> Result<(), ControlError> {
        if self.name.trim().is_empty() {
            return Err(ControlError::BadRequest("Service name is required".to_string()));
        }
        match self.deploy_type {
            DeployType::Repo if self.repo_url.as_deref().unwrap_or("").is_empty() => {
                return Err(ControlError::BadRequest(
                    "repoUrl is required for repo services".to_string(),
                ));
            }
            DeployType::Image | DeployType::Database
                if self.image_url.as_deref().unwrap_or("").is_empty() =>
            {
                return Err(ControlError::BadRequest(
                    "imageUrl is required for image and database services".to_string(),
                ));
            }
            _ => {}
        }
        if self.replica_count == 0 {
            return Err(ControlError::BadRequest(
                "replicaCount must be at least 1".to_string(),
            ));
        }
        if self.replica_count > 1 && !self.volumes.is_empty() {
            return Err(ControlError::BadRequest(
                "Services with volumes cannot run more than one replica".to_string(),
            ));
        }
        Ok(())
    }

    /// Copy of this service for another environment.
    ///
    /// Source config, env vars, limits and volumes carry over; auto-deploy is
    /// always off and the live deployment pointer is cleared.
    pub fn clone_into(&self, environment_id: Uuid, hostname: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            environment_id,
            hostname,
            auto_deploy: false,
            current_deployment_id: None,
            created_at: Utc::now(),
            ..self.clone()
        }
    }
}

fn default_replicas() -> u32 {
    1
}

fn default_true() -> bool {
    true
}

/// Service creation input
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewService {
    pub name: String,
    pub deploy_type: DeployType,
    #[serde(default)]
    pub repo_url: Option<String>,
    #[serde(default)]
    pub branch: Option<String>,
    #[serde(default)]
    pub dockerfile_path: Option<String>,
    #[serde(default)]
    pub build_context: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub registry_id: Option<Uuid>,
    #[serde(default)]
    pub env_vars: BTreeMap<String, String>,
    #[serde(default)]
    pub cpu_limit: Option<f64>,
    #[serde(default)]
    pub memory_limit_mb: Option<u64>,
    #[serde(default)]
    pub container_port: Option<u16>,
    #[serde(default = "default_replicas")]
    pub replica_count: u32,
    #[serde(default)]
    pub volumes: Vec<VolumeMount>,
    #[serde(default = "default_true")]
    pub auto_deploy: bool,
}

impl NewService {
    pub fn into_service(self, environment_id: Uuid, hostname: String) -> Service {
        Service {
            id: Uuid::new_v4(),
            environment_id,
            name: self.name,
            hostname,
            deploy_type: self.deploy_type,
            repo_url: self.repo_url,
            branch: self.branch,
            dockerfile_path: self.dockerfile_path,
            build_context: self.build_context,
            image_url: self.image_url,
            registry_id: self.registry_id,
            env_vars: self.env_vars,
            cpu_limit: self.cpu_limit,
            memory_limit_mb: self.memory_limit_mb,
            container_port: self.container_port,
            replica_count: self.replica_count,
            volumes: self.volumes,
            auto_deploy: self.auto_deploy,
            current_deployment_id: None,
            created_at: Utc::now(),
        }
    }
}

/// Partial service update; only provided fields change
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceUpdate {
    pub name: Option<String>,
    pub repo_url: Option<String>,
    pub branch: Option<String>,
    pub dockerfile_path: Option<String>,
    pub build_context: Option<String>,
    pub image_url: Option<String>,
    pub env_vars: Option<BTreeMap<String, String>>,
    pub cpu_limit: Option<f64>,
    pub memory_limit_mb: Option<u64>,
    pub container_port: Option<u16>,
    pub replica_count: Option<u32>,
    pub volumes: Option<Vec<VolumeMount>>,
    pub auto_deploy: Option<bool>,
    #[serde(skip)]
    pub current_deployment_id: Option<Option<Uuid>>,
}

impl ServiceUpdate {
    /// Only moves the live pointer
    pub fn live(deployment_id: Option<Uuid>) -> Self {
        Self {
            current_deployment_id: Some(deployment_id),
            ..Default::default()
        }
    }

    pub fn apply(self, service: &mut Service) {
        if let Some(v) = self.name {
            service.name = v;
        }
        if let Some(v) = self.repo_url {
            service.repo_url = Some(v);
        }
        if let Some(v) = self.branch {
            service.branch = Some(v);
        }
        if let Some(v) = self.dockerfile_path {
            service.dockerfile_path = Some(v);
        }
        if let Some(v) = self.build_context {
            service.build_context = Some(v);
        }
        if let Some(v) = self.image_url {
            service.image_url = Some(v);
        }
        if let Some(v) = self.env_vars {
            service.env_vars = v;
        }
        if let Some(v) = self.cpu_limit {
            service.cpu_limit = Some(v);
        }
        if let Some(v) = self.memory_limit_mb {
            service.memory_limit_mb = Some(v);
        }
        if let Some(v) = self.container_port {
            service.container_port = Some(v);
        }
        if let Some(v) = self.replica_count {
            service.replica_count = v;
        }
        if let Some(v) = self.volumes {
            service.volumes = v;
        }
        if let Some(v) = self.auto_deploy {
            service.auto_deploy = v;
        }
        if let Some(v) = self.current_deployment_id {
            service.current_deployment_id = v;
        }
    }
}
