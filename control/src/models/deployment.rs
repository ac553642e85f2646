//! Deployment models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub use crate::deploy::fsm::DeploymentStatus;

/// One build+run attempt of a service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Deployment {
    pub id: Uuid,
    pub service_id: Uuid,
    pub environment_id: Uuid,
    pub commit_sha: Option<String>,
    pub commit_message: Option<String>,
    pub status: DeploymentStatus,
    pub container_id: Option<String>,
    pub host_port: Option<u16>,
    /// Image reference actually run
    pub image_name: Option<String>,
    pub rollback_eligible: bool,
    pub rollback_source_id: Option<Uuid>,
    pub build_log: String,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl Deployment {
    pub fn new(
        service_id: Uuid,
        environment_id: Uuid,
        commit_sha: Option<String>,
        commit_message: Option<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            service_id,
            environment_id,
            commit_sha,
            commit_message,
            status: DeploymentStatus::Pending,
            container_id: None,
            host_port: None,
            image_name: None,
            rollback_eligible: false,
            rollback_source_id: None,
            build_log: String::new(),
            error_message: None,
            created_at: Utc::now(),
            finished_at: None,
        }
    }

    /// New deployment replaying `source`'s commit metadata
    pub fn rollback_of(source: &Deployment) -> Self {
        Self {
            rollback_source_id: Some(source.id),
            ..Self::new(
                source.service_id,
                source.environment_id,
                source.commit_sha.clone(),
                source.commit_message.clone(),
            )
        }
    }

    /// Whether this row takes part in per-commit deduplication
    pub fn is_commit_keyed(&self) -> bool {
        self.commit_sha.is_some() && self.rollback_source_id.is_none()
    }
}

/// Partial deployment update; commit and service never change
#[derive(Debug, Clone, Default)]
pub struct DeploymentUpdate {
    pub status: Option<DeploymentStatus>,
    pub container_id: Option<String>,
    pub host_port: Option<u16>,
    pub image_name: Option<String>,
    pub rollback_eligible: Option<bool>,
    pub build_log: Option<String>,
    pub error_message: Option<String>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl DeploymentUpdate {
    pub fn status(status: DeploymentStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    pub fn apply(self, deployment: &mut Deployment) {
        if let Some(v) = self.status {
            deployment.status = v;
        }
        if let Some(v) = self.container_id {
            deployment.container_id = Some(v);
        }
        if let Some(v) = self.host_port {
            deployment.host_port = Some(v);
        }
        if let Some(v) = self.image_name {
            deployment.image_name = Some(v);
        }
        if let Some(v) = self.rollback_eligible {
            deployment.rollback_eligible = v;
        }
        if let Some(v) = self.build_log {
            deployment.build_log = v;
        }
        if let Some(v) = self.error_message {
            deployment.error_message = Some(v);
        }
        if let Some(v) = self.finished_at {
            deployment.finished_at = Some(v);
        }
    }
}

/// Replica status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplicaStatus {
    Running,
    Stopped,
    Failed,
}

/// One running instance of a replicated deployment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Replica {
    pub id: Uuid,
    pub deployment_id: Uuid,
    /// 0-based, contiguous per deployment
    pub replica_index: u32,
    pub container_id: Option<String>,
    pub host_port: Option<u16>,
    pub status: ReplicaStatus,
}

impl Replica {
    pub fn running(deployment_id: Uuid, replica_index: u32, container_id: String, host_port: Option<u16>) -> Self {
        Self {
            id: Uuid::new_v4(),
            deployment_id,
            replica_index,
            container_id: Some(container_id),
            host_port,
            status: ReplicaStatus::Running,
        }
    }
}
