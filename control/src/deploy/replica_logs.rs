//! Replica-aware runtime log aggregation

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tracing::debug;
use uuid::Uuid;

use crate::deploy::runtime::ContainerRuntime;
use crate::errors::ControlError;
use crate::models::{DeploymentStatus, ReplicaStatus};
use crate::store::{Store, StoreExt};
use crate::utils::bounded;

/// Lines fetched per container when the caller gives no tail
pub const DEFAULT_TAIL: usize = 100;

/// Logs of one deployment, possibly from several replicas
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregatedLogs {
    pub deployment_id: Uuid,
    /// Replica indexes queried, ascending; empty for single-container deployments
    pub replicas: Vec<u32>,
    pub output: String,
}

pub struct LogAggregator {
    store: Arc<dyn Store>,
    runtime: Arc<dyn ContainerRuntime>,
    timeout: Duration,
}

impl LogAggregator {
    pub fn new(store: Arc<dyn Store>, runtime: Arc<dyn ContainerRuntime>, timeout: Duration) -> Self {
        Self {
            store,
            runtime,
            timeout,
        }
    }

    /// Trailing logs of the service's most recent running deployment
    pub async fn service_logs(
        &self,
        service_id: Uuid,
        tail: Option<usize>,
        replica: Option<u32>,
    ) -> Result<AggregatedLogs, ControlError> {
        let service = self.store.service(service_id).await?;
        let tail = tail.unwrap_or(DEFAULT_TAIL);

        let deployment = self
            .store
            .list_deployments(service.id)
            .await?
            .into_iter()
            .find(|d| d.status == DeploymentStatus::Running)
            .ok_or_else(|| {
                ControlError::NotFound(format!("Service {} has no running deployment", service.name))
            })?;

        let replicas = self.store.list_replicas(deployment.id).await?;
        if replicas.is_empty() {
            let container_id = deployment.container_id.as_deref().ok_or_else(|| {
                ControlError::NotFound(format!("Deployment {} has no container", deployment.id))
            })?;
            let output = self.fetch(container_id, tail).await?;
            return Ok(AggregatedLogs {
                deployment_id: deployment.id,
                replicas: Vec::new(),
                output,
            });
        }

        let targets: Vec<(u32, String)> = replicas
            .into_iter()
            .filter(|r| r.status == ReplicaStatus::Running)
            .filter(|r| replica.is_none_or(|wanted| wanted == r.replica_index))
            .filter_map(|r| r.container_id.map(|cid| (r.replica_index, cid)))
            .collect();
        if targets.is_empty() {
            return Err(ControlError::NotFound(match replica {
                Some(index) => format!("Replica {} is not running", index),
                None => format!("Deployment {} has no running replicas", deployment.id),
            }));
        }

        debug!(
            "Fetching logs from {} replicas of deployment {}",
            targets.len(),
            deployment.id
        );
        let outputs = join_all(targets.iter().map(|(_, cid)| self.fetch(cid, tail))).await;

        let indexes: Vec<u32> = targets.iter().map(|(index, _)| *index).collect();
        let output = if targets.len() == 1 {
            outputs.into_iter().next().unwrap_or_else(|| Ok(String::new()))?
        } else {
            let mut merged = Vec::new();
            for (index, output) in indexes.iter().zip(outputs) {
                merged.push(prefix_lines(*index, &output?));
            }
            merged.retain(|block| !block.is_empty());
            merged.join("\n")
        };

        Ok(AggregatedLogs {
            deployment_id: deployment.id,
            replicas: indexes,
            output,
        })
    }

    async fn fetch(&self, container_id: &str, tail: usize) -> Result<String, ControlError> {
        bounded("container logs", self.timeout, self.runtime.logs(container_id, tail))
            .await
            .map_err(|e| ControlError::Internal(format!("Failed to read logs of {}: {}", container_id, e)))
    }
}

fn prefix_lines(index: u32, output: &str) -> String {
    output
        .lines()
        .map(|line| format!("[replica-{}] {}", index, line))
        .collect::<Vec<_>>()
        .join("\n")
}
