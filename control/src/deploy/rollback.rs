//! Rollback engine

use tracing::info;
use uuid::Uuid;

use crate::deploy::manager::{DeployRequest, DeploymentManager};
use crate::errors::ControlError;
use crate::models::Deployment;
use crate::store::StoreExt;
use crate::utils::bounded;

impl DeploymentManager {
    /// Redeploy the image snapshot of `deployment_id` as a new deployment
    pub async fn rollback(&self, deployment_id: Uuid) -> Result<Deployment, ControlError> {
        let source = self.store().deployment(deployment_id).await?;
        let image = source.image_name.clone().ok_or_else(|| {
            ControlError::BadRequest(format!(
                "Deployment {} has no image snapshot to roll back to",
                source.id
            ))
        })?;

        let service = self.store().service(source.service_id).await?;
        if !service.volumes.is_empty() {
            return Err(ControlError::BadRequest(format!(
                "Service {} has volumes attached; rollback of stateful services is refused",
                service.name
            )));
        }

        let exists = bounded(
            "image inspect",
            self.timeouts().run(),
            self.runtime().image_exists(&image),
        )
        .await?;
        if !exists {
            return Err(ControlError::Gone(format!(
                "Snapshot image {} is no longer available",
                image
            )));
        }

        info!(
            "Rolling back service {} to deployment {} ({})",
            service.name, source.id, image
        );
        self.deploy(&service, DeployRequest::rollback(source)).await
    }
}
