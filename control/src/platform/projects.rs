//! Project operations

use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use crate::errors::ControlError;
use crate::models::{Environment, EnvironmentType, Project};
use crate::platform::Platform;
use crate::store::StoreExt;

/// Name of the environment every project is created with
pub const PRODUCTION: &str = "production";

/// A project with its environments
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectDetail {
    #[serde(flatten)]
    pub project: Project,
    pub environments: Vec<Environment>,
}

impl Platform {
    pub async fn create_project(&self, name: &str) -> Result<ProjectDetail, ControlError> {
        self.guard.check_project_quota().await?;

        let project = Project::new(name.trim());
        if project.hostname.is_empty() {
            return Err(ControlError::BadRequest(
                "Project name must contain letters or digits".to_string(),
            ));
        }
        let project = self.store.insert_project(project).await?;
        let production = self
            .store
            .insert_environment(Environment::new(project.id, PRODUCTION, EnvironmentType::Production))
            .await?;

        info!("Created project {} ({})", project.name, project.hostname);
        Ok(ProjectDetail {
            project,
            environments: vec![production],
        })
    }

    pub async fn get_project(&self, id: Uuid) -> Result<ProjectDetail, ControlError> {
        let project = self.store.project(id).await?;
        let environments = self.store.list_environments(project.id).await?;
        Ok(ProjectDetail {
            project,
            environments,
        })
    }
}
