//! Environment model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Environment type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnvironmentType {
    Production,
    Preview,
    Manual,
}

/// A deployable grouping of services
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Environment {
    pub id: Uuid,
    pub project_id: Uuid,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: EnvironmentType,
    pub pr_number: Option<u64>,
    pub pr_branch: Option<String>,
    pub pr_comment_id: Option<u64>,
    pub created_at: DateTime<Utc>,
}

impl Environment {
    pub fn new(project_id: Uuid, name: &str, kind: EnvironmentType) -> Self {
        Self {
            id: Uuid::new_v4(),
            project_id,
            name: name.to_string(),
            kind,
            pr_number: None,
            pr_branch: None,
            pr_comment_id: None,
            created_at: Utc::now(),
        }
    }

    /// A preview environment bound to a pull request
    pub fn preview(project_id: Uuid, name: &str, pr_number: u64, pr_branch: &str) -> Self {
        Self {
            pr_number: Some(pr_number),
            pr_branch: Some(pr_branch.to_string()),
            ..Self::new(project_id, name, EnvironmentType::Preview)
        }
    }

    pub fn is_production(&self) -> bool {
        self.kind == EnvironmentType::Production
    }
}

/// Partial environment update; `None` leaves a field untouched
#[derive(Debug, Clone, Default)]
pub struct EnvironmentUpdate {
    pub name: Option<String>,
    pub pr_branch: Option<String>,
    pub pr_comment_id: Option<u64>,
}

impl EnvironmentUpdate {
    pub fn apply(self, env: &mut Environment) {
        if let Some(name) = self.name {
            env.name = name;
        }
        if let Some(branch) = self.pr_branch {
            env.pr_branch = Some(branch);
        }
        if let Some(comment_id) = self.pr_comment_id {
            env.pr_comment_id = Some(comment_id);
        }
    }
}
