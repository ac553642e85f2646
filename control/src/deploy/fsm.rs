//! Finite State Machine for service deployments

use serde::{Deserialize, Serialize};

/// Deployment status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeploymentStatus {
    /// Created, no work started
    Pending,

    /// Fetching repository source
    Cloning,

    /// Fetching a prebuilt image
    Pulling,

    /// Building an image from cloned source
    Building,

    /// Starting containers
    Deploying,

    /// Live
    Running,

    /// Any step failed
    Failed,

    /// Stopped by an operator or replaced by a newer live deployment
    Stopped,

    /// Superseded before completion
    Cancelled,
}

impl DeploymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeploymentStatus::Pending => "pending",
            DeploymentStatus::Cloning => "cloning",
            DeploymentStatus::Pulling => "pulling",
            DeploymentStatus::Building => "building",
            DeploymentStatus::Deploying => "deploying",
            DeploymentStatus::Running => "running",
            DeploymentStatus::Failed => "failed",
            DeploymentStatus::Stopped => "stopped",
            DeploymentStatus::Cancelled => "cancelled",
        }
    }

    /// True once no further build step will run
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            DeploymentStatus::Running
                | DeploymentStatus::Failed
                | DeploymentStatus::Stopped
                | DeploymentStatus::Cancelled
        )
    }
}

impl std::fmt::Display for DeploymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Deployment event
#[derive(Debug, Clone)]
pub enum DeploymentEvent {
    /// Start fetching repository source
    Clone,

    /// Start pulling an image
    Pull,

    /// Start building from cloned source
    Build,

    /// Start containers
    Deploy,

    /// Containers are up
    Succeed,

    /// A step failed
    Fail(String),

    /// Operator stop
    Stop,

    /// Superseded by a newer deployment
    Cancel,
}

/// Deployment FSM
#[derive(Debug, Clone)]
pub struct DeploymentFsm {
    state: DeploymentStatus,
    error: Option<String>,
}

impl DeploymentFsm {
    /// Create a new FSM in pending state
    pub fn new() -> Self {
        Self::from_status(DeploymentStatus::Pending)
    }

    /// Resume an FSM from a persisted status
    pub fn from_status(state: DeploymentStatus) -> Self {
        Self { state, error: None }
    }

    pub fn state(&self) -> DeploymentStatus {
        self.state
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Process an event and transition state
    pub fn process(&mut self, event: DeploymentEvent) -> Result<DeploymentStatus, String> {
        use DeploymentStatus as S;

        let new_state = match (&self.state, &event) {
            (S::Pending, DeploymentEvent::Clone) => S::Cloning,
            (S::Pending, DeploymentEvent::Pull) => S::Pulling,
            // Snapshot replay has nothing to fetch
            (S::Pending, DeploymentEvent::Deploy) => S::Deploying,

            (S::Cloning, DeploymentEvent::Build) => S::Building,
            (S::Building, DeploymentEvent::Deploy) => S::Deploying,
            (S::Pulling, DeploymentEvent::Deploy) => S::Deploying,

            (S::Deploying, DeploymentEvent::Succeed) => S::Running,

            (state, DeploymentEvent::Fail(err)) if !state.is_terminal() => {
                self.error = Some(err.clone());
                S::Failed
            }
            (state, DeploymentEvent::Cancel) if !state.is_terminal() => S::Cancelled,

            (S::Running, DeploymentEvent::Stop) => S::Stopped,

            (state, event) => {
                return Err(format!("Invalid transition: {:?} -> {:?}", state, event));
            }
        };

        self.state = new_state;
        Ok(new_state)
    }
}

impl Default for DeploymentFsm {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fsm_repo_path() {
        let mut fsm = DeploymentFsm::new();
        fsm.process(DeploymentEvent::Clone).unwrap();
        fsm.process(DeploymentEvent::Build).unwrap();
        fsm.process(DeploymentEvent::Deploy).unwrap();
        assert_eq!(
            fsm.process(DeploymentEvent::Succeed).unwrap(),
            DeploymentStatus::Running
        );
        assert!(fsm.state().is_terminal());
    }

    #[test]
    fn test_fsm_image_cannot_build() {
        let mut fsm = DeploymentFsm::new();
        fsm.process(DeploymentEvent::Pull).unwrap();
        assert!(fsm.process(DeploymentEvent::Build).is_err());
        assert_eq!(fsm.state(), DeploymentStatus::Pulling);
    }

    #[test]
    fn test_fsm_fail_from_any_active_state() {
        for path in [
            vec![],
            vec![DeploymentEvent::Clone],
            vec![DeploymentEvent::Clone, DeploymentEvent::Build],
            vec![DeploymentEvent::Pull, DeploymentEvent::Deploy],
        ] {
            let mut fsm = DeploymentFsm::new();
            for event in path {
                fsm.process(event).unwrap();
            }
            fsm.process(DeploymentEvent::Fail("boom".to_string())).unwrap();
            assert_eq!(fsm.state(), DeploymentStatus::Failed);
            assert_eq!(fsm.error(), Some("boom"));
        }
    }

    #[test]
    fn test_fsm_terminal_states_are_sticky() {
        let mut fsm = DeploymentFsm::from_status(DeploymentStatus::Failed);
        assert!(fsm.process(DeploymentEvent::Cancel).is_err());
        assert!(fsm.process(DeploymentEvent::Stop).is_err());

        let mut fsm = DeploymentFsm::from_status(DeploymentStatus::Running);
        assert!(fsm.process(DeploymentEvent::Fail("late".to_string())).is_err());
        assert_eq!(
            fsm.process(DeploymentEvent::Stop).unwrap(),
            DeploymentStatus::Stopped
        );
    }
}
