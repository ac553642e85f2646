//! Deployment module

pub mod docker;
pub mod fsm;
pub mod git;
pub mod manager;
pub mod queue;
pub mod replica_logs;
pub mod rollback;
pub mod runtime;

pub use manager::{DeployRequest, DeploymentManager};
pub use queue::DeployQueue;
pub use replica_logs::LogAggregator;
pub use runtime::{ContainerRuntime, SourceFetcher};
