//! Control plane entities

pub mod deployment;
pub mod domain;
pub mod environment;
pub mod project;
pub mod service;

pub use deployment::{Deployment, DeploymentStatus, DeploymentUpdate, Replica, ReplicaStatus};
pub use domain::{Domain, DomainType, SslStatus};
pub use environment::{Environment, EnvironmentType, EnvironmentUpdate};
pub use project::Project;
pub use service::{DeployType, NewService, Service, ServiceUpdate, VolumeMount};
