//! Project, environment, service and domain operations
//!
//! Every mutating operation consults the [`Guard`] before touching the store.

pub mod domains;
pub mod environments;
pub mod projects;
pub mod services;

use std::sync::Arc;

use crate::deploy::{DeployQueue, DeploymentManager};
use crate::guard::Guard;
use crate::proxy::Reconciler;
use crate::store::Store;

pub use services::CreatedService;

/// Shared handle to the orchestration collaborators
pub struct Platform {
    pub store: Arc<dyn Store>,
    pub guard: Arc<Guard>,
    pub deployments: Arc<DeploymentManager>,
    pub queue: DeployQueue,
    pub reconciler: Arc<Reconciler>,
    /// Wildcard domain system hostnames are issued under
    pub base_domain: String,
    pub tls: bool,
}

impl Platform {
    pub fn new(
        store: Arc<dyn Store>,
        guard: Arc<Guard>,
        deployments: Arc<DeploymentManager>,
        queue: DeployQueue,
        reconciler: Arc<Reconciler>,
        base_domain: String,
        tls: bool,
    ) -> Self {
        Self {
            store,
            guard,
            deployments,
            queue,
            reconciler,
            base_domain,
            tls,
        }
    }

    /// Fully qualified system domain for a service hostname
    pub fn system_domain(&self, hostname: &str) -> String {
        format!("{}.{}", hostname, self.base_domain)
    }

    /// Externally reachable URL of a service hostname
    pub fn public_url(&self, hostname: &str) -> String {
        let scheme = if self.tls { "https" } else { "http" };
        format!("{}://{}", scheme, self.system_domain(hostname))
    }
}
