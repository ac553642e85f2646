//! Reverse proxy reconciliation
//!
//! The proxy always receives the full desired config; no incremental diff is
//! ever sent.

pub mod caddy;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, warn};

use crate::errors::ControlError;
use crate::models::{DeploymentStatus, DomainType, ReplicaStatus};
use crate::store::Store;
use crate::utils::bounded;

pub use caddy::CaddyAdmin;

/// What a route does with matching requests
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase", tag = "action")]
pub enum RouteAction {
    Proxy { upstreams: Vec<String> },
    Redirect { to: String },
}

/// One host route
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProxyRoute {
    pub host: String,
    #[serde(flatten)]
    pub action: RouteAction,
}

/// Full desired proxy state
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProxyConfig {
    pub routes: Vec<ProxyRoute>,
    pub tls: bool,
}

/// Full-replace reconciliation API
#[async_trait]
pub trait ProxyReconciler: Send + Sync {
    async fn reconcile(&self, config: &ProxyConfig) -> Result<(), ControlError>;
}

/// Used when no proxy admin endpoint is configured
pub struct NoopProxy;

#[async_trait]
impl ProxyReconciler for NoopProxy {
    async fn reconcile(&self, config: &ProxyConfig) -> Result<(), ControlError> {
        debug!("Proxy disabled, skipping {} routes", config.routes.len());
        Ok(())
    }
}

/// Assemble the desired config from every live service
pub async fn build_config(store: &dyn Store, tls: bool) -> Result<ProxyConfig, ControlError> {
    let mut by_service: BTreeMap<uuid::Uuid, Vec<crate::models::Domain>> = BTreeMap::new();
    for domain in store.list_all_domains().await? {
        by_service.entry(domain.service_id).or_default().push(domain);
    }

    let mut routes = Vec::new();
    for service in store.list_all_services().await? {
        let Some(domains) = by_service.get(&service.id) else {
            continue;
        };
        let Some(deployment_id) = service.current_deployment_id else {
            continue;
        };
        let Some(deployment) = store.get_deployment(deployment_id).await? else {
            continue;
        };
        if deployment.status != DeploymentStatus::Running {
            continue;
        }

        let replicas = store.list_replicas(deployment.id).await?;
        let upstreams: Vec<String> = if replicas.is_empty() {
            deployment.host_port.into_iter().map(|p| format!("127.0.0.1:{}", p)).collect()
        } else {
            replicas
                .iter()
                .filter(|r| r.status == ReplicaStatus::Running)
                .filter_map(|r| r.host_port)
                .map(|p| format!("127.0.0.1:{}", p))
                .collect()
        };
        if upstreams.is_empty() {
            continue;
        }

        let primary = domains.iter().find(|d| d.is_system).or_else(|| domains.first());
        for domain in domains {
            let action = match domain.kind {
                DomainType::Proxy => RouteAction::Proxy {
                    upstreams: upstreams.clone(),
                },
                DomainType::Redirect => match primary {
                    Some(target) if target.id != domain.id => RouteAction::Redirect {
                        to: target.domain.clone(),
                    },
                    _ => continue,
                },
            };
            routes.push(ProxyRoute {
                host: domain.domain.clone(),
                action,
            });
        }
    }

    Ok(ProxyConfig { routes, tls })
}

/// Pushes the current desired state to the proxy
pub struct Reconciler {
    store: Arc<dyn Store>,
    proxy: Arc<dyn ProxyReconciler>,
    tls: bool,
    timeout: Duration,
}

impl Reconciler {
    pub fn new(store: Arc<dyn Store>, proxy: Arc<dyn ProxyReconciler>, tls: bool, timeout: Duration) -> Self {
        Self {
            store,
            proxy,
            tls,
            timeout,
        }
    }

    pub async fn sync(&self) -> Result<(), ControlError> {
        let config = build_config(self.store.as_ref(), self.tls).await?;
        bounded("proxy reconcile", self.timeout, self.proxy.reconcile(&config)).await
    }

    /// Reconcile, logging instead of failing; the next mutation retries
    pub async fn sync_quietly(&self) {
        if let Err(e) = self.sync().await {
            warn!("Proxy reconciliation failed: {}", e);
        }
    }
}
