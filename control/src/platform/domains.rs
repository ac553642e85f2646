//! Domain operations

use serde::Deserialize;
use tracing::info;
use url::Host;
use uuid::Uuid;

use crate::errors::ControlError;
use crate::models::{Domain, DomainType};
use crate::platform::Platform;
use crate::store::StoreExt;

/// Custom domain input
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewDomain {
    pub domain: String,
    #[serde(default = "default_kind", rename = "type")]
    pub kind: DomainType,
}

fn default_kind() -> DomainType {
    DomainType::Proxy
}

/// Lowercased hostname, or BadRequest if `raw` is not a DNS name
pub fn normalize_domain(raw: &str) -> Result<String, ControlError> {
    let candidate = raw.trim().trim_end_matches('.').to_ascii_lowercase();
    match Host::parse(&candidate) {
        Ok(Host::Domain(name)) if name.contains('.') => Ok(name),
        _ => Err(ControlError::BadRequest(format!("'{}' is not a valid domain", raw))),
    }
}

impl Platform {
    pub async fn list_domains(&self, service_id: Uuid) -> Result<Vec<Domain>, ControlError> {
        let service = self.store.service(service_id).await?;
        self.store.list_domains(service.id).await
    }

    pub async fn add_domain(&self, service_id: Uuid, input: NewDomain) -> Result<Domain, ControlError> {
        let service = self.store.service(service_id).await?;
        let name = normalize_domain(&input.domain)?;
        let domain = self
            .store
            .insert_domain(Domain::custom(service.id, service.environment_id, name, input.kind))
            .await?;
        info!("Added domain {} to service {}", domain.domain, service.name);
        self.reconciler.sync_quietly().await;
        Ok(domain)
    }

    pub async fn verify_domain(&self, id: Uuid) -> Result<Domain, ControlError> {
        self.store
            .get_domain(id)
            .await?
            .ok_or_else(|| ControlError::not_found("Domain", id))?;
        let domain = self.store.set_domain_verified(id, true).await?;
        self.reconciler.sync_quietly().await;
        Ok(domain)
    }

    /// A system domain goes only if another verified domain keeps the service reachable
    pub async fn delete_domain(&self, id: Uuid) -> Result<(), ControlError> {
        let domain = self
            .store
            .get_domain(id)
            .await?
            .ok_or_else(|| ControlError::not_found("Domain", id))?;

        if domain.is_system {
            let others = self.store.list_domains(domain.service_id).await?;
            if !others.iter().any(|d| d.id != domain.id && d.dns_verified) {
                return Err(ControlError::BadRequest(
                    "The system domain can only be removed once another verified domain exists"
                        .to_string(),
                ));
            }
        }

        self.store.delete_domain(domain.id).await?;
        info!("Deleted domain {}", domain.domain);
        self.reconciler.sync_quietly().await;
        Ok(())
    }
}
