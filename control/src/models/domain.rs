//! Domain model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// How traffic for a domain is handled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DomainType {
    Proxy,
    Redirect,
}

/// Certificate provisioning state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SslStatus {
    Pending,
    Active,
    Failed,
}

/// A hostname routed to a service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Domain {
    pub id: Uuid,
    pub service_id: Uuid,
    pub environment_id: Uuid,
    pub domain: String,
    #[serde(rename = "type")]
    pub kind: DomainType,
    pub dns_verified: bool,
    pub ssl_status: SslStatus,
    /// Auto-generated wildcard hostname
    pub is_system: bool,
    pub created_at: DateTime<Utc>,
}

impl Domain {
    /// System domain issued under the instance wildcard
    pub fn system(service_id: Uuid, environment_id: Uuid, domain: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            service_id,
            environment_id,
            domain,
            kind: DomainType::Proxy,
            dns_verified: true,
            ssl_status: SslStatus::Active,
            is_system: true,
            created_at: Utc::now(),
        }
    }

    /// User-added domain awaiting DNS verification
    pub fn custom(service_id: Uuid, environment_id: Uuid, domain: String, kind: DomainType) -> Self {
        Self {
            id: Uuid::new_v4(),
            service_id,
            environment_id,
            domain,
            kind,
            dns_verified: false,
            ssl_status: SslStatus::Pending,
            is_system: false,
            created_at: Utc::now(),
        }
    }
}
