//! Utility functions

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::ControlError;

/// Longest hostname label issued for system domains
pub const MAX_HOSTNAME_LEN: usize = 50;

/// Version information for the control plane
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionInfo {
    pub version: String,
    pub git_hash: String,
    pub build_time: String,
}

/// Get version information
pub fn version_info() -> VersionInfo {
    VersionInfo {
        version: env!("CARGO_PKG_VERSION").to_string(),
        git_hash: option_env!("GIT_HASH").unwrap_or("unknown").to_string(),
        build_time: option_env!("BUILD_TIME").unwrap_or("unknown").to_string(),
    }
}

/// Lowercase, hyphen-separated, `[a-z0-9-]` only
pub fn slugify(input: &str) -> String {
    let mut slug = String::with_capacity(input.len());
    for ch in input.chars() {
        if ch.is_ascii_alphanumeric() {
            slug.push(ch.to_ascii_lowercase());
        } else if !slug.ends_with('-') && !slug.is_empty() {
            slug.push('-');
        }
    }
    slug.trim_end_matches('-').to_string()
}

/// Cut a hostname label to `max` bytes without leaving a trailing hyphen
pub fn truncate_label(label: &str, max: usize) -> String {
    let cut = if label.len() > max { &label[..max] } else { label };
    cut.trim_end_matches('-').to_string()
}

/// Hostname of a service cloned into a preview environment
pub fn preview_hostname(service_hostname: &str, environment_name: &str) -> String {
    let joined = format!("{}-{}", service_hostname, slugify(environment_name));
    truncate_label(&joined, MAX_HOSTNAME_LEN)
}

/// Run an external call under a time bound
pub async fn bounded<T, F>(operation: &str, limit: Duration, fut: F) -> Result<T, ControlError>
where
    F: Future<Output = Result<T, ControlError>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(ControlError::timeout(operation, limit)),
    }
}
