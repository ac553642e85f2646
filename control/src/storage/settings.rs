//! Settings file management

use std::path::{Path, PathBuf};
use std::time::Duration;

use secrecy::SecretString;
use serde::{Deserialize, Serialize};

use crate::errors::ControlError;
use crate::logs::LogLevel;

/// Control plane settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,

    /// Emit JSON log lines
    #[serde(default)]
    pub log_json: bool,

    /// Optional directory for rolling log files
    #[serde(default)]
    pub log_dir: Option<PathBuf>,

    /// HTTP server configuration
    #[serde(default)]
    pub server: ServerSettings,

    /// Root of per-deployment clone workspaces
    #[serde(default = "default_storage_dir")]
    pub storage_dir: PathBuf,

    /// Wildcard domain system hostnames are issued under
    #[serde(default = "default_base_domain")]
    pub base_domain: String,

    /// Demo-mode guardrails
    #[serde(default)]
    pub demo: DemoSettings,

    /// Source-control provider
    #[serde(default)]
    pub github: GitHubSettings,

    /// Reverse proxy admin endpoint
    #[serde(default)]
    pub proxy: ProxySettings,

    /// Container runtime
    #[serde(default)]
    pub docker: DockerSettings,

    /// Bounds for external calls
    #[serde(default)]
    pub timeouts: TimeoutSettings,

    /// Dashboard login password
    #[serde(default, skip_serializing)]
    pub admin_password: Option<SecretString>,
}

fn default_true() -> bool {
    true
}

fn default_storage_dir() -> PathBuf {
    PathBuf::from("/var/lib/shipyard/builds")
}

fn default_base_domain() -> String {
    "localhost".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: LogLevel::Info,
            log_json: false,
            log_dir: None,
            server: ServerSettings::default(),
            storage_dir: default_storage_dir(),
            base_domain: default_base_domain(),
            demo: DemoSettings::default(),
            github: GitHubSettings::default(),
            proxy: ProxySettings::default(),
            docker: DockerSettings::default(),
            timeouts: TimeoutSettings::default(),
            admin_password: None,
        }
    }
}

impl Settings {
    /// Read settings from a JSON file
    pub async fn load(path: &Path) -> Result<Self, ControlError> {
        let contents = tokio::fs::read_to_string(path).await.map_err(|e| {
            ControlError::ConfigError(format!("Unable to read {}: {}", path.display(), e))
        })?;
        let settings = serde_json::from_str(&contents)?;
        Ok(settings)
    }
}

/// HTTP server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3000
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Quotas and rate limits applied in demo mode
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DemoSettings {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_max_projects")]
    pub max_projects: usize,

    #[serde(default = "default_max_environments")]
    pub max_environments_per_project: usize,

    #[serde(default = "default_max_services")]
    pub max_services_per_environment: usize,

    #[serde(default = "default_max_replicas")]
    pub max_replicas_per_service: u32,

    /// CPU cores
    #[serde(default = "default_max_cpu")]
    pub max_cpu_limit: f64,

    #[serde(default = "default_max_memory")]
    pub max_memory_limit_mb: u64,

    #[serde(default = "default_deploys_per_window")]
    pub deploys_per_window: usize,

    #[serde(default = "default_deploy_window")]
    pub deploy_window_secs: u64,

    #[serde(default = "default_login_attempts")]
    pub login_attempts: u32,

    #[serde(default = "default_login_window")]
    pub login_window_secs: u64,
}

fn default_max_projects() -> usize {
    3
}

fn default_max_environments() -> usize {
    3
}

fn default_max_services() -> usize {
    5
}

fn default_max_replicas() -> u32 {
    2
}

fn default_max_cpu() -> f64 {
    1.0
}

fn default_max_memory() -> u64 {
    512
}

fn default_deploys_per_window() -> usize {
    10
}

fn default_deploy_window() -> u64 {
    3600
}

fn default_login_attempts() -> u32 {
    5
}

fn default_login_window() -> u64 {
    900
}

impl Default for DemoSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            max_projects: default_max_projects(),
            max_environments_per_project: default_max_environments(),
            max_services_per_environment: default_max_services(),
            max_replicas_per_service: default_max_replicas(),
            max_cpu_limit: default_max_cpu(),
            max_memory_limit_mb: default_max_memory(),
            deploys_per_window: default_deploys_per_window(),
            deploy_window_secs: default_deploy_window(),
            login_attempts: default_login_attempts(),
            login_window_secs: default_login_window(),
        }
    }
}

impl DemoSettings {
    pub fn deploy_window(&self) -> Duration {
        Duration::from_secs(self.deploy_window_secs)
    }

    pub fn login_window(&self) -> Duration {
        Duration::from_secs(self.login_window_secs)
    }
}

/// GitHub settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitHubSettings {
    #[serde(default = "default_github_api")]
    pub api_base_url: String,

    /// API token used for comments and repository access
    #[serde(default, skip_serializing)]
    pub token: Option<SecretString>,

    /// Shared secret for webhook signatures
    #[serde(default, skip_serializing)]
    pub webhook_secret: Option<SecretString>,
}

fn default_github_api() -> String {
    "https://api.github.com".to_string()
}

impl Default for GitHubSettings {
    fn default() -> Self {
        Self {
            api_base_url: default_github_api(),
            token: None,
            webhook_secret: None,
        }
    }
}

/// Reverse proxy settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxySettings {
    /// Admin API base URL; reconciliation is disabled when absent
    #[serde(default)]
    pub admin_url: Option<String>,

    /// Serve system domains over TLS
    #[serde(default = "default_true")]
    pub tls: bool,
}

impl Default for ProxySettings {
    fn default() -> Self {
        Self {
            admin_url: None,
            tls: true,
        }
    }
}

/// Docker settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DockerSettings {
    #[serde(default = "default_docker_binary")]
    pub binary: String,

    /// Repository prefix for built images and snapshots
    #[serde(default = "default_image_prefix")]
    pub image_prefix: String,
}

fn default_docker_binary() -> String {
    "docker".to_string()
}

fn default_image_prefix() -> String {
    "shipyard".to_string()
}

impl Default for DockerSettings {
    fn default() -> Self {
        Self {
            binary: default_docker_binary(),
            image_prefix: default_image_prefix(),
        }
    }
}

/// Time bounds for external calls, in seconds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutSettings {
    #[serde(default = "default_build_secs")]
    pub build_secs: u64,

    #[serde(default = "default_run_secs")]
    pub run_secs: u64,

    #[serde(default = "default_scm_secs")]
    pub scm_secs: u64,

    #[serde(default = "default_proxy_secs")]
    pub proxy_secs: u64,
}

fn default_build_secs() -> u64 {
    900
}

fn default_run_secs() -> u64 {
    120
}

fn default_scm_secs() -> u64 {
    15
}

fn default_proxy_secs() -> u64 {
    10
}

impl Default for TimeoutSettings {
    fn default() -> Self {
        Self {
            build_secs: default_build_secs(),
            run_secs: default_run_secs(),
            scm_secs: default_scm_secs(),
            proxy_secs: default_proxy_secs(),
        }
    }
}

impl TimeoutSettings {
    pub fn build(&self) -> Duration {
        Duration::from_secs(self.build_secs)
    }

    pub fn run(&self) -> Duration {
        Duration::from_secs(self.run_secs)
    }

    pub fn scm(&self) -> Duration {
        Duration::from_secs(self.scm_secs)
    }

    pub fn proxy(&self) -> Duration {
        Duration::from_secs(self.proxy_secs)
    }
}
