//! Server state

use std::sync::Arc;

use secrecy::SecretString;

use crate::deploy::LogAggregator;
use crate::guard::LoginRateLimiter;
use crate::platform::Platform;
use crate::scm::SourceControl;
use crate::webhook::WebhookRouter;

/// Server state shared across handlers
pub struct ServerState {
    pub platform: Arc<Platform>,
    pub webhooks: Arc<WebhookRouter>,
    pub logs: Arc<LogAggregator>,
    pub scm: Arc<dyn SourceControl>,
    pub login_limiter: Arc<LoginRateLimiter>,
    pub admin_password: Option<SecretString>,
}

impl ServerState {
    pub fn new(
        platform: Arc<Platform>,
        webhooks: Arc<WebhookRouter>,
        logs: Arc<LogAggregator>,
        scm: Arc<dyn SourceControl>,
        login_limiter: Arc<LoginRateLimiter>,
        admin_password: Option<SecretString>,
    ) -> Self {
        Self {
            platform,
            webhooks,
            logs,
            scm,
            login_limiter,
            admin_password,
        }
    }
}
