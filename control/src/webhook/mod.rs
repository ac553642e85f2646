//! Webhook event router

pub mod push;
pub mod signature;

use std::sync::Arc;

use http::HeaderMap;
use openapi_client::models::{PingEvent, PullRequestEvent, PushEvent};
use openapi_server::models::WebhookResponse;
use secrecy::ExposeSecret;
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

use crate::errors::ControlError;
use crate::platform::Platform;
use crate::preview::PreviewManager;
use crate::scm::SourceControl;

pub const EVENT_HEADER: &str = "x-github-event";
pub const SIGNATURE_HEADER: &str = "x-hub-signature-256";

/// Verifies, classifies and dispatches source-control deliveries
pub struct WebhookRouter {
    platform: Arc<Platform>,
    previews: Arc<PreviewManager>,
    scm: Arc<dyn SourceControl>,
}

impl WebhookRouter {
    pub fn new(platform: Arc<Platform>, previews: Arc<PreviewManager>, scm: Arc<dyn SourceControl>) -> Self {
        Self {
            platform,
            previews,
            scm,
        }
    }

    pub async fn handle(&self, headers: &HeaderMap, body: &[u8]) -> Result<WebhookResponse, ControlError> {
        let secret = self.scm.webhook_secret().ok_or_else(|| {
            ControlError::ServiceUnavailable("Webhook secret is not configured".to_string())
        })?;

        let signature = header(headers, SIGNATURE_HEADER)
            .ok_or_else(|| ControlError::Unauthorized("Missing webhook signature".to_string()))?;
        if !signature::verify(secret.expose_secret().as_bytes(), body, signature) {
            warn!("Rejected webhook with invalid signature");
            return Err(ControlError::Unauthorized("Invalid webhook signature".to_string()));
        }

        let event = header(headers, EVENT_HEADER)
            .ok_or_else(|| ControlError::BadRequest("Missing event type header".to_string()))?;
        debug!("Webhook event: {}", event);

        match event {
            "ping" => {
                let ping: PingEvent = parse(body)?;
                info!("Webhook ping (hook {:?})", ping.hook_id);
                Ok(WebhookResponse::message("pong"))
            }
            "push" => push::handle(&self.platform, &parse::<PushEvent>(body)?).await,
            "pull_request" => self.previews.handle(&parse::<PullRequestEvent>(body)?).await,
            other => Ok(WebhookResponse::message(format!("Event '{}' ignored", other))),
        }
    }
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

fn parse<T: DeserializeOwned>(body: &[u8]) -> Result<T, ControlError> {
    serde_json::from_slice(body)
        .map_err(|e| ControlError::BadRequest(format!("Malformed webhook payload: {}", e)))
}
