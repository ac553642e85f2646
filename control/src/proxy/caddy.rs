//! Caddy admin API reconciler

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use tracing::{debug, error, info};

use crate::errors::ControlError;
use crate::proxy::{ProxyConfig, ProxyReconciler, RouteAction};

/// Loads full configs through Caddy's `/load` endpoint
pub struct CaddyAdmin {
    client: Client,
    admin_url: String,
}

impl CaddyAdmin {
    pub fn new(admin_url: &str) -> Result<Self, ControlError> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()?;
        Ok(Self {
            client,
            admin_url: admin_url.trim_end_matches('/').to_string(),
        })
    }
}

/// Render the desired state as a Caddy JSON config
pub fn render(config: &ProxyConfig) -> Value {
    let routes: Vec<Value> = config
        .routes
        .iter()
        .map(|route| {
            let handler = match &route.action {
                RouteAction::Proxy { upstreams } => json!({
                    "handler": "reverse_proxy",
                    "upstreams": upstreams.iter().map(|u| json!({ "dial": u })).collect::<Vec<_>>(),
                }),
                RouteAction::Redirect { to } => {
                    let scheme = if config.tls { "https" } else { "http" };
                    json!({
                        "handler": "static_response",
                        "status_code": 308,
                        "headers": { "Location": [format!("{}://{}{{http.request.uri}}", scheme, to)] },
                    })
                }
            };
            json!({
                "match": [{ "host": [route.host] }],
                "handle": [handler],
                "terminal": true,
            })
        })
        .collect();

    let listen = if config.tls { vec![":443", ":80"] } else { vec![":80"] };
    let mut server = json!({ "listen": listen, "routes": routes });
    if !config.tls {
        server["automatic_https"] = json!({ "disable": true });
    }

    json!({ "apps": { "http": { "servers": { "shipyard": server } } } })
}

#[async_trait]
impl ProxyReconciler for CaddyAdmin {
    async fn reconcile(&self, config: &ProxyConfig) -> Result<(), ControlError> {
        let url = format!("{}/load", self.admin_url);
        debug!("POST {} ({} routes)", url, config.routes.len());

        let response = self.client.post(&url).json(&render(config)).send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            error!("Proxy reconcile failed: {} - {}", status, body);
            return Err(ControlError::Internal(format!("proxy load failed: {}: {}", status, body)));
        }

        info!("Reconciled proxy with {} routes", config.routes.len());
        Ok(())
    }
}
