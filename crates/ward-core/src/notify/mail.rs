//! HTTP mail relay client

use super::Notifier;
use crate::config::MailConfig;
use crate::error::{Result, WardError};
use async_trait::async_trait;
use reqwest::Client as HttpClient;
use serde_json::json;
use std::time::Duration;

pub struct MailRelayClient {
    endpoint: String,
    api_key: Option<String>,
    from_address: String,
    http_client: HttpClient,
}

impl MailRelayClient {
    pub fn new(config: &MailConfig, endpoint: &str, timeout: Duration) -> Result<Self> {
        let http_client = HttpClient::builder().timeout(timeout).build()?;

        Ok(Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone().filter(|k| !k.is_empty()),
            from_address: config.from_address.clone(),
            http_client,
        })
    }
}

#[async_trait]
impl Notifier for MailRelayClient {
    async fn send(&self, recipient: &str, subject: &str, body: &str) -> Result<()> {
        let payload = json!({
            "from": self.from_address,
            "to": [recipient],
            "subject": subject,
            "text": body,
        });

        let mut request = self.http_client.post(&self.endpoint).json(&payload);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(|e| {
            WardError::DependencyFailure(format!("Mail relay unreachable: {}", e))
        })?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(WardError::DependencyFailure(format!(
                "Mail relay returned {} - {}",
                status, error_text
            )));
        }

        log::info!("Mail '{}' sent to {}", subject, recipient);
        Ok(())
    }
}

/// Writes notifications to the log instead of delivering them
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, recipient: &str, subject: &str, body: &str) -> Result<()> {
        log::info!("Mail to {}: {}", recipient, subject);
        log::debug!("{}", body);
        Ok(())
    }
}
