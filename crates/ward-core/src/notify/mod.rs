//! Outbound notifications: mail relay client and message composition

pub mod mail;
pub mod messages;

pub use mail::{LogNotifier, MailRelayClient};
pub use messages::{approval_message, send_system_alert, Message};

use crate::config::MailConfig;
use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// Delivers a message to one recipient
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, recipient: &str, subject: &str, body: &str) -> Result<()>;
}

/// Mail relay client when a relay is configured, log-only notifier otherwise
pub fn notifier_from_config(config: &MailConfig, timeout: Duration) -> Result<Arc<dyn Notifier>> {
    match config.relay_url.as_deref().filter(|u| !u.trim().is_empty()) {
        Some(url) => {
            log::info!("Notifications go through mail relay {}", url);
            Ok(Arc::new(MailRelayClient::new(config, url, timeout)?))
        }
        None => {
            log::info!("No mail relay configured, notifications will only be logged");
            Ok(Arc::new(LogNotifier))
        }
    }
}
