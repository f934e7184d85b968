//! Chat notifications
//!
//! Each device posts to the channel named after its group prefix: `g88_pi`
//! posts to `#g88`. Devices without a prefix go to the default channel, and
//! the override table renames channels that are taken (`g88 -> g88a`).

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use shared::NotifierConfig;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info};

use crate::error::NotifyError;

/// Chat notification sink
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Post `text` on behalf of `device`
    async fn notify(&self, device: &str, text: &str) -> Result<(), NotifyError>;
}

/// Maps device names to chat channels
#[derive(Debug, Clone)]
pub struct ChannelRouter {
    default_channel: String,
    overrides: HashMap<String, String>,
}

impl ChannelRouter {
    pub fn new(default_channel: impl Into<String>, overrides: HashMap<String, String>) -> Self {
        Self {
            default_channel: default_channel.into(),
            overrides,
        }
    }

    pub fn from_config(config: &NotifierConfig) -> Self {
        Self::new(config.default_channel.clone(), config.channel_overrides.clone())
    }

    /// Channel name for a device, without the leading `#`
    pub fn channel_for(&self, device: &str) -> String {
        let channel = match device.find('_') {
            Some(pos) if pos > 0 => &device[..pos],
            _ => self.default_channel.as_str(),
        };

        self.overrides
            .get(channel)
            .cloned()
            .unwrap_or_else(|| channel.to_string())
    }
}

/// Incoming-webhook message body
#[derive(Debug, Serialize, PartialEq)]
pub struct WebhookMessage<'a> {
    pub channel: String,
    pub username: &'a str,
    pub text: &'a str,
}

/// Posts messages to a chat incoming webhook
pub struct WebhookNotifier {
    client: Client,
    url: String,
    router: ChannelRouter,
}

impl WebhookNotifier {
    /// Create a webhook notifier
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be built
    pub fn new(url: impl Into<String>, router: ChannelRouter, timeout: Duration) -> Result<Self, NotifyError> {
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            url: url.into(),
            router,
        })
    }

    /// Message body posted for a device
    pub fn message<'a>(&self, device: &'a str, text: &'a str) -> WebhookMessage<'a> {
        WebhookMessage {
            channel: format!("#{}", self.router.channel_for(device)),
            username: device,
            text,
        }
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, device: &str, text: &str) -> Result<(), NotifyError> {
        let body = self.message(device, text);

        let response = self.client.post(&self.url).json(&body).send().await?;
        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(NotifyError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        debug!(device = device, channel = %body.channel, "Chat message posted");
        Ok(())
    }
}

/// Writes messages to the log instead of a chat service
pub struct LogNotifier {
    router: ChannelRouter,
}

impl LogNotifier {
    pub fn new(router: ChannelRouter) -> Self {
        Self { router }
    }
}

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, device: &str, text: &str) -> Result<(), NotifyError> {
        info!(
            device = device,
            channel = %self.router.channel_for(device),
            text = text,
            "Chat notification"
        );
        Ok(())
    }
}
