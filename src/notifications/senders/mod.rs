use async_trait::async_trait;
use std::collections::HashMap;
use thiserror::Error;

pub mod log;
pub mod webhook;

pub use log::LogSender;
pub use webhook::{WebhookConfig, WebhookSender};

#[derive(Error, Debug)]
pub enum SenderError {
    #[error("Failed to send notification: {0}")]
    SendFailed(String),
    #[error("Invalid configuration for sender: {0}")]
    InvalidConfiguration(String),
    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),
    #[error("Templating error: {0}")]
    TemplatingError(String),
}

/// Delivers a rendered notification somewhere.
#[async_trait]
pub trait NotificationSender: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Sends a notification.
    ///
    /// # Arguments
    ///
    /// * `message` - Human readable one-line summary of the event.
    /// * `context` - Event fields (`event`, `target_id`, `address`, `status`, ...)
    ///   for senders that render templates.
    async fn send(
        &self,
        message: &str,
        context: &HashMap<String, String>,
    ) -> Result<(), SenderError>;
}
