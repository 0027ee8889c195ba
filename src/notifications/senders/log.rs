use async_trait::async_trait;
use std::collections::HashMap;
use tracing::info;

use super::{NotificationSender, SenderError};

/// Writes notifications to the tracing log.
#[derive(Debug, Default, Clone)]
pub struct LogSender;

impl LogSender {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl NotificationSender for LogSender {
    fn name(&self) -> &str {
        "log"
    }

    async fn send(
        &self,
        message: &str,
        context: &HashMap<String, String>,
    ) -> Result<(), SenderError> {
        let empty = String::new();
        info!(
            event = %context.get("event").unwrap_or(&empty),
            target_id = %context.get("target_id").unwrap_or(&empty),
            status = %context.get("status").unwrap_or(&empty),
            "{message}"
        );
        Ok(())
    }
}
