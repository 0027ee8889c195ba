use async_trait::async_trait;
use reqwest::{Client, Method, header};
use serde::Deserialize;
use std::collections::HashMap;
use tera::{Context, Tera};

use super::{NotificationSender, SenderError};

pub const DEFAULT_BODY_TEMPLATE: &str = r#"{"content": {{ message | json_encode }}}"#;

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct WebhookConfig {
    pub url: String,
    #[serde(default = "default_method")]
    pub method: String, // "GET" or "POST"
    #[serde(default)]
    pub headers: HashMap<String, String>,
    /// Tera template for POST bodies; rendered with the event context plus `message`.
    pub body_template: Option<String>,
}

fn default_method() -> String {
    "POST".to_string()
}

/// A sender for pushing notifications via a custom webhook.
pub struct WebhookSender {
    client: Client,
    url: String,
    method: Method,
    headers: header::HeaderMap,
    body_template: String,
}

impl WebhookSender {
    pub fn new(config: &WebhookConfig) -> Result<Self, SenderError> {
        let method = match config.method.to_uppercase().as_str() {
            "POST" => Method::POST,
            "GET" => Method::GET,
            other => {
                return Err(SenderError::InvalidConfiguration(format!(
                    "Unsupported HTTP method: {other}"
                )));
            }
        };

        let mut headers = header::HeaderMap::new();
        for (key, value) in &config.headers {
            let header_name = header::HeaderName::from_bytes(key.as_bytes()).map_err(|e| {
                SenderError::InvalidConfiguration(format!("Invalid header name: {e}"))
            })?;
            let header_value = header::HeaderValue::from_str(value).map_err(|e| {
                SenderError::InvalidConfiguration(format!("Invalid header value: {e}"))
            })?;
            headers.insert(header_name, header_value);
        }

        Ok(Self {
            client: Client::new(),
            url: config.url.clone(),
            method,
            headers,
            body_template: config
                .body_template
                .clone()
                .unwrap_or_else(|| DEFAULT_BODY_TEMPLATE.to_string()),
        })
    }

    fn render_body(
        &self,
        message: &str,
        context: &HashMap<String, String>,
    ) -> Result<String, SenderError> {
        let mut tera_context = Context::new();
        for (key, value) in context {
            tera_context.insert(key, value);
        }
        tera_context.insert("message", message);
        Tera::one_off(&self.body_template, &tera_context, false)
            .map_err(|e| SenderError::TemplatingError(e.to_string()))
    }
}

#[async_trait]
impl NotificationSender for WebhookSender {
    fn name(&self) -> &str {
        "webhook"
    }

    async fn send(
        &self,
        message: &str,
        context: &HashMap<String, String>,
    ) -> Result<(), SenderError> {
        let mut request_builder = self
            .client
            .request(self.method.clone(), &self.url)
            .headers(self.headers.clone());

        if self.method == Method::POST {
            let rendered_body = self.render_body(message, context)?;
            request_builder = request_builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(rendered_body);
        }

        let response = request_builder.send().await?;
        let status = response.status();

        if !status.is_success() {
            let error_body = response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to read error body".to_string());
            return Err(SenderError::SendFailed(format!(
                "Webhook returned non-success status: {status}. Body: {error_body}"
            )));
        }

        Ok(())
    }
}
