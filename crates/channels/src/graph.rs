//! Graph API Send client.

use std::time::Duration;

use async_trait::async_trait;
use messenger_core::config::PlatformConfig;
use messenger_core::types::Page;
use serde_json::Value;
use tracing::{debug, warn};

use crate::addressing::RecipientDescriptor;
use crate::payload::OutboundMessage;
use crate::sender::{PlatformSender, SendError, SendReceipt};

pub struct GraphApiSender {
    client: reqwest::Client,
    base_url: String,
    version: String,
}

impl GraphApiSender {
    pub fn new(config: &PlatformConfig) -> Result<Self, SendError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.send_timeout_ms))
            .build()
            .map_err(|e| SendError::Transport(format!("http client init failed: {e}")))?;
        Ok(Self {
            client,
            base_url: config.graph_base_url.trim_end_matches('/').to_string(),
            version: config.graph_version.clone(),
        })
    }

    fn messages_url(&self, page_id: &str) -> String {
        format!("{}/{}/{}/messages", self.base_url, self.version, page_id)
    }
}

#[async_trait]
impl PlatformSender for GraphApiSender {
    async fn send(
        &self,
        page: &Page,
        recipient: &RecipientDescriptor,
        message: &OutboundMessage,
    ) -> Result<SendReceipt, SendError> {
        if page.access_token.is_empty() {
            return Err(SendError::InvalidPayload(format!(
                "page {} has no access token",
                page.id
            )));
        }
        let body = message.request_body(recipient);

        let response = self
            .client
            .post(self.messages_url(&page.id))
            .query(&[("access_token", page.access_token.as_str())])
            .json(&body)
            .send()
            .await
            .map_err(|e| SendError::Transport(format!("Graph API request failed: {e}")))?;

        let status = response.status();
        let result: Value = response
            .json()
            .await
            .map_err(|e| SendError::Transport(format!("Invalid Graph API response: {e}")))?;

        if !status.is_success() || result.get("error").is_some() {
            let error = platform_error(&result, status.as_u16());
            warn!(page_id = %page.id, status = status.as_u16(), "Graph API send rejected: {error}");
            return Err(error);
        }

        let message_id = result["message_id"].as_str().map(str::to_string);
        debug!(page_id = %page.id, message_id = ?message_id, "Graph API message sent");
        Ok(SendReceipt { message_id })
    }
}

fn platform_error(result: &Value, status: u16) -> SendError {
    let error = &result["error"];
    SendError::Platform {
        code: error["code"].as_i64(),
        message: error["message"]
            .as_str()
            .map(str::to_string)
            .unwrap_or_else(|| format!("HTTP {status}")),
    }
}
