//! Chat webhook connectors (Slack, Discord).
//!
//! Both services accept a JSON POST to a per-channel webhook URL; they differ
//! only in the field that carries the message text. The URL is the owner's
//! stored credential for the service.

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use crate::{Connector, ConnectorContext, ConnectorError, ConnectorOutput};

pub struct ChatWebhookConnector {
    service: &'static str,
    text_field: &'static str,
    client: reqwest::Client,
}

impl ChatWebhookConnector {
    pub fn slack(client: reqwest::Client) -> Self {
        Self {
            service: "slack",
            text_field: "text",
            client,
        }
    }

    pub fn discord(client: reqwest::Client) -> Self {
        Self {
            service: "discord",
            text_field: "content",
            client,
        }
    }

    fn render(&self, config: &Value, ctx: &ConnectorContext) -> Result<String, ConnectorError> {
        let template = config
            .get("message")
            .and_then(Value::as_str)
            .ok_or_else(|| ConnectorError::InvalidConfig("'message' must be a string".into()))?;

        Ok(template.replace("{{workflow_id}}", &ctx.workflow_id.to_string()))
    }
}

#[async_trait]
impl Connector for ChatWebhookConnector {
    fn required_service(&self) -> Option<&str> {
        Some(self.service)
    }

    async fn execute(
        &self,
        ctx: &ConnectorContext,
        config: &Value,
    ) -> Result<ConnectorOutput, ConnectorError> {
        let url = ctx.credential.as_deref().ok_or_else(|| {
            ConnectorError::InvalidConfig(format!("no {} webhook URL resolved", self.service))
        })?;
        let text = self.render(config, ctx)?;

        let mut body = serde_json::Map::new();
        body.insert(self.text_field.to_owned(), Value::String(text));

        debug!(service = self.service, "posting chat message");
        let request = self.client.post(url).json(&body).send();

        let response = tokio::select! {
            _ = ctx.cancel.cancelled() => return Err(ConnectorError::Cancelled),
            res = request => res.map_err(|e| {
                if e.is_timeout() {
                    ConnectorError::Timeout
                } else {
                    ConnectorError::Request(e.to_string())
                }
            })?,
        };

        let status = response.status();
        if !status.is_success() {
            return Err(ConnectorError::Request(format!(
                "{} webhook returned {}",
                self.service, status
            )));
        }

        Ok(ConnectorOutput::message(format!("message posted to {}", self.service))
            .with_data(json!({ "status": status.as_u16() })))
    }
}
