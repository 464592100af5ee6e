use crate::plugin::TransportPlugin;
use crate::utils::{truncate_string, MAX_BODY_LENGTH};
use crate::{RenderedContent, SendResponse, Transport};
use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use solfeo_common::types::Channel;

/// Fallback WhatsApp transport using the Business Cloud API text message
/// endpoint.
pub struct WhatsappCloudTransport {
    instance_id: String,
    client: reqwest::Client,
    endpoint: String,
    access_token: String,
}

#[derive(Deserialize)]
struct CloudResponse {
    #[serde(default)]
    messages: Vec<CloudMessageId>,
}

#[derive(Deserialize)]
struct CloudMessageId {
    id: String,
}

#[derive(Deserialize)]
struct CloudErrorEnvelope {
    error: CloudError,
}

#[derive(Deserialize)]
struct CloudError {
    message: String,
    #[serde(default)]
    code: Option<i64>,
}

impl WhatsappCloudTransport {
    pub fn new(
        instance_id: &str,
        api_base: &str,
        api_version: &str,
        phone_number_id: &str,
        access_token: String,
    ) -> Self {
        Self {
            instance_id: instance_id.to_string(),
            client: reqwest::Client::new(),
            endpoint: format!(
                "{}/{}/{}/messages",
                api_base.trim_end_matches('/'),
                api_version,
                phone_number_id
            ),
            access_token,
        }
    }
}

#[async_trait]
impl Transport for WhatsappCloudTransport {
    async fn send(&self, destination: &str, content: &RenderedContent) -> Result<SendResponse> {
        let payload = serde_json::json!({
            "messaging_product": "whatsapp",
            "recipient_type": "individual",
            "to": destination.trim_start_matches('+'),
            "type": "text",
            "text": { "preview_url": false, "body": content.body },
        });

        let resp = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.access_token)
            .json(&payload)
            .send()
            .await?;
        let status = resp.status();
        let text = resp.text().await.unwrap_or_default();

        if !status.is_success() {
            let reason = match serde_json::from_str::<CloudErrorEnvelope>(&text) {
                Ok(envelope) => match envelope.error.code {
                    Some(code) => format!("{} (code {code})", envelope.error.message),
                    None => envelope.error.message,
                },
                Err(_) => truncate_string(&text, 200),
            };
            anyhow::bail!("HTTP {status}: {reason}");
        }

        let parsed: CloudResponse = serde_json::from_str(&text)
            .map_err(|e| anyhow::anyhow!("unexpected Cloud API response: {e}"))?;
        let id = parsed
            .messages
            .into_iter()
            .next()
            .map(|m| m.id)
            .ok_or_else(|| anyhow::anyhow!("Cloud API response carries no message id"))?;

        Ok(SendResponse {
            provider_message_id: Some(id),
            http_status: Some(status.as_u16()),
            request_body: Some(truncate_string(&payload.to_string(), MAX_BODY_LENGTH)),
            response_body: Some(truncate_string(&text, MAX_BODY_LENGTH)),
            ..Default::default()
        })
    }

    fn transport_type(&self) -> &str {
        "whatsapp_cloud"
    }

    fn instance_id(&self) -> &str {
        &self.instance_id
    }
}

// Plugin

#[derive(Deserialize)]
struct WhatsappCloudConfig {
    #[serde(default = "default_api_base")]
    api_base: String,
    #[serde(default = "default_api_version")]
    api_version: String,
    phone_number_id: String,
    access_token: String,
}

fn default_api_base() -> String {
    "https://graph.facebook.com".to_string()
}

fn default_api_version() -> String {
    "v19.0".to_string()
}

fn parse_config(config: &Value) -> Result<WhatsappCloudConfig> {
    let cfg: WhatsappCloudConfig = serde_json::from_value(config.clone())
        .map_err(|e| anyhow::anyhow!("Invalid whatsapp_cloud config: {e}"))?;
    if cfg.phone_number_id.trim().is_empty() || cfg.access_token.trim().is_empty() {
        anyhow::bail!("Invalid whatsapp_cloud config: phone_number_id and access_token are required");
    }
    Ok(cfg)
}

pub struct WhatsappCloudPlugin;

impl TransportPlugin for WhatsappCloudPlugin {
    fn name(&self) -> &str {
        "whatsapp_cloud"
    }

    fn channel(&self) -> Channel {
        Channel::Whatsapp
    }

    fn validate_config(&self, config: &Value) -> Result<()> {
        parse_config(config).map(|_| ())
    }

    fn create_transport(&self, instance_id: &str, config: &Value) -> Result<Box<dyn Transport>> {
        let cfg = parse_config(config)?;
        Ok(Box::new(WhatsappCloudTransport::new(
            instance_id,
            &cfg.api_base,
            &cfg.api_version,
            &cfg.phone_number_id,
            cfg.access_token,
        )))
    }
}
