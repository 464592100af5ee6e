use crate::plugin::TransportPlugin;
use crate::utils::{truncate_string, MAX_BODY_LENGTH};
use crate::{RenderedContent, SendResponse, Transport};
use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use solfeo_common::types::Channel;

/// Primary WhatsApp transport: an HTTP bridge in front of a logged-in
/// WhatsApp Web session.
///
/// Sends `POST {base_url}/send` with `{"phone": "<digits>", "message": ...}`
/// and expects `{"success": bool, "error"?: string, "id"?: string}`.
pub struct WhatsappWebTransport {
    instance_id: String,
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
    api_key_header: String,
}

#[derive(Deserialize)]
struct BridgeResponse {
    success: bool,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    id: Option<String>,
}

impl WhatsappWebTransport {
    pub fn new(instance_id: &str, base_url: &str, api_key: Option<String>, api_key_header: String) -> Self {
        Self {
            instance_id: instance_id.to_string(),
            client: reqwest::Client::new(),
            endpoint: format!("{}/send", base_url.trim_end_matches('/')),
            api_key,
            api_key_header,
        }
    }
}

#[async_trait]
impl Transport for WhatsappWebTransport {
    async fn send(&self, destination: &str, content: &RenderedContent) -> Result<SendResponse> {
        let payload = serde_json::json!({
            "phone": destination.trim_start_matches('+'),
            "message": content.body,
        });
        let mut request = self.client.post(&self.endpoint).json(&payload);
        if let Some(key) = &self.api_key {
            request = request.header(self.api_key_header.as_str(), key.as_str());
        }

        let resp = request.send().await?;
        let status = resp.status();
        let text = resp.text().await.unwrap_or_default();
        let mut response = SendResponse {
            http_status: Some(status.as_u16()),
            request_body: Some(truncate_string(&payload.to_string(), MAX_BODY_LENGTH)),
            response_body: Some(truncate_string(&text, MAX_BODY_LENGTH)),
            ..Default::default()
        };

        if !status.is_success() {
            anyhow::bail!("HTTP {status}: {}", truncate_string(&text, 200));
        }
        let parsed: BridgeResponse = serde_json::from_str(&text)
            .map_err(|e| anyhow::anyhow!("unexpected bridge response: {e}"))?;
        if !parsed.success {
            anyhow::bail!(
                "{}",
                parsed
                    .error
                    .unwrap_or_else(|| "bridge rejected the message".to_string())
            );
        }
        response.provider_message_id = parsed.id;
        Ok(response)
    }

    fn transport_type(&self) -> &str {
        "whatsapp_web"
    }

    fn instance_id(&self) -> &str {
        &self.instance_id
    }
}

// Plugin

#[derive(Deserialize)]
struct WhatsappWebConfig {
    base_url: String,
    #[serde(default)]
    api_key: Option<String>,
    #[serde(default = "default_api_key_header")]
    api_key_header: String,
}

fn default_api_key_header() -> String {
    "X-Api-Key".to_string()
}

fn parse_config(config: &Value) -> Result<WhatsappWebConfig> {
    let cfg: WhatsappWebConfig = serde_json::from_value(config.clone())
        .map_err(|e| anyhow::anyhow!("Invalid whatsapp_web config: {e}"))?;
    if !(cfg.base_url.starts_with("http://") || cfg.base_url.starts_with("https://")) {
        anyhow::bail!(
            "Invalid whatsapp_web config: base_url must be an http(s) URL, got '{}'",
            cfg.base_url
        );
    }
    Ok(cfg)
}

pub struct WhatsappWebPlugin;

impl TransportPlugin for WhatsappWebPlugin {
    fn name(&self) -> &str {
        "whatsapp_web"
    }

    fn channel(&self) -> Channel {
        Channel::Whatsapp
    }

    fn validate_config(&self, config: &Value) -> Result<()> {
        parse_config(config).map(|_| ())
    }

    fn create_transport(&self, instance_id: &str, config: &Value) -> Result<Box<dyn Transport>> {
        let cfg = parse_config(config)?;
        Ok(Box::new(WhatsappWebTransport::new(
            instance_id,
            &cfg.base_url,
            cfg.api_key,
            cfg.api_key_header,
        )))
    }
}
