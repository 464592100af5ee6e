use crate::plugin::TransportPlugin;
use crate::utils::{truncate_string, MAX_BODY_LENGTH};
use crate::{RenderedContent, SendResponse, Transport};
use anyhow::Result;
use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use serde::Deserialize;
use serde_json::Value;
use solfeo_common::types::Channel;
use std::time::Duration;

const MAX_ATTEMPTS: u32 = 3;

pub struct SmtpTransport {
    instance_id: String,
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpTransport {
    fn new(instance_id: &str, cfg: &SmtpConfig) -> Result<Self> {
        let mut builder = match cfg.security {
            SmtpSecurity::Tls => AsyncSmtpTransport::<Tokio1Executor>::relay(&cfg.smtp_host)?,
            SmtpSecurity::Starttls => {
                AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&cfg.smtp_host)?
            }
            SmtpSecurity::None => {
                AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&cfg.smtp_host)
            }
        }
        .port(cfg.smtp_port)
        .timeout(Some(Duration::from_secs(cfg.timeout_secs)));

        if let (Some(user), Some(pass)) = (&cfg.smtp_username, &cfg.smtp_password) {
            builder = builder.credentials(Credentials::new(user.clone(), pass.clone()));
        }

        Ok(Self {
            instance_id: instance_id.to_string(),
            transport: builder.build(),
            from: cfg.from.parse()?,
        })
    }
}

#[async_trait]
impl Transport for SmtpTransport {
    async fn send(&self, destination: &str, content: &RenderedContent) -> Result<SendResponse> {
        let email = Message::builder()
            .from(self.from.clone())
            .to(destination.parse()?)
            .subject(&content.subject)
            .header(ContentType::TEXT_HTML)
            .body(content.body.clone())?;

        let request_body = serde_json::json!({
            "from": self.from.to_string(),
            "to": destination,
            "subject": content.subject,
        });
        let mut response = SendResponse {
            request_body: Some(truncate_string(&request_body.to_string(), MAX_BODY_LENGTH)),
            ..Default::default()
        };

        let mut last_err = None;
        for attempt in 0..MAX_ATTEMPTS {
            match self.transport.send(email.clone()).await {
                Ok(reply) => {
                    response.retry_count = attempt;
                    response.response_body = Some(reply.message().collect::<Vec<_>>().join(" "));
                    return Ok(response);
                }
                Err(e) => {
                    tracing::warn!(
                        attempt = attempt + 1,
                        id = %self.instance_id,
                        error = %e,
                        "SMTP send failed"
                    );
                    last_err = Some(e);
                    if attempt + 1 < MAX_ATTEMPTS {
                        tokio::time::sleep(Duration::from_millis(100 * 2u64.pow(attempt))).await;
                    }
                }
            }
        }

        match last_err {
            Some(e) => Err(anyhow::anyhow!("SMTP delivery failed after {MAX_ATTEMPTS} attempts: {e}")),
            None => Err(anyhow::anyhow!("SMTP delivery failed")),
        }
    }

    fn transport_type(&self) -> &str {
        "smtp"
    }

    fn instance_id(&self) -> &str {
        &self.instance_id
    }
}

// Plugin

#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
enum SmtpSecurity {
    /// Implicit TLS, usually port 465.
    Tls,
    #[default]
    Starttls,
    /// Plain text. Local relays and test servers only.
    None,
}

#[derive(Deserialize)]
struct SmtpConfig {
    smtp_host: String,
    #[serde(default = "default_smtp_port")]
    smtp_port: u16,
    smtp_username: Option<String>,
    smtp_password: Option<String>,
    from: String,
    #[serde(default)]
    security: SmtpSecurity,
    #[serde(default = "default_smtp_timeout_secs")]
    timeout_secs: u64,
}

fn default_smtp_port() -> u16 {
    587
}

fn default_smtp_timeout_secs() -> u64 {
    15
}

fn parse_config(config: &Value) -> Result<SmtpConfig> {
    let cfg: SmtpConfig = serde_json::from_value(config.clone())
        .map_err(|e| anyhow::anyhow!("Invalid smtp config: {e}"))?;
    if cfg.smtp_host.trim().is_empty() {
        anyhow::bail!("Invalid smtp config: smtp_host is empty");
    }
    cfg.from
        .parse::<Mailbox>()
        .map_err(|e| anyhow::anyhow!("Invalid smtp config: from '{}': {e}", cfg.from))?;
    Ok(cfg)
}

pub struct SmtpPlugin;

impl TransportPlugin for SmtpPlugin {
    fn name(&self) -> &str {
        "smtp"
    }

    fn channel(&self) -> Channel {
        Channel::Email
    }

    fn validate_config(&self, config: &Value) -> Result<()> {
        parse_config(config).map(|_| ())
    }

    fn create_transport(&self, instance_id: &str, config: &Value) -> Result<Box<dyn Transport>> {
        let cfg = parse_config(config)?;
        Ok(Box::new(SmtpTransport::new(instance_id, &cfg)?))
    }
}
