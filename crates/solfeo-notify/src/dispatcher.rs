use crate::chain::TransportChain;
use crate::content::MessageContent;
use crate::error::{NotifyError, Result};
use crate::plugin::TransportChains;
use crate::template::Templater;
use crate::tracker::DeliveryTracker;
use crate::utils::normalize_phone;
use crate::RenderedContent;
use serde::{Deserialize, Serialize};
use solfeo_common::types::{Channel, Message, Recipient};
use tokio_util::sync::CancellationToken;

/// Per-channel result for one recipient.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ChannelStatus {
    Sent,
    Failed,
    /// Not requested, or no contact data for the channel.
    Skipped,
}

/// What happened for one recipient across all channels.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct RecipientOutcome {
    pub recipient_id: String,
    pub name: String,
    pub internal: ChannelStatus,
    pub email: ChannelStatus,
    pub whatsapp: ChannelStatus,
    /// `"<Channel>: <reason>"` per failed channel.
    pub errors: Vec<String>,
}

impl RecipientOutcome {
    fn new(recipient: &Recipient) -> Self {
        Self {
            recipient_id: recipient.id.clone(),
            name: recipient.display_name.clone(),
            internal: ChannelStatus::Skipped,
            email: ChannelStatus::Skipped,
            whatsapp: ChannelStatus::Skipped,
            errors: Vec::new(),
        }
    }

    pub fn status(&self, channel: Channel) -> ChannelStatus {
        match channel {
            Channel::Internal => self.internal,
            Channel::Email => self.email,
            Channel::Whatsapp => self.whatsapp,
        }
    }

    fn set(&mut self, channel: Channel, status: ChannelStatus) {
        match channel {
            Channel::Internal => self.internal = status,
            Channel::Email => self.email = status,
            Channel::Whatsapp => self.whatsapp = status,
        }
    }

    fn fail(&mut self, channel: Channel, reason: impl std::fmt::Display) {
        self.set(channel, ChannelStatus::Failed);
        self.errors.push(format!("{}: {reason}", channel.label()));
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct ChannelTally {
    #[serde(rename = "enviados")]
    pub sent: u32,
    #[serde(rename = "errores")]
    pub failed: u32,
}

/// Aggregate outcome of a fan-out.
///
/// Skipped channels count in neither `enviados` nor `errores`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct OutcomeReport {
    #[serde(rename = "internos")]
    pub internal: ChannelTally,
    pub email: ChannelTally,
    pub whatsapp: ChannelTally,
    /// One entry per recipient, in processing order.
    #[serde(rename = "detalles")]
    pub details: Vec<RecipientOutcome>,
}

impl OutcomeReport {
    pub fn tally(&self, channel: Channel) -> ChannelTally {
        match channel {
            Channel::Internal => self.internal,
            Channel::Email => self.email,
            Channel::Whatsapp => self.whatsapp,
        }
    }

    pub fn record(&mut self, outcome: RecipientOutcome) {
        for channel in Channel::ALL {
            let tally = match channel {
                Channel::Internal => &mut self.internal,
                Channel::Email => &mut self.email,
                Channel::Whatsapp => &mut self.whatsapp,
            };
            match outcome.status(channel) {
                ChannelStatus::Sent => tally.sent += 1,
                ChannelStatus::Failed => tally.failed += 1,
                ChannelStatus::Skipped => {}
            }
        }
        self.details.push(outcome);
    }

    pub fn total_failed(&self) -> u32 {
        self.internal.failed + self.email.failed + self.whatsapp.failed
    }
}

/// Delivers a message to recipients on every enabled channel.
///
/// Channels are attempted in the fixed order internal, email, whatsapp. A
/// failure on one channel is recorded and never stops the others.
pub struct Dispatcher {
    tracker: DeliveryTracker,
    templater: Templater,
    email: TransportChain,
    whatsapp: TransportChain,
    default_country_code: Option<String>,
}

impl Dispatcher {
    pub fn new(
        tracker: DeliveryTracker,
        templater: Templater,
        chains: TransportChains,
        default_country_code: Option<String>,
    ) -> Self {
        Self {
            tracker,
            templater,
            email: chains.email,
            whatsapp: chains.whatsapp,
            default_country_code,
        }
    }

    pub fn templater(&self) -> &Templater {
        &self.templater
    }

    /// Delivers `message` to one recipient.
    ///
    /// # Errors
    ///
    /// Only [`NotifyError::Cancelled`]; channel failures land in the outcome.
    pub async fn deliver_to_recipient(
        &self,
        message: &Message,
        content: &MessageContent,
        recipient: &Recipient,
        cancel: &CancellationToken,
    ) -> Result<RecipientOutcome> {
        let mut outcome = RecipientOutcome::new(recipient);
        let channels = message.delivery_channels;

        if channels.internal {
            match self
                .tracker
                .mark_delivered(&message.id, &recipient.id, Channel::Internal)
            {
                Ok(_) => outcome.set(Channel::Internal, ChannelStatus::Sent),
                Err(e) => {
                    tracing::error!(
                        message_id = %message.id,
                        recipient_id = %recipient.id,
                        error = %e,
                        "Internal delivery failed"
                    );
                    outcome.fail(Channel::Internal, e);
                }
            }
        }

        if channels.email {
            if let Some(address) = recipient.email_address() {
                self.send_external(&self.email, message, content, recipient, address, &mut outcome, cancel)
                    .await?;
            }
        }

        if channels.whatsapp {
            if let Some(raw_phone) = recipient.phone_number() {
                match normalize_phone(raw_phone, self.default_country_code.as_deref()) {
                    Some(phone) => {
                        self.send_external(&self.whatsapp, message, content, recipient, &phone, &mut outcome, cancel)
                            .await?;
                    }
                    None => {
                        tracing::error!(
                            message_id = %message.id,
                            recipient_id = %recipient.id,
                            channel = %Channel::Whatsapp,
                            "Unusable phone number"
                        );
                        outcome.fail(Channel::Whatsapp, "invalid phone number");
                    }
                }
            }
        }

        Ok(outcome)
    }

    /// Sends one external channel through `chain`; the channel recorded in
    /// `outcome` is the chain's own.
    #[allow(clippy::too_many_arguments)]
    async fn send_external(
        &self,
        chain: &TransportChain,
        message: &Message,
        content: &MessageContent,
        recipient: &Recipient,
        destination: &str,
        outcome: &mut RecipientOutcome,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let channel = chain.channel();
        let rendered = RenderedContent {
            subject: self.templater.render_subject(&content.subject, recipient),
            body: self.templater.render_content(content, recipient, channel),
        };

        match chain.send(destination, &rendered, cancel).await {
            Ok(delivery) => {
                let response = &delivery.response;
                tracing::info!(
                    message_id = %message.id,
                    recipient_id = %recipient.id,
                    channel = %channel,
                    transport = %delivery.instance_id,
                    attempts = delivery.attempts,
                    retry_count = response.retry_count,
                    http_status = response.http_status,
                    provider_message_id = response.provider_message_id.as_deref().unwrap_or(""),
                    "Delivered"
                );
                tracing::debug!(
                    message_id = %message.id,
                    transport = %delivery.instance_id,
                    request = response.request_body.as_deref().unwrap_or(""),
                    response = response.response_body.as_deref().unwrap_or(""),
                    "Transport exchange"
                );
                outcome.set(channel, ChannelStatus::Sent);
                if let Err(e) = self.tracker.mark_delivered(&message.id, &recipient.id, channel) {
                    tracing::warn!(
                        message_id = %message.id,
                        recipient_id = %recipient.id,
                        channel = %channel,
                        error = %e,
                        "Delivered but the receipt could not be stored"
                    );
                }
                Ok(())
            }
            Err(NotifyError::Cancelled) => Err(NotifyError::Cancelled),
            Err(e) => {
                tracing::error!(
                    message_id = %message.id,
                    recipient_id = %recipient.id,
                    channel = %channel,
                    error = %e,
                    "Delivery failed"
                );
                outcome.fail(channel, e);
                Ok(())
            }
        }
    }

    /// Delivers to every recipient sequentially, in the given order.
    pub async fn fan_out(
        &self,
        message: &Message,
        content: &MessageContent,
        recipients: &[Recipient],
        cancel: &CancellationToken,
    ) -> Result<OutcomeReport> {
        let mut report = OutcomeReport::default();
        for recipient in recipients {
            if cancel.is_cancelled() {
                return Err(NotifyError::Cancelled);
            }
            let outcome = self
                .deliver_to_recipient(message, content, recipient, cancel)
                .await?;
            report.record(outcome);
        }
        tracing::info!(
            message_id = %message.id,
            recipients = recipients.len(),
            internal_sent = report.internal.sent,
            email_sent = report.email.sent,
            whatsapp_sent = report.whatsapp.sent,
            failed = report.total_failed(),
            "Fan-out finished"
        );
        Ok(report)
    }
}
