//! Multi-channel notification fan-out for the school.
//!
//! A message is rendered per recipient by the [`template::Templater`] and
//! delivered on up to three channels by the [`dispatcher::Dispatcher`]:
//! the internal inbox (a receipt in the message store), email and WhatsApp.
//! Email and WhatsApp go through a [`chain::TransportChain`] of pluggable
//! [`Transport`]s, tried in order until one succeeds.
//!
//! The [`orchestrator::Orchestrator`] turns class events (cancellation,
//! schedule change) into notices plus an audit message; the
//! [`service::MessageService`] exposes the message lifecycle to the server.

pub mod chain;
pub mod channels;
pub mod content;
pub mod dispatcher;
pub mod error;
pub mod orchestrator;
pub mod plugin;
pub mod resolver;
pub mod service;
pub mod template;
pub mod tracker;
pub mod utils;


use anyhow::Result;
use async_trait::async_trait;

/// Content handed to a transport, already rendered for its channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedContent {
    pub subject: String,
    /// HTML for email transports, plain text with `*bold*` markup for chat.
    pub body: String,
}

/// Outcome details of a successful transport call.
#[derive(Debug, Clone, Default)]
pub struct SendResponse {
    pub retry_count: u32,
    /// Message id assigned by the provider, when it returns one.
    pub provider_message_id: Option<String>,
    pub http_status: Option<u16>,
    pub request_body: Option<String>,
    pub response_body: Option<String>,
}

/// An outbound delivery mechanism (SMTP relay, WhatsApp bridge, ...).
///
/// Implementations are created by the matching [`plugin::TransportPlugin`]
/// and grouped per channel into a [`chain::TransportChain`].
#[async_trait]
pub trait Transport: Send + Sync {
    /// Delivers `content` to `destination` (an email address or a normalised
    /// phone number).
    ///
    /// # Errors
    ///
    /// Returns an error if the provider rejected the message or could not be
    /// reached.
    async fn send(&self, destination: &str, content: &RenderedContent) -> Result<SendResponse>;

    /// Plugin type name (e.g. `"smtp"`, `"whatsapp_web"`).
    fn transport_type(&self) -> &str;

    /// Configured instance id, used in logs.
    fn instance_id(&self) -> &str;
}
