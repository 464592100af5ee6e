use crate::error::{NotifyError, Result};
use crate::{RenderedContent, SendResponse, Transport};
use solfeo_common::types::Channel;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Result of a chain delivery that succeeded on one of its transports.
#[derive(Debug)]
pub struct ChainDelivery {
    pub instance_id: String,
    /// 1-based position of the transport that delivered.
    pub attempts: usize,
    pub response: SendResponse,
}

/// Ordered fallback list of transports for one channel.
///
/// Transports are tried in order; the first success wins and the last
/// failure is reported. Every attempt runs under `timeout` and is abandoned
/// as soon as the cancellation token fires.
pub struct TransportChain {
    channel: Channel,
    transports: Vec<Arc<dyn Transport>>,
    timeout: Duration,
}

impl TransportChain {
    pub fn new(channel: Channel, timeout: Duration) -> Self {
        Self {
            channel,
            transports: Vec::new(),
            timeout,
        }
    }

    pub fn with_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.push(transport);
        self
    }

    pub fn push(&mut self, transport: Arc<dyn Transport>) {
        self.transports.push(transport);
    }

    pub fn channel(&self) -> Channel {
        self.channel
    }

    pub fn is_empty(&self) -> bool {
        self.transports.is_empty()
    }

    pub fn len(&self) -> usize {
        self.transports.len()
    }

    pub fn instance_ids(&self) -> Vec<&str> {
        self.transports.iter().map(|t| t.instance_id()).collect()
    }

    /// Sends through the first transport that accepts the message.
    ///
    /// # Errors
    ///
    /// [`NotifyError::Cancelled`] when `cancel` fires, otherwise
    /// [`NotifyError::Delivery`] with the last transport's failure.
    pub async fn send(
        &self,
        destination: &str,
        content: &RenderedContent,
        cancel: &CancellationToken,
    ) -> Result<ChainDelivery> {
        let mut last_error = String::from("no transport configured");

        for (index, transport) in self.transports.iter().enumerate() {
            let attempt = tokio::time::timeout(self.timeout, transport.send(destination, content));
            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(NotifyError::Cancelled),
                outcome = attempt => outcome,
            };

            match outcome {
                Ok(Ok(response)) => {
                    return Ok(ChainDelivery {
                        instance_id: transport.instance_id().to_string(),
                        attempts: index + 1,
                        response,
                    });
                }
                Ok(Err(e)) => last_error = format!("{e:#}"),
                Err(_) => {
                    last_error = format!("timed out after {}s", self.timeout.as_secs_f32())
                }
            }

            if index + 1 < self.transports.len() {
                tracing::warn!(
                    channel = %self.channel,
                    transport = transport.transport_type(),
                    id = transport.instance_id(),
                    error = %last_error,
                    "Transport failed, falling back to next transport"
                );
            }
        }

        Err(NotifyError::Delivery(last_error))
    }
}
