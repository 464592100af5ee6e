use crate::error::Result;
use chrono::Utc;
use solfeo_common::types::Channel;
use solfeo_storage::MessageStore;
use std::sync::Arc;

/// Idempotent delivery and read markers on stored messages.
///
/// Each call is a single atomic "append if absent" in the store, so
/// concurrent markers for different recipients of one message never lose
/// each other's receipts.
#[derive(Clone)]
pub struct DeliveryTracker {
    store: Arc<dyn MessageStore>,
}

impl DeliveryTracker {
    pub fn new(store: Arc<dyn MessageStore>) -> Self {
        Self { store }
    }

    /// Records a delivery on `channel`. Returns `false` when one was already
    /// recorded; the first timestamp is kept.
    pub fn mark_delivered(&self, message_id: &str, recipient_id: &str, channel: Channel) -> Result<bool> {
        let added = self
            .store
            .append_delivery(message_id, recipient_id, channel, Utc::now())?;
        if !added {
            tracing::debug!(
                message_id,
                recipient_id,
                channel = %channel,
                "Delivery already recorded"
            );
        }
        Ok(added)
    }

    /// Records that `recipient_id` read the message. Returns `false` when it
    /// was already marked read.
    pub fn mark_read(&self, message_id: &str, recipient_id: &str) -> Result<bool> {
        let added = self.store.append_read(message_id, recipient_id, Utc::now())?;
        if !added {
            tracing::debug!(message_id, recipient_id, "Read already recorded");
        }
        Ok(added)
    }
}
