//! Persistence for messages and read-only access to the school directory.
//!
//! [`message_store::SqliteMessageStore`] holds message records together with
//! their delivery and read receipts. Receipts are appended with single
//! "insert if absent" statements, so concurrent delivery events for the same
//! message never overwrite each other. [`directory::SqliteDirectory`] serves
//! the student, class and actor lookups the notification subsystem consumes.

pub mod directory;
pub mod error;
pub mod message_store;


pub use directory::SqliteDirectory;
pub use error::{Result, StorageError};
pub use message_store::SqliteMessageStore;

use chrono::{DateTime, Utc};
use solfeo_common::types::{
    ActorRef, Channel, ClassDetail, Message, MessageStatus, MessageType, Recipient, StudentFilter,
};

/// Filter for staff-facing message listings.
#[derive(Debug, Clone, Default)]
pub struct MessageFilter {
    pub status: Option<MessageStatus>,
    pub message_type: Option<MessageType>,
    pub sender_id: Option<String>,
}

/// A page of one student's inbox.
#[derive(Debug, Clone)]
pub struct InboxQuery {
    pub recipient_id: String,
    pub unread_only: bool,
    pub limit: usize,
    pub offset: usize,
}

/// Durable store for [`Message`] records.
///
/// Implementations must be `Send + Sync`: the store is shared by HTTP
/// handlers and by in-flight notification fan-outs.
pub trait MessageStore: Send + Sync {
    /// Persists a new message, including any receipts it already carries.
    ///
    /// Rejects a `sent` message without `sent_at` and a draft that carries
    /// receipts.
    fn insert_message(&self, message: &Message) -> Result<()>;

    fn get_message(&self, id: &str) -> Result<Option<Message>>;

    /// Lists messages newest first.
    fn list_messages(&self, filter: &MessageFilter, limit: usize, offset: usize)
        -> Result<Vec<Message>>;

    fn count_messages(&self, filter: &MessageFilter) -> Result<u64>;

    /// Transitions a draft to `sent` if its version still equals
    /// `expected_version`. Returns the updated message.
    fn mark_sent(&self, id: &str, expected_version: i64, sent_at: DateTime<Utc>)
        -> Result<Message>;

    /// Records a delivery unless one exists for `(recipient_id, channel)`.
    /// Returns `true` when a receipt was added.
    fn append_delivery(
        &self,
        id: &str,
        recipient_id: &str,
        channel: Channel,
        delivered_at: DateTime<Utc>,
    ) -> Result<bool>;

    /// Records a read unless `recipient_id` already read the message.
    /// Returns `true` when a receipt was added.
    fn append_read(&self, id: &str, recipient_id: &str, read_at: DateTime<Utc>) -> Result<bool>;

    /// Deletes a draft. Sent messages are kept as audit trail.
    fn delete_draft(&self, id: &str) -> Result<()>;

    /// Sent messages delivered on the internal channel to one recipient,
    /// newest first.
    fn list_inbox(&self, query: &InboxQuery) -> Result<Vec<Message>>;

    fn count_unread(&self, recipient_id: &str) -> Result<u64>;
}

/// Student lookups.
pub trait StudentDirectory: Send + Sync {
    fn find_student(&self, id: &str) -> Result<Option<Recipient>>;

    /// Every active student, optionally narrowed by `filter`.
    fn find_active_students(&self, filter: Option<&StudentFilter>) -> Result<Vec<Recipient>>;
}

/// Class lookups.
pub trait ClassDirectory: Send + Sync {
    /// Loads a class with its roster populated, in roster order.
    fn find_class_with_roster(&self, id: &str) -> Result<Option<ClassDetail>>;
}

/// Staff/admin lookups.
pub trait ActorDirectory: Send + Sync {
    fn find_actor(&self, id: &str) -> Result<Option<ActorRef>>;

    /// Any admin, used as the system sender when no actor is supplied.
    fn find_any_admin(&self) -> Result<Option<ActorRef>>;
}
