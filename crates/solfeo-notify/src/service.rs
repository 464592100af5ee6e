use crate::content::MessageContent;
use crate::dispatcher::{Dispatcher, OutcomeReport};
use crate::error::{NotifyError, Result};
use crate::resolver::RecipientResolver;
use crate::tracker::DeliveryTracker;
use chrono::Utc;
use serde::Serialize;
use solfeo_common::types::{
    Channel, Message, MessageStatus, NewMessage, RecipientRule, MAX_BODY_LEN, MAX_SUBJECT_LEN,
};
use solfeo_storage::{ActorDirectory, InboxQuery, MessageFilter, MessageStore, StorageError};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub const DEFAULT_INBOX_LIMIT: usize = 50;
pub const MAX_INBOX_LIMIT: usize = 200;

/// Paging for a student's inbox.
#[derive(Debug, Clone, Copy, Default)]
pub struct InboxOptions {
    pub unread_only: bool,
    pub limit: Option<usize>,
    pub skip: Option<usize>,
}

/// A sent message together with its fan-out outcome.
#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
pub struct SendOutcome {
    pub message: Message,
    pub results: OutcomeReport,
}

/// Message lifecycle: create drafts, send them, read inboxes.
pub struct MessageService {
    store: Arc<dyn MessageStore>,
    actors: Arc<dyn ActorDirectory>,
    resolver: Arc<RecipientResolver>,
    dispatcher: Arc<Dispatcher>,
    tracker: DeliveryTracker,
}

impl MessageService {
    pub fn new(
        store: Arc<dyn MessageStore>,
        actors: Arc<dyn ActorDirectory>,
        resolver: Arc<RecipientResolver>,
        dispatcher: Arc<Dispatcher>,
    ) -> Self {
        let tracker = DeliveryTracker::new(store.clone());
        Self {
            store,
            actors,
            resolver,
            dispatcher,
            tracker,
        }
    }

    /// Validates `data` and stores it as a draft from `sender_id`.
    pub fn create_message(&self, data: NewMessage, sender_id: &str) -> Result<Message> {
        let subject = data.subject.trim().to_string();
        let body = data.body.trim().to_string();
        validate_length("subject", &subject, MAX_SUBJECT_LEN)?;
        validate_length("body", &body, MAX_BODY_LEN)?;
        validate_rule(&data.recipient_rule)?;
        if !data.delivery_channels.internal && !data.delivery_channels.email && !data.delivery_channels.whatsapp {
            return Err(NotifyError::InvalidInput(
                "at least one delivery channel is required".to_string(),
            ));
        }
        let now = Utc::now();
        if let Some(at) = data.scheduled_for {
            if at <= now {
                return Err(NotifyError::InvalidInput(
                    "scheduled_for must be in the future".to_string(),
                ));
            }
        }
        if self.actors.find_actor(sender_id)?.is_none() {
            return Err(NotifyError::InvalidInput(format!("unknown sender {sender_id}")));
        }

        let message = Message {
            id: solfeo_common::id::next_id(),
            sender_id: sender_id.to_string(),
            recipient_rule: data.recipient_rule,
            subject,
            body,
            message_type: data.message_type,
            priority: data.priority,
            status: MessageStatus::Draft,
            delivery_channels: data.delivery_channels,
            scheduled_for: data.scheduled_for,
            sent_at: None,
            delivered_to: Vec::new(),
            read_by: Vec::new(),
            version: 0,
            created_at: now,
            updated_at: now,
        };
        self.store.insert_message(&message)?;
        tracing::info!(message_id = %message.id, sender_id, rule = message.recipient_rule.kind(), "Draft created");
        Ok(message)
    }

    /// Sends a draft: resolves recipients, marks it sent, then delivers to
    /// each recipient in order.
    ///
    /// Resolution happens before the transition, so a resolution failure
    /// leaves the message in draft.
    pub async fn send_message(&self, message_id: &str, cancel: &CancellationToken) -> Result<SendOutcome> {
        let draft = self.get_message(message_id)?;
        if draft.status != MessageStatus::Draft {
            return Err(NotifyError::InvalidState(format!(
                "message {message_id} was already sent"
            )));
        }
        let recipients = self.resolver.resolve(&draft.recipient_rule)?;

        let sent = self.store.mark_sent(message_id, draft.version, Utc::now())?;
        tracing::info!(message_id, recipients = recipients.len(), "Message sent, delivering");

        let content = MessageContent::uniform(&sent.subject, &sent.body);
        let results = self
            .dispatcher
            .fan_out(&sent, &content, &recipients, cancel)
            .await?;
        let message = self.get_message(message_id)?;
        Ok(SendOutcome { message, results })
    }

    pub fn get_message(&self, message_id: &str) -> Result<Message> {
        self.store
            .get_message(message_id)?
            .ok_or_else(|| NotifyError::NotFound {
                entity: "message",
                id: message_id.to_string(),
            })
    }

    /// Staff listing, newest first. Returns the page and the total count.
    pub fn list_messages(&self, filter: &MessageFilter, limit: usize, offset: usize) -> Result<(Vec<Message>, u64)> {
        let limit = limit.clamp(1, MAX_INBOX_LIMIT);
        let items = self.store.list_messages(filter, limit, offset)?;
        let total = self.store.count_messages(filter)?;
        Ok((items, total))
    }

    /// Deletes a draft. Sent messages are kept.
    pub fn delete_message(&self, message_id: &str) -> Result<()> {
        match self.store.delete_draft(message_id) {
            Ok(()) => {
                tracing::info!(message_id, "Draft deleted");
                Ok(())
            }
            Err(StorageError::NotFound { .. }) => Err(NotifyError::NotFound {
                entity: "message",
                id: message_id.to_string(),
            }),
            Err(StorageError::InvalidState { reason, .. }) => Err(NotifyError::InvalidState(format!(
                "message {message_id}: {reason}"
            ))),
            Err(e) => Err(e.into()),
        }
    }

    /// Sent messages in the student's internal inbox, newest first, with
    /// placeholders filled in for that student.
    pub fn get_student_messages(&self, student_id: &str, options: InboxOptions) -> Result<Vec<Message>> {
        let limit = options
            .limit
            .unwrap_or(DEFAULT_INBOX_LIMIT)
            .clamp(1, MAX_INBOX_LIMIT);
        let query = InboxQuery {
            recipient_id: student_id.to_string(),
            unread_only: options.unread_only,
            limit,
            offset: options.skip.unwrap_or(0),
        };
        let mut messages = self.store.list_inbox(&query)?;

        if let Some(student) = self.resolver.find_student(student_id)? {
            let templater = self.dispatcher.templater();
            for message in &mut messages {
                let rendered = templater.render(&message.subject, &message.body, &student, Channel::Internal);
                message.subject = rendered.subject;
                message.body = rendered.body;
            }
        }
        Ok(messages)
    }

    /// Marks a message read by a student it was delivered to.
    pub fn mark_as_read(&self, message_id: &str, student_id: &str) -> Result<Message> {
        let message = self.get_message(message_id)?;
        if !message.delivered_to.iter().any(|d| d.recipient_id == student_id) {
            return Err(NotifyError::NotFound {
                entity: "message",
                id: message_id.to_string(),
            });
        }
        if self.tracker.mark_read(message_id, student_id)? {
            tracing::info!(message_id, student_id, "Marked as read");
        }
        self.get_message(message_id)
    }

    pub fn unread_count(&self, student_id: &str) -> Result<u64> {
        Ok(self.store.count_unread(student_id)?)
    }
}

fn validate_length(field: &str, value: &str, max: usize) -> Result<()> {
    if value.is_empty() {
        return Err(NotifyError::InvalidInput(format!("{field} is required")));
    }
    let len = value.chars().count();
    if len > max {
        return Err(NotifyError::InvalidInput(format!(
            "{field} is {len} characters long (max {max})"
        )));
    }
    Ok(())
}

fn validate_rule(rule: &RecipientRule) -> Result<()> {
    let id = match rule {
        RecipientRule::SpecificStudent { student_id } => student_id,
        RecipientRule::SpecificClass { class_id } => class_id,
        RecipientRule::AllStudents { .. } => return Ok(()),
    };
    if id.trim().is_empty() {
        return Err(NotifyError::InvalidInput(format!(
            "{} rule needs an id",
            rule.kind()
        )));
    }
    Ok(())
}
