use crate::content::{ClassEvent, ContentBuilder};
use crate::dispatcher::{Dispatcher, OutcomeReport};
use crate::error::{NotifyError, Result};
use crate::resolver::RecipientResolver;
use crate::tracker::DeliveryTracker;
use chrono::{Local, NaiveDate, Utc};
use serde::Serialize;
use solfeo_common::types::{
    ActorRef, ActorRole, Channel, ClassDetail, DeliveryChannels, Message, MessageStatus,
    MessageType, Priority, Recipient, RecipientRule, MAX_REASON_LEN, MAX_TIME_LABEL_LEN,
};
use solfeo_storage::{ActorDirectory, MessageStore};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Sender id used when neither an actor nor any admin is known.
pub const SYSTEM_SENDER_ID: &str = "system";

/// JSON result of a class event notification.
#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
pub struct NotificationResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub results: Option<OutcomeReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<Result<OutcomeReport>> for NotificationResponse {
    fn from(result: Result<OutcomeReport>) -> Self {
        match result {
            Ok(report) => Self {
                success: true,
                results: Some(report),
                error: None,
            },
            Err(e) => Self {
                success: false,
                results: None,
                error: Some(e.to_string()),
            },
        }
    }
}

/// Entry points for class events.
///
/// Each run loads the class, persists one notice addressed to the class,
/// delivers it to every active roster entry in roster order and, when the
/// class has a teacher, records an audit message with the outcome.
pub struct Orchestrator {
    resolver: Arc<RecipientResolver>,
    dispatcher: Arc<Dispatcher>,
    store: Arc<dyn MessageStore>,
    actors: Arc<dyn ActorDirectory>,
    content: ContentBuilder,
    notice_channels: DeliveryChannels,
}

impl Orchestrator {
    pub fn new(
        resolver: Arc<RecipientResolver>,
        dispatcher: Arc<Dispatcher>,
        store: Arc<dyn MessageStore>,
        actors: Arc<dyn ActorDirectory>,
        content: ContentBuilder,
        notice_channels: DeliveryChannels,
    ) -> Self {
        Self {
            resolver,
            dispatcher,
            store,
            actors,
            content,
            notice_channels,
        }
    }

    pub async fn notify_class_cancellation(
        &self,
        class_id: &str,
        reason: Option<&str>,
        actor_id: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<OutcomeReport> {
        if let Some(reason) = reason {
            check_len("reason", reason.trim(), MAX_REASON_LEN)?;
        }
        let event = ClassEvent::Cancelled {
            reason: reason.map(str::to_string),
        };
        self.run(class_id, event, actor_id, cancel).await
    }

    pub async fn notify_class_time_change(
        &self,
        class_id: &str,
        old_time: &str,
        new_time: &str,
        actor_id: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<OutcomeReport> {
        if old_time.trim().is_empty() || new_time.trim().is_empty() {
            return Err(NotifyError::InvalidInput(
                "old_time and new_time are required".to_string(),
            ));
        }
        check_len("old_time", old_time.trim(), MAX_TIME_LABEL_LEN)?;
        check_len("new_time", new_time.trim(), MAX_TIME_LABEL_LEN)?;
        let event = ClassEvent::TimeChanged {
            old_time: old_time.trim().to_string(),
            new_time: new_time.trim().to_string(),
        };
        self.run(class_id, event, actor_id, cancel).await
    }

    async fn run(
        &self,
        class_id: &str,
        event: ClassEvent,
        actor_id: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<OutcomeReport> {
        let class = self.resolver.load_class(class_id)?;
        let sender = self.resolve_sender(actor_id);
        let students: Vec<Recipient> = class.active_students().cloned().collect();
        tracing::info!(
            class_id,
            event = event.kind(),
            students = students.len(),
            sender = %sender.id,
            "Notifying class event"
        );

        let content = self.content.class_notice(&class, &event, today());
        let notice = self.new_sent_message(
            &sender.id,
            RecipientRule::SpecificClass {
                class_id: class.id.clone(),
            },
            &content.subject,
            &content.internal,
            MessageType::Notification,
            Priority::High,
            self.notice_channels,
        );
        // Still delivered on external channels; internal receipts then fail
        // per recipient.
        if let Err(e) = self.store.insert_message(&notice) {
            tracing::error!(class_id, error = %e, "Failed to persist class notice");
        }

        let report = self
            .dispatcher
            .fan_out(&notice, &content, &students, cancel)
            .await?;

        if class.teacher_id.is_some() {
            self.record_audit(&class, &event, &sender, &report);
        }

        Ok(report)
    }

    /// Actor given by the caller, else any admin, else the system sender.
    fn resolve_sender(&self, actor_id: Option<&str>) -> ActorRef {
        if let Some(id) = actor_id {
            match self.actors.find_actor(id) {
                Ok(Some(actor)) => return actor,
                Ok(None) => {
                    tracing::warn!(actor_id = id, "Unknown actor, using id as sender");
                    return ActorRef {
                        id: id.to_string(),
                        display_name: id.to_string(),
                        role: ActorRole::Staff,
                    };
                }
                Err(e) => tracing::warn!(actor_id = id, error = %e, "Actor lookup failed"),
            }
        }
        match self.actors.find_any_admin() {
            Ok(Some(admin)) => admin,
            Ok(None) => {
                tracing::warn!("No admin found, using system sender");
                system_sender()
            }
            Err(e) => {
                tracing::warn!(error = %e, "Admin lookup failed, using system sender");
                system_sender()
            }
        }
    }

    /// Persists the audit message and hands its internal delivery to a
    /// background task. Failures are logged only.
    fn record_audit(&self, class: &ClassDetail, event: &ClassEvent, sender: &ActorRef, report: &OutcomeReport) {
        let (subject, body) = self.content.audit(class, event, &sender.display_name, report);
        let audit = self.new_sent_message(
            &sender.id,
            RecipientRule::AllStudents { filters: None },
            &subject,
            &body,
            MessageType::Info,
            Priority::Low,
            DeliveryChannels::internal_only(),
        );
        if let Err(e) = self.store.insert_message(&audit) {
            tracing::error!(class_id = %class.id, error = %e, "Failed to persist audit message");
            return;
        }

        // Audit messages are for staff: they land in the teacher's and the
        // sender's inbox, never in students'.
        let mut readers: Vec<String> = class.teacher_id.iter().cloned().collect();
        if sender.id != SYSTEM_SENDER_ID && !readers.contains(&sender.id) {
            readers.push(sender.id.clone());
        }
        let tracker = DeliveryTracker::new(self.store.clone());
        let audit_id = audit.id.clone();
        tokio::spawn(async move {
            for reader in readers {
                if let Err(e) = tracker.mark_delivered(&audit_id, &reader, Channel::Internal) {
                    tracing::error!(
                        message_id = %audit_id,
                        recipient_id = %reader,
                        error = %e,
                        "Audit delivery failed"
                    );
                }
            }
        });
        tracing::info!(message_id = %audit.id, class_id = %class.id, "Audit message recorded");
    }

    #[allow(clippy::too_many_arguments)]
    fn new_sent_message(
        &self,
        sender_id: &str,
        recipient_rule: RecipientRule,
        subject: &str,
        body: &str,
        message_type: MessageType,
        priority: Priority,
        delivery_channels: DeliveryChannels,
    ) -> Message {
        let now = Utc::now();
        Message {
            id: solfeo_common::id::next_id(),
            sender_id: sender_id.to_string(),
            recipient_rule,
            subject: subject.to_string(),
            body: body.to_string(),
            message_type,
            priority,
            status: MessageStatus::Sent,
            delivery_channels,
            scheduled_for: None,
            sent_at: Some(now),
            delivered_to: Vec::new(),
            read_by: Vec::new(),
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }
}

fn check_len(field: &str, value: &str, max: usize) -> Result<()> {
    let len = value.chars().count();
    if len > max {
        return Err(NotifyError::InvalidInput(format!(
            "{field} is {len} characters long (max {max})"
        )));
    }
    Ok(())
}

fn system_sender() -> ActorRef {
    ActorRef {
        id: SYSTEM_SENDER_ID.to_string(),
        display_name: SYSTEM_SENDER_ID.to_string(),
        role: ActorRole::Admin,
    }
}

fn today() -> NaiveDate {
    Local::now().date_naive()
}
