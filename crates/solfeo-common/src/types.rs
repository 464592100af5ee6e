use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Maximum length of a message subject, in characters.
pub const MAX_SUBJECT_LEN: usize = 200;
/// Maximum length of a message body, in characters.
pub const MAX_BODY_LEN: usize = 2000;
/// Maximum length of a class cancellation reason, in characters.
pub const MAX_REASON_LEN: usize = 500;
/// Maximum length of a schedule label in a time change, in characters.
pub const MAX_TIME_LABEL_LEN: usize = 100;

/// A delivery mechanism for a message.
///
/// The declaration order is the fixed attempt order per recipient.
///
/// # Examples
///
/// ```
/// use solfeo_common::types::Channel;
///
/// let ch: Channel = "whatsapp".parse().unwrap();
/// assert_eq!(ch, Channel::Whatsapp);
/// assert_eq!(ch.to_string(), "whatsapp");
/// assert!("sms".parse::<Channel>().is_err());
/// ```
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, utoipa::ToSchema,
)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Internal,
    Email,
    Whatsapp,
}

impl Channel {
    pub const ALL: [Channel; 3] = [Channel::Internal, Channel::Email, Channel::Whatsapp];

    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Internal => "internal",
            Channel::Email => "email",
            Channel::Whatsapp => "whatsapp",
        }
    }

    /// Label used as the prefix of per-recipient error strings.
    pub fn label(&self) -> &'static str {
        match self {
            Channel::Internal => "Internal",
            Channel::Email => "Email",
            Channel::Whatsapp => "WhatsApp",
        }
    }
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Channel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "internal" => Ok(Channel::Internal),
            "email" => Ok(Channel::Email),
            "whatsapp" => Ok(Channel::Whatsapp),
            _ => Err(format!("unknown channel: {s}")),
        }
    }
}

macro_rules! string_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, utoipa::ToSchema)]
        #[serde(rename_all = "lowercase")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.to_lowercase().as_str() {
                    $($text => Ok($name::$variant),)+
                    _ => Err(format!("unknown {}: {}", stringify!($name), s)),
                }
            }
        }
    };
}

string_enum!(
    /// Kind of message, used for display and filtering only.
    MessageType {
        Notification => "notification",
        Announcement => "announcement",
        Reminder => "reminder",
        Event => "event",
        Info => "info",
    }
);

string_enum!(
    /// Message priority, ordered from lowest to highest.
    Priority {
        Low => "low",
        Medium => "medium",
        High => "high",
        Urgent => "urgent",
    }
);

string_enum!(
    /// Message lifecycle. `Sent` is terminal.
    MessageStatus {
        Draft => "draft",
        Sent => "sent",
    }
);

string_enum!(
    /// Role carried by an authenticated actor.
    ActorRole {
        Admin => "admin",
        Staff => "staff",
        Teacher => "teacher",
        Student => "student",
    }
);

string_enum!(
    /// Per-class status of a roster entry.
    RosterStatus {
        Active => "active",
        Inactive => "inactive",
    }
);

impl Default for MessageType {
    fn default() -> Self {
        MessageType::Notification
    }
}

impl Default for Priority {
    fn default() -> Self {
        Priority::Medium
    }
}

impl ActorRole {
    /// Staff-level roles may create, send and delete messages.
    pub fn is_staff(&self) -> bool {
        matches!(self, ActorRole::Admin | ActorRole::Staff)
    }
}

/// Optional narrowing of an `all_students` rule.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct StudentFilter {
    /// Only students playing this instrument (case-insensitive).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instrument: Option<String>,
    /// Only students at this level (case-insensitive).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,
}

/// Who a message is addressed to, expanded into recipients at send time.
///
/// # Examples
///
/// ```
/// use solfeo_common::types::RecipientRule;
///
/// let rule: RecipientRule =
///     serde_json::from_str(r#"{"kind":"specific_class","class_id":"c-1"}"#).unwrap();
/// assert_eq!(rule.kind(), "specific_class");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RecipientRule {
    SpecificStudent {
        student_id: String,
    },
    AllStudents {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        filters: Option<StudentFilter>,
    },
    SpecificClass {
        class_id: String,
    },
}

impl RecipientRule {
    pub fn kind(&self) -> &'static str {
        match self {
            RecipientRule::SpecificStudent { .. } => "specific_student",
            RecipientRule::AllStudents { .. } => "all_students",
            RecipientRule::SpecificClass { .. } => "specific_class",
        }
    }
}

/// Channels a message asks to be delivered on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct DeliveryChannels {
    #[serde(default = "default_true")]
    pub internal: bool,
    #[serde(default)]
    pub email: bool,
    #[serde(default)]
    pub whatsapp: bool,
}

fn default_true() -> bool {
    true
}

impl Default for DeliveryChannels {
    fn default() -> Self {
        Self {
            internal: true,
            email: false,
            whatsapp: false,
        }
    }
}

impl DeliveryChannels {
    pub fn all() -> Self {
        Self {
            internal: true,
            email: true,
            whatsapp: true,
        }
    }

    pub fn internal_only() -> Self {
        Self::default()
    }

    pub fn is_enabled(&self, channel: Channel) -> bool {
        match channel {
            Channel::Internal => self.internal,
            Channel::Email => self.email,
            Channel::Whatsapp => self.whatsapp,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct DeliveryReceipt {
    pub recipient_id: String,
    pub channel: Channel,
    pub delivered_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct ReadReceipt {
    pub recipient_id: String,
    pub read_at: DateTime<Utc>,
}

/// A message record with its delivery and read receipts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct Message {
    pub id: String,
    pub sender_id: String,
    pub recipient_rule: RecipientRule,
    pub subject: String,
    pub body: String,
    pub message_type: MessageType,
    pub priority: Priority,
    pub status: MessageStatus,
    pub delivery_channels: DeliveryChannels,
    pub scheduled_for: Option<DateTime<Utc>>,
    pub sent_at: Option<DateTime<Utc>>,
    pub delivered_to: Vec<DeliveryReceipt>,
    pub read_by: Vec<ReadReceipt>,
    /// Bumped on every mutation; used for conditional updates.
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Message {
    pub fn is_delivered(&self, recipient_id: &str, channel: Channel) -> bool {
        self.delivered_to
            .iter()
            .any(|d| d.recipient_id == recipient_id && d.channel == channel)
    }

    pub fn is_read_by(&self, recipient_id: &str) -> bool {
        self.read_by.iter().any(|r| r.recipient_id == recipient_id)
    }
}

/// Input for creating a draft message.
#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct NewMessage {
    pub recipient_rule: RecipientRule,
    pub subject: String,
    pub body: String,
    #[serde(default)]
    pub message_type: MessageType,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub delivery_channels: DeliveryChannels,
    #[serde(default)]
    pub scheduled_for: Option<DateTime<Utc>>,
}

/// A student as seen by the notification subsystem. Read-only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct Recipient {
    pub id: String,
    pub display_name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub instrument: Option<String>,
    #[serde(default)]
    pub level: Option<String>,
    #[serde(default = "default_true")]
    pub active: bool,
}

impl Recipient {
    /// Email address, if present and non-blank.
    pub fn email_address(&self) -> Option<&str> {
        self.email.as_deref().map(str::trim).filter(|s| !s.is_empty())
    }

    /// Phone number, if present and non-blank.
    pub fn phone_number(&self) -> Option<&str> {
        self.phone.as_deref().map(str::trim).filter(|s| !s.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct ScheduleSlot {
    /// Day label as stored by the school (e.g. "Lunes").
    pub day: String,
    /// "HH:MM"
    pub start: String,
    /// "HH:MM"
    pub end: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RosterEntry {
    /// `None` when the roster references a student that no longer resolves.
    pub student: Option<Recipient>,
    pub status: RosterStatus,
}

/// A class with its populated roster, as returned by the class store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassDetail {
    pub id: String,
    pub title: String,
    pub schedule: Vec<ScheduleSlot>,
    pub room: Option<String>,
    pub teacher_id: Option<String>,
    pub roster: Vec<RosterEntry>,
}

impl ClassDetail {
    /// Formats the schedule as `"Lunes 10:00-11:00, Miércoles 10:00-11:00"`.
    ///
    /// # Examples
    ///
    /// ```
    /// use solfeo_common::types::{ClassDetail, ScheduleSlot};
    ///
    /// let class = ClassDetail {
    ///     id: "c1".into(),
    ///     title: "Guitar 101".into(),
    ///     schedule: vec![ScheduleSlot { day: "Lunes".into(), start: "10:00".into(), end: "11:00".into() }],
    ///     room: None,
    ///     teacher_id: None,
    ///     roster: vec![],
    /// };
    /// assert_eq!(class.schedule_label(), "Lunes 10:00-11:00");
    /// ```
    pub fn schedule_label(&self) -> String {
        self.schedule
            .iter()
            .map(|s| format!("{} {}-{}", s.day, s.start, s.end))
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Students of active roster entries, in roster order.
    pub fn active_students(&self) -> impl Iterator<Item = &Recipient> {
        self.roster
            .iter()
            .filter(|e| e.status == RosterStatus::Active)
            .filter_map(|e| e.student.as_ref())
    }
}

/// A reference to an authenticated actor (staff, admin, teacher).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct ActorRef {
    pub id: String,
    pub display_name: String,
    pub role: ActorRole,
}
