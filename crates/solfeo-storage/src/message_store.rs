use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension};
use solfeo_common::types::{
    Channel, DeliveryChannels, DeliveryReceipt, Message, MessageStatus, ReadReceipt, RecipientRule,
    MAX_BODY_LEN, MAX_SUBJECT_LEN,
};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard};

use crate::error::{Result, StorageError};
use crate::{InboxQuery, MessageFilter, MessageStore};

const MESSAGES_SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS messages (
    id TEXT PRIMARY KEY,
    sender_id TEXT NOT NULL,
    recipient_rule TEXT NOT NULL,
    rule_kind TEXT NOT NULL,
    subject TEXT NOT NULL,
    body TEXT NOT NULL,
    message_type TEXT NOT NULL,
    priority TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'draft',
    channel_internal INTEGER NOT NULL DEFAULT 1,
    channel_email INTEGER NOT NULL DEFAULT 0,
    channel_whatsapp INTEGER NOT NULL DEFAULT 0,
    scheduled_for INTEGER,
    sent_at INTEGER,
    version INTEGER NOT NULL DEFAULT 0,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_messages_status ON messages(status);
CREATE INDEX IF NOT EXISTS idx_messages_sender ON messages(sender_id);
CREATE INDEX IF NOT EXISTS idx_messages_sent_at ON messages(sent_at);
";

const DELIVERIES_SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS message_deliveries (
    message_id TEXT NOT NULL,
    recipient_id TEXT NOT NULL,
    channel TEXT NOT NULL,
    delivered_at INTEGER NOT NULL,
    PRIMARY KEY (message_id, recipient_id, channel),
    FOREIGN KEY (message_id) REFERENCES messages(id) ON DELETE CASCADE
);
CREATE INDEX IF NOT EXISTS idx_deliveries_recipient ON message_deliveries(recipient_id, channel);
";

const READS_SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS message_reads (
    message_id TEXT NOT NULL,
    recipient_id TEXT NOT NULL,
    read_at INTEGER NOT NULL,
    PRIMARY KEY (message_id, recipient_id),
    FOREIGN KEY (message_id) REFERENCES messages(id) ON DELETE CASCADE
);
";

const MESSAGE_COLUMNS: &str = "m.id, m.sender_id, m.recipient_rule, m.subject, m.body, m.message_type, \
     m.priority, m.status, m.channel_internal, m.channel_email, m.channel_whatsapp, \
     m.scheduled_for, m.sent_at, m.version, m.created_at, m.updated_at";

const ENTITY: &str = "message";

/// SQLite-backed [`MessageStore`].
///
/// One connection guarded by a mutex; every public method holds the lock for
/// its whole read-check-write sequence.
pub struct SqliteMessageStore {
    conn: Mutex<Connection>,
    _db_path: PathBuf,
}

impl SqliteMessageStore {
    pub fn new(data_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(data_dir)?;
        let db_path = data_dir.join("messages.db");
        let conn = Connection::open(&db_path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
        conn.execute_batch(MESSAGES_SCHEMA)?;
        conn.execute_batch(DELIVERIES_SCHEMA)?;
        conn.execute_batch(READS_SCHEMA)?;
        tracing::info!(path = %db_path.display(), "Initialized message store");
        Ok(Self {
            conn: Mutex::new(conn),
            _db_path: db_path,
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn load(conn: &Connection, id: &str) -> Result<Option<Message>> {
        let raw = conn
            .query_row(
                &format!("SELECT {MESSAGE_COLUMNS} FROM messages m WHERE m.id = ?1"),
                [id],
                RawMessage::from_row,
            )
            .optional()?;
        match raw {
            Some(raw) => Ok(Some(raw.into_message(conn)?)),
            None => Ok(None),
        }
    }

    fn status_of(conn: &Connection, id: &str) -> Result<MessageStatus> {
        let status: Option<String> = conn
            .query_row("SELECT status FROM messages WHERE id = ?1", [id], |row| {
                row.get(0)
            })
            .optional()?;
        match status {
            Some(s) => parse_column("status", s),
            None => Err(StorageError::NotFound {
                entity: ENTITY,
                id: id.to_string(),
            }),
        }
    }

    fn require_sent(conn: &Connection, id: &str) -> Result<()> {
        match Self::status_of(conn, id)? {
            MessageStatus::Sent => Ok(()),
            MessageStatus::Draft => Err(StorageError::InvalidState {
                entity: ENTITY,
                id: id.to_string(),
                reason: "draft messages carry no receipts".to_string(),
            }),
        }
    }

    fn bump_version(conn: &Connection, id: &str, now_ms: i64) -> Result<()> {
        conn.execute(
            "UPDATE messages SET version = version + 1, updated_at = ?2 WHERE id = ?1",
            rusqlite::params![id, now_ms],
        )?;
        Ok(())
    }

    fn collect(conn: &Connection, sql: &str, params: &[&dyn rusqlite::types::ToSql]) -> Result<Vec<Message>> {
        let mut stmt = conn.prepare(sql)?;
        let raws = stmt
            .query_map(params, RawMessage::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        raws.into_iter().map(|raw| raw.into_message(conn)).collect()
    }
}

impl MessageStore for SqliteMessageStore {
    fn insert_message(&self, message: &Message) -> Result<()> {
        match (message.status, message.sent_at) {
            (MessageStatus::Sent, None) => {
                return Err(StorageError::InvalidState {
                    entity: ENTITY,
                    id: message.id.clone(),
                    reason: "sent message without sent_at".to_string(),
                })
            }
            (MessageStatus::Sent, Some(at)) if at < message.created_at => {
                return Err(StorageError::InvalidState {
                    entity: ENTITY,
                    id: message.id.clone(),
                    reason: "sent_at precedes created_at".to_string(),
                })
            }
            (MessageStatus::Draft, _)
                if !message.delivered_to.is_empty() || !message.read_by.is_empty() =>
            {
                return Err(StorageError::InvalidState {
                    entity: ENTITY,
                    id: message.id.clone(),
                    reason: "draft messages carry no receipts".to_string(),
                })
            }
            _ => {}
        }
        for (field, value, max) in [
            ("subject", &message.subject, MAX_SUBJECT_LEN),
            ("body", &message.body, MAX_BODY_LEN),
        ] {
            let len = value.chars().count();
            if len > max {
                return Err(StorageError::InvalidState {
                    entity: ENTITY,
                    id: message.id.clone(),
                    reason: format!("{field} is {len} characters long (max {max})"),
                });
            }
        }

        let rule_json = serde_json::to_string(&message.recipient_rule)?;
        let conn = self.conn();
        let tx = conn.unchecked_transaction()?;
        tx.execute(
            "INSERT INTO messages (id, sender_id, recipient_rule, rule_kind, subject, body, message_type,
                priority, status, channel_internal, channel_email, channel_whatsapp, scheduled_for,
                sent_at, version, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)",
            rusqlite::params![
                message.id,
                message.sender_id,
                rule_json,
                message.recipient_rule.kind(),
                message.subject,
                message.body,
                message.message_type.as_str(),
                message.priority.as_str(),
                message.status.as_str(),
                message.delivery_channels.internal,
                message.delivery_channels.email,
                message.delivery_channels.whatsapp,
                message.scheduled_for.map(|t| t.timestamp_millis()),
                message.sent_at.map(|t| t.timestamp_millis()),
                message.version,
                message.created_at.timestamp_millis(),
                message.updated_at.timestamp_millis(),
            ],
        )?;
        for d in &message.delivered_to {
            tx.execute(
                "INSERT OR IGNORE INTO message_deliveries (message_id, recipient_id, channel, delivered_at)
                 VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![
                    message.id,
                    d.recipient_id,
                    d.channel.as_str(),
                    d.delivered_at.timestamp_millis()
                ],
            )?;
        }
        for r in &message.read_by {
            tx.execute(
                "INSERT OR IGNORE INTO message_reads (message_id, recipient_id, read_at) VALUES (?1, ?2, ?3)",
                rusqlite::params![message.id, r.recipient_id, r.read_at.timestamp_millis()],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    fn get_message(&self, id: &str) -> Result<Option<Message>> {
        let conn = self.conn();
        Self::load(&conn, id)
    }

    fn list_messages(
        &self,
        filter: &MessageFilter,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Message>> {
        let (where_sql, mut params) = filter_clause(filter);
        let sql = format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages m{where_sql}
             ORDER BY m.created_at DESC, m.id DESC LIMIT ?{} OFFSET ?{}",
            params.len() + 1,
            params.len() + 2
        );
        params.push(Box::new(limit as i64));
        params.push(Box::new(offset as i64));
        let param_refs: Vec<&dyn rusqlite::types::ToSql> =
            params.iter().map(|p| p.as_ref()).collect();
        let conn = self.conn();
        Self::collect(&conn, &sql, param_refs.as_slice())
    }

    fn count_messages(&self, filter: &MessageFilter) -> Result<u64> {
        let (where_sql, params) = filter_clause(filter);
        let sql = format!("SELECT COUNT(*) FROM messages m{where_sql}");
        let param_refs: Vec<&dyn rusqlite::types::ToSql> =
            params.iter().map(|p| p.as_ref()).collect();
        let conn = self.conn();
        let count: i64 = conn.query_row(&sql, param_refs.as_slice(), |row| row.get(0))?;
        Ok(count as u64)
    }

    fn mark_sent(
        &self,
        id: &str,
        expected_version: i64,
        sent_at: DateTime<Utc>,
    ) -> Result<Message> {
        let conn = self.conn();
        let now_ms = sent_at.timestamp_millis();
        // sent_at never precedes created_at
        let changed = conn.execute(
            "UPDATE messages
             SET status = 'sent', sent_at = MAX(?1, created_at), version = version + 1, updated_at = ?1
             WHERE id = ?2 AND status = 'draft' AND version = ?3",
            rusqlite::params![now_ms, id, expected_version],
        )?;
        if changed == 0 {
            return match Self::status_of(&conn, id)? {
                MessageStatus::Sent => Err(StorageError::InvalidState {
                    entity: ENTITY,
                    id: id.to_string(),
                    reason: "message was already sent".to_string(),
                }),
                MessageStatus::Draft => Err(StorageError::VersionConflict {
                    entity: ENTITY,
                    id: id.to_string(),
                    expected: expected_version,
                }),
            };
        }
        Self::load(&conn, id)?.ok_or_else(|| StorageError::NotFound {
            entity: ENTITY,
            id: id.to_string(),
        })
    }

    fn append_delivery(
        &self,
        id: &str,
        recipient_id: &str,
        channel: Channel,
        delivered_at: DateTime<Utc>,
    ) -> Result<bool> {
        let conn = self.conn();
        let tx = conn.unchecked_transaction()?;
        Self::require_sent(&tx, id)?;
        let inserted = tx.execute(
            "INSERT OR IGNORE INTO message_deliveries (message_id, recipient_id, channel, delivered_at)
             VALUES (?1, ?2, ?3, ?4)",
            rusqlite::params![id, recipient_id, channel.as_str(), delivered_at.timestamp_millis()],
        )? > 0;
        if inserted {
            Self::bump_version(&tx, id, Utc::now().timestamp_millis())?;
        }
        tx.commit()?;
        Ok(inserted)
    }

    fn append_read(&self, id: &str, recipient_id: &str, read_at: DateTime<Utc>) -> Result<bool> {
        let conn = self.conn();
        let tx = conn.unchecked_transaction()?;
        Self::require_sent(&tx, id)?;
        let inserted = tx.execute(
            "INSERT OR IGNORE INTO message_reads (message_id, recipient_id, read_at) VALUES (?1, ?2, ?3)",
            rusqlite::params![id, recipient_id, read_at.timestamp_millis()],
        )? > 0;
        if inserted {
            Self::bump_version(&tx, id, Utc::now().timestamp_millis())?;
        }
        tx.commit()?;
        Ok(inserted)
    }

    fn delete_draft(&self, id: &str) -> Result<()> {
        let conn = self.conn();
        let deleted = conn.execute(
            "DELETE FROM messages WHERE id = ?1 AND status = 'draft'",
            [id],
        )?;
        if deleted > 0 {
            return Ok(());
        }
        match Self::status_of(&conn, id)? {
            MessageStatus::Sent => Err(StorageError::InvalidState {
                entity: ENTITY,
                id: id.to_string(),
                reason: "sent messages are kept as audit trail".to_string(),
            }),
            MessageStatus::Draft => Err(StorageError::NotFound {
                entity: ENTITY,
                id: id.to_string(),
            }),
        }
    }

    fn list_inbox(&self, query: &InboxQuery) -> Result<Vec<Message>> {
        let unread_clause = if query.unread_only {
            " AND NOT EXISTS (SELECT 1 FROM message_reads r
                              WHERE r.message_id = m.id AND r.recipient_id = ?1)"
        } else {
            ""
        };
        let sql = format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages m
             JOIN message_deliveries d ON d.message_id = m.id AND d.channel = 'internal'
             WHERE d.recipient_id = ?1 AND m.status = 'sent'{unread_clause}
             ORDER BY m.sent_at DESC, m.id DESC LIMIT ?2 OFFSET ?3"
        );
        let limit = query.limit as i64;
        let offset = query.offset as i64;
        let conn = self.conn();
        Self::collect(
            &conn,
            &sql,
            rusqlite::params![query.recipient_id, limit, offset],
        )
    }

    fn count_unread(&self, recipient_id: &str) -> Result<u64> {
        let conn = self.conn();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM messages m
             JOIN message_deliveries d ON d.message_id = m.id AND d.channel = 'internal'
             WHERE d.recipient_id = ?1 AND m.status = 'sent'
               AND NOT EXISTS (SELECT 1 FROM message_reads r
                               WHERE r.message_id = m.id AND r.recipient_id = ?1)",
            [recipient_id],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }
}

fn filter_clause(filter: &MessageFilter) -> (String, Vec<Box<dyn rusqlite::types::ToSql>>) {
    let mut clauses = Vec::new();
    let mut params: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();
    if let Some(status) = filter.status {
        params.push(Box::new(status.as_str()));
        clauses.push(format!("m.status = ?{}", params.len()));
    }
    if let Some(kind) = filter.message_type {
        params.push(Box::new(kind.as_str()));
        clauses.push(format!("m.message_type = ?{}", params.len()));
    }
    if let Some(sender) = &filter.sender_id {
        params.push(Box::new(sender.clone()));
        clauses.push(format!("m.sender_id = ?{}", params.len()));
    }
    if clauses.is_empty() {
        (String::new(), params)
    } else {
        (format!(" WHERE {}", clauses.join(" AND ")), params)
    }
}

fn parse_column<T: FromStr>(column: &'static str, value: String) -> Result<T> {
    match value.parse::<T>() {
        Ok(v) => Ok(v),
        Err(_) => Err(StorageError::UnexpectedValue { column, value }),
    }
}

fn from_millis(column: &'static str, ms: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(ms).ok_or_else(|| StorageError::UnexpectedValue {
        column,
        value: ms.to_string(),
    })
}

struct RawMessage {
    id: String,
    sender_id: String,
    recipient_rule: String,
    subject: String,
    body: String,
    message_type: String,
    priority: String,
    status: String,
    internal: bool,
    email: bool,
    whatsapp: bool,
    scheduled_for: Option<i64>,
    sent_at: Option<i64>,
    version: i64,
    created_at: i64,
    updated_at: i64,
}

impl RawMessage {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            sender_id: row.get(1)?,
            recipient_rule: row.get(2)?,
            subject: row.get(3)?,
            body: row.get(4)?,
            message_type: row.get(5)?,
            priority: row.get(6)?,
            status: row.get(7)?,
            internal: row.get(8)?,
            email: row.get(9)?,
            whatsapp: row.get(10)?,
            scheduled_for: row.get(11)?,
            sent_at: row.get(12)?,
            version: row.get(13)?,
            created_at: row.get(14)?,
            updated_at: row.get(15)?,
        })
    }

    fn into_message(self, conn: &Connection) -> Result<Message> {
        let recipient_rule: RecipientRule = serde_json::from_str(&self.recipient_rule)?;

        let mut stmt = conn.prepare_cached(
            "SELECT recipient_id, channel, delivered_at FROM message_deliveries
             WHERE message_id = ?1 ORDER BY delivered_at ASC, rowid ASC",
        )?;
        let rows = stmt
            .query_map([&self.id], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, i64>(2)?,
                ))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        let mut delivered_to = Vec::with_capacity(rows.len());
        for (recipient_id, channel, at) in rows {
            delivered_to.push(DeliveryReceipt {
                recipient_id,
                channel: parse_column::<Channel>("channel", channel)?,
                delivered_at: from_millis("delivered_at", at)?,
            });
        }

        let mut stmt = conn.prepare_cached(
            "SELECT recipient_id, read_at FROM message_reads
             WHERE message_id = ?1 ORDER BY read_at ASC, rowid ASC",
        )?;
        let rows = stmt
            .query_map([&self.id], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        let read_by = rows
            .into_iter()
            .map(|(recipient_id, at)| {
                Ok(ReadReceipt {
                    recipient_id,
                    read_at: from_millis("read_at", at)?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Message {
            id: self.id,
            sender_id: self.sender_id,
            recipient_rule,
            subject: self.subject,
            body: self.body,
            message_type: parse_column("message_type", self.message_type)?,
            priority: parse_column("priority", self.priority)?,
            status: parse_column("status", self.status)?,
            delivery_channels: DeliveryChannels {
                internal: self.internal,
                email: self.email,
                whatsapp: self.whatsapp,
            },
            scheduled_for: self
                .scheduled_for
                .map(|ms| from_millis("scheduled_for", ms))
                .transpose()?,
            sent_at: self.sent_at.map(|ms| from_millis("sent_at", ms)).transpose()?,
            delivered_to,
            read_by,
            version: self.version,
            created_at: from_millis("created_at", self.created_at)?,
            updated_at: from_millis("updated_at", self.updated_at)?,
        })
    }
}
