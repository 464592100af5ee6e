use rusqlite::{Connection, OptionalExtension};
use serde::Deserialize;
use solfeo_common::types::{
    ActorRef, ActorRole, ClassDetail, Recipient, RosterEntry, RosterStatus, ScheduleSlot,
    StudentFilter,
};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use crate::error::{Result, StorageError};
use crate::{ActorDirectory, ClassDirectory, StudentDirectory};

const DIRECTORY_SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS students (
    id TEXT PRIMARY KEY,
    display_name TEXT NOT NULL,
    email TEXT,
    phone TEXT,
    instrument TEXT,
    level TEXT,
    active INTEGER NOT NULL DEFAULT 1
);
CREATE TABLE IF NOT EXISTS actors (
    id TEXT PRIMARY KEY,
    display_name TEXT NOT NULL,
    role TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS classes (
    id TEXT PRIMARY KEY,
    title TEXT NOT NULL,
    schedule TEXT NOT NULL DEFAULT '[]',
    room TEXT,
    teacher_id TEXT
);
CREATE TABLE IF NOT EXISTS class_roster (
    class_id TEXT NOT NULL,
    student_id TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'active',
    position INTEGER NOT NULL,
    PRIMARY KEY (class_id, student_id),
    FOREIGN KEY (class_id) REFERENCES classes(id) ON DELETE CASCADE
);
CREATE INDEX IF NOT EXISTS idx_roster_position ON class_roster(class_id, position);
";

const STUDENT_COLUMNS: &str = "s.id, s.display_name, s.email, s.phone, s.instrument, s.level, s.active";

/// A class as written by the directory seeder.
#[derive(Debug, Clone, Deserialize)]
pub struct NewClass {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub schedule: Vec<ScheduleSlot>,
    #[serde(default)]
    pub room: Option<String>,
    #[serde(default)]
    pub teacher_id: Option<String>,
    #[serde(default)]
    pub roster: Vec<RosterMember>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RosterMember {
    pub student_id: String,
    #[serde(default = "default_roster_status")]
    pub status: RosterStatus,
}

fn default_roster_status() -> RosterStatus {
    RosterStatus::Active
}

/// SQLite-backed school directory (students, classes, staff).
///
/// The notification subsystem only reads from it; the `upsert_*` writers
/// exist for seeding and tests.
pub struct SqliteDirectory {
    conn: Mutex<Connection>,
}

impl SqliteDirectory {
    pub fn new(data_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(data_dir)?;
        let db_path = data_dir.join("directory.db");
        let conn = Connection::open(&db_path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
        conn.execute_batch(DIRECTORY_SCHEMA)?;
        tracing::info!(path = %db_path.display(), "Initialized directory store");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn upsert_student(&self, student: &Recipient) -> Result<()> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO students (id, display_name, email, phone, instrument, level, active)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(id) DO UPDATE SET display_name = excluded.display_name,
                email = excluded.email, phone = excluded.phone, instrument = excluded.instrument,
                level = excluded.level, active = excluded.active",
            rusqlite::params![
                student.id,
                student.display_name,
                student.email,
                student.phone,
                student.instrument,
                student.level,
                student.active,
            ],
        )?;
        Ok(())
    }

    pub fn upsert_actor(&self, actor: &ActorRef) -> Result<()> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO actors (id, display_name, role) VALUES (?1, ?2, ?3)
             ON CONFLICT(id) DO UPDATE SET display_name = excluded.display_name, role = excluded.role",
            rusqlite::params![actor.id, actor.display_name, actor.role.as_str()],
        )?;
        Ok(())
    }

    /// Writes a class and replaces its roster. Roster order is preserved.
    pub fn upsert_class(&self, class: &NewClass) -> Result<()> {
        let schedule = serde_json::to_string(&class.schedule)?;
        let conn = self.conn();
        let tx = conn.unchecked_transaction()?;
        tx.execute(
            "INSERT INTO classes (id, title, schedule, room, teacher_id) VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(id) DO UPDATE SET title = excluded.title, schedule = excluded.schedule,
                room = excluded.room, teacher_id = excluded.teacher_id",
            rusqlite::params![class.id, class.title, schedule, class.room, class.teacher_id],
        )?;
        tx.execute("DELETE FROM class_roster WHERE class_id = ?1", [&class.id])?;
        for (position, member) in class.roster.iter().enumerate() {
            tx.execute(
                "INSERT OR REPLACE INTO class_roster (class_id, student_id, status, position)
                 VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![
                    class.id,
                    member.student_id,
                    member.status.as_str(),
                    position as i64
                ],
            )?;
        }
        tx.commit()?;
        Ok(())
    }
}

fn student_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Recipient> {
    Ok(Recipient {
        id: row.get(0)?,
        display_name: row.get(1)?,
        email: row.get(2)?,
        phone: row.get(3)?,
        instrument: row.get(4)?,
        level: row.get(5)?,
        active: row.get(6)?,
    })
}

fn parse_role(value: String) -> Result<ActorRole> {
    match value.parse::<ActorRole>() {
        Ok(role) => Ok(role),
        Err(_) => Err(StorageError::UnexpectedValue {
            column: "role",
            value,
        }),
    }
}

impl StudentDirectory for SqliteDirectory {
    fn find_student(&self, id: &str) -> Result<Option<Recipient>> {
        let conn = self.conn();
        let student = conn
            .query_row(
                &format!("SELECT {STUDENT_COLUMNS} FROM students s WHERE s.id = ?1"),
                [id],
                student_from_row,
            )
            .optional()?;
        Ok(student)
    }

    fn find_active_students(&self, filter: Option<&StudentFilter>) -> Result<Vec<Recipient>> {
        let mut sql = format!("SELECT {STUDENT_COLUMNS} FROM students s WHERE s.active = 1");
        let mut params: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();
        if let Some(f) = filter {
            if let Some(instrument) = f.instrument.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
                params.push(Box::new(instrument.to_string()));
                sql.push_str(&format!(" AND s.instrument = ?{} COLLATE NOCASE", params.len()));
            }
            if let Some(level) = f.level.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
                params.push(Box::new(level.to_string()));
                sql.push_str(&format!(" AND s.level = ?{} COLLATE NOCASE", params.len()));
            }
        }
        sql.push_str(" ORDER BY s.display_name ASC, s.id ASC");

        let param_refs: Vec<&dyn rusqlite::types::ToSql> =
            params.iter().map(|p| p.as_ref()).collect();
        let conn = self.conn();
        let mut stmt = conn.prepare(&sql)?;
        let students = stmt
            .query_map(param_refs.as_slice(), student_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(students)
    }
}

impl ClassDirectory for SqliteDirectory {
    fn find_class_with_roster(&self, id: &str) -> Result<Option<ClassDetail>> {
        let conn = self.conn();
        let row = conn
            .query_row(
                "SELECT id, title, schedule, room, teacher_id FROM classes WHERE id = ?1",
                [id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, Option<String>>(3)?,
                        row.get::<_, Option<String>>(4)?,
                    ))
                },
            )
            .optional()?;
        let Some((class_id, title, schedule, room, teacher_id)) = row else {
            return Ok(None);
        };
        let schedule: Vec<ScheduleSlot> = serde_json::from_str(&schedule)?;

        // LEFT JOIN: a roster row whose student is gone yields `student: None`.
        let mut stmt = conn.prepare(&format!(
            "SELECT r.status, s.id IS NOT NULL, {STUDENT_COLUMNS}
             FROM class_roster r LEFT JOIN students s ON s.id = r.student_id
             WHERE r.class_id = ?1 ORDER BY r.position ASC"
        ))?;
        let rows = stmt
            .query_map([&class_id], |row| {
                let status: String = row.get(0)?;
                let resolved: bool = row.get(1)?;
                let student = if resolved {
                    Some(Recipient {
                        id: row.get(2)?,
                        display_name: row.get(3)?,
                        email: row.get(4)?,
                        phone: row.get(5)?,
                        instrument: row.get(6)?,
                        level: row.get(7)?,
                        active: row.get(8)?,
                    })
                } else {
                    None
                };
                Ok((status, student))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut roster = Vec::with_capacity(rows.len());
        for (status, student) in rows {
            let status = match status.parse::<RosterStatus>() {
                Ok(s) => s,
                Err(_) => {
                    return Err(StorageError::UnexpectedValue {
                        column: "status",
                        value: status,
                    })
                }
            };
            roster.push(RosterEntry { student, status });
        }

        Ok(Some(ClassDetail {
            id: class_id,
            title,
            schedule,
            room,
            teacher_id,
            roster,
        }))
    }
}

impl ActorDirectory for SqliteDirectory {
    fn find_actor(&self, id: &str) -> Result<Option<ActorRef>> {
        let conn = self.conn();
        let row = conn
            .query_row(
                "SELECT id, display_name, role FROM actors WHERE id = ?1",
                [id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                    ))
                },
            )
            .optional()?;
        match row {
            Some((id, display_name, role)) => Ok(Some(ActorRef {
                id,
                display_name,
                role: parse_role(role)?,
            })),
            None => Ok(None),
        }
    }

    fn find_any_admin(&self) -> Result<Option<ActorRef>> {
        let conn = self.conn();
        let row = conn
            .query_row(
                "SELECT id, display_name, role FROM actors WHERE role = 'admin'
                 ORDER BY id ASC LIMIT 1",
                [],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                    ))
                },
            )
            .optional()?;
        match row {
            Some((id, display_name, role)) => Ok(Some(ActorRef {
                id,
                display_name,
                role: parse_role(role)?,
            })),
            None => Ok(None),
        }
    }
}
