//! Channel variants for class event notices and their audit messages.

use crate::dispatcher::{ChannelStatus, OutcomeReport};
use crate::template::text_to_html;
use crate::utils::html_escape;
use chrono::NaiveDate;
use solfeo_common::i18n::{self, TRANSLATIONS};
use solfeo_common::types::{Channel, ClassDetail, MAX_BODY_LEN, MAX_SUBJECT_LEN};

const DATE_FORMAT: &str = "%d/%m/%Y";

/// Longest single recipient line in an audit body.
const MAX_AUDIT_LINE_LEN: usize = 300;

/// Cuts `text` to at most `max` characters, marking the cut with `…`.
fn clip(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max.saturating_sub(1)).collect();
    out.push('…');
    out
}

/// One message in its three channel forms, before per-recipient rendering.
///
/// `email` is an HTML fragment; `internal` and `whatsapp` are plain text,
/// the latter with `*bold*` emphasis. All variants may carry
/// `{{nombre}}`-style placeholders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageContent {
    pub subject: String,
    pub internal: String,
    pub email: String,
    pub whatsapp: String,
}

impl MessageContent {
    /// Content derived from a single staff-written subject and body.
    pub fn uniform(subject: &str, body: &str) -> Self {
        Self {
            subject: subject.to_string(),
            internal: body.to_string(),
            email: text_to_html(body),
            whatsapp: format!("*{subject}*\n\n{body}"),
        }
    }
}

/// Which class event a notice describes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClassEvent {
    Cancelled { reason: Option<String> },
    TimeChanged { old_time: String, new_time: String },
}

impl ClassEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            ClassEvent::Cancelled { .. } => "cancellation",
            ClassEvent::TimeChanged { .. } => "time_change",
        }
    }
}

/// Builds localized class notices.
#[derive(Debug, Clone)]
pub struct ContentBuilder {
    locale: String,
}

impl ContentBuilder {
    pub fn new(locale: &str) -> Self {
        Self {
            locale: i18n::normalize_locale(locale).to_string(),
        }
    }

    fn t(&self, key: &str, args: &[(&str, &str)]) -> String {
        TRANSLATIONS.format(&self.locale, key, args)
    }

    /// Notice sent to each active student of `class`.
    pub fn class_notice(&self, class: &ClassDetail, event: &ClassEvent, date: NaiveDate) -> MessageContent {
        let title = class.title.as_str();
        let prefix = match event {
            ClassEvent::Cancelled { .. } => "class.cancel",
            ClassEvent::TimeChanged { .. } => "class.time_change",
        };

        let mut details: Vec<(String, String)> = Vec::new();

        details.push((self.t("label.date", &[]), date.format(DATE_FORMAT).to_string()));
        match event {
            ClassEvent::Cancelled { reason } => {
                let schedule = class.schedule_label();
                if !schedule.is_empty() {
                    details.push((self.t("label.schedule", &[]), schedule));
                }
                details.push((self.t("label.room", &[]), self.room_label(class)));
                if let Some(reason) = reason.as_deref().map(str::trim).filter(|r| !r.is_empty()) {
                    details.push((self.t("label.reason", &[]), reason.to_string()));
                }
            }
            ClassEvent::TimeChanged { old_time, new_time } => {
                details.push((self.t("label.old_time", &[]), old_time.clone()));
                details.push((self.t("label.new_time", &[]), new_time.clone()));
                details.push((self.t("label.room", &[]), self.room_label(class)));
            }
        }

        let subject = self.t(&format!("{prefix}.subject"), &[("title", title)]);
        let greeting = self.t("greeting", &[("name", "{{nombre}}")]);
        let intro = self.t(&format!("{prefix}.intro"), &[("title", title)]);
        let closing = self.t(&format!("{prefix}.closing"), &[]);

        let internal = {
            let lines: Vec<String> = details.iter().map(|(k, v)| format!("{k}: {v}")).collect();
            format!("{greeting}\n\n{intro}\n\n{}\n\n{closing}", lines.join("\n"))
        };

        let email = {
            let items: String = details
                .iter()
                .map(|(k, v)| format!("<li><strong>{}:</strong> {}</li>", html_escape(k), html_escape(v)))
                .collect();
            format!(
                "<p>{}</p><p>{}</p><ul>{items}</ul><p>{}</p>",
                html_escape(&greeting),
                html_escape(&intro),
                html_escape(&closing)
            )
        };

        let whatsapp = {
            let lines: Vec<String> = details.iter().map(|(k, v)| format!("*{k}:* {v}")).collect();
            format!(
                "*{subject}*\n\n{greeting}\n\n{intro}\n\n{}\n\n{closing}",
                lines.join("\n")
            )
        };

        MessageContent {
            subject: clip(&subject, MAX_SUBJECT_LEN),
            internal: clip(&internal, MAX_BODY_LEN),
            email,
            whatsapp,
        }
    }

    fn room_label(&self, class: &ClassDetail) -> String {
        match class.room.as_deref().map(str::trim).filter(|r| !r.is_empty()) {
            Some(room) => room.to_string(),
            None => self.t("label.not_assigned", &[]),
        }
    }

    /// Subject and body of the audit message recording a notice's outcome.
    pub fn audit(
        &self,
        class: &ClassDetail,
        event: &ClassEvent,
        actor_name: &str,
        report: &OutcomeReport,
    ) -> (String, String) {
        let title = class.title.as_str();
        let (subject, intro) = match event {
            ClassEvent::Cancelled { reason } => {
                let mut intro = self.t("audit.cancel.intro", &[("title", title), ("actor", actor_name)]);
                if let Some(reason) = reason.as_deref().map(str::trim).filter(|r| !r.is_empty()) {
                    intro.push_str(&format!("\n{}: {reason}", self.t("label.reason", &[])));
                }
                (self.t("audit.cancel.subject", &[("title", title)]), intro)
            }
            ClassEvent::TimeChanged { old_time, new_time } => (
                self.t("audit.time_change.subject", &[("title", title)]),
                self.t(
                    "audit.time_change.intro",
                    &[("title", title), ("actor", actor_name), ("old", old_time), ("new", new_time)],
                ),
            ),
        };

        let mut body = format!("{intro}\n\n{}:\n", self.t("audit.summary", &[]));
        for channel in Channel::ALL {
            let tally = report.tally(channel);
            body.push_str(&format!(
                "- {}\n",
                self.t(
                    "audit.channel_line",
                    &[
                        ("channel", channel.label()),
                        ("sent", &tally.sent.to_string()),
                        ("failed", &tally.failed.to_string()),
                    ],
                )
            ));
        }

        body.push('\n');
        if report.details.is_empty() {
            body.push_str(&self.t("audit.no_recipients", &[]));
        } else {
            body.push_str(&format!("{}:\n", self.t("audit.recipients", &[])));
            self.push_recipient_lines(&mut body, report);
        }

        (
            clip(&subject, MAX_SUBJECT_LEN),
            clip(body.trim_end(), MAX_BODY_LEN),
        )
    }

    /// Appends one line per recipient while the body stays within
    /// [`MAX_BODY_LEN`]; the rest is summarized as "… y N más".
    fn push_recipient_lines(&self, body: &mut String, report: &OutcomeReport) {
        let lines: Vec<String> = report
            .details
            .iter()
            .map(|detail| {
                let marks: Vec<String> = Channel::ALL
                    .iter()
                    .filter_map(|&ch| match detail.status(ch) {
                        ChannelStatus::Sent => Some(format!("{} ✓", ch.label())),
                        ChannelStatus::Failed => Some(format!("{} ✗", ch.label())),
                        ChannelStatus::Skipped => None,
                    })
                    .collect();
                let errors = if detail.errors.is_empty() {
                    self.t("audit.no_errors", &[])
                } else {
                    detail.errors.join("; ")
                };
                let line = format!("- {} [{}]: {errors}", detail.name, marks.join(", "));
                clip(&line, MAX_AUDIT_LINE_LEN)
            })
            .collect();

        let more_reserve = self
            .t("audit.more", &[("count", &lines.len().to_string())])
            .chars()
            .count();
        let mut used = body.chars().count();
        let mut shown = 0;
        for (i, line) in lines.iter().enumerate() {
            let len = line.chars().count() + 1;
            let reserve = if i + 1 < lines.len() { more_reserve } else { 0 };
            if used + len + reserve > MAX_BODY_LEN {
                break;
            }
            body.push_str(line);
            body.push('\n');
            used += len;
            shown += 1;
        }
        if shown < lines.len() {
            let hidden = (lines.len() - shown).to_string();
            body.push_str(&self.t("audit.more", &[("count", &hidden)]));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatcher::RecipientOutcome;
    use solfeo_common::types::ScheduleSlot;

    fn guitar() -> ClassDetail {
        ClassDetail {
            id: "c1".into(),
            title: "Guitar 101".into(),
            schedule: vec![
                ScheduleSlot { day: "Lunes".into(), start: "10:00".into(), end: "11:00".into() },
                ScheduleSlot { day: "Jueves".into(), start: "10:00".into(), end: "11:00".into() },
            ],
            room: None,
            teacher_id: Some("t1".into()),
            roster: vec![],
        }
    }

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 14).unwrap()
    }

    #[test]
    fn cancellation_notice_carries_details_in_every_variant() {
        let event = ClassEvent::Cancelled {
            reason: Some("Teacher illness".into()),
        };
        let content = ContentBuilder::new("es").class_notice(&guitar(), &event, date());

        assert_eq!(content.subject, "Clase cancelada: Guitar 101");
        assert!(content.internal.starts_with("Hola {{nombre}},"));
        assert!(content.internal.contains("Fecha: 14/10/2026"));
        assert!(content.internal.contains("Horario: Lunes 10:00-11:00, Jueves 10:00-11:00"));
        assert!(content.internal.contains("Aula: Sin asignar"));
        assert!(content.internal.contains("Motivo: Teacher illness"));
        assert!(content.email.contains("<li><strong>Motivo:</strong> Teacher illness</li>"));
        assert!(content.whatsapp.starts_with("*Clase cancelada: Guitar 101*"));
        assert!(content.whatsapp.contains("*Motivo:* Teacher illness"));
    }

    #[test]
    fn blank_reason_is_omitted() {
        let event = ClassEvent::Cancelled { reason: Some("  ".into()) };
        let content = ContentBuilder::new("en").class_notice(&guitar(), &event, date());
        assert!(!content.internal.contains("Reason"));
        assert_eq!(content.subject, "Class cancelled: Guitar 101");
    }

    #[test]
    fn time_change_notice_lists_old_and_new_time() {
        let event = ClassEvent::TimeChanged {
            old_time: "10:00-11:00".into(),
            new_time: "14:00-15:00".into(),
        };
        let mut class = guitar();
        class.room = Some("Aula <2>".into());
        let content = ContentBuilder::new("es").class_notice(&class, &event, date());
        assert!(content.internal.contains("Horario anterior: 10:00-11:00"));
        assert!(content.internal.contains("Nuevo horario: 14:00-15:00"));
        assert!(content.email.contains("Aula &lt;2&gt;"));
    }

    #[test]
    fn audit_body_summarizes_report() {
        let mut report = OutcomeReport::default();
        report.record(RecipientOutcome {
            recipient_id: "s1".into(),
            name: "Alice".into(),
            internal: ChannelStatus::Sent,
            email: ChannelStatus::Sent,
            whatsapp: ChannelStatus::Skipped,
            errors: vec![],
        });
        report.record(RecipientOutcome {
            recipient_id: "s2".into(),
            name: "Bob".into(),
            internal: ChannelStatus::Sent,
            email: ChannelStatus::Sent,
            whatsapp: ChannelStatus::Failed,
            errors: vec!["WhatsApp: bridge offline".into()],
        });
        let event = ClassEvent::Cancelled { reason: None };
        let (subject, body) = ContentBuilder::new("es").audit(&guitar(), &event, "Dirección", &report);

        assert_eq!(subject, "[Auditoría] Cancelación notificada: Guitar 101");
        assert!(body.starts_with("La clase Guitar 101 fue cancelada por Dirección."));
        assert!(body.contains("- Internal: 2 enviados, 0 errores"));
        assert!(body.contains("- WhatsApp: 0 enviados, 1 errores"));
        assert!(body.contains("- Alice [Internal ✓, Email ✓]: sin errores"));
        assert!(body.contains("- Bob [Internal ✓, Email ✓, WhatsApp ✗]: WhatsApp: bridge offline"));
    }

    #[test]
    fn audit_body_for_empty_class() {
        let event = ClassEvent::TimeChanged {
            old_time: "10:00-11:00".into(),
            new_time: "14:00-15:00".into(),
        };
        let (_, body) =
            ContentBuilder::new("en").audit(&guitar(), &event, "Admin", &OutcomeReport::default());
        assert!(body.contains("10:00-11:00 → 14:00-15:00"));
        assert!(body.ends_with("The class has no active students."));
    }

    #[test]
    fn audit_body_for_large_roster_stays_within_limit() {
        let mut report = OutcomeReport::default();
        for i in 0..40 {
            report.record(RecipientOutcome {
                recipient_id: format!("s{i}"),
                name: format!("Estudiante número {i}"),
                internal: ChannelStatus::Sent,
                email: ChannelStatus::Failed,
                whatsapp: ChannelStatus::Failed,
                errors: vec![
                    "Email: smtp-main: connection refused; smtp-backup: timed out after 20s".into(),
                    "WhatsApp: wa-bridge: HTTP 502: bad gateway".into(),
                ],
            });
        }
        let event = ClassEvent::Cancelled {
            reason: Some("x".repeat(solfeo_common::types::MAX_REASON_LEN)),
        };
        let (_, body) = ContentBuilder::new("es").audit(&guitar(), &event, "Dirección", &report);

        assert!(body.chars().count() <= MAX_BODY_LEN);
        let shown = body.lines().filter(|l| l.starts_with("- Estudiante")).count();
        assert!(shown > 0 && shown < 40);
        assert!(body.ends_with(&format!("… y {} más", 40 - shown)));
        assert!(body.contains("- Internal: 40 enviados, 0 errores"));
    }

    #[test]
    fn oversized_class_title_is_clipped() {
        let mut class = guitar();
        class.title = "Guitarra ".repeat(400);
        let event = ClassEvent::Cancelled { reason: None };
        let builder = ContentBuilder::new("es");

        let content = builder.class_notice(&class, &event, date());
        assert_eq!(content.subject.chars().count(), MAX_SUBJECT_LEN);
        assert!(content.subject.ends_with('…'));
        assert!(content.internal.chars().count() <= MAX_BODY_LEN);

        let (subject, body) = builder.audit(&class, &event, "Dirección", &OutcomeReport::default());
        assert!(subject.chars().count() <= MAX_SUBJECT_LEN);
        assert!(body.chars().count() <= MAX_BODY_LEN);
    }
}
