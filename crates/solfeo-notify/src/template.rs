//! Per-recipient rendering of message content for each channel.

use crate::content::MessageContent;
use crate::RenderedContent;
use crate::utils::html_escape;
use solfeo_common::i18n::{self, TRANSLATIONS};
use solfeo_common::types::{Channel, Recipient};

const EMAIL_ENVELOPE: &str = include_str!("templates/email.html");

/// Renders message bodies for a recipient and channel.
///
/// Rendering is pure: it never touches storage.
#[derive(Debug, Clone)]
pub struct Templater {
    school_name: String,
    signature: String,
    fallback_name: String,
    locale: String,
}

impl Templater {
    pub fn new(school_name: &str, signature: &str, fallback_name: &str, locale: &str) -> Self {
        Self {
            school_name: school_name.to_string(),
            signature: signature.to_string(),
            fallback_name: fallback_name.to_string(),
            locale: i18n::normalize_locale(locale).to_string(),
        }
    }

    pub fn locale(&self) -> &str {
        &self.locale
    }

    /// Replaces `{{nombre}}`, `{{email}}` and `{{instrumento}}` with the
    /// recipient's fields. A blank name becomes the fallback name; other
    /// missing fields become empty.
    pub fn substitute(&self, raw: &str, recipient: &Recipient) -> String {
        self.substitute_with(raw, recipient, |s: &str| s.to_string())
    }

    fn substitute_with(&self, raw: &str, recipient: &Recipient, encode: impl Fn(&str) -> String) -> String {
        let name = recipient.display_name.trim();
        let name = if name.is_empty() {
            self.fallback_name.as_str()
        } else {
            name
        };
        raw.replace("{{nombre}}", &encode(name))
            .replace("{{email}}", &encode(recipient.email_address().unwrap_or("")))
            .replace(
                "{{instrumento}}",
                &encode(recipient.instrument.as_deref().map(str::trim).unwrap_or("")),
            )
    }

    /// Renders a plain-text message authored by staff.
    ///
    /// * `internal`: substitution only.
    /// * `email`: escaped, newlines become `<br>`, wrapped in the HTML envelope
    ///   titled with the rendered subject.
    /// * `whatsapp`: school header and signature line around the text.
    pub fn render(&self, subject: &str, body: &str, recipient: &Recipient, channel: Channel) -> RenderedContent {
        let subject = self.render_subject(subject, recipient);
        let body = match channel {
            Channel::Internal => self.substitute(body, recipient),
            Channel::Email => {
                let fragment = text_to_html(&self.substitute(body, recipient));
                self.email_envelope(&subject, &fragment)
            }
            Channel::Whatsapp => self.whatsapp_frame(&self.substitute(body, recipient)),
        };
        RenderedContent { subject, body }
    }

    /// Renders the subject line for a recipient.
    pub fn render_subject(&self, raw: &str, recipient: &Recipient) -> String {
        self.substitute(raw, recipient)
    }

    /// Renders one channel variant of pre-built content.
    ///
    /// The email variant is an HTML fragment; recipient values substituted
    /// into it are escaped.
    pub fn render_content(&self, content: &MessageContent, recipient: &Recipient, channel: Channel) -> String {
        match channel {
            Channel::Internal => self.substitute(&content.internal, recipient),
            Channel::Email => {
                let subject = self.render_subject(&content.subject, recipient);
                let fragment = self.substitute_with(&content.email, recipient, html_escape);
                self.email_envelope(&subject, &fragment)
            }
            Channel::Whatsapp => self.whatsapp_frame(&self.substitute(&content.whatsapp, recipient)),
        }
    }

    fn email_envelope(&self, subject: &str, fragment: &str) -> String {
        let footer = TRANSLATIONS.format(&self.locale, "email.footer", &[("school", &self.school_name)]);
        EMAIL_ENVELOPE
            .replace("{{lang}}", &self.locale)
            .replace("{{subject}}", &html_escape(subject))
            .replace("{{school_name}}", &html_escape(&self.school_name))
            .replace("{{signature}}", &html_escape(&self.signature))
            .replace("{{footer}}", &html_escape(&footer))
            .replace("{{content}}", fragment)
    }

    fn whatsapp_frame(&self, text: &str) -> String {
        let mut out = format!("*{}*\n\n{}", self.school_name, text.trim_end());
        if !self.signature.trim().is_empty() {
            out.push_str(&format!("\n\n_{}_", self.signature.trim()));
        }
        out
    }
}

/// Escapes plain text and turns newlines into `<br>`.
pub fn text_to_html(text: &str) -> String {
    html_escape(text).replace("\r\n", "\n").replace('\n', "<br>")
}
