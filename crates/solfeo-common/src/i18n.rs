//! Static translation catalogue for notification texts.
//!
//! Keys map `(locale, message_key)` to a template string. Templates use
//! `{name}` slots filled by the caller; `{{nombre}}`-style tokens are left
//! untouched for per-recipient substitution later on.
//! Supported locales: `es` (default) and `en`.

use std::collections::HashMap;
use std::sync::LazyLock;

pub const DEFAULT_LOCALE: &str = "es";

pub const SUPPORTED_LOCALES: &[&str] = &["es", "en"];

pub struct Translations {
    map: HashMap<(&'static str, &'static str), &'static str>,
}

impl Translations {
    /// Looks up `key` for `locale`, falling back to [`DEFAULT_LOCALE`] and
    /// then to `default`.
    pub fn get<'a>(&self, locale: &str, key: &str, default: &'a str) -> &'a str {
        if let Some(&val) = self.map.get(&(locale, key)) {
            return val;
        }
        if locale != DEFAULT_LOCALE {
            if let Some(&val) = self.map.get(&(DEFAULT_LOCALE, key)) {
                return val;
            }
        }
        default
    }

    /// Looks up `key` and fills every `{slot}` from `args`.
    pub fn format(&self, locale: &str, key: &str, args: &[(&str, &str)]) -> String {
        let mut out = self.get(locale, key, key).to_string();
        for (slot, value) in args {
            out = out.replace(&format!("{{{slot}}}"), value);
        }
        out
    }
}

pub static TRANSLATIONS: LazyLock<Translations> = LazyLock::new(|| {
    let mut map = HashMap::new();

    macro_rules! t {
        ($locale:expr, $key:expr, $val:expr) => {
            map.insert(($locale, $key), $val);
        };
    }

    // ---- Class cancellation ----
    t!("es", "class.cancel.subject", "Clase cancelada: {title}");
    t!("en", "class.cancel.subject", "Class cancelled: {title}");
    t!("es", "class.cancel.intro", "Te informamos que la clase {title} ha sido cancelada.");
    t!("en", "class.cancel.intro", "We would like to let you know that the class {title} has been cancelled.");
    t!("es", "class.cancel.closing", "Disculpa las molestias. Te avisaremos cuando se reprograme.");
    t!("en", "class.cancel.closing", "Sorry for the inconvenience. We will let you know when it is rescheduled.");

    // ---- Class time change ----
    t!("es", "class.time_change.subject", "Cambio de horario: {title}");
    t!("en", "class.time_change.subject", "Schedule change: {title}");
    t!("es", "class.time_change.intro", "El horario de la clase {title} ha cambiado.");
    t!("en", "class.time_change.intro", "The schedule of the class {title} has changed.");
    t!("es", "class.time_change.closing", "Por favor, toma nota del nuevo horario.");
    t!("en", "class.time_change.closing", "Please take note of the new schedule.");

    // ---- Shared labels ----
    t!("es", "greeting", "Hola {name},");
    t!("en", "greeting", "Hello {name},");
    t!("es", "label.date", "Fecha");
    t!("en", "label.date", "Date");
    t!("es", "label.schedule", "Horario");
    t!("en", "label.schedule", "Schedule");
    t!("es", "label.room", "Aula");
    t!("en", "label.room", "Room");
    t!("es", "label.reason", "Motivo");
    t!("en", "label.reason", "Reason");
    t!("es", "label.old_time", "Horario anterior");
    t!("en", "label.old_time", "Previous schedule");
    t!("es", "label.new_time", "Nuevo horario");
    t!("en", "label.new_time", "New schedule");
    t!("es", "label.not_assigned", "Sin asignar");
    t!("en", "label.not_assigned", "Not assigned");

    // ---- Email envelope ----
    t!("es", "email.footer", "Este es un mensaje automático de {school}. Por favor, no respondas a este correo.");
    t!("en", "email.footer", "This is an automated message from {school}. Please do not reply to this email.");

    // ---- Audit messages ----
    t!("es", "audit.cancel.subject", "[Auditoría] Cancelación notificada: {title}");
    t!("en", "audit.cancel.subject", "[Audit] Cancellation notified: {title}");
    t!("es", "audit.time_change.subject", "[Auditoría] Cambio de horario notificado: {title}");
    t!("en", "audit.time_change.subject", "[Audit] Schedule change notified: {title}");
    t!("es", "audit.cancel.intro", "La clase {title} fue cancelada por {actor}.");
    t!("en", "audit.cancel.intro", "The class {title} was cancelled by {actor}.");
    t!("es", "audit.time_change.intro", "El horario de la clase {title} fue cambiado por {actor}: {old} → {new}.");
    t!("en", "audit.time_change.intro", "The schedule of the class {title} was changed by {actor}: {old} → {new}.");
    t!("es", "audit.summary", "Resumen de notificaciones");
    t!("en", "audit.summary", "Notification summary");
    t!("es", "audit.channel_line", "{channel}: {sent} enviados, {failed} errores");
    t!("en", "audit.channel_line", "{channel}: {sent} sent, {failed} failed");
    t!("es", "audit.recipients", "Destinatarios");
    t!("en", "audit.recipients", "Recipients");
    t!("es", "audit.no_recipients", "La clase no tiene estudiantes activos.");
    t!("en", "audit.no_recipients", "The class has no active students.");
    t!("es", "audit.no_errors", "sin errores");
    t!("en", "audit.no_errors", "no errors");
    t!("es", "audit.more", "… y {count} más");
    t!("en", "audit.more", "… and {count} more");

    Translations { map }
});

pub fn is_supported_locale(locale: &str) -> bool {
    SUPPORTED_LOCALES.contains(&locale)
}

/// Returns `locale` if supported, otherwise [`DEFAULT_LOCALE`].
pub fn normalize_locale(locale: &str) -> &str {
    if is_supported_locale(locale) {
        locale
    } else {
        DEFAULT_LOCALE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_locale_falls_back_to_spanish() {
        let t = &*TRANSLATIONS;
        assert_eq!(t.get("fr", "label.room", "x"), "Aula");
    }

    #[test]
    fn unknown_key_falls_back_to_default() {
        assert_eq!(TRANSLATIONS.get("en", "no.such.key", "dflt"), "dflt");
    }

    #[test]
    fn format_fills_slots_and_keeps_recipient_tokens() {
        let s = TRANSLATIONS.format("es", "greeting", &[("name", "{{nombre}}")]);
        assert_eq!(s, "Hola {{nombre}},");
        let s = TRANSLATIONS.format("en", "class.cancel.subject", &[("title", "Guitar 101")]);
        assert_eq!(s, "Class cancelled: Guitar 101");
    }

    #[test]
    fn every_key_exists_in_both_locales() {
        let t = &*TRANSLATIONS;
        for (_, key) in t.map.keys() {
            for locale in SUPPORTED_LOCALES {
                assert!(
                    t.map.contains_key(&(*locale, *key)),
                    "missing {locale} translation for {key}"
                );
            }
        }
    }

    #[test]
    fn normalize_locale_defaults_to_spanish() {
        assert_eq!(normalize_locale("en"), "en");
        assert_eq!(normalize_locale("pt-BR"), DEFAULT_LOCALE);
    }
}
