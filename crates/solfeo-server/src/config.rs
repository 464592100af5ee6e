use serde::Deserialize;
use solfeo_common::types::{ActorRef, DeliveryChannels, Recipient};
use solfeo_notify::plugin::TransportSpec;
use solfeo_storage::directory::NewClass;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_http_port")]
    pub http_port: u16,
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub notify: NotifyConfig,
    /// Ordered transports; entries of the same channel form its fallback chain.
    #[serde(default)]
    pub transports: Vec<TransportSpec>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_port: default_http_port(),
            data_dir: default_data_dir(),
            auth: AuthConfig::default(),
            notify: NotifyConfig::default(),
            transports: Vec::new(),
        }
    }
}

// ---- Seed file types (used by `init-directory` CLI subcommand) ----

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DirectorySeedFile {
    #[serde(default)]
    pub students: Vec<Recipient>,
    #[serde(default)]
    pub actors: Vec<ActorRef>,
    #[serde(default)]
    pub classes: Vec<NewClass>,
}

fn default_http_port() -> u16 {
    8080
}

fn default_data_dir() -> String {
    "data".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// Absent means a random secret is generated at startup.
    #[serde(default)]
    pub jwt_secret: Option<String>,
    #[serde(default = "default_token_expire_secs")]
    pub token_expire_secs: u64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: None,
            token_expire_secs: default_token_expire_secs(),
        }
    }
}

fn default_token_expire_secs() -> u64 {
    86400
}

#[derive(Debug, Clone, Deserialize)]
pub struct NotifyConfig {
    #[serde(default = "default_locale")]
    pub locale: String,
    #[serde(default = "default_school_name")]
    pub school_name: String,
    #[serde(default = "default_signature")]
    pub signature: String,
    /// Substituted for `{{nombre}}` when a student has no display name.
    #[serde(default = "default_fallback_name")]
    pub fallback_name: String,
    #[serde(default = "default_delivery_timeout_secs")]
    pub delivery_timeout_secs: u64,
    /// Prepended to local phone numbers, digits only (e.g. `"34"`).
    #[serde(default)]
    pub default_country_code: Option<String>,
    /// Channels used for class cancellation and time change notices.
    #[serde(default = "default_class_event_channels")]
    pub class_event_channels: DeliveryChannels,
}

impl NotifyConfig {
    /// Per-attempt deadline, clamped to `1..=120` seconds.
    pub fn delivery_timeout(&self) -> Duration {
        Duration::from_secs(self.delivery_timeout_secs.clamp(1, 120))
    }
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            locale: default_locale(),
            school_name: default_school_name(),
            signature: default_signature(),
            fallback_name: default_fallback_name(),
            delivery_timeout_secs: default_delivery_timeout_secs(),
            default_country_code: None,
            class_event_channels: default_class_event_channels(),
        }
    }
}

fn default_locale() -> String {
    "es".to_string()
}

fn default_school_name() -> String {
    "Escuela de Música".to_string()
}

fn default_signature() -> String {
    "La Dirección".to_string()
}

fn default_fallback_name() -> String {
    "Estudiante".to_string()
}

fn default_delivery_timeout_secs() -> u64 {
    20
}

fn default_class_event_channels() -> DeliveryChannels {
    DeliveryChannels::all()
}

impl ServerConfig {
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }
}
