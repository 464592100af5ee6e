use crate::chain::TransportChain;
use crate::error::{NotifyError, Result};
use crate::utils::redact_sensitive_json;
use crate::Transport;
use serde::Deserialize;
use serde_json::Value;
use solfeo_common::types::Channel;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Factory for [`Transport`] instances from JSON configuration.
///
/// Each plugin is registered in the [`TransportRegistry`] by its `name()`.
pub trait TransportPlugin: Send + Sync {
    /// Plugin type name (e.g. `"smtp"`).
    fn name(&self) -> &str;

    /// The channel this transport delivers on. Never [`Channel::Internal`].
    fn channel(&self) -> Channel;

    fn validate_config(&self, config: &Value) -> anyhow::Result<()>;

    /// Creates a transport from a validated config. `instance_id` identifies
    /// it in logs.
    fn create_transport(&self, instance_id: &str, config: &Value) -> anyhow::Result<Box<dyn Transport>>;

    /// Returns `config` with secrets replaced by `"***"`.
    fn redact_config(&self, config: &Value) -> Value {
        redact_sensitive_json(config)
    }
}

/// One `[[transports]]` entry of the server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct TransportSpec {
    pub channel: Channel,
    pub transport_type: String,
    pub id: String,
    #[serde(default)]
    pub config: Value,
}

/// The email and WhatsApp chains built from configuration.
pub struct TransportChains {
    pub email: TransportChain,
    pub whatsapp: TransportChain,
}

/// Registry of available [`TransportPlugin`]s.
///
/// # Examples
///
/// ```
/// use solfeo_notify::plugin::TransportRegistry;
///
/// let registry = TransportRegistry::default();
/// assert!(registry.has_plugin("smtp"));
/// assert!(registry.has_plugin("whatsapp_web"));
/// assert!(registry.has_plugin("whatsapp_cloud"));
/// assert!(!registry.has_plugin("carrier_pigeon"));
/// ```
pub struct TransportRegistry {
    plugins: HashMap<String, Box<dyn TransportPlugin>>,
}

impl TransportRegistry {
    pub fn new() -> Self {
        Self {
            plugins: HashMap::new(),
        }
    }

    pub fn register(&mut self, plugin: Box<dyn TransportPlugin>) {
        let name = plugin.name().to_string();
        self.plugins.insert(name, plugin);
    }

    pub fn create_transport(
        &self,
        type_name: &str,
        instance_id: &str,
        config: &Value,
    ) -> Result<Box<dyn Transport>> {
        let plugin = self
            .plugins
            .get(type_name)
            .ok_or_else(|| NotifyError::UnknownTransportType(type_name.to_string()))?;
        plugin
            .validate_config(config)
            .map_err(|e| NotifyError::InvalidConfig(format!("{instance_id}: {e:#}")))?;
        plugin
            .create_transport(instance_id, config)
            .map_err(|e| NotifyError::InvalidConfig(format!("{instance_id}: {e:#}")))
    }

    /// Builds the per-channel fallback chains. Transports keep their
    /// declaration order within a channel.
    pub fn build_chains(&self, specs: &[TransportSpec], timeout: Duration) -> Result<TransportChains> {
        let mut email = TransportChain::new(Channel::Email, timeout);
        let mut whatsapp = TransportChain::new(Channel::Whatsapp, timeout);

        for spec in specs {
            let plugin = self
                .get_plugin(&spec.transport_type)
                .ok_or_else(|| NotifyError::UnknownTransportType(spec.transport_type.clone()))?;
            if plugin.channel() != spec.channel {
                return Err(NotifyError::InvalidConfig(format!(
                    "{}: transport type '{}' delivers on {}, not {}",
                    spec.id,
                    spec.transport_type,
                    plugin.channel(),
                    spec.channel
                )));
            }
            let transport: Arc<dyn Transport> =
                Arc::from(self.create_transport(&spec.transport_type, &spec.id, &spec.config)?);
            tracing::info!(
                channel = %spec.channel,
                transport = %spec.transport_type,
                id = %spec.id,
                config = %plugin.redact_config(&spec.config),
                "Registered transport"
            );
            match spec.channel {
                Channel::Email => email.push(transport),
                Channel::Whatsapp => whatsapp.push(transport),
                Channel::Internal => {
                    return Err(NotifyError::InvalidConfig(format!(
                        "{}: the internal channel has no transports",
                        spec.id
                    )))
                }
            }
        }

        Ok(TransportChains { email, whatsapp })
    }

    pub fn get_plugin(&self, type_name: &str) -> Option<&dyn TransportPlugin> {
        self.plugins.get(type_name).map(|p| p.as_ref())
    }

    pub fn has_plugin(&self, type_name: &str) -> bool {
        self.plugins.contains_key(type_name)
    }

    pub fn plugin_names(&self) -> Vec<&str> {
        self.plugins.keys().map(|s| s.as_str()).collect()
    }
}

impl Default for TransportRegistry {
    fn default() -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(crate::channels::email::SmtpPlugin));
        registry.register(Box::new(crate::channels::whatsapp_web::WhatsappWebPlugin));
        registry.register(Box::new(crate::channels::whatsapp_cloud::WhatsappCloudPlugin));
        registry
    }
}
