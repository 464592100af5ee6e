use crate::config::ServerConfig;
use chrono::{DateTime, Utc};
use serde::Serialize;
use solfeo_notify::content::ContentBuilder;
use solfeo_notify::dispatcher::Dispatcher;
use solfeo_notify::orchestrator::Orchestrator;
use solfeo_notify::plugin::{TransportChains, TransportRegistry};
use solfeo_notify::resolver::RecipientResolver;
use solfeo_notify::service::MessageService;
use solfeo_notify::template::Templater;
use solfeo_notify::tracker::DeliveryTracker;
use solfeo_storage::{MessageStore, SqliteDirectory, SqliteMessageStore};
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use utoipa::ToSchema;

/// Configured transport instance ids, per channel, in fallback order.
#[derive(Debug, Clone, Default, Serialize, ToSchema)]
pub struct TransportSummary {
    pub email: Vec<String>,
    pub whatsapp: Vec<String>,
}

impl TransportSummary {
    fn from_chains(chains: &TransportChains) -> Self {
        let ids = |ids: Vec<&str>| ids.into_iter().map(str::to_string).collect();
        Self {
            email: ids(chains.email.instance_ids()),
            whatsapp: ids(chains.whatsapp.instance_ids()),
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub messages: Arc<MessageService>,
    pub orchestrator: Arc<Orchestrator>,
    pub directory: Arc<SqliteDirectory>,
    pub transports: Arc<TransportSummary>,
    /// Parent of every delivery run; cancelled on shutdown.
    pub shutdown: CancellationToken,
    pub start_time: DateTime<Utc>,
    pub jwt_secret: Arc<String>,
    pub token_expire_secs: u64,
    pub config: Arc<ServerConfig>,
}

impl AppState {
    /// Opens the stores under `config.data_dir` and wires the notification
    /// pipeline with the transports built from `config.transports`.
    pub fn build(
        config: ServerConfig,
        registry: &TransportRegistry,
        jwt_secret: String,
        shutdown: CancellationToken,
    ) -> anyhow::Result<Self> {
        let data_dir = Path::new(&config.data_dir);
        std::fs::create_dir_all(data_dir)?;
        let store: Arc<dyn MessageStore> = Arc::new(SqliteMessageStore::new(data_dir)?);
        let directory = Arc::new(SqliteDirectory::new(data_dir)?);

        let notify = &config.notify;
        let chains = registry.build_chains(&config.transports, notify.delivery_timeout())?;
        let transports = Arc::new(TransportSummary::from_chains(&chains));

        let templater = Templater::new(
            &notify.school_name,
            &notify.signature,
            &notify.fallback_name,
            &notify.locale,
        );
        let dispatcher = Arc::new(Dispatcher::new(
            DeliveryTracker::new(store.clone()),
            templater,
            chains,
            notify.default_country_code.clone(),
        ));
        let resolver = Arc::new(RecipientResolver::new(directory.clone(), directory.clone()));

        let messages = Arc::new(MessageService::new(
            store.clone(),
            directory.clone(),
            resolver.clone(),
            dispatcher.clone(),
        ));
        let orchestrator = Arc::new(Orchestrator::new(
            resolver,
            dispatcher,
            store,
            directory.clone(),
            ContentBuilder::new(&notify.locale),
            notify.class_event_channels,
        ));

        Ok(Self {
            messages,
            orchestrator,
            directory,
            transports,
            shutdown,
            start_time: Utc::now(),
            jwt_secret: Arc::new(jwt_secret),
            token_expire_secs: config.auth.token_expire_secs,
            config: Arc::new(config),
        })
    }
}
