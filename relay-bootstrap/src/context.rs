use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use tracing::info;

use relay_application::{AppState, DedupCoordinator, DeliveryDispatcher, Metrics};
use relay_domain::ports::EventHistory;
use relay_domain::InMemoryEventHistory;
use relay_infrastructure::{
    lint_filters, AppConfig, DiscordTarget, FileEventHistory, FilterFileRepository,
    HistoryBackend,
};

pub struct AppContext {
    pub state: AppState,
}

impl AppContext {
    pub async fn new() -> Result<Self> {
        let config = AppConfig::load().await?;
        Self::from_config(config).await
    }

    pub async fn from_config(config: AppConfig) -> Result<Self> {
        let runtime_config = config.to_runtime_config();

        let history: Arc<dyn EventHistory> = match config.history.backend {
            HistoryBackend::File => Arc::new(
                FileEventHistory::open(&config.history.storage_path)
                    .await?
                    .with_retention(config.history.retention),
            ),
            HistoryBackend::Memory => Arc::new(InMemoryEventHistory::with_retention(
                config.history.retention,
            )),
        };

        let mut filters = config.filter.clone();
        if let Some(path) = &config.filters_path {
            filters.extend(FilterFileRepository::new().load(path).await?.iter().cloned());
        }
        let problems = lint_filters(&filters);

        let webhook_url = config
            .discord
            .webhook_url
            .as_deref()
            .ok_or_else(|| anyhow!("discord.webhook_url must be configured"))?;
        let target = DiscordTarget::new(
            webhook_url,
            Duration::from_secs(runtime_config.request_timeout_seconds.max(1)),
        )?;

        info!(
            servers = runtime_config.servers.len(),
            filters = filters.len(),
            filter_problems = problems,
            history = ?config.history.backend,
            "relay configured"
        );

        let dispatcher = DeliveryDispatcher::new(history, filters, Arc::new(target))
            .with_policy(config.filter_policy);
        let state = AppState {
            config: runtime_config,
            dispatcher: Arc::new(dispatcher),
            dedup: DedupCoordinator::new(),
            metrics: Arc::new(Metrics::default()),
        };

        Ok(Self { state })
    }
}
