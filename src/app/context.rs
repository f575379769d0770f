use std::sync::Arc;

use crate::app::Result;
use crate::config::Config;
use crate::coordinator::{Coordinator, CoordinatorConfig};
use crate::detector::Detector;
use crate::fetcher;
use crate::notifier;
use crate::scheduler::Scheduler;
use crate::store::sqlite::SqliteStore;

/// Wires store, fetcher, scheduler and notifier into a [`Coordinator`].
pub struct AppContext {
    pub config: Config,
    pub store: Arc<SqliteStore>,
    pub coordinator: Coordinator,
}

impl AppContext {
    pub fn new(config: Config) -> Result<Self> {
        let coordinator_config = Self::coordinator_config(&config);
        Self::with_coordinator_config(config, coordinator_config)
    }

    pub fn with_coordinator_config(
        config: Config,
        coordinator_config: CoordinatorConfig,
    ) -> Result<Self> {
        let db_path = config.resolve_database_path()?;
        let store = Arc::new(SqliteStore::new(&db_path)?);
        tracing::debug!("Identity store at {}", db_path.display());
        Self::with_store(config, store, coordinator_config)
    }

    pub fn in_memory(config: Config) -> Result<Self> {
        let store = Arc::new(SqliteStore::in_memory()?);
        let coordinator_config = Self::coordinator_config(&config);
        Self::with_store(config, store, coordinator_config)
    }

    /// Coordinator settings derived from the config file alone.
    pub fn coordinator_config(config: &Config) -> CoordinatorConfig {
        CoordinatorConfig {
            interval: config.interval(),
            run_on_start: true,
            retention: config.retention(),
        }
    }

    fn with_store(
        config: Config,
        store: Arc<SqliteStore>,
        coordinator_config: CoordinatorConfig,
    ) -> Result<Self> {
        let fetcher = fetcher::from_config(&config.fetcher)?;
        let detector = Detector::new(
            fetcher,
            config.post_selector.clone(),
            config.identity,
            config.fetcher.timeout(),
        );
        let scheduler = Scheduler::new(config.scheduler.clone());
        let notifier = notifier::from_config(&config.notifier)?;

        let coordinator = Coordinator::new(
            store.clone(),
            Arc::new(detector),
            scheduler,
            notifier,
            config.sources.clone(),
            coordinator_config,
        );

        Ok(Self {
            config,
            store,
            coordinator,
        })
    }
}
