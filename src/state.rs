//! Shared application state
//!
//! Este módulo define el estado compartido de la aplicación que se pasa
//! a través del router de Axum.

use std::sync::Arc;

use crate::cache::ReportCache;
use crate::config::environment::EnvironmentConfig;
use crate::repositories::TrackingStore;
use crate::services::{Broadcaster, EodAggregator, IngestionGateway};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn TrackingStore>,
    pub config: EnvironmentConfig,
    pub broadcaster: Arc<Broadcaster>,
    pub gateway: Arc<IngestionGateway>,
    pub aggregator: EodAggregator,
    pub report_cache: Option<ReportCache>,
}

impl AppState {
    /// Armar el estado y lanzar la tarea de reparto del broadcaster.
    /// Debe llamarse dentro de un runtime de Tokio.
    pub fn new(store: Arc<dyn TrackingStore>, config: EnvironmentConfig) -> Self {
        let broadcaster = Broadcaster::spawn(config.observer_write_timeout, config.observer_buffer);
        let gateway = Arc::new(IngestionGateway::new(
            Arc::clone(&store),
            Arc::clone(&broadcaster),
            config.checkpoint_timestamps,
        ));
        let aggregator = EodAggregator::new(Arc::clone(&store));

        Self {
            store,
            config,
            broadcaster,
            gateway,
            aggregator,
            report_cache: None,
        }
    }

    pub fn with_report_cache(mut self, cache: ReportCache) -> Self {
        self.report_cache = Some(cache);
        self
    }
}
