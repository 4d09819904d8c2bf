use std::sync::Arc;

use crate::config::AppConfig;
use crate::registry::EngineRegistry;
use crate::services::{dispatch::Dispatcher, store::JobStore};

/// Shared application state passed to all route handlers.
///
/// The registry (and with it the circuit breaker state) is owned here, at
/// the composition root, and shared by reference; there is no ambient
/// singleton.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<EngineRegistry>,
    pub dispatcher: Arc<Dispatcher>,
    pub store: Arc<JobStore>,
    pub config: Arc<AppConfig>,
}

impl AppState {
    pub fn new(
        registry: Arc<EngineRegistry>,
        dispatcher: Dispatcher,
        store: JobStore,
        config: AppConfig,
    ) -> Self {
        Self {
            registry,
            dispatcher: Arc::new(dispatcher),
            store: Arc::new(store),
            config: Arc::new(config),
        }
    }
}
