use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use fore_core::ForeConfig;
use fore_events::EventBroadcaster;
use fore_publisher::PublishPipeline;
use fore_scheduler::SlotAllocator;
use fore_store::PostStore;
use tokio::sync::watch;

/// Central shared state, passed as `Arc<AppState>` to all Axum handlers.
pub struct AppState {
    pub config: ForeConfig,
    pub store: Arc<dyn PostStore>,
    pub pipeline: Arc<PublishPipeline>,
    pub events: EventBroadcaster,
    pub slots: SlotAllocator,
    /// Registered platform names, for `/health`.
    pub platforms: Vec<String>,
    /// Flips to `true` on shutdown; open event streams end when it does.
    pub shutdown: watch::Receiver<bool>,
}

impl AppState {
    pub fn new(
        config: ForeConfig,
        pipeline: Arc<PublishPipeline>,
        slots: SlotAllocator,
        platforms: Vec<String>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            config,
            store: pipeline.store().clone(),
            events: pipeline.events().clone(),
            pipeline,
            slots,
            platforms,
            shutdown,
        }
    }
}

/// Assemble the full Axum router.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(crate::http::health::health_handler))
        .route("/api/events", get(crate::http::events::events_handler))
        .route("/api/slots/next", get(crate::http::slots::next_slot_handler))
        .route("/api/posts/{id}/publish", post(crate::http::publish::publish_now_handler))
        .with_state(state)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use fore_core::config::SlotsConfig;
    use fore_core::TimeOfDay;
    use fore_publisher::{AdapterRegistry, DryRunAdapter, LogNotifier};
    use fore_store::SqlitePostStore;

    pub struct Harness {
        pub state: Arc<AppState>,
        pub store: Arc<SqlitePostStore>,
        pub shutdown: watch::Sender<bool>,
    }

    pub fn harness(token: Option<&str>) -> Harness {
        let mut config = ForeConfig::default();
        config.gateway.token = token.map(String::from);

        let store = Arc::new(SqlitePostStore::open_in_memory().unwrap());
        let mut adapters = AdapterRegistry::new();
        adapters.register(Arc::new(DryRunAdapter::new("x")));
        let platforms = adapters.names();
        let pipeline = PublishPipeline::new(
            store.clone(),
            Arc::new(adapters),
            Arc::new(LogNotifier),
            EventBroadcaster::new(8, std::time::Duration::from_secs(30)),
        );
        let slots = SlotAllocator::from_config(&SlotsConfig {
            timezone: "UTC".to_string(),
            preferred: vec![
                TimeOfDay::new(7, 0).unwrap(),
                TimeOfDay::new(11, 0).unwrap(),
                TimeOfDay::new(18, 0).unwrap(),
            ],
        })
        .unwrap();
        let (tx, rx) = watch::channel(false);
        let state = Arc::new(AppState::new(config, Arc::new(pipeline), slots, platforms, rx));
        Harness {
            state,
            store,
            shutdown: tx,
        }
    }
}
