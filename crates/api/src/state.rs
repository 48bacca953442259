use std::sync::Arc;

use catalog_core::store::{CatalogStore, WebhookStore};
use catalog_events::WebhookNotifier;
use catalog_pipeline::JobCoordinator;

use crate::config::ServerConfig;
use crate::ws::WsManager;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// Cheap to clone: every field is behind an `Arc`.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    /// Job engine entry point.
    pub coordinator: Arc<JobCoordinator>,
    /// Product reads for browsing; writes go through the coordinator.
    pub catalog: Arc<dyn CatalogStore>,
    pub webhooks: Arc<dyn WebhookStore>,
    /// Sends test deliveries; job events reach it through the coordinator.
    pub notifier: WebhookNotifier,
    /// Open progress WebSocket connections.
    pub ws_manager: Arc<WsManager>,
}
