use axum::{
    Router,
    http::StatusCode,
    middleware,
    routing::{get, post},
};
use std::sync::Arc;
use std::time::Duration;
use tower_http::timeout::TimeoutLayer;
use tracing::info;

use crate::config::Config;
use crate::error::Result;
use crate::handlers::{create_item_handler, get_items_handler, health_handler, metrics_handler};
use crate::metrics::{Metrics, track_metrics};
use crate::middleware::AdmissionControl;
use crate::rate_limit::ClientTracker;
use crate::state::AppState;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Builds the full application router from configuration.
///
/// Layer order, outermost first: timeout, metrics, rate limiter, handlers.
/// Rejected requests therefore still show up in the request metrics.
pub fn initialize_routes(config: &Config) -> Result<Router> {
    let metrics = if config.telemetry.enabled {
        Some(Arc::new(Metrics::new()?))
    } else {
        None
    };

    let tracker = if config.rate_limiting.enabled {
        let limits = &config.rate_limiting;
        let tracker = ClientTracker::new(limits.max_requests()?, limits.window()?)?;
        info!(
            max_requests = tracker.max_requests(),
            time_window = ?tracker.window(),
            "rate limiting enabled"
        );
        Some(Arc::new(tracker))
    } else {
        None
    };

    Ok(assemble(config, metrics, tracker))
}

/// Wires routes and middleware around already-built components.
pub fn assemble(
    config: &Config,
    metrics: Option<Arc<Metrics>>,
    tracker: Option<Arc<ClientTracker>>,
) -> Router {
    let routes = &config.api.routes;
    let state = Arc::new(AppState::new(metrics.clone()));

    let api = if routes.get_items == routes.create_item {
        Router::new().route(
            &routes.get_items,
            get(get_items_handler).post(create_item_handler),
        )
    } else {
        Router::new()
            .route(&routes.get_items, get(get_items_handler))
            .route(&routes.create_item, post(create_item_handler))
    };

    let api_prefix = format!("/api/{}", config.api.version);
    let mut router = Router::new()
        .route(&routes.health, get(health_handler))
        .nest(&api_prefix, api);
    info!(health = %routes.health, api = %api_prefix, "routes registered");

    if metrics.is_some() && !config.telemetry.metrics_endpoint.is_empty() {
        router = router.route(&config.telemetry.metrics_endpoint, get(metrics_handler));
        info!(endpoint = %config.telemetry.metrics_endpoint, "prometheus metrics available");
    }

    let mut router = router.with_state(state);

    if let Some(tracker) = tracker {
        router = AdmissionControl::new(tracker, metrics.clone()).install(router);
    }

    if let Some(metrics) = metrics {
        router = router.layer(middleware::from_fn_with_state(metrics, track_metrics));
    }

    router.layer(TimeoutLayer::with_status_code(
        StatusCode::REQUEST_TIMEOUT,
        REQUEST_TIMEOUT,
    ))
}
