use std::sync::Arc;
use tokio::sync::RwLock;

use crate::metrics::Metrics;
use crate::models::Item;

// app's shared state, handed to handlers through axum's State extractor

pub struct AppState {
    pub items: RwLock<Vec<Item>>,
    pub metrics: Option<Arc<Metrics>>, // only present when telemetry is enabled
}

impl AppState {
    pub fn new(metrics: Option<Arc<Metrics>>) -> Self {
        Self {
            items: RwLock::new(vec![
                Item::new("1", "Item One"),
                Item::new("2", "Item Two"),
            ]),
            metrics,
        }
    }
}
