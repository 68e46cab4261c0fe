mod health;
mod items;
mod metrics;

pub use health::health_handler;
pub use items::{create_item_handler, get_items_handler};
pub use metrics::metrics_handler;
