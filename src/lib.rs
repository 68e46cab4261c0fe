pub mod clock;
pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod models;
pub mod rate_limit;
pub mod routes;
pub mod server;
pub mod state;

pub use config::{Args, Config};
pub use error::{ConfigError, GatewayError};
pub use rate_limit::{Admission, ClientTracker};
pub use routes::initialize_routes;
