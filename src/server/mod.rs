pub mod config;
pub mod error;
mod export_routes;
mod http_layers;
mod match_routes;
pub mod metrics;
mod playlist_routes;
#[allow(clippy::module_inception)]
pub mod server;
pub mod state;
mod track_routes;

pub use config::ServerConfig;
pub use error::ApiError;
pub use http_layers::*;
pub use server::{make_app, run_server};
pub use state::ServerState;
