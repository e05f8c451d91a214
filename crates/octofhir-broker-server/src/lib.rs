//! HTTP server hosting the authentication broker.

pub mod config;
pub mod observability;
pub mod server;

pub use config::AppConfig;
pub use server::{BrokerServer, ServerBuilder, build_app, build_broker, check_providers};
