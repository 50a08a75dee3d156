pub mod config;
pub mod error;
mod metrics;
pub mod routes;
pub mod state;
pub mod telemetry;
