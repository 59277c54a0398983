pub mod analysis_limiter;
pub mod app;
pub mod bootstrap;
pub mod config;
pub mod error;
pub mod repositories;
pub mod routes;
pub mod state;
pub mod telemetry;
