pub mod config;
pub mod lifecycle;
pub mod routes;
pub mod telemetry;
