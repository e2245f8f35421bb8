mod client;
mod config;
mod fleet_telemetry_repository;
mod migrations;

pub use client::*;
pub use config::*;
pub use fleet_telemetry_repository::*;
pub use migrations::*;
