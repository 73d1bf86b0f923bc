//! Telemetry ingest service that keeps only the latest reading per device.

pub mod clock;
pub mod config;
pub mod db;
pub mod errors;
pub mod metrics;
pub mod model;
pub mod rest;
pub mod validate;
