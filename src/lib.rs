pub mod analysis;
pub mod api;
pub mod cache;
pub mod config;
pub mod controller;
pub mod coordinator;
pub mod diagnostics;
pub mod domain;
pub mod error;
pub mod forecast;
pub mod sensor;
pub mod telemetry;
