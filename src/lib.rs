//! Skywatch Library
//!
//! Weather, aviation and energy data collector backed by InfluxDB

pub mod config;
pub mod error;
pub mod providers;
pub mod reconcile;
pub mod scheduler;
pub mod sink;
pub mod types;

#[cfg(feature = "api")]
pub mod api;
