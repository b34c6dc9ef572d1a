//! Infrastructure adapters and runtime bootstrap.

pub mod acquisition;
pub mod db;
pub mod error;
pub mod http;
pub mod summary;
pub mod telemetry;
