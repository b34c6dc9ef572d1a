//! Company page resolver: cache, durable store and on-demand acquisition
//! behind a small read API.

pub mod application;
pub mod cache;
pub mod config;
pub mod domain;
pub mod infra;
