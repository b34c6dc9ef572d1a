//! Application services and the ports they depend on.

pub mod acquisition;
pub mod error;
pub mod flight;
pub mod pagination;
pub mod query;
pub mod repos;
pub mod resolver;
pub mod summary;
