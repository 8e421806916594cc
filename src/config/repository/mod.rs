//! Repository layer for database operations

pub mod context;
pub mod endpoints;
pub mod sessions;
