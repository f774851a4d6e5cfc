//! Ambient infrastructure shared by Keystone services: tracing setup,
//! request-id middleware, health probes, env helpers and sea-orm query
//! extensions.

pub mod config;
pub mod health;
pub mod middleware;
pub mod sea_ext;
pub mod serde;
pub mod tracing;
