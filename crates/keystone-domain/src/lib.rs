//! Domain types shared across all Keystone services.
//!
//! This crate contains only pure types with no framework dependencies.
//! Imported by every layer of a service, including `infra/` mappers.

pub mod id;
pub mod pagination;
pub mod user;
