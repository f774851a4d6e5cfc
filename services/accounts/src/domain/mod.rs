pub mod filter;
pub mod rbac;
pub mod repository;
pub mod types;
pub mod view;
