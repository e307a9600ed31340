pub mod auth;
pub mod config;
pub mod database;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod query;
pub mod services;
pub mod store;
pub mod utils;

// Note: avoid glob re-exports to prevent ambiguous symbol re-exports
// Consumers should reference items through their module paths, e.g.:
// `crate::models::SubjectWithDepartment` or `crate::query::SubjectFilter`.
