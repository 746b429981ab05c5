// Sync engine for the local diagram and symbol library
pub mod api;

// Re-export api modules at crate root so callers can use crate::models, crate::storage, ...
pub use api::config;
pub use api::models;
pub use api::services;
pub use api::storage;
