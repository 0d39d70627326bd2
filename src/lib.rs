// BlockBuzz discovery backend - events, interactions, and the
// recommendation/search pipeline

// HTTP surface and router
pub mod api;
pub mod app_state;
pub mod auth;
pub mod config;

// Storage and domain types
pub mod database;
pub mod models;

// Discovery pipeline - nearby search, semantic search, recommendation blender
pub mod discovery;
pub mod embedding;
pub mod geo;
pub mod scorer;

// Common utilities
pub mod error;

// Re-exports for convenience
pub use error::{AppError, AppResult};
