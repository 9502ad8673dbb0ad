//! Centralized error handling for media-hooks
//!
//! # Error Categories
//!
//! - **Store Errors**: SQLite plugin-data store and migrations
//! - **Client Errors**: outbound REST calls (Bangumi, TMDB, Douban, downloaders)
//! - **Web Errors**: webhook ingress and plugin endpoints
//!
//! Plugins themselves return `anyhow::Result` and treat most of these as soft
//! failures; the typed errors exist so callers can decide what is retryable.

pub mod types;

pub use types::*;

/// Convenience type alias for Results using AppError
pub type AppResult<T> = Result<T, AppError>;

/// Convenience type alias for plugin-data store Results
pub type StoreResult<T> = Result<T, StoreError>;

/// Convenience type alias for outbound client Results
pub type ClientResult<T> = Result<T, ClientError>;
