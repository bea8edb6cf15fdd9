//! Centralized error handling for the media proxy core.
//!
//! # Usage
//!
//! ```rust
//! use media_proxy_core::errors::{AppError, AppResult};
//!
//! async fn example_function() -> AppResult<String> {
//!     Ok("success".to_string())
//! }
//! ```

pub mod types;

pub use types::*;

/// Convenience type alias for Results using AppError.
pub type AppResult<T> = Result<T, AppError>;
