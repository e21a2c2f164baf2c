//! Shared utilities

pub mod error;
pub mod listeners;

pub use error::{AppError, AppResult};
pub use listeners::Listeners;
