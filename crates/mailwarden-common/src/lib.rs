//! MailWarden Common - Shared types and utilities
//!
//! This crate provides configuration, the error taxonomy, identifier types
//! and link signing shared across all MailWarden components.

pub mod config;
pub mod error;
pub mod signing;
pub mod types;

pub use config::Config;
pub use error::{Error, Result};
