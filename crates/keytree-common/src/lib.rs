//! keytree Common - Shared types and utilities
//!
//! This crate provides the store record type, error definitions, and the
//! layered configuration used across all keytree components.

pub mod config;
pub mod error;
pub mod types;

pub use config::Config;
pub use error::{Error, Result};
pub use types::*;
