//! Shared types, errors, and configuration for Ratechart.
//!
//! This crate provides common types used across all other crates:
//! - Typed IDs for headers, societies, and machines
//! - Application-wide error types
//! - Configuration management

pub mod config;
pub mod error;
pub mod types;

pub use config::{AppConfig, DatabaseConfig, ServerConfig, UploadConfig};
pub use error::{AppError, AppResult};
