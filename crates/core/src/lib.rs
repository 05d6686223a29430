//! Core types and shared functionality for offgrid.
//!
//! This crate provides:
//! - Cache store backend with SQLite
//! - Unified error types
//! - Configuration structures

pub mod cache;
pub mod config;
pub mod error;

pub use cache::{CacheDb, CacheEntry, CacheStore};
pub use config::{AppConfig, ConfigError};
pub use error::Error;
