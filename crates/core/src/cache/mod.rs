//! SQLite-backed cache stores.
//!
//! This module provides the persistent backend behind every cache generation,
//! with async access via tokio-rusqlite. It supports:
//!
//! - One named store per cache version, deleted as a unit
//! - Entries keyed by SHA-256 of request method and URL
//! - Atomic batch writes for precaching
//! - Automatic schema migrations

pub mod connection;
pub mod entries;
pub mod hash;
pub mod migrations;
pub mod stores;

pub use crate::Error;

pub use connection::CacheDb;
pub use entries::{CacheEntry, CacheStore};
