//! Cache inspection tools.
//!
//! Read-only views of the cache stores, for checking what a generation
//! precached and what it picked up at runtime.

pub mod get;
pub mod list;

pub use get::{CacheGetParams, get_impl};
pub use list::list_impl;
