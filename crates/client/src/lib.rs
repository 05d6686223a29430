//! Request interception for offgrid.
//!
//! This crate provides the network transport, request classification, the
//! prefer-cache and prefer-network strategies, and the install/activate
//! lifecycle used by the server.

pub mod classify;
pub mod fetch;
pub mod interceptor;
pub mod lifecycle;
pub mod request;
pub mod strategy;

#[cfg(test)]
pub(crate) mod testing;

pub use classify::{Classification, ClassifierPolicy, RequestCategory, Strategy, classify};
pub use fetch::{FetchConfig, HttpTransport, Transport};
pub use interceptor::{Intercepted, Interceptor};
pub use lifecycle::{ActivateReport, Clients, Generation, InstallReport, Lifecycle, LifecycleState};
pub use request::{Destination, Request, RequestMode, Response};
pub use strategy::{ResponseSource, Served};
