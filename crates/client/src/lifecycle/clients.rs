//! Registry of open clients and the cache generation controlling each.

use std::collections::BTreeMap;
use std::sync::{Mutex, PoisonError};

/// Open clients keyed by id.
///
/// A client opened while no generation is active stays uncontrolled until the
/// next activation claims it.
#[derive(Debug, Default)]
pub struct Clients {
    controllers: Mutex<BTreeMap<String, Option<String>>>,
}

impl Clients {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a client, optionally already controlled by `version`.
    pub fn open(&self, id: &str, controller: Option<String>) {
        self.controllers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id.to_string(), controller);
    }

    /// Forget a client. Returns false if it was not open.
    pub fn close(&self, id: &str) -> bool {
        self.controllers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id)
            .is_some()
    }

    /// Make `version` the controller of every open client.
    ///
    /// Returns the number of clients whose controller changed.
    pub fn claim(&self, version: &str) -> usize {
        let mut controllers = self.controllers.lock().unwrap_or_else(PoisonError::into_inner);
        let mut claimed = 0;
        for controller in controllers.values_mut() {
            if controller.as_deref() != Some(version) {
                *controller = Some(version.to_string());
                claimed += 1;
            }
        }
        claimed
    }

    /// The generation controlling a client, if any.
    pub fn controller(&self, id: &str) -> Option<String> {
        self.controllers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
            .flatten()
    }

    pub fn len(&self) -> usize {
        self.controllers.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
