//! Scripted network double shared by the unit tests.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use bytes::Bytes;
use reqwest::header::HeaderMap;
use reqwest::{StatusCode, Url};

use crate::fetch::Transport;
use crate::request::{Request, Response};
use offgrid_core::Error;

pub(crate) const ORIGIN: &str = "http://localhost:8080";

pub(crate) fn url(path: &str) -> Url {
    Url::parse(ORIGIN).unwrap().join(path).unwrap()
}

enum Route {
    Respond(u16, &'static str),
    Fail,
}

/// Answers from a fixed route table and records every call.
///
/// Unrouted URLs answer 404. While offline every fetch fails.
#[derive(Default)]
pub(crate) struct ScriptedTransport {
    routes: Mutex<HashMap<String, Route>>,
    calls: Mutex<Vec<String>>,
    offline: AtomicBool,
}

impl ScriptedTransport {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn respond(&self, path: &str, status: u16, body: &'static str) {
        self.routes
            .lock()
            .unwrap()
            .insert(url(path).to_string(), Route::Respond(status, body));
    }

    pub(crate) fn fail(&self, path: &str) {
        self.routes.lock().unwrap().insert(url(path).to_string(), Route::Fail);
    }

    pub(crate) fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub(crate) fn calls_to(&self, path: &str) -> usize {
        let target = url(path).to_string();
        self.calls.lock().unwrap().iter().filter(|c| **c == target).count()
    }

    pub(crate) fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait::async_trait]
impl Transport for ScriptedTransport {
    async fn fetch(&self, request: &Request) -> Result<Response, Error> {
        let key = request.url.to_string();
        self.calls.lock().unwrap().push(key.clone());

        if self.offline.load(Ordering::SeqCst) {
            return Err(Error::Network(format!("offline: {key}")));
        }

        let (status, body) = match self.routes.lock().unwrap().get(&key) {
            Some(Route::Respond(status, body)) => (*status, *body),
            Some(Route::Fail) => return Err(Error::Network(format!("connection reset: {key}"))),
            None => (404, "not found"),
        };

        Ok(Response {
            url: request.url.clone(),
            status: StatusCode::from_u16(status).unwrap(),
            headers: HeaderMap::new(),
            body: Bytes::from_static(body.as_bytes()),
        })
    }
}
