//! Shared fixtures for unit tests: a scripted transport and sample entities.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::{Value, json};

use crate::cache::{QueryCache, QueryOptions};
use crate::net::api::ApiClient;
use crate::net::error::TransportError;
use crate::net::transport::{HttpRequest, HttpResponse, HttpTransport, Method};
use crate::net::types::{Household, Role, User};

pub const BASE_URL: &str = "http://api.test";

// =============================================================================
// MockTransport
// =============================================================================

#[derive(Clone, Debug)]
enum Reply {
    Http { status: u16, body: String },
    NetworkFailure,
}

/// One request seen by the mock, with the base URL stripped.
#[derive(Clone, Debug)]
pub struct RecordedCall {
    pub method: Method,
    pub path: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<Value>,
}

impl RecordedCall {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// Scripted transport. Replies queue per `(method, path)`; the last queued
/// reply is sticky. Unscripted routes answer 404. Every call yields once so
/// overlapping futures interleave the way they would over a real socket.
#[derive(Default)]
pub struct MockTransport {
    routes: Mutex<HashMap<(Method, String), VecDeque<Reply>>>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl MockTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn push(&self, method: Method, path: &str, reply: Reply) {
        self.routes
            .lock()
            .unwrap()
            .entry((method, path.to_owned()))
            .or_default()
            .push_back(reply);
    }

    pub fn reply(&self, method: Method, path: &str, status: u16, body: Value) {
        self.push(method, path, Reply::Http { status, body: body.to_string() });
    }

    pub fn reply_raw(&self, method: Method, path: &str, status: u16, body: &str) {
        self.push(method, path, Reply::Http { status, body: body.to_owned() });
    }

    pub fn fail(&self, method: Method, path: &str) {
        self.push(method, path, Reply::NetworkFailure);
    }

    /// Standard token endpoint reply.
    pub fn csrf(&self, token: &str) {
        self.reply(Method::GET, "/auth/csrf-token", 200, json!({ "csrfToken": token }));
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, method: &Method, path: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|call| call.method == *method && call.path == path)
            .count()
    }

    pub fn last(&self, method: &Method, path: &str) -> Option<RecordedCall> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|call| call.method == *method && call.path == path)
            .cloned()
    }

    fn next_reply(&self, method: &Method, path: &str) -> Reply {
        let mut routes = self.routes.lock().unwrap();
        match routes.get_mut(&(method.clone(), path.to_owned())) {
            Some(queue) if queue.len() > 1 => queue.pop_front().unwrap(),
            Some(queue) if !queue.is_empty() => queue[0].clone(),
            _ => Reply::Http { status: 404, body: json!({ "error": "no route" }).to_string() },
        }
    }
}

#[async_trait::async_trait]
impl HttpTransport for MockTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let path = request
            .url
            .strip_prefix(BASE_URL)
            .unwrap_or(&request.url)
            .to_owned();
        self.calls.lock().unwrap().push(RecordedCall {
            method: request.method.clone(),
            path: path.clone(),
            headers: request.headers.clone(),
            body: request.body.clone(),
        });

        tokio::task::yield_now().await;

        match self.next_reply(&request.method, &path) {
            Reply::Http { status, body } => Ok(HttpResponse { status, body }),
            Reply::NetworkFailure => Err(TransportError::Request("connection refused".into())),
        }
    }
}

// =============================================================================
// WIRING
// =============================================================================

pub fn api_client(mock: &Arc<MockTransport>) -> Arc<ApiClient> {
    Arc::new(ApiClient::new(mock.clone(), BASE_URL))
}

/// Cache that never sleeps between retries.
pub fn query_cache() -> Arc<QueryCache> {
    Arc::new(QueryCache::new(QueryOptions {
        stale_time: Duration::from_secs(600),
        retry: 0,
        retry_delay: Duration::ZERO,
    }))
}

// =============================================================================
// FIXTURES
// =============================================================================

pub fn user(id: &str, default_household_id: Option<&str>) -> User {
    User {
        id: id.to_owned(),
        name: "Alice".to_owned(),
        email: Some("a@b.com".to_owned()),
        default_household_id: default_household_id.map(ToOwned::to_owned),
    }
}

pub fn household(id: &str, name: &str, role: Role) -> Household {
    Household {
        id: id.to_owned(),
        name: name.to_owned(),
        description: None,
        owner_id: "u1".to_owned(),
        member_count: 1,
        user_role: role,
        created_at: "2024-01-01T00:00:00Z".to_owned(),
    }
}

/// Wrap a value in the standard `{ data }` envelope.
pub fn envelope<T: serde::Serialize>(data: &T) -> Value {
    json!({ "data": data })
}
