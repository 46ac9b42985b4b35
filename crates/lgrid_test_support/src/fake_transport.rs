use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use lgrid_core::{GridError, HttpMethod, HttpRequest, HttpResponse, HttpTransport};
use serde::Serialize;

type Handler = Arc<dyn Fn(&HttpRequest) -> Result<HttpResponse, GridError> + Send + Sync>;

/// Scripted reply for one route.
#[derive(Clone)]
pub enum FakeReply {
    Respond(HttpResponse),
    Fail(String),
    /// Never resolves; used to observe cancellation.
    Hang,
    Handle(Handler),
}

impl FakeReply {
    pub fn json<B: Serialize>(body: &B) -> Self {
        match serde_json::to_string(body) {
            Ok(body) => Self::Respond(HttpResponse::new(200, body)),
            Err(err) => Self::Fail(err.to_string()),
        }
    }

    pub fn status(status: u16, body: impl Into<String>) -> Self {
        Self::Respond(HttpResponse::new(status, body))
    }

    pub fn handler(
        handler: impl Fn(&HttpRequest) -> Result<HttpResponse, GridError> + Send + Sync + 'static,
    ) -> Self {
        Self::Handle(Arc::new(handler))
    }
}

impl std::fmt::Debug for FakeReply {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Respond(response) => f.debug_tuple("Respond").field(response).finish(),
            Self::Fail(message) => f.debug_tuple("Fail").field(message).finish(),
            Self::Hang => f.write_str("Hang"),
            Self::Handle(_) => f.write_str("Handle"),
        }
    }
}

type RouteKey = (HttpMethod, String);

#[derive(Default)]
struct FakeTransportState {
    once: Mutex<HashMap<RouteKey, VecDeque<FakeReply>>>,
    routes: Mutex<HashMap<RouteKey, FakeReply>>,
    requests: Mutex<Vec<HttpRequest>>,
    hung: AtomicUsize,
}

/// In-memory [`HttpTransport`] answering from scripted routes and
/// recording every request. Routes match on method and path; the query
/// string is ignored for matching. Unscripted routes answer 404.
#[derive(Clone, Default)]
pub struct FakeTransport {
    state: Arc<FakeTransportState>,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replies with `reply` to every request on the route.
    pub fn route(self, method: HttpMethod, path: impl Into<String>, reply: FakeReply) -> Self {
        self.set_route(method, path, reply);
        self
    }

    pub fn set_route(&self, method: HttpMethod, path: impl Into<String>, reply: FakeReply) {
        mutex_lock(&self.state.routes).insert((method, path.into()), reply);
    }

    /// Queues a reply used once, ahead of the route's standing reply.
    pub fn push_once(&self, method: HttpMethod, path: impl Into<String>, reply: FakeReply) {
        mutex_lock(&self.state.once)
            .entry((method, path.into()))
            .or_default()
            .push_back(reply);
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        mutex_lock(&self.state.requests).clone()
    }

    pub fn requests_to(&self, method: HttpMethod, path: &str) -> Vec<HttpRequest> {
        self.requests()
            .into_iter()
            .filter(|request| request.method == method && request.path == path)
            .collect()
    }

    /// Request lines as `METHOD path?query`, in arrival order.
    pub fn request_lines(&self) -> Vec<String> {
        self.requests()
            .iter()
            .map(|request| format!("{} {}", request.method.as_str(), request.path_and_query()))
            .collect()
    }

    pub fn hung_requests(&self) -> usize {
        self.state.hung.load(Ordering::Relaxed)
    }

    fn next_reply(&self, key: &RouteKey) -> Option<FakeReply> {
        if let Some(reply) = mutex_lock(&self.state.once)
            .get_mut(key)
            .and_then(VecDeque::pop_front)
        {
            return Some(reply);
        }
        mutex_lock(&self.state.routes).get(key).cloned()
    }
}

#[async_trait]
impl HttpTransport for FakeTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, GridError> {
        mutex_lock(&self.state.requests).push(request.clone());

        let key = (request.method, request.path.clone());
        match self.next_reply(&key) {
            Some(FakeReply::Respond(response)) => Ok(response),
            Some(FakeReply::Fail(message)) => Err(GridError::Transport(message)),
            Some(FakeReply::Handle(handler)) => handler(&request),
            Some(FakeReply::Hang) => {
                self.state.hung.fetch_add(1, Ordering::Relaxed);
                std::future::pending::<Result<HttpResponse, GridError>>().await
            }
            None => Ok(HttpResponse::new(404, "no route")),
        }
    }
}

fn mutex_lock<T>(lock: &Mutex<T>) -> MutexGuard<'_, T> {
    match lock.lock() {
        Ok(guard) => guard,
        Err(poison_error) => poison_error.into_inner(),
    }
}
