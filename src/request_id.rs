//! Request-id propagation.
//!
//! Every request is tagged with an id (inbound `x-request-id` or a generated
//! one) held in a task-local scope so error payloads and log lines can
//! reference it without threading it through call signatures.

use axum::{
    body::Body,
    http::{HeaderValue, Request},
    middleware::Next,
    response::Response,
};
use std::future::Future;
use uuid::Uuid;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

#[derive(Debug, Clone)]
pub struct RequestId(String);

impl RequestId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn generate() -> Self {
        Self(format!("req-{}", Uuid::new_v4().simple()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

tokio::task_local! {
    static CURRENT_REQUEST_ID: RequestId;
}

/// Runs `f` with `id` installed as the ambient request id.
pub async fn scope_request_id<F>(id: RequestId, f: F) -> F::Output
where
    F: Future,
{
    CURRENT_REQUEST_ID.scope(id, f).await
}

/// The request id of the current task scope, if one is installed.
pub fn current_request_id() -> Option<RequestId> {
    CURRENT_REQUEST_ID.try_with(|rid| rid.clone()).ok()
}

/// Ensures every request carries a request id and echoes it on the response.
pub async fn request_id_middleware(req: Request<Body>, next: Next) -> Response {
    let rid = req
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.trim().is_empty())
        .map(RequestId::new)
        .unwrap_or_else(RequestId::generate);

    let echo = HeaderValue::from_str(rid.as_str()).ok();
    let mut response = scope_request_id(rid, next.run(req)).await;
    if let Some(value) = echo {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    response
}
