//! Per-request context shared by handlers and middleware.
//!
//! # Responsibilities
//! - Carry the inbound request head, buffered body and path parameters
//! - Collect the outbound response (status, headers, body)
//! - Turn the collected response into an axum `Response`
//!
//! # Design Decisions
//! - `Context` is cheap to clone: request data and writer live behind `Arc`
//! - The status line is written once; later writes are ignored and logged
//! - A forwarded response (static files) keeps its streaming body

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use axum::body::{Body, Bytes};
use axum::http::request::Parts;
use axum::http::{
    header, HeaderMap, HeaderName, HeaderValue, Method, Request, StatusCode, Uri, Version,
};
use axum::response::Response;
use serde::Serialize;

/// A fresh value per request pairing the request with its response sink.
///
/// Handlers may read and write through it but must not keep it alive past
/// the request. Client disconnects drop the request future, so cancellation
/// reaches handlers as their own future being dropped.
#[derive(Clone)]
pub struct Context {
    request: Arc<RequestData>,
    writer: ResponseWriter,
}

struct RequestData {
    parts: Parts,
    body: Bytes,
    params: Vec<(String, String)>,
}

impl Context {
    /// Create a context from an already split request.
    pub fn new(parts: Parts, body: Bytes) -> Self {
        Self::with_params(parts, body, Vec::new())
    }

    /// Create a context carrying captured path parameters.
    pub fn with_params(parts: Parts, body: Bytes, params: Vec<(String, String)>) -> Self {
        Self {
            request: Arc::new(RequestData { parts, body, params }),
            writer: ResponseWriter::default(),
        }
    }

    pub fn method(&self) -> &Method {
        &self.request.parts.method
    }

    pub fn uri(&self) -> &Uri {
        &self.request.parts.uri
    }

    pub fn path(&self) -> &str {
        self.request.parts.uri.path()
    }

    pub fn query(&self) -> Option<&str> {
        self.request.parts.uri.query()
    }

    pub fn version(&self) -> Version {
        self.request.parts.version
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.request.parts.headers
    }

    /// Header value as a string, `None` when absent or not visible ASCII.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.request
            .parts
            .headers
            .get(name)
            .and_then(|v| v.to_str().ok())
    }

    /// The buffered request body.
    pub fn body(&self) -> &Bytes {
        &self.request.body
    }

    /// Value of a named path segment, e.g. `id` for `/users/{id}`.
    pub fn param(&self, name: &str) -> Option<&str> {
        self.request
            .params
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn params(&self) -> &[(String, String)] {
        &self.request.params
    }

    /// The response sink for this request.
    pub fn writer(&self) -> &ResponseWriter {
        &self.writer
    }

    /// Rebuild an owned request, for delegating to a tower service.
    pub fn to_request(&self) -> Request<Body> {
        let parts = &self.request.parts;
        let mut req = Request::new(Body::from(self.request.body.clone()));
        *req.method_mut() = parts.method.clone();
        *req.uri_mut() = parts.uri.clone();
        *req.version_mut() = parts.version;
        *req.headers_mut() = parts.headers.clone();
        req
    }

    /// Take the collected response out of the writer.
    pub fn into_response(self) -> Response {
        self.writer.take_response()
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("method", self.method())
            .field("uri", self.uri())
            .field("params", &self.request.params)
            .finish()
    }
}

/// Outbound response sink shared by every clone of a [`Context`].
#[derive(Clone, Default)]
pub struct ResponseWriter {
    inner: Arc<Mutex<ResponseState>>,
}

#[derive(Default)]
struct ResponseState {
    status: Option<StatusCode>,
    headers: HeaderMap,
    body: ResponseBody,
}

enum ResponseBody {
    Buffered(Vec<u8>),
    Forwarded(Body),
}

impl Default for ResponseBody {
    fn default() -> Self {
        ResponseBody::Buffered(Vec::new())
    }
}

impl ResponseWriter {
    fn state(&self) -> MutexGuard<'_, ResponseState> {
        // A panicking handler must not wedge the response for a recovery middleware.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Write the status line. Only the first call takes effect.
    pub fn write_header(&self, status: StatusCode) {
        let mut state = self.state();
        match state.status {
            Some(existing) => {
                tracing::warn!(
                    existing = %existing,
                    ignored = %status,
                    "Superfluous write_header call"
                );
            }
            None => state.status = Some(status),
        }
    }

    /// The status written so far, if any.
    pub fn status(&self) -> Option<StatusCode> {
        self.state().status
    }

    pub fn is_written(&self) -> bool {
        self.state().status.is_some()
    }

    /// Replace a response header.
    pub fn set_header(&self, name: HeaderName, value: HeaderValue) {
        self.state().headers.insert(name, value);
    }

    /// Append a response header, keeping existing values.
    pub fn append_header(&self, name: HeaderName, value: HeaderValue) {
        self.state().headers.append(name, value);
    }

    pub fn header(&self, name: &HeaderName) -> Option<HeaderValue> {
        self.state().headers.get(name).cloned()
    }

    /// Snapshot of the response headers written so far.
    pub fn headers(&self) -> HeaderMap {
        self.state().headers.clone()
    }

    /// Append to the response body, implying `200 OK` if no status was written.
    pub fn write(&self, data: impl AsRef<[u8]>) {
        let mut state = self.state();
        if state.status.is_none() {
            state.status = Some(StatusCode::OK);
        }
        match &mut state.body {
            ResponseBody::Buffered(buf) => buf.extend_from_slice(data.as_ref()),
            ResponseBody::Forwarded(_) => {
                tracing::warn!("Write after a forwarded response body was ignored");
            }
        }
    }

    /// Write a plain text response.
    pub fn text(&self, status: StatusCode, body: impl AsRef<str>) {
        self.default_content_type("text/plain; charset=utf-8");
        self.write_header(status);
        self.write(body.as_ref());
    }

    /// Serialize `value` as a JSON response.
    pub fn json<T: Serialize>(&self, status: StatusCode, value: &T) -> Result<(), serde_json::Error> {
        let bytes = serde_json::to_vec(value)?;
        self.default_content_type("application/json");
        self.write_header(status);
        self.write(bytes);
        Ok(())
    }

    /// Hand a complete response to the writer.
    ///
    /// Its headers are appended to those already set, its status is written
    /// through [`write_header`](Self::write_header) and its body replaces the
    /// buffered one.
    pub fn forward(&self, response: Response) {
        let (parts, body) = response.into_parts();
        self.write_header(parts.status);
        let mut state = self.state();
        for (name, value) in parts.headers.iter() {
            state.headers.append(name.clone(), value.clone());
        }
        state.body = ResponseBody::Forwarded(body);
    }

    fn default_content_type(&self, value: &'static str) {
        let mut state = self.state();
        if !state.headers.contains_key(header::CONTENT_TYPE) {
            state
                .headers
                .insert(header::CONTENT_TYPE, HeaderValue::from_static(value));
        }
    }

    fn take_response(&self) -> Response {
        let state = std::mem::take(&mut *self.state());
        let body = match state.body {
            ResponseBody::Buffered(buf) => Body::from(buf),
            ResponseBody::Forwarded(body) => body,
        };
        let mut response = Response::new(body);
        *response.status_mut() = state.status.unwrap_or(StatusCode::OK);
        *response.headers_mut() = state.headers;
        response
    }
}
