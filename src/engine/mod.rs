//! Bridge between the HTTP server and the [`Router`].
//!
//! Converts a parsed [`Request`] into an [`Inbound`], runs the dispatch, and
//! renders the [`DispatchOutcome`] as an HTTP response.

use std::sync::Arc;

use bytes::Bytes;
use tracing::error;

use crate::context::ContentKind;
use crate::http::{Request, Response, StatusCode};
use crate::router::{DispatchOutcome, Inbound, Router};
use crate::server::{Server, ServerError};

const JSON: &str = "application/json";
const MULTIPART: &str = "multipart/form-data";

/// Dispatches `request` on `router` and renders the result.
pub fn handle(router: &Router, request: Request) -> Response {
    render(router.dispatch_inbound(inbound(request)))
}

/// Builds the router's view of `request`.
pub fn inbound(request: Request) -> Inbound {
    let body = match request.content_type() {
        Some(ct) if is_multipart(ct) => strip_multipart(request.body()),
        _ => request.body().clone(),
    };
    let mut inbound = Inbound::new(request.method().clone(), request.target(), body);
    inbound.api_token = request.authorization().map(str::to_owned);
    inbound
}

/// Renders a dispatch outcome.
///
/// File content is sent as a `text/plain` attachment; anything else is JSON,
/// with `{}` standing in for a handler that wrote nothing.
pub fn render(outcome: DispatchOutcome) -> Response {
    let response = Response::new(outcome.status);
    match outcome.kind {
        ContentKind::File => {
            let disposition = match &outcome.description {
                Some(name) => format!("attachment; filename=\"{name}\""),
                None => "attachment;".to_owned(),
            };
            response
                .header("Content-Type", "text/plain")
                .header("Content-Disposition", disposition)
                .body_bytes(outcome.content)
        }
        ContentKind::Json if !outcome.content.is_empty() => response
            .header("Content-Type", JSON)
            .body_bytes(outcome.content),
        ContentKind::Json | ContentKind::None => response
            .header("Content-Type", JSON)
            .body_bytes(Bytes::from_static(b"{}")),
    }
}

fn is_multipart(content_type: &str) -> bool {
    content_type
        .get(..MULTIPART.len())
        .is_some_and(|head| head.eq_ignore_ascii_case(MULTIPART))
}

/// Extracts the payload of the first part of a `multipart/form-data` body.
///
/// Everything up to the first blank line (boundary and part headers) is
/// dropped, then the closing boundary line after the payload. A body without
/// a blank line is returned unchanged.
pub fn strip_multipart(body: &Bytes) -> Bytes {
    let Some(start) = find(body, b"\r\n\r\n").map(|pos| pos + 4) else {
        return body.clone();
    };
    let mut part = body.slice(start..);
    if part.ends_with(b"\r\n") {
        part.truncate(part.len() - 2);
    }
    if let Some(end) = rfind(&part, b"\r\n") {
        part.truncate(end);
    }
    part
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

fn rfind(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).rposition(|w| w == needle)
}

/// Runs `server`, dispatching every request on `router`.
///
/// Handlers are synchronous, so each dispatch runs on tokio's blocking pool.
/// A handler that panics produces a 500.
///
/// # Errors
///
/// Returns [`ServerError::Io`] if the listener fails.
pub async fn serve(server: Server, router: Arc<Router>) -> Result<(), ServerError> {
    server
        .run(move |request: Request| {
            let router = Arc::clone(&router);
            async move {
                let uri = request.target().to_owned();
                match tokio::task::spawn_blocking(move || handle(&router, request)).await {
                    Ok(response) => response,
                    Err(e) => {
                        error!(uri = %uri, error = %e, "dispatch task failed");
                        render(DispatchOutcome::empty(StatusCode::InternalServerError))
                    }
                }
            }
        })
        .await
}
