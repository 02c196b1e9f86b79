//! Module registration and request dispatch.
//!
//! A [`Router`] owns up to [`MAX_MODULES`] modules. Each module is named by a
//! path prefix and holds an ordered table of URI patterns; each pattern holds
//! at most one handler per method.
//!
//! | Registered on `cfg` | Request                 | Matches |
//! |---------------------|-------------------------|---------|
//! | `/items/+`          | `/cfg/items/42`         | yes     |
//! | `/items/+/detail`   | `/cfg/items/5/6/detail` | no      |
//! | `/files/#`          | `/cfg/files/a/b/c`      | yes     |
//!
//! Dispatch resolves the handler under a read lock, releases the lock, and
//! runs the handler with its own [`DispatchContext`], so any number of
//! requests can be handled at once. Registration takes the write lock.

pub mod matcher;
pub mod pattern;
pub mod registry;

use std::sync::Arc;

use bytes::Bytes;
use parking_lot::RwLock;
use tracing::{debug, warn};

use crate::context::{ContentKind, DispatchContext};
use crate::error::{RestError, RestResult};
use crate::http::{Method, StatusCode};

pub use pattern::{MAX_SEGMENT_LEN, MAX_URI_LEVEL, Segment};
pub use registry::{MAX_MODULES, MAX_PATTERNS, ModuleHandle};

use registry::Registry;

/// What a handler returns. An `Err` is reported with [`RestError::status`]
/// and whatever the handler had written is dropped.
pub type HandlerResult = Result<StatusCode, RestError>;

/// Type-erased handler shared between the registry and in-flight dispatches.
pub type Handler = Arc<dyn Fn(&mut DispatchContext) -> HandlerResult + Send + Sync + 'static>;

/// One request as delivered by the transport.
#[derive(Debug, Clone)]
pub struct Inbound {
    pub method: Method,
    pub uri: String,
    pub body: Bytes,
    pub api_token: Option<String>,
}

impl Inbound {
    pub fn new(method: Method, uri: impl Into<String>, body: impl Into<Bytes>) -> Self {
        Self {
            method,
            uri: uri.into(),
            body: body.into(),
            api_token: None,
        }
    }

    #[must_use]
    pub fn api_token(mut self, token: impl Into<String>) -> Self {
        self.api_token = Some(token.into());
        self
    }
}

/// Result of one dispatch, handed back to the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchOutcome {
    pub status: StatusCode,
    pub kind: ContentKind,
    pub content: Bytes,
    /// File name for [`ContentKind::File`] content.
    pub description: Option<String>,
}

impl DispatchOutcome {
    /// An outcome with no content.
    pub fn empty(status: StatusCode) -> Self {
        Self {
            status,
            kind: ContentKind::None,
            content: Bytes::new(),
            description: None,
        }
    }
}

/// The routing table plus the dispatcher.
///
/// # Examples
///
/// ```
/// use agentrest::http::{Method, StatusCode};
/// use agentrest::context::ContentKind;
/// use agentrest::router::Router;
///
/// let router = Router::new();
/// let cfg = router.register_module("cfg").unwrap();
/// router
///     .get(cfg, "/items/+", |ctx| {
///         let id = ctx.segment(2)?.to_owned();
///         ctx.write(format!(r#"{{"id":{id}}}"#))?;
///         Ok(StatusCode::Ok)
///     })
///     .unwrap();
///
/// let out = router.dispatch(Method::Get, "/cfg/items/42?x=1", Vec::new());
/// assert_eq!(out.status, StatusCode::Ok);
/// assert_eq!(out.kind, ContentKind::Json);
/// assert_eq!(&out.content[..], br#"{"id":42}"#);
/// ```
#[derive(Default)]
pub struct Router {
    registry: RwLock<Registry>,
    method_not_allowed: bool,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    /// Report 405 instead of 404 when the path is known but the method is not.
    #[must_use]
    pub fn method_not_allowed(mut self, enabled: bool) -> Self {
        self.method_not_allowed = enabled;
        self
    }

    /// Number of registered modules.
    pub fn module_count(&self) -> usize {
        self.registry.read().len()
    }

    /// Number of patterns registered on `handle`'s module.
    pub fn pattern_count(&self, handle: ModuleHandle) -> RestResult<usize> {
        Ok(self.registry.read().module(handle)?.patterns().len())
    }

    /// Registers a module for path prefix `prefix`.
    ///
    /// # Errors
    ///
    /// - [`RestError::InvalidArgument`] for an empty, multi-component, overlong,
    ///   or already registered prefix.
    /// - [`RestError::CapacityExceeded`] when [`MAX_MODULES`] are registered.
    pub fn register_module(&self, prefix: &str) -> RestResult<ModuleHandle> {
        let handle = self.registry.write().register(prefix)?;
        debug!(prefix, slot = handle.index(), "module registered");
        Ok(handle)
    }

    /// Removes a module with all its patterns and handlers.
    ///
    /// # Errors
    ///
    /// [`RestError::InvalidArgument`] if `handle` is stale.
    pub fn unregister_module(&self, handle: ModuleHandle) -> RestResult<()> {
        let module = self.registry.write().unregister(handle)?;
        debug!(
            prefix = module.prefix(),
            patterns = module.patterns().len(),
            "module unregistered"
        );
        Ok(())
    }

    /// Registers `handler` for `method` on `raw_uri` within a module.
    ///
    /// `raw_uri` is relative to the module, except that a first component
    /// equal to the module prefix is dropped: on module `cfg`, `/items/+` and
    /// `/cfg/items/+` are the same pattern. A sub-path that itself starts with
    /// the prefix must therefore spell the prefix twice (`/cfg/cfg/a` to
    /// match requests for `/cfg/cfg/a`).
    ///
    /// Registering the same (module, pattern, method) again replaces the
    /// handler. A new method on a known pattern reuses that pattern.
    ///
    /// # Errors
    ///
    /// - [`RestError::InvalidArgument`] for a stale handle, a malformed
    ///   pattern, or a method outside GET, POST, PUT, PATCH, DELETE.
    /// - [`RestError::CapacityExceeded`] when the module has [`MAX_PATTERNS`] patterns.
    /// - [`RestError::AllocationFailure`] if the pattern table cannot grow.
    pub fn register_handler<H>(
        &self,
        handle: ModuleHandle,
        raw_uri: &str,
        method: Method,
        handler: H,
    ) -> RestResult<()>
    where
        H: Fn(&mut DispatchContext) -> HandlerResult + Send + Sync + 'static,
    {
        let handler: Handler = Arc::new(handler);
        let mut registry = self.registry.write();
        let module = registry.module_mut(handle)?;
        let replaced = module.add_handler(raw_uri, &method, handler)?;
        debug!(
            prefix = module.prefix(),
            pattern = raw_uri,
            %method,
            replaced,
            "handler registered"
        );
        Ok(())
    }

    pub fn get<H>(&self, handle: ModuleHandle, raw_uri: &str, handler: H) -> RestResult<()>
    where
        H: Fn(&mut DispatchContext) -> HandlerResult + Send + Sync + 'static,
    {
        self.register_handler(handle, raw_uri, Method::Get, handler)
    }

    pub fn post<H>(&self, handle: ModuleHandle, raw_uri: &str, handler: H) -> RestResult<()>
    where
        H: Fn(&mut DispatchContext) -> HandlerResult + Send + Sync + 'static,
    {
        self.register_handler(handle, raw_uri, Method::Post, handler)
    }

    pub fn put<H>(&self, handle: ModuleHandle, raw_uri: &str, handler: H) -> RestResult<()>
    where
        H: Fn(&mut DispatchContext) -> HandlerResult + Send + Sync + 'static,
    {
        self.register_handler(handle, raw_uri, Method::Put, handler)
    }

    pub fn patch<H>(&self, handle: ModuleHandle, raw_uri: &str, handler: H) -> RestResult<()>
    where
        H: Fn(&mut DispatchContext) -> HandlerResult + Send + Sync + 'static,
    {
        self.register_handler(handle, raw_uri, Method::Patch, handler)
    }

    pub fn delete<H>(&self, handle: ModuleHandle, raw_uri: &str, handler: H) -> RestResult<()>
    where
        H: Fn(&mut DispatchContext) -> HandlerResult + Send + Sync + 'static,
    {
        self.register_handler(handle, raw_uri, Method::Delete, handler)
    }

    /// Dispatches one request with no API token.
    pub fn dispatch(&self, method: Method, uri: &str, body: impl Into<Bytes>) -> DispatchOutcome {
        self.dispatch_inbound(Inbound::new(method, uri, body))
    }

    /// Routes `inbound` to its handler and collects the handler's output.
    ///
    /// Never fails: routing failures and handler errors become statuses with
    /// an empty body.
    pub fn dispatch_inbound(&self, inbound: Inbound) -> DispatchOutcome {
        let Inbound {
            method,
            uri,
            body,
            api_token,
        } = inbound;

        let split = match pattern::split_uri(&uri) {
            Ok(split) => split,
            Err(e) => {
                warn!(%method, uri = %uri, error = %e, "rejected request path");
                return DispatchOutcome::empty(StatusCode::NotFound);
            }
        };

        let handler = match self.resolve(&method, &split.segments) {
            Ok(handler) => handler,
            Err(status) => {
                warn!(%method, uri = %uri, status = status.as_u16(), "no handler");
                return DispatchOutcome::empty(status);
            }
        };

        let mut ctx = DispatchContext::new(uri, body, split);
        ctx.set_api_token(api_token);

        match handler(&mut ctx) {
            Ok(status) => {
                let (kind, content, description) = ctx.into_output().finish();
                debug!(
                    %method,
                    status = status.as_u16(),
                    len = content.len(),
                    ?kind,
                    "handler finished"
                );
                DispatchOutcome {
                    status,
                    kind,
                    content,
                    description,
                }
            }
            Err(e) => {
                warn!(%method, uri = ctx.uri(), error = %e, "handler failed");
                DispatchOutcome::empty(e.status())
            }
        }
    }

    // Finds the handler under the read lock; the lock is released on return.
    fn resolve(&self, method: &Method, segments: &[String]) -> Result<Handler, StatusCode> {
        let registry = self.registry.read();
        let (_, pattern) =
            matcher::lookup(&registry, segments).ok_or(StatusCode::NotFound)?;
        match pattern.handler(method) {
            Some(handler) => Ok(Arc::clone(handler)),
            None if self.method_not_allowed => Err(StatusCode::MethodNotAllowed),
            None => Err(StatusCode::NotFound),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Barrier, mpsc};
    use std::thread;
    use std::time::Duration;

    use super::*;

    fn cfg_router() -> (Router, ModuleHandle) {
        let router = Router::new();
        let cfg = router.register_module("cfg").unwrap();
        router
            .get(cfg, "/cfg/items/+", |ctx| {
                let id = ctx.segment(2)?.to_owned();
                assert_eq!(ctx.find_query_value("x")?, "1");
                ctx.write(format!(r#"{{"id":{id}}}"#))?;
                Ok(StatusCode::Ok)
            })
            .unwrap();
        (router, cfg)
    }

    #[test]
    fn end_to_end_json() {
        let (router, _) = cfg_router();
        let out = router.dispatch(Method::Get, "/cfg/items/42?x=1", Bytes::new());
        assert_eq!(out.status, StatusCode::Ok);
        assert_eq!(out.kind, ContentKind::Json);
        assert_eq!(out.content.as_ref(), br#"{"id":42}"#);
        assert_eq!(out.description, None);
    }

    #[test]
    fn unknown_module_is_404_with_empty_body() {
        let (router, _) = cfg_router();
        let out = router.dispatch(Method::Get, "/unknown/path", Bytes::new());
        assert_eq!(out, DispatchOutcome::empty(StatusCode::NotFound));
    }

    #[test]
    fn unregistered_method_is_404_by_default() {
        let (router, _) = cfg_router();
        let out = router.dispatch(Method::Post, "/cfg/items/42", Bytes::new());
        assert_eq!(out.status, StatusCode::NotFound);
        assert_eq!(out.kind, ContentKind::None);
    }

    #[test]
    fn unregistered_method_can_report_405() {
        let router = Router::new().method_not_allowed(true);
        let m = router.register_module("m").unwrap();
        router.get(m, "/a", |_| Ok(StatusCode::Ok)).unwrap();
        assert_eq!(
            router.dispatch(Method::Delete, "/m/a", Bytes::new()).status,
            StatusCode::MethodNotAllowed
        );
        assert_eq!(
            router.dispatch(Method::Delete, "/m/b", Bytes::new()).status,
            StatusCode::NotFound
        );
    }

    #[test]
    fn non_routable_method_is_404() {
        let (router, _) = cfg_router();
        let out = router.dispatch(Method::Other("HEAD".into()), "/cfg/items/1?x=1", Bytes::new());
        assert_eq!(out.status, StatusCode::NotFound);
    }

    #[test]
    fn bare_prefix_and_oversized_paths_are_404() {
        let (router, _) = cfg_router();
        assert_eq!(router.dispatch(Method::Get, "/cfg", Bytes::new()).status, StatusCode::NotFound);
        let deep = format!("/cfg/items/{}", vec!["x"; MAX_URI_LEVEL].join("/"));
        assert_eq!(router.dispatch(Method::Get, &deep, Bytes::new()).status, StatusCode::NotFound);
        let long = format!("/cfg/items/{}?x=1", "9".repeat(MAX_SEGMENT_LEN + 1));
        assert_eq!(router.dispatch(Method::Get, &long, Bytes::new()).status, StatusCode::NotFound);
    }

    #[test]
    fn reregistering_replaces_handler_without_new_pattern() {
        let router = Router::new();
        let m = router.register_module("m").unwrap();
        router.get(m, "/a", |_| Ok(StatusCode::Ok)).unwrap();
        router.get(m, "/a", |_| Ok(StatusCode::Accepted)).unwrap();
        router.put(m, "/m/a", |_| Ok(StatusCode::NoContent)).unwrap();
        assert_eq!(router.pattern_count(m).unwrap(), 1);
        assert_eq!(router.dispatch(Method::Get, "/m/a", Bytes::new()).status, StatusCode::Accepted);
        assert_eq!(router.dispatch(Method::Put, "/m/a", Bytes::new()).status, StatusCode::NoContent);
    }

    #[test]
    fn handler_error_maps_to_status_and_drops_partial_output() {
        let router = Router::new();
        let m = router.register_module("m").unwrap();
        router
            .get(m, "/q", |ctx| {
                ctx.write("partial")?;
                let v = ctx.find_query_value("missing")?;
                ctx.write(v.to_owned())?;
                Ok(StatusCode::Ok)
            })
            .unwrap();
        let out = router.dispatch(Method::Get, "/m/q", Bytes::new());
        assert_eq!(out, DispatchOutcome::empty(StatusCode::NotFound));
    }

    #[test]
    fn file_output_carries_description() {
        let router = Router::new();
        let m = router.register_module("m").unwrap();
        router
            .get(m, "/export", |ctx| {
                ctx.write_file("dump.json", b"[1,")?;
                ctx.write_file("ignored.json", b"2]")?;
                Ok(StatusCode::Ok)
            })
            .unwrap();
        let out = router.dispatch(Method::Get, "/m/export", Bytes::new());
        assert_eq!(out.kind, ContentKind::File);
        assert_eq!(out.content.as_ref(), b"[1,2]");
        assert_eq!(out.description.as_deref(), Some("dump.json"));
    }

    #[test]
    fn unquotable_file_name_fails_the_request() {
        let router = Router::new();
        let m = router.register_module("m").unwrap();
        router
            .get(m, "/export", |ctx| {
                ctx.write_file("x\"\r\nX-Injected: 1", b"data")?;
                Ok(StatusCode::Ok)
            })
            .unwrap();
        let out = router.dispatch(Method::Get, "/m/export", Bytes::new());
        assert_eq!(out, DispatchOutcome::empty(StatusCode::BadRequest));
    }

    #[test]
    fn handler_without_output_reports_kind_none() {
        let router = Router::new();
        let m = router.register_module("m").unwrap();
        router.delete(m, "/x/+", |_| Ok(StatusCode::NoContent)).unwrap();
        let out = router.dispatch(Method::Delete, "/m/x/1", Bytes::new());
        assert_eq!(out, DispatchOutcome::empty(StatusCode::NoContent));
    }

    #[test]
    fn body_and_token_reach_handler() {
        let router = Router::new();
        let m = router.register_module("m").unwrap();
        router
            .patch(m, "/echo", |ctx| {
                let token = ctx.api_token().unwrap_or("none").to_owned();
                let body = ctx.body().clone();
                ctx.write(token)?;
                ctx.write(body)?;
                Ok(StatusCode::Ok)
            })
            .unwrap();
        let out = router.dispatch_inbound(
            Inbound::new(Method::Patch, "/m/echo", &b":payload"[..]).api_token("Bearer t"),
        );
        assert_eq!(out.content.as_ref(), b"Bearer t:payload");
    }

    #[test]
    fn unregister_removes_routes_and_stales_handle() {
        let (router, cfg) = cfg_router();
        router.unregister_module(cfg).unwrap();
        assert_eq!(router.module_count(), 0);
        assert_eq!(
            router.dispatch(Method::Get, "/cfg/items/42?x=1", Bytes::new()).status,
            StatusCode::NotFound
        );
        assert!(matches!(
            router.get(cfg, "/a", |_| Ok(StatusCode::Ok)),
            Err(RestError::InvalidArgument(_))
        ));
        assert!(router.unregister_module(cfg).is_err());
    }

    #[test]
    fn leading_prefix_in_pattern_is_dropped_once() {
        let router = Router::new();
        let cfg = router.register_module("cfg").unwrap();
        router.get(cfg, "/cfg/a", |_| Ok(StatusCode::Ok)).unwrap();
        router.get(cfg, "/cfg/cfg/a", |_| Ok(StatusCode::Accepted)).unwrap();
        assert_eq!(router.pattern_count(cfg).unwrap(), 2);
        assert_eq!(router.dispatch(Method::Get, "/cfg/a", Bytes::new()).status, StatusCode::Ok);
        assert_eq!(
            router.dispatch(Method::Get, "/cfg/cfg/a", Bytes::new()).status,
            StatusCode::Accepted
        );
    }

    #[test]
    fn modules_are_isolated_by_prefix() {
        let router = Router::new();
        let a = router.register_module("a").unwrap();
        let b = router.register_module("b").unwrap();
        router.get(a, "/x", |_| Ok(StatusCode::Ok)).unwrap();
        router.get(b, "/x", |_| Ok(StatusCode::Accepted)).unwrap();
        assert_eq!(router.dispatch(Method::Get, "/a/x", Bytes::new()).status, StatusCode::Ok);
        assert_eq!(router.dispatch(Method::Get, "/b/x", Bytes::new()).status, StatusCode::Accepted);
    }

    #[test]
    fn dispatches_run_concurrently() {
        // Two handlers rendezvous on a barrier; this only completes if neither
        // dispatch blocks the other.
        let router = Arc::new(Router::new());
        let m = router.register_module("m").unwrap();
        let barrier = Arc::new(Barrier::new(2));
        let calls = Arc::new(AtomicUsize::new(0));
        {
            let barrier = Arc::clone(&barrier);
            let calls = Arc::clone(&calls);
            router
                .get(m, "/wait/+", move |ctx| {
                    barrier.wait();
                    calls.fetch_add(1, Ordering::SeqCst);
                    let id = ctx.segment(2)?.to_owned();
                    ctx.write(id)?;
                    Ok(StatusCode::Ok)
                })
                .unwrap();
        }

        let (tx, rx) = mpsc::channel();
        for id in ["1", "2"] {
            let router = Arc::clone(&router);
            let tx = tx.clone();
            thread::spawn(move || {
                let out = router.dispatch(Method::Get, &format!("/m/wait/{id}"), Bytes::new());
                tx.send((id, out)).unwrap();
            });
        }

        for _ in 0..2 {
            let (id, out) = rx.recv_timeout(Duration::from_secs(5)).unwrap();
            assert_eq!(out.status, StatusCode::Ok);
            assert_eq!(out.content.as_ref(), id.as_bytes());
        }
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
