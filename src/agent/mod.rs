//! A document-backed management agent.
//!
//! Serves one JSON document under a module prefix:
//!
//! | Route                  | Effect                                         |
//! |------------------------|------------------------------------------------|
//! | `GET /config[?k=v&..]` | the document, arrays filtered by the query     |
//! | `GET /config/export`   | the raw document as a file download            |
//! | `PUT /config`          | replace the document with the (JSON) body      |

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info};

use crate::context::DispatchContext;
use crate::error::{RestError, RestResult};
use crate::http::StatusCode;
use crate::router::{HandlerResult, ModuleHandle, Router};

/// Maximum number of `key=value` filters applied to a listing.
pub const MAX_FILTERS: usize = 5;

/// Reads and replaces the JSON document at a fixed path.
#[derive(Debug, Clone)]
pub struct DocumentService {
    path: PathBuf,
}

impl DocumentService {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Name used for exported downloads.
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "document.json".to_owned())
    }

    fn read_raw(&self) -> RestResult<Vec<u8>> {
        std::fs::read(&self.path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => RestError::not_found(self.path.display().to_string()),
            _ => RestError::OperationFailed(format!("{}: {e}", self.path.display())),
        })
    }

    /// Parses the document.
    ///
    /// # Errors
    ///
    /// [`RestError::NotFound`] when the file is missing and
    /// [`RestError::OperationFailed`] when it cannot be read or parsed.
    pub fn load(&self) -> RestResult<Value> {
        let raw = self.read_raw()?;
        serde_json::from_slice(&raw).map_err(|e| {
            RestError::OperationFailed(format!("{} is not valid JSON: {e}", self.path.display()))
        })
    }

    /// Replaces the document with `value`, written to a sibling temporary
    /// file first so readers never observe a partial document.
    pub fn store(&self, value: &Value) -> RestResult<()> {
        let encoded = serde_json::to_vec_pretty(value)
            .map_err(|e| RestError::OperationFailed(e.to_string()))?;
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        let io_err = |e: std::io::Error| RestError::OperationFailed(format!("{}: {e}", self.path.display()));
        std::fs::write(&tmp, encoded).map_err(io_err)?;
        std::fs::rename(&tmp, &self.path).map_err(io_err)
    }

    /// `GET /config`
    pub fn list(&self, ctx: &mut DispatchContext) -> HandlerResult {
        let document = self.load()?;
        let filters: Vec<(&str, &str)> = ctx.query_pairs().take(MAX_FILTERS).collect();
        let document = match document {
            Value::Array(items) if !filters.is_empty() => {
                let kept: Vec<Value> = items
                    .into_iter()
                    .filter(|item| matches_filters(item, &filters))
                    .collect();
                debug!(filters = filters.len(), kept = kept.len(), "filtered document");
                Value::Array(kept)
            }
            other => other,
        };
        let encoded = serde_json::to_vec_pretty(&document)
            .map_err(|e| RestError::OperationFailed(e.to_string()))?;
        ctx.write(encoded)?;
        Ok(StatusCode::Ok)
    }

    /// `GET /config/export`
    pub fn export(&self, ctx: &mut DispatchContext) -> HandlerResult {
        let raw = self.read_raw()?;
        if raw.is_empty() {
            return Ok(StatusCode::NoContent);
        }
        ctx.write_file(&self.file_name(), raw)?;
        Ok(StatusCode::Ok)
    }

    /// `PUT /config`
    pub fn replace(&self, ctx: &mut DispatchContext) -> HandlerResult {
        let value: Value = ctx
            .json()
            .map_err(|e| RestError::invalid(format!("request body is not JSON: {e}")))?;
        self.store(&value)?;
        info!(document = %self.path.display(), bytes = ctx.body().len(), "document replaced");
        Ok(StatusCode::Ok)
    }
}

/// An object passes when every filter naming one of its string or number
/// fields agrees with it. Fields that are missing or of another type do not
/// exclude the object; non-object items never pass.
fn matches_filters(item: &Value, filters: &[(&str, &str)]) -> bool {
    let Some(object) = item.as_object() else {
        return false;
    };
    filters.iter().all(|(key, expected)| match object.get(*key) {
        Some(Value::String(s)) => s.as_str() == *expected,
        Some(Value::Number(n)) => match (n.as_f64(), expected.trim().parse::<f64>()) {
            (Some(actual), Ok(wanted)) => actual == wanted,
            _ => false,
        },
        _ => true,
    })
}

/// Registers `service`'s routes on a new module named `module`.
///
/// `/config/export` is registered before `/config`, since the shorter
/// pattern also matches longer paths.
pub fn install(router: &Router, module: &str, service: DocumentService) -> RestResult<ModuleHandle> {
    let handle = router.register_module(module)?;
    let service = Arc::new(service);

    let svc = Arc::clone(&service);
    router.get(handle, "/config/export", move |ctx| svc.export(ctx))?;
    let svc = Arc::clone(&service);
    router.get(handle, "/config", move |ctx| svc.list(ctx))?;
    let svc = Arc::clone(&service);
    router.put(handle, "/config", move |ctx| svc.replace(ctx))?;

    info!(module, document = %service.path().display(), "agent routes installed");
    Ok(handle)
}
