//! # agentrest
//!
//! REST dispatch for on-device management agents: modules register URI
//! patterns with `+` and `#` wildcards, and the router hands each request to
//! the matching handler with its own context and output buffer.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use agentrest::http::StatusCode;
//! use agentrest::router::Router;
//! use agentrest::server::Server;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let router = Router::new();
//!     let cfg = router.register_module("cfg")?;
//!     router.get(cfg, "/items/+", |ctx| {
//!         let id = ctx.segment(2)?.to_owned();
//!         ctx.write(format!(r#"{{"id":"{id}"}}"#))?;
//!         Ok(StatusCode::Ok)
//!     })?;
//!
//!     let server = Server::bind("127.0.0.1:8080").await?;
//!     agentrest::engine::serve(server, Arc::new(router)).await?;
//!     Ok(())
//! }
//! ```

pub mod agent;
pub mod config;
pub mod context;
pub mod engine;
pub mod error;
pub mod http;
pub mod router;
pub mod server;

pub use context::{ContentKind, DispatchContext};
pub use error::{RestError, RestResult};
pub use http::{Headers, Method, Request, Response, StatusCode};
pub use router::{DispatchOutcome, HandlerResult, Inbound, ModuleHandle, Router};
pub use server::{Server, ServerError};
