//! Async TCP server using Tokio.
//!
//! Accepts TCP connections and hands each complete HTTP/1.1 request to a
//! handler function. Connections are kept alive unless the client asks
//! otherwise.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::BytesMut;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info, warn};

use crate::http::{
    StatusCode,
    request::{Request, RequestError},
    response::Response,
};

/// Errors produced by the server.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to bind to {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
}

/// Default limit on a buffered request, headers and body together (1 MiB).
pub const DEFAULT_MAX_REQUEST_SIZE: usize = 1024 * 1024;

/// Initial read buffer capacity per connection.
const INITIAL_BUF_SIZE: usize = 4096;

/// The HTTP listener behind an agent.
///
/// # Examples
///
/// ```rust,no_run
/// use agentrest::server::Server;
/// use agentrest::http::{Response, StatusCode};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let server = Server::bind("127.0.0.1:8080").await?.max_request_size(64 * 1024);
///     server.run(|_req| async {
///         Response::new(StatusCode::Ok).body("{}")
///     }).await?;
///     Ok(())
/// }
/// ```
pub struct Server {
    listener: TcpListener,
    local_addr: SocketAddr,
    max_request_size: usize,
}

impl Server {
    /// Binds the server to the given TCP address.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Bind`] if the address cannot be bound.
    pub async fn bind(addr: impl AsRef<str>) -> Result<Self, ServerError> {
        let addr = addr.as_ref();
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ServerError::Bind {
                addr: addr.to_owned(),
                source: e,
            })?;
        let local_addr = listener.local_addr()?;
        Ok(Self {
            listener,
            local_addr,
            max_request_size: DEFAULT_MAX_REQUEST_SIZE,
        })
    }

    /// Requests larger than `bytes` are answered with 413 and the connection is closed.
    #[must_use]
    pub fn max_request_size(mut self, bytes: usize) -> Self {
        self.max_request_size = bytes;
        self
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Starts accepting connections and passing requests to `handler`.
    ///
    /// Runs until the listener fails or the task is dropped.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Io`] if the TCP listener itself fails.
    pub async fn run<H, F>(self, handler: H) -> Result<(), ServerError>
    where
        H: Fn(Request) -> F + Send + Sync + 'static,
        F: Future<Output = Response> + Send + 'static,
    {
        let handler = Arc::new(handler);
        let limit = self.max_request_size;
        info!(address = %self.local_addr, max_request_size = limit, "agent listening");

        loop {
            let (stream, peer_addr) = match self.listener.accept().await {
                Ok(pair) => pair,
                Err(e) => {
                    error!(error = %e, "failed to accept connection");
                    continue;
                }
            };

            debug!(peer = %peer_addr, "connection accepted");
            let handler = Arc::clone(&handler);

            tokio::spawn(async move {
                if let Err(e) = handle_connection(stream, peer_addr, handler, limit).await {
                    warn!(peer = %peer_addr, error = %e, "connection closed with error");
                }
            });
        }
    }
}

async fn reject(stream: &mut TcpStream, status: StatusCode) -> std::io::Result<()> {
    let response = Response::new(status).keep_alive(false);
    stream.write_all(&response.into_bytes()).await?;
    stream.flush().await
}

/// Serves one connection until the peer closes it or asks for `Connection: close`.
async fn handle_connection<H, F>(
    mut stream: TcpStream,
    peer_addr: SocketAddr,
    handler: Arc<H>,
    limit: usize,
) -> Result<(), std::io::Error>
where
    H: Fn(Request) -> F + Send + Sync + 'static,
    F: Future<Output = Response> + Send + 'static,
{
    let mut buf = BytesMut::with_capacity(INITIAL_BUF_SIZE);

    loop {
        // Leftover pipelined bytes may already hold a full request.
        let (request, total_needed) = match Request::parse(&buf) {
            Ok((request, body_offset)) => {
                let declared = request.content_length().unwrap_or(0);
                let Some(total) = body_offset.checked_add(declared).filter(|t| *t <= limit) else {
                    warn!(peer = %peer_addr, content_length = declared, "request too large, sending 413");
                    return reject(&mut stream, StatusCode::PayloadTooLarge).await;
                };
                if buf.len() >= total {
                    (request, total)
                } else {
                    if read_more(&mut stream, &mut buf, peer_addr).await? {
                        continue;
                    }
                    break;
                }
            }
            Err(RequestError::Incomplete) => {
                if buf.len() > limit {
                    warn!(peer = %peer_addr, "header block too large, sending 413");
                    return reject(&mut stream, StatusCode::PayloadTooLarge).await;
                }
                if read_more(&mut stream, &mut buf, peer_addr).await? {
                    continue;
                }
                break;
            }
            Err(e) => {
                warn!(peer = %peer_addr, error = %e, "bad request, sending 400");
                return reject(&mut stream, StatusCode::BadRequest).await;
            }
        };

        let keep_alive = request.is_keep_alive();
        debug!(
            peer = %peer_addr,
            method = %request.method(),
            uri = request.target(),
            "dispatching request"
        );

        let response = handler(request).await.keep_alive(keep_alive);
        stream.write_all(&response.into_bytes()).await?;
        stream.flush().await?;

        let _ = buf.split_to(total_needed);

        if !keep_alive {
            debug!(peer = %peer_addr, "Connection: close, shutting down");
            break;
        }
    }

    Ok(())
}

// Returns false once the peer has closed the connection.
async fn read_more(
    stream: &mut TcpStream,
    buf: &mut BytesMut,
    peer_addr: SocketAddr,
) -> std::io::Result<bool> {
    let bytes_read = stream.read_buf(buf).await?;
    if bytes_read == 0 {
        debug!(peer = %peer_addr, "connection closed by peer");
        return Ok(false);
    }
    Ok(true)
}
