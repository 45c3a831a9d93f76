//! Token-gated forwarding proxy.
//!
//! Reads one HTTP request off each accepted connection. WebSocket upgrade
//! requests carrying an invalid or expired `token` are answered with a 401 and
//! closed without ever touching the backend. Everything else is written
//! verbatim to the backend, after which the two sockets are spliced until
//! either side hangs up.

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::http::{HeaderMap, HeaderName, HeaderValue};
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{RwLock, oneshot};
use tokio::task::JoinHandle;
use token_auth::TokenValidator;
use tracing::{debug, info, warn};

use crate::upgrade::is_websocket_upgrade;

/// Largest request head accepted before the connection is dropped.
const MAX_REQUEST_HEAD: usize = 64 * 1024;
const MAX_HEADERS: usize = 100;
const READ_CHUNK: usize = 4096;

/// Sent to clients whose upgrade request carries a bad token.
pub const UNAUTHORIZED_RESPONSE: &[u8] = b"HTTP/1.1 401 Unauthorized\r\n\
    Content-Type: text/plain\r\n\
    Content-Length: 0\r\n\
    Connection: close\r\n\
    \r\n";

#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("IO error: {0}")]
    IoError(#[from] io::Error),

    #[error("Failed to bind to {address}: {reason}")]
    BindError { address: String, reason: String },

    #[error("Proxy is already listening on {0}")]
    AlreadyRunning(SocketAddr),

    #[error("Accept loop failed: {0}")]
    AcceptLoop(#[from] tokio::task::JoinError),
}

/// Per-connection failures. These never leave the connection task.
#[derive(Debug, Error)]
enum ConnectionError {
    #[error("IO error: {0}")]
    IoError(#[from] io::Error),

    #[error("Malformed HTTP request: {0}")]
    Parse(#[from] httparse::Error),

    #[error("Invalid header {0:?}")]
    InvalidHeader(String),

    #[error("Request head exceeds {0} bytes")]
    HeadTooLarge(usize),

    #[error("Connection closed before the request head was complete")]
    Incomplete,

    #[error("Timed out while {0}")]
    Timeout(&'static str),
}

/// Optional limits. Neither applies once bytes are being spliced.
#[derive(Debug, Clone, Default)]
pub struct ProxyConfig {
    /// Limit on reading the initial request head.
    pub request_timeout: Option<Duration>,
    /// Limit on dialing the backend.
    pub connect_timeout: Option<Duration>,
}

/// State shared by the accept loop and every connection task.
struct Shared {
    backend_addr: String,
    validator: TokenValidator,
    config: ProxyConfig,
}

struct ListenerHandle {
    local_addr: SocketAddr,
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl ListenerHandle {
    /// The accept loop owns the receiving end, so a closed channel means the
    /// loop has exited and dropped the listener.
    fn is_live(&self) -> bool {
        !self.shutdown.is_closed()
    }
}

/// Accepts client connections, gates WebSocket upgrades on their token and
/// forwards accepted traffic to a fixed backend.
pub struct ForwardingProxy {
    backend_addr: String,
    validator: TokenValidator,
    config: ProxyConfig,
    listener: RwLock<Option<ListenerHandle>>,
}

impl ForwardingProxy {
    /// Create a proxy forwarding to `backend_addr`, validating against the
    /// process-wide secret.
    pub fn new(backend_addr: impl Into<String>) -> Self {
        Self {
            backend_addr: backend_addr.into(),
            validator: TokenValidator::default(),
            config: ProxyConfig::default(),
            listener: RwLock::new(None),
        }
    }

    pub fn with_validator(mut self, validator: TokenValidator) -> Self {
        self.validator = validator;
        self
    }

    pub fn with_config(mut self, config: ProxyConfig) -> Self {
        self.config = config;
        self
    }

    /// Bind `listen_addr` and start accepting connections in the background.
    ///
    /// Returns the bound address. Fails without starting anything if the bind
    /// fails or the proxy is already listening.
    pub async fn start(&self, listen_addr: &str) -> Result<SocketAddr, ProxyError> {
        let mut guard = self.listener.write().await;
        match guard.as_ref() {
            Some(handle) if handle.is_live() => {
                return Err(ProxyError::AlreadyRunning(handle.local_addr));
            }
            // Accept loop gave up on its own; its listener is already closed
            Some(_) => *guard = None,
            None => {}
        }

        let listener = TcpListener::bind(listen_addr)
            .await
            .map_err(|e| ProxyError::BindError {
                address: listen_addr.to_string(),
                reason: e.to_string(),
            })?;
        let local_addr = listener.local_addr()?;

        let shared = Arc::new(Shared {
            backend_addr: self.backend_addr.clone(),
            validator: self.validator.clone(),
            config: self.config.clone(),
        });
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let task = tokio::spawn(accept_loop(listener, shutdown_rx, shared));

        *guard = Some(ListenerHandle {
            local_addr,
            shutdown: shutdown_tx,
            task,
        });

        info!("ws-gate proxy listening on {} -> {}", local_addr, self.backend_addr);
        Ok(local_addr)
    }

    /// Close the listener. Connections already being spliced keep running
    /// until they finish on their own. Stopping an idle proxy is a no-op.
    pub async fn stop(&self) -> Result<(), ProxyError> {
        let Some(handle) = self.listener.write().await.take() else {
            return Ok(());
        };

        // The loop also exits if the sender is dropped, so a failed send is fine
        let _ = handle.shutdown.send(());
        handle.task.await?;

        info!("ws-gate proxy on {} stopped", handle.local_addr);
        Ok(())
    }

    /// Address of the live listener, if any.
    pub async fn local_addr(&self) -> Option<SocketAddr> {
        self.listener
            .read()
            .await
            .as_ref()
            .filter(|h| h.is_live())
            .map(|h| h.local_addr)
    }

    pub async fn is_running(&self) -> bool {
        self.local_addr().await.is_some()
    }
}

async fn accept_loop(
    listener: TcpListener,
    mut shutdown: oneshot::Receiver<()>,
    shared: Arc<Shared>,
) {
    loop {
        tokio::select! {
            _ = &mut shutdown => {
                debug!("accept loop shutting down");
                return;
            }
            accepted = listener.accept() => {
                let (stream, peer_addr) = match accepted {
                    Ok(accepted) => accepted,
                    Err(e) => {
                        debug!("ws-gate accept error: {}", e);
                        return;
                    }
                };

                let shared = Arc::clone(&shared);
                tokio::spawn(async move {
                    if let Err(e) = handle_connection(stream, peer_addr, &shared).await {
                        debug!(%peer_addr, "connection closed on error: {}", e);
                    }
                });
            }
        }
    }
}

async fn handle_connection(
    mut client: TcpStream,
    peer_addr: SocketAddr,
    shared: &Shared,
) -> Result<(), ConnectionError> {
    let request = with_timeout(
        shared.config.request_timeout,
        "reading the request",
        read_request(&mut client),
    )
    .await?;

    if !is_websocket_upgrade(&request.headers) {
        debug!(%peer_addr, target = %request.target, "not a WebSocket upgrade, forwarding");
        return forward(client, peer_addr, &request, shared).await;
    }

    if !shared.validator.is_valid_now(&request.target) {
        warn!(
            %peer_addr,
            "JWT token validation failed or expired for connection"
        );
        client.write_all(UNAUTHORIZED_RESPONSE).await?;
        let _ = client.shutdown().await;
        return Ok(());
    }

    forward(client, peer_addr, &request, shared).await
}

/// Dial the backend, replay the request bytes and splice the two sockets.
async fn forward(
    mut client: TcpStream,
    peer_addr: SocketAddr,
    request: &RequestHead,
    shared: &Shared,
) -> Result<(), ConnectionError> {
    let dial = async {
        TcpStream::connect(&shared.backend_addr)
            .await
            .map_err(ConnectionError::from)
    };
    let mut backend =
        with_timeout(shared.config.connect_timeout, "connecting to the backend", dial).await?;

    backend.write_all(&request.raw).await?;

    debug!(%peer_addr, backend = %shared.backend_addr, "splicing connection");
    splice(&mut client, &mut backend).await;
    debug!(%peer_addr, "connection finished");
    Ok(())
}

/// Copy bytes both ways until either direction ends. Both sockets are
/// dropped by the caller afterwards, which tears down the other direction.
async fn splice(client: &mut TcpStream, backend: &mut TcpStream) {
    let (mut client_read, mut client_write) = client.split();
    let (mut backend_read, mut backend_write) = backend.split();

    tokio::select! {
        result = tokio::io::copy(&mut client_read, &mut backend_write) => match result {
            Ok(n) => debug!("client -> backend ended after {} bytes", n),
            Err(e) => debug!("client -> backend ended: {}", e),
        },
        result = tokio::io::copy(&mut backend_read, &mut client_write) => match result {
            Ok(n) => debug!("backend -> client ended after {} bytes", n),
            Err(e) => debug!("backend -> client ended: {}", e),
        },
    }
}

async fn with_timeout<T, F>(
    limit: Option<Duration>,
    what: &'static str,
    fut: F,
) -> Result<T, ConnectionError>
where
    F: Future<Output = Result<T, ConnectionError>>,
{
    match limit {
        Some(limit) => tokio::time::timeout(limit, fut)
            .await
            .map_err(|_| ConnectionError::Timeout(what))?,
        None => fut.await,
    }
}

/// The parsed head of the first request on a connection, plus every byte read
/// so far so it can be replayed to the backend unchanged.
#[derive(Debug)]
struct RequestHead {
    target: String,
    headers: HeaderMap,
    raw: Vec<u8>,
}

async fn read_request(stream: &mut TcpStream) -> Result<RequestHead, ConnectionError> {
    let mut buffer = Vec::with_capacity(READ_CHUNK);
    let mut chunk = [0u8; READ_CHUNK];

    loop {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            return Err(ConnectionError::Incomplete);
        }
        buffer.extend_from_slice(&chunk[..n]);

        if let Some((target, headers)) = parse_request_head(&buffer)? {
            return Ok(RequestHead {
                target,
                headers,
                raw: buffer,
            });
        }

        if buffer.len() > MAX_REQUEST_HEAD {
            return Err(ConnectionError::HeadTooLarge(MAX_REQUEST_HEAD));
        }
    }
}

/// Parse the request line and headers. `None` means more bytes are needed.
fn parse_request_head(buffer: &[u8]) -> Result<Option<(String, HeaderMap)>, ConnectionError> {
    let mut headers = [httparse::EMPTY_HEADER; MAX_HEADERS];
    let mut request = httparse::Request::new(&mut headers);

    match request.parse(buffer)? {
        httparse::Status::Partial => Ok(None),
        httparse::Status::Complete(_) => {
            let target = request.path.unwrap_or("/").to_string();

            let mut map = HeaderMap::with_capacity(request.headers.len());
            for header in request.headers.iter() {
                let name = HeaderName::from_bytes(header.name.as_bytes())
                    .map_err(|_| ConnectionError::InvalidHeader(header.name.to_string()))?;
                let value = HeaderValue::from_bytes(header.value)
                    .map_err(|_| ConnectionError::InvalidHeader(header.name.to_string()))?;
                map.append(name, value);
            }

            Ok(Some((target, map)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_upgrade_head() {
        let raw = b"GET /?token=abc&type=ws HTTP/1.1\r\n\
            Host: example.com\r\n\
            Upgrade: websocket\r\n\
            Connection: Upgrade\r\n\
            \r\n";

        let (target, headers) = parse_request_head(raw).unwrap().unwrap();
        assert_eq!(target, "/?token=abc&type=ws");
        assert_eq!(headers.get("upgrade").unwrap(), "websocket");
        assert!(is_websocket_upgrade(&headers));
    }

    #[test]
    fn test_parse_partial_head() {
        let raw = b"GET / HTTP/1.1\r\nHost: example.com\r\n";
        assert!(parse_request_head(raw).unwrap().is_none());
    }

    #[test]
    fn test_parse_garbage() {
        assert!(matches!(
            parse_request_head(b"\x00\x01\x02 nonsense\r\n\r\n"),
            Err(ConnectionError::Parse(_))
        ));
    }

    #[test]
    fn test_parse_ignores_trailing_bytes() {
        let raw = b"POST /submit HTTP/1.1\r\nContent-Length: 5\r\n\r\nhello";
        let (target, headers) = parse_request_head(raw).unwrap().unwrap();
        assert_eq!(target, "/submit");
        assert!(!is_websocket_upgrade(&headers));
    }

    #[test]
    fn test_unauthorized_response_shape() {
        let mut headers = [httparse::EMPTY_HEADER; 8];
        let mut response = httparse::Response::new(&mut headers);
        let status = response.parse(UNAUTHORIZED_RESPONSE).unwrap();

        assert!(status.is_complete());
        assert_eq!(response.code, Some(401));
        assert_eq!(response.reason, Some("Unauthorized"));
        assert_eq!(response.version, Some(1));
        assert!(
            response
                .headers
                .iter()
                .any(|h| h.name == "Content-Type" && h.value == b"text/plain")
        );
    }

    #[tokio::test]
    async fn test_with_timeout_expires() {
        let result: Result<(), _> = with_timeout(
            Some(Duration::from_millis(10)),
            "waiting",
            std::future::pending(),
        )
        .await;
        assert!(matches!(result, Err(ConnectionError::Timeout("waiting"))));
    }

    #[tokio::test]
    async fn test_bind_failure_reported() {
        let proxy = ForwardingProxy::new("127.0.0.1:1");
        let err = proxy.start("not-an-address").await.unwrap_err();
        assert!(matches!(err, ProxyError::BindError { .. }));
        assert!(!proxy.is_running().await);
    }

    #[tokio::test]
    async fn test_start_twice_rejected() {
        let proxy = ForwardingProxy::new("127.0.0.1:1");
        let addr = proxy.start("127.0.0.1:0").await.unwrap();

        let err = proxy.start("127.0.0.1:0").await.unwrap_err();
        assert!(matches!(err, ProxyError::AlreadyRunning(a) if a == addr));

        proxy.stop().await.unwrap();
        assert!(!proxy.is_running().await);
        // Stopping again is harmless
        proxy.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_exited_accept_loop_not_reported_running() {
        let proxy = ForwardingProxy::new("127.0.0.1:1");

        // A handle whose accept loop has already returned, as after an accept error
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        drop(shutdown_rx);
        *proxy.listener.write().await = Some(ListenerHandle {
            local_addr: "127.0.0.1:9".parse().unwrap(),
            shutdown: shutdown_tx,
            task: tokio::spawn(async {}),
        });

        assert!(!proxy.is_running().await);
        assert_eq!(proxy.local_addr().await, None);

        let addr = proxy.start("127.0.0.1:0").await.unwrap();
        assert_eq!(proxy.local_addr().await, Some(addr));
        proxy.stop().await.unwrap();
    }
}
