//! TCP server for RLCP exchanges.
//!
//! One accepted connection carries exactly one request: the handler reads
//! until the peer shuts down its write side, parses, authenticates,
//! dispatches to the flow engine under the configured deadline, writes the
//! serialized response and closes the socket. Every exit path answers with a
//! well-formed status-coded response; no parse error, deadline or panic
//! reaches the wire raw.

use std::io;
use std::sync::Arc;

use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::error::BadRequest;
use crate::flow;
use crate::processor::ProcessorRegistry;
use crate::protocol::codec;
use crate::protocol::{Response, ResponseHeader, StatusCode, Url};

/// Read buffer growth unit.
const BUFFER_SIZE: usize = 16 * 1024;

/// Server instance: configuration plus the processor registry, both shared
/// read-only across connection handlers.
pub struct Server {
    config: Arc<Config>,
    registry: Arc<ProcessorRegistry>,
}

impl Server {
    pub fn new(config: Config, registry: ProcessorRegistry) -> Server {
        Server {
            config: Arc::new(config),
            registry: Arc::new(registry),
        }
    }

    /// Binds the configured port and serves until the process ends.
    pub async fn run(&self) -> io::Result<()> {
        let listener = TcpListener::bind(("0.0.0.0", self.config.port)).await?;
        info!(
            port = self.config.port,
            public = self.config.is_public(),
            "RLCP server listening"
        );
        self.serve(listener).await
    }

    /// Accept loop over an already-bound listener; one spawned handler per
    /// connection, no admission control.
    pub async fn serve(&self, listener: TcpListener) -> io::Result<()> {
        loop {
            match listener.accept().await {
                Ok((stream, addr)) => {
                    debug!(peer = %addr, "new connection");
                    let config = Arc::clone(&self.config);
                    let registry = Arc::clone(&self.registry);
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, config, registry).await {
                            debug!(error = %e, "connection error");
                        }
                    });
                }
                Err(e) => {
                    error!(error = %e, "failed to accept connection");
                }
            }
        }
    }
}

/// Handles one exchange: whatever happens while reading or processing, a
/// response is written and the socket closed (dropped on write failure).
async fn handle_connection(
    mut stream: TcpStream,
    config: Arc<Config>,
    registry: Arc<ProcessorRegistry>,
) -> io::Result<()> {
    let response = match read_request(&mut stream).await {
        Ok(raw) => dispatch(&raw, &config, &registry).await,
        Err(e) => {
            warn!(error = %e, "failed to read request");
            error_response(StatusCode::IncorrectRequest, "input failed")
        }
    };

    let serialized = codec::serialize_response(&response);
    stream.write_all(serialized.as_bytes()).await?;
    stream.flush().await?;
    stream.shutdown().await?;
    Ok(())
}

/// Reads the whole request: the peer signals end of input by shutting down
/// its write side.
async fn read_request(stream: &mut TcpStream) -> io::Result<String> {
    let mut buffer = BytesMut::with_capacity(BUFFER_SIZE);
    loop {
        let n = stream.read_buf(&mut buffer).await?;
        if n == 0 {
            break;
        }
    }
    String::from_utf8(buffer.to_vec()).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

async fn dispatch(raw: &str, config: &Arc<Config>, registry: &Arc<ProcessorRegistry>) -> Response {
    if raw.trim().is_empty() {
        warn!("empty request input");
        return error_response(StatusCode::IncorrectRequest, "input failed");
    }

    let request = match codec::parse_request(raw) {
        Ok(request) => request,
        Err(BadRequest::UnsupportedMethod) => {
            warn!("unsupported method requested");
            return error_response(StatusCode::UnsupportedMethod, "bad request");
        }
        Err(e) => {
            warn!(error = %e, "bad request");
            return error_response(StatusCode::IncorrectRequest, "bad request");
        }
    };

    if !authorized(config, &request.header.url) {
        warn!(login = ?request.header.url.login(), "authentication failed");
        return error_response(StatusCode::AuthFailed, "authorization failed");
    }

    let method = request.header.method;
    match flow::process_request(request, Arc::clone(registry), Arc::clone(config)).await {
        Ok(response) => {
            debug!(method = method.name(), "request processed");
            response
        }
        Err(e) => {
            error!(method = method.name(), error = %e, "request processing failed");
            error_response(
                StatusCode::Unavailable,
                &format!("error processing {} request", method.name()),
            )
        }
    }
}

/// Public mode (empty user list) accepts anything; otherwise the url
/// credentials must exactly match a configured user.
fn authorized(config: &Config, url: &Url) -> bool {
    if config.is_public() {
        return true;
    }
    match (url.login(), url.password()) {
        (Some(login), Some(password)) => config
            .users
            .iter()
            .any(|user| user.login == login && user.password == password),
        _ => false,
    }
}

fn error_response(code: StatusCode, detail: &str) -> Response {
    Response {
        header: ResponseHeader::failed(code, detail),
        body: None,
    }
}
