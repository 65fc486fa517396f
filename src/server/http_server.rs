//! HTTP server implementation.

use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio::signal;
use log::{debug, info, warn, error};
use std::net::SocketAddr;

use crate::dispatch::{error_body, Dispatcher};
use crate::parser::{expected_length, parse_request};
use crate::server::config::ServerConfig;
use crate::server::error::Error;
use crate::server::response::{HttpResponse, StatusCode};

/// An HTTP server driving a [`Dispatcher`].
pub struct HttpServer {
    /// The server configuration.
    pub config: ServerConfig,
    /// The request pipeline, shared read-only by every connection.
    pub dispatcher: Arc<Dispatcher>,
}

/// A JSON error response produced by the transport itself.
fn transport_error(status: StatusCode, message: impl Into<String>) -> HttpResponse {
    let body = serde_json::to_vec(&error_body(message)).unwrap_or_default();
    HttpResponse::new(status)
        .with_content_type("application/json")
        .with_body_bytes(body)
}

impl HttpServer {
    /// Create a new HTTP server. Routes must be registered on `dispatcher`
    /// before this point.
    pub fn new(config: ServerConfig, dispatcher: Dispatcher) -> Self {
        Self {
            config,
            dispatcher: Arc::new(dispatcher),
        }
    }

    /// Set up the TCP listener.
    async fn setup_listener(&self) -> Result<TcpListener, Error> {
        let listener = TcpListener::bind(&self.config.addr).await?;
        info!("Server listening on http://{addr}", addr = self.config.addr);
        Ok(listener)
    }

    /// Set up a Ctrl+C handler for graceful shutdown.
    fn setup_ctrl_c_handler(shutdown_tx: Arc<mpsc::Sender<()>>, tasks: &mut JoinSet<()>) {
        tasks.spawn(async move {
            match signal::ctrl_c().await {
                Ok(()) => {
                    info!("Received Ctrl+C, initiating graceful shutdown");
                    let _ = shutdown_tx.send(()).await;
                }
                Err(e) => {
                    error!("Error setting up Ctrl+C handler: {e}");
                }
            }
        });
    }

    /// Handle a new connection.
    async fn handle_new_connection(
        &self,
        mut socket: tokio::net::TcpStream,
        addr: SocketAddr,
        semaphore: Arc<tokio::sync::Semaphore>,
        shutdown_tx: Arc<mpsc::Sender<()>>,
        tasks: &mut JoinSet<()>,
    ) {
        let permit = match semaphore.try_acquire_owned() {
            Ok(permit) => permit,
            Err(_) => {
                warn!("Connection limit reached, rejecting connection from {addr}");
                let response = transport_error(
                    StatusCode::ServiceUnavailable,
                    "Server is at capacity, please try again later",
                );
                let _ = socket.write_all(&response.to_bytes()).await;
                return;
            }
        };

        let dispatcher = self.dispatcher.clone();
        let config = self.config.clone();

        tasks.spawn(async move {
            // The permit is dropped when the task completes, releasing the semaphore slot
            let _permit = permit;

            debug!("Connection from {addr}");
            if let Err(e) = Self::handle_connection(&mut socket, dispatcher, &config).await {
                warn!("Error handling connection from {addr}: {e}");

                if let Error::IoError(ref io) = e {
                    if io.kind() == std::io::ErrorKind::BrokenPipe {
                        info!("Critical I/O error, initiating shutdown");
                        let _ = shutdown_tx.send(()).await;
                    }
                }
            }
        });
    }

    /// Handle connection errors.
    async fn handle_connection_error(e: std::io::Error) -> bool {
        error!("Error accepting connection: {e}");

        if e.kind() == std::io::ErrorKind::BrokenPipe {
            error!("Critical error accepting connection, shutting down");
            return true;
        }

        // For other errors, wait a bit before retrying
        tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;
        false
    }

    /// Perform graceful shutdown.
    async fn perform_shutdown(tasks: &mut JoinSet<()>) {
        info!("Waiting for {len} active connections to complete...", len = tasks.len());
        let shutdown_timeout = tokio::time::Duration::from_secs(30);
        let _ = tokio::time::timeout(shutdown_timeout, async {
            while let Some(res) = tasks.join_next().await {
                if let Err(e) = res {
                    error!("Task failed during shutdown: {e}");
                }
            }
        }).await;

        info!("Server shutdown complete");
    }

    /// Start the server and listen for incoming connections.
    pub async fn start(&self) -> Result<(), Error> {
        self.dispatcher.log_routes();

        let listener = self.setup_listener().await?;

        let semaphore = Arc::new(tokio::sync::Semaphore::new(self.config.max_connections));

        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
        let shutdown_tx = Arc::new(shutdown_tx);

        let mut tasks = JoinSet::new();

        Self::setup_ctrl_c_handler(shutdown_tx.clone(), &mut tasks);

        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    info!("Shutting down server...");
                    break;
                }

                accept_result = listener.accept() => {
                    match accept_result {
                        Ok((socket, addr)) => {
                            self.handle_new_connection(
                                socket,
                                addr,
                                semaphore.clone(),
                                shutdown_tx.clone(),
                                &mut tasks,
                            ).await;
                        },
                        Err(e) => {
                            if Self::handle_connection_error(e).await {
                                break;
                            }
                        }
                    }
                }
            }
        }

        Self::perform_shutdown(&mut tasks).await;

        Ok(())
    }

    /// Read one request: until the header block and the declared body have
    /// arrived, or the peer stops sending.
    async fn read_request(
        socket: &mut (impl AsyncRead + Unpin),
        read_buffer_size: usize,
        max_request_size: usize,
    ) -> Result<Vec<u8>, Error> {
        let mut data = Vec::new();
        let mut buf = vec![0; read_buffer_size];

        loop {
            let n = socket.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            data.extend_from_slice(&buf[..n]);

            if data.len() > max_request_size {
                return Err(Error::PayloadTooLarge(max_request_size));
            }
            if let Some(expected) = expected_length(&data) {
                if expected > max_request_size {
                    return Err(Error::PayloadTooLarge(max_request_size));
                }
                if data.len() >= expected {
                    break;
                }
            }
        }

        Ok(data)
    }

    /// Handle a single connection: one request, one response.
    pub async fn handle_connection(
        socket: &mut (impl AsyncRead + AsyncWrite + Unpin),
        dispatcher: Arc<Dispatcher>,
        config: &ServerConfig,
    ) -> Result<(), Error> {
        let data = match Self::read_request(socket, config.read_buffer_size, config.max_request_size).await {
            Ok(data) => data,
            Err(Error::PayloadTooLarge(limit)) => {
                let response = transport_error(
                    StatusCode::PayloadTooLarge,
                    format!("Request exceeds {limit} bytes"),
                );
                socket.write_all(&response.to_bytes()).await?;
                return Err(Error::PayloadTooLarge(limit));
            }
            Err(e) => return Err(e),
        };

        if data.is_empty() {
            return Ok(()); // Connection closed
        }

        let request = match parse_request(&data) {
            Ok(req) => req,
            Err(e) => {
                let response = transport_error(
                    StatusCode::BadRequest,
                    format!("Error parsing request: {e}"),
                );
                socket.write_all(&response.to_bytes()).await?;
                return Err(Error::ParseError(e));
            }
        };

        let response = dispatcher.dispatch(&request);
        info!(
            "{method} {path} -> {status}",
            method = request.method,
            path = request.path,
            status = response.status.code()
        );

        socket.write_all(&response.to_bytes()).await?;
        socket.flush().await?;

        Ok(())
    }
}
