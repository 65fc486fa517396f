//! HTTP transport.
//!
//! Accepts connections, reads and parses requests, hands them to a
//! [`Dispatcher`](crate::dispatch::Dispatcher) and writes the response back.

mod response;
mod config;
mod error;
mod http_server;
mod tests;

pub use response::{HttpResponse, StatusCode};
pub use config::ServerConfig;
pub use error::Error;
pub use http_server::HttpServer;
