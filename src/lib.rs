//! An HTTP request-dispatch layer for a content-management backend.
//!
//! Requests arrive over a small async HTTP/1.1 transport, are parsed into an
//! [`HttpRequest`], and are handed to a [`Dispatcher`] which:
//!
//! - writes the CORS header set on every response and answers `OPTIONS`
//!   preflights directly
//! - decodes the body as JSON or URL-encoded form fields
//! - matches the path against an ordered table of route templates
//!   (`/content-types/{typeId}/content/{id}`), first match wins
//! - assembles the handler's positional arguments according to the route's
//!   declared convention
//! - resolves and invokes the handler, and serializes its outcome as JSON
//!
//! Every failure along the way becomes a JSON error response; a failing or
//! panicking handler never takes the server down.
//!
//! # Examples
//!
//! ## Dispatching a request
//!
//! ```
//! use cms_dispatch::{parse_request, ArgumentList, Dispatcher, HandlerDescriptor, Outcome, StatusCode};
//! use serde_json::json;
//!
//! let mut dispatcher = Dispatcher::new();
//! dispatcher
//!     .get("/articles/{id}", HandlerDescriptor::callable(|args: ArgumentList| {
//!         Ok(Outcome::success(json!({ "id": args.require_param(0)? })))
//!     }))
//!     .unwrap();
//!
//! let request = parse_request(b"GET /articles/7 HTTP/1.1\r\nHost: cms.local\r\n\r\n").unwrap();
//! let response = dispatcher.dispatch(&request);
//!
//! assert_eq!(response.status, StatusCode::Ok);
//! assert_eq!(response.get_header("Access-Control-Allow-Origin"), Some("*"));
//! assert_eq!(response.json_body().unwrap(), json!({ "success": true, "data": { "id": "7" } }));
//! ```
//!
//! ## Error handling
//!
//! ```
//! use cms_dispatch::{parse_request, ParserError};
//!
//! let invalid_request = b"FETCH /index.html HTTP/1.1\r\nHost: example.com\r\n\r\n";
//!
//! match parse_request(invalid_request) {
//!     Ok(_) => println!("Request parsed successfully"),
//!     Err(ParserError::InvalidMethod(method)) => println!("Invalid method: {}", method),
//!     Err(err) => println!("Other error: {}", err),
//! }
//! ```
//!
//! See the `demos` directory for a complete server wiring controllers,
//! collaborators and every argument convention.

pub mod parser;

pub mod dispatch;

pub mod services;

pub mod server;

// Re-export commonly used items for convenience
pub use parser::{Error as ParserError, HttpRequest, HttpVersion, Method, parse_request};
pub use dispatch::{
    ArgumentConvention, ArgumentList, BodyValue, Controller, CorsConfig, DispatchError, Dispatcher,
    HandlerDescriptor, HandlerResult, Outcome, RequestContext, ResolverRegistry, Route,
};
pub use server::{Error as ServerError, HttpResponse, HttpServer, ServerConfig, StatusCode};
