//! HTTP parser module.
//!
//! Turns raw bytes read from a connection into an [`HttpRequest`]: request
//! line, headers, decoded query parameters and the body bytes.

mod request;
mod method;
mod version;
mod error;

pub use request::HttpRequest;
pub use method::Method;
pub use version::HttpVersion;
pub use error::Error;

pub use request::{expected_length, parse_request};
pub(crate) use request::decode_form;
