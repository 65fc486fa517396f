//! Error types for the dispatch pipeline.

use thiserror::Error;

use crate::parser::Method;
use crate::server::StatusCode;

/// Boxed error returned by handlers.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors that can occur while dispatching a request.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The request body could not be decoded. Recovered locally: the handler
    /// sees an empty body.
    #[error("Malformed request body: {0}")]
    MalformedBody(String),

    /// No registered route matched the request.
    #[error("No route for {method} {path}")]
    NoRouteMatch { method: Method, path: String },

    /// A handler descriptor names a type or method the resolver does not know.
    #[error("Cannot resolve handler {handler}: {reason}")]
    HandlerResolution { handler: String, reason: String },

    /// The handler, or the construction of its instance, failed.
    #[error("{source}")]
    HandlerInvocation {
        handler: String,
        #[source]
        source: BoxError,
    },

    /// Response state was touched after it had been committed.
    #[error("Transport error: {0}")]
    Transport(String),

    /// A route template could not be compiled.
    #[error("Invalid route template {template}: {reason}")]
    InvalidTemplate { template: String, reason: String },
}

impl DispatchError {
    /// The status code the error boundary answers with.
    pub fn status(&self) -> StatusCode {
        match self {
            DispatchError::NoRouteMatch { .. } => StatusCode::NotFound,
            _ => StatusCode::InternalServerError,
        }
    }

    /// Whether the error points at a wiring mistake rather than a bad request
    /// or a failing handler.
    pub fn is_configuration_defect(&self) -> bool {
        matches!(
            self,
            DispatchError::HandlerResolution { .. }
                | DispatchError::Transport(_)
                | DispatchError::InvalidTemplate { .. }
        )
    }
}
