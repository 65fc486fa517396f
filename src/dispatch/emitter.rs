//! Handler outcomes and the response emitter.

use serde::Serialize;
use serde_json::{json, Value};

use crate::dispatch::error::{BoxError, DispatchError};
use crate::dispatch::exchange::Exchange;
use crate::server::{HttpResponse, StatusCode};

/// What a handler produced.
#[derive(Debug, Clone)]
pub enum Outcome {
    /// A JSON value to serialize with the given status.
    Json { status: StatusCode, body: Value },
    /// A response the handler built itself. Emitted as-is, apart from
    /// headers the exchange queued earlier.
    Manual(HttpResponse),
}

impl Outcome {
    /// 200 with `body` serialized verbatim.
    pub fn ok(body: Value) -> Self {
        Self::status(StatusCode::Ok, body)
    }

    /// 201 with `body` serialized verbatim.
    pub fn created(body: Value) -> Self {
        Self::status(StatusCode::Created, body)
    }

    pub fn status(status: StatusCode, body: Value) -> Self {
        Outcome::Json { status, body }
    }

    /// Serialize any value into a JSON outcome.
    pub fn serialize<T: Serialize>(status: StatusCode, value: &T) -> Result<Self, BoxError> {
        Ok(Self::status(status, serde_json::to_value(value)?))
    }

    /// 200 with `{"success": true, "data": data}`.
    pub fn success(data: Value) -> Self {
        Self::ok(envelope::success(data))
    }

    /// `{"success": false, "error": message}` with the given status.
    pub fn fail(status: StatusCode, message: impl Into<String>) -> Self {
        Self::status(status, envelope::failure(message))
    }

    pub fn manual(response: HttpResponse) -> Self {
        Outcome::Manual(response)
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Outcome::Json { status, .. } => *status,
            Outcome::Manual(response) => response.status,
        }
    }
}

/// The `{"success": ...}` response shapes.
pub mod envelope {
    use serde_json::{json, Value};

    pub fn success(data: Value) -> Value {
        json!({ "success": true, "data": data })
    }

    pub fn success_message(message: impl Into<String>) -> Value {
        json!({ "success": true, "message": message.into() })
    }

    pub fn success_with(data: Value, message: impl Into<String>) -> Value {
        json!({ "success": true, "data": data, "message": message.into() })
    }

    pub fn failure(message: impl Into<String>) -> Value {
        json!({ "success": false, "error": message.into() })
    }
}

/// The body the dispatcher itself answers errors with.
pub fn error_body(message: impl Into<String>) -> Value {
    json!({ "error": message.into() })
}

/// Write `outcome` to the exchange. The exchange accepts exactly one emission.
pub fn emit(outcome: Outcome, exchange: &mut Exchange) -> Result<(), DispatchError> {
    match outcome {
        Outcome::Json { status, body } => {
            let bytes = serde_json::to_vec(&body).map_err(|e| DispatchError::HandlerInvocation {
                handler: "<emitter>".to_string(),
                source: e.into(),
            })?;
            exchange.commit(status, Some("application/json"), bytes)
        }
        Outcome::Manual(response) => exchange.adopt(response),
    }
}
