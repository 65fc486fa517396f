//! Request-scoped response state.

use crate::dispatch::error::DispatchError;
use crate::server::{HttpResponse, StatusCode};

/// The response being assembled for one request.
///
/// Created fresh by the dispatcher for every request and threaded through
/// the pipeline by `&mut`. Headers may be queued until the response is
/// committed; the body is written exactly once.
#[derive(Debug)]
pub struct Exchange {
    response: HttpResponse,
    cors_applied: bool,
    committed: bool,
}

impl Exchange {
    pub fn new() -> Self {
        Self {
            response: HttpResponse::new(StatusCode::Ok),
            cors_applied: false,
            committed: false,
        }
    }

    /// Whether the CORS header set has been written for this request.
    pub fn cors_applied(&self) -> bool {
        self.cors_applied
    }

    pub(crate) fn mark_cors_applied(&mut self) {
        self.cors_applied = true;
    }

    /// Whether the status line and headers are final.
    pub fn headers_sent(&self) -> bool {
        self.committed
    }

    /// The response as it stands.
    pub fn response(&self) -> &HttpResponse {
        &self.response
    }

    fn ensure_open(&self, what: &str) -> Result<(), DispatchError> {
        if self.committed {
            return Err(DispatchError::Transport(format!(
                "{what} after the response was committed"
            )));
        }
        Ok(())
    }

    /// Queue a header for the response.
    pub fn queue_header(&mut self, name: &str, value: impl Into<String>) -> Result<(), DispatchError> {
        self.ensure_open(&format!("header {name} queued"))?;
        self.response.append_header(name, value);
        Ok(())
    }

    /// Drop queued headers whose name satisfies `pred`.
    pub fn remove_headers(&mut self, pred: impl Fn(&str) -> bool) -> Result<(), DispatchError> {
        self.ensure_open("headers removed")?;
        self.response.headers.retain(|(k, _)| !pred(k));
        Ok(())
    }

    /// Write status, content type and body. Fails if already committed.
    pub fn commit(
        &mut self,
        status: StatusCode,
        content_type: Option<&str>,
        body: Vec<u8>,
    ) -> Result<(), DispatchError> {
        self.ensure_open("body written")?;
        self.response.status = status;
        if let Some(content_type) = content_type {
            self.response.set_header("Content-Type", content_type);
        }
        self.response.set_header("Content-Length", body.len().to_string());
        self.response.body = body;
        self.committed = true;
        Ok(())
    }

    /// Take over a response a handler built itself.
    ///
    /// Headers already queued on the exchange (CORS among them) are kept
    /// unless the handler's response sets the same name.
    pub fn adopt(&mut self, response: HttpResponse) -> Result<(), DispatchError> {
        self.ensure_open("manual response adopted")?;
        let queued = std::mem::take(&mut self.response.headers);
        let mut merged = response;
        for (name, value) in queued {
            if merged.get_header(&name).is_none() {
                merged.append_header(name, value);
            }
        }
        self.response = merged;
        self.committed = true;
        Ok(())
    }

    /// Hand the finished response to the transport.
    pub fn finish(self) -> HttpResponse {
        self.response
    }
}

impl Default for Exchange {
    fn default() -> Self {
        Self::new()
    }
}
