//! Cross-origin headers and preflight handling.

use log::debug;

use crate::dispatch::error::DispatchError;
use crate::dispatch::exchange::Exchange;
use crate::parser::Method;
use crate::server::StatusCode;

const CORS_PREFIX: &str = "access-control-";

/// The fixed CORS header set written on every response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorsConfig {
    pub allow_origin: String,
    pub allow_methods: String,
    pub allow_headers: String,
    pub allow_credentials: bool,
    /// Preflight cache lifetime in seconds.
    pub max_age: u32,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allow_origin: "*".to_string(),
            allow_methods: "GET,POST,PUT,PATCH,DELETE,OPTIONS".to_string(),
            allow_headers: "Content-Type,Authorization,X-Requested-With".to_string(),
            allow_credentials: true,
            max_age: 86400,
        }
    }
}

impl CorsConfig {
    fn header_set(&self) -> [(&'static str, String); 5] {
        [
            ("Access-Control-Allow-Origin", self.allow_origin.clone()),
            ("Access-Control-Allow-Methods", self.allow_methods.clone()),
            ("Access-Control-Allow-Headers", self.allow_headers.clone()),
            ("Access-Control-Allow-Credentials", self.allow_credentials.to_string()),
            ("Access-Control-Max-Age", self.max_age.to_string()),
        ]
    }

    /// Write the CORS header set onto the exchange, at most once per request.
    ///
    /// Any `Access-Control-*` header queued earlier is dropped first. Fails
    /// with [`DispatchError::Transport`] if the response is already committed.
    pub fn apply_headers(&self, exchange: &mut Exchange) -> Result<(), DispatchError> {
        if exchange.cors_applied() {
            return Ok(());
        }
        if exchange.headers_sent() {
            return Err(DispatchError::Transport(
                "CORS headers applied after the response was committed".to_string(),
            ));
        }

        exchange.remove_headers(|name| name.to_ascii_lowercase().starts_with(CORS_PREFIX))?;
        for (name, value) in self.header_set() {
            exchange.queue_header(name, value)?;
        }
        exchange.mark_cors_applied();
        Ok(())
    }

    /// Answer an `OPTIONS` request with an empty 200.
    ///
    /// Returns `true` when the request was a preflight and the exchange is now
    /// committed; the caller must not route it.
    pub fn handle_preflight(&self, method: Method, exchange: &mut Exchange) -> Result<bool, DispatchError> {
        if method != Method::OPTIONS {
            return Ok(false);
        }

        self.apply_headers(exchange)?;
        exchange.commit(StatusCode::Ok, None, Vec::new())?;
        debug!("Answered CORS preflight");
        Ok(true)
    }
}
