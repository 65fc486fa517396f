//! The authentication collaborator.

use std::cell::OnceCell;

use serde::{Deserialize, Serialize};

use crate::dispatch::{Headers, Outcome};
use crate::server::StatusCode;

/// The authenticated caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub id: i64,
    pub username: String,
    pub role: String,
}

impl Principal {
    pub fn has_role(&self, role: &str) -> bool {
        self.role == role
    }
}

/// Resolves the caller of the current request.
pub trait Authenticator: Send + Sync {
    /// The principal behind the request, or `None` when the credentials are
    /// missing, malformed or invalid.
    fn authenticate(&self, headers: &Headers) -> Option<Principal>;
}

/// The token from `Authorization: Bearer <token>`.
pub fn bearer_token(headers: &Headers) -> Option<&str> {
    let value = headers.get("authorization")?.trim();
    let (scheme, token) = value.split_once(' ')?;
    let token = token.trim();
    if scheme.eq_ignore_ascii_case("bearer") && !token.is_empty() {
        Some(token)
    } else {
        None
    }
}

/// Authentication for a single request.
///
/// The authenticator runs at most once; later lookups in the same request
/// reuse its answer. Nothing is shared between requests.
pub struct RequestAuth<'a> {
    authenticator: &'a dyn Authenticator,
    headers: &'a Headers,
    resolved: OnceCell<Option<Principal>>,
}

impl<'a> RequestAuth<'a> {
    pub fn new(authenticator: &'a dyn Authenticator, headers: &'a Headers) -> Self {
        Self {
            authenticator,
            headers,
            resolved: OnceCell::new(),
        }
    }

    pub fn principal(&self) -> Option<&Principal> {
        self.resolved
            .get_or_init(|| self.authenticator.authenticate(self.headers))
            .as_ref()
    }

    /// The principal, or a 401 outcome for the handler to return.
    pub fn require(&self) -> Result<&Principal, Outcome> {
        self.principal()
            .ok_or_else(|| Outcome::fail(StatusCode::Unauthorized, "Authentication required"))
    }

    /// The principal if it has `role`; 401 when anonymous, 403 otherwise.
    pub fn require_role(&self, role: &str) -> Result<&Principal, Outcome> {
        let principal = self.require()?;
        if principal.has_role(role) {
            Ok(principal)
        } else {
            Err(Outcome::fail(StatusCode::Forbidden, "Insufficient permissions"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct StaticTokens {
        lookups: AtomicUsize,
    }

    impl Authenticator for StaticTokens {
        fn authenticate(&self, headers: &Headers) -> Option<Principal> {
            self.lookups.fetch_add(1, Ordering::SeqCst);
            match bearer_token(headers)? {
                "admin-token" => Some(Principal { id: 1, username: "root".to_string(), role: "admin".to_string() }),
                "editor-token" => Some(Principal { id: 2, username: "ed".to_string(), role: "editor".to_string() }),
                _ => None,
            }
        }
    }

    fn headers(authorization: Option<&str>) -> Headers {
        let mut headers = Headers::default();
        if let Some(value) = authorization {
            headers.insert("Authorization", value);
        }
        headers
    }

    #[test]
    fn test_bearer_token() {
        assert_eq!(bearer_token(&headers(Some("Bearer abc"))), Some("abc"));
        assert_eq!(bearer_token(&headers(Some("bearer  abc "))), Some("abc"));
        assert_eq!(bearer_token(&headers(Some("Basic abc"))), None);
        assert_eq!(bearer_token(&headers(Some("Bearer"))), None);
        assert_eq!(bearer_token(&headers(None)), None);
    }

    #[test]
    fn test_authenticates_once_per_request() {
        let auth = StaticTokens { lookups: AtomicUsize::new(0) };
        let headers = headers(Some("Bearer admin-token"));
        let request_auth = RequestAuth::new(&auth, &headers);

        assert_eq!(request_auth.principal().unwrap().username, "root");
        assert!(request_auth.require_role("admin").is_ok());
        assert_eq!(auth.lookups.load(Ordering::SeqCst), 1);

        // A new request starts from scratch.
        let next = RequestAuth::new(&auth, &headers);
        assert!(next.principal().is_some());
        assert_eq!(auth.lookups.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_require_maps_to_401_and_403() {
        let auth = StaticTokens { lookups: AtomicUsize::new(0) };

        let anonymous = headers(None);
        let err = RequestAuth::new(&auth, &anonymous).require().unwrap_err();
        assert_eq!(err.status_code(), StatusCode::Unauthorized);

        let editor = headers(Some("Bearer editor-token"));
        let err = RequestAuth::new(&auth, &editor).require_role("admin").unwrap_err();
        assert_eq!(err.status_code(), StatusCode::Forbidden);
    }
}
