//! Collaborators handed to handlers.
//!
//! The dispatcher never calls these itself; controllers receive them through
//! their factories in the [`ResolverRegistry`](crate::dispatch::ResolverRegistry)
//! or hold them in a bound instance.

mod auth;
mod data;

pub use auth::{bearer_token, Authenticator, Principal, RequestAuth};
pub use data::{with_transaction, DataAccess, DataError, Row};
