//! Authentication module for managing admin sessions and tokens.
//!
//! This module provides:
//! - `TokenStore`: persisted access/refresh token pair
//! - `SessionController`: the login/logout/bootstrap state machine
//! - `AuthBackend`: the seam between the controller and its credential
//!   source, with remote (token API) and local-only implementations
//!
//! Tokens are persisted to disk and renewed lazily on expiry.

pub mod backend;
pub mod session;
pub mod tokens;

pub use backend::{AuthBackend, LocalAuthBackend};
pub use session::{SessionController, SessionState};
pub use tokens::{TokenPair, TokenStore};
