//! Core library for the Great Baladis admin client.
//!
//! Provides the API client for the site's backend, token storage with
//! silent refresh-on-expiry, and the session controller the admin
//! surfaces drive.

pub mod api;
pub mod auth;
pub mod config;
pub mod models;

pub use api::{ApiClient, ApiError};
pub use auth::{
    AuthBackend, LocalAuthBackend, SessionController, SessionState, TokenPair, TokenStore,
};
pub use config::Config;
pub use models::User;
