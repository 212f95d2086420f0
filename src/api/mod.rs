//! REST API client module for the Great Baladis admin backend.
//!
//! This module provides the `ApiClient` for communicating with the site's
//! Django backend: login, token refresh, profile fetch, and logout.
//!
//! Authenticated requests carry a JWT bearer token; an expired access
//! token is renewed transparently with exactly one refresh-and-retry.

pub mod client;
pub mod error;

pub use client::ApiClient;
pub use error::ApiError;
