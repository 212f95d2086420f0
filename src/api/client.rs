//! API client for the Great Baladis admin backend.
//!
//! This module provides the `ApiClient` struct: bearer-token injection for
//! outgoing requests, the token refresh protocol, and a transparent
//! refresh-and-retry on a 401 response, capped at a single retry.

use std::sync::Arc;
use std::time::Duration;

use reqwest::{header, Client, Method, Response, StatusCode};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::auth::{TokenPair, TokenStore};
use crate::models::User;

use super::ApiError;

// ============================================================================
// Constants
// ============================================================================

/// Login endpoint: exchanges username/password for a token pair
const LOGIN_PATH: &str = "/api/token/";

/// Refresh endpoint: exchanges the refresh token for a new access token
const REFRESH_PATH: &str = "/api/token/refresh/";

/// Profile endpoint for the currently authenticated user
const PROFILE_PATH: &str = "/api/me/";

/// Logout endpoint: invalidates the refresh token server-side
const LOGOUT_PATH: &str = "/api/logout/";

/// HTTP request timeout in seconds.
/// 30s allows for slow responses while failing fast enough for good UX.
const REQUEST_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Serialize)]
struct LoginRequest<'a> {
    username: &'a str,
    password: &'a str,
}

#[derive(Debug, Deserialize)]
struct LoginResponse {
    access: String,
    refresh: String,
}

#[derive(Debug, Serialize)]
struct RefreshRequest<'a> {
    refresh: &'a str,
}

#[derive(Debug, Deserialize)]
struct RefreshResponse {
    access: Option<String>,
}

/// Retry progress for one wrapped request.
///
/// A request moves strictly `Initial -> Refreshing -> Retried`; the
/// `Retried` response is final whatever its status, so the one-retry cap
/// holds structurally rather than by a manually-tracked flag. `Refreshing`
/// carries the access token the failed dispatch used, so a concurrent
/// refresh that already replaced it can be detected.
#[derive(Debug, Clone, PartialEq, Eq)]
enum RetryState {
    Initial,
    Refreshing { stale: Option<String> },
    Retried,
}

/// API client for the admin backend.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    tokens: Arc<TokenStore>,
    /// Gates the refresh path so concurrent 401s coalesce into one refresh
    refresh_gate: Arc<Mutex<()>>,
}

impl ApiClient {
    /// Create a new API client against `base_url`, sharing `tokens`.
    pub fn new(base_url: impl Into<String>, tokens: Arc<TokenStore>) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.into(),
            tokens,
            refresh_gate: Arc::new(Mutex::new(())),
        })
    }

    /// The token store this client reads and maintains.
    pub fn tokens(&self) -> &Arc<TokenStore> {
        &self.tokens
    }

    /// Resolve a request path against the configured base address.
    /// Absolute URLs pass through unchanged.
    fn resolve(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            path.to_string()
        } else {
            format!("{}{}", self.base_url.trim_end_matches('/'), path)
        }
    }

    async fn dispatch<B: Serialize + ?Sized>(
        &self,
        method: Method,
        url: &str,
        body: Option<&B>,
        access: Option<&str>,
    ) -> Result<Response, ApiError> {
        let mut request = self
            .client
            .request(method, url)
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(token) = access {
            request = request.bearer_auth(token);
        }
        if let Some(body) = body {
            request = request.json(body);
        }
        Ok(request.send().await?)
    }

    /// Send an authenticated request, refreshing the access token at most
    /// once on a 401.
    ///
    /// The response is returned as-is for every status other than the first
    /// 401; error-body interpretation is the caller's responsibility. A
    /// failed refresh propagates instead of the original 401, with the
    /// token store already cleared by the refresh path.
    pub async fn send<B: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> Result<Response, ApiError> {
        let url = self.resolve(path);
        let mut state = RetryState::Initial;

        loop {
            state = match state {
                RetryState::Initial => {
                    let access = self.tokens.access();
                    let response = self
                        .dispatch(method.clone(), &url, body, access.as_deref())
                        .await?;
                    if response.status() != StatusCode::UNAUTHORIZED {
                        return Ok(response);
                    }
                    debug!(url = %url, "Request unauthorized, attempting token refresh");
                    RetryState::Refreshing { stale: access }
                }
                RetryState::Refreshing { stale } => {
                    self.refresh_access(stale.as_deref()).await?;
                    RetryState::Retried
                }
                RetryState::Retried => {
                    let access = self.tokens.access();
                    return Ok(self
                        .dispatch(method.clone(), &url, body, access.as_deref())
                        .await?);
                }
            };
        }
    }

    /// Exchange the stored refresh token for a new access token.
    ///
    /// `stale_access` is the access token the caller last saw; if another
    /// task already replaced it while this one waited on the gate, the
    /// replacement is returned without a second refresh call.
    ///
    /// Exactly one network attempt is made. Every failure clears the token
    /// store before returning: a rejected or malformed response means the
    /// refresh token is known-invalid and must not be reused, and with no
    /// refresh token stored any leftover access token is unrenewable.
    pub async fn refresh_access(&self, stale_access: Option<&str>) -> Result<String, ApiError> {
        let _gate = self.refresh_gate.lock().await;

        if let Some(current) = self.tokens.access() {
            if stale_access != Some(current.as_str()) {
                debug!("Access token already replaced by a concurrent refresh");
                return Ok(current);
            }
        }

        let Some(refresh) = self.tokens.refresh() else {
            // A stale access token with nothing to renew it is useless;
            // drop it so the session falls back to a clean re-login.
            self.tokens.clear();
            return Err(ApiError::NoRefreshToken);
        };

        let url = self.resolve(REFRESH_PATH);
        let response = self
            .client
            .post(&url)
            .json(&RefreshRequest { refresh: &refresh })
            .send()
            .await?;

        if !response.status().is_success() {
            warn!(status = %response.status(), "Refresh token rejected, clearing tokens");
            self.tokens.clear();
            return Err(ApiError::RefreshRejected);
        }

        let body: RefreshResponse = match response.json().await {
            Ok(body) => body,
            Err(e) => {
                self.tokens.clear();
                return Err(ApiError::MalformedResponse(e.to_string()));
            }
        };
        let Some(access) = body.access else {
            self.tokens.clear();
            return Err(ApiError::MalformedResponse(
                "refresh response missing access token".to_string(),
            ));
        };

        self.tokens.set_access(&access);
        debug!("Access token refreshed");
        Ok(access)
    }

    /// Exchange username/password for a token pair and store it.
    pub async fn login(&self, username: &str, password: &str) -> Result<(), ApiError> {
        let url = self.resolve(LOGIN_PATH);
        let response = self
            .client
            .post(&url)
            .json(&LoginRequest { username, password })
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            debug!(status = %status, "Login rejected");
            return Err(ApiError::credentials_from_body(&body));
        }

        let tokens: LoginResponse = response
            .json()
            .await
            .map_err(|e| ApiError::MalformedResponse(e.to_string()))?;
        self.tokens.set(TokenPair::new(tokens.access, tokens.refresh));
        Ok(())
    }

    /// Fetch the current user's profile through the authenticated wrapper.
    ///
    /// Returns `Ok(None)` on any non-success status: a rejected profile
    /// fetch means "not authenticated", not a hard error.
    pub async fn fetch_profile(&self) -> Result<Option<User>, ApiError> {
        let response = self.send(Method::GET, PROFILE_PATH, None::<&()>).await?;

        if !response.status().is_success() {
            debug!(status = %response.status(), "Profile fetch rejected");
            return Ok(None);
        }

        let user = response
            .json()
            .await
            .map_err(|e| ApiError::MalformedResponse(e.to_string()))?;
        Ok(Some(user))
    }

    /// Ask the server to invalidate the stored refresh token.
    ///
    /// A rejection is logged and ignored; transport errors are surfaced so
    /// the caller can decide (the session controller swallows them).
    pub async fn logout_notify(&self) -> Result<(), ApiError> {
        let Some(refresh) = self.tokens.refresh() else {
            return Ok(());
        };

        let url = self.resolve(LOGOUT_PATH);
        let response = self
            .client
            .post(&url)
            .json(&RefreshRequest { refresh: &refresh })
            .send()
            .await?;

        if !response.status().is_success() {
            debug!(status = %response.status(), "Logout notification rejected");
        }
        Ok(())
    }
}
