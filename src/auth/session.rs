//! Session controller: the state machine behind "who is logged in".
//!
//! A session starts in `Bootstrapping` and always settles into exactly one
//! of `Authenticated` or `Anonymous`. Transitions are driven only by
//! `bootstrap`, `login` and `logout`; consumers observe them through a
//! watch channel instead of polling.

use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::api::ApiError;
use crate::models::User;

use super::backend::AuthBackend;

/// Current session state.
///
/// `Authenticated` carries the profile by construction, so an
/// authenticated session without a user cannot be represented.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    /// Startup: stored credentials not yet checked against the server
    Bootstrapping,
    Authenticated(User),
    Anonymous,
}

impl SessionState {
    pub fn is_authenticated(&self) -> bool {
        matches!(self, SessionState::Authenticated(_))
    }

    pub fn user(&self) -> Option<&User> {
        match self {
            SessionState::Authenticated(user) => Some(user),
            _ => None,
        }
    }
}

/// Owns the session state machine and the credential backend.
///
/// The sole writer of [`SessionState`]: every network or protocol failure
/// is converted into a state transition here rather than leaking upward,
/// with [`SessionController::login`] additionally re-throwing a normalized
/// error for the caller to display.
pub struct SessionController<B> {
    backend: B,
    state: watch::Sender<SessionState>,
}

impl<B: AuthBackend> SessionController<B> {
    /// Create a controller in `Bootstrapping`. Call
    /// [`SessionController::bootstrap`] next to settle the session.
    pub fn new(backend: B) -> Self {
        let (state, _) = watch::channel(SessionState::Bootstrapping);
        Self { backend, state }
    }

    /// Snapshot of the current state.
    pub fn state(&self) -> SessionState {
        self.state.borrow().clone()
    }

    /// Subscribe to session-state changes.
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    pub fn is_authenticated(&self) -> bool {
        self.state.borrow().is_authenticated()
    }

    pub fn user(&self) -> Option<User> {
        self.state.borrow().user().cloned()
    }

    /// Restore the session from stored credentials.
    ///
    /// Always terminates in `Authenticated` or `Anonymous`. With nothing
    /// stored the profile fetch is skipped entirely; any fetch or refresh
    /// failure clears credentials and settles `Anonymous` (fail closed).
    pub async fn bootstrap(&self) {
        self.settle().await;
    }

    /// Exchange credentials for a session.
    ///
    /// On success the stored pair is settled through the same
    /// profile-fetch path as [`SessionController::bootstrap`]. On
    /// rejection the session is forced `Anonymous` and the error carries a
    /// display-ready message.
    pub async fn login(&self, username: &str, password: &str) -> Result<(), ApiError> {
        match self.backend.login(username, password).await {
            Ok(()) => {
                self.settle().await;
                Ok(())
            }
            Err(e) => {
                error!(error = %e, "Login failed");
                self.backend.discard_credentials();
                self.state.send_replace(SessionState::Anonymous);
                Err(e)
            }
        }
    }

    /// End the session. Never fails: the server-side invalidation is
    /// best-effort, local credentials are dropped unconditionally.
    pub async fn logout(&self) {
        if let Err(e) = self.backend.logout_notify().await {
            debug!(error = %e, "Logout notification failed, ignoring");
        }
        self.backend.discard_credentials();
        self.state.send_replace(SessionState::Anonymous);
        info!("Logged out");
    }

    async fn settle(&self) {
        if !self.backend.has_credentials() {
            debug!("No stored credentials, session is anonymous");
            self.state.send_replace(SessionState::Anonymous);
            return;
        }

        match self.backend.fetch_profile().await {
            Ok(Some(user)) => {
                info!(username = %user.username, "Session authenticated");
                self.state.send_replace(SessionState::Authenticated(user));
            }
            Ok(None) => {
                debug!("Profile fetch rejected, session is anonymous");
                self.backend.discard_credentials();
                self.state.send_replace(SessionState::Anonymous);
            }
            Err(e) => {
                warn!(error = %e, "Profile fetch failed, session is anonymous");
                self.backend.discard_credentials();
                self.state.send_replace(SessionState::Anonymous);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use crate::api::ApiClient;
    use crate::auth::{TokenPair, TokenStore};

    fn controller_for(server: &MockServer) -> (SessionController<ApiClient>, Arc<TokenStore>) {
        let tokens = Arc::new(TokenStore::in_memory());
        let api = ApiClient::new(server.uri(), tokens.clone()).unwrap();
        (SessionController::new(api), tokens)
    }

    #[tokio::test]
    async fn test_bootstrap_with_no_tokens_settles_anonymous_without_network() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/me/"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let (controller, _) = controller_for(&server);
        assert_eq!(controller.state(), SessionState::Bootstrapping);

        controller.bootstrap().await;
        assert_eq!(controller.state(), SessionState::Anonymous);
    }

    #[tokio::test]
    async fn test_bootstrap_with_valid_token_authenticates() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/me/"))
            .and(header("authorization", "Bearer acc1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "username": "Ama"
            })))
            .mount(&server)
            .await;

        let (controller, tokens) = controller_for(&server);
        tokens.set(TokenPair::new("acc1", "ref1"));

        controller.bootstrap().await;
        assert!(controller.is_authenticated());
        assert_eq!(controller.user().unwrap().username, "Ama");
    }

    #[tokio::test]
    async fn test_bootstrap_refreshes_expired_token_then_authenticates() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/me/"))
            .and(header("authorization", "Bearer stale"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/me/"))
            .and(header("authorization", "Bearer new123"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "username": "Ama"
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/token/refresh/"))
            .and(body_json(serde_json::json!({ "refresh": "ref1" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access": "new123"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let (controller, tokens) = controller_for(&server);
        tokens.set(TokenPair::new("stale", "ref1"));

        controller.bootstrap().await;
        assert!(controller.is_authenticated());
        assert_eq!(tokens.access().as_deref(), Some("new123"));
    }

    #[tokio::test]
    async fn test_bootstrap_with_rejected_refresh_clears_tokens_and_settles_anonymous() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/me/"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/token/refresh/"))
            .respond_with(ResponseTemplate::new(400))
            .mount(&server)
            .await;

        let (controller, tokens) = controller_for(&server);
        tokens.set(TokenPair::new("stale", "ref1"));

        controller.bootstrap().await;
        assert_eq!(controller.state(), SessionState::Anonymous);
        assert!(tokens.get().is_none());
    }

    #[tokio::test]
    async fn test_login_stores_pair_and_authenticates() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/token/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access": "acc1",
                "refresh": "ref1"
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/me/"))
            .and(header("authorization", "Bearer acc1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "username": "Ama"
            })))
            .mount(&server)
            .await;

        let (controller, tokens) = controller_for(&server);
        controller.login("admin", "hunter2").await.unwrap();

        assert!(controller.is_authenticated());
        let pair = tokens.get().unwrap();
        assert_eq!(pair.access.as_deref(), Some("acc1"));
        assert_eq!(pair.refresh.as_deref(), Some("ref1"));
    }

    #[tokio::test]
    async fn test_login_rejection_surfaces_message_and_stays_anonymous() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/token/"))
            .respond_with(ResponseTemplate::new(401).set_body_json(serde_json::json!({
                "detail": "Invalid credentials"
            })))
            .mount(&server)
            .await;

        let (controller, tokens) = controller_for(&server);
        let err = controller.login("admin", "wrongpass").await.unwrap_err();
        match err {
            ApiError::CredentialsInvalid(msg) => assert_eq!(msg, "Invalid credentials"),
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(controller.state(), SessionState::Anonymous);
        assert!(tokens.get().is_none());
    }

    #[tokio::test]
    async fn test_logout_clears_tokens_and_notifies_server() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/logout/"))
            .and(body_json(serde_json::json!({ "refresh": "ref1" })))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let (controller, tokens) = controller_for(&server);
        tokens.set(TokenPair::new("acc1", "ref1"));

        controller.logout().await;
        assert_eq!(controller.state(), SessionState::Anonymous);
        assert!(tokens.get().is_none());
    }

    #[tokio::test]
    async fn test_logout_never_fails_even_when_server_is_unreachable() {
        // Nothing is listening on this port; the notification errors out
        // and must be swallowed.
        let tokens = Arc::new(TokenStore::in_memory());
        let api = ApiClient::new("http://127.0.0.1:9", tokens.clone()).unwrap();
        let controller = SessionController::new(api);
        tokens.set(TokenPair::new("acc1", "ref1"));

        controller.logout().await;
        assert_eq!(controller.state(), SessionState::Anonymous);
        assert!(tokens.get().is_none());
    }

    #[tokio::test]
    async fn test_state_changes_reach_watch_subscribers() {
        let server = MockServer::start().await;
        let (controller, _) = controller_for(&server);
        let mut rx = controller.subscribe();
        assert_eq!(*rx.borrow_and_update(), SessionState::Bootstrapping);

        controller.bootstrap().await;
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow_and_update(), SessionState::Anonymous);
    }

    #[tokio::test]
    async fn test_controller_works_with_local_backend() {
        use crate::auth::LocalAuthBackend;

        let controller = SessionController::new(LocalAuthBackend::new("admin", "admin123"));
        controller.bootstrap().await;
        assert_eq!(controller.state(), SessionState::Anonymous);

        controller.login("admin", "admin123").await.unwrap();
        assert!(controller.is_authenticated());
        assert_eq!(controller.user().unwrap().username, "admin");

        controller.logout().await;
        assert_eq!(controller.state(), SessionState::Anonymous);
    }
}
