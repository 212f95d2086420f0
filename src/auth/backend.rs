//! Credential backends for the session controller.
//!
//! The site shipped with two admin-auth variants: the original local-only
//! gate (fixed credentials, an `adminAuth` flag) and the token-backed
//! remote API. Both are expressed as implementations of [`AuthBackend`]
//! so the session state machine exists only once.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::warn;

use crate::api::{ApiClient, ApiError};
use crate::models::User;

/// Operations the session controller needs from a credential backend.
pub trait AuthBackend {
    /// Exchange username/password for stored session credentials.
    async fn login(&self, username: &str, password: &str) -> Result<(), ApiError>;

    /// Fetch the current user's profile. `Ok(None)` means unauthenticated.
    async fn fetch_profile(&self) -> Result<Option<User>, ApiError>;

    /// Best-effort server-side invalidation of the session credentials.
    async fn logout_notify(&self) -> Result<(), ApiError>;

    /// Whether any session credential is currently stored.
    fn has_credentials(&self) -> bool;

    /// Drop stored credentials locally. Idempotent.
    fn discard_credentials(&self);
}

impl AuthBackend for ApiClient {
    async fn login(&self, username: &str, password: &str) -> Result<(), ApiError> {
        ApiClient::login(self, username, password).await
    }

    async fn fetch_profile(&self) -> Result<Option<User>, ApiError> {
        ApiClient::fetch_profile(self).await
    }

    async fn logout_notify(&self) -> Result<(), ApiError> {
        ApiClient::logout_notify(self).await
    }

    fn has_credentials(&self) -> bool {
        self.tokens().get().is_some()
    }

    fn discard_credentials(&self) {
        self.tokens().clear();
    }
}

/// Flag file name in the data directory
const AUTH_FLAG_FILE: &str = "admin_auth";

/// Local-only admin gate: a configured username/password checked
/// in-process, no network. The authenticated flag can be persisted so the
/// admin session survives restarts, matching the original behavior.
pub struct LocalAuthBackend {
    username: String,
    password: String,
    profile: User,
    flag_path: Option<PathBuf>,
    authed: AtomicBool,
}

impl LocalAuthBackend {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        let username = username.into();
        let profile = User {
            username: username.clone(),
            email: None,
            is_staff: true,
        };
        Self {
            username,
            password: password.into(),
            profile,
            flag_path: None,
            authed: AtomicBool::new(false),
        }
    }

    /// Persist the authenticated flag under `data_dir`.
    pub fn persisted(
        username: impl Into<String>,
        password: impl Into<String>,
        data_dir: PathBuf,
    ) -> Self {
        let mut backend = Self::new(username, password);
        let path = data_dir.join(AUTH_FLAG_FILE);
        backend.authed = AtomicBool::new(path.exists());
        backend.flag_path = Some(path);
        backend
    }

    fn persist_flag(&self, authed: bool) {
        let Some(ref path) = self.flag_path else {
            return;
        };
        if authed {
            if let Some(parent) = path.parent() {
                if let Err(e) = std::fs::create_dir_all(parent) {
                    warn!(error = %e, "Failed to create data directory");
                    return;
                }
            }
            if let Err(e) = std::fs::write(path, "true") {
                warn!(error = %e, "Failed to persist auth flag");
            }
        } else if path.exists() {
            if let Err(e) = std::fs::remove_file(path) {
                warn!(error = %e, "Failed to remove auth flag");
            }
        }
    }
}

impl AuthBackend for LocalAuthBackend {
    async fn login(&self, username: &str, password: &str) -> Result<(), ApiError> {
        if username == self.username && password == self.password {
            self.authed.store(true, Ordering::SeqCst);
            self.persist_flag(true);
            Ok(())
        } else {
            Err(ApiError::CredentialsInvalid(
                "Invalid username or password".to_string(),
            ))
        }
    }

    async fn fetch_profile(&self) -> Result<Option<User>, ApiError> {
        if self.authed.load(Ordering::SeqCst) {
            Ok(Some(self.profile.clone()))
        } else {
            Ok(None)
        }
    }

    async fn logout_notify(&self) -> Result<(), ApiError> {
        // Nothing to notify: there is no server in the local variant
        Ok(())
    }

    fn has_credentials(&self) -> bool {
        self.authed.load(Ordering::SeqCst)
    }

    fn discard_credentials(&self) {
        self.authed.store(false, Ordering::SeqCst);
        self.persist_flag(false);
    }
}
