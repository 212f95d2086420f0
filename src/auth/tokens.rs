use std::path::PathBuf;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Token file name in the data directory
const TOKEN_FILE: &str = "tokens.json";

/// A bearer credential pair as issued by the login endpoint.
///
/// Either field may be absent: a merge-write through [`TokenStore::set`]
/// only touches the fields that are present.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPair {
    #[serde(rename = "accessToken", skip_serializing_if = "Option::is_none")]
    pub access: Option<String>,
    #[serde(rename = "refreshToken", skip_serializing_if = "Option::is_none")]
    pub refresh: Option<String>,
}

impl TokenPair {
    pub fn new(access: impl Into<String>, refresh: impl Into<String>) -> Self {
        Self {
            access: Some(access.into()),
            refresh: Some(refresh.into()),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.access.is_none() && self.refresh.is_none()
    }
}

/// On-disk representation of the stored pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredTokens {
    #[serde(flatten)]
    pair: TokenPair,
    saved_at: DateTime<Utc>,
}

/// Persisted access/refresh token pair.
///
/// The in-memory copy is authoritative for the process; the file under the
/// data directory carries it across restarts. Disk failures are logged and
/// swallowed so that token operations themselves never fail.
pub struct TokenStore {
    path: Option<PathBuf>,
    inner: Mutex<TokenPair>,
}

impl TokenStore {
    /// Open the store backed by `data_dir`, loading any persisted pair.
    pub fn open(data_dir: PathBuf) -> Self {
        let path = data_dir.join(TOKEN_FILE);
        let pair = Self::load_from(&path);
        Self {
            path: Some(path),
            inner: Mutex::new(pair),
        }
    }

    /// An unpersisted store. Used by tests and the local backend.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            inner: Mutex::new(TokenPair::default()),
        }
    }

    fn load_from(path: &PathBuf) -> TokenPair {
        if !path.exists() {
            return TokenPair::default();
        }
        match std::fs::read_to_string(path) {
            Ok(contents) => match serde_json::from_str::<StoredTokens>(&contents) {
                Ok(stored) => {
                    debug!(saved_at = %stored.saved_at, "Loaded stored tokens");
                    stored.pair
                }
                Err(e) => {
                    warn!(error = %e, "Failed to parse token file, starting empty");
                    TokenPair::default()
                }
            },
            Err(e) => {
                warn!(error = %e, "Failed to read token file, starting empty");
                TokenPair::default()
            }
        }
    }

    /// Current stored pair, if any. Never fails.
    pub fn get(&self) -> Option<TokenPair> {
        let pair = self.inner.lock().expect("token store lock poisoned");
        if pair.is_empty() {
            None
        } else {
            Some(pair.clone())
        }
    }

    /// Current access token, if stored.
    pub fn access(&self) -> Option<String> {
        self.inner
            .lock()
            .expect("token store lock poisoned")
            .access
            .clone()
    }

    /// Current refresh token, if stored.
    pub fn refresh(&self) -> Option<String> {
        self.inner
            .lock()
            .expect("token store lock poisoned")
            .refresh
            .clone()
    }

    /// Merge-write the supplied fields over the stored pair.
    /// Absent fields are left as they are; last write wins.
    pub fn set(&self, update: TokenPair) {
        {
            let mut pair = self.inner.lock().expect("token store lock poisoned");
            if let Some(access) = update.access {
                pair.access = Some(access);
            }
            if let Some(refresh) = update.refresh {
                pair.refresh = Some(refresh);
            }
        }
        self.persist();
    }

    /// Replace the access token only; the refresh token is untouched.
    pub fn set_access(&self, access: &str) {
        self.inner
            .lock()
            .expect("token store lock poisoned")
            .access = Some(access.to_string());
        self.persist();
    }

    /// Remove both tokens. Idempotent; safe to call when already empty.
    pub fn clear(&self) {
        {
            let mut pair = self.inner.lock().expect("token store lock poisoned");
            *pair = TokenPair::default();
        }
        if let Some(ref path) = self.path {
            if path.exists() {
                if let Err(e) = std::fs::remove_file(path) {
                    warn!(error = %e, "Failed to remove token file");
                }
            }
        }
    }

    fn persist(&self) {
        let Some(ref path) = self.path else {
            return;
        };
        let stored = StoredTokens {
            pair: self.inner.lock().expect("token store lock poisoned").clone(),
            saved_at: Utc::now(),
        };
        if let Some(parent) = path.parent() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                warn!(error = %e, "Failed to create token directory");
                return;
            }
        }
        match serde_json::to_string_pretty(&stored) {
            Ok(contents) => {
                if let Err(e) = std::fs::write(path, contents) {
                    warn!(error = %e, "Failed to write token file");
                }
            }
            Err(e) => warn!(error = %e, "Failed to serialize tokens"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_store_returns_absent() {
        let store = TokenStore::in_memory();
        assert!(store.get().is_none());
        assert!(store.access().is_none());
        assert!(store.refresh().is_none());
    }

    #[test]
    fn test_set_then_get_round_trip() {
        let store = TokenStore::in_memory();
        store.set(TokenPair::new("acc1", "ref1"));
        let pair = store.get().unwrap();
        assert_eq!(pair.access.as_deref(), Some("acc1"));
        assert_eq!(pair.refresh.as_deref(), Some("ref1"));
    }

    #[test]
    fn test_partial_set_only_updates_supplied_fields() {
        let store = TokenStore::in_memory();
        store.set(TokenPair::new("acc1", "ref1"));
        store.set(TokenPair {
            access: None,
            refresh: Some("ref2".to_string()),
        });
        let pair = store.get().unwrap();
        assert_eq!(pair.access.as_deref(), Some("acc1"));
        assert_eq!(pair.refresh.as_deref(), Some("ref2"));
    }

    #[test]
    fn test_set_access_leaves_refresh_untouched() {
        let store = TokenStore::in_memory();
        store.set(TokenPair::new("acc1", "ref1"));
        store.set_access("acc2");
        let pair = store.get().unwrap();
        assert_eq!(pair.access.as_deref(), Some("acc2"));
        assert_eq!(pair.refresh.as_deref(), Some("ref1"));
    }

    #[test]
    fn test_clear_is_idempotent() {
        let store = TokenStore::in_memory();
        store.set(TokenPair::new("acc1", "ref1"));
        store.clear();
        assert!(store.get().is_none());
        // Second clear on an empty store must not panic or error
        store.clear();
        assert!(store.get().is_none());
    }

    #[test]
    fn test_tokens_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = TokenStore::open(dir.path().to_path_buf());
            store.set(TokenPair::new("acc1", "ref1"));
        }
        let store = TokenStore::open(dir.path().to_path_buf());
        let pair = store.get().unwrap();
        assert_eq!(pair.access.as_deref(), Some("acc1"));
        assert_eq!(pair.refresh.as_deref(), Some("ref1"));
    }

    #[test]
    fn test_clear_removes_persisted_file() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = TokenStore::open(dir.path().to_path_buf());
            store.set(TokenPair::new("acc1", "ref1"));
            store.clear();
        }
        let store = TokenStore::open(dir.path().to_path_buf());
        assert!(store.get().is_none());
    }

    #[test]
    fn test_corrupt_token_file_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(TOKEN_FILE), "not json").unwrap();
        let store = TokenStore::open(dir.path().to_path_buf());
        assert!(store.get().is_none());
    }
}
