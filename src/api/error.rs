use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("No refresh token stored")]
    NoRefreshToken,

    #[error("Refresh token rejected by server")]
    RefreshRejected,

    #[error("Invalid credentials: {0}")]
    CredentialsInvalid(String),

    #[error("Malformed server response: {0}")]
    MalformedResponse(String),

    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),
}

/// Maximum length for error response bodies in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

/// Fallback shown when a login failure body carries no usable message
const GENERIC_LOGIN_FAILURE: &str = "Invalid credentials";

impl ApiError {
    /// Truncate a response body to avoid logging excessive data
    fn truncate_body(body: &str) -> String {
        if body.len() <= MAX_ERROR_BODY_LENGTH {
            body.to_string()
        } else {
            format!(
                "{}... (truncated, {} total bytes)",
                &body[..MAX_ERROR_BODY_LENGTH],
                body.len()
            )
        }
    }

    /// Build a login-rejection error from a failure response body.
    ///
    /// The backend reports login failures as JSON with a `detail` (DRF) or
    /// `message` field; anything else falls back to a generic message.
    pub fn credentials_from_body(body: &str) -> Self {
        let message = serde_json::from_str::<serde_json::Value>(body)
            .ok()
            .and_then(|v| {
                v.get("detail")
                    .or_else(|| v.get("message"))
                    .and_then(|m| m.as_str())
                    .map(str::to_string)
            })
            .unwrap_or_else(|| GENERIC_LOGIN_FAILURE.to_string());
        ApiError::CredentialsInvalid(Self::truncate_body(&message))
    }
}
